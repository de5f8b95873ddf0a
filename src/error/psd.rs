// PSD engine error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// PSD error code constants
///
/// Single source of truth for the numeric codes reported by the engine.
///
/// Error code range: 3001-3014
pub struct PsdErrorCodes {}

impl PsdErrorCodes {
    /// Overlap fraction outside [0, 1)
    pub const INVALID_OVERLAP: i32 = 3001;

    /// Welch window length is not a positive, finite number of seconds
    pub const INVALID_WINDOW_LENGTH: i32 = 3002;

    /// Frequency range of interest is empty or not positive
    pub const INVALID_FREQUENCY_RANGE: i32 = 3003;

    /// Filter cutoffs are missing, inverted or beyond Nyquist
    pub const INVALID_FILTER: i32 = 3004;

    /// Octave smoothing bandwidth or step is not positive
    pub const INVALID_OCTAVE_BANDWIDTH: i32 = 3005;

    /// Damping ratio or natural period is unusable
    pub const INVALID_INSTRUMENT: i32 = 3006;

    /// Sensitivity is zero, negative or not finite
    pub const INVALID_SENSITIVITY: i32 = 3007;

    /// Segment holds fewer samples than the engine can use
    pub const SEGMENT_TOO_SHORT: i32 = 3008;

    /// Welch window is longer than the segment
    pub const WINDOW_EXCEEDS_SEGMENT: i32 = 3009;

    /// Sample timestamps are not evenly spaced
    pub const NON_UNIFORM_SAMPLING: i32 = 3010;

    /// Segment contains NaN or infinite samples
    pub const NON_FINITE_SAMPLES: i32 = 3011;

    /// Sample rate is zero, negative or not finite
    pub const INVALID_SAMPLE_RATE: i32 = 3012;

    /// Spectrum contains zero or non-finite power
    pub const DEGENERATE_SPECTRUM: i32 = 3013;

    /// Welch window spans fewer samples than a periodogram needs
    pub const WINDOW_TOO_SHORT: i32 = 3014;
}

/// Broad failure classes used by batch drivers to decide how to report a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid numeric ranges, caught before any computation
    Configuration,
    /// The waveform or instrument description cannot be processed
    Input,
    /// The computation produced undefined spectral values
    Numerical,
}

/// Log a PSD error with structured context
///
/// Emits the numeric code, the failure class and the message alongside the
/// caller-supplied context (usually the file being processed).
pub fn log_psd_error(err: &PsdError, context: &str) {
    error!(
        "PSD error in {}: code={}, kind={:?}, component=PsdEngine, message={}",
        context,
        err.code(),
        err.kind(),
        err.message()
    );
}

/// PSD engine errors
///
/// Every variant carries the offending value so the orchestration layer can
/// say which check failed on which input.
#[derive(Debug, Clone, PartialEq)]
pub enum PsdError {
    /// Overlap fraction must lie in [0, 1)
    InvalidOverlap { overlap: f64 },

    /// Window length must be positive and finite
    InvalidWindowLength { seconds: f64 },

    /// freq_min must be positive and below freq_max
    InvalidFrequencyRange { min: f64, max: f64 },

    /// Filter description is unusable
    InvalidFilter { reason: String },

    /// Smoothing bandwidth or step must be positive
    InvalidOctaveBandwidth { bandwidth: f64 },

    /// Damping ratio or natural period is unusable
    InvalidInstrument { reason: String },

    /// Sensitivity must be positive and finite
    InvalidSensitivity { sensitivity: f64 },

    /// Segment is shorter than the minimum usable length
    SegmentTooShort { samples: usize, required: usize },

    /// Welch window does not fit in the segment
    WindowExceedsSegment {
        window_samples: usize,
        segment_samples: usize,
    },

    /// Sample spacing deviates from the nominal interval
    NonUniformSampling {
        index: usize,
        expected_s: f64,
        actual_s: f64,
    },

    /// A sample is NaN or infinite
    NonFiniteSamples { index: usize },

    /// Sample rate must be positive and finite
    InvalidSampleRate { sample_rate: f64 },

    /// A pipeline stage produced zero or non-finite power
    DegenerateSpectrum { stage: String, reason: String },

    /// Welch window holds fewer samples than required
    WindowTooShort { window_samples: usize, required: usize },
}

impl PsdError {
    /// Failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PsdError::InvalidOverlap { .. }
            | PsdError::InvalidWindowLength { .. }
            | PsdError::InvalidFrequencyRange { .. }
            | PsdError::InvalidFilter { .. }
            | PsdError::InvalidOctaveBandwidth { .. }
            | PsdError::InvalidInstrument { .. }
            | PsdError::WindowTooShort { .. } => ErrorKind::Configuration,
            PsdError::InvalidSensitivity { .. }
            | PsdError::SegmentTooShort { .. }
            | PsdError::WindowExceedsSegment { .. }
            | PsdError::NonUniformSampling { .. }
            | PsdError::NonFiniteSamples { .. }
            | PsdError::InvalidSampleRate { .. } => ErrorKind::Input,
            PsdError::DegenerateSpectrum { .. } => ErrorKind::Numerical,
        }
    }

    pub(crate) fn degenerate(stage: &str, reason: impl Into<String>) -> Self {
        PsdError::DegenerateSpectrum {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for PsdError {
    fn code(&self) -> i32 {
        match self {
            PsdError::InvalidOverlap { .. } => PsdErrorCodes::INVALID_OVERLAP,
            PsdError::InvalidWindowLength { .. } => PsdErrorCodes::INVALID_WINDOW_LENGTH,
            PsdError::InvalidFrequencyRange { .. } => PsdErrorCodes::INVALID_FREQUENCY_RANGE,
            PsdError::InvalidFilter { .. } => PsdErrorCodes::INVALID_FILTER,
            PsdError::InvalidOctaveBandwidth { .. } => PsdErrorCodes::INVALID_OCTAVE_BANDWIDTH,
            PsdError::InvalidInstrument { .. } => PsdErrorCodes::INVALID_INSTRUMENT,
            PsdError::InvalidSensitivity { .. } => PsdErrorCodes::INVALID_SENSITIVITY,
            PsdError::SegmentTooShort { .. } => PsdErrorCodes::SEGMENT_TOO_SHORT,
            PsdError::WindowExceedsSegment { .. } => PsdErrorCodes::WINDOW_EXCEEDS_SEGMENT,
            PsdError::NonUniformSampling { .. } => PsdErrorCodes::NON_UNIFORM_SAMPLING,
            PsdError::NonFiniteSamples { .. } => PsdErrorCodes::NON_FINITE_SAMPLES,
            PsdError::InvalidSampleRate { .. } => PsdErrorCodes::INVALID_SAMPLE_RATE,
            PsdError::DegenerateSpectrum { .. } => PsdErrorCodes::DEGENERATE_SPECTRUM,
            PsdError::WindowTooShort { .. } => PsdErrorCodes::WINDOW_TOO_SHORT,
        }
    }

    fn message(&self) -> String {
        match self {
            PsdError::InvalidOverlap { overlap } => {
                format!("Overlap fraction must be in [0, 1) (got {})", overlap)
            }
            PsdError::InvalidWindowLength { seconds } => {
                format!("Window length must be a positive number of seconds (got {})", seconds)
            }
            PsdError::InvalidFrequencyRange { min, max } => {
                format!(
                    "Frequency range must satisfy 0 < freq_min < freq_max (got {} - {} Hz)",
                    min, max
                )
            }
            PsdError::InvalidFilter { reason } => format!("Invalid filter: {}", reason),
            PsdError::InvalidOctaveBandwidth { bandwidth } => {
                format!("Octave bandwidth must be positive (got {})", bandwidth)
            }
            PsdError::InvalidInstrument { reason } => {
                format!("Invalid instrument parameters: {}", reason)
            }
            PsdError::InvalidSensitivity { sensitivity } => {
                format!("Sensitivity must be positive (got {})", sensitivity)
            }
            PsdError::SegmentTooShort { samples, required } => {
                format!(
                    "Segment too short: need at least {} samples, got {}",
                    required, samples
                )
            }
            PsdError::WindowExceedsSegment {
                window_samples,
                segment_samples,
            } => {
                format!(
                    "Window of {} samples exceeds segment of {} samples",
                    window_samples, segment_samples
                )
            }
            PsdError::NonUniformSampling {
                index,
                expected_s,
                actual_s,
            } => {
                format!(
                    "Non-uniform sampling at sample {}: expected interval {} s, found {} s",
                    index, expected_s, actual_s
                )
            }
            PsdError::NonFiniteSamples { index } => {
                format!("Sample {} is NaN or infinite", index)
            }
            PsdError::InvalidSampleRate { sample_rate } => {
                format!("Sample rate must be positive (got {})", sample_rate)
            }
            PsdError::DegenerateSpectrum { stage, reason } => {
                format!("Degenerate spectrum after {}: {}", stage, reason)
            }
            PsdError::WindowTooShort {
                window_samples,
                required,
            } => {
                format!(
                    "Window of {} samples is too short, need at least {}",
                    window_samples, required
                )
            }
        }
    }
}

impl fmt::Display for PsdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PsdError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for PsdError {}
