//! Configuration management for PSD processing
//!
//! Two layers live here. [`PsdParameters`] is the flat, serde-friendly shape
//! read from JSON files (the keys the processing dialogs and batch drivers
//! exchange). [`PsdConfig`] and [`InstrumentParams`] are the validated values
//! the engine consumes: every range check happens in
//! [`PsdParameters::build`], never deep inside the algorithm.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::error::{PsdError, StoreError};
use crate::logging::LoggingConfig;
use crate::psd::smoothing::MIN_OCTAVE_STEP;
use crate::psd::window::WindowType;
use crate::waveform::name_parser::NamingScheme;
use crate::waveform::{FileNameParser, ReaderRegistry};

/// Physical quantity the sensor records after sensitivity correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    /// Velocity sensor, counts per m/s
    #[default]
    Velocity,
    /// Accelerometer, counts per m/s^2
    Acceleration,
}

/// Optional pre-whitening filter selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    #[default]
    None,
    #[serde(alias = "High Pass")]
    HighPass,
    #[serde(alias = "Band Pass")]
    BandPass,
}

/// Trend removed from the raw counts before sensitivity correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetrendMode {
    /// Least-squares straight line
    #[default]
    Linear,
    /// Mean only
    Mean,
}

/// Validated filter description
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
    None,
    HighPass { cutoff_hz: f64 },
    BandPass { low_hz: f64, high_hz: f64 },
}

/// Flat PSD parameter set as found in JSON configuration files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PsdParameters {
    /// Overall sensitivity in counts per physical unit
    pub sensitivity: f64,
    pub damping_ratio: f64,
    /// Natural period in seconds
    pub natural_period: f64,
    pub instrument_type: InstrumentType,
    pub filter_type: FilterType,
    /// One cutoff for high-pass, `[low, high]` for band-pass
    pub filter_cutoffs: Vec<f64>,
    #[serde(alias = "psd_freq_min")]
    pub freq_min: f64,
    #[serde(alias = "psd_freq_max")]
    pub freq_max: f64,
    #[serde(alias = "window_size")]
    pub window_length_s: f64,
    pub overlap_fraction: f64,
    pub window_type: WindowType,
    /// Width of each smoothing bin in octaves
    pub octave_bandwidth: f64,
    /// Bin step as a fraction of the bandwidth
    pub octave_step_fraction: f64,
    pub detrend: DetrendMode,
    #[serde(alias = "response_enabled")]
    pub response_removal: bool,
}

impl Default for PsdParameters {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            damping_ratio: 0.707,
            natural_period: 10.0,
            instrument_type: InstrumentType::Velocity,
            filter_type: FilterType::None,
            filter_cutoffs: Vec::new(),
            freq_min: 0.001,
            freq_max: 100.0,
            window_length_s: 1000.0,
            overlap_fraction: 0.8,
            window_type: WindowType::Hann,
            octave_bandwidth: 1.0,
            octave_step_fraction: 0.125,
            detrend: DetrendMode::Linear,
            response_removal: false,
        }
    }
}

impl PsdParameters {
    /// Validate and split into the engine's configuration and instrument values
    pub fn build(&self) -> Result<(PsdConfig, InstrumentParams), PsdError> {
        let instrument = InstrumentParams {
            sensitivity: self.sensitivity,
            damping_ratio: self.damping_ratio,
            natural_period: self.natural_period,
            instrument_type: self.instrument_type,
        };
        instrument.validate()?;

        let filter = match self.filter_type {
            FilterType::None => FilterSpec::None,
            FilterType::HighPass => match self.filter_cutoffs.as_slice() {
                [cutoff] => FilterSpec::HighPass { cutoff_hz: *cutoff },
                other => {
                    return Err(PsdError::InvalidFilter {
                        reason: format!("high-pass needs one cutoff, got {}", other.len()),
                    })
                }
            },
            FilterType::BandPass => match self.filter_cutoffs.as_slice() {
                [low, high] => FilterSpec::BandPass {
                    low_hz: *low,
                    high_hz: *high,
                },
                other => {
                    return Err(PsdError::InvalidFilter {
                        reason: format!("band-pass needs two cutoffs, got {}", other.len()),
                    })
                }
            },
        };

        let config = PsdConfig::new(
            filter,
            self.freq_min,
            self.freq_max,
            self.window_length_s,
            self.overlap_fraction,
            self.window_type,
            self.octave_bandwidth,
            self.octave_step_fraction,
            self.detrend,
            self.response_removal,
        )?;

        Ok((config, instrument))
    }
}

/// Instrument response parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentParams {
    pub sensitivity: f64,
    pub damping_ratio: f64,
    pub natural_period: f64,
    #[serde(default)]
    pub instrument_type: InstrumentType,
}

impl InstrumentParams {
    pub fn new(sensitivity: f64, damping_ratio: f64, natural_period: f64) -> Self {
        Self {
            sensitivity,
            damping_ratio,
            natural_period,
            instrument_type: InstrumentType::Velocity,
        }
    }

    pub fn with_type(mut self, instrument_type: InstrumentType) -> Self {
        self.instrument_type = instrument_type;
        self
    }

    /// Check sensitivity, damping and natural period
    pub fn validate(&self) -> Result<(), PsdError> {
        self.validate_sensitivity()?;
        if !self.damping_ratio.is_finite() || self.damping_ratio <= 0.0 {
            return Err(PsdError::InvalidInstrument {
                reason: format!("damping ratio must be positive (got {})", self.damping_ratio),
            });
        }
        if !self.natural_period.is_finite() || self.natural_period <= 0.0 {
            return Err(PsdError::InvalidInstrument {
                reason: format!(
                    "natural period must be positive (got {} s)",
                    self.natural_period
                ),
            });
        }
        Ok(())
    }

    pub(crate) fn validate_sensitivity(&self) -> Result<(), PsdError> {
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(PsdError::InvalidSensitivity {
                sensitivity: self.sensitivity,
            });
        }
        Ok(())
    }
}

/// Validated, immutable PSD processing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PsdConfig {
    filter: FilterSpec,
    freq_min: f64,
    freq_max: f64,
    window_length_s: f64,
    overlap_fraction: f64,
    window_type: WindowType,
    octave_bandwidth: f64,
    octave_step_fraction: f64,
    detrend: DetrendMode,
    response_removal: bool,
}

impl PsdConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        filter: FilterSpec,
        freq_min: f64,
        freq_max: f64,
        window_length_s: f64,
        overlap_fraction: f64,
        window_type: WindowType,
        octave_bandwidth: f64,
        octave_step_fraction: f64,
        detrend: DetrendMode,
        response_removal: bool,
    ) -> Result<Self, PsdError> {
        if !(0.0..1.0).contains(&overlap_fraction) {
            return Err(PsdError::InvalidOverlap {
                overlap: overlap_fraction,
            });
        }
        if !window_length_s.is_finite() || window_length_s <= 0.0 {
            return Err(PsdError::InvalidWindowLength {
                seconds: window_length_s,
            });
        }
        if !freq_min.is_finite() || !freq_max.is_finite() || freq_min <= 0.0 || freq_min >= freq_max
        {
            return Err(PsdError::InvalidFrequencyRange {
                min: freq_min,
                max: freq_max,
            });
        }
        if !octave_bandwidth.is_finite() || octave_bandwidth <= 0.0 {
            return Err(PsdError::InvalidOctaveBandwidth {
                bandwidth: octave_bandwidth,
            });
        }
        if !octave_step_fraction.is_finite()
            || octave_step_fraction <= 0.0
            || octave_step_fraction > 1.0
            || octave_bandwidth * octave_step_fraction < MIN_OCTAVE_STEP
        {
            return Err(PsdError::InvalidOctaveBandwidth {
                bandwidth: octave_bandwidth * octave_step_fraction,
            });
        }
        validate_filter(&filter)?;

        Ok(Self {
            filter,
            freq_min,
            freq_max,
            window_length_s,
            overlap_fraction,
            window_type,
            octave_bandwidth,
            octave_step_fraction,
            detrend,
            response_removal,
        })
    }

    pub fn filter(&self) -> FilterSpec {
        self.filter
    }

    pub fn freq_min(&self) -> f64 {
        self.freq_min
    }

    pub fn freq_max(&self) -> f64 {
        self.freq_max
    }

    pub fn window_length_s(&self) -> f64 {
        self.window_length_s
    }

    pub fn overlap_fraction(&self) -> f64 {
        self.overlap_fraction
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn octave_bandwidth(&self) -> f64 {
        self.octave_bandwidth
    }

    /// Step between consecutive smoothing bins, in octaves
    pub fn octave_step(&self) -> f64 {
        self.octave_bandwidth * self.octave_step_fraction
    }

    pub fn detrend(&self) -> DetrendMode {
        self.detrend
    }

    pub fn response_removal(&self) -> bool {
        self.response_removal
    }

    /// Copy with a different window length, re-validated
    pub fn with_window_length(&self, window_length_s: f64) -> Result<Self, PsdError> {
        if !window_length_s.is_finite() || window_length_s <= 0.0 {
            return Err(PsdError::InvalidWindowLength {
                seconds: window_length_s,
            });
        }
        Ok(Self {
            window_length_s,
            ..self.clone()
        })
    }

    /// Flatten back into the JSON parameter shape
    pub fn to_parameters(&self, instrument: &InstrumentParams) -> PsdParameters {
        let (filter_type, filter_cutoffs) = match self.filter {
            FilterSpec::None => (FilterType::None, Vec::new()),
            FilterSpec::HighPass { cutoff_hz } => (FilterType::HighPass, vec![cutoff_hz]),
            FilterSpec::BandPass { low_hz, high_hz } => {
                (FilterType::BandPass, vec![low_hz, high_hz])
            }
        };
        PsdParameters {
            sensitivity: instrument.sensitivity,
            damping_ratio: instrument.damping_ratio,
            natural_period: instrument.natural_period,
            instrument_type: instrument.instrument_type,
            filter_type,
            filter_cutoffs,
            freq_min: self.freq_min,
            freq_max: self.freq_max,
            window_length_s: self.window_length_s,
            overlap_fraction: self.overlap_fraction,
            window_type: self.window_type,
            octave_bandwidth: self.octave_bandwidth,
            octave_step_fraction: self.octave_step_fraction,
            detrend: self.detrend,
            response_removal: self.response_removal,
        }
    }
}

impl Default for PsdConfig {
    fn default() -> Self {
        Self {
            filter: FilterSpec::None,
            freq_min: 0.001,
            freq_max: 100.0,
            window_length_s: 1000.0,
            overlap_fraction: 0.8,
            window_type: WindowType::Hann,
            octave_bandwidth: 1.0,
            octave_step_fraction: 0.125,
            detrend: DetrendMode::Linear,
            response_removal: false,
        }
    }
}

fn validate_filter(filter: &FilterSpec) -> Result<(), PsdError> {
    match *filter {
        FilterSpec::None => Ok(()),
        FilterSpec::HighPass { cutoff_hz } => {
            if cutoff_hz.is_finite() && cutoff_hz > 0.0 {
                Ok(())
            } else {
                Err(PsdError::InvalidFilter {
                    reason: format!("high-pass cutoff must be positive (got {} Hz)", cutoff_hz),
                })
            }
        }
        FilterSpec::BandPass { low_hz, high_hz } => {
            if low_hz.is_finite() && high_hz.is_finite() && low_hz > 0.0 && low_hz < high_hz {
                Ok(())
            } else {
                Err(PsdError::InvalidFilter {
                    reason: format!(
                        "band-pass cutoffs must satisfy 0 < low < high (got {} - {} Hz)",
                        low_hz, high_hz
                    ),
                })
            }
        }
    }
}

/// Batch processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of files processed concurrently
    pub max_parallel: usize,
    /// Root of the station/channel result tree; next to each input when unset
    pub output_root: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            output_root: None,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub psd: PsdParameters,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
    /// Tabulated noise model dataset replacing the built-in Peterson curves
    pub noise_model_file: Option<PathBuf>,
    /// File naming scheme of the input data
    pub naming: Option<NamingScheme>,
    /// Project file holding a naming scheme; wins over `naming`
    pub project_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults (with a warning) when the
    /// file is missing or is not valid JSON.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_file(&path) {
            Ok(config) => {
                log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                config
            }
            Err(err) => {
                log::warn!(
                    "[Config] Failed to load {:?}: {:#}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Parser for input file names
    ///
    /// The project file's scheme when one is set, then the inline scheme, then
    /// the `STA.COMP.YYYYmmddHHMMSS` layout.
    pub fn file_name_parser(&self) -> Result<FileNameParser, StoreError> {
        match (&self.project_file, &self.naming) {
            (Some(project), _) => FileNameParser::from_project_file(project),
            (None, Some(scheme)) => FileNameParser::from_scheme(scheme),
            (None, None) => Ok(FileNameParser::station_component()),
        }
    }

    /// Built-in readers using the configured naming scheme
    pub fn reader_registry(&self) -> Result<ReaderRegistry, StoreError> {
        Ok(ReaderRegistry::with_defaults().with_naming(self.file_name_parser()?))
    }

    /// Load configuration from JSON file, reporting any failure
    pub fn try_load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }
}
