// PSD module - power spectral density engine
//
// The pipeline is strictly sequential and holds no state between calls:
//   prepare → filter → estimate → remove response (optional)
//   → acceleration dB → smooth → compare to noise models
// Each stage is exposed on [`PsdEngine`] so callers (and tests) can run them
// individually; [`PsdEngine::compute`] chains them into a [`PsdResult`].

pub mod detrend;
pub mod filter;
pub mod noise_models;
pub mod response;
pub mod smoothing;
pub mod welch;
pub mod window;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{InstrumentParams, PsdConfig, PsdParameters};
use crate::error::PsdError;
use crate::waveform::WaveformSegment;

pub use filter::ZeroPhaseFilter;
pub use noise_models::{NoiseComparison, NoiseModels};
pub use smoothing::{octave_bin_count, SmoothedSpectrum};
pub use welch::SegmentLayout;
pub use window::WindowType;

/// Shortest series `prepare` accepts
pub const MIN_SEGMENT_SAMPLES: usize = 16;

/// Spectrum restricted to the configured frequency band
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Ascending, within `[freq_min, min(freq_max, Nyquist)]`
    pub frequencies: Vec<f64>,
    /// Linear power density
    pub power: Vec<f64>,
    pub window_count: usize,
    pub resolution_hz: f64,
}

/// Outcome of one engine run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsdResult {
    pub frequencies: Vec<f64>,
    /// dB re 1 (m/s²)²/Hz
    pub raw_power_db: Vec<f64>,
    /// Bin centres of the smoothed curve
    pub smoothed_frequencies: Vec<f64>,
    pub smoothed_power_db: Vec<f64>,
    /// Per smoothed bin, counts over the fixed dB grid
    pub distribution: Vec<Vec<u32>>,
    /// Reference curves on `frequencies`
    pub noise: NoiseComparison,
    /// Reference curves on `smoothed_frequencies`
    pub smoothed_noise: NoiseComparison,
    pub window_count: usize,
    pub resolution_hz: f64,
    pub sample_rate: f64,
    /// Configuration the result was computed with
    pub settings: PsdParameters,
}

impl PsdResult {
    pub fn periods(&self) -> Vec<f64> {
        self.frequencies.iter().map(|f| 1.0 / f).collect()
    }

    pub fn smoothed_periods(&self) -> Vec<f64> {
        self.smoothed_frequencies.iter().map(|f| 1.0 / f).collect()
    }

    /// Frequency of the largest raw value
    pub fn peak_frequency(&self) -> Option<f64> {
        peak_of(&self.frequencies, &self.raw_power_db)
    }

    /// Centre frequency of the largest smoothed value
    pub fn smoothed_peak_frequency(&self) -> Option<f64> {
        peak_of(&self.smoothed_frequencies, &self.smoothed_power_db)
    }
}

fn peak_of(frequencies: &[f64], values: &[f64]) -> Option<f64> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .and_then(|(idx, _)| frequencies.get(idx).copied())
}

/// PSD engine for one configuration and instrument
#[derive(Debug, Clone)]
pub struct PsdEngine {
    config: PsdConfig,
    instrument: InstrumentParams,
    noise_models: Arc<NoiseModels>,
}

impl PsdEngine {
    /// Engine using the process-wide noise models
    pub fn new(config: PsdConfig, instrument: InstrumentParams) -> Self {
        Self::with_noise_models(config, instrument, noise_models::global())
    }

    pub fn with_noise_models(
        config: PsdConfig,
        instrument: InstrumentParams,
        noise_models: Arc<NoiseModels>,
    ) -> Self {
        Self {
            config,
            instrument,
            noise_models,
        }
    }

    /// Validate raw parameters and build an engine
    pub fn from_parameters(parameters: &PsdParameters) -> Result<Self, PsdError> {
        let (config, instrument) = parameters.build()?;
        Ok(Self::new(config, instrument))
    }

    pub fn config(&self) -> &PsdConfig {
        &self.config
    }

    pub fn instrument(&self) -> &InstrumentParams {
        &self.instrument
    }

    pub fn noise_models(&self) -> &NoiseModels {
        &self.noise_models
    }

    /// Detrend the raw counts and convert them to physical units
    pub fn prepare(&self, segment: &WaveformSegment) -> Result<Vec<f64>, PsdError> {
        let sample_rate = segment.sample_rate();
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PsdError::InvalidSampleRate { sample_rate });
        }
        if segment.len() < MIN_SEGMENT_SAMPLES {
            return Err(PsdError::SegmentTooShort {
                samples: segment.len(),
                required: MIN_SEGMENT_SAMPLES,
            });
        }
        self.instrument.validate_sensitivity()?;
        if let Some(index) = segment.samples().iter().position(|s| !s.is_finite()) {
            return Err(PsdError::NonFiniteSamples { index });
        }

        let mut series = segment.samples().to_vec();
        detrend::detrend_in_place(&mut series, self.config.detrend());
        let sensitivity = self.instrument.sensitivity;
        for sample in series.iter_mut() {
            *sample /= sensitivity;
        }
        Ok(series)
    }

    /// Apply the configured filter; identity when filtering is off
    pub fn filter(&self, series: &[f64], sample_rate: f64) -> Result<Vec<f64>, PsdError> {
        match ZeroPhaseFilter::from_spec(self.config.filter(), sample_rate)? {
            Some(filter) => {
                tracing::debug!(
                    "[PsdEngine] Filtering {} samples with {:?}",
                    series.len(),
                    self.config.filter()
                );
                Ok(filter.apply(series))
            }
            None => Ok(series.to_vec()),
        }
    }

    /// Welch estimate clipped to the configured band
    pub fn estimate(&self, series: &[f64], sample_rate: f64) -> Result<Spectrum, PsdError> {
        let window_samples = welch::window_samples(self.config.window_length_s(), sample_rate);
        let estimate = welch::estimate(
            series,
            sample_rate,
            window_samples,
            self.config.overlap_fraction(),
            self.config.window_type(),
        )?;

        let upper = self.config.freq_max().min(sample_rate / 2.0);
        let lower = self.config.freq_min();
        let tolerance = estimate.resolution_hz * 1e-6;
        let (frequencies, power): (Vec<f64>, Vec<f64>) = estimate
            .frequencies
            .iter()
            .zip(&estimate.power)
            .filter(|&(&f, _)| f > 0.0 && f >= lower - tolerance && f <= upper + tolerance)
            .map(|(&f, &p)| (f, p))
            .unzip();

        if frequencies.is_empty() {
            return Err(PsdError::InvalidFrequencyRange {
                min: lower,
                max: upper,
            });
        }
        if let Some(idx) = power.iter().position(|p| !p.is_finite()) {
            return Err(PsdError::degenerate(
                "estimate",
                format!("non-finite power at {} Hz", frequencies[idx]),
            ));
        }
        if power.iter().all(|&p| p == 0.0) {
            return Err(PsdError::degenerate(
                "estimate",
                "all power is zero (constant or empty input)",
            ));
        }

        let dropped = SegmentLayout::new(series.len(), window_samples, self.config.overlap_fraction())
            .map(|layout| layout.dropped_tail(series.len()))
            .unwrap_or(0);
        tracing::debug!(
            "[PsdEngine] Welch: {} windows of {} samples ({} tail samples dropped), {} bins in {:.4}-{:.4} Hz",
            estimate.window_count,
            estimate.window_samples,
            dropped,
            frequencies.len(),
            frequencies[0],
            frequencies[frequencies.len() - 1]
        );

        Ok(Spectrum {
            frequencies,
            power,
            window_count: estimate.window_count,
            resolution_hz: estimate.resolution_hz,
        })
    }

    /// Divide out the seismometer's transfer function
    pub fn remove_instrument_response(&self, spectrum: &Spectrum) -> Result<Spectrum, PsdError> {
        let power = response::remove_response(&spectrum.frequencies, &spectrum.power, &self.instrument)?;
        Ok(Spectrum {
            power,
            ..spectrum.clone()
        })
    }

    /// Acceleration power in dB re 1 (m/s²)²/Hz
    pub fn to_acceleration_db(&self, spectrum: &Spectrum) -> Result<Vec<f64>, PsdError> {
        let acceleration = response::to_acceleration(
            &spectrum.frequencies,
            &spectrum.power,
            self.instrument.instrument_type,
        );
        response::to_decibels(&spectrum.frequencies, &acceleration)
    }

    /// Fractional-octave smoothing with the configured width and step
    pub fn smooth(&self, frequencies: &[f64], power_db: &[f64]) -> Result<SmoothedSpectrum, PsdError> {
        smoothing::smooth(
            frequencies,
            power_db,
            self.config.octave_bandwidth(),
            self.config.octave_step(),
        )
    }

    /// Sample NLNM/NHNM at `frequencies` and rate `power_db` against them
    pub fn compare_to_noise_models(&self, frequencies: &[f64], power_db: &[f64]) -> NoiseComparison {
        self.noise_models.compare(frequencies, power_db)
    }

    /// Run the whole pipeline on one segment
    pub fn compute(&self, segment: &WaveformSegment) -> Result<PsdResult, PsdError> {
        let sample_rate = segment.sample_rate();
        let prepared = self.prepare(segment)?;
        let filtered = self.filter(&prepared, sample_rate)?;
        let mut spectrum = self.estimate(&filtered, sample_rate)?;
        if self.config.response_removal() {
            spectrum = self.remove_instrument_response(&spectrum)?;
        }
        let raw_power_db = self.to_acceleration_db(&spectrum)?;
        let smoothed = self.smooth(&spectrum.frequencies, &raw_power_db)?;
        let smoothed_frequencies = smoothed.frequencies();

        let noise = self.compare_to_noise_models(&spectrum.frequencies, &raw_power_db);
        let smoothed_noise =
            self.compare_to_noise_models(&smoothed_frequencies, &smoothed.power_db);

        tracing::info!(
            "[PsdEngine] {} {}: {} bins, {} smoothed, {:.0}% above NHNM, {:.0}% below NLNM",
            segment.channel(),
            segment.start_time().format("%Y-%m-%dT%H:%M:%S"),
            spectrum.frequencies.len(),
            smoothed.len(),
            noise.fraction_above_nhnm * 100.0,
            noise.fraction_below_nlnm * 100.0
        );

        Ok(PsdResult {
            frequencies: spectrum.frequencies,
            raw_power_db,
            smoothed_frequencies,
            smoothed_power_db: smoothed.power_db,
            distribution: smoothed.distribution,
            noise,
            smoothed_noise,
            window_count: spectrum.window_count,
            resolution_hz: spectrum.resolution_hz,
            sample_rate,
            settings: self.config.to_parameters(&self.instrument),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterSpec, InstrumentType};
    use crate::waveform::ChannelId;
    use chrono::{TimeZone, Utc};
    use std::f64::consts::PI;

    fn segment(samples: Vec<f64>, sample_rate: f64) -> WaveformSegment {
        WaveformSegment::new(
            samples,
            sample_rate,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            ChannelId::new("XX", "TEST", "", "HHZ"),
        )
        .unwrap()
    }

    fn short_window_config(window_s: f64) -> PsdConfig {
        PsdConfig::default().with_window_length(window_s).unwrap()
    }

    fn engine(config: PsdConfig, sensitivity: f64) -> PsdEngine {
        PsdEngine::new(config, InstrumentParams::new(sensitivity, 0.707, 10.0))
    }

    #[test]
    fn test_prepare_rejects_bad_sensitivity() {
        let data = segment(vec![1.0; 100], 10.0);
        for sensitivity in [0.0, -3.0, f64::NAN] {
            let err = engine(PsdConfig::default(), sensitivity)
                .prepare(&data)
                .unwrap_err();
            assert!(matches!(err, PsdError::InvalidSensitivity { .. }));
        }
    }

    #[test]
    fn test_prepare_rejects_short_and_non_finite() {
        let eng = engine(PsdConfig::default(), 1.0);
        let err = eng.prepare(&segment(vec![0.0; 5], 10.0)).unwrap_err();
        assert_eq!(
            err,
            PsdError::SegmentTooShort {
                samples: 5,
                required: MIN_SEGMENT_SAMPLES
            }
        );

        let mut samples = vec![0.0; 64];
        samples[10] = f64::INFINITY;
        let err = eng.prepare(&segment(samples, 10.0)).unwrap_err();
        assert_eq!(err, PsdError::NonFiniteSamples { index: 10 });
    }

    #[test]
    fn test_prepare_divides_by_sensitivity() {
        let samples: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 400.0 } else { -400.0 }).collect();
        let prepared = engine(PsdConfig::default(), 400.0)
            .prepare(&segment(samples, 10.0))
            .unwrap();
        assert!(prepared.iter().all(|v| (v.abs() - 1.0).abs() < 0.05));
    }

    #[test]
    fn test_constant_input_is_degenerate() {
        let eng = engine(short_window_config(10.0), 1.0);
        let err = eng.compute(&segment(vec![7.0; 1000], 10.0)).unwrap_err();
        assert!(matches!(err, PsdError::DegenerateSpectrum { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Numerical);
    }

    #[test]
    fn test_window_exceeding_segment() {
        let eng = engine(PsdConfig::default(), 1.0);
        let err = eng.compute(&segment(vec![1.0; 500], 10.0)).unwrap_err();
        assert!(matches!(err, PsdError::WindowExceedsSegment { .. }));
    }

    #[test]
    fn test_estimate_clips_to_band() {
        let config = PsdConfig::new(
            FilterSpec::None,
            0.5,
            200.0,
            10.0,
            0.5,
            WindowType::Hann,
            1.0,
            0.125,
            crate::config::DetrendMode::Linear,
            false,
        )
        .unwrap();
        let eng = engine(config, 1.0);
        let series: Vec<f64> = (0..2000).map(|i| (i as f64 * 0.7).sin()).collect();
        let spectrum = eng.estimate(&series, 20.0).unwrap();
        assert!((spectrum.frequencies[0] - 0.5).abs() < 1e-9);
        assert!((spectrum.frequencies[spectrum.frequencies.len() - 1] - 10.0).abs() < 1e-9);
        assert!((spectrum.resolution_hz - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_compute_sine_peak() {
        let fs = 20.0;
        let f0 = 2.0;
        let samples: Vec<f64> = (0..20_000)
            .map(|i| (2.0 * PI * f0 * i as f64 / fs).sin())
            .collect();
        let eng = engine(short_window_config(50.0), 1.0);
        let result = eng.compute(&segment(samples, fs)).unwrap();
        let peak = result.peak_frequency().unwrap();
        assert!((peak - f0).abs() <= result.resolution_hz);
        assert_eq!(result.noise.nlnm_db.len(), result.frequencies.len());
        assert_eq!(
            result.smoothed_noise.nhnm_db.len(),
            result.smoothed_frequencies.len()
        );
        assert_eq!(result.settings.window_length_s, 50.0);
    }

    #[test]
    fn test_acceleration_instrument_skips_omega_squared() {
        let fs = 10.0;
        let samples: Vec<f64> = (0..4000).map(|i| ((i * 7919) % 13) as f64).collect();
        let config = short_window_config(20.0);
        let velocity = PsdEngine::new(config.clone(), InstrumentParams::new(1.0, 0.707, 10.0));
        let accel = PsdEngine::new(
            config,
            InstrumentParams::new(1.0, 0.707, 10.0).with_type(InstrumentType::Acceleration),
        );
        let data = segment(samples, fs);
        let v = velocity.compute(&data).unwrap();
        let a = accel.compute(&data).unwrap();
        for ((f, vdb), adb) in v.frequencies.iter().zip(&v.raw_power_db).zip(&a.raw_power_db) {
            let omega = 2.0 * PI * f;
            assert!((vdb - adb - 20.0 * omega.log10()).abs() < 1e-6);
        }
    }
}
