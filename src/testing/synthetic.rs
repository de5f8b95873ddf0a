//! Deterministic synthetic waveforms
//!
//! Sines, uniform white noise, linear trends and combinations of them,
//! generated from a seeded `StdRng` so tests and demo data are repeatable.

use std::f64::consts::PI;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{PsdError, StoreError};
use crate::waveform::{ChannelId, WaveformSegment};

/// Default generator seed
pub const DEFAULT_SEED: u64 = 0x5EED_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticPattern {
    #[default]
    Sine,
    WhiteNoise,
    /// Sine plus white noise
    Mixed,
}

/// Signal description; amplitudes are in counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSpec {
    pub pattern: SyntheticPattern,
    pub frequency_hz: f64,
    pub amplitude: f64,
    pub noise_amplitude: f64,
    /// Offset added to every sample
    pub offset: f64,
    /// Linear drift in counts per second
    pub trend_per_s: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            pattern: SyntheticPattern::Sine,
            frequency_hz: 1.0,
            amplitude: 1000.0,
            noise_amplitude: 100.0,
            offset: 0.0,
            trend_per_s: 0.0,
            seed: DEFAULT_SEED,
        }
    }
}

impl SyntheticSpec {
    pub fn sine(frequency_hz: f64, amplitude: f64) -> Self {
        Self {
            pattern: SyntheticPattern::Sine,
            frequency_hz,
            amplitude,
            ..Self::default()
        }
    }

    pub fn white_noise(amplitude: f64, seed: u64) -> Self {
        Self {
            pattern: SyntheticPattern::WhiteNoise,
            noise_amplitude: amplitude,
            seed,
            ..Self::default()
        }
    }

    pub fn with_trend(mut self, offset: f64, trend_per_s: f64) -> Self {
        self.offset = offset;
        self.trend_per_s = trend_per_s;
        self
    }

    /// `duration_s · sample_rate` samples
    pub fn generate(&self, sample_rate: f64, duration_s: f64) -> Vec<f64> {
        let len = (duration_s * sample_rate).round().max(0.0) as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise_amplitude = self.noise_amplitude.abs();

        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate;
                let tone = (2.0 * PI * self.frequency_hz * t).sin() * self.amplitude;
                let mut noise = || {
                    if noise_amplitude > 0.0 {
                        rng.gen_range(-noise_amplitude..noise_amplitude)
                    } else {
                        0.0
                    }
                };
                let signal = match self.pattern {
                    SyntheticPattern::Sine => tone,
                    SyntheticPattern::WhiteNoise => noise(),
                    SyntheticPattern::Mixed => tone + noise(),
                };
                signal + self.offset + self.trend_per_s * t
            })
            .collect()
    }

    pub fn segment(
        &self,
        sample_rate: f64,
        duration_s: f64,
        start_time: DateTime<Utc>,
        channel: ChannelId,
    ) -> Result<WaveformSegment, PsdError> {
        WaveformSegment::new(
            self.generate(sample_rate, duration_s),
            sample_rate,
            start_time,
            channel,
        )
    }
}

/// E, N and Z segments of one station, each with its own noise seed
pub fn three_component(
    spec: &SyntheticSpec,
    sample_rate: f64,
    duration_s: f64,
    start_time: DateTime<Utc>,
    network: &str,
    station: &str,
) -> Result<Vec<WaveformSegment>, PsdError> {
    ["HHE", "HHN", "HHZ"]
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let component_spec = SyntheticSpec {
                seed: spec.seed.wrapping_add(i as u64),
                ..*spec
            };
            component_spec.segment(
                sample_rate,
                duration_s,
                start_time,
                ChannelId::new(network, station, "", code),
            )
        })
        .collect()
}

/// Write `segment` as a mono 32-bit integer WAV, samples rounded to counts
pub fn write_wav(path: &Path, segment: &WaveformSegment) -> Result<(), StoreError> {
    let sample_rate = segment.sample_rate();
    if sample_rate.fract() != 0.0 || sample_rate < 1.0 || sample_rate > f64::from(u32::MAX) {
        return Err(StoreError::write(
            path,
            format!("WAV needs an integer sample rate, got {}", sample_rate),
        ));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| StoreError::write(path, err))?;
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|err| StoreError::write(path, err))?;
    for &sample in segment.samples() {
        let count = sample.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
        writer
            .write_sample(count)
            .map_err(|err| StoreError::write(path, err))?;
    }
    writer.finalize().map_err(|err| StoreError::write(path, err))
}
