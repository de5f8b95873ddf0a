//! Waveform model
//!
//! A [`WaveformSegment`] is the uniform in-memory record every reader
//! produces: evenly spaced samples, the sampling rate, a UTC start time and
//! the SEED-style channel identity. Readers for concrete file formats live in
//! [`reader`]; [`name_parser`] recovers identity and start time from project
//! file names.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PsdError;

pub mod name_parser;
pub mod reader;

pub use name_parser::{extract_timestamp, FileNameParser, ParsedName};
pub use reader::{AsciiReader, ReaderRegistry, WavReader, WaveformReader};

/// Relative spacing error tolerated by [`WaveformSegment::from_timestamps`]
pub const SAMPLING_TOLERANCE: f64 = 0.01;

/// Ground-motion component, from the last letter of the channel code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    East,
    North,
    Vertical,
    Other(char),
}

impl Component {
    pub fn from_channel_code(code: &str) -> Option<Self> {
        let last = code.trim().chars().last()?;
        Some(match last.to_ascii_uppercase() {
            'E' | '2' => Component::East,
            'N' | '1' => Component::North,
            'Z' | '3' => Component::Vertical,
            other => Component::Other(other),
        })
    }

    pub fn letter(&self) -> char {
        match self {
            Component::East => 'E',
            Component::North => 'N',
            Component::Vertical => 'Z',
            Component::Other(c) => *c,
        }
    }
}

/// Network / station / location / channel codes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ChannelId {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl ChannelId {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
        }
    }

    pub fn component(&self) -> Option<Component> {
        Component::from_channel_code(&self.channel)
    }

    /// Relative `NET/STA/LOC/CHA` directory, empty codes skipped
    pub fn folder_path(&self) -> PathBuf {
        [&self.network, &self.station, &self.location, &self.channel]
            .into_iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// One uniformly sampled, single-component recording
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformSegment {
    samples: Vec<f64>,
    sample_rate: f64,
    start_time: DateTime<Utc>,
    channel: ChannelId,
}

impl WaveformSegment {
    pub fn new(
        samples: Vec<f64>,
        sample_rate: f64,
        start_time: DateTime<Utc>,
        channel: ChannelId,
    ) -> Result<Self, PsdError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PsdError::InvalidSampleRate { sample_rate });
        }
        Ok(Self {
            samples,
            sample_rate,
            start_time,
            channel,
        })
    }

    /// Build from per-sample times in seconds, checking uniform spacing
    ///
    /// The nominal interval is the mean spacing; every interval must stay
    /// within [`SAMPLING_TOLERANCE`] of it.
    pub fn from_timestamps(
        samples: Vec<f64>,
        times_s: &[f64],
        start_time: DateTime<Utc>,
        channel: ChannelId,
    ) -> Result<Self, PsdError> {
        if times_s.len() != samples.len() || times_s.len() < 2 {
            return Err(PsdError::SegmentTooShort {
                samples: times_s.len().min(samples.len()),
                required: 2,
            });
        }
        let span = times_s[times_s.len() - 1] - times_s[0];
        let expected = span / (times_s.len() - 1) as f64;
        if !expected.is_finite() || expected <= 0.0 {
            return Err(PsdError::InvalidSampleRate {
                sample_rate: 1.0 / expected,
            });
        }
        for (index, pair) in times_s.windows(2).enumerate() {
            let actual = pair[1] - pair[0];
            if ((actual - expected) / expected).abs() > SAMPLING_TOLERANCE {
                return Err(PsdError::NonUniformSampling {
                    index: index + 1,
                    expected_s: expected,
                    actual_s: actual,
                });
            }
        }
        Self::new(samples, 1.0 / expected, start_time, channel)
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + seconds(self.duration_s())
    }

    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn component(&self) -> Option<Component> {
        self.channel.component()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Cut into consecutive pieces of `piece_s` seconds; a short tail is dropped
    pub fn split(&self, piece_s: f64) -> Vec<WaveformSegment> {
        let piece_len = (piece_s * self.sample_rate).round() as usize;
        if piece_len == 0 {
            return Vec::new();
        }
        self.samples
            .chunks_exact(piece_len)
            .enumerate()
            .map(|(i, chunk)| WaveformSegment {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                start_time: self.start_time + seconds((i * piece_len) as f64 / self.sample_rate),
                channel: self.channel.clone(),
            })
            .collect()
    }
}

fn seconds(value: f64) -> Duration {
    Duration::microseconds((value * 1e6).round() as i64)
}
