// Welch module - averaged, windowed periodogram estimate
//
// The series is cut into windows of `window_samples` advancing by
// `step = window_samples - floor(overlap * window_samples)`. Each window has
// its mean removed, is tapered, transformed and its one-sided power density
// accumulated. Samples after the last complete window are dropped, never
// zero-padded, so the window count is `floor((n - L) / step) + 1`.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::PsdError;
use crate::psd::window::{Window, WindowType};

/// Fewest samples a Welch window may span
pub const MIN_WINDOW_SAMPLES: usize = 2;

/// Averaged one-sided power spectral density
#[derive(Debug, Clone)]
pub struct WelchEstimate {
    /// Bin frequencies in Hz, `0 ..= fs/2`
    pub frequencies: Vec<f64>,
    /// Power density in (unit)²/Hz
    pub power: Vec<f64>,
    /// Number of windows averaged
    pub window_count: usize,
    /// Frequency spacing `fs / window_samples`
    pub resolution_hz: f64,
    pub window_samples: usize,
}

/// Window length and hop for a segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    pub window_samples: usize,
    pub step: usize,
    pub window_count: usize,
}

impl SegmentLayout {
    /// Layout of `series_len` samples, or an error when the window does not fit
    pub fn new(
        series_len: usize,
        window_samples: usize,
        overlap_fraction: f64,
    ) -> Result<Self, PsdError> {
        if window_samples < MIN_WINDOW_SAMPLES {
            return Err(PsdError::WindowTooShort {
                window_samples,
                required: MIN_WINDOW_SAMPLES,
            });
        }
        if !(0.0..1.0).contains(&overlap_fraction) {
            return Err(PsdError::InvalidOverlap {
                overlap: overlap_fraction,
            });
        }
        if window_samples > series_len {
            return Err(PsdError::WindowExceedsSegment {
                window_samples,
                segment_samples: series_len,
            });
        }

        let overlap_samples = (overlap_fraction * window_samples as f64).floor() as usize;
        let step = (window_samples - overlap_samples).max(1);
        let window_count = (series_len - window_samples) / step + 1;

        Ok(Self {
            window_samples,
            step,
            window_count,
        })
    }

    /// Start offsets of every averaged window
    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.window_count).map(move |i| i * self.step)
    }

    /// Samples at the tail that no window covers
    pub fn dropped_tail(&self, series_len: usize) -> usize {
        let covered = (self.window_count - 1) * self.step + self.window_samples;
        series_len - covered
    }
}

/// Number of samples in a window of `window_length_s` seconds
pub fn window_samples(window_length_s: f64, sample_rate: f64) -> usize {
    (window_length_s * sample_rate).floor().max(0.0) as usize
}

/// Welch estimate of `series` sampled at `sample_rate`
pub fn estimate(
    series: &[f64],
    sample_rate: f64,
    window_samples: usize,
    overlap_fraction: f64,
    window_type: WindowType,
) -> Result<WelchEstimate, PsdError> {
    let layout = SegmentLayout::new(series.len(), window_samples, overlap_fraction)?;
    let n = layout.window_samples;
    let window = Window::new(window_type, n);
    if window.power <= 0.0 {
        return Err(PsdError::degenerate("windowing", "window has zero energy"));
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let bins = n / 2 + 1;
    let mut accum = vec![0.0f64; bins];
    let mut buffer: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); n];

    for offset in layout.offsets() {
        let segment = &series[offset..offset + n];
        let mean = segment.iter().sum::<f64>() / n as f64;
        for ((slot, &sample), &w) in buffer.iter_mut().zip(segment).zip(&window.coefficients) {
            *slot = Complex::new((sample - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (acc, value) in accum.iter_mut().zip(&buffer[..bins]) {
            *acc += value.norm_sqr();
        }
    }

    let scale = 1.0 / (sample_rate * window.power * layout.window_count as f64);
    let nyquist_bin = if n % 2 == 0 { Some(bins - 1) } else { None };
    let power: Vec<f64> = accum
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            let one_sided = if k == 0 || Some(k) == nyquist_bin {
                1.0
            } else {
                2.0
            };
            p * scale * one_sided
        })
        .collect();

    let resolution_hz = sample_rate / n as f64;
    let frequencies = (0..bins).map(|k| k as f64 * resolution_hz).collect();

    Ok(WelchEstimate {
        frequencies,
        power,
        window_count: layout.window_count,
        resolution_hz,
        window_samples: n,
    })
}
