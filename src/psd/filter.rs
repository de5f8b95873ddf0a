// Filter module - zero-phase Butterworth high-pass / band-pass filtering
//
// Designs are built from the analog Butterworth prototype, mapped with the
// bilinear transform (cutoffs pre-warped) and stored as second-order
// sections. Filtering runs forward then backward over an odd-extended copy
// of the data, each pass seeded with steady-state section states, so the
// output has zero phase and keeps the input's sample count.
//
// A band-pass is a high-pass cascaded with a low-pass of the same order, not
// a single band design. Both match in the pass band; near the edges of a
// narrow band the cascade attenuates more, since each half also rolls off
// at the other edge.

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::config::FilterSpec;
use crate::error::PsdError;

/// Butterworth order used for both high-pass and band-pass designs
pub const FILTER_ORDER: usize = 5;

/// One second-order section, `a0` normalised to 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 2],
}

impl Biquad {
    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    fn is_first_order(&self) -> bool {
        self.b[2] == 0.0 && self.a[1] == 0.0
    }

    /// Transposed direct-form II state reached after a constant unit input
    fn steady_state(&self) -> [f64; 2] {
        let gain = self.dc_gain();
        [gain - self.b[0], self.b[2] - self.a[1] * gain]
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b[0] + z_inv * self.b[1] + z_inv2 * self.b[2];
        let den = Complex64::new(1.0, 0.0) + z_inv * self.a[0] + z_inv2 * self.a[1];
        num / den
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Low,
    High,
}

/// Cascade of second-order sections applied with zero phase
#[derive(Debug, Clone)]
pub struct ZeroPhaseFilter {
    sections: Vec<Biquad>,
}

impl ZeroPhaseFilter {
    /// Design the filter described by `spec`, `None` when filtering is off
    pub fn from_spec(spec: FilterSpec, sample_rate: f64) -> Result<Option<Self>, PsdError> {
        let nyquist = sample_rate / 2.0;
        let check = |cutoff: f64| {
            if cutoff > 0.0 && cutoff < nyquist {
                Ok(())
            } else {
                Err(PsdError::InvalidFilter {
                    reason: format!(
                        "cutoff {} Hz must lie between 0 and Nyquist ({} Hz)",
                        cutoff, nyquist
                    ),
                })
            }
        };

        match spec {
            FilterSpec::None => Ok(None),
            FilterSpec::HighPass { cutoff_hz } => {
                check(cutoff_hz)?;
                Ok(Some(Self {
                    sections: butterworth(FILTER_ORDER, cutoff_hz, sample_rate, Band::High),
                }))
            }
            FilterSpec::BandPass { low_hz, high_hz } => {
                check(low_hz)?;
                check(high_hz)?;
                // high-pass then low-pass, each of FILTER_ORDER
                let mut sections = butterworth(FILTER_ORDER, low_hz, sample_rate, Band::High);
                sections.extend(butterworth(FILTER_ORDER, high_hz, sample_rate, Band::Low));
                Ok(Some(Self { sections }))
            }
        }
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Magnitude of a single forward pass at `freq_hz`
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / sample_rate;
        let z_inv = Complex64::new(omega.cos(), -omega.sin());
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, section| {
                acc * section.response(z_inv)
            })
            .norm()
    }

    /// Edge extension length, mirroring the usual `3 * (2 * sections + 1)` rule
    fn pad_len(&self, len: usize) -> usize {
        let first_order = self
            .sections
            .iter()
            .filter(|section| section.is_first_order())
            .count();
        let wanted = 3 * (2 * self.sections.len() + 1 - first_order);
        wanted.min(len.saturating_sub(1))
    }

    /// Forward-backward filtering; output has the input's length
    pub fn apply(&self, data: &[f64]) -> Vec<f64> {
        if data.len() < 2 {
            return data.to_vec();
        }

        let pad = self.pad_len(data.len());
        let extended = odd_extension(data, pad);

        let mut forward = self.run_cascade(&extended);
        forward.reverse();
        let mut backward = self.run_cascade(&forward);
        backward.reverse();

        backward[pad..pad + data.len()].to_vec()
    }

    fn run_cascade(&self, input: &[f64]) -> Vec<f64> {
        let mut signal = input.to_vec();
        let mut level = input[0];
        for section in &self.sections {
            let [zi1, zi2] = section.steady_state();
            let mut z1 = zi1 * level;
            let mut z2 = zi2 * level;
            for sample in signal.iter_mut() {
                let x = *sample;
                let y = section.b[0] * x + z1;
                z1 = section.b[1] * x - section.a[0] * y + z2;
                z2 = section.b[2] * x - section.a[1] * y;
                *sample = y;
            }
            level *= section.dc_gain();
        }
        signal
    }
}

/// Reflect the series about its end points: `2·x[0] − x[pad..1]` etc.
fn odd_extension(data: &[f64], pad: usize) -> Vec<f64> {
    let n = data.len();
    let first = data[0];
    let last = data[n - 1];
    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
    extended.extend_from_slice(data);
    extended.extend((1..=pad).map(|i| 2.0 * last - data[n - 1 - i]));
    extended
}

/// Butterworth sections via bilinear transform with pre-warped cutoff
fn butterworth(order: usize, cutoff_hz: f64, sample_rate: f64, band: Band) -> Vec<Biquad> {
    let k = (PI * cutoff_hz / sample_rate).tan();
    let k2 = k * k;
    let mut sections = Vec::with_capacity(order.div_ceil(2));

    for pair in 0..order / 2 {
        // prototype pole pair -a ± jb on the unit circle
        let a = (PI * (2 * pair + 1) as f64 / (2 * order) as f64).sin();
        let d = 1.0 + 2.0 * a * k + k2;
        let den = [2.0 * (k2 - 1.0) / d, (1.0 - 2.0 * a * k + k2) / d];
        let b = match band {
            Band::Low => [k2 / d, 2.0 * k2 / d, k2 / d],
            Band::High => [1.0 / d, -2.0 / d, 1.0 / d],
        };
        sections.push(Biquad { b, a: den });
    }

    if order % 2 == 1 {
        let d = 1.0 + k;
        let den = [(k - 1.0) / d, 0.0];
        let b = match band {
            Band::Low => [k / d, k / d, 0.0],
            Band::High => [1.0 / d, -1.0 / d, 0.0],
        };
        sections.push(Biquad { b, a: den });
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn rms(data: &[f64]) -> f64 {
        (data.iter().map(|x| x * x).sum::<f64>() / data.len() as f64).sqrt()
    }

    #[test]
    fn test_no_filter_when_disabled() {
        assert!(ZeroPhaseFilter::from_spec(FilterSpec::None, 100.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_cutoff_beyond_nyquist_rejected() {
        let err = ZeroPhaseFilter::from_spec(FilterSpec::HighPass { cutoff_hz: 60.0 }, 100.0)
            .unwrap_err();
        assert!(matches!(err, PsdError::InvalidFilter { .. }));

        let err = ZeroPhaseFilter::from_spec(
            FilterSpec::BandPass {
                low_hz: 1.0,
                high_hz: 50.0,
            },
            100.0,
        )
        .unwrap_err();
        assert!(matches!(err, PsdError::InvalidFilter { .. }));
    }

    #[test]
    fn test_highpass_design_response() {
        let filter = ZeroPhaseFilter::from_spec(FilterSpec::HighPass { cutoff_hz: 1.0 }, 100.0)
            .unwrap()
            .unwrap();
        assert_eq!(filter.sections().len(), 3);
        // -3 dB at the cutoff, unity in the pass band, strong rejection below
        let at_cutoff = filter.magnitude_at(1.0, 100.0);
        assert!((at_cutoff - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((filter.magnitude_at(20.0, 100.0) - 1.0).abs() < 1e-3);
        assert!(filter.magnitude_at(0.1, 100.0) < 1e-4);
    }

    #[test]
    fn test_bandpass_design_response() {
        let filter = ZeroPhaseFilter::from_spec(
            FilterSpec::BandPass {
                low_hz: 1.0,
                high_hz: 10.0,
            },
            100.0,
        )
        .unwrap()
        .unwrap();
        assert_eq!(filter.sections().len(), 6);
        assert!((filter.magnitude_at(3.0, 100.0) - 1.0).abs() < 0.01);
        assert!(filter.magnitude_at(0.1, 100.0) < 1e-3);
        assert!(filter.magnitude_at(40.0, 100.0) < 1e-3);
    }

    #[test]
    fn test_bandpass_edges_of_cascade() {
        let band = |low_hz, high_hz| {
            ZeroPhaseFilter::from_spec(FilterSpec::BandPass { low_hz, high_hz }, 100.0)
                .unwrap()
                .unwrap()
        };
        // wide band: each edge sees only its own half, -3 dB
        let wide = band(1.0, 10.0);
        assert!((wide.magnitude_at(1.0, 100.0) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3);

        // narrow band: the low-pass half already rolls off at the lower edge
        let narrow = band(1.0, 1.2);
        let at_edge = narrow.magnitude_at(1.0, 100.0);
        assert!(at_edge < std::f64::consts::FRAC_1_SQRT_2 - 0.02, "edge gain {}", at_edge);
        assert!(at_edge > 0.5);
    }

    #[test]
    fn test_apply_preserves_length_and_removes_low_band() {
        let fs = 100.0;
        let n = 4000;
        let low = sine(0.05, fs, n);
        let high = sine(5.0, fs, n);
        let mixed: Vec<f64> = low.iter().zip(&high).map(|(a, b)| a + b).collect();

        let filter = ZeroPhaseFilter::from_spec(FilterSpec::HighPass { cutoff_hz: 1.0 }, fs)
            .unwrap()
            .unwrap();
        let filtered = filter.apply(&mixed);
        assert_eq!(filtered.len(), mixed.len());

        // compare away from the edges
        let interior = 500..3500;
        let residual: Vec<f64> = filtered[interior.clone()]
            .iter()
            .zip(&high[interior.clone()])
            .map(|(a, b)| a - b)
            .collect();
        assert!(rms(&residual) < 0.02, "residual rms {}", rms(&residual));
    }

    #[test]
    fn test_zero_phase_keeps_peak_alignment() {
        let fs = 50.0;
        let tone = sine(2.0, fs, 2000);
        let filter = ZeroPhaseFilter::from_spec(
            FilterSpec::BandPass {
                low_hz: 0.5,
                high_hz: 10.0,
            },
            fs,
        )
        .unwrap()
        .unwrap();
        let filtered = filter.apply(&tone);
        let max_diff = filtered[400..1600]
            .iter()
            .zip(&tone[400..1600])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(max_diff < 0.02, "max diff {}", max_diff);
    }

    #[test]
    fn test_odd_extension() {
        let data = [1.0, 2.0, 4.0, 7.0];
        let extended = odd_extension(&data, 2);
        assert_eq!(extended, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 7.0, 10.0, 12.0]);
    }

    #[test]
    fn test_short_input_passthrough() {
        let filter = ZeroPhaseFilter::from_spec(FilterSpec::HighPass { cutoff_hz: 1.0 }, 100.0)
            .unwrap()
            .unwrap();
        assert_eq!(filter.apply(&[3.0]), vec![3.0]);
        assert_eq!(filter.apply(&[1.0, 2.0, 3.0]).len(), 3);
    }
}
