// Window module - tapers applied to each Welch segment
//
// All windows are generated in their periodic (DFT-even) form, which is the
// convention for spectral averaging: a length-N periodic window is the
// symmetric window of length N + 1 with its last point dropped.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Flat-top coefficients (same family as the HP/National Instruments window)
const FLATTOP_COEFFS: [f64; 5] = [
    0.215_578_95,
    0.416_631_58,
    0.277_263_158,
    0.083_578_947,
    0.006_947_368,
];

/// Window function applied to each segment before the FFT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    #[default]
    Hann,
    Hamming,
    Blackman,
    Bartlett,
    Flattop,
    /// Rectangular window, no taper
    #[serde(alias = "rectangular")]
    Boxcar,
}

impl WindowType {
    pub const ALL: [WindowType; 6] = [
        WindowType::Hann,
        WindowType::Hamming,
        WindowType::Blackman,
        WindowType::Bartlett,
        WindowType::Flattop,
        WindowType::Boxcar,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WindowType::Hann => "hann",
            WindowType::Hamming => "hamming",
            WindowType::Blackman => "blackman",
            WindowType::Bartlett => "bartlett",
            WindowType::Flattop => "flattop",
            WindowType::Boxcar => "boxcar",
        }
    }

    /// Generate `len` periodic window coefficients
    pub fn coefficients(self, len: usize) -> Vec<f64> {
        if len == 0 {
            return Vec::new();
        }
        let n_total = len as f64;
        (0..len)
            .map(|i| {
                let x = 2.0 * PI * i as f64 / n_total;
                match self {
                    WindowType::Hann => 0.5 - 0.5 * x.cos(),
                    WindowType::Hamming => 0.54 - 0.46 * x.cos(),
                    WindowType::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
                    WindowType::Bartlett => {
                        let ratio = 2.0 * i as f64 / n_total;
                        if ratio <= 1.0 {
                            ratio
                        } else {
                            2.0 - ratio
                        }
                    }
                    WindowType::Flattop => FLATTOP_COEFFS
                        .iter()
                        .enumerate()
                        .map(|(k, &a)| {
                            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                            sign * a * (k as f64 * x).cos()
                        })
                        .sum(),
                    WindowType::Boxcar => 1.0,
                }
            })
            .collect()
    }
}

impl std::fmt::Display for WindowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pre-computed window with its power normalisation
#[derive(Debug, Clone)]
pub struct Window {
    pub coefficients: Vec<f64>,
    /// Sum of squared coefficients, the density-scaling denominator
    pub power: f64,
}

impl Window {
    pub fn new(window_type: WindowType, len: usize) -> Self {
        let coefficients = window_type.coefficients(len);
        let power = coefficients.iter().map(|w| w * w).sum();
        Self {
            coefficients,
            power,
        }
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_is_periodic() {
        let w = WindowType::Hann.coefficients(8);
        assert!(w[0].abs() < 1e-12);
        assert!((w[4] - 1.0).abs() < 1e-12);
        // periodic form: symmetric around index N/2, last point non-zero
        assert!((w[1] - w[7]).abs() < 1e-12);
        assert!(w[7] > 0.1);
    }

    #[test]
    fn test_boxcar_power_equals_length() {
        let window = Window::new(WindowType::Boxcar, 64);
        assert_eq!(window.len(), 64);
        assert!((window.power - 64.0).abs() < 1e-12);
    }

    #[test]
    fn test_hann_power() {
        // Σ hann² = 3N/8 for the periodic window
        let window = Window::new(WindowType::Hann, 1024);
        assert!((window.power - 3.0 * 1024.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_bartlett_peak_and_edges() {
        let w = WindowType::Bartlett.coefficients(10);
        assert_eq!(w[0], 0.0);
        assert!((w[5] - 1.0).abs() < 1e-12);
        assert!((w[2] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_flattop_peak_near_unity() {
        let w = WindowType::Flattop.coefficients(100);
        let peak = w.iter().cloned().fold(f64::MIN, f64::max);
        assert!((peak - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_all_windows_bounded() {
        for window_type in WindowType::ALL {
            let w = window_type.coefficients(257);
            assert_eq!(w.len(), 257);
            assert!(w.iter().all(|v| v.is_finite() && *v <= 1.0 + 1e-9 && *v >= -0.1));
        }
        assert!(WindowType::Hann.coefficients(0).is_empty());
    }

    #[test]
    fn test_serde_names() {
        let parsed: WindowType = serde_json::from_str("\"blackman\"").unwrap();
        assert_eq!(parsed, WindowType::Blackman);
        let parsed: WindowType = serde_json::from_str("\"rectangular\"").unwrap();
        assert_eq!(parsed, WindowType::Boxcar);
        assert_eq!(WindowType::Flattop.to_string(), "flattop");
    }
}
