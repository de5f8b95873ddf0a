//! Reference noise models
//!
//! Peterson (1993) New Low / New High Noise Models, defined piecewise as
//! `PSD(P) = A + B·log10(P)` dB re 1 (m/s²)²/Hz over period segments. The
//! curves can be replaced by a tabulated JSON dataset with the keys
//! `model_periods`, `low_noise` and `high_noise`.
//!
//! The models are process-wide read-only state: [`install`] may set them
//! once at startup, [`global`] hands out the installed set or the embedded
//! Peterson curves.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::psd::smoothing::log_interp;

const NLNM_PERIODS: [f64; 22] = [
    0.10, 0.17, 0.40, 0.80, 1.24, 2.40, 4.30, 5.00, 6.00, 10.00, 12.00, 15.60, 21.90, 31.60,
    45.00, 70.00, 101.00, 154.00, 328.00, 600.00, 10000.0, 100000.0,
];
const NLNM_A: [f64; 21] = [
    -162.36, -166.7, -170.00, -166.40, -168.60, -159.98, -141.10, -71.36, -97.26, -132.18,
    -205.27, -37.65, -114.37, -160.58, -187.50, -216.47, -185.00, -168.34, -217.43, -258.28,
    -346.88,
];
const NLNM_B: [f64; 21] = [
    5.64, 0.00, -8.30, 28.90, 52.48, 29.81, 0.00, -99.77, -66.49, -31.57, 36.16, -104.33,
    -47.10, -16.28, 0.00, 15.70, 0.00, -7.61, 11.90, 26.60, 48.75,
];

const NHNM_PERIODS: [f64; 12] = [
    0.10, 0.22, 0.32, 0.80, 3.80, 4.60, 6.30, 7.90, 15.40, 20.00, 354.80, 100000.0,
];
const NHNM_A: [f64; 11] = [
    -108.73, -150.34, -122.31, -116.85, -108.48, -74.66, 0.66, -93.37, 73.54, -151.52, -206.66,
];
const NHNM_B: [f64; 11] = [
    -17.23, -80.50, -23.87, 32.51, 18.08, -32.95, -127.18, -22.42, -162.98, 10.01, 31.63,
];

static MODELS: OnceCell<Arc<NoiseModels>> = OnceCell::new();

/// Install the process-wide models; fails if already set
pub fn install(models: NoiseModels) -> Result<(), NoiseModels> {
    MODELS
        .set(Arc::new(models))
        .map_err(|rejected| Arc::try_unwrap(rejected).unwrap_or_else(|shared| (*shared).clone()))
}

/// Process-wide models, the embedded Peterson curves unless [`install`]ed
pub fn global() -> Arc<NoiseModels> {
    Arc::clone(MODELS.get_or_init(|| Arc::new(NoiseModels::peterson())))
}

/// Piecewise `A + B·log10(P)` definition
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseModel {
    periods: &'static [f64],
    a: &'static [f64],
    b: &'static [f64],
}

impl PiecewiseModel {
    /// dB at `period` seconds; outside the defined range the edge value is held
    pub fn db_at_period(&self, period: f64) -> f64 {
        let first = self.periods[0];
        let last = self.periods[self.periods.len() - 1];
        let period = period.clamp(first, last);
        let segment = self
            .periods
            .partition_point(|&p| p <= period)
            .saturating_sub(1)
            .min(self.a.len() - 1);
        self.a[segment] + self.b[segment] * period.log10()
    }

    pub fn period_range(&self) -> (f64, f64) {
        (self.periods[0], self.periods[self.periods.len() - 1])
    }
}

/// One reference curve
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseCurve {
    Piecewise(PiecewiseModel),
    /// Ascending periods with dB values, interpolated in log-period
    Tabulated { periods: Vec<f64>, values_db: Vec<f64> },
}

impl NoiseCurve {
    pub fn db_at_period(&self, period: f64) -> f64 {
        match self {
            NoiseCurve::Piecewise(model) => model.db_at_period(period),
            NoiseCurve::Tabulated { periods, values_db } => log_interp(periods, values_db, period),
        }
    }

    pub fn db_at_frequency(&self, freq_hz: f64) -> f64 {
        self.db_at_period(1.0 / freq_hz)
    }

    pub fn sample(&self, frequencies: &[f64]) -> Vec<f64> {
        frequencies
            .iter()
            .map(|&freq| self.db_at_frequency(freq))
            .collect()
    }
}

/// Tabulated dataset as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseModelTable {
    pub model_periods: Vec<f64>,
    pub low_noise: Vec<f64>,
    pub high_noise: Vec<f64>,
}

/// Reference curves sampled on a result's frequency axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseComparison {
    pub nlnm_db: Vec<f64>,
    pub nhnm_db: Vec<f64>,
    /// Share of bins louder than the high-noise model
    pub fraction_above_nhnm: f64,
    /// Share of bins quieter than the low-noise model
    pub fraction_below_nlnm: f64,
}

/// NLNM and NHNM pair
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseModels {
    low: NoiseCurve,
    high: NoiseCurve,
    source: String,
}

impl NoiseModels {
    /// Embedded Peterson (1993) curves
    pub fn peterson() -> Self {
        Self {
            low: NoiseCurve::Piecewise(PiecewiseModel {
                periods: &NLNM_PERIODS,
                a: &NLNM_A,
                b: &NLNM_B,
            }),
            high: NoiseCurve::Piecewise(PiecewiseModel {
                periods: &NHNM_PERIODS,
                a: &NHNM_A,
                b: &NHNM_B,
            }),
            source: "peterson-1993".to_string(),
        }
    }

    pub fn from_table(table: NoiseModelTable, source: impl Into<String>) -> Result<Self, String> {
        let n = table.model_periods.len();
        if n < 2 {
            return Err(format!("need at least two model periods, got {}", n));
        }
        if table.low_noise.len() != n || table.high_noise.len() != n {
            return Err(format!(
                "{} periods but {} low / {} high values",
                n,
                table.low_noise.len(),
                table.high_noise.len()
            ));
        }
        if table
            .model_periods
            .windows(2)
            .any(|w| !(w[0] > 0.0 && w[1] > w[0]))
        {
            return Err("model periods must be positive and strictly ascending".to_string());
        }
        if table
            .low_noise
            .iter()
            .chain(&table.high_noise)
            .any(|v| !v.is_finite())
        {
            return Err("noise values must be finite".to_string());
        }

        Ok(Self {
            low: NoiseCurve::Tabulated {
                periods: table.model_periods.clone(),
                values_db: table.low_noise,
            },
            high: NoiseCurve::Tabulated {
                periods: table.model_periods,
                values_db: table.high_noise,
            },
            source: source.into(),
        })
    }

    /// Load a tabulated dataset from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| StoreError::read(path, err))?;
        let table: NoiseModelTable =
            serde_json::from_str(&contents).map_err(|err| StoreError::malformed(path, err))?;
        let models = Self::from_table(table, path.display().to_string())
            .map_err(|reason| StoreError::malformed(path, reason))?;
        log::info!("Loaded noise models from {}", path.display());
        Ok(models)
    }

    pub fn low(&self) -> &NoiseCurve {
        &self.low
    }

    pub fn high(&self) -> &NoiseCurve {
        &self.high
    }

    /// Where the curves came from, `peterson-1993` or a file path
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Tabulate both curves at `periods`
    pub fn table_at(&self, periods: &[f64]) -> NoiseModelTable {
        NoiseModelTable {
            model_periods: periods.to_vec(),
            low_noise: periods.iter().map(|&p| self.low.db_at_period(p)).collect(),
            high_noise: periods.iter().map(|&p| self.high.db_at_period(p)).collect(),
        }
    }

    /// Sample both curves at `frequencies` and rate `power_db` against them
    pub fn compare(&self, frequencies: &[f64], power_db: &[f64]) -> NoiseComparison {
        let nlnm_db = self.low.sample(frequencies);
        let nhnm_db = self.high.sample(frequencies);

        let total = power_db.len().min(frequencies.len());
        let (mut above, mut below) = (0usize, 0usize);
        for ((&p, &low), &high) in power_db.iter().zip(&nlnm_db).zip(&nhnm_db) {
            if p > high {
                above += 1;
            }
            if p < low {
                below += 1;
            }
        }
        let fraction = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };

        NoiseComparison {
            fraction_above_nhnm: fraction(above),
            fraction_below_nlnm: fraction(below),
            nlnm_db,
            nhnm_db,
        }
    }
}

impl Default for NoiseModels {
    fn default() -> Self {
        Self::peterson()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nlnm_known_values() {
        let models = NoiseModels::peterson();
        // flat segment between 0.17 s and 0.4 s
        assert!((models.low().db_at_period(0.2) + 166.7).abs() < 1e-9);
        // minimum of the low-noise model near 30 s
        let at_30 = models.low().db_at_period(30.0);
        assert!((at_30 - (-114.37 - 47.10 * 30f64.log10())).abs() < 1e-9);
        assert!(at_30 < -180.0);
    }

    #[test]
    fn test_nhnm_known_values() {
        let models = NoiseModels::peterson();
        let at_1 = models.high().db_at_period(1.0);
        assert!((at_1 + 116.85).abs() < 1e-9);
        let at_100 = models.high().db_at_period(100.0);
        assert!((at_100 - (-151.52 + 10.01 * 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_high_above_low_everywhere() {
        let models = NoiseModels::peterson();
        let mut period = 0.1;
        while period <= 100000.0 {
            assert!(
                models.high().db_at_period(period) > models.low().db_at_period(period),
                "crossing at {} s",
                period
            );
            period *= 1.1;
        }
    }

    #[test]
    fn test_edge_value_held_outside_range() {
        let models = NoiseModels::peterson();
        let edge = models.low().db_at_period(0.1);
        assert_eq!(models.low().db_at_period(0.01), edge);
        assert_eq!(models.low().db_at_frequency(100.0), edge);
        let far = models.high().db_at_period(100000.0);
        assert_eq!(models.high().db_at_period(1e7), far);
    }

    #[test]
    fn test_compare_fractions() {
        let models = NoiseModels::peterson();
        let freqs = [0.1, 1.0, 10.0];
        let loud = vec![-50.0; 3];
        let comparison = models.compare(&freqs, &loud);
        assert_eq!(comparison.nlnm_db.len(), 3);
        assert_eq!(comparison.fraction_above_nhnm, 1.0);
        assert_eq!(comparison.fraction_below_nlnm, 0.0);

        let quiet = vec![-250.0; 3];
        let comparison = models.compare(&freqs, &quiet);
        assert_eq!(comparison.fraction_below_nlnm, 1.0);
    }

    #[test]
    fn test_tabulated_models() {
        let table = NoiseModelTable {
            model_periods: vec![1.0, 10.0, 100.0],
            low_noise: vec![-170.0, -180.0, -190.0],
            high_noise: vec![-110.0, -120.0, -130.0],
        };
        let models = NoiseModels::from_table(table, "test").unwrap();
        assert!((models.low().db_at_period(10f64.sqrt()) + 175.0).abs() < 1e-9);
        assert_eq!(models.high().db_at_period(1000.0), -130.0);
        assert_eq!(models.source(), "test");
    }

    #[test]
    fn test_tabulated_validation() {
        let bad_len = NoiseModelTable {
            model_periods: vec![1.0, 10.0],
            low_noise: vec![-170.0],
            high_noise: vec![-110.0, -120.0],
        };
        assert!(NoiseModels::from_table(bad_len, "x").is_err());

        let descending = NoiseModelTable {
            model_periods: vec![10.0, 1.0],
            low_noise: vec![-170.0, -180.0],
            high_noise: vec![-110.0, -120.0],
        };
        assert!(NoiseModels::from_table(descending, "x").is_err());
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("noise_models_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("models.json");
        let table = NoiseModels::peterson().table_at(&[0.1, 1.0, 10.0, 100.0]);
        fs::write(&path, serde_json::to_string(&table).unwrap()).unwrap();

        let loaded = NoiseModels::from_json_file(&path).unwrap();
        assert!((loaded.low().db_at_period(10.0) - NoiseModels::peterson().low().db_at_period(10.0)).abs() < 1e-9);

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            NoiseModels::from_json_file(&path),
            Err(StoreError::Malformed { .. })
        ));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_global_defaults_to_peterson() {
        assert!(!global().source().is_empty());
    }
}
