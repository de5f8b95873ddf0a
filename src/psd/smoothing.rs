// Smoothing module - fractional-octave averaging in the period domain
//
// Bins are laid out on periods, starting at the shortest period of the
// spectrum and advancing by `step` octaves while the centre stays within the
// longest period. Each bin spans `bandwidth` octaves around its geometric
// centre and carries the mean dB value of the raw bins it covers. Alongside
// the smoothed curve every bin gets a histogram of the raw dB values on a
// fixed 1 dB grid, the input of probability-density statistics.

use serde::{Deserialize, Serialize};

use crate::error::PsdError;

/// Lower edge of the dB histogram grid
pub const DB_MIN: f64 = -200.0;
/// Upper edge of the dB histogram grid
pub const DB_MAX: f64 = -50.0;
pub const DB_STEP: f64 = 1.0;
/// Number of histogram cells between [`DB_MIN`] and [`DB_MAX`]
pub const DB_BIN_COUNT: usize = 150;

/// Narrowest bin step accepted by configuration, in octaves
pub const MIN_OCTAVE_STEP: f64 = 1.0 / 1024.0;
/// Upper bound on the number of smoothing bins of one spectrum
pub const MAX_SMOOTHING_BINS: usize = 100_000;

const EDGE_TOLERANCE: f64 = 1e-9;

/// One smoothing bin, expressed in frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OctaveBin {
    pub centre_hz: f64,
    pub low_hz: f64,
    pub high_hz: f64,
}

impl OctaveBin {
    pub fn centre_period(&self) -> f64 {
        1.0 / self.centre_hz
    }

    fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.low_hz * (1.0 - EDGE_TOLERANCE) && freq_hz <= self.high_hz * (1.0 + EDGE_TOLERANCE)
    }
}

/// Smoothed curve and per-bin distribution, ascending in frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSpectrum {
    pub bins: Vec<OctaveBin>,
    pub power_db: Vec<f64>,
    /// Bins with no raw value inside, filled by interpolation
    pub interpolated: Vec<bool>,
    /// `DB_BIN_COUNT` counts per bin
    pub distribution: Vec<Vec<u32>>,
}

impl SmoothedSpectrum {
    pub fn frequencies(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| bin.centre_hz).collect()
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Number of bins whose centres span `[freq_low, freq_high]` at `step_octaves`
///
/// Non-decreasing as the step narrows.
pub fn octave_bin_count(freq_low: f64, freq_high: f64, step_octaves: f64) -> usize {
    if !(freq_low > 0.0 && freq_high >= freq_low && step_octaves > 0.0) {
        return 0;
    }
    let octaves = (freq_high / freq_low).log2();
    (octaves / step_octaves + EDGE_TOLERANCE).floor() as usize + 1
}

/// Bin layout between `freq_low` and `freq_high`, ascending in frequency
pub fn period_bins(
    freq_low: f64,
    freq_high: f64,
    bandwidth_octaves: f64,
    step_octaves: f64,
) -> Vec<OctaveBin> {
    let count = octave_bin_count(freq_low, freq_high, step_octaves);
    let shortest_period = 1.0 / freq_high;
    let half_width = 2f64.powf(bandwidth_octaves / 2.0);

    let mut bins: Vec<OctaveBin> = (0..count)
        .map(|k| {
            let centre_period = shortest_period * 2f64.powf(k as f64 * step_octaves);
            OctaveBin {
                centre_hz: 1.0 / centre_period,
                low_hz: 1.0 / (centre_period * half_width),
                high_hz: 1.0 / (centre_period / half_width),
            }
        })
        .collect();
    bins.reverse();
    bins
}

/// Index of `db` on the histogram grid, `None` outside `[DB_MIN, DB_MAX)`
pub fn db_bin_index(db: f64) -> Option<usize> {
    if !db.is_finite() || db < DB_MIN || db >= DB_MAX {
        return None;
    }
    Some((((db - DB_MIN) / DB_STEP).floor() as usize).min(DB_BIN_COUNT - 1))
}

/// Lower edges of the histogram cells plus the closing upper edge
pub fn db_bin_edges() -> Vec<f64> {
    (0..=DB_BIN_COUNT)
        .map(|i| DB_MIN + i as f64 * DB_STEP)
        .collect()
}

/// Linear interpolation of `values` against log10 of `axis`
///
/// `axis` must be ascending and positive; outside it the edge value is held.
pub fn log_interp(axis: &[f64], values: &[f64], at: f64) -> f64 {
    let n = axis.len().min(values.len());
    if n == 0 {
        return f64::NAN;
    }
    if at <= axis[0] {
        return values[0];
    }
    if at >= axis[n - 1] {
        return values[n - 1];
    }
    let upper = axis[..n].partition_point(|&x| x < at);
    let lower = upper - 1;
    let (x0, x1) = (axis[lower].log10(), axis[upper].log10());
    let t = if x1 > x0 { (at.log10() - x0) / (x1 - x0) } else { 0.0 };
    values[lower] + t * (values[upper] - values[lower])
}

/// Fractional-octave smoothing of a dB spectrum
///
/// `frequencies` must be ascending, positive and aligned with `power_db`.
pub fn smooth(
    frequencies: &[f64],
    power_db: &[f64],
    bandwidth_octaves: f64,
    step_octaves: f64,
) -> Result<SmoothedSpectrum, PsdError> {
    if frequencies.len() != power_db.len() {
        return Err(PsdError::degenerate(
            "smoothing",
            format!(
                "{} frequencies for {} power values",
                frequencies.len(),
                power_db.len()
            ),
        ));
    }
    let (Some(&freq_low), Some(&freq_high)) = (frequencies.first(), frequencies.last()) else {
        return Err(PsdError::degenerate("smoothing", "empty spectrum"));
    };
    if freq_low <= 0.0 {
        return Err(PsdError::degenerate(
            "smoothing",
            "frequency axis must be strictly positive",
        ));
    }

    let count = octave_bin_count(freq_low, freq_high, step_octaves);
    if count == 0 || count > MAX_SMOOTHING_BINS {
        return Err(PsdError::degenerate(
            "smoothing",
            format!(
                "{} bins for a {} octave step (limit {})",
                count, step_octaves, MAX_SMOOTHING_BINS
            ),
        ));
    }
    let bins = period_bins(freq_low, freq_high, bandwidth_octaves, step_octaves);
    let mut smoothed = Vec::with_capacity(bins.len());
    let mut interpolated = Vec::with_capacity(bins.len());
    let mut distribution = Vec::with_capacity(bins.len());

    for bin in &bins {
        let start = frequencies.partition_point(|&f| f < bin.low_hz * (1.0 - EDGE_TOLERANCE));
        let mut counts = vec![0u32; DB_BIN_COUNT];
        let mut sum = 0.0;
        let mut members = 0usize;
        for (&freq, &db) in frequencies[start..].iter().zip(&power_db[start..]) {
            if !bin.contains(freq) {
                break;
            }
            sum += db;
            members += 1;
            if let Some(idx) = db_bin_index(db) {
                counts[idx] += 1;
            }
        }

        let value = if members > 0 {
            interpolated.push(false);
            sum / members as f64
        } else {
            interpolated.push(true);
            let value = log_interp(frequencies, power_db, bin.centre_hz);
            if let Some(idx) = db_bin_index(value) {
                counts[idx] += 1;
            }
            value
        };

        if !value.is_finite() {
            return Err(PsdError::degenerate(
                "smoothing",
                format!("non-finite value at {:.6} Hz", bin.centre_hz),
            ));
        }
        smoothed.push(value);
        distribution.push(counts);
    }

    Ok(SmoothedSpectrum {
        bins,
        power_db: smoothed,
        interpolated,
        distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_axis(df: f64, bins: usize) -> Vec<f64> {
        (1..=bins).map(|k| k as f64 * df).collect()
    }

    #[test]
    fn test_bin_count_grows_as_bandwidth_narrows() {
        let mut previous = 0;
        for bandwidth in [2.0, 1.0, 0.5, 1.0 / 3.0, 0.25, 0.125] {
            let count = octave_bin_count(0.001, 50.0, bandwidth * 0.125);
            assert!(count >= previous, "{} < {}", count, previous);
            previous = count;
        }
    }

    #[test]
    fn test_bin_count_exact_octaves() {
        // 1 .. 16 Hz is four octaves: centres at 0, 1, 2, 3, 4
        assert_eq!(octave_bin_count(1.0, 16.0, 1.0), 5);
        assert_eq!(octave_bin_count(1.0, 16.0, 0.5), 9);
        assert_eq!(octave_bin_count(1.0, 1.0, 0.5), 1);
        assert_eq!(octave_bin_count(0.0, 1.0, 0.5), 0);
    }

    #[test]
    fn test_period_bins_ascending_and_anchored() {
        let bins = period_bins(1.0, 16.0, 1.0, 1.0);
        assert_eq!(bins.len(), 5);
        assert!((bins[0].centre_hz - 1.0).abs() < 1e-12);
        assert!((bins[4].centre_hz - 16.0).abs() < 1e-12);
        assert!(bins.windows(2).all(|w| w[0].centre_hz < w[1].centre_hz));
        // one octave wide around the centre
        assert!((bins[2].high_hz / bins[2].low_hz - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_smoothed_length_matches_bin_count() {
        let freqs = linear_axis(0.01, 5000);
        let power: Vec<f64> = freqs.iter().map(|_| -120.0).collect();
        let smoothed = smooth(&freqs, &power, 1.0, 0.125).unwrap();
        assert_eq!(
            smoothed.len(),
            octave_bin_count(freqs[0], freqs[freqs.len() - 1], 0.125)
        );
        assert!(smoothed.power_db.iter().all(|&v| (v + 120.0).abs() < 1e-9));
        assert_eq!(smoothed.distribution.len(), smoothed.len());
    }

    #[test]
    fn test_empty_bins_are_interpolated() {
        // sparse axis: narrow bins at the low end contain no raw bins
        let freqs = vec![1.0, 4.0, 16.0];
        let power = vec![-100.0, -110.0, -120.0];
        let smoothed = smooth(&freqs, &power, 0.25, 0.25).unwrap();
        assert!(smoothed.interpolated.iter().any(|&flag| flag));
        let idx = smoothed
            .bins
            .iter()
            .position(|bin| (bin.centre_hz - 2.0).abs() < 1e-9)
            .unwrap();
        assert!(smoothed.interpolated[idx]);
        assert!((smoothed.power_db[idx] + 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_distribution_counts_raw_values() {
        let freqs = linear_axis(0.5, 64);
        let power: Vec<f64> = freqs.iter().map(|_| -99.5).collect();
        let smoothed = smooth(&freqs, &power, 1.0, 0.5).unwrap();
        let cell = db_bin_index(-99.5).unwrap();
        for (row, flag) in smoothed.distribution.iter().zip(&smoothed.interpolated) {
            assert!(row[cell] >= 1);
            if *flag {
                assert_eq!(row.iter().sum::<u32>(), 1);
            }
        }
    }

    #[test]
    fn test_db_grid() {
        assert_eq!(db_bin_edges().len(), DB_BIN_COUNT + 1);
        assert_eq!(db_bin_index(-200.0), Some(0));
        assert_eq!(db_bin_index(-50.5), Some(DB_BIN_COUNT - 1));
        assert_eq!(db_bin_index(-50.0), None);
        assert_eq!(db_bin_index(-250.0), None);
        assert_eq!(db_bin_index(f64::NAN), None);
    }

    #[test]
    fn test_log_interp_edges() {
        let axis = [1.0, 10.0, 100.0];
        let values = [0.0, 10.0, 20.0];
        assert_eq!(log_interp(&axis, &values, 0.1), 0.0);
        assert_eq!(log_interp(&axis, &values, 1000.0), 20.0);
        assert!((log_interp(&axis, &values, 10f64.sqrt()) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_bin_count_limit() {
        let freqs = linear_axis(0.001, 10_000);
        let db = vec![-120.0; freqs.len()];
        let err = smooth(&freqs, &db, 1e-9, 1e-10).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Numerical);
        assert!(octave_bin_count(0.001, 10.0, MIN_OCTAVE_STEP) <= MAX_SMOOTHING_BINS);
    }

    #[test]
    fn test_rejects_mismatched_input() {
        assert!(smooth(&[1.0, 2.0], &[-100.0], 1.0, 0.125).is_err());
        assert!(smooth(&[], &[], 1.0, 0.125).is_err());
        assert!(smooth(&[0.0, 1.0], &[-100.0, -100.0], 1.0, 0.125).is_err());
    }
}
