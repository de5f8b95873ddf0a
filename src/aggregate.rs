//! Statistics over many stored PSD results
//!
//! Probability density of the smoothed curves (summed per-bin histograms),
//! mean raw curves per time group, and a time/frequency matrix of smoothed
//! curves. Results whose frequency axis differs from the first one are
//! skipped with a warning. Statistics are only meaningful for one channel at
//! a time; [`channel_densities`] splits a mixed set first.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::psd::smoothing::{db_bin_edges, DB_BIN_COUNT, DB_MIN, DB_STEP};
use crate::store::StoredPsd;
use crate::waveform::ChannelId;

const AXIS_TOLERANCE: f64 = 1e-9;

fn same_axis(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= AXIS_TOLERANCE * x.abs().max(y.abs()))
}

/// Probability of each dB cell per smoothed frequency bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityDensity {
    pub frequencies: Vec<f64>,
    /// `DB_BIN_COUNT + 1` edges of the dB grid
    pub db_edges: Vec<f64>,
    /// One row per frequency, summing to 1 where any count exists
    pub probabilities: Vec<Vec<f64>>,
    pub counts: Vec<Vec<u64>>,
    pub result_count: usize,
    pub skipped: usize,
}

impl ProbabilityDensity {
    pub fn from_results<'a, I>(results: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a StoredPsd>,
    {
        let mut iter = results.into_iter();
        let first = iter.next()?;
        let frequencies = first.result.smoothed_frequencies.clone();
        let mut counts = vec![vec![0u64; DB_BIN_COUNT]; frequencies.len()];
        let mut result_count = 0;
        let mut skipped = 0;

        for stored in std::iter::once(first).chain(iter) {
            let result = &stored.result;
            if !same_axis(&frequencies, &result.smoothed_frequencies)
                || result.distribution.len() != frequencies.len()
            {
                log::warn!(
                    "Skipping {} {}: smoothed axis differs",
                    stored.channel,
                    stored.start_time
                );
                skipped += 1;
                continue;
            }
            for (row, dist) in counts.iter_mut().zip(&result.distribution) {
                for (cell, &count) in row.iter_mut().zip(dist) {
                    *cell += u64::from(count);
                }
            }
            result_count += 1;
        }

        let probabilities = counts
            .iter()
            .map(|row| {
                let total: u64 = row.iter().sum();
                let total = total.max(1) as f64;
                row.iter().map(|&c| c as f64 / total).collect()
            })
            .collect();

        Some(Self {
            frequencies,
            db_edges: db_bin_edges(),
            probabilities,
            counts,
            result_count,
            skipped,
        })
    }

    /// Centre of the most probable dB cell per frequency, `None` for empty rows
    pub fn mode_db(&self) -> Vec<Option<f64>> {
        self.counts
            .iter()
            .map(|row| {
                let (idx, &max) = row
                    .iter()
                    .enumerate()
                    .max_by_key(|&(_, &count)| count)?;
                (max > 0).then(|| DB_MIN + (idx as f64 + 0.5) * DB_STEP)
            })
            .collect()
    }

    /// dB cell centre below which `percentile` (0-100) of the counts lie
    pub fn percentile_db(&self, percentile: f64) -> Vec<Option<f64>> {
        let fraction = (percentile / 100.0).clamp(0.0, 1.0);
        self.counts
            .iter()
            .map(|row| {
                let total: u64 = row.iter().sum();
                if total == 0 {
                    return None;
                }
                let target = fraction * total as f64;
                let mut cumulative = 0u64;
                for (idx, &count) in row.iter().enumerate() {
                    cumulative += count;
                    if count > 0 && cumulative as f64 >= target {
                        return Some(DB_MIN + (idx as f64 + 0.5) * DB_STEP);
                    }
                }
                None
            })
            .collect()
    }
}

/// Mean raw curve of all results starting within one time group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMean {
    pub group_start: DateTime<Utc>,
    pub count: usize,
    pub frequencies: Vec<f64>,
    pub mean_power_db: Vec<f64>,
}

/// Average raw dB curves in buckets of `group_hours`, aligned to UTC midnight
///
/// A group length of 0 is treated as 1 hour.
pub fn group_mean_curves(results: &[StoredPsd], group_hours: u32) -> Vec<GroupMean> {
    let group_s = i64::from(group_hours.max(1)) * 3600;
    let mut groups: BTreeMap<i64, Vec<&StoredPsd>> = BTreeMap::new();
    for stored in results {
        let key = stored.start_time.timestamp().div_euclid(group_s) * group_s;
        groups.entry(key).or_default().push(stored);
    }

    groups
        .into_iter()
        .filter_map(|(key, members)| {
            let frequencies = members.first()?.result.frequencies.clone();
            let mut sum = vec![0.0; frequencies.len()];
            let mut count = 0;
            for stored in members {
                if !same_axis(&frequencies, &stored.result.frequencies) {
                    log::warn!(
                        "Skipping {} {} in group mean: frequency axis differs",
                        stored.channel,
                        stored.start_time
                    );
                    continue;
                }
                for (acc, value) in sum.iter_mut().zip(&stored.result.raw_power_db) {
                    *acc += value;
                }
                count += 1;
            }
            let group_start = DateTime::<Utc>::from_timestamp(key, 0)?;
            Some(GroupMean {
                group_start,
                count,
                frequencies,
                mean_power_db: sum.into_iter().map(|s| s / count as f64).collect(),
            })
        })
        .collect()
}

/// Smoothed curves stacked in time order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFrequencyMatrix {
    pub times: Vec<DateTime<Utc>>,
    pub frequencies: Vec<f64>,
    /// `values[t][f]` in dB
    pub values: Vec<Vec<f64>>,
}

pub fn time_frequency_matrix(results: &[StoredPsd]) -> Option<TimeFrequencyMatrix> {
    let mut ordered: Vec<&StoredPsd> = results.iter().collect();
    ordered.sort_by_key(|stored| stored.start_time);
    let frequencies = ordered.first()?.result.smoothed_frequencies.clone();

    let mut times = Vec::with_capacity(ordered.len());
    let mut values = Vec::with_capacity(ordered.len());
    for stored in ordered {
        if !same_axis(&frequencies, &stored.result.smoothed_frequencies) {
            log::warn!(
                "Skipping {} {} in time/frequency matrix: smoothed axis differs",
                stored.channel,
                stored.start_time
            );
            continue;
        }
        times.push(stored.start_time);
        values.push(stored.result.smoothed_power_db.clone());
    }

    Some(TimeFrequencyMatrix {
        times,
        frequencies,
        values,
    })
}

/// Results split by channel, in channel order
pub fn group_by_channel(results: &[StoredPsd]) -> BTreeMap<ChannelId, Vec<StoredPsd>> {
    let mut channels: BTreeMap<ChannelId, Vec<StoredPsd>> = BTreeMap::new();
    for stored in results {
        channels
            .entry(stored.channel.clone())
            .or_default()
            .push(stored.clone());
    }
    channels
}

/// Density and summary curves of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDensity {
    pub channel: ChannelId,
    pub density: ProbabilityDensity,
    pub mode_db: Vec<Option<f64>>,
    pub percentile_10_db: Vec<Option<f64>>,
    pub percentile_90_db: Vec<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_means: Option<Vec<GroupMean>>,
}

/// One [`ChannelDensity`] per channel present in `results`
pub fn channel_densities(results: &[StoredPsd], group_hours: Option<u32>) -> Vec<ChannelDensity> {
    group_by_channel(results)
        .into_iter()
        .filter_map(|(channel, members)| {
            let density = ProbabilityDensity::from_results(&members)?;
            Some(ChannelDensity {
                mode_db: density.mode_db(),
                percentile_10_db: density.percentile_db(10.0),
                percentile_90_db: density.percentile_db(90.0),
                group_means: group_hours.map(|hours| group_mean_curves(&members, hours)),
                channel,
                density,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PsdParameters;
    use crate::psd::smoothing::db_bin_index;
    use crate::psd::{NoiseComparison, PsdResult};
    use crate::waveform::ChannelId;
    use chrono::{Duration, TimeZone};

    fn stored_at(hour: i64, level_db: f64, bins: usize) -> StoredPsd {
        let frequencies: Vec<f64> = (1..=bins).map(|k| k as f64 * 0.1).collect();
        let mut distribution = vec![vec![0u32; DB_BIN_COUNT]; bins];
        if let Some(idx) = db_bin_index(level_db) {
            for row in distribution.iter_mut() {
                row[idx] = 2;
            }
        }
        let comparison = NoiseComparison {
            nlnm_db: vec![-170.0; bins],
            nhnm_db: vec![-110.0; bins],
            fraction_above_nhnm: 0.0,
            fraction_below_nlnm: 0.0,
        };
        StoredPsd {
            channel: ChannelId::new("XX", "ST01", "", "HHZ"),
            start_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour),
            duration_s: 3600.0,
            source: None,
            result: PsdResult {
                frequencies: frequencies.clone(),
                raw_power_db: vec![level_db; bins],
                smoothed_frequencies: frequencies,
                smoothed_power_db: vec![level_db; bins],
                distribution,
                noise: comparison.clone(),
                smoothed_noise: comparison,
                window_count: 1,
                resolution_hz: 0.1,
                sample_rate: 1.0,
                settings: PsdParameters::default(),
            },
        }
    }

    #[test]
    fn test_probability_rows_normalised() {
        let results = vec![
            stored_at(0, -140.5, 4),
            stored_at(1, -140.5, 4),
            stored_at(2, -120.5, 4),
        ];
        let pdf = ProbabilityDensity::from_results(&results).unwrap();
        assert_eq!(pdf.result_count, 3);
        assert_eq!(pdf.db_edges.len(), DB_BIN_COUNT + 1);
        for row in &pdf.probabilities {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
        let low = db_bin_index(-140.5).unwrap();
        assert!((pdf.probabilities[0][low] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(pdf.mode_db()[0], Some(-140.5));
        assert_eq!(pdf.percentile_db(90.0)[0], Some(-120.5));
    }

    #[test]
    fn test_mismatched_axis_skipped() {
        let results = vec![stored_at(0, -140.5, 4), stored_at(1, -140.5, 5)];
        let pdf = ProbabilityDensity::from_results(&results).unwrap();
        assert_eq!(pdf.result_count, 1);
        assert_eq!(pdf.skipped, 1);
        assert!(ProbabilityDensity::from_results(&Vec::<StoredPsd>::new()).is_none());
    }

    #[test]
    fn test_group_means_by_hours() {
        let results = vec![
            stored_at(0, -140.0, 3),
            stored_at(1, -120.0, 3),
            stored_at(2, -100.0, 3),
            stored_at(5, -90.0, 3),
        ];
        let groups = group_mean_curves(&results, 3);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].count, 3);
        assert!((groups[0].mean_power_db[0] + 120.0).abs() < 1e-12);
        assert_eq!(groups[1].group_start.timestamp() % (3 * 3600), 0);
        assert_eq!(groups[1].count, 1);

        let hourly = group_mean_curves(&results, 0);
        assert_eq!(hourly.len(), 4);
    }

    #[test]
    fn test_channels_kept_apart() {
        let mut east = stored_at(0, -100.5, 3);
        east.channel = ChannelId::new("XX", "ST01", "", "HHE");
        let results = vec![
            stored_at(0, -140.5, 3),
            east,
            stored_at(1, -140.5, 3),
        ];

        let grouped = group_by_channel(&results);
        let codes: Vec<&str> = grouped.keys().map(|id| id.channel.as_str()).collect();
        assert_eq!(codes, vec!["HHE", "HHZ"]);

        let densities = channel_densities(&results, Some(24));
        assert_eq!(densities.len(), 2);
        assert_eq!(densities[0].channel.channel, "HHE");
        assert_eq!(densities[0].density.result_count, 1);
        assert_eq!(densities[0].mode_db[0], Some(-100.5));
        assert_eq!(densities[1].density.result_count, 2);
        assert_eq!(densities[1].mode_db[0], Some(-140.5));
        assert_eq!(densities[1].group_means.as_ref().map(Vec::len), Some(1));
        assert!(channel_densities(&results, None)[0].group_means.is_none());
    }

    #[test]
    fn test_time_frequency_matrix_sorted() {
        let results = vec![stored_at(3, -100.0, 3), stored_at(1, -130.0, 3)];
        let matrix = time_frequency_matrix(&results).unwrap();
        assert!(matrix.times[0] < matrix.times[1]);
        assert_eq!(matrix.values[0][0], -130.0);
        assert_eq!(matrix.frequencies.len(), 3);
        assert!(time_frequency_matrix(&[]).is_none());
    }
}
