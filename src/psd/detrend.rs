// Detrend module - removal of mean and linear trend from a series

use crate::config::DetrendMode;

/// Remove the trend selected by `mode` in place
pub fn detrend_in_place(samples: &mut [f64], mode: DetrendMode) {
    remove_mean(samples);
    if mode == DetrendMode::Linear {
        remove_linear_trend(samples);
    }
}

/// Subtract the arithmetic mean
pub fn remove_mean(samples: &mut [f64]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    for sample in samples.iter_mut() {
        *sample -= mean;
    }
}

/// Subtract the least-squares straight line through the samples
///
/// The abscissa is centred on the middle sample so the normal equations
/// decouple and slope and intercept are computed independently.
pub fn remove_linear_trend(samples: &mut [f64]) {
    let n = samples.len();
    if n < 2 {
        remove_mean(samples);
        return;
    }

    let centre = (n as f64 - 1.0) / 2.0;
    let mean = samples.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &y) in samples.iter().enumerate() {
        let x = i as f64 - centre;
        sxy += x * (y - mean);
        sxx += x * x;
    }
    let slope = sxy / sxx;

    for (i, sample) in samples.iter_mut().enumerate() {
        *sample -= mean + slope * (i as f64 - centre);
    }
}
