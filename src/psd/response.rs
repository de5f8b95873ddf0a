// Response module - instrument transfer function and unit conversion
//
// The sensor is modelled as a damped second-order system with
// H(s) = s² / (s² + 2ζω₀s + ω₀²), ω₀ = 2π / T₀. Removing the response divides
// the power by |H(jω)|², which lifts the spectrum below the natural period.

use std::f64::consts::PI;

use crate::config::{InstrumentParams, InstrumentType};
use crate::error::PsdError;

/// |H(jω)|² of the seismometer at `freq_hz`
pub fn response_power(freq_hz: f64, instrument: &InstrumentParams) -> f64 {
    let omega = 2.0 * PI * freq_hz;
    let omega0 = 2.0 * PI / instrument.natural_period;
    let omega2 = omega * omega;
    let real = omega0 * omega0 - omega2;
    let imag = 2.0 * instrument.damping_ratio * omega0 * omega;
    omega2 * omega2 / (real * real + imag * imag)
}

/// Divide `power` by the instrument's squared magnitude response
pub fn remove_response(
    frequencies: &[f64],
    power: &[f64],
    instrument: &InstrumentParams,
) -> Result<Vec<f64>, PsdError> {
    instrument.validate()?;
    frequencies
        .iter()
        .zip(power)
        .map(|(&freq, &p)| {
            let gain = response_power(freq, instrument);
            if gain > 0.0 && gain.is_finite() {
                Ok(p / gain)
            } else {
                Err(PsdError::degenerate(
                    "response removal",
                    format!("instrument response vanishes at {} Hz", freq),
                ))
            }
        })
        .collect()
}

/// Express power in acceleration units, (m/s²)²/Hz
///
/// Velocity spectra are multiplied by ω²; acceleration spectra are returned
/// unchanged.
pub fn to_acceleration(frequencies: &[f64], power: &[f64], instrument_type: InstrumentType) -> Vec<f64> {
    match instrument_type {
        InstrumentType::Acceleration => power.to_vec(),
        InstrumentType::Velocity => frequencies
            .iter()
            .zip(power)
            .map(|(&freq, &p)| {
                let omega = 2.0 * PI * freq;
                p * omega * omega
            })
            .collect(),
    }
}

/// Convert linear power to dB, rejecting zero and non-finite bins
pub fn to_decibels(frequencies: &[f64], power: &[f64]) -> Result<Vec<f64>, PsdError> {
    frequencies
        .iter()
        .zip(power)
        .map(|(&freq, &p)| {
            if p > 0.0 && p.is_finite() {
                Ok(10.0 * p.log10())
            } else {
                Err(PsdError::degenerate(
                    "decibel conversion",
                    format!("power {} at {} Hz", p, freq),
                ))
            }
        })
        .collect()
}
