//! Test and demo data utilities.
//!
//! Deterministic synthetic waveforms used by unit tests, the integration
//! suite and the `psd_cli synth` command.

pub mod synthetic;

pub use synthetic::{three_component, write_wav, SyntheticPattern, SyntheticSpec, DEFAULT_SEED};
