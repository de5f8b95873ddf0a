// Seismic PSD toolkit
// Welch power spectral densities of seismometer recordings, smoothed in
// fractional octaves and compared against the Peterson noise models.

// Module declarations
pub mod aggregate;
pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod psd;
pub mod store;
pub mod testing;
pub mod waveform;

// Re-exports for convenience
pub use aggregate::{
    channel_densities, group_by_channel, group_mean_curves, time_frequency_matrix, ChannelDensity,
    ProbabilityDensity,
};
pub use batch::{BatchEvent, BatchReport, BatchRunner};
pub use config::{AppConfig, BatchConfig, InstrumentParams, PsdConfig, PsdParameters};
pub use error::{ErrorCode, PsdError, StoreError};
pub use psd::{NoiseModels, PsdEngine, PsdResult};
pub use store::{PsdStore, StoredPsd};
pub use waveform::{ChannelId, ReaderRegistry, WaveformSegment};
