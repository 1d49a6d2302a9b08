//! Track-geometry restoration: band-limited waveform restoration, plan-line
//! generation and tamping-machine movement planning.

pub mod data;
pub mod error;
pub mod pipeline;

pub use data::model::{Channel, ChannelSeries, MovementRecord, Sample, Series};
pub use error::{Result, TrackError, Warning};
pub use pipeline::{run, PipelineConfig, PipelineOutput};
