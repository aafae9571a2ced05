//! PULSEDAQ: Raw-data decoding core for nuclear-physics pulse digitizers
//!
//! This crate turns the binary buffers streamed by pulse digitizers into an
//! ordered sequence of uniform [`EventData`] records. Two incompatible wire
//! formats are supported: the 32-bit little-endian hierarchical format of the
//! first digitizer generation (DPP-PSD and DPP-PHA variants) and the 64-bit
//! big-endian flat format of the second generation.
//!
//! Decoding runs on a pool of worker threads behind a [`DecodePipeline`]:
//! the device-read layer calls [`DecodePipeline::submit`] with one transport
//! frame per [`RawBuffer`], and clients take decoded events in batches with
//! [`DecodePipeline::drain`]. Events within a single decoded buffer are
//! sorted by reconstructed timestamp before they are published.

pub mod error;
pub mod event;
pub mod pipeline;
pub mod raw;
pub mod reader;
pub mod validate;

mod dig1;
mod dig2;

pub use error::PipelineError;
pub use event::EventData;
pub use pipeline::{DecodePipeline, FirmwareKind};
pub use raw::{RawBuffer, SignalKind};
pub use validate::DecodeOutcome;
