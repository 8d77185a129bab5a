//! Camstitch - multi-segment camera recording library
//!
//! A single logical recording may be written as several container segments
//! (one per encoder start/stop cycle, e.g. around a camera switch). This crate
//! tracks those segments and stitches them back into one container.
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (segments, merge algorithm, session state machine)
//! - ports/: Trait definitions (container demux/mux, encoder, storage, merge)
//! - adapters/: Concrete implementations (ffmpeg, in-memory, local filesystem)
//! - application/: The recorder actor and the finalize job
//! - config: Environment configuration
//!
//! # Features
//! - `ffmpeg` (default): ffmpeg-next container backend and the `stitch` binary

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::recorder::{Recorder, RecorderHandle};
pub use config::RecorderConfig;
pub use domain::av::merger::{MergeReport, SegmentMerger};
pub use domain::segment::{DeviceId, Segment};
pub use domain::session::{RecorderEvent, RecordingSession};

#[cfg(feature = "ffmpeg")]
pub use adapters::ffmpeg::FfmpegContainers;
