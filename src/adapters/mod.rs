//! Adapters - Concrete implementations of ports.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub mod local;
pub mod memory;
