//! Local adapters for single-device deployment.

pub mod fs;

pub use fs::FsStorage;
