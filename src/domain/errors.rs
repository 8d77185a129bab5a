//! Error types shared by the domain, ports and adapters.

use super::session::state::StateKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a demux/mux primitive.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container format error: {0}")]
    Format(String),

    #[error("Container not found: {0}")]
    NotFound(PathBuf),
}

/// Failure while stitching segments. Always fatal for the whole merge.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("No segments to merge")]
    NoSegments,

    #[error("First segment {0} has neither a video nor an audio track")]
    NoTracks(PathBuf),

    #[error("Failed to open segment {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("Failed to create output {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("Failed to read segment {index} ({path}): {source}")]
    Read {
        index: usize,
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("Failed to write output {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("Failed to finalize output {path}: {source}")]
    Finish {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("Merge task failed: {0}")]
    Task(String),
}

/// Device or hardware failure during a segment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncoderError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("Encoder stopped unexpectedly: {0}")]
    Stopped(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// An intent or callback arrived in a state that does not expect it.
/// Recovered by ignoring the event; the session state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{operation} is not valid while {state}")]
    InvalidState {
        operation: &'static str,
        state: StateKind,
    },

    #[error("A camera switch is already pending")]
    SwitchPending,

    #[error("{0} arrived with no outstanding request")]
    Unexpected(&'static str),

    #[error("Recorder is no longer running")]
    Closed,
}
