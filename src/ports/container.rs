use crate::domain::av::track::{Sample, TrackInfo, TrackKind};
use crate::domain::errors::ContainerError;
use std::io::ErrorKind;
use std::path::Path;

/// Reads per-track samples out of one container.
pub trait Demuxer {
    /// Codec descriptor, opaque to the merger
    type Format;

    /// Video and audio tracks in container order.
    fn tracks(&self) -> &[TrackInfo<Self::Format>];

    /// Position `track` at its first sample.
    fn rewind(&mut self, track: usize) -> Result<(), ContainerError>;

    /// Next sample of `track`, or `None` once the track is exhausted.
    fn read_sample(&mut self, track: usize) -> Result<Option<Sample>, ContainerError>;
}

/// Writes samples into one container. The track table is fixed by `start`.
pub trait Muxer {
    type Format;

    /// Declare an output track. Only valid before `start`.
    fn add_track(&mut self, kind: TrackKind, format: &Self::Format)
        -> Result<usize, ContainerError>;

    fn start(&mut self) -> Result<(), ContainerError>;

    fn write_sample(&mut self, track: usize, sample: &Sample) -> Result<(), ContainerError>;

    fn finish(self) -> Result<(), ContainerError>;
}

/// Opens demuxers and creates muxers over one container implementation.
pub trait ContainerBackend {
    type Format;
    type Demuxer: Demuxer<Format = Self::Format>;
    type Muxer: Muxer<Format = Self::Format>;

    fn open(&self, path: &Path) -> Result<Self::Demuxer, ContainerError>;

    fn create(&self, path: &Path) -> Result<Self::Muxer, ContainerError>;

    /// Byte-for-byte copy, no demux or mux involved.
    fn copy_verbatim(&self, from: &Path, to: &Path) -> Result<u64, ContainerError> {
        if !from.exists() {
            return Err(ContainerError::NotFound(from.to_path_buf()));
        }
        Ok(std::fs::copy(from, to)?)
    }

    /// Remove a (possibly half-written) output. Missing output is not an error.
    fn discard(&self, path: &Path) -> Result<(), ContainerError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
