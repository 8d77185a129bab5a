//! In-memory container backend.
//!
//! Containers live in a shared map keyed by path. Used to exercise the merge
//! algorithm without real media files, and for dry runs of a recorder.

use crate::domain::av::track::{Sample, TrackInfo, TrackKind};
use crate::domain::errors::ContainerError;
use crate::ports::container::{ContainerBackend, Demuxer, Muxer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTrack {
    pub kind: TrackKind,
    /// Stand-in for a codec descriptor
    pub format: String,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryContainer {
    pub tracks: Vec<MemoryTrack>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, kind: TrackKind, format: &str, samples: Vec<Sample>) -> Self {
        self.tracks.push(MemoryTrack {
            kind,
            format: format.to_string(),
            samples,
        });
        self
    }

    /// Sync samples at each timestamp, the payload being the little-endian
    /// timestamp itself.
    pub fn samples_at(timestamps: &[i64]) -> Vec<Sample> {
        timestamps
            .iter()
            .map(|&pts| Sample::new(pts.to_le_bytes().to_vec(), pts).sync())
            .collect()
    }

    pub fn track(&self, kind: TrackKind) -> Option<&MemoryTrack> {
        self.tracks.iter().find(|track| track.kind == kind)
    }
}

#[derive(Debug, Default)]
struct Store {
    files: HashMap<PathBuf, MemoryContainer>,
    /// Reads fail once this many samples have been read from the container
    fail_after: HashMap<PathBuf, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryContainers {
    store: Arc<Mutex<Store>>,
}

impl MemoryContainers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, container: MemoryContainer) {
        self.lock().files.insert(path.into(), container);
    }

    pub fn get(&self, path: &Path) -> Option<MemoryContainer> {
        self.lock().files.get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }

    pub fn remove(&self, path: &Path) -> Option<MemoryContainer> {
        self.lock().files.remove(path)
    }

    /// Make reads of `path` fail after `samples` successful reads.
    pub fn fail_reads_after(&self, path: impl Into<PathBuf>, samples: usize) {
        self.lock().fail_after.insert(path.into(), samples);
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct MemoryDemuxer {
    path: PathBuf,
    tracks: Vec<TrackInfo<String>>,
    samples: Vec<Vec<Sample>>,
    cursors: Vec<usize>,
    reads: usize,
    fail_after: Option<usize>,
}

impl Demuxer for MemoryDemuxer {
    type Format = String;

    fn tracks(&self) -> &[TrackInfo<String>] {
        &self.tracks
    }

    fn rewind(&mut self, track: usize) -> Result<(), ContainerError> {
        let cursor = self
            .cursors
            .get_mut(track)
            .ok_or_else(|| ContainerError::Format(format!("no track {}", track)))?;
        *cursor = 0;
        Ok(())
    }

    fn read_sample(&mut self, track: usize) -> Result<Option<Sample>, ContainerError> {
        if self.fail_after.is_some_and(|limit| self.reads >= limit) {
            return Err(ContainerError::Format(format!(
                "corrupt sample in {}",
                self.path.display()
            )));
        }

        let samples = self
            .samples
            .get(track)
            .ok_or_else(|| ContainerError::Format(format!("no track {}", track)))?;
        let cursor = &mut self.cursors[track];
        let sample = samples.get(*cursor).cloned();
        if sample.is_some() {
            *cursor += 1;
            self.reads += 1;
        }
        Ok(sample)
    }
}

pub struct MemoryMuxer {
    store: MemoryContainers,
    path: PathBuf,
    container: MemoryContainer,
    started: bool,
}

impl Muxer for MemoryMuxer {
    type Format = String;

    fn add_track(&mut self, kind: TrackKind, format: &String) -> Result<usize, ContainerError> {
        if self.started {
            return Err(ContainerError::Format(
                "track table is fixed once writing starts".to_string(),
            ));
        }
        self.container.tracks.push(MemoryTrack {
            kind,
            format: format.clone(),
            samples: Vec::new(),
        });
        Ok(self.container.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<(), ContainerError> {
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &Sample) -> Result<(), ContainerError> {
        if !self.started {
            return Err(ContainerError::Format("muxer not started".to_string()));
        }
        self.container
            .tracks
            .get_mut(track)
            .ok_or_else(|| ContainerError::Format(format!("no output track {}", track)))?
            .samples
            .push(sample.clone());
        Ok(())
    }

    fn finish(self) -> Result<(), ContainerError> {
        if !self.started {
            return Err(ContainerError::Format("muxer not started".to_string()));
        }
        self.store.insert(self.path, self.container);
        Ok(())
    }
}

impl ContainerBackend for MemoryContainers {
    type Format = String;
    type Demuxer = MemoryDemuxer;
    type Muxer = MemoryMuxer;

    fn open(&self, path: &Path) -> Result<MemoryDemuxer, ContainerError> {
        let store = self.lock();
        let container = store
            .files
            .get(path)
            .ok_or_else(|| ContainerError::NotFound(path.to_path_buf()))?;

        Ok(MemoryDemuxer {
            path: path.to_path_buf(),
            tracks: container
                .tracks
                .iter()
                .enumerate()
                .map(|(index, track)| TrackInfo {
                    index,
                    kind: track.kind,
                    format: track.format.clone(),
                })
                .collect(),
            samples: container.tracks.iter().map(|t| t.samples.clone()).collect(),
            cursors: vec![0; container.tracks.len()],
            reads: 0,
            fail_after: store.fail_after.get(path).copied(),
        })
    }

    fn create(&self, path: &Path) -> Result<MemoryMuxer, ContainerError> {
        // Visible right away, like a freshly created file.
        self.insert(path, MemoryContainer::new());
        Ok(MemoryMuxer {
            store: self.clone(),
            path: path.to_path_buf(),
            container: MemoryContainer::new(),
            started: false,
        })
    }

    fn copy_verbatim(&self, from: &Path, to: &Path) -> Result<u64, ContainerError> {
        let container = self
            .get(from)
            .ok_or_else(|| ContainerError::NotFound(from.to_path_buf()))?;
        let bytes = container
            .tracks
            .iter()
            .flat_map(|track| track.samples.iter())
            .map(|sample| sample.data.len() as u64)
            .sum();
        self.insert(to, container);
        Ok(bytes)
    }

    fn discard(&self, path: &Path) -> Result<(), ContainerError> {
        self.remove(path);
        Ok(())
    }
}
