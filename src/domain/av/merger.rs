//! Stitches independently encoded segments into one container.
//!
//! Track layout comes from the first segment: its first video track and its
//! first audio track are declared on the output, nothing else. Every later
//! segment contributes the samples of its own first track of each declared
//! kind, shifted by a running per-kind offset. The offset advances by the
//! last presentation timestamp actually copied from a segment, never by a
//! reported duration, since container duration metadata can lag the
//! encoded content.

use super::track::{first_of_kind, PerKind, TrackKind};
use crate::domain::errors::{ContainerError, MergeError};
use crate::domain::segment::Segment;
use crate::ports::container::{ContainerBackend, Demuxer, Muxer};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a merge produced, per declared track kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub segments: usize,
    /// Single segment copied byte for byte
    pub verbatim: bool,
    pub video: Option<KindReport>,
    pub audio: Option<KindReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindReport {
    pub samples: u64,
    /// Sum of the last presentation timestamps of every segment
    pub end_offset_us: i64,
}

impl MergeReport {
    pub fn kind(&self, kind: TrackKind) -> Option<&KindReport> {
        match kind {
            TrackKind::Video => self.video.as_ref(),
            TrackKind::Audio => self.audio.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SegmentMerger<B> {
    backend: B,
}

impl<B: ContainerBackend> SegmentMerger<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Merge `segments`, in order, into `output`.
    ///
    /// On failure nothing usable is left at `output`; the input segments are
    /// never touched.
    pub fn merge(&self, segments: &[Segment], output: &Path) -> Result<MergeReport, MergeError> {
        let result = match segments {
            [] => return Err(MergeError::NoSegments),
            [only] => self.copy_single(only, output),
            _ => self.stitch(segments, output),
        };

        if let Err(e) = &result {
            warn!("Merge into {:?} failed: {}", output, e);
            if let Err(discard) = self.backend.discard(output) {
                warn!("Could not remove partial output {:?}: {}", output, discard);
            }
        }
        result
    }

    fn copy_single(&self, only: &Segment, output: &Path) -> Result<MergeReport, MergeError> {
        let bytes = self
            .backend
            .copy_verbatim(&only.path, output)
            .map_err(|source| MergeError::Copy {
                from: only.path.clone(),
                to: output.to_path_buf(),
                source,
            })?;
        info!(
            segment = %only.path.display(),
            bytes,
            "Single segment copied verbatim to {:?}",
            output
        );
        Ok(MergeReport {
            segments: 1,
            verbatim: true,
            ..MergeReport::default()
        })
    }

    fn stitch(&self, segments: &[Segment], output: &Path) -> Result<MergeReport, MergeError> {
        let first = &segments[0];
        let first_demuxer = self
            .backend
            .open(&first.path)
            .map_err(|source| MergeError::Open {
                path: first.path.clone(),
                source,
            })?;

        let declared: Vec<_> = TrackKind::ORDER
            .iter()
            .filter_map(|&kind| first_of_kind(first_demuxer.tracks(), kind))
            .collect();
        if declared.is_empty() {
            return Err(MergeError::NoTracks(first.path.clone()));
        }

        let write_error = |source| MergeError::Write {
            path: output.to_path_buf(),
            source,
        };

        let mut muxer = self
            .backend
            .create(output)
            .map_err(|source| MergeError::Create {
                path: output.to_path_buf(),
                source,
            })?;

        let mut output_tracks: PerKind<Option<usize>> = PerKind::default();
        for track in declared {
            let index = muxer
                .add_track(track.kind, &track.format)
                .map_err(write_error)?;
            debug!(kind = %track.kind, source = track.index, output = index, "Declared output track");
            output_tracks[track.kind] = Some(index);
        }
        muxer.start().map_err(write_error)?;

        let mut offsets: PerKind<i64> = PerKind::default();
        let mut samples: PerKind<u64> = PerKind::default();
        let mut first_demuxer = Some(first_demuxer);

        for (index, segment) in segments.iter().enumerate() {
            let mut demuxer = match first_demuxer.take() {
                Some(demuxer) => demuxer,
                None => self
                    .backend
                    .open(&segment.path)
                    .map_err(|source| MergeError::Open {
                        path: segment.path.clone(),
                        source,
                    })?,
            };

            for kind in TrackKind::ORDER {
                let Some(output_track) = output_tracks[kind] else {
                    continue;
                };
                let Some(source_track) = first_of_kind(demuxer.tracks(), kind).map(|t| t.index)
                else {
                    debug!(segment = index, kind = %kind, "Segment has no track of this kind, skipping");
                    continue;
                };

                let copied = copy_track(
                    &mut demuxer,
                    source_track,
                    &mut muxer,
                    output_track,
                    offsets[kind],
                )
                .map_err(|failure| failure.into_merge_error(index, &segment.path, output))?;

                offsets[kind] += copied.last_presentation_us;
                samples[kind] += copied.samples;
            }

            info!(
                segment = index,
                video_offset_us = offsets.video,
                audio_offset_us = offsets.audio,
                "Merged segment {:?}",
                segment.path
            );
        }

        muxer.finish().map_err(|source| MergeError::Finish {
            path: output.to_path_buf(),
            source,
        })?;

        info!("Successfully merged {} segments into {:?}", segments.len(), output);

        let report_for = |kind: TrackKind| {
            output_tracks[kind].map(|_| KindReport {
                samples: samples[kind],
                end_offset_us: offsets[kind],
            })
        };

        Ok(MergeReport {
            segments: segments.len(),
            verbatim: false,
            video: report_for(TrackKind::Video),
            audio: report_for(TrackKind::Audio),
        })
    }
}

struct CopiedTrack {
    samples: u64,
    last_presentation_us: i64,
}

enum CopyFailure {
    Read(ContainerError),
    Write(ContainerError),
}

impl CopyFailure {
    fn into_merge_error(self, index: usize, segment: &Path, output: &Path) -> MergeError {
        match self {
            CopyFailure::Read(source) => MergeError::Read {
                index,
                path: PathBuf::from(segment),
                source,
            },
            CopyFailure::Write(source) => MergeError::Write {
                path: output.to_path_buf(),
                source,
            },
        }
    }
}

/// Copy every sample of `source_track`, shifted by `offset_us`. Samples with
/// a negative source timestamp are dropped.
fn copy_track<D, M>(
    demuxer: &mut D,
    source_track: usize,
    muxer: &mut M,
    output_track: usize,
    offset_us: i64,
) -> Result<CopiedTrack, CopyFailure>
where
    D: Demuxer,
    M: Muxer,
{
    demuxer.rewind(source_track).map_err(CopyFailure::Read)?;

    let mut copied = CopiedTrack {
        samples: 0,
        last_presentation_us: 0,
    };

    while let Some(sample) = demuxer.read_sample(source_track).map_err(CopyFailure::Read)? {
        if sample.presentation_time_us < 0 {
            debug!(pts = sample.presentation_time_us, "Dropping sample with negative timestamp");
            continue;
        }
        muxer
            .write_sample(output_track, &sample.shifted(offset_us))
            .map_err(CopyFailure::Write)?;
        copied.samples += 1;
        copied.last_presentation_us = sample.presentation_time_us;
    }

    Ok(copied)
}
