use crate::domain::av::track::{Sample, TrackInfo, TrackKind};
use crate::domain::errors::ContainerError;
use crate::ports::container::Demuxer;
use bytes::Bytes;
use ffmpeg::{codec, format, media, rescale, Rational, Rescale};
use ffmpeg_next as ffmpeg;
use std::path::Path;
use tracing::debug;

pub struct FfmpegDemuxer {
    input: format::context::Input,
    tracks: Vec<TrackInfo<codec::Parameters>>,
    /// Indexed by stream index
    time_bases: Vec<Rational>,
}

impl FfmpegDemuxer {
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        if !path.exists() {
            return Err(ContainerError::NotFound(path.to_path_buf()));
        }

        let input = format::input(&path)?;
        let mut tracks = Vec::new();
        let mut time_bases = Vec::new();

        for stream in input.streams() {
            time_bases.push(stream.time_base());
            let parameters = stream.parameters();
            let kind = match parameters.medium() {
                media::Type::Video => TrackKind::Video,
                media::Type::Audio => TrackKind::Audio,
                other => {
                    debug!(stream = stream.index(), "Ignoring {:?} stream in {:?}", other, path);
                    continue;
                }
            };
            tracks.push(TrackInfo {
                index: stream.index(),
                kind,
                format: parameters,
            });
        }

        Ok(Self {
            input,
            tracks,
            time_bases,
        })
    }

    fn time_base(&self, track: usize) -> Result<Rational, ContainerError> {
        self.time_bases
            .get(track)
            .copied()
            .ok_or_else(|| ContainerError::Format(format!("no stream {}", track)))
    }
}

impl Demuxer for FfmpegDemuxer {
    type Format = codec::Parameters;

    fn tracks(&self) -> &[TrackInfo<codec::Parameters>] {
        &self.tracks
    }

    fn rewind(&mut self, _track: usize) -> Result<(), ContainerError> {
        // Seeking with stream -1 moves every stream back to the start.
        self.input.seek(0, ..)?;
        Ok(())
    }

    fn read_sample(&mut self, track: usize) -> Result<Option<Sample>, ContainerError> {
        let time_base = self.time_base(track)?;
        let to_us = |ts: i64| ts.rescale(time_base, rescale::TIME_BASE);

        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            if packet.stream() != track {
                continue;
            }
            let Some(pts) = packet.pts().or(packet.dts()) else {
                debug!(stream = track, "Skipping packet without timestamps");
                continue;
            };

            return Ok(Some(Sample {
                data: Bytes::copy_from_slice(packet.data().unwrap_or_default()),
                presentation_time_us: to_us(pts),
                decode_time_us: packet.dts().map(to_us),
                duration_us: to_us(packet.duration()),
                flags: packet.flags().bits() as u32,
                is_sync: packet.is_key(),
            }));
        }
    }
}
