use crate::domain::av::track::{Sample, TrackKind};
use crate::domain::errors::ContainerError;
use crate::ports::container::Muxer;
use ffmpeg::{codec, format, rescale, Rescale};
use ffmpeg_next as ffmpeg;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FfmpegMuxer {
    output: format::context::Output,
    path: PathBuf,
    /// Last decode timestamp written per output stream, in stream time base
    last_dts: Vec<Option<i64>>,
    started: bool,
}

impl FfmpegMuxer {
    pub fn create(path: &Path, container_format: &str) -> Result<Self, ContainerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let output = format::output_as(&path, container_format)?;

        Ok(Self {
            output,
            path: path.to_path_buf(),
            last_dts: Vec::new(),
            started: false,
        })
    }
}

impl Muxer for FfmpegMuxer {
    type Format = codec::Parameters;

    fn add_track(
        &mut self,
        kind: TrackKind,
        format: &codec::Parameters,
    ) -> Result<usize, ContainerError> {
        if self.started {
            return Err(ContainerError::Format(
                "track table is fixed once writing starts".to_string(),
            ));
        }

        let mut stream = self
            .output
            .add_stream(ffmpeg::encoder::find(codec::Id::None))?;
        stream.set_parameters(format.clone());
        let index = stream.index();
        self.last_dts.push(None);

        debug!(stream = index, "Added {} stream to {:?}", kind, self.path);
        Ok(index)
    }

    fn start(&mut self) -> Result<(), ContainerError> {
        self.output.write_header()?;
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &Sample) -> Result<(), ContainerError> {
        let time_base = self
            .output
            .stream(track)
            .ok_or_else(|| ContainerError::Format(format!("no output stream {}", track)))?
            .time_base();
        let from_us = |us: i64| us.rescale(rescale::TIME_BASE, time_base);

        let mut pts = from_us(sample.presentation_time_us);
        let mut dts = sample.decode_time_us.map(from_us).unwrap_or(pts);

        // The boundary sample of a segment lands on the previous segment's
        // last timestamp and the muxer needs strictly increasing dts. A pts
        // behind its dts is invalid, so pts moves up with a bumped dts.
        if let Some(last) = self.last_dts.get(track).copied().flatten() {
            if dts <= last {
                dts = last + 1;
                pts = pts.max(dts);
            }
        }
        if let Some(slot) = self.last_dts.get_mut(track) {
            *slot = Some(dts);
        }

        let mut packet = ffmpeg::Packet::copy(&sample.data);
        packet.set_stream(track);
        packet.set_pts(Some(pts));
        packet.set_dts(Some(dts));
        packet.set_duration(from_us(sample.duration_us));
        packet.set_position(-1);
        packet.set_flags(codec::packet::Flags::from_bits_truncate(sample.flags as i32));
        packet.write_interleaved(&mut self.output)?;
        Ok(())
    }

    fn finish(mut self) -> Result<(), ContainerError> {
        if !self.started {
            return Err(ContainerError::Format("muxer not started".to_string()));
        }
        self.output.write_trailer()?;
        Ok(())
    }
}
