//! ffmpeg-next container backend.
//!
//! Stream copy only: packets move from demuxer to muxer untouched apart from
//! their timestamps, no decoder or encoder is ever opened.

pub mod demux;
pub mod mux;

use crate::domain::errors::ContainerError;
use crate::ports::container::ContainerBackend;
use demux::FfmpegDemuxer;
use ffmpeg::codec;
use ffmpeg_next as ffmpeg;
use mux::FfmpegMuxer;
use std::path::Path;

impl From<ffmpeg::Error> for ContainerError {
    fn from(err: ffmpeg::Error) -> Self {
        ContainerError::Format(err.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct FfmpegContainers {
    container_format: String,
}

impl FfmpegContainers {
    /// `container_format` is the muxer short name, e.g. `mp4`.
    pub fn new(container_format: impl Into<String>) -> Self {
        Self {
            container_format: container_format.into(),
        }
    }
}

impl Default for FfmpegContainers {
    fn default() -> Self {
        Self::new("mp4")
    }
}

impl ContainerBackend for FfmpegContainers {
    type Format = codec::Parameters;
    type Demuxer = FfmpegDemuxer;
    type Muxer = FfmpegMuxer;

    fn open(&self, path: &Path) -> Result<FfmpegDemuxer, ContainerError> {
        ffmpeg::init()?;
        FfmpegDemuxer::open(path)
    }

    fn create(&self, path: &Path) -> Result<FfmpegMuxer, ContainerError> {
        ffmpeg::init()?;
        FfmpegMuxer::create(path, &self.container_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::av::merger::SegmentMerger;
    use crate::domain::errors::MergeError;
    use crate::domain::av::track::{Sample, TrackKind};
    use crate::domain::segment::Segment;
    use crate::ports::container::{Demuxer, Muxer};
    use ffmpeg::{encoder, format, frame, rescale, ChannelLayout, Rational, Rescale};
    use std::path::PathBuf;
    use tempfile::tempdir;

    const VIDEO_FRAMES: i64 = 5;
    const AUDIO_FRAMES: i64 = 4;
    const AUDIO_RATE: i32 = 8000;
    /// 50ms of mono audio per frame
    const AUDIO_FRAME_SAMPLES: usize = 400;

    /// Drain every packet the encoder has ready into samples in microseconds.
    fn drain(encoder: &mut encoder::Encoder, time_base: Rational, samples: &mut Vec<Sample>) {
        let to_us = |ts: i64| ts.rescale(time_base, rescale::TIME_BASE);
        let mut packet = ffmpeg::Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            let pts = packet.pts().unwrap();
            samples.push(Sample {
                data: packet.data().unwrap_or_default().to_vec().into(),
                presentation_time_us: to_us(pts),
                decode_time_us: packet.dts().map(to_us),
                duration_us: to_us(packet.duration()),
                flags: packet.flags().bits() as u32,
                is_sync: packet.is_key(),
            });
        }
    }

    /// Write a short matroska segment: 25fps mpeg4 video and 8kHz PCM audio.
    fn write_segment(path: &Path) {
        ffmpeg::init().unwrap();
        let mut muxer = FfmpegMuxer::create(path, "matroska").unwrap();

        let video_codec = encoder::find(codec::Id::MPEG4).unwrap();
        let mut video = codec::context::Context::new_with_codec(video_codec)
            .encoder()
            .video()
            .unwrap();
        video.set_width(64);
        video.set_height(48);
        video.set_format(format::Pixel::YUV420P);
        video.set_time_base((1, 25));
        video.set_frame_rate(Some((25, 1)));
        video.set_flags(codec::Flags::GLOBAL_HEADER);
        let mut video = video.open_with(ffmpeg::Dictionary::new()).unwrap();

        let audio_codec = encoder::find(codec::Id::PCM_S16LE).unwrap();
        let mut audio = codec::context::Context::new_with_codec(audio_codec)
            .encoder()
            .audio()
            .unwrap();
        audio.set_rate(AUDIO_RATE);
        audio.set_format(format::Sample::I16(format::sample::Type::Packed));
        audio.set_channel_layout(ChannelLayout::MONO);
        audio.set_time_base((1, AUDIO_RATE));
        let mut audio = audio.open_with(ffmpeg::Dictionary::new()).unwrap();

        let video_track = muxer
            .add_track(TrackKind::Video, &codec::Parameters::from(&video))
            .unwrap();
        let audio_track = muxer
            .add_track(TrackKind::Audio, &codec::Parameters::from(&audio))
            .unwrap();
        muxer.start().unwrap();

        let mut video_samples = Vec::new();
        let mut picture = frame::Video::new(format::Pixel::YUV420P, 64, 48);
        for n in 0..VIDEO_FRAMES {
            for plane in 0..picture.planes() {
                picture.data_mut(plane).fill(16 + (n as u8) * 40);
            }
            picture.set_pts(Some(n));
            video.send_frame(&picture).unwrap();
            drain(&mut video, Rational::new(1, 25), &mut video_samples);
        }
        video.send_eof().unwrap();
        drain(&mut video, Rational::new(1, 25), &mut video_samples);

        let mut audio_samples = Vec::new();
        let mut tone = frame::Audio::new(
            format::Sample::I16(format::sample::Type::Packed),
            AUDIO_FRAME_SAMPLES,
            ChannelLayout::MONO,
        );
        tone.set_rate(AUDIO_RATE as u32);
        for n in 0..AUDIO_FRAMES {
            tone.data_mut(0).fill(n as u8);
            tone.set_pts(Some(n * AUDIO_FRAME_SAMPLES as i64));
            audio.send_frame(&tone).unwrap();
            drain(&mut audio, Rational::new(1, AUDIO_RATE), &mut audio_samples);
        }
        audio.send_eof().unwrap();
        drain(&mut audio, Rational::new(1, AUDIO_RATE), &mut audio_samples);

        assert_eq!(video_samples.len() as i64, VIDEO_FRAMES);
        assert_eq!(audio_samples.len() as i64, AUDIO_FRAMES);
        for sample in &video_samples {
            muxer.write_sample(video_track, sample).unwrap();
        }
        for sample in &audio_samples {
            muxer.write_sample(audio_track, sample).unwrap();
        }
        muxer.finish().unwrap();
    }

    fn read_all(path: &Path, kind: TrackKind) -> Vec<Sample> {
        let mut demuxer = FfmpegDemuxer::open(path).unwrap();
        let track = demuxer
            .tracks()
            .iter()
            .find(|track| track.kind == kind)
            .map(|track| track.index)
            .unwrap();
        let mut samples = Vec::new();
        while let Some(sample) = demuxer.read_sample(track).unwrap() {
            samples.push(sample);
        }
        samples
    }

    fn pts(samples: &[Sample]) -> Vec<i64> {
        samples.iter().map(|s| s.presentation_time_us).collect()
    }

    #[test]
    fn test_stitch_two_recorded_segments() {
        let dir = tempdir().unwrap();
        let segments: Vec<PathBuf> = ["segment_0.mkv", "segment_1.mkv"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        for path in &segments {
            write_segment(path);
        }
        let output = dir.path().join("merged.mkv");

        let report = SegmentMerger::new(FfmpegContainers::new("matroska"))
            .merge(
                &[Segment::new(&segments[0], 200_000), Segment::new(&segments[1], 200_000)],
                &output,
            )
            .unwrap();

        let video_last = *pts(&read_all(&segments[0], TrackKind::Video)).last().unwrap();
        let audio_last = *pts(&read_all(&segments[0], TrackKind::Audio)).last().unwrap();
        assert_eq!(video_last, 160_000);
        assert_eq!(audio_last, 150_000);

        let video = read_all(&output, TrackKind::Video);
        let audio = read_all(&output, TrackKind::Audio);
        assert_eq!(video.len() as i64, 2 * VIDEO_FRAMES);
        assert_eq!(audio.len() as i64, 2 * AUDIO_FRAMES);
        assert!(video[0].is_sync && video[VIDEO_FRAMES as usize].is_sync);

        let video_pts = pts(&video);
        let audio_pts = pts(&audio);
        assert!(video_pts.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", video_pts);
        assert!(audio_pts.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", audio_pts);

        // The first sample of the second segment shares the previous last
        // timestamp and moves one 1ms matroska tick forward.
        assert_eq!(video_pts[VIDEO_FRAMES as usize], video_last + 1_000);
        assert_eq!(audio_pts[AUDIO_FRAMES as usize], audio_last + 1_000);

        assert_eq!(*video_pts.last().unwrap(), 2 * video_last);
        assert_eq!(*audio_pts.last().unwrap(), 2 * audio_last);
        assert_eq!(report.video.unwrap().end_offset_us, 2 * video_last);
        assert_eq!(report.audio.unwrap().end_offset_us, 2 * audio_last);
        assert_eq!(report.video.unwrap().samples as i64, 2 * VIDEO_FRAMES);
    }

    #[test]
    fn test_muxed_pts_never_precedes_dts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boundary.mkv");
        let source = dir.path().join("source.mkv");
        write_segment(&source);
        let parameters = FfmpegDemuxer::open(&source)
            .unwrap()
            .tracks()
            .iter()
            .find(|track| track.kind == TrackKind::Audio)
            .map(|track| track.format.clone())
            .unwrap();

        let mut muxer = FfmpegMuxer::create(&path, "matroska").unwrap();
        let track = muxer.add_track(TrackKind::Audio, &parameters).unwrap();
        muxer.start().unwrap();
        for pts in [0, 50_000, 50_000, 100_000] {
            let mut sample = Sample::new(vec![0u8; 800], pts).sync();
            sample.decode_time_us = Some(pts);
            muxer.write_sample(track, &sample).unwrap();
        }
        muxer.finish().unwrap();

        let written = read_all(&path, TrackKind::Audio);
        assert_eq!(pts(&written), vec![0, 50_000, 51_000, 100_000]);
        assert!(written
            .iter()
            .all(|s| s.decode_time_us.map_or(true, |dts| s.presentation_time_us >= dts)));
    }

    #[test]
    fn test_single_segment_output_is_byte_identical() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("segment_0.mp4");
        let output = dir.path().join("merged.mp4");
        // Not a valid container: the single-segment path must not parse it.
        let bytes: Vec<u8> = (0..4096u32).map(|n| (n * 7 % 251) as u8).collect();
        std::fs::write(&input, &bytes).unwrap();

        let merger = SegmentMerger::new(FfmpegContainers::default());
        let report = merger
            .merge(&[Segment::new(&input, 1_000_000)], &output)
            .unwrap();

        assert!(report.verbatim);
        assert_eq!(std::fs::read(&output).unwrap(), bytes);
    }

    #[test]
    fn test_missing_segment_reports_open_error() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("merged.mp4");
        let segments = vec![
            Segment::new(dir.path().join("a.mp4"), 0),
            Segment::new(dir.path().join("b.mp4"), 0),
        ];

        let result = SegmentMerger::new(FfmpegContainers::default()).merge(&segments, &output);

        match result {
            Err(MergeError::Open { source, .. }) => {
                assert!(matches!(source, ContainerError::NotFound(_)))
            }
            other => panic!("expected open error, got {:?}", other),
        }
        assert!(!output.exists());
    }

    #[test]
    fn test_garbage_segment_fails_without_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("merged.mp4");
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"definitely not a container").unwrap();
        std::fs::write(&b, b"nor is this").unwrap();

        let result = SegmentMerger::new(FfmpegContainers::default())
            .merge(&[Segment::new(&a, 0), Segment::new(&b, 0)], &output);

        assert!(result.is_err());
        assert!(!output.exists());
        assert!(a.exists() && b.exists());
    }
}
