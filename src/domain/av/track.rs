use bytes::Bytes;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Kind of elementary stream the merger carries over. Anything else in a
/// container (subtitles, data, timecode) is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    /// Order in which kinds are copied for every segment.
    pub const ORDER: [TrackKind; 2] = [TrackKind::Video, TrackKind::Audio];
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
        }
    }
}

/// A track as exposed by a demuxer. `format` is the codec descriptor and is
/// handed to the muxer untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo<F> {
    /// Index understood by the demuxer that produced this entry
    pub index: usize,
    pub kind: TrackKind,
    pub format: F,
}

/// First track of `kind`. Further tracks of the same kind are never used.
pub fn first_of_kind<F>(tracks: &[TrackInfo<F>], kind: TrackKind) -> Option<&TrackInfo<F>> {
    tracks.iter().find(|track| track.kind == kind)
}

/// One encoded access unit. Timestamps are microseconds relative to the
/// start of the container the sample came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub data: Bytes,
    pub presentation_time_us: i64,
    pub decode_time_us: Option<i64>,
    pub duration_us: i64,
    /// Container-level sample flags, carried as-is
    pub flags: u32,
    pub is_sync: bool,
}

impl Sample {
    pub fn new(data: impl Into<Bytes>, presentation_time_us: i64) -> Self {
        Self {
            data: data.into(),
            presentation_time_us,
            decode_time_us: None,
            duration_us: 0,
            flags: 0,
            is_sync: false,
        }
    }

    pub fn sync(mut self) -> Self {
        self.is_sync = true;
        self
    }

    /// Same payload, timestamps moved forward by `offset_us`.
    pub fn shifted(&self, offset_us: i64) -> Self {
        Self {
            data: self.data.clone(),
            presentation_time_us: self.presentation_time_us + offset_us,
            decode_time_us: self.decode_time_us.map(|dts| dts + offset_us),
            duration_us: self.duration_us,
            flags: self.flags,
            is_sync: self.is_sync,
        }
    }
}

/// One value per track kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerKind<T> {
    pub video: T,
    pub audio: T,
}

impl<T> Index<TrackKind> for PerKind<T> {
    type Output = T;

    fn index(&self, kind: TrackKind) -> &T {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        }
    }
}

impl<T> IndexMut<TrackKind> for PerKind<T> {
    fn index_mut(&mut self, kind: TrackKind) -> &mut T {
        match kind {
            TrackKind::Video => &mut self.video,
            TrackKind::Audio => &mut self.audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_of_kind_ignores_later_tracks() {
        let tracks = vec![
            TrackInfo { index: 0, kind: TrackKind::Audio, format: "aac" },
            TrackInfo { index: 1, kind: TrackKind::Video, format: "h264" },
            TrackInfo { index: 2, kind: TrackKind::Video, format: "hevc" },
        ];

        let video = first_of_kind(&tracks, TrackKind::Video).unwrap();
        assert_eq!(video.index, 1);
        assert_eq!(video.format, "h264");
        assert_eq!(first_of_kind(&tracks, TrackKind::Audio).unwrap().index, 0);
    }

    #[test]
    fn test_shifted_keeps_payload_and_flags() {
        let mut sample = Sample::new(vec![1u8, 2, 3], 40_000).sync();
        sample.decode_time_us = Some(33_000);
        sample.duration_us = 33_333;
        sample.flags = 0x1;

        let shifted = sample.shifted(1_000_000);
        assert_eq!(shifted.presentation_time_us, 1_040_000);
        assert_eq!(shifted.decode_time_us, Some(1_033_000));
        assert_eq!(shifted.duration_us, 33_333);
        assert_eq!(shifted.flags, 0x1);
        assert!(shifted.is_sync);
        assert_eq!(shifted.data, sample.data);
    }

    #[test]
    fn test_per_kind_indexing() {
        let mut offsets: PerKind<i64> = PerKind::default();
        offsets[TrackKind::Audio] += 10;
        assert_eq!(offsets.audio, 10);
        assert_eq!(offsets[TrackKind::Video], 0);
    }
}
