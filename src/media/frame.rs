use bytes::Bytes;

use crate::{
    common::types::MediaType,
    media::format::{AudioFormat, PixelFormat},
};

/// Sample or pixel payload of a raw frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    /// Interleaved samples in `[-1.0, 1.0]`.
    Audio { samples: Vec<f32>, channels: u16 },
    Video {
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        data: Bytes,
    },
}

/// A frame as the codec sees it, timestamps in the codec time base.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub data: FrameData,
}

impl RawFrame {
    pub fn audio(samples: Vec<f32>, channels: u16) -> Self {
        Self {
            pts: None,
            dts: None,
            duration: 0,
            data: FrameData::Audio { samples, channels },
        }
    }

    /// Samples per channel for audio, 1 for video.
    pub fn sample_count(&self) -> usize {
        match &self.data {
            FrameData::Audio { samples, channels } => samples.len() / usize::from((*channels).max(1)),
            FrameData::Video { .. } => 1,
        }
    }
}

/// Decoded audio ready for a consumer. `position` is seconds into the
/// stream, `timestamp` is wall-clock seconds, `time` is the duration.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub timestamp: f64,
    pub position: f64,
    pub time: f64,
    pub format: AudioFormat,
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(format: AudioFormat, samples: Vec<f32>) -> Self {
        Self {
            timestamp: 0.0,
            position: 0.0,
            time: 0.0,
            format,
            samples,
        }
    }

    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / usize::from(self.format.channels.max(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub timestamp: f64,
    pub position: f64,
    pub time: f64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaFrame {
    Audio(AudioFrame),
    Video(VideoFrame),
}

impl MediaFrame {
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Audio(_) => MediaType::Audio,
            Self::Video(_) => MediaType::Video,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Self::Audio(f) => f.timestamp,
            Self::Video(f) => f.timestamp,
        }
    }

    pub fn position(&self) -> f64 {
        match self {
            Self::Audio(f) => f.position,
            Self::Video(f) => f.position,
        }
    }

    pub fn time(&self) -> f64 {
        match self {
            Self::Audio(f) => f.time,
            Self::Video(f) => f.time,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioFrame> {
        match self {
            Self::Audio(f) => Some(f),
            Self::Video(_) => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoFrame> {
        match self {
            Self::Video(f) => Some(f),
            Self::Audio(_) => None,
        }
    }
}
