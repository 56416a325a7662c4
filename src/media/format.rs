use std::fmt;

use crate::common::types::{MediaType, Rational};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Time base of a sample counter at this rate.
    pub fn sample_time_base(&self) -> Rational {
        Rational::new(1, i64::from(self.sample_rate.max(1)))
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz {}ch", self.sample_rate, self.channels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yuv420p,
    Rgb24,
    Bgr24,
    Rgba,
    /// Any engine-specific format identifier.
    Other(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
}

impl VideoFormat {
    pub const fn new(width: u32, height: u32, frame_rate: Rational) -> Self {
        Self {
            width,
            height,
            frame_rate,
        }
    }

    pub fn frames_per_second(&self) -> f64 {
        self.frame_rate.to_f64()
    }

    /// Seconds covered by one frame, or zero for an unknown rate.
    pub fn frame_duration(&self) -> f64 {
        let fps = self.frames_per_second();
        if fps > 0.0 { 1.0 / fps } else { 0.0 }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {:.3}fps",
            self.width,
            self.height,
            self.frames_per_second()
        )
    }
}

/// Format descriptor of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Audio(AudioFormat),
    Video(VideoFormat),
}

impl StreamFormat {
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Audio(_) => MediaType::Audio,
            Self::Video(_) => MediaType::Video,
        }
    }
}

/// One stream of a container, as reported by a demuxer or registered with
/// a muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    pub time_base: Rational,
    pub format: StreamFormat,
    pub bit_rate: u64,
}

impl StreamInfo {
    pub fn media_type(&self) -> MediaType {
        self.format.media_type()
    }
}
