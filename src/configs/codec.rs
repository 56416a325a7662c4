use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CodecConfig {
    /// Consecutive refused submissions with nothing drained before a codec is
    /// declared stuck.
    pub stall_limit: u32,
    /// Times a demuxer may answer "try again" for a single packet read.
    pub read_retry_limit: u32,
    /// Chunk size in samples per channel for encoders that accept any frame
    /// size.
    pub default_audio_frame_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            stall_limit: 8,
            read_retry_limit: 64,
            default_audio_frame_size: 1024,
        }
    }
}
