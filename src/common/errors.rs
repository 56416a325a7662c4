use thiserror::Error;

use crate::common::status::Status;

/// Errors surfaced above the native boundary.
///
/// The callback entry points never return these; they convert every failure
/// into a [`Status`] sentinel instead.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no free I/O session (in use={in_use}, capacity={capacity})")]
    CapacityExceeded { in_use: usize, capacity: usize },

    #[error("I/O session {handle} is not open")]
    InvalidHandle { handle: i32 },

    #[error("{op} failed on I/O session {handle}: {reason}")]
    BridgeFault {
        op: &'static str,
        handle: i32,
        reason: String,
    },

    #[error("{op}: {message} (code={code})")]
    Codec {
        op: &'static str,
        code: i32,
        message: String,
    },

    #[error("end of stream")]
    Eof,

    #[error("corrupt packet on stream {stream_index}")]
    CorruptPacket { stream_index: usize },

    #[error("illegal state: {0}")]
    ProtocolMisuse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Builds a codec error from a failed engine call.
    pub fn codec(op: &'static str, status: Status) -> Self {
        Self::Codec {
            op,
            code: status.code(),
            message: status.describe(),
        }
    }

    pub fn misuse(message: impl Into<String>) -> Self {
        Self::ProtocolMisuse(message.into())
    }

    /// True when the error only signals that a stream ran out of data.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
