//! Engine return codes.
//!
//! Native calls answer with a plain `i32`: non-negative for success (often a
//! byte count) and negative for a sentinel or an error. [`Status`] keeps that
//! representation so values cross the boundary unchanged.

use std::fmt;

use crate::common::errors::{BridgeError, BridgeResult};

/// Builds a negative four-character error tag the way the engine does.
const fn error_tag(tag: &[u8; 4]) -> i32 {
    -((tag[0] as i32) | ((tag[1] as i32) << 8) | ((tag[2] as i32) << 16) | ((tag[3] as i32) << 24))
}

// ── Seek whence flags ────────────────────────────────────────────────────────

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// Ask for the stream size instead of moving.
pub const AVSEEK_SIZE: i32 = 0x10000;

/// Seek even if it is expensive. Treated as a plain seek.
pub const AVSEEK_FORCE: i32 = 0x20000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(i32);

impl Status {
    pub const OK: Status = Status(0);
    /// Generic failure returned by the bridge callbacks.
    pub const ERROR: Status = Status(-1);
    /// Not ready: drain output (or retry the read) and try again.
    pub const AGAIN: Status = Status(-11);
    pub const NO_MEMORY: Status = Status(-12);
    pub const INVALID_ARGUMENT: Status = Status(-22);
    pub const BROKEN_PIPE: Status = Status(-32);
    pub const EOF: Status = Status(error_tag(b"EOF "));
    pub const INVALID_DATA: Status = Status(error_tag(b"INDA"));

    pub const fn from_code(code: i32) -> Self {
        Self(code)
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_error(self) -> bool {
        self.0 < 0
    }

    pub const fn is_again(self) -> bool {
        self.0 == Self::AGAIN.0
    }

    pub const fn is_eof(self) -> bool {
        self.0 == Self::EOF.0
    }

    /// Human readable text for the code.
    pub fn describe(self) -> String {
        let text = match self {
            Self::OK => "Success",
            Self::ERROR => "Operation not permitted",
            Self::AGAIN => "Resource temporarily unavailable",
            Self::NO_MEMORY => "Cannot allocate memory",
            Self::INVALID_ARGUMENT => "Invalid argument",
            Self::BROKEN_PIPE => "Broken pipe",
            Self::EOF => "End of file",
            Self::INVALID_DATA => "Invalid data found when processing input",
            other => return format!("Error number {} occurred", other.0),
        };
        text.to_string()
    }

    /// Converts a negative code into an error naming the failed operation.
    ///
    /// EOF maps to [`BridgeError::Eof`] so callers can tell exhaustion apart
    /// from failure.
    pub fn check(self, op: &'static str) -> BridgeResult<i32> {
        if self.is_eof() {
            Err(BridgeError::Eof)
        } else if self.is_error() {
            Err(BridgeError::codec(op, self))
        } else {
            Ok(self.0)
        }
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_values_match_engine() {
        assert_eq!(Status::EOF.code(), -541_478_725);
        assert_eq!(Status::INVALID_DATA.code(), -1_094_995_529);
        assert_eq!(Status::AGAIN.code(), -11);
    }

    #[test]
    fn check_separates_eof_from_errors() {
        assert_eq!(Status::from_code(42).check("read").unwrap(), 42);
        assert!(Status::EOF.check("read").unwrap_err().is_eof());
        match Status::NO_MEMORY.check("alloc") {
            Err(BridgeError::Codec { op, code, .. }) => {
                assert_eq!(op, "alloc");
                assert_eq!(code, -12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_codes_still_describe() {
        assert_eq!(Status::from_code(-9999).describe(), "Error number -9999 occurred");
    }
}
