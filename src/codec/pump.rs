use tracing::{trace, warn};

use crate::{
    codec::Codec,
    common::errors::{BridgeError, BridgeResult},
};

/// Which way units flow through the codec. Only used to name the failing
/// engine operation in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Packets in, frames out.
    Decode,
    /// Frames in, packets out.
    Encode,
}

impl Direction {
    pub fn send_op(self) -> &'static str {
        match self {
            Self::Decode => "send_packet",
            Self::Encode => "send_frame",
        }
    }

    pub fn receive_op(self) -> &'static str {
        match self {
            Self::Decode => "receive_frame",
            Self::Encode => "receive_packet",
        }
    }
}

/// The send/receive retry loop shared by every decoder and encoder.
///
/// Holds no state between calls; all buffering lives in the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pump {
    direction: Direction,
    stall_limit: u32,
}

impl Pump {
    pub fn new(direction: Direction, stall_limit: u32) -> Self {
        Self {
            direction,
            stall_limit,
        }
    }

    pub fn decoder(stall_limit: u32) -> Self {
        Self::new(Direction::Decode, stall_limit)
    }

    pub fn encoder(stall_limit: u32) -> Self {
        Self::new(Direction::Encode, stall_limit)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Submits `input` (or a flush when `None`) and hands every unit the
    /// codec produces to `consume`. Returns the number of units produced.
    ///
    /// When the codec refuses input, pending output is drained before the
    /// submission is retried. A codec that keeps refusing without producing
    /// anything more than `stall_limit` times is reported as failed.
    pub fn feed<C, F>(
        &self,
        codec: &mut C,
        input: Option<&C::Input>,
        mut consume: F,
    ) -> BridgeResult<usize>
    where
        C: Codec + ?Sized,
        F: FnMut(C::Output) -> BridgeResult<()>,
    {
        let mut produced = 0;
        let mut stalls = 0;

        loop {
            let status = codec.send(input);

            if status.is_again() {
                let drained = self.receive_available(codec, &mut consume)?;
                produced += drained;

                if drained > 0 {
                    stalls = 0;
                    continue;
                }

                stalls += 1;
                if stalls > self.stall_limit {
                    warn!(
                        "codec refused input {stalls} times without producing output ({:?})",
                        self.direction
                    );
                    return Err(BridgeError::Codec {
                        op: self.direction.send_op(),
                        code: status.code(),
                        message: format!("codec stalled after {stalls} refused submissions"),
                    });
                }
                continue;
            }

            // An already drained codec answers a second flush with EOF.
            if status.is_error() && !(status.is_eof() && input.is_none()) {
                return Err(BridgeError::codec(self.direction.send_op(), status));
            }

            produced += self.receive_available(codec, &mut consume)?;
            trace!(
                "{:?} pump produced {produced} unit(s){}",
                self.direction,
                if input.is_none() { " on flush" } else { "" }
            );
            return Ok(produced);
        }
    }

    /// Receives until the codec has nothing ready (or is fully drained),
    /// handing each unit to `consume`. Returns the number received.
    pub fn receive_available<C, F>(&self, codec: &mut C, consume: &mut F) -> BridgeResult<usize>
    where
        C: Codec + ?Sized,
        F: FnMut(C::Output) -> BridgeResult<()>,
    {
        let mut received = 0;
        loop {
            match codec.receive() {
                Ok(unit) => {
                    consume(unit)?;
                    received += 1;
                }
                Err(status) if status.is_again() || status.is_eof() => return Ok(received),
                Err(status) => {
                    return Err(BridgeError::codec(self.direction.receive_op(), status));
                }
            }
        }
    }
}

impl Default for Pump {
    fn default() -> Self {
        Self::decoder(8)
    }
}
