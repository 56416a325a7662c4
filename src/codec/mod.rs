//! Codec contexts and the submit/drain pump that drives them.
//!
//! A codec accepts one unit at a time and may hold output back until it is
//! drained. [`Codec`] is the engine-agnostic shape of that contract and
//! [`Pump`] is the only place that implements the retry protocol.

pub mod pump;

#[cfg(test)]
pub(crate) mod testing;

pub use pump::*;

use crate::{
    common::status::Status,
    media::{Packet, RawFrame},
};

/// A codec context driven through "send one unit, receive until empty".
pub trait Codec: Send {
    type Input;
    type Output;

    /// Submits one unit, or `None` to enter draining mode.
    ///
    /// Answers [`Status::AGAIN`] when output must be received before more
    /// input is accepted.
    fn send(&mut self, input: Option<&Self::Input>) -> Status;

    /// Pulls one unit. [`Status::AGAIN`] means nothing is ready yet and
    /// [`Status::EOF`] means the codec is fully drained.
    fn receive(&mut self) -> Result<Self::Output, Status>;

    /// Releases engine resources. Called once by the owning substream.
    fn close(&mut self) {}
}

pub type Decoder = dyn Codec<Input = Packet, Output = RawFrame>;
pub type Encoder = dyn Codec<Input = RawFrame, Output = Packet>;
pub type BoxedDecoder = Box<Decoder>;
pub type BoxedEncoder = Box<Encoder>;
