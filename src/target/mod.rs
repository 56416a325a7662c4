//! Encode side: raw frames in, container packets out.

pub mod muxer;
pub mod stream;
pub mod substream;

pub use muxer::Muxer;
pub use stream::TargetStream;
pub use substream::{AudioTargetSubstream, PacketSink, TargetSubstream, VideoTargetSubstream};
