//! Decode side: container packets in, per-substream frame queues out.

pub mod demuxer;
pub mod queue;
pub mod stream;
pub mod substream;

pub use demuxer::Demuxer;
pub use queue::FrameQueue;
pub use stream::{PacketSummary, SourceStream};
pub use substream::SourceSubstream;
