//! Data that flows through the codec pump: compressed packets going in or
//! out of a container, raw frames going in or out of a codec, and the
//! timestamped frames handed to consumers.

pub mod format;
pub mod frame;
pub mod packet;

pub use format::*;
pub use frame::*;
pub use packet::*;
