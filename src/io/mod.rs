//! The I/O bridge: caller-supplied byte streams exposed to a native media
//! engine through handle-addressed sessions and `extern "C"` callbacks.

pub mod bridge;
pub mod callbacks;
pub mod session;
pub mod stream;
pub mod table;

pub use bridge::{BridgedIo, IoBridge};
pub use callbacks::{CallbackContext, ReadPacketFn, SeekFn, WritePacketFn};
pub use session::{ByteChannel, Endpoint, Handle, IoSession, SessionKind, SessionStats};
pub use stream::{BridgedReader, BridgedWriter};
pub use table::{SessionKey, SessionTable, SharedSession};
