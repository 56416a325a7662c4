use crate::{common::status::Status, media::Packet};

/// Container writer supplied by the engine.
pub trait Muxer: Send {
    fn write_header(&mut self) -> Status;

    /// Writes one packet, interleaving across streams. `None` flushes any
    /// packets held back for interleaving.
    fn write_packet(&mut self, packet: Option<&Packet>) -> Status;

    fn write_trailer(&mut self) -> Status;
}
