use crate::{
    common::status::Status,
    media::{Packet, StreamInfo},
};

/// Container reader supplied by the engine.
pub trait Demuxer: Send {
    fn streams(&self) -> Vec<StreamInfo>;

    /// Reads the next packet. [`Status::EOF`] ends the container and
    /// [`Status::AGAIN`] asks the caller to try again.
    fn read_frame(&mut self) -> Result<Packet, Status>;

    /// Wall-clock start of the recording in seconds, when the container
    /// records one.
    fn start_time_realtime(&self) -> Option<f64> {
        None
    }
}
