//! Byte-stream I/O bridge and codec pump for native media engines.
//!
//! A native demuxer or muxer reads and writes through the plain C callbacks
//! handed out by [`io::IoBridge`]; each callback resolves a small integer
//! handle in a bounded [`io::SessionTable`] and forwards to a Rust reader or
//! writer. On top of that, [`source::SourceStream`] and
//! [`target::TargetStream`] drive decoders and encoders through the
//! submit/drain [`codec::Pump`].

pub mod codec;
pub mod common;
pub mod configs;
pub mod engine;
pub mod io;
pub mod media;
pub mod source;
pub mod target;

use std::sync::Arc;

use crate::{
    codec::{Direction, Pump},
    common::errors::BridgeResult,
    configs::Config,
    io::{BridgedIo, IoBridge, SessionTable},
    source::{Demuxer, SourceStream},
    target::{Muxer, TargetStream},
};

/// Entry point tying the session table to the stream wrappers, with limits
/// taken from a [`Config`].
pub struct MediaBridge {
    io: IoBridge,
    config: Config,
}

impl MediaBridge {
    pub fn new(config: &Config) -> BridgeResult<Self> {
        Ok(Self {
            io: IoBridge::new(&config.io)?,
            config: config.clone(),
        })
    }

    /// Opener for bridged sessions.
    pub fn io(&self) -> &IoBridge {
        &self.io
    }

    pub fn table(&self) -> &Arc<SessionTable> {
        self.io.table()
    }

    pub fn open_sessions(&self) -> usize {
        self.io.open_sessions()
    }

    pub fn pump(&self, direction: Direction) -> Pump {
        Pump::new(direction, self.config.codec.stall_limit)
    }

    /// Wraps a demuxer reading from `input`. The session is closed with the
    /// returned stream.
    pub fn open_source(&self, input: BridgedIo, demuxer: impl Demuxer + 'static) -> SourceStream {
        SourceStream::new(
            demuxer,
            Some(input),
            self.pump(Direction::Decode),
            self.config.codec.read_retry_limit,
        )
    }

    /// Wraps a muxer writing to `output`. The session is closed with the
    /// returned stream.
    pub fn open_target(&self, output: BridgedIo, muxer: impl Muxer + 'static) -> TargetStream {
        TargetStream::new(
            muxer,
            Some(output),
            self.pump(Direction::Encode),
            self.config.codec.default_audio_frame_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{common::status::Status, media::Packet};

    struct NullMuxer;

    impl Muxer for NullMuxer {
        fn write_header(&mut self) -> Status {
            Status::OK
        }

        fn write_packet(&mut self, _packet: Option<&Packet>) -> Status {
            Status::OK
        }

        fn write_trailer(&mut self) -> Status {
            Status::OK
        }
    }

    #[test]
    fn streams_release_their_sessions() {
        let config = Config::from_toml_str("[io]\nmax_sessions = 2\n").unwrap();
        let bridge = MediaBridge::new(&config).unwrap();

        let output = bridge.io().open_output(Vec::<u8>::new()).unwrap();
        let input = bridge.io().open_input(Cursor::new(vec![0u8; 8])).unwrap();
        assert!(bridge.io().open_output(Vec::<u8>::new()).is_err());

        let mut target = bridge.open_target(output, NullMuxer);
        target.close().unwrap();
        assert_eq!(bridge.open_sessions(), 1);

        drop(input);
        assert_eq!(bridge.open_sessions(), 0);
    }

    #[test]
    fn pumps_follow_codec_config() {
        let bridge = MediaBridge::new(&Config::default()).unwrap();
        assert_eq!(bridge.pump(Direction::Decode).direction(), Direction::Decode);
        assert_eq!(bridge.pump(Direction::Encode).direction(), Direction::Encode);
    }
}
