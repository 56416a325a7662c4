//! In-memory stand-ins for engine collaborators, used by unit tests.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::{
    codec::Codec,
    common::status::Status,
    media::{FrameData, Packet, RawFrame},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Sent,
    Refused,
    Flushed,
    Received,
    Empty,
    Drained,
}

type Expand<I, O> = Box<dyn FnMut(&I) -> Vec<O> + Send>;

/// A codec whose output for each input is computed by a closure, with a
/// bounded internal queue so it pushes back like a real one.
pub struct ScriptedCodec<I, O> {
    expand: Expand<I, O>,
    pending: VecDeque<O>,
    capacity: usize,
    draining: bool,
    pub stuck: bool,
    pub fail_send: Option<Status>,
    pub fail_receive: Option<Status>,
    pub closed: bool,
    pub log: Vec<Call>,
}

impl<I, O> ScriptedCodec<I, O> {
    pub fn new(capacity: usize, expand: impl FnMut(&I) -> Vec<O> + Send + 'static) -> Self {
        Self {
            expand: Box::new(expand),
            pending: VecDeque::new(),
            capacity,
            draining: false,
            stuck: false,
            fail_send: None,
            fail_receive: None,
            closed: false,
            log: Vec::new(),
        }
    }

    pub fn with_pending(mut self, pending: Vec<O>) -> Self {
        self.pending.extend(pending);
        self
    }
}

impl<I, O: Send> Codec for ScriptedCodec<I, O> {
    type Input = I;
    type Output = O;

    fn send(&mut self, input: Option<&I>) -> Status {
        if let Some(status) = self.fail_send {
            return status;
        }
        let Some(input) = input else {
            self.draining = true;
            self.log.push(Call::Flushed);
            return Status::OK;
        };
        if self.draining {
            return Status::EOF;
        }
        if self.stuck || self.pending.len() >= self.capacity {
            self.log.push(Call::Refused);
            return Status::AGAIN;
        }
        let produced = (self.expand)(input);
        self.pending.extend(produced);
        self.log.push(Call::Sent);
        Status::OK
    }

    fn receive(&mut self) -> Result<O, Status> {
        if let Some(status) = self.fail_receive {
            return Err(status);
        }
        match self.pending.pop_front() {
            Some(unit) => {
                self.log.push(Call::Received);
                Ok(unit)
            }
            None if self.draining => {
                self.log.push(Call::Drained);
                Err(Status::EOF)
            }
            None => {
                self.log.push(Call::Empty);
                Err(Status::AGAIN)
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Decoder turning every packet into `per_packet` mono frames of
/// `samples` samples, stamped with the packet pts.
pub fn audio_decoder(per_packet: usize, samples: usize) -> ScriptedCodec<Packet, RawFrame> {
    ScriptedCodec::new(4, move |packet: &Packet| {
        (0..per_packet)
            .map(|i| RawFrame {
                pts: packet.pts,
                dts: packet.dts,
                duration: packet.duration,
                data: FrameData::Audio {
                    samples: vec![i as f32 / 10.0; samples],
                    channels: 1,
                },
            })
            .collect()
    })
}

/// Encoder emitting one packet per frame, pts copied, payload holding the
/// sample count as a little-endian u32.
pub fn counting_encoder() -> ScriptedCodec<RawFrame, Packet> {
    ScriptedCodec::new(4, |frame: &RawFrame| {
        let count = frame.sample_count() as u32;
        vec![Packet {
            pts: frame.pts,
            dts: frame.pts,
            duration: count as i64,
            data: Bytes::copy_from_slice(&count.to_le_bytes()),
            ..Packet::default()
        }]
    })
}
