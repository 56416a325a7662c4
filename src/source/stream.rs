//! Decode-side container wrapper.
//!
//! Consumers pull frames per substream; an empty queue makes the stream read
//! another packet from the container, which in turn pulls bytes through the
//! I/O bridge.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace, warn};

use crate::{
    codec::{BoxedDecoder, Pump},
    common::errors::{BridgeError, BridgeResult},
    io::BridgedIo,
    media::{MediaFrame, Packet, StreamInfo},
    source::{demuxer::Demuxer, substream::SourceSubstream},
};

/// What one successful [`SourceStream::read_packet`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketSummary {
    pub stream_index: usize,
    pub bytes: usize,
    /// Frames decoded from the packet (zero when decoding is off).
    pub frames: usize,
    /// Packet position in seconds.
    pub position: f64,
    /// Packet duration in seconds.
    pub duration: f64,
}

pub struct SourceStream {
    demuxer: Box<dyn Demuxer>,
    input: Option<BridgedIo>,
    streams: Vec<StreamInfo>,
    substreams: Vec<Option<SourceSubstream>>,
    pump: Pump,
    read_retry_limit: u32,
    position: f64,
    created_time: f64,
    closed: bool,
}

impl SourceStream {
    /// Wraps an opened container. `input` is the bridged session the
    /// demuxer reads from; it is closed together with the stream.
    pub fn new(
        demuxer: impl Demuxer + 'static,
        input: Option<BridgedIo>,
        pump: Pump,
        read_retry_limit: u32,
    ) -> Self {
        let streams = demuxer.streams();
        let slots = streams.iter().map(|s| s.index + 1).max().unwrap_or(0);
        let created_time = demuxer.start_time_realtime().unwrap_or_else(now_seconds);

        debug!(
            "opened source stream with {} container stream(s)",
            streams.len()
        );

        Self {
            demuxer: Box::new(demuxer),
            input,
            streams,
            substreams: std::iter::repeat_with(|| None).take(slots).collect(),
            pump,
            read_retry_limit,
            position: -1.0,
            created_time,
            closed: false,
        }
    }

    /// Streams the container reported, bound or not.
    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    /// Binds `decoder` to container stream `index`.
    pub fn register_substream(
        &mut self,
        index: usize,
        decoder: BoxedDecoder,
    ) -> BridgeResult<&mut SourceSubstream> {
        self.ensure_open()?;
        let info = self
            .streams
            .iter()
            .find(|s| s.index == index)
            .copied()
            .ok_or_else(|| BridgeError::misuse(format!("invalid stream index {index}")))?;

        let slot = self
            .substreams
            .get_mut(index)
            .ok_or_else(|| BridgeError::misuse(format!("invalid stream index {index}")))?;
        if slot.is_some() {
            return Err(BridgeError::misuse(format!(
                "stream {index} already has a substream"
            )));
        }

        debug!(
            "registered {} substream {index} (time base {})",
            info.media_type(),
            info.time_base
        );
        Ok(slot.insert(SourceSubstream::new(info, decoder)))
    }

    /// Binds every stream for which `factory` returns a decoder. Returns the
    /// number of substreams registered.
    pub fn register_streams<F>(&mut self, mut factory: F) -> BridgeResult<usize>
    where
        F: FnMut(&StreamInfo) -> BridgeResult<Option<BoxedDecoder>>,
    {
        let mut registered = 0;
        for info in self.streams.clone() {
            if let Some(decoder) = factory(&info)? {
                self.register_substream(info.index, decoder)?;
                registered += 1;
            }
        }
        Ok(registered)
    }

    pub fn substream(&self, index: usize) -> Option<&SourceSubstream> {
        self.substreams.get(index).and_then(Option::as_ref)
    }

    pub fn substream_mut(&mut self, index: usize) -> Option<&mut SourceSubstream> {
        self.substreams.get_mut(index).and_then(Option::as_mut)
    }

    pub fn substreams(&self) -> impl Iterator<Item = &SourceSubstream> {
        self.substreams.iter().flatten()
    }

    /// Wall-clock seconds that frame timestamps are offset by.
    pub fn created_time(&self) -> f64 {
        self.created_time
    }

    pub fn set_created_time(&mut self, created_time: f64) {
        self.created_time = created_time;
    }

    /// The furthest-behind substream position, or the last packet position
    /// when nothing is bound (`-1` before the first packet).
    pub fn position(&self) -> f64 {
        self.substreams()
            .map(SourceSubstream::position)
            .reduce(f64::min)
            .unwrap_or(self.position)
    }

    pub fn last_packet_timestamp(&self) -> f64 {
        self.substreams()
            .map(SourceSubstream::last_timestamp)
            .fold(self.created_time + self.position.max(0.0), f64::max)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reads one packet for a bound stream, decoding it when that substream
    /// is decoding. Packets for unbound streams and empty packets are
    /// skipped.
    pub fn read_packet(&mut self) -> BridgeResult<PacketSummary> {
        self.ensure_open()?;

        loop {
            let packet = self.next_container_packet()?;
            if packet.flags.corrupt {
                return Err(BridgeError::CorruptPacket {
                    stream_index: packet.stream_index,
                });
            }

            let Some(substream) = self
                .substreams
                .get_mut(packet.stream_index)
                .and_then(Option::as_mut)
            else {
                trace!("skipping packet for unbound stream {}", packet.stream_index);
                continue;
            };
            if packet.is_empty() {
                continue;
            }

            let frames = if substream.is_decoding() {
                substream.decode(&self.pump, &packet, self.created_time)?
            } else {
                0
            };

            let tb = substream.time_base();
            let position = packet.pts.map_or(self.position, |pts| tb.seconds(pts));
            self.position = position;

            return Ok(PacketSummary {
                stream_index: packet.stream_index,
                bytes: packet.size(),
                frames,
                position,
                duration: tb.seconds(packet.duration),
            });
        }
    }

    /// Pulls one more packet. `Ok(false)` means the container is exhausted.
    pub fn read(&mut self) -> BridgeResult<bool> {
        match self.read_packet() {
            Ok(_) => Ok(true),
            Err(BridgeError::Eof) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Next frame of substream `index`, reading packets until one is queued.
    ///
    /// Fails with [`BridgeError::Eof`] when the container runs out and with
    /// a usage error when the substream is not decoding.
    pub fn next(&mut self, index: usize) -> BridgeResult<MediaFrame> {
        loop {
            let substream = self.bound_mut(index)?;
            if let Some(frame) = substream.try_next() {
                return Ok(frame);
            }
            self.fill(index)?;
        }
    }

    /// Like [`next`](Self::next) but leaves the frame queued.
    pub fn peek(&mut self, index: usize) -> BridgeResult<&MediaFrame> {
        while self.bound(index)?.queued() == 0 {
            self.fill(index)?;
        }
        self.bound(index)?
            .try_peek()
            .ok_or_else(|| BridgeError::misuse(format!("substream {index} queue emptied")))
    }

    pub fn try_next(&mut self, index: usize) -> BridgeResult<Option<MediaFrame>> {
        Ok(self.bound_mut(index)?.try_next())
    }

    pub fn try_peek(&self, index: usize) -> BridgeResult<Option<&MediaFrame>> {
        Ok(self.bound(index)?.try_peek())
    }

    pub fn drain(&mut self, index: usize) -> BridgeResult<Vec<MediaFrame>> {
        Ok(self.bound_mut(index)?.drain())
    }

    /// Discards queued frames of substream `index`.
    pub fn flush(&mut self, index: usize) -> BridgeResult<usize> {
        Ok(self.bound_mut(index)?.flush())
    }

    pub fn set_decoding(&mut self, index: usize, decoding: bool) -> BridgeResult<()> {
        self.bound_mut(index)?.set_decoding(decoding);
        Ok(())
    }

    /// Skips forward to `target` seconds by reading packets, returning the
    /// position of the first packet that reaches it. Streams only move
    /// forward.
    pub fn seek(&mut self, target: f64) -> BridgeResult<f64> {
        if !target.is_finite() {
            return Err(BridgeError::misuse(format!("invalid seek target {target}")));
        }
        if target < self.position {
            return Err(BridgeError::misuse(format!(
                "cannot seek backwards from {:.3}s to {target:.3}s",
                self.position
            )));
        }
        if target == self.position {
            return Ok(target);
        }

        loop {
            let packet = self.read_packet()?;
            if packet.position + packet.duration >= target {
                debug!("seeked source stream to {:.3}s", packet.position);
                return Ok(packet.position);
            }
        }
    }

    /// Closes every substream and then the bridged input. Later calls do
    /// nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for substream in self.substreams.iter_mut().flatten() {
            if let Err(e) = substream.close() {
                warn!("{e}");
            }
        }
        self.substreams.clear();

        if let Some(input) = self.input.take() {
            input.close();
        }
        debug!("closed source stream");
    }

    fn ensure_open(&self) -> BridgeResult<()> {
        if self.closed {
            return Err(BridgeError::misuse("source stream is closed"));
        }
        Ok(())
    }

    fn bound(&self, index: usize) -> BridgeResult<&SourceSubstream> {
        self.substream(index)
            .ok_or_else(|| BridgeError::misuse(format!("no substream bound to stream {index}")))
    }

    fn bound_mut(&mut self, index: usize) -> BridgeResult<&mut SourceSubstream> {
        self.substream_mut(index)
            .ok_or_else(|| BridgeError::misuse(format!("no substream bound to stream {index}")))
    }

    /// Reads one packet on behalf of an empty substream queue.
    fn fill(&mut self, index: usize) -> BridgeResult<()> {
        if !self.bound(index)?.is_decoding() {
            return Err(BridgeError::misuse(format!(
                "substream {index} is not decoding"
            )));
        }
        self.read_packet().map(|_| ())
    }

    fn next_container_packet(&mut self) -> BridgeResult<Packet> {
        let mut retries = 0;
        loop {
            match self.demuxer.read_frame() {
                Ok(packet) => return Ok(packet),
                Err(status) if status.is_eof() => {
                    debug!("source stream reached end of container");
                    return Err(BridgeError::Eof);
                }
                Err(status) if status.is_again() && retries < self.read_retry_limit => {
                    retries += 1;
                }
                Err(status) => return Err(BridgeError::codec("read_frame", status)),
            }
        }
    }
}

impl Drop for SourceStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
