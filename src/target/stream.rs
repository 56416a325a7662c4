//! Encode-side container wrapper.

use tracing::{debug, warn};

use crate::{
    codec::{BoxedEncoder, Pump},
    common::{
        errors::{BridgeError, BridgeResult},
        status::Status,
        types::Rational,
    },
    io::BridgedIo,
    media::{AudioFrame, Packet, PixelFormat, StreamFormat, StreamInfo, VideoFrame},
    target::{
        muxer::Muxer,
        substream::{AudioTargetSubstream, TargetSubstream, VideoTargetSubstream},
    },
};

/// Muxer-side bookkeeping shared by every substream's packet sink.
#[derive(Debug, Default)]
struct MuxState {
    header_written: bool,
    packets: u64,
    duration: f64,
}

impl MuxState {
    fn ensure_header(&mut self, muxer: &mut dyn Muxer) -> BridgeResult<()> {
        if !self.header_written {
            muxer.write_header().check("write_header")?;
            self.header_written = true;
            debug!("wrote container header");
        }
        Ok(())
    }

    /// Writes one stamped packet. Empty packets are dropped and negative
    /// decode timestamps are clamped to zero.
    fn write(
        &mut self,
        muxer: &mut dyn Muxer,
        mut packet: Packet,
        time_base: Option<Rational>,
    ) -> BridgeResult<()> {
        if packet.flags.corrupt {
            return Err(BridgeError::CorruptPacket {
                stream_index: packet.stream_index,
            });
        }
        if packet.is_empty() {
            return Ok(());
        }
        if packet.dts.is_some_and(|dts| dts < 0) {
            packet.dts = Some(0);
        }

        self.ensure_header(muxer)?;

        let status = muxer.write_packet(Some(&packet));
        if status == Status::BROKEN_PIPE {
            return Err(BridgeError::Eof);
        }
        status.check("write_packet")?;
        self.packets += 1;

        if let (Some(pts), Some(tb)) = (packet.pts, time_base) {
            self.duration = self.duration.max(tb.seconds(pts + packet.duration));
        }
        Ok(())
    }
}

pub struct TargetStream {
    muxer: Box<dyn Muxer>,
    output: Option<BridgedIo>,
    substreams: Vec<TargetSubstream>,
    pump: Pump,
    default_audio_frame_size: usize,
    state: MuxState,
    closed: bool,
}

impl TargetStream {
    /// Wraps a container writer. `output` is the bridged session it writes
    /// to; it is closed together with the stream.
    pub fn new(
        muxer: impl Muxer + 'static,
        output: Option<BridgedIo>,
        pump: Pump,
        default_audio_frame_size: usize,
    ) -> Self {
        Self {
            muxer: Box::new(muxer),
            output,
            substreams: Vec::new(),
            pump,
            default_audio_frame_size: default_audio_frame_size.max(1),
            state: MuxState::default(),
            closed: false,
        }
    }

    /// Binds an audio encoder to container stream `stream`. A `frame_size` of
    /// zero means the codec accepts any size. Returns the substream id.
    pub fn register_audio_substream(
        &mut self,
        stream: StreamInfo,
        codec_time_base: Rational,
        encoder: BoxedEncoder,
        frame_size: usize,
    ) -> BridgeResult<usize> {
        let StreamFormat::Audio(format) = stream.format else {
            return Err(BridgeError::misuse(format!(
                "stream {} is not an audio stream",
                stream.index
            )));
        };
        self.check_unbound(&stream)?;

        let frame_size = if frame_size == 0 {
            self.default_audio_frame_size
        } else {
            frame_size
        };
        let substream =
            AudioTargetSubstream::new(stream, format, codec_time_base, encoder, frame_size)?;
        debug!(
            "registered audio target substream {} ({format}, {frame_size} samples/frame)",
            stream.index
        );
        Ok(self.push(TargetSubstream::Audio(substream)))
    }

    /// Binds a video encoder that takes `pixel_format` frames.
    pub fn register_video_substream(
        &mut self,
        stream: StreamInfo,
        codec_time_base: Rational,
        encoder: BoxedEncoder,
        pixel_format: PixelFormat,
    ) -> BridgeResult<usize> {
        let StreamFormat::Video(format) = stream.format else {
            return Err(BridgeError::misuse(format!(
                "stream {} is not a video stream",
                stream.index
            )));
        };
        self.check_unbound(&stream)?;

        debug!(
            "registered video target substream {} ({format}, {pixel_format:?})",
            stream.index
        );
        Ok(self.push(TargetSubstream::Video(VideoTargetSubstream::new(
            stream,
            format,
            pixel_format,
            codec_time_base,
            encoder,
        ))))
    }

    pub fn substream(&self, id: usize) -> Option<&TargetSubstream> {
        self.substreams.get(id)
    }

    pub fn substreams(&self) -> &[TargetSubstream] {
        &self.substreams
    }

    /// Seconds covered by the packets written so far.
    pub fn duration(&self) -> f64 {
        self.state.duration
    }

    pub fn packets_written(&self) -> u64 {
        self.state.packets
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Writes the container header. Also done on the first packet if not
    /// called explicitly.
    pub fn write_header(&mut self) -> BridgeResult<()> {
        self.ensure_open()?;
        self.state.ensure_header(self.muxer.as_mut())
    }

    /// Writes an already encoded packet.
    pub fn write_packet(&mut self, packet: Packet) -> BridgeResult<()> {
        self.ensure_open()?;
        let time_base = self
            .substreams
            .iter()
            .map(TargetSubstream::info)
            .find(|info| info.index == packet.stream_index)
            .map(|info| info.time_base);
        self.state.write(self.muxer.as_mut(), packet, time_base)
    }

    pub fn write_audio(&mut self, id: usize, frame: &AudioFrame) -> BridgeResult<()> {
        self.with_substream(id, |substream, pump, sink| match substream {
            TargetSubstream::Audio(audio) => audio.write(frame, pump, sink),
            TargetSubstream::Video(_) => Err(BridgeError::misuse(format!(
                "target substream {id} does not take audio"
            ))),
        })
    }

    /// Encodes exactly one codec frame of interleaved samples.
    pub fn encode_audio_frame(&mut self, id: usize, samples: &[f32]) -> BridgeResult<usize> {
        self.with_substream(id, |substream, pump, sink| match substream {
            TargetSubstream::Audio(audio) => audio.encode_frame(samples, pump, sink),
            TargetSubstream::Video(_) => Err(BridgeError::misuse(format!(
                "target substream {id} does not take audio"
            ))),
        })
    }

    pub fn write_video(&mut self, id: usize, frame: &VideoFrame) -> BridgeResult<usize> {
        self.with_substream(id, |substream, pump, sink| match substream {
            TargetSubstream::Video(video) => video.write(frame, pump, sink),
            TargetSubstream::Audio(_) => Err(BridgeError::misuse(format!(
                "target substream {id} does not take video"
            ))),
        })
    }

    /// Writes out packets the muxer holds back for interleaving. Encoders
    /// keep their state; they are only drained by [`close`](Self::close).
    pub fn flush(&mut self) -> BridgeResult<()> {
        self.ensure_open()?;
        if !self.state.header_written {
            return Ok(());
        }
        self.muxer.write_packet(None).check("write_packet")?;
        Ok(())
    }

    /// Finishes the container and releases everything.
    ///
    /// Substreams are flushed, interleaving buffers written and the trailer
    /// written; encoders and the bridged output are released even when one
    /// of those steps fails. Later calls do nothing.
    pub fn close(&mut self) -> BridgeResult<()> {
        if self.closed {
            debug!("target stream already closed");
            return Ok(());
        }

        let finished = self.finish();
        self.closed = true;

        for substream in &mut self.substreams {
            substream.close();
        }
        if let Some(output) = self.output.take() {
            output.close();
        }

        debug!(
            "closed target stream ({} packets, {:.3}s)",
            self.state.packets, self.state.duration
        );
        finished
    }

    fn finish(&mut self) -> BridgeResult<()> {
        for id in 0..self.substreams.len() {
            self.with_substream(id, |substream, pump, sink| substream.flush(pump, sink))?;
        }
        self.state.ensure_header(self.muxer.as_mut())?;
        self.muxer.write_packet(None).check("write_packet")?;
        self.muxer.write_trailer().check("write_trailer")?;
        Ok(())
    }

    fn ensure_open(&self) -> BridgeResult<()> {
        if self.closed {
            return Err(BridgeError::misuse("target stream is closed"));
        }
        Ok(())
    }

    fn check_unbound(&self, stream: &StreamInfo) -> BridgeResult<()> {
        self.ensure_open()?;
        if self.substreams.iter().any(|s| s.info().index == stream.index) {
            return Err(BridgeError::misuse(format!(
                "stream {} already has a substream",
                stream.index
            )));
        }
        Ok(())
    }

    fn push(&mut self, substream: TargetSubstream) -> usize {
        self.substreams.push(substream);
        self.substreams.len() - 1
    }

    /// Runs `op` on substream `id` with a sink that writes into the muxer.
    fn with_substream<T>(
        &mut self,
        id: usize,
        op: impl FnOnce(
            &mut TargetSubstream,
            &Pump,
            &mut dyn FnMut(Packet) -> BridgeResult<()>,
        ) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        self.ensure_open()?;
        let Self {
            muxer,
            substreams,
            pump,
            state,
            ..
        } = self;

        let substream = substreams
            .get_mut(id)
            .ok_or_else(|| BridgeError::misuse(format!("no target substream {id}")))?;
        let time_base = substream.info().time_base;
        let mut sink = |packet: Packet| state.write(muxer.as_mut(), packet, Some(time_base));
        op(substream, pump, &mut sink)
    }
}

impl Drop for TargetStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing target stream on drop failed: {e}");
        }
    }
}
