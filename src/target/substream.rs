use tracing::debug;

use crate::{
    codec::{BoxedEncoder, Pump},
    common::{
        errors::{BridgeError, BridgeResult},
        types::{MediaType, Rational},
    },
    media::{
        AudioFormat, AudioFrame, FrameData, Packet, PixelFormat, RawFrame, StreamInfo,
        VideoFormat, VideoFrame,
    },
};

/// Receives encoded packets, already stamped for the container stream.
pub type PacketSink<'a> = dyn FnMut(Packet) -> BridgeResult<()> + 'a;

/// Moves an encoder packet from the codec time base into the stream time
/// base and tags it with the stream index.
fn stamp_packet(mut packet: Packet, info: &StreamInfo, codec_time_base: Rational) -> Packet {
    let to_stream = |ts: i64| Rational::rescale(ts, codec_time_base, info.time_base);
    packet.pts = packet.pts.map(to_stream);
    packet.dts = packet.dts.map(to_stream).or(packet.pts);
    packet.duration = to_stream(packet.duration);
    packet.stream_index = info.index;
    packet
}

/// Encodes interleaved float audio in exact codec-sized frames.
pub struct AudioTargetSubstream {
    info: StreamInfo,
    format: AudioFormat,
    codec_time_base: Rational,
    encoder: BoxedEncoder,
    frame_size: usize,
    buffer: Vec<f32>,
    written_samples: u64,
    closed: bool,
}

impl AudioTargetSubstream {
    /// `frame_size` is samples per channel per encoded frame.
    pub fn new(
        info: StreamInfo,
        format: AudioFormat,
        codec_time_base: Rational,
        encoder: BoxedEncoder,
        frame_size: usize,
    ) -> BridgeResult<Self> {
        if format.channels == 0 || frame_size == 0 {
            return Err(BridgeError::misuse(format!(
                "audio substream {} needs channels and a frame size",
                info.index
            )));
        }
        let capacity = 2 * frame_size * usize::from(format.channels);
        Ok(Self {
            info,
            format,
            codec_time_base,
            encoder,
            frame_size,
            buffer: Vec::with_capacity(capacity),
            written_samples: 0,
            closed: false,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples per channel handed to the encoder so far.
    pub fn written_samples(&self) -> u64 {
        self.written_samples
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer.len() / self.channels()
    }

    pub fn position(&self) -> f64 {
        self.written_samples as f64 / f64::from(self.format.sample_rate.max(1))
    }

    fn channels(&self) -> usize {
        usize::from(self.format.channels)
    }

    fn chunk_len(&self) -> usize {
        self.frame_size * self.channels()
    }

    /// Buffers `frame` and encodes every complete codec frame it fills.
    pub fn write(
        &mut self,
        frame: &AudioFrame,
        pump: &Pump,
        sink: &mut PacketSink<'_>,
    ) -> BridgeResult<()> {
        if frame.format != self.format {
            return Err(BridgeError::misuse(format!(
                "audio substream {} expects {}, got {}",
                self.info.index, self.format, frame.format
            )));
        }

        let capacity = 2 * self.chunk_len();
        let mut rest = frame.samples.as_slice();
        while !rest.is_empty() {
            let take = (capacity - self.buffer.len()).min(rest.len());
            self.buffer.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            self.drain_buffer(false, pump, sink)?;
        }
        Ok(())
    }

    /// Encodes one codec frame directly. Frames longer than the codec frame
    /// size are rejected, and so is any call while [`write`](Self::write)
    /// still has samples buffered.
    pub fn encode_frame(
        &mut self,
        samples: &[f32],
        pump: &Pump,
        sink: &mut PacketSink<'_>,
    ) -> BridgeResult<usize> {
        if !self.buffer.is_empty() {
            return Err(BridgeError::misuse(format!(
                "audio substream {} has {} buffered samples; flush before encoding frames directly",
                self.info.index,
                self.buffered_samples()
            )));
        }
        if samples.len() % self.channels() != 0 {
            return Err(BridgeError::misuse(format!(
                "{} samples do not split into {} channels",
                samples.len(),
                self.channels()
            )));
        }

        let per_channel = samples.len() / self.channels();
        if per_channel > self.frame_size {
            return Err(BridgeError::misuse(format!(
                "invalid frame size: {per_channel} > {}",
                self.frame_size
            )));
        }
        self.encode_samples(samples.to_vec(), pump, sink)
    }

    /// Encodes whatever is buffered, including a short final frame, then
    /// drains the encoder.
    pub fn flush(&mut self, pump: &Pump, sink: &mut PacketSink<'_>) -> BridgeResult<()> {
        self.drain_buffer(true, pump, sink)?;

        let Self {
            encoder,
            info,
            codec_time_base,
            ..
        } = self;
        pump.feed(encoder.as_mut(), None, |packet| {
            sink(stamp_packet(packet, info, *codec_time_base))
        })?;
        Ok(())
    }

    fn drain_buffer(
        &mut self,
        flush: bool,
        pump: &Pump,
        sink: &mut PacketSink<'_>,
    ) -> BridgeResult<()> {
        let chunk = self.chunk_len();
        let minimum = if flush { 1 } else { chunk };

        while self.buffer.len() >= minimum {
            let take = self.buffer.len().min(chunk);
            let samples: Vec<f32> = self.buffer.drain(..take).collect();
            self.encode_samples(samples, pump, sink)?;
        }
        Ok(())
    }

    fn encode_samples(
        &mut self,
        mut samples: Vec<f32>,
        pump: &Pump,
        sink: &mut PacketSink<'_>,
    ) -> BridgeResult<usize> {
        for sample in &mut samples {
            *sample = sample.clamp(-1.0, 1.0);
        }

        let per_channel = samples.len() / self.channels();
        let sample_tb = self.format.sample_time_base();
        let frame = RawFrame {
            pts: Some(Rational::rescale(
                self.written_samples as i64,
                sample_tb,
                self.codec_time_base,
            )),
            dts: None,
            duration: Rational::rescale(per_channel as i64, sample_tb, self.codec_time_base),
            data: FrameData::Audio {
                samples,
                channels: self.format.channels,
            },
        };

        let Self {
            encoder,
            info,
            codec_time_base,
            ..
        } = self;
        let packets = pump.feed(encoder.as_mut(), Some(&frame), |packet| {
            sink(stamp_packet(packet, info, *codec_time_base))
        })?;

        self.written_samples += per_channel as u64;
        Ok(packets)
    }
}

/// Encodes video frames, stamping pts from the frame counter.
pub struct VideoTargetSubstream {
    info: StreamInfo,
    format: VideoFormat,
    pixel_format: PixelFormat,
    codec_time_base: Rational,
    encoder: BoxedEncoder,
    written_frames: u64,
    closed: bool,
}

impl VideoTargetSubstream {
    pub fn new(
        info: StreamInfo,
        format: VideoFormat,
        pixel_format: PixelFormat,
        codec_time_base: Rational,
        encoder: BoxedEncoder,
    ) -> Self {
        Self {
            info,
            format,
            pixel_format,
            codec_time_base,
            encoder,
            written_frames: 0,
            closed: false,
        }
    }

    pub fn written_frames(&self) -> u64 {
        self.written_frames
    }

    pub fn position(&self) -> f64 {
        self.written_frames as f64 * self.format.frame_duration()
    }

    pub fn write(
        &mut self,
        frame: &VideoFrame,
        pump: &Pump,
        sink: &mut PacketSink<'_>,
    ) -> BridgeResult<usize> {
        if frame.pixel_format != self.pixel_format {
            return Err(BridgeError::misuse(format!(
                "video substream {} expects {:?} frames, got {:?}",
                self.info.index, self.pixel_format, frame.pixel_format
            )));
        }

        let frame_tb = self.format.frame_rate.invert();
        let raw = RawFrame {
            pts: Some(Rational::rescale(
                self.written_frames as i64,
                frame_tb,
                self.codec_time_base,
            )),
            dts: None,
            duration: Rational::rescale(1, frame_tb, self.codec_time_base),
            data: FrameData::Video {
                width: frame.width,
                height: frame.height,
                pixel_format: frame.pixel_format,
                data: frame.data.clone(),
            },
        };

        let packets = self.feed(Some(&raw), pump, sink)?;
        self.written_frames += 1;
        Ok(packets)
    }

    pub fn flush(&mut self, pump: &Pump, sink: &mut PacketSink<'_>) -> BridgeResult<()> {
        self.feed(None, pump, sink).map(|_| ())
    }

    fn feed(
        &mut self,
        frame: Option<&RawFrame>,
        pump: &Pump,
        sink: &mut PacketSink<'_>,
    ) -> BridgeResult<usize> {
        let Self {
            encoder,
            info,
            codec_time_base,
            ..
        } = self;
        pump.feed(encoder.as_mut(), frame, |packet| {
            // Packets without a pts are passed through untouched.
            if packet.pts.is_none() {
                return sink(Packet {
                    stream_index: info.index,
                    ..packet
                });
            }
            sink(stamp_packet(packet, info, *codec_time_base))
        })
    }
}

pub enum TargetSubstream {
    Audio(AudioTargetSubstream),
    Video(VideoTargetSubstream),
}

impl TargetSubstream {
    pub fn info(&self) -> &StreamInfo {
        match self {
            Self::Audio(s) => &s.info,
            Self::Video(s) => &s.info,
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Audio(_) => MediaType::Audio,
            Self::Video(_) => MediaType::Video,
        }
    }

    pub fn position(&self) -> f64 {
        match self {
            Self::Audio(s) => s.position(),
            Self::Video(s) => s.position(),
        }
    }

    pub fn flush(&mut self, pump: &Pump, sink: &mut PacketSink<'_>) -> BridgeResult<()> {
        match self {
            Self::Audio(s) => s.flush(pump, sink),
            Self::Video(s) => s.flush(pump, sink),
        }
    }

    /// Releases the encoder. Later calls do nothing.
    pub fn close(&mut self) {
        let (closed, encoder, index) = match self {
            Self::Audio(s) => (&mut s.closed, &mut s.encoder, s.info.index),
            Self::Video(s) => (&mut s.closed, &mut s.encoder, s.info.index),
        };
        if *closed {
            return;
        }
        *closed = true;
        encoder.close();
        debug!("closed {} target substream {index}", self.media_type());
    }
}
