use tracing::debug;

use crate::{
    codec::{BoxedDecoder, Pump},
    common::{
        errors::{BridgeError, BridgeResult},
        types::{MediaType, Rational},
    },
    media::{
        AudioFormat, AudioFrame, FrameData, MediaFrame, Packet, RawFrame, StreamFormat,
        StreamInfo, VideoFrame,
    },
    source::queue::FrameQueue,
};

/// One decoded elementary stream of a [`SourceStream`](super::SourceStream).
///
/// Decoders are expected to stamp frames in the stream time base.
pub struct SourceSubstream {
    info: StreamInfo,
    decoder: BoxedDecoder,
    queue: FrameQueue<MediaFrame>,
    position: f64,
    last_timestamp: f64,
    decoding: bool,
    decoded: u64,
    closed: bool,
}

impl SourceSubstream {
    pub fn new(info: StreamInfo, decoder: BoxedDecoder) -> Self {
        Self {
            info,
            decoder,
            queue: FrameQueue::new(),
            position: 0.0,
            last_timestamp: 0.0,
            decoding: true,
            decoded: 0,
            closed: false,
        }
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn index(&self) -> usize {
        self.info.index
    }

    pub fn media_type(&self) -> MediaType {
        self.info.media_type()
    }

    pub fn format(&self) -> StreamFormat {
        self.info.format
    }

    pub fn time_base(&self) -> Rational {
        self.info.time_base
    }

    /// Seconds into the stream of the most recently decoded frame.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Latest wall-clock timestamp of any decoded frame.
    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }

    pub fn decoded_frames(&self) -> u64 {
        self.decoded
    }

    pub fn is_decoding(&self) -> bool {
        self.decoding
    }

    /// Turning decoding off makes the stream discard this substream's
    /// packets unread, which is how fast seeks skip ahead.
    pub fn set_decoding(&mut self, decoding: bool) {
        self.decoding = decoding;
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn try_next(&mut self) -> Option<MediaFrame> {
        self.queue.try_next()
    }

    pub fn try_peek(&self) -> Option<&MediaFrame> {
        self.queue.try_peek()
    }

    pub fn drain(&mut self) -> Vec<MediaFrame> {
        self.queue.drain()
    }

    pub fn flush(&mut self) -> usize {
        self.queue.flush()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the decoder. Closing twice is a usage error.
    pub fn close(&mut self) -> BridgeResult<()> {
        if self.closed {
            return Err(BridgeError::misuse(format!(
                "substream {} already closed",
                self.info.index
            )));
        }
        self.closed = true;
        self.queue.flush();
        self.decoder.close();
        debug!(
            "closed {} substream {} after {} frame(s)",
            self.media_type(),
            self.info.index,
            self.decoded
        );
        Ok(())
    }

    /// Runs `packet` through the decoder and queues every frame produced.
    pub(crate) fn decode(
        &mut self,
        pump: &Pump,
        packet: &Packet,
        created_time: f64,
    ) -> BridgeResult<usize> {
        if self.closed {
            return Err(BridgeError::misuse(format!(
                "substream {} is closed",
                self.info.index
            )));
        }

        let Self {
            info,
            decoder,
            queue,
            position,
            last_timestamp,
            decoded,
            ..
        } = self;

        pump.feed(decoder.as_mut(), Some(packet), |raw| {
            let frame = stamp_frame(info, raw, *position, created_time)?;
            *position = frame.position();
            *last_timestamp = last_timestamp.max(frame.timestamp());
            *decoded += 1;
            queue.put(frame);
            Ok(())
        })
    }
}

/// Turns a decoder frame into a consumer frame with stream position,
/// wall-clock timestamp and duration in seconds.
fn stamp_frame(
    info: &StreamInfo,
    raw: RawFrame,
    previous: f64,
    created_time: f64,
) -> BridgeResult<MediaFrame> {
    let tb = info.time_base;
    let position = raw.dts.or(raw.pts).map_or(previous, |ts| tb.seconds(ts));
    let timestamp = created_time + position;

    match (raw.data, info.format) {
        (FrameData::Audio { samples, channels }, StreamFormat::Audio(stream)) => {
            let format = AudioFormat::new(stream.sample_rate, channels);
            let mut frame = AudioFrame::new(format, samples);
            frame.time = if raw.duration > 0 {
                tb.seconds(raw.duration)
            } else {
                frame.samples_per_channel() as f64 / f64::from(stream.sample_rate.max(1))
            };
            frame.position = position;
            frame.timestamp = timestamp;
            Ok(MediaFrame::Audio(frame))
        }
        (
            FrameData::Video {
                width,
                height,
                pixel_format,
                data,
            },
            StreamFormat::Video(stream),
        ) => Ok(MediaFrame::Video(VideoFrame {
            timestamp,
            position,
            time: stream.frame_duration(),
            width,
            height,
            pixel_format,
            data,
        })),
        (_, format) => Err(BridgeError::misuse(format!(
            "decoder for {} stream {} produced a frame of the wrong kind",
            format.media_type(),
            info.index
        ))),
    }
}
