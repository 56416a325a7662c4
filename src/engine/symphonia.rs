use std::io;

use bytes::Bytes;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, CodecParameters, Decoder, DecoderOptions},
    errors::Error,
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, trace, warn};

use crate::{
    codec::{BoxedDecoder, Codec},
    common::{
        errors::{BridgeError, BridgeResult},
        status::Status,
        types::Rational,
    },
    io::BridgedIo,
    media::{AudioFormat, FrameData, Packet, PacketFlags, RawFrame, StreamFormat, StreamInfo},
};

/// Maps a symphonia failure onto the sentinel a native engine would use.
fn status_of(err: &Error) -> Status {
    match err {
        Error::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => Status::EOF,
        Error::IoError(e) if e.kind() == io::ErrorKind::WouldBlock => Status::AGAIN,
        Error::DecodeError(_) | Error::Unsupported(_) => Status::INVALID_DATA,
        Error::LimitError(_) => Status::NO_MEMORY,
        _ => Status::ERROR,
    }
}

fn engine_error(op: &'static str, err: Error) -> BridgeError {
    BridgeError::Codec {
        op,
        code: status_of(&err).code(),
        message: err.to_string(),
    }
}

/// A container stream and the codec parameters needed to decode it.
#[derive(Clone)]
struct Track {
    id: u32,
    info: StreamInfo,
    params: CodecParameters,
}

/// Opens and reads a container through a bridged input session.
pub struct SymphoniaDemuxer {
    format: Box<dyn FormatReader>,
    tracks: Vec<Track>,
}

impl SymphoniaDemuxer {
    /// Opens the container behind `input`. `extension` is an optional
    /// format hint such as `"wav"` or `"mp4"`.
    pub fn open(input: &BridgedIo, extension: Option<&str>) -> BridgeResult<Self> {
        let mss = MediaSourceStream::new(Box::new(input.reader()), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let opened = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| engine_error("open_input", e))?;

        let format = opened.format;
        let tracks: Vec<Track> = format
            .tracks()
            .iter()
            .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .enumerate()
            .filter_map(|(index, t)| {
                let params = &t.codec_params;
                let Some(sample_rate) = params.sample_rate else {
                    debug!("skipping track {} without a sample rate", t.id);
                    return None;
                };
                let channels = params.channels.map_or(2, |c| c.count()) as u16;
                let time_base = params.time_base.map_or_else(
                    || Rational::new(1, i64::from(sample_rate)),
                    |tb| Rational::new(i64::from(tb.numer), i64::from(tb.denom)).reduce(),
                );

                Some(Track {
                    id: t.id,
                    info: StreamInfo {
                        index,
                        time_base,
                        format: StreamFormat::Audio(AudioFormat::new(sample_rate, channels)),
                        bit_rate: 0,
                    },
                    params: params.clone(),
                })
            })
            .collect();

        if tracks.is_empty() {
            return Err(BridgeError::Codec {
                op: "open_input",
                code: Status::INVALID_DATA.code(),
                message: "no decodable track found".into(),
            });
        }

        debug!(
            "opened container on session {} with {} track(s)",
            input.handle(),
            tracks.len()
        );
        Ok(Self { format, tracks })
    }

    /// Returns a factory for [`SourceStream::register_streams`] that binds
    /// a symphonia decoder to every stream this demuxer reported.
    ///
    /// [`SourceStream::register_streams`]: crate::source::SourceStream::register_streams
    pub fn decoder_factory(
        &self,
    ) -> impl FnMut(&StreamInfo) -> BridgeResult<Option<BoxedDecoder>> + 'static {
        let tracks = self.tracks.clone();
        move |info: &StreamInfo| {
            tracks
                .iter()
                .find(|t| t.info.index == info.index)
                .map(|t| SymphoniaDecoder::new(t.id, &t.params).map(|d| Box::new(d) as BoxedDecoder))
                .transpose()
        }
    }

    fn index_of(&self, track_id: u32) -> Option<usize> {
        self.tracks
            .iter()
            .find(|t| t.id == track_id)
            .map(|t| t.info.index)
    }
}

impl crate::source::Demuxer for SymphoniaDemuxer {
    fn streams(&self) -> Vec<StreamInfo> {
        self.tracks.iter().map(|t| t.info).collect()
    }

    fn read_frame(&mut self) -> Result<Packet, Status> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(e) => {
                    let status = status_of(&e);
                    if !status.is_eof() && !status.is_again() {
                        warn!("demux error: {e}");
                    }
                    return Err(status);
                }
            };

            let Some(stream_index) = self.index_of(packet.track_id()) else {
                trace!("dropping packet of unmapped track {}", packet.track_id());
                continue;
            };

            let pts = i64::try_from(packet.ts()).unwrap_or(i64::MAX);
            let duration = i64::try_from(packet.dur()).unwrap_or(i64::MAX);
            return Ok(Packet {
                stream_index,
                data: Bytes::from(packet.data),
                pts: Some(pts),
                dts: Some(pts),
                duration,
                flags: PacketFlags {
                    key: true,
                    corrupt: false,
                },
            });
        }
    }
}

/// Symphonia audio decoder behind the send/receive contract.
///
/// Symphonia decodes synchronously, so the decoder holds at most one frame
/// and answers [`Status::AGAIN`] until it is received.
pub struct SymphoniaDecoder {
    decoder: Box<dyn Decoder>,
    track_id: u32,
    pending: Option<RawFrame>,
    draining: bool,
    sample_buf: Option<SampleBuffer<f32>>,
    sample_buf_frames: u64,
}

impl SymphoniaDecoder {
    pub fn new(track_id: u32, params: &CodecParameters) -> BridgeResult<Self> {
        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| engine_error("open_decoder", e))?;

        Ok(Self {
            decoder,
            track_id,
            pending: None,
            draining: false,
            sample_buf: None,
            sample_buf_frames: 0,
        })
    }

    fn decode(&mut self, packet: &Packet) -> Status {
        let ts = packet.pts.unwrap_or(0).max(0) as u64;
        let dur = packet.duration.max(0) as u64;
        let input =
            symphonia::core::formats::Packet::new_from_slice(self.track_id, ts, dur, &packet.data);

        let decoded = match self.decoder.decode(&input) {
            Ok(decoded) => decoded,
            Err(Error::ResetRequired) => {
                self.decoder.reset();
                self.sample_buf = None;
                return Status::INVALID_DATA;
            }
            Err(e) => {
                warn!("decode error: {e}");
                return status_of(&e);
            }
        };

        if decoded.frames() == 0 {
            return Status::OK;
        }

        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;
        let buf = match &mut self.sample_buf {
            Some(buf) if self.sample_buf_frames >= capacity => buf,
            slot => {
                self.sample_buf_frames = capacity;
                slot.insert(SampleBuffer::<f32>::new(capacity, spec))
            }
        };
        buf.copy_interleaved_ref(decoded);

        self.pending = Some(RawFrame {
            pts: packet.pts,
            dts: packet.dts,
            duration: packet.duration,
            data: FrameData::Audio {
                samples: buf.samples().to_vec(),
                channels: spec.channels.count() as u16,
            },
        });
        Status::OK
    }
}

impl Codec for SymphoniaDecoder {
    type Input = Packet;
    type Output = RawFrame;

    fn send(&mut self, input: Option<&Packet>) -> Status {
        let Some(packet) = input else {
            self.draining = true;
            return Status::OK;
        };
        if self.draining {
            return Status::EOF;
        }
        if self.pending.is_some() {
            return Status::AGAIN;
        }
        self.decode(packet)
    }

    fn receive(&mut self) -> Result<RawFrame, Status> {
        match self.pending.take() {
            Some(frame) => Ok(frame),
            None if self.draining => Err(Status::EOF),
            None => Err(Status::AGAIN),
        }
    }

    fn close(&mut self) {
        self.pending = None;
        self.sample_buf = None;
        self.decoder.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{
        codec::Pump,
        configs::IoConfig,
        io::IoBridge,
        source::{Demuxer, SourceStream},
    };

    /// 16-bit PCM mono WAV holding a sawtooth.
    fn wav(sample_rate: u32, samples: usize) -> Vec<u8> {
        let data_len = (samples * 2) as u32;
        let mut out = Vec::with_capacity(44 + samples * 2);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..samples {
            let value = ((i % 200) as i16 - 100) * 300;
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    fn bridge() -> IoBridge {
        IoBridge::new(&IoConfig::default()).unwrap()
    }

    #[test]
    fn opens_wav_streams() {
        let bridge = bridge();
        let input = bridge.open_input(Cursor::new(wav(8000, 100))).unwrap();
        let demuxer = SymphoniaDemuxer::open(&input, Some("wav")).unwrap();

        let streams = demuxer.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].index, 0);
        assert_eq!(
            streams[0].format,
            StreamFormat::Audio(AudioFormat::new(8000, 1))
        );
        assert_eq!(streams[0].time_base, Rational::new(1, 8000));
    }

    #[test]
    fn garbage_is_rejected() {
        let bridge = bridge();
        let input = bridge.open_input(Cursor::new(vec![0u8; 64])).unwrap();
        let err = SymphoniaDemuxer::open(&input, None).err().unwrap();
        assert!(matches!(err, BridgeError::Codec { op: "open_input", .. }));
    }

    #[test]
    fn decodes_wav_end_to_end() {
        let bridge = bridge();
        let input = bridge.open_input(Cursor::new(wav(8000, 5000))).unwrap();
        let demuxer = SymphoniaDemuxer::open(&input, Some("wav")).unwrap();
        let factory = demuxer.decoder_factory();

        let mut stream = SourceStream::new(demuxer, Some(input), Pump::decoder(8), 64);
        assert_eq!(stream.register_streams(factory).unwrap(), 1);

        let mut total = 0;
        let mut last_position = -1.0;
        loop {
            match stream.next(0) {
                Ok(frame) => {
                    let audio = frame.as_audio().unwrap();
                    assert!(audio.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
                    assert!(audio.position > last_position);
                    last_position = audio.position;
                    total += audio.samples_per_channel();
                }
                Err(e) if e.is_eof() => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(total, 5000);
        assert!(last_position < 5000.0 / 8000.0);
        assert_eq!(bridge.open_sessions(), 1);
        stream.close();
        assert_eq!(bridge.open_sessions(), 0);
    }

    #[test]
    fn decoder_holds_one_frame() {
        let bridge = bridge();
        let input = bridge.open_input(Cursor::new(wav(8000, 8000))).unwrap();
        let mut demuxer = SymphoniaDemuxer::open(&input, Some("wav")).unwrap();
        let mut factory = demuxer.decoder_factory();
        let info = demuxer.streams()[0];
        let mut decoder = factory(&info).unwrap().unwrap();

        let first = demuxer.read_frame().unwrap();
        let second = demuxer.read_frame().unwrap();
        assert_eq!(decoder.send(Some(&first)), Status::OK);
        assert_eq!(decoder.send(Some(&second)), Status::AGAIN);
        assert!(decoder.receive().is_ok());
        assert_eq!(decoder.receive().err(), Some(Status::AGAIN));
        assert_eq!(decoder.send(None), Status::OK);
        assert_eq!(decoder.receive().err(), Some(Status::EOF));
    }
}
