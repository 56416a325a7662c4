//! Engine adapters.
//!
//! The bridge itself is engine-agnostic; this module plugs symphonia's
//! pure-Rust demuxers and audio decoders into the [`Demuxer`] and
//! [`Codec`] seams, reading through a bridged session.
//!
//! [`Demuxer`]: crate::source::Demuxer
//! [`Codec`]: crate::codec::Codec

pub mod symphonia;

pub use self::symphonia::{SymphoniaDecoder, SymphoniaDemuxer};
