//! One bridged byte stream and the three transfer operations the native
//! engine performs on it.
//!
//! Sessions never see the engine directly: the callback layer hands them a
//! plain slice and turns the returned [`Status`] into the engine's calling
//! convention.

use std::{
    fmt,
    io::{self, Read, Seek, SeekFrom, Write},
};

use tracing::{debug, error, warn};

use crate::common::{
    errors::BridgeError,
    status::{AVSEEK_FORCE, AVSEEK_SIZE, SEEK_SET, Status},
};

/// Stable identifier of a session inside its [`SessionTable`](super::SessionTable).
pub type Handle = i32;

/// A byte stream that is readable, writable and seekable at once.
pub trait ByteChannel: Read + Write + Seek + Send {
    fn as_reader(&mut self) -> &mut dyn Read;
    fn as_writer(&mut self) -> &mut dyn Write;
}

impl<T: Read + Write + Seek + Send> ByteChannel for T {
    fn as_reader(&mut self) -> &mut dyn Read {
        self
    }

    fn as_writer(&mut self) -> &mut dyn Write {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Input,
    Output,
    Channel,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
            Self::Channel => f.write_str("channel"),
        }
    }
}

/// What a session transfers bytes to or from. Only a channel is both a
/// source and a sink, and only a channel can seek.
pub enum Endpoint {
    Source(Box<dyn Read + Send>),
    Sink(Box<dyn Write + Send>),
    Channel(Box<dyn ByteChannel>),
}

impl Endpoint {
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Source(_) => SessionKind::Input,
            Self::Sink(_) => SessionKind::Output,
            Self::Channel(_) => SessionKind::Channel,
        }
    }

    fn source(&mut self) -> Option<&mut dyn Read> {
        match self {
            Self::Source(r) => Some(r.as_mut()),
            Self::Channel(c) => Some(c.as_reader()),
            Self::Sink(_) => None,
        }
    }

    fn sink(&mut self) -> Option<&mut dyn Write> {
        match self {
            Self::Sink(w) => Some(w.as_mut()),
            Self::Channel(c) => Some(c.as_writer()),
            Self::Source(_) => None,
        }
    }

    /// Absolute seek; `None` when the endpoint is not seekable.
    fn seek_to(&mut self, offset: u64) -> Option<io::Result<u64>> {
        match self {
            Self::Channel(c) => Some(c.seek(SeekFrom::Start(offset))),
            _ => None,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

/// Diagnostic counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub operations: u64,
    pub bytes: u64,
}

pub struct IoSession {
    handle: Handle,
    kind: SessionKind,
    endpoint: Option<Endpoint>,
    transfer_size: usize,
    scratch: Vec<u8>,
    stats: SessionStats,
    last_fault: Option<BridgeError>,
}

impl IoSession {
    pub(crate) fn new(handle: Handle, endpoint: Endpoint, transfer_size: usize) -> Self {
        Self {
            handle,
            kind: endpoint.kind(),
            endpoint: Some(endpoint),
            transfer_size,
            scratch: Vec::new(),
            stats: SessionStats::default(),
            last_fault: None,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self.endpoint, Some(Endpoint::Channel(_)))
    }

    pub fn transfer_size(&self) -> usize {
        self.transfer_size
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Takes the most recent transfer failure. The engine only ever sees
    /// a negative return for it.
    pub fn take_fault(&mut self) -> Option<BridgeError> {
        self.last_fault.take()
    }

    /// Fills `out` from the source.
    ///
    /// Returns the byte count, [`Status::EOF`] when nothing was read and the
    /// source is exhausted, or [`Status::AGAIN`] when nothing was read and the
    /// source would block.
    pub fn read(&mut self, out: &mut [u8]) -> Status {
        let target = out.len().min(self.transfer_size);
        if self.scratch.len() < target {
            self.scratch.resize(target, 0);
        }

        let Some(source) = self.endpoint.as_mut().and_then(Endpoint::source) else {
            self.fault("read", "session has no readable source");
            return Status::ERROR;
        };

        let mut filled = 0;
        while filled < target {
            match source.read(&mut self.scratch[filled..target]) {
                Ok(0) => {
                    if filled == 0 {
                        debug!("I/O session id={} reached end of source", self.handle);
                        return Status::EOF;
                    }
                    break;
                }
                Ok(n) => {
                    let requested = target - filled;
                    filled += n.min(requested);
                    if n < requested {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if filled == 0 {
                        return Status::AGAIN;
                    }
                    break;
                }
                Err(e) => {
                    // A partial result still goes out; the fault is kept.
                    self.fault("read", e);
                    if filled == 0 {
                        return Status::ERROR;
                    }
                    break;
                }
            }
        }

        out[..filled].copy_from_slice(&self.scratch[..filled]);
        self.record(filled);
        Status::from_code(filled as i32)
    }

    /// Writes at most one transfer worth of `data` to the sink.
    pub fn write(&mut self, data: &[u8]) -> Status {
        let len = data.len().min(self.transfer_size);
        if len == 0 {
            error!(
                "I/O session id={} asked to write {} bytes",
                self.handle,
                data.len()
            );
            return Status::INVALID_ARGUMENT;
        }

        let Some(sink) = self.endpoint.as_mut().and_then(Endpoint::sink) else {
            self.fault("write", "session has no writable sink");
            return Status::ERROR;
        };

        match sink.write_all(&data[..len]) {
            Ok(()) => {
                self.record(len);
                Status::from_code(len as i32)
            }
            Err(e) => {
                self.fault("write", e);
                Status::ERROR
            }
        }
    }

    /// Seeks to an absolute `offset`. Size queries and relative modes are
    /// not supported and answer `-1`.
    pub fn seek(&mut self, offset: i64, whence: i32) -> i64 {
        let mode = whence & !AVSEEK_FORCE;
        if mode & AVSEEK_SIZE != 0 {
            return -1;
        }
        if mode != SEEK_SET {
            debug!(
                "I/O session id={} ignores seek with whence={whence}",
                self.handle
            );
            return -1;
        }
        if offset < 0 {
            return -1;
        }

        match self.endpoint.as_mut().and_then(|e| e.seek_to(offset as u64)) {
            Some(Ok(position)) => {
                self.stats.operations += 1;
                i64::try_from(position).unwrap_or(-1)
            }
            Some(Err(e)) => {
                self.fault("seek", format_args!("offset {offset}: {e}"));
                -1
            }
            None => -1,
        }
    }

    /// Flushes and drops the endpoint. Returns `true` only for the call that
    /// actually closed the session.
    pub(crate) fn close(&mut self) -> bool {
        let Some(mut endpoint) = self.endpoint.take() else {
            return false;
        };

        if let Err(e) = endpoint.flush() {
            warn!("I/O session id={} failed to flush on close: {e}", self.handle);
        }
        drop(endpoint);
        self.scratch = Vec::new();

        debug!(
            "closed {} I/O session id={} ({} ops, {} bytes)",
            self.kind, self.handle, self.stats.operations, self.stats.bytes
        );
        true
    }

    fn fault(&mut self, op: &'static str, reason: impl fmt::Display) {
        let fault = BridgeError::BridgeFault {
            op,
            handle: self.handle,
            reason: reason.to_string(),
        };
        warn!("{fault}");
        self.last_fault = Some(fault);
    }

    fn record(&mut self, bytes: usize) {
        self.stats.operations += 1;
        self.stats.bytes += bytes as u64;
    }
}

impl fmt::Debug for IoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoSession")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .field("transfer_size", &self.transfer_size)
            .field("stats", &self.stats)
            .finish()
    }
}
