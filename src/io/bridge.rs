use std::{
    ffi::c_void,
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    common::errors::{BridgeError, BridgeResult},
    configs::IoConfig,
    io::{
        callbacks::{self, CallbackContext, ReadPacketFn, SeekFn, WritePacketFn},
        session::{ByteChannel, Endpoint, Handle, SessionKind},
        stream::{BridgedReader, BridgedWriter},
        table::SessionTable,
    },
};

/// Opens byte streams as engine I/O sessions.
///
/// Cloning is cheap; clones share the same session table.
#[derive(Clone)]
pub struct IoBridge {
    table: Arc<SessionTable>,
    buffer_size: usize,
}

impl IoBridge {
    pub fn new(config: &IoConfig) -> BridgeResult<Self> {
        if config.max_sessions == 0 || config.buffer_size == 0 {
            return Err(BridgeError::misuse(
                "I/O bridge needs at least one session and a non-empty buffer",
            ));
        }
        Ok(Self {
            table: Arc::new(SessionTable::new(config.max_sessions)),
            buffer_size: config.buffer_size,
        })
    }

    pub fn table(&self) -> &Arc<SessionTable> {
        &self.table
    }

    /// Number of bridged sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.table.live_count()
    }

    pub fn open_input<R: Read + Send + 'static>(&self, reader: R) -> BridgeResult<BridgedIo> {
        self.open_input_with_buffer(reader, self.buffer_size)
    }

    pub fn open_input_with_buffer<R: Read + Send + 'static>(
        &self,
        reader: R,
        buffer_size: usize,
    ) -> BridgeResult<BridgedIo> {
        self.open(Endpoint::Source(Box::new(reader)), buffer_size)
    }

    pub fn open_output<W: Write + Send + 'static>(&self, writer: W) -> BridgeResult<BridgedIo> {
        self.open_output_with_buffer(writer, self.buffer_size)
    }

    pub fn open_output_with_buffer<W: Write + Send + 'static>(
        &self,
        writer: W,
        buffer_size: usize,
    ) -> BridgeResult<BridgedIo> {
        self.open(Endpoint::Sink(Box::new(writer)), buffer_size)
    }

    /// Opens a readable, writable and seekable stream. This is the only kind
    /// of session the engine can seek.
    pub fn open_channel<C: ByteChannel + 'static>(&self, channel: C) -> BridgeResult<BridgedIo> {
        self.open_channel_with_buffer(channel, self.buffer_size)
    }

    pub fn open_channel_with_buffer<C: ByteChannel + 'static>(
        &self,
        channel: C,
        buffer_size: usize,
    ) -> BridgeResult<BridgedIo> {
        self.open(Endpoint::Channel(Box::new(channel)), buffer_size)
    }

    /// Opens a file as a seekable input channel.
    pub fn open_input_file(&self, path: impl AsRef<Path>) -> BridgeResult<BridgedIo> {
        let file = File::open(path.as_ref())?;
        debug!("opening input file {}", path.as_ref().display());
        self.open_channel(file)
    }

    /// Creates (or truncates) a file and opens it as a seekable output
    /// channel.
    pub fn open_output_file(&self, path: impl AsRef<Path>) -> BridgeResult<BridgedIo> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        debug!("opening output file {}", path.as_ref().display());
        self.open_channel(file)
    }

    fn open(&self, endpoint: Endpoint, buffer_size: usize) -> BridgeResult<BridgedIo> {
        if buffer_size == 0 || buffer_size > i32::MAX as usize {
            return Err(BridgeError::misuse(format!(
                "invalid I/O buffer size {buffer_size}"
            )));
        }

        let kind = endpoint.kind();
        let key = self.table.allocate(endpoint, buffer_size)?;
        Ok(BridgedIo {
            context: Arc::new(CallbackContext::new(self.table.clone(), key)),
            table: self.table.clone(),
            kind,
            buffer_size,
            closed: Mutex::new(false),
        })
    }
}

/// Owner of one open session.
///
/// Hands the engine its opaque pointer and callbacks, and closes the session
/// exactly once, either through [`close`](Self::close) or on drop.
pub struct BridgedIo {
    context: Arc<CallbackContext>,
    table: Arc<SessionTable>,
    kind: SessionKind,
    buffer_size: usize,
    closed: Mutex<bool>,
}

impl BridgedIo {
    pub fn handle(&self) -> Handle {
        self.context.handle()
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Size of the buffer the engine should allocate for this session.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn is_seekable(&self) -> bool {
        self.kind == SessionKind::Channel
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Opaque pointer to pass alongside the callbacks. Valid while `self`
    /// is alive.
    pub fn opaque(&self) -> *mut c_void {
        Arc::as_ptr(&self.context) as *mut c_void
    }

    pub fn read_callback(&self) -> Option<ReadPacketFn> {
        match self.kind {
            SessionKind::Input | SessionKind::Channel => Some(callbacks::read_packet),
            SessionKind::Output => None,
        }
    }

    pub fn write_callback(&self) -> Option<WritePacketFn> {
        match self.kind {
            SessionKind::Output | SessionKind::Channel => Some(callbacks::write_packet),
            SessionKind::Input => None,
        }
    }

    pub fn seek_callback(&self) -> Option<SeekFn> {
        self.is_seekable().then_some(callbacks::seek as SeekFn)
    }

    /// A `Read + Seek` view that moves bytes through the read and seek
    /// entry points, the same path the engine takes.
    pub fn reader(&self) -> BridgedReader {
        BridgedReader::new(self.context.clone())
    }

    pub fn writer(&self) -> BridgedWriter {
        BridgedWriter::new(self.context.clone())
    }

    /// Takes the last transfer failure on this session. Callbacks only
    /// report `-1` to the engine; this is where the cause ends up.
    pub fn take_fault(&self) -> Option<BridgeError> {
        self.table.resolve(self.handle()).ok()?.lock().take_fault()
    }

    /// Releases the session. Later calls do nothing.
    pub fn close(&self) {
        let mut closed = self.closed.lock();
        if *closed {
            return;
        }
        *closed = true;
        self.table.release(self.handle());
    }
}

impl Drop for BridgedIo {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for BridgedIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgedIo")
            .field("handle", &self.handle())
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        ffi::c_int,
        io::{Cursor, Read, Write},
        sync::Arc,
    };

    use parking_lot::Mutex;

    use super::*;
    use crate::common::status::{SEEK_SET, Status};

    fn bridge(max_sessions: usize) -> IoBridge {
        IoBridge::new(&IoConfig {
            max_sessions,
            buffer_size: 64,
        })
        .unwrap()
    }

    #[test]
    fn capacity_scenario() {
        let bridge = bridge(128);
        let mut open: Vec<BridgedIo> = (0..128)
            .map(|_| bridge.open_input(Cursor::new(Vec::<u8>::new())).unwrap())
            .collect();
        assert_eq!(bridge.open_sessions(), 128);

        let err = bridge.open_input(std::io::empty()).unwrap_err();
        assert!(matches!(err, BridgeError::CapacityExceeded { .. }));

        let released = open.remove(10);
        let freed = released.handle();
        released.close();

        let again = bridge.open_input(std::io::empty()).unwrap();
        assert_eq!(again.handle(), freed);
        assert_eq!(bridge.open_sessions(), 128);
    }

    #[test]
    fn close_is_idempotent_and_runs_on_drop() {
        let bridge = bridge(4);
        let io = bridge.open_input(std::io::empty()).unwrap();
        let other = bridge.open_input(std::io::empty()).unwrap();
        assert_eq!(bridge.open_sessions(), 2);

        io.close();
        io.close();
        assert!(io.is_closed());
        assert_eq!(bridge.open_sessions(), 1);

        drop(io);
        assert_eq!(bridge.open_sessions(), 1);
        drop(other);
        assert_eq!(bridge.open_sessions(), 0);
    }

    #[test]
    fn callbacks_match_session_kind() {
        let bridge = bridge(4);
        let input = bridge.open_input(std::io::empty()).unwrap();
        assert!(input.read_callback().is_some());
        assert!(input.write_callback().is_none());
        assert!(input.seek_callback().is_none());

        let output = bridge.open_output(Vec::<u8>::new()).unwrap();
        assert!(output.read_callback().is_none());
        assert!(output.write_callback().is_some());

        let channel = bridge.open_channel(Cursor::new(Vec::<u8>::new())).unwrap();
        assert!(channel.read_callback().is_some());
        assert!(channel.write_callback().is_some());
        assert!(channel.seek_callback().is_some());
    }

    /// Sink whose contents stay visible after the session takes ownership.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn engine_style_write_and_read() {
        let bridge = bridge(4);
        let sink = SharedSink::default();
        let output = bridge.open_output(sink.clone()).unwrap();

        let write = output.write_callback().unwrap();
        let payload = [5u8; 100];
        let written = unsafe { write(output.opaque(), payload.as_ptr(), payload.len() as c_int) };
        assert_eq!(written, 64);
        assert_eq!(sink.0.lock().len(), 64);

        let input = bridge.open_input(Cursor::new(vec![3u8; 10])).unwrap();
        let read = input.read_callback().unwrap();
        let mut buf = vec![0u8; input.buffer_size()];
        let n = unsafe { read(input.opaque(), buf.as_mut_ptr(), buf.len() as c_int) };
        assert_eq!(n, 10);
        let n = unsafe { read(input.opaque(), buf.as_mut_ptr(), buf.len() as c_int) };
        assert_eq!(n, Status::EOF.code());
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn callback_failures_leave_a_fault() {
        let bridge = bridge(4);
        let output = bridge.open_output(BrokenSink).unwrap();
        assert!(output.take_fault().is_none());

        let write = output.write_callback().unwrap();
        let payload = [1u8; 8];
        let status = unsafe { write(output.opaque(), payload.as_ptr(), payload.len() as c_int) };
        assert_eq!(status, Status::ERROR.code());

        let fault = output.take_fault().unwrap();
        assert!(matches!(fault, BridgeError::BridgeFault { op: "write", .. }));
        assert!(fault.to_string().contains(&format!("session {}", output.handle())));
    }

    #[test]
    fn files_open_as_channels() {
        let path = std::env::temp_dir().join(format!("avbridge-io-{}.bin", std::process::id()));
        let bridge = bridge(4);

        {
            let output = bridge.open_output_file(&path).unwrap();
            let mut writer = output.writer();
            writer.write_all(b"0123456789").unwrap();
            let seek = output.seek_callback().unwrap();
            assert_eq!(unsafe { seek(output.opaque(), 2, SEEK_SET) }, 2);
        }

        let input = bridge.open_input_file(&path).unwrap();
        let mut text = String::new();
        input.reader().read_to_string(&mut text).unwrap();
        assert_eq!(text, "0123456789");
        drop(input);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_empty_buffers() {
        let bridge = bridge(4);
        assert!(bridge.open_input_with_buffer(std::io::empty(), 0).is_err());
        assert!(IoBridge::new(&IoConfig {
            max_sessions: 0,
            buffer_size: 1
        })
        .is_err());
    }
}
