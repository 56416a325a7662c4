//! `extern "C"` entry points handed to the native engine.
//!
//! The engine calls these with the opaque pointer it was given when the I/O
//! context was created. That pointer addresses a [`CallbackContext`], whose
//! leading four bytes are the session handle. Nothing may unwind out of
//! these functions, so every body runs under `catch_unwind` and every
//! failure becomes a negative return value.

use std::{
    ffi::{c_int, c_void},
    panic::{self, AssertUnwindSafe},
    slice,
    sync::Arc,
};

use tracing::{error, warn};

use crate::{
    common::status::Status,
    io::{
        session::Handle,
        table::{SessionKey, SessionTable, SharedSession},
    },
};

pub type ReadPacketFn =
    unsafe extern "C" fn(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int;
pub type WritePacketFn =
    unsafe extern "C" fn(opaque: *mut c_void, buf: *const u8, buf_size: c_int) -> c_int;
pub type SeekFn = unsafe extern "C" fn(opaque: *mut c_void, offset: i64, whence: c_int) -> i64;

/// Everything a callback needs to find its session.
#[repr(C)]
pub struct CallbackContext {
    handle: Handle,
    generation: u32,
    table: Arc<SessionTable>,
}

impl CallbackContext {
    pub(crate) fn new(table: Arc<SessionTable>, key: SessionKey) -> Self {
        Self {
            handle: key.handle,
            generation: key.generation,
            table,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    fn session(&self, op: &'static str) -> Option<SharedSession> {
        let key = SessionKey {
            handle: self.handle,
            generation: self.generation,
        };
        match self.table.resolve_key(key) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("{op} on I/O session id={}: {e}", self.handle);
                None
            }
        }
    }

    pub fn read(&self, out: &mut [u8]) -> Status {
        match self.session("read") {
            Some(session) => session.lock().read(out),
            None => Status::ERROR,
        }
    }

    pub fn write(&self, data: &[u8]) -> Status {
        match self.session("write") {
            Some(session) => session.lock().write(data),
            None => Status::ERROR,
        }
    }

    pub fn seek(&self, offset: i64, whence: i32) -> i64 {
        match self.session("seek") {
            Some(session) => session.lock().seek(offset, whence),
            None => -1,
        }
    }

    pub fn is_seekable(&self) -> bool {
        self.session("query")
            .is_some_and(|session| session.lock().is_seekable())
    }
}

/// Runs `body` and converts a panic into `fallback`.
fn guarded<T>(op: &'static str, fallback: T, body: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(_) => {
            error!("panic in native {op} callback");
            fallback
        }
    }
}

/// # Safety
///
/// `opaque` must be null or point to a live [`CallbackContext`].
unsafe fn context<'a>(opaque: *mut c_void) -> Option<&'a CallbackContext> {
    unsafe { (opaque as *const CallbackContext).as_ref() }
}

/// Read callback.
///
/// # Safety
///
/// `opaque` must come from [`BridgedIo::opaque`](super::BridgedIo::opaque)
/// of a wrapper that is still alive, and `buf` must be valid for writes of
/// `buf_size` bytes.
pub unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    guarded("read", Status::ERROR.code(), || {
        let Some(ctx) = (unsafe { context(opaque) }) else {
            return Status::ERROR.code();
        };
        if buf.is_null() || buf_size < 0 {
            error!(
                "read on I/O session id={} with invalid buffer (size={buf_size})",
                ctx.handle
            );
            return Status::INVALID_ARGUMENT.code();
        }
        let out = unsafe { slice::from_raw_parts_mut(buf, buf_size as usize) };
        ctx.read(out).code()
    })
}

/// Write callback.
///
/// # Safety
///
/// Same contract as [`read_packet`], with `buf` valid for reads.
pub unsafe extern "C" fn write_packet(
    opaque: *mut c_void,
    buf: *const u8,
    buf_size: c_int,
) -> c_int {
    guarded("write", Status::ERROR.code(), || {
        let Some(ctx) = (unsafe { context(opaque) }) else {
            return Status::ERROR.code();
        };
        if buf.is_null() || buf_size <= 0 {
            error!(
                "write on I/O session id={} with invalid buffer (size={buf_size})",
                ctx.handle
            );
            return Status::INVALID_ARGUMENT.code();
        }
        let data = unsafe { slice::from_raw_parts(buf, buf_size as usize) };
        ctx.write(data).code()
    })
}

/// Seek callback.
///
/// # Safety
///
/// `opaque` must satisfy the contract of [`read_packet`].
pub unsafe extern "C" fn seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    guarded("seek", -1, || match unsafe { context(opaque) } {
        Some(ctx) => ctx.seek(offset, whence),
        None => -1,
    })
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Cursor, Read},
        ptr,
    };

    use super::*;
    use crate::{
        common::status::SEEK_SET,
        io::session::Endpoint,
    };

    fn context_for(endpoint: Endpoint) -> (Arc<SessionTable>, Box<CallbackContext>) {
        let table = Arc::new(SessionTable::new(4));
        let key = table.allocate(endpoint, 16).unwrap();
        let ctx = Box::new(CallbackContext::new(table.clone(), key));
        (table, ctx)
    }

    fn opaque(ctx: &CallbackContext) -> *mut c_void {
        ctx as *const CallbackContext as *mut c_void
    }

    #[test]
    fn opaque_pointer_starts_with_handle() {
        let (_table, ctx) = context_for(Endpoint::Source(Box::new(io::empty())));
        let raw = unsafe { *(opaque(&ctx) as *const i32) };
        assert_eq!(raw, ctx.handle());
    }

    #[test]
    fn read_through_callback() {
        let (_table, ctx) =
            context_for(Endpoint::Source(Box::new(Cursor::new(b"hello".to_vec()))));
        let mut buf = [0u8; 32];

        let n = unsafe { read_packet(opaque(&ctx), buf.as_mut_ptr(), buf.len() as c_int) };
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], b"hello");

        let n = unsafe { read_packet(opaque(&ctx), buf.as_mut_ptr(), buf.len() as c_int) };
        assert_eq!(n, Status::EOF.code());
    }

    #[test]
    fn closed_session_reports_error() {
        let (table, ctx) = context_for(Endpoint::Source(Box::new(io::repeat(1))));
        table.release(ctx.handle());

        let mut buf = [0u8; 4];
        let n = unsafe { read_packet(opaque(&ctx), buf.as_mut_ptr(), 4) };
        assert_eq!(n, Status::ERROR.code());
        assert_eq!(unsafe { seek(opaque(&ctx), 0, SEEK_SET) }, -1);
    }

    #[test]
    fn null_arguments_do_not_crash() {
        let (_table, ctx) = context_for(Endpoint::Sink(Box::new(io::sink())));
        assert_eq!(
            unsafe { read_packet(ptr::null_mut(), ptr::null_mut(), 4) },
            Status::ERROR.code()
        );
        assert_eq!(
            unsafe { write_packet(opaque(&ctx), ptr::null(), 4) },
            Status::INVALID_ARGUMENT.code()
        );
        assert_eq!(
            unsafe { write_packet(opaque(&ctx), [1u8].as_ptr(), 0) },
            Status::INVALID_ARGUMENT.code()
        );
    }

    struct Exploding;

    impl Read for Exploding {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            panic!("source blew up");
        }
    }

    #[test]
    fn panics_stop_at_the_boundary() {
        let (_table, ctx) = context_for(Endpoint::Source(Box::new(Exploding)));
        let mut buf = [0u8; 8];
        let n = unsafe { read_packet(opaque(&ctx), buf.as_mut_ptr(), 8) };
        assert_eq!(n, Status::ERROR.code());
    }

    #[test]
    fn channel_seeks_through_callback() {
        let (_table, ctx) = context_for(Endpoint::Channel(Box::new(Cursor::new(vec![0u8; 32]))));
        assert_eq!(unsafe { seek(opaque(&ctx), 20, SEEK_SET) }, 20);
        assert!(ctx.is_seekable());
    }
}
