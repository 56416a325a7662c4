//! Safe `std::io` adapters over the bridge entry points.
//!
//! Pure-Rust engines (symphonia in particular) consume these instead of the
//! raw callbacks, so their traffic follows the same session path, limits
//! and sentinels as a native engine's.

use std::{
    io::{self, Read, Seek, SeekFrom, Write},
    sync::Arc,
};

use symphonia::core::io::MediaSource;

use crate::{
    common::status::{SEEK_SET, Status},
    io::callbacks::CallbackContext,
};

fn status_error(op: &str, status: Status) -> io::Error {
    io::Error::other(format!("bridged {op} failed: {status}"))
}

pub struct BridgedReader {
    context: Arc<CallbackContext>,
    position: u64,
}

impl BridgedReader {
    pub(crate) fn new(context: Arc<CallbackContext>) -> Self {
        Self {
            context,
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Read for BridgedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let status = self.context.read(buf);
        if status.is_eof() {
            Ok(0)
        } else if status.is_again() {
            Err(io::ErrorKind::WouldBlock.into())
        } else if status.is_error() {
            Err(status_error("read", status))
        } else {
            let n = status.code() as usize;
            self.position += n as u64;
            Ok(n)
        }
    }
}

impl Seek for BridgedReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(delta) => self
                .position
                .checked_add_signed(delta)
                .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?,
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "bridged streams have no known length",
                ));
            }
        };

        let offset = i64::try_from(target).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let result = self.context.seek(offset, SEEK_SET);
        if result < 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("bridged seek to {target} failed"),
            ));
        }

        self.position = result as u64;
        Ok(self.position)
    }
}

impl MediaSource for BridgedReader {
    fn is_seekable(&self) -> bool {
        self.context.is_seekable()
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

pub struct BridgedWriter {
    context: Arc<CallbackContext>,
}

impl BridgedWriter {
    pub(crate) fn new(context: Arc<CallbackContext>) -> Self {
        Self { context }
    }
}

impl Write for BridgedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let status = self.context.write(buf);
        if status.is_error() {
            Err(status_error("write", status))
        } else {
            Ok(status.code() as usize)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{configs::IoConfig, io::IoBridge};

    fn bridge() -> IoBridge {
        IoBridge::new(&IoConfig {
            max_sessions: 4,
            buffer_size: 8,
        })
        .unwrap()
    }

    #[test]
    fn reader_honours_transfer_size() {
        let bridge = bridge();
        let io = bridge.open_input(Cursor::new((0u8..20).collect::<Vec<_>>())).unwrap();
        let mut reader = io.reader();

        let mut buf = [0u8; 32];
        assert_eq!(reader.read(&mut buf).unwrap(), 8);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, (8u8..20).collect::<Vec<_>>());
        assert_eq!(reader.position(), 20);
    }

    #[test]
    fn reader_seeks_only_on_channels() {
        let bridge = bridge();
        let input = bridge.open_input(Cursor::new(vec![0u8; 4])).unwrap();
        let mut reader = input.reader();
        assert!(!reader.is_seekable());
        assert!(reader.seek(SeekFrom::Start(1)).is_err());

        let channel = bridge.open_channel(Cursor::new((0u8..16).collect::<Vec<_>>())).unwrap();
        let mut reader = channel.reader();
        assert!(reader.is_seekable());
        assert_eq!(reader.seek(SeekFrom::Start(10)).unwrap(), 10);
        assert_eq!(reader.seek(SeekFrom::Current(-4)).unwrap(), 6);

        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 6);
    }

    #[test]
    fn closed_session_surfaces_io_error() {
        let bridge = bridge();
        let io = bridge.open_input(Cursor::new(vec![1u8; 4])).unwrap();
        let mut reader = io.reader();
        io.close();
        assert!(reader.read(&mut [0u8; 4]).is_err());
    }

    #[test]
    fn writer_splits_large_writes() {
        let bridge = bridge();
        let io = bridge.open_output(std::io::sink()).unwrap();
        let mut writer = io.writer();
        assert_eq!(writer.write(&[0u8; 20]).unwrap(), 8);
        writer.write_all(&[0u8; 20]).unwrap();
    }
}
