//! Byte sources feeding the frame decoder

use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Outcome of a single read attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were placed at the front of the buffer (n >= 1)
    Data(usize),
    /// Nothing arrived within the source's poll interval
    Idle,
    /// The source has ended and will not produce more bytes
    Eof,
}

/// A blocking supplier of raw bytes
///
/// Implementors only provide [`ByteSource::read_available`]; the single-byte
/// and exact-length reads are built on top of it.
pub trait ByteSource: Send {
    /// Read whatever is available, up to `buf.len()` bytes
    fn read_available(&mut self, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Read exactly one byte, blocking until it arrives
    ///
    /// Returns `None` at end of stream.
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.read_available(&mut byte)? {
                ReadOutcome::Data(_) => return Ok(Some(byte[0])),
                ReadOutcome::Idle => continue,
                ReadOutcome::Eof => return Ok(None),
            }
        }
    }

    /// Fill `buf` completely, blocking as needed
    ///
    /// Returns the number of bytes filled, which is short only at end of stream.
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_available(&mut buf[filled..])? {
                ReadOutcome::Data(n) => filled += n,
                ReadOutcome::Idle => continue,
                ReadOutcome::Eof => break,
            }
        }
        Ok(filled)
    }

    /// Release the underlying device
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Adapts any [`io::Read`] (serial port, file, in-memory buffer) into a [`ByteSource`]
pub struct ReaderSource<R> {
    reader: Option<R>,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader: Some(reader) }
    }

    /// Take back the wrapped reader, if the source is still open
    pub fn into_inner(self) -> Option<R> {
        self.reader
    }
}

impl ReaderSource<File> {
    /// Replay a raw byte dump from disk
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(CaptureError::SourceRead)?;
        Ok(Self::new(file))
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(ReadOutcome::Eof);
        };
        if buf.is_empty() {
            return Ok(ReadOutcome::Idle);
        }

        loop {
            match reader.read(buf) {
                Ok(0) => return Ok(ReadOutcome::Eof),
                Ok(n) => return Ok(ReadOutcome::Data(n)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
                {
                    return Ok(ReadOutcome::Idle)
                }
                Err(e) => return Err(CaptureError::SourceRead(e)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// Serial port source
pub type SerialSource = ReaderSource<Box<dyn serialport::SerialPort>>;

/// Open the configured serial port
///
/// The read timeout only bounds how long a read blocks before the capture
/// loop gets a chance to check for cancellation; timeouts surface as
/// [`ReadOutcome::Idle`], never as errors.
pub fn open_serial(config: &CaptureConfig) -> Result<SerialSource> {
    let port = serialport::new(config.port.as_str(), config.baud_rate)
        .timeout(config.read_timeout)
        .open()
        .map_err(|source| CaptureError::SourceOpen {
            port: config.port.clone(),
            source,
        })?;
    Ok(ReaderSource::new(port))
}
