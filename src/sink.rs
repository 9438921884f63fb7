//! Row sinks persisting decoded samples

use crate::decoder::Sample;
use crate::error::{CaptureError, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column names of a recording
pub const HEADER: [&str; 4] = ["t", "ax", "ay", "az"];

/// Ordered row consumer
pub trait RowSink: Send {
    /// Write the header row
    fn write_header(&mut self, fields: &[&str]) -> Result<()>;

    /// Append one data row
    fn write_row(&mut self, sample: &Sample) -> Result<()>;

    /// Flush everything written so far and finalize the sink
    fn close(&mut self) -> Result<()>;
}

/// Buffered CSV writer
///
/// Values use Rust's shortest round-trip `f64` formatting, so reading a row
/// back yields bit-identical numbers.
pub struct CsvSink<W: Write> {
    writer: BufWriter<W>,
    rows: u64,
    closed: bool,
}

impl CsvSink<File> {
    /// Create (or truncate) a CSV file, creating parent directories as needed
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(CaptureError::Sink)?;
            }
        }
        let file = File::create(path).map_err(CaptureError::Sink)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            // 64 KiB keeps per-row cost off the read loop at 16k rows/s
            writer: BufWriter::with_capacity(64 * 1024, writer),
            rows: 0,
            closed: false,
        }
    }

    /// Data rows written so far
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| CaptureError::Sink(e.into_error()))
    }
}

impl<W: Write + Send> RowSink for CsvSink<W> {
    fn write_header(&mut self, fields: &[&str]) -> Result<()> {
        writeln!(self.writer, "{}", fields.join(",")).map_err(CaptureError::Sink)
    }

    fn write_row(&mut self, sample: &Sample) -> Result<()> {
        writeln!(
            self.writer,
            "{},{},{},{}",
            sample.t, sample.ax, sample.ay, sample.az
        )
        .map_err(CaptureError::Sink)?;
        self.rows += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.writer.flush().map_err(CaptureError::Sink)?;
        self.closed = true;
        Ok(())
    }
}
