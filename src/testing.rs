//! In-memory sources and sinks shared by the unit tests

use crate::decoder::{RawFrame, Sample, FRAME_LEN};
use crate::error::{CaptureError, Result};
use crate::source::{ByteSource, ReadOutcome};
use crate::sink::RowSink;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Cloneable writer backed by a shared byte buffer
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Encode `frames` back to back
pub fn frame_bytes(frames: &[RawFrame]) -> Vec<u8> {
    frames.iter().flat_map(|f| f.to_bytes(0x53)).collect()
}

/// Endless source of zero-valued frames, paced like a real sensor
///
/// Each read sleeps for `pause` and then hands out `frames_per_read` frames,
/// so 16 frames per millisecond approximates 16 kHz.
pub struct PacedFrames {
    frame: [u8; FRAME_LEN],
    offset: usize,
    frames_per_read: usize,
    pause: Duration,
}

impl PacedFrames {
    pub fn new(frames_per_read: usize, pause: Duration) -> Self {
        Self {
            frame: RawFrame::default().to_bytes(0x53),
            offset: 0,
            frames_per_read,
            pause,
        }
    }
}

impl ByteSource for PacedFrames {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        thread::sleep(self.pause);
        let n = buf.len().min(self.frames_per_read * FRAME_LEN);
        for slot in buf[..n].iter_mut() {
            *slot = self.frame[self.offset];
            self.offset = (self.offset + 1) % FRAME_LEN;
        }
        Ok(ReadOutcome::Data(n))
    }
}

/// Shared record of sink activity
#[derive(Clone, Default)]
pub struct SinkLog {
    closes: Arc<Mutex<Vec<(String, Instant, u64)>>>,
}

impl SinkLog {
    /// (label, close time, rows written) in close order
    pub fn closes(&self) -> Vec<(String, Instant, u64)> {
        self.closes.lock().unwrap().clone()
    }
}

/// Sink that only counts rows and logs when it is closed
pub struct CountingSink {
    label: String,
    rows: u64,
    fail_after: Option<u64>,
    log: SinkLog,
}

impl CountingSink {
    pub fn new(label: &str, log: &SinkLog) -> Self {
        Self {
            label: label.to_string(),
            rows: 0,
            fail_after: None,
            log: log.clone(),
        }
    }

    /// Fail every write once `rows` rows have been accepted
    pub fn failing_after(mut self, rows: u64) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

impl RowSink for CountingSink {
    fn write_header(&mut self, _fields: &[&str]) -> Result<()> {
        Ok(())
    }

    fn write_row(&mut self, _sample: &Sample) -> Result<()> {
        if self.fail_after.is_some_and(|limit| self.rows >= limit) {
            return Err(CaptureError::Sink(io::Error::new(
                io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.rows += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log
            .closes
            .lock()
            .unwrap()
            .push((self.label.clone(), Instant::now(), self.rows));
        Ok(())
    }
}
