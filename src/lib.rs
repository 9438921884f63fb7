//! Serial acceleration capture library
//!
//! Decodes the framed acceleration stream of a MEMS sensor arriving over a
//! serial link (up to ~16,000 frames/s), persists the decoded samples and
//! reports throughput once per second. Two sensors can be captured
//! concurrently on independent ports.
//!
//! Pipeline per port:
//!
//! ```text
//! ByteSource -> FrameDecoder -> (sample | lost byte) -> CaptureSession -> RowSink
//!                                                            |
//!                                                       RateTracker (sps log, stop)
//! ```
//!
//! # Quick Start
//!
//! ## Decoding bytes
//! ```
//! use serial_accel_capture::{DecodeResult, DecoderConfig, FrameDecoder};
//!
//! let mut decoder = FrameDecoder::new(DecoderConfig::default());
//! let frame = [0x53, 0x00, 0x08, 0x00, 0x00, 0x00, 0xF8];
//!
//! let mut samples = Vec::new();
//! for byte in frame {
//!     if let DecodeResult::Decoded(sample) = decoder.next(byte) {
//!         samples.push(sample);
//!     }
//! }
//! assert_eq!(samples[0].ax, 1.0);
//! assert_eq!(samples[0].az, -1.0);
//! ```
//!
//! ## Capturing one port to CSV
//! ```no_run
//! use serial_accel_capture::{open_serial, CancelToken, CaptureConfig, CaptureSession, CsvSink};
//!
//! let config = CaptureConfig::for_port("/dev/ttyUSB0").with_duration(10);
//! let source = open_serial(&config)?;
//! let sink = CsvSink::create("data/USB0.csv")?;
//!
//! let report = CaptureSession::new(config, Box::new(source), Box::new(sink))
//!     .run(&CancelToken::new());
//! println!("{} frames, {} bytes lost", report.frames, report.lost_bytes);
//! if let Some(e) = report.error {
//!     return Err(e);
//! }
//! # Ok::<(), serial_accel_capture::CaptureError>(())
//! ```
//!
//! ## Capturing two ports concurrently
//! ```no_run
//! use serial_accel_capture::{CancelToken, CaptureConfig, DualCaptureCoordinator, SessionPlan};
//!
//! let first = SessionPlan::serial_csv(CaptureConfig::for_port("/dev/ttyUSB0"), CancelToken::new());
//! let second = SessionPlan::serial_csv(CaptureConfig::for_port("/dev/ttyUSB1"), CancelToken::new());
//!
//! let report = DualCaptureCoordinator::new(first, second).run();
//! for outcome in report.outcomes() {
//!     match &outcome.result {
//!         Ok(r) => println!("{}: {:?}, {} frames, {} bytes lost", outcome.port, r.state, r.frames, r.lost_bytes),
//!         Err(e) => println!("{}: failed: {}", outcome.port, e),
//!     }
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod decoder;
pub mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5_format;
pub mod rate;
pub mod recording;
pub mod session;
pub mod sink;
pub mod source;

#[cfg(test)]
mod testing;

// Re-export public API
pub use config::{CaptureConfig, DecoderConfig};
pub use coordinator::{DualCaptureCoordinator, DualCaptureReport, SessionOutcome, SessionPlan};
pub use decoder::{DecodeResult, FrameDecoder, RawFrame, Sample};
pub use error::{CaptureError, Result};
#[cfg(feature = "hdf5")]
pub use hdf5_format::Hdf5Sink;
pub use rate::{RateTracker, TrackerEvent};
pub use recording::RecordedSeries;
pub use session::{CancelToken, CaptureSession, SessionReport, SessionState, Termination};
pub use sink::{CsvSink, RowSink, HEADER};
pub use source::{open_serial, ByteSource, ReadOutcome, ReaderSource, SerialSource};
