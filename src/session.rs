//! One capture run: source -> decoder -> sink, bounded by the rate tracker
//!
//! State machine: `Idle -> Reading -> (Completed | Interrupted)`. A session is
//! `Idle` until `run`, `Reading` inside it, and `run` consumes it to return a
//! report in one of the terminal states.

use crate::config::CaptureConfig;
use crate::decoder::{DecodeResult, FrameDecoder};
use crate::error::{CaptureError, Result};
use crate::rate::{RateTracker, TrackerEvent};
use crate::sink::{RowSink, HEADER};
use crate::source::{ByteSource, ReadOutcome};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Bytes requested from the source per read
const READ_CHUNK: usize = 1024;

/// Cooperative stop signal, checked before every read
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Reading,
    Completed,
    Interrupted,
}

/// Why the read loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The target number of whole seconds elapsed
    DurationReached,
    /// The cancel token was triggered
    Cancelled,
    /// The source ended before the duration elapsed
    EndOfStream,
    /// The source or sink returned an error
    Failed,
}

impl Termination {
    fn state(self) -> SessionState {
        match self {
            Termination::DurationReached | Termination::EndOfStream => SessionState::Completed,
            Termination::Cancelled | Termination::Failed => SessionState::Interrupted,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::DurationReached => write!(f, "duration reached"),
            Termination::Cancelled => write!(f, "interrupted"),
            Termination::EndOfStream => write!(f, "source ended"),
            Termination::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of a finished session
///
/// Built on every exit path. A failed session carries its totals up to the
/// failure alongside the error.
#[derive(Debug)]
pub struct SessionReport {
    pub port: String,
    pub state: SessionState,
    pub termination: Termination,
    /// Frames decoded and written
    pub frames: u64,
    /// Bytes lost to framing errors
    pub lost_bytes: u64,
    /// Whole-second windows closed by the rate tracker
    pub seconds_elapsed: u32,
    /// An incomplete frame was dropped at end of stream
    pub partial_frame_discarded: bool,
    /// Wall-clock time spent in the read loop
    pub wall_time: Duration,
    /// Source or sink failure that ended the session
    pub error: Option<CaptureError>,
}

impl SessionReport {
    /// Mean decoded frames per second of wall time
    pub fn mean_rate(&self) -> f64 {
        let secs = self.wall_time.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Capture from one source into one sink
pub struct CaptureSession {
    config: CaptureConfig,
    source: Box<dyn ByteSource>,
    sink: Box<dyn RowSink>,
    decoder: FrameDecoder,
    tracker: RateTracker,
    rows_written: u64,
    partial_discarded: bool,
}

impl CaptureSession {
    pub fn new(config: CaptureConfig, source: Box<dyn ByteSource>, sink: Box<dyn RowSink>) -> Self {
        let decoder = FrameDecoder::new(config.decoder);
        let tracker = RateTracker::new(config.duration_secs, Instant::now());
        Self {
            config,
            source,
            sink,
            decoder,
            tracker,
            rows_written: 0,
            partial_discarded: false,
        }
    }

    /// Run until the duration elapses, the source ends or `cancel` fires
    ///
    /// The sink is closed and the source released on every exit path. On a
    /// source or sink failure the report is `Interrupted` with termination
    /// `Failed` and holds the first error.
    pub fn run(mut self, cancel: &CancelToken) -> SessionReport {
        let started = Instant::now();
        info!(
            "{}: capturing for {} s at {} sps",
            self.config.port, self.config.duration_secs, self.config.decoder.sample_rate
        );

        let outcome = self.capture(cancel, started);
        let closed = self.sink.close();
        if let Err(e) = self.source.close() {
            warn!("{}: failed to release source: {}", self.config.port, e);
        }

        let (termination, error) = match (outcome, closed) {
            (Ok(termination), Ok(())) => (termination, None),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => (Termination::Failed, Some(e)),
            (Err(e), Err(close_err)) => {
                warn!("{}: sink close failed after error: {}", self.config.port, close_err);
                (Termination::Failed, Some(e))
            }
        };

        let report = SessionReport {
            port: self.config.port.clone(),
            state: termination.state(),
            termination,
            frames: self.rows_written,
            lost_bytes: self.decoder.total_lost(),
            seconds_elapsed: self.tracker.elapsed_secs(),
            partial_frame_discarded: self.partial_discarded,
            wall_time: started.elapsed(),
            error,
        };
        match &report.error {
            Some(e) => warn!(
                "{}: capture failed after {} frames, {} bytes lost: {}",
                report.port, report.frames, report.lost_bytes, e
            ),
            None => info!(
                "{}: {} after {} s, {} frames, {} bytes lost",
                report.port, termination, report.seconds_elapsed, report.frames, report.lost_bytes
            ),
        }
        report
    }

    fn capture(&mut self, cancel: &CancelToken, started: Instant) -> Result<Termination> {
        self.sink.write_header(&HEADER)?;
        self.tracker = RateTracker::new(self.config.duration_secs, started);

        let mut buf = [0u8; READ_CHUNK];
        let mut window_lost = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Ok(Termination::Cancelled);
            }

            let n = match self.source.read_available(&mut buf)? {
                ReadOutcome::Data(n) => n,
                ReadOutcome::Idle => continue,
                ReadOutcome::Eof => {
                    self.partial_discarded = self.decoder.discard_partial() > 0;
                    return Ok(Termination::EndOfStream);
                }
            };

            // One clock read per chunk is plenty at whole-second granularity
            let now = Instant::now();
            for &byte in &buf[..n] {
                let event = match self.decoder.next(byte) {
                    DecodeResult::Decoded(sample) => {
                        self.sink.write_row(&sample)?;
                        self.rows_written += 1;
                        self.tracker.observe(true, now)
                    }
                    DecodeResult::Lost { run } => {
                        window_lost += 1;
                        if run == 1 {
                            warn!(
                                "{}: out of sync at frame {}, dropped byte 0x{:02X}",
                                self.config.port,
                                self.decoder.frames_decoded(),
                                byte
                            );
                        } else {
                            debug!("{}: lost byte 0x{:02X} (run {})", self.config.port, byte, run);
                        }
                        self.tracker.observe(false, now)
                    }
                    DecodeResult::Pending => continue,
                };

                match event {
                    TrackerEvent::None => {}
                    TrackerEvent::SecondElapsed { count, .. } => {
                        info!("{}: {} sps ({} bytes lost)", self.config.port, count, window_lost);
                        window_lost = 0;
                    }
                    TrackerEvent::DurationReached { count, .. } => {
                        info!("{}: {} sps ({} bytes lost)", self.config.port, count, window_lost);
                        return Ok(Termination::DurationReached);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RawFrame;
    use crate::recording::RecordedSeries;
    use crate::sink::CsvSink;
    use crate::source::ReaderSource;
    use crate::testing::{frame_bytes, CountingSink, PacedFrames, SharedBuf, SinkLog};
    use std::io::{self, Cursor, Read};
    use std::thread;

    fn config(duration: u32) -> CaptureConfig {
        CaptureConfig::for_port("/dev/ttyTEST").with_duration(duration)
    }

    fn csv_session(bytes: Vec<u8>, duration: u32) -> (CaptureSession, SharedBuf) {
        let buf = SharedBuf::default();
        let session = CaptureSession::new(
            config(duration),
            Box::new(ReaderSource::new(Cursor::new(bytes))),
            Box::new(CsvSink::new(buf.clone())),
        );
        (session, buf)
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    #[test]
    fn test_stream_end_completes_with_rows() {
        let frames: Vec<RawFrame> = (0..10)
            .map(|i| RawFrame { x: i, y: -i, z: 2048 })
            .collect();
        let mut bytes = vec![0x00, 0x01, 0x02];
        bytes.extend(frame_bytes(&frames));
        // Trailing partial frame: sync + 4 of 6 payload bytes
        bytes.extend_from_slice(&[0x53, 0x01, 0x02, 0x03, 0x04]);

        let (session, buf) = csv_session(bytes, 5);
        let report = session.run(&CancelToken::new());

        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.termination, Termination::EndOfStream);
        assert_eq!(report.frames, 10);
        assert_eq!(report.lost_bytes, 3);
        assert!(report.partial_frame_discarded);

        let series = RecordedSeries::from_csv_reader(Cursor::new(buf.contents())).unwrap();
        assert_eq!(series.len(), 10);
        assert_eq!(series.t[9], 9.0 / 16000.0);
        assert_eq!(series.ax[3], 3.0 * 16.0 / 32768.0);
        assert_eq!(series.az[0], 1.0);
        assert!(buf.contents().starts_with("t,ax,ay,az\n"));
    }

    #[test]
    fn test_empty_source_writes_header_only() {
        let (session, buf) = csv_session(Vec::new(), 5);
        let report = session.run(&CancelToken::new());

        assert_eq!(report.frames, 0);
        assert!(!report.partial_frame_discarded);
        assert_eq!(buf.contents(), "t,ax,ay,az\n");
    }

    #[test]
    fn test_cancel_before_start_is_interrupted() {
        let bytes = frame_bytes(&[RawFrame::default(); 4]);
        let (session, buf) = csv_session(bytes, 5);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = session.run(&cancel);

        assert_eq!(report.state, SessionState::Interrupted);
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.frames, 0);
        // Header still flushed
        assert_eq!(buf.contents(), "t,ax,ay,az\n");
    }

    #[test]
    fn test_duration_stops_endless_source() {
        let log = SinkLog::default();
        let session = CaptureSession::new(
            config(1),
            Box::new(PacedFrames::new(16, Duration::from_millis(1))),
            Box::new(CountingSink::new("a", &log)),
        );

        let report = session.run(&CancelToken::new());

        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.termination, Termination::DurationReached);
        assert_eq!(report.seconds_elapsed, 1);
        assert_eq!(report.lost_bytes, 0);
        assert!(report.frames > 0);
        assert!(report.wall_time >= Duration::from_secs(1));

        let closes = log.closes();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].2, report.frames);
    }

    #[test]
    fn test_cancel_mid_run() {
        let log = SinkLog::default();
        let session = CaptureSession::new(
            config(60),
            Box::new(PacedFrames::new(16, Duration::from_millis(1))),
            Box::new(CountingSink::new("a", &log)),
        );
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            remote.cancel();
        });

        let report = session.run(&cancel);
        stopper.join().unwrap();

        assert_eq!(report.state, SessionState::Interrupted);
        assert!(report.wall_time < Duration::from_secs(5));
        assert_eq!(log.closes().len(), 1);
    }

    #[test]
    fn test_sink_failure_still_closes() {
        let log = SinkLog::default();
        let mut bytes = vec![0x00, 0x01];
        bytes.extend(frame_bytes(&[RawFrame::default(); 8]));
        let session = CaptureSession::new(
            config(5),
            Box::new(ReaderSource::new(Cursor::new(bytes))),
            Box::new(CountingSink::new("a", &log).failing_after(3)),
        );

        let report = session.run(&CancelToken::new());

        assert!(matches!(report.error, Some(CaptureError::Sink(_))));
        assert_eq!(report.state, SessionState::Interrupted);
        assert_eq!(report.termination, Termination::Failed);
        assert_eq!(report.frames, 3);
        assert_eq!(report.lost_bytes, 2);
        let closes = log.closes();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].2, 3);
    }

    #[test]
    fn test_source_failure_still_closes() {
        let log = SinkLog::default();
        let session = CaptureSession::new(
            config(5),
            Box::new(ReaderSource::new(Broken)),
            Box::new(CountingSink::new("a", &log)),
        );

        let report = session.run(&CancelToken::new());

        assert!(report.failed());
        assert!(matches!(report.error, Some(CaptureError::SourceRead(_))));
        assert_eq!(report.state, SessionState::Interrupted);
        assert_eq!(report.frames, 0);
        assert_eq!(log.closes().len(), 1);
    }

    #[test]
    fn test_source_failure_keeps_totals() {
        let log = SinkLog::default();
        let mut bytes = frame_bytes(&[RawFrame::default(); 5]);
        bytes.push(0x00);
        let source = Cursor::new(bytes).chain(Broken);
        let session = CaptureSession::new(
            config(5),
            Box::new(ReaderSource::new(source)),
            Box::new(CountingSink::new("a", &log)),
        );

        let report = session.run(&CancelToken::new());

        assert!(matches!(report.error, Some(CaptureError::SourceRead(_))));
        assert_eq!(report.frames, 5);
        assert_eq!(report.lost_bytes, 1);
        assert_eq!(log.closes()[0].2, 5);
    }

    #[test]
    fn test_first_lost_byte_of_each_run_warns() {
        let logs = SharedBuf::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        let mut bytes = vec![0x00, 0x01, 0x02];
        bytes.extend(frame_bytes(&[RawFrame::default()]));
        bytes.push(0x03);
        bytes.extend(frame_bytes(&[RawFrame::default()]));
        let (session, _buf) = csv_session(bytes, 5);

        let report =
            tracing::subscriber::with_default(subscriber, || session.run(&CancelToken::new()));

        assert_eq!(report.lost_bytes, 4);
        let text = logs.contents();
        assert_eq!(text.matches("out of sync").count(), 2);
        assert!(text.contains("out of sync at frame 0, dropped byte 0x00"));
        assert!(text.contains("out of sync at frame 1, dropped byte 0x03"));
    }

    #[test]
    fn test_mean_rate() {
        let report = SessionReport {
            port: "p".to_string(),
            state: SessionState::Completed,
            termination: Termination::DurationReached,
            frames: 32000,
            lost_bytes: 0,
            seconds_elapsed: 2,
            partial_frame_discarded: false,
            wall_time: Duration::from_secs(2),
            error: None,
        };
        assert_eq!(report.mean_rate(), 16000.0);
    }
}
