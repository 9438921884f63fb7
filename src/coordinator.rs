//! Concurrent capture from two independent ports
//!
//! Each session runs on its own thread with its own source, decoder, tracker,
//! sink and cancel token. Nothing is shared between the two; the only meeting
//! point is the final join.

use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use crate::session::{CancelToken, CaptureSession, SessionReport, SessionState};
use crate::sink::{CsvSink, RowSink};
use crate::source::{open_serial, ByteSource};
use std::any::Any;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Opened source/sink pair for one session
pub type Endpoints = (Box<dyn ByteSource>, Box<dyn RowSink>);

type OpenFn = Box<dyn FnOnce(&CaptureConfig) -> Result<Endpoints> + Send>;

/// Everything needed to run one session on a capture thread
pub struct SessionPlan {
    pub config: CaptureConfig,
    pub cancel: CancelToken,
    output: Option<PathBuf>,
    open: OpenFn,
}

impl SessionPlan {
    /// Plan with a custom opener, called on the capture thread
    pub fn new<F>(config: CaptureConfig, cancel: CancelToken, open: F) -> Self
    where
        F: FnOnce(&CaptureConfig) -> Result<Endpoints> + Send + 'static,
    {
        Self {
            config,
            cancel,
            output: None,
            open: Box::new(open),
        }
    }

    /// Serial port into a timestamped CSV file under the configured output directory
    pub fn serial_csv(config: CaptureConfig, cancel: CancelToken) -> Self {
        let path = config.output_path(&chrono::Local::now());
        let sink_path = path.clone();
        let mut plan = Self::new(config, cancel, move |config: &CaptureConfig| {
            let source = open_serial(config)?;
            let sink = CsvSink::create(&sink_path)?;
            Ok((Box::new(source) as Box<dyn ByteSource>, Box::new(sink) as Box<dyn RowSink>))
        });
        plan.output = Some(path);
        plan
    }

    /// Record where the sink writes, for reporting
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn output(&self) -> Option<&PathBuf> {
        self.output.as_ref()
    }

    /// Validate, open and run the session on the current thread
    pub fn run(self) -> SessionOutcome {
        let port = self.config.port.clone();
        let output = self.output.clone();
        let result = self.execute();
        SessionOutcome { port, output, result }
    }

    fn execute(self) -> Result<SessionReport> {
        self.config.validate()?;
        let (source, sink) = (self.open)(&self.config)?;
        Ok(CaptureSession::new(self.config, source, sink).run(&self.cancel))
    }
}

/// Result of one session as seen by the coordinator
///
/// `result` is an error when the session never ran (bad config, open failure,
/// thread failure). A session that failed while reading is `Ok` with
/// `SessionReport::error` set and its totals up to the failure.
#[derive(Debug)]
pub struct SessionOutcome {
    pub port: String,
    pub output: Option<PathBuf>,
    pub result: Result<SessionReport>,
}

impl SessionOutcome {
    /// True when the session ran to a normal end (duration or end of stream)
    pub fn completed(&self) -> bool {
        matches!(&self.result, Ok(report) if report.state == SessionState::Completed)
    }

    /// The error that ended this session, if any
    pub fn error(&self) -> Option<&CaptureError> {
        match &self.result {
            Ok(report) => report.error.as_ref(),
            Err(e) => Some(e),
        }
    }

    pub fn failed(&self) -> bool {
        self.error().is_some()
    }
}

/// Outcomes of both sessions
#[derive(Debug)]
pub struct DualCaptureReport {
    pub first: SessionOutcome,
    pub second: SessionOutcome,
}

impl DualCaptureReport {
    pub fn all_completed(&self) -> bool {
        self.first.completed() && self.second.completed()
    }

    pub fn outcomes(&self) -> [&SessionOutcome; 2] {
        [&self.first, &self.second]
    }
}

/// Runs two capture sessions concurrently and waits for both
pub struct DualCaptureCoordinator {
    first: SessionPlan,
    second: SessionPlan,
}

enum Running {
    Thread {
        port: String,
        output: Option<PathBuf>,
        handle: JoinHandle<SessionOutcome>,
    },
    NotStarted(SessionOutcome),
}

impl DualCaptureCoordinator {
    pub fn new(first: SessionPlan, second: SessionPlan) -> Self {
        Self { first, second }
    }

    /// Start both sessions and block until each reaches a terminal state
    ///
    /// A failure in one session never stops or hides the other.
    pub fn run(self) -> DualCaptureReport {
        let first = spawn_session("capture-0", self.first);
        let second = spawn_session("capture-1", self.second);

        DualCaptureReport {
            first: join_session(first),
            second: join_session(second),
        }
    }
}

fn spawn_session(name: &str, plan: SessionPlan) -> Running {
    let port = plan.config.port.clone();
    let output = plan.output.clone();
    info!("Starting {} on {}", name, port);

    match thread::Builder::new()
        .name(name.to_string())
        .spawn(move || plan.run())
    {
        Ok(handle) => Running::Thread { port, output, handle },
        Err(e) => Running::NotStarted(SessionOutcome {
            port,
            output,
            result: Err(CaptureError::SessionThread(format!("failed to spawn: {}", e))),
        }),
    }
}

fn join_session(running: Running) -> SessionOutcome {
    let outcome = match running {
        Running::NotStarted(outcome) => outcome,
        Running::Thread { port, output, handle } => match handle.join() {
            Ok(outcome) => outcome,
            Err(payload) => SessionOutcome {
                port,
                output,
                result: Err(CaptureError::SessionThread(panic_message(payload))),
            },
        },
    };

    if let Some(e) = outcome.error() {
        error!("{}: session failed: {}", outcome.port, e);
    }
    outcome
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
