//! Capture and decoder configuration
//!
//! Each capture session receives its own [`CaptureConfig`]; there are no
//! process-wide defaults that get reassigned at runtime.

use crate::error::{CaptureError, Result};
use chrono::{DateTime, TimeZone};
use std::path::PathBuf;
use std::time::Duration;

/// Frame marker byte ('S')
pub const DEFAULT_SYNC_BYTE: u8 = 0x53;

/// g per raw count for a ±16g full-scale range
pub const DEFAULT_SCALE_FACTOR: f64 = 16.0 / 32768.0;

/// Nominal sensor output rate in samples per second
pub const DEFAULT_SAMPLE_RATE: f64 = 16000.0;

/// Default recording duration in whole seconds
pub const DEFAULT_DURATION_SECS: u32 = 5;

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 3_000_000;

/// Frame decoding parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderConfig {
    /// Byte value that marks the start of a frame
    pub sync_byte: u8,
    /// Acceleration in g per raw count
    pub scale_factor: f64,
    /// Assumed sample rate, used only to compute timestamps
    pub sample_rate: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sync_byte: DEFAULT_SYNC_BYTE,
            scale_factor: DEFAULT_SCALE_FACTOR,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl DecoderConfig {
    /// Check that the scale factor and sample rate are usable
    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(CaptureError::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(CaptureError::InvalidConfig(format!(
                "scale factor must be positive, got {}",
                self.scale_factor
            )));
        }
        Ok(())
    }
}

/// Configuration for one capture session
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0")
    pub port: String,
    /// Recording duration in whole seconds
    pub duration_secs: u32,
    /// Serial baud rate
    pub baud_rate: u32,
    /// How long a read waits before the loop re-checks cancellation
    pub read_timeout: Duration,
    /// Directory that receives recordings
    pub output_dir: PathBuf,
    /// Frame decoding parameters
    pub decoder: DecoderConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            duration_secs: DEFAULT_DURATION_SECS,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(100),
            output_dir: PathBuf::from("data"),
            decoder: DecoderConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Default configuration for the given port
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.decoder.sample_rate = rate;
        self
    }

    pub fn with_scale_factor(mut self, scale: f64) -> Self {
        self.decoder.scale_factor = scale;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Reject configurations a session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(CaptureError::InvalidConfig("port must not be empty".to_string()));
        }
        if self.duration_secs == 0 {
            return Err(CaptureError::InvalidConfig(
                "duration must be at least 1 second".to_string(),
            ));
        }
        self.decoder.validate()
    }

    /// Short port label used in file names and log lines ("/dev/ttyUSB0" -> "USB0")
    pub fn port_label(&self) -> String {
        let name = self.port.strip_prefix("/dev/tty").unwrap_or(&self.port);
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    /// Recording path for a capture started at `now`
    ///
    /// Format: `<output_dir>/<port label>_<YYYYDDMM_HHMMSS>.csv`
    pub fn output_path<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        let stamp = now.format("%Y%d%m_%H%M%S");
        self.output_dir.join(format!("{}_{}.csv", self.port_label(), stamp))
    }
}
