//! Finished recordings as parallel timeseries
//!
//! This is the hand-off format for plotting and offline analysis: four
//! equally long sequences `t`, `ax`, `ay`, `az`.

use crate::error::{CaptureError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Recording loaded back from a sink's finalized output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedSeries {
    pub t: Vec<f64>,
    pub ax: Vec<f64>,
    pub ay: Vec<f64>,
    pub az: Vec<f64>,
}

impl RecordedSeries {
    /// Load a CSV recording from disk
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(|e| CaptureError::Recording {
            line: 0,
            message: format!("cannot open file: {}", e),
        })?;
        Self::from_csv_reader(BufReader::new(file))
    }

    /// Parse CSV rows, skipping the header line
    pub fn from_csv_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut series = Self::default();

        for (i, line) in reader.lines().enumerate() {
            let line_no = i + 1;
            let line = line.map_err(|e| CaptureError::Recording {
                line: line_no,
                message: e.to_string(),
            })?;
            if line_no == 1 || line.trim().is_empty() {
                continue;
            }

            let mut values = [0.0f64; 4];
            let mut fields = line.split(',');
            for value in values.iter_mut() {
                let field = fields.next().ok_or_else(|| CaptureError::Recording {
                    line: line_no,
                    message: "expected 4 fields".to_string(),
                })?;
                *value = field.trim().parse().map_err(|_| CaptureError::Recording {
                    line: line_no,
                    message: format!("invalid number '{}'", field),
                })?;
            }
            if fields.next().is_some() {
                return Err(CaptureError::Recording {
                    line: line_no,
                    message: "expected 4 fields".to_string(),
                });
            }

            series.push(values);
        }

        Ok(series)
    }

    fn push(&mut self, [t, ax, ay, az]: [f64; 4]) {
        self.t.push(t);
        self.ax.push(ax);
        self.ay.push(ay);
        self.az.push(az);
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Time span between first and last row
    pub fn duration_secs(&self) -> f64 {
        match (self.t.first(), self.t.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Rows with `start <= t <= end`
    pub fn window(&self, start: f64, end: f64) -> Self {
        let mut out = Self::default();
        for i in 0..self.len() {
            if self.t[i] >= start && self.t[i] <= end {
                out.push([self.t[i], self.ax[i], self.ay[i], self.az[i]]);
            }
        }
        out
    }
}
