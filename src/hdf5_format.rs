//! HDF5 storage backend for recordings
//!
//! Layout:
//!
//! ```text
//! /metadata          attributes: start_time, sample_rate_hz, port, version
//! /samples/t         f64, resizable, chunked, DEFLATE 4
//! /samples/ax        ...
//! /samples/ay
//! /samples/az
//! ```

use crate::decoder::Sample;
use crate::error::{CaptureError, Result};
use crate::recording::RecordedSeries;
use crate::sink::{RowSink, HEADER};
use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File, Group};
use std::path::Path;

/// Rows per chunk and per append
const CHUNK_SIZE: usize = 1024;

/// Format version written to the metadata group
const FORMAT_VERSION: &str = "1.0";

fn storage_err(context: &str, e: hdf5::Error) -> CaptureError {
    CaptureError::Storage(format!("{}: {}", context, e))
}

/// Metadata stored next to the samples
#[derive(Debug, Clone)]
pub struct Metadata {
    pub start_time: String,
    pub sample_rate_hz: f64,
    pub port: String,
    pub version: String,
}

/// Row sink writing one dataset per column
pub struct Hdf5Sink {
    file: File,
    group: Group,
    datasets: Vec<Dataset>,
    pending: Vec<[f64; 4]>,
    rows: usize,
    closed: bool,
}

impl Hdf5Sink {
    /// Create a new HDF5 recording file
    pub fn create<P: AsRef<Path>>(path: P, port: &str, sample_rate: f64) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(CaptureError::Sink)?;
            }
        }
        let file = File::create(path).map_err(|e| storage_err("Failed to create HDF5 file", e))?;

        let metadata_group = file
            .create_group("metadata")
            .map_err(|e| storage_err("Failed to create metadata group", e))?;
        write_str_attr(&metadata_group, "start_time", &chrono::Local::now().to_rfc3339())?;
        metadata_group
            .new_attr::<f64>()
            .create("sample_rate_hz")
            .and_then(|attr| attr.write_scalar(&sample_rate))
            .map_err(|e| storage_err("Failed to write sample_rate_hz", e))?;
        write_str_attr(&metadata_group, "port", port)?;
        write_str_attr(&metadata_group, "version", FORMAT_VERSION)?;

        let group = file
            .create_group("samples")
            .map_err(|e| storage_err("Failed to create samples group", e))?;

        Ok(Self {
            file,
            group,
            datasets: Vec::new(),
            pending: Vec::with_capacity(CHUNK_SIZE),
            rows: 0,
            closed: false,
        })
    }

    /// Rows appended to the datasets so far (excludes buffered rows)
    pub fn rows_stored(&self) -> usize {
        self.rows
    }

    fn append_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.datasets.len() != HEADER.len() {
            return Err(CaptureError::Storage("header not written".to_string()));
        }

        let new_size = self.rows + self.pending.len();
        for (column, dataset) in self.datasets.iter().enumerate() {
            let values: Vec<f64> = self.pending.iter().map(|row| row[column]).collect();
            dataset
                .resize((new_size,))
                .map_err(|e| storage_err("Failed to resize dataset", e))?;
            dataset
                .write_slice(&values, self.rows..new_size)
                .map_err(|e| storage_err("Failed to write to dataset", e))?;
        }

        self.rows = new_size;
        self.pending.clear();
        Ok(())
    }
}

fn write_str_attr(group: &Group, name: &str, value: &str) -> Result<()> {
    let value: VarLenUnicode = value
        .parse()
        .map_err(|_| CaptureError::Storage(format!("Invalid string for {}", name)))?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)
        .and_then(|attr| attr.write_scalar(&value))
        .map_err(|e| storage_err(&format!("Failed to write {}", name), e))
}

fn read_str_attr(group: &Group, name: &str) -> Result<String> {
    group
        .attr(name)
        .and_then(|attr| attr.read_scalar::<VarLenUnicode>())
        .map(|s| s.to_string())
        .map_err(|e| storage_err(&format!("Failed to read {}", name), e))
}

impl RowSink for Hdf5Sink {
    fn write_header(&mut self, fields: &[&str]) -> Result<()> {
        if fields.len() != HEADER.len() {
            return Err(CaptureError::Storage(format!(
                "expected {} columns, got {}",
                HEADER.len(),
                fields.len()
            )));
        }
        for name in fields {
            let dataset = self
                .group
                .new_dataset::<f64>()
                .shape((0..,))
                .chunk((CHUNK_SIZE,))
                .deflate(4)
                .create(*name)
                .map_err(|e| storage_err(&format!("Failed to create dataset {}", name), e))?;
            self.datasets.push(dataset);
        }
        Ok(())
    }

    fn write_row(&mut self, sample: &Sample) -> Result<()> {
        self.pending.push([sample.t, sample.ax, sample.ay, sample.az]);
        if self.pending.len() >= CHUNK_SIZE {
            self.append_pending()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.append_pending()?;
        self.file
            .flush()
            .map_err(|e| storage_err("Failed to flush HDF5 file", e))?;
        self.closed = true;
        Ok(())
    }
}

/// Read the metadata group of a recording
pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<Metadata> {
    let file = File::open(path).map_err(|e| storage_err("Failed to open HDF5 file", e))?;
    let group = file
        .group("metadata")
        .map_err(|e| storage_err("Failed to open metadata group", e))?;

    let sample_rate_hz = group
        .attr("sample_rate_hz")
        .and_then(|attr| attr.read_scalar::<f64>())
        .map_err(|e| storage_err("Failed to read sample_rate_hz", e))?;

    Ok(Metadata {
        start_time: read_str_attr(&group, "start_time")?,
        sample_rate_hz,
        port: read_str_attr(&group, "port")?,
        version: read_str_attr(&group, "version")?,
    })
}

/// Load a recording as four parallel series
pub fn read_series<P: AsRef<Path>>(path: P) -> Result<RecordedSeries> {
    let file = File::open(path).map_err(|e| storage_err("Failed to open HDF5 file", e))?;
    let group = file
        .group("samples")
        .map_err(|e| storage_err("Failed to open samples group", e))?;

    let read = |name: &str| -> Result<Vec<f64>> {
        group
            .dataset(name)
            .and_then(|ds| ds.read_raw::<f64>())
            .map_err(|e| storage_err(&format!("Failed to read {}", name), e))
    };

    let series = RecordedSeries {
        t: read(HEADER[0])?,
        ax: read(HEADER[1])?,
        ay: read(HEADER[2])?,
        az: read(HEADER[3])?,
    };

    let n = series.t.len();
    if series.ax.len() != n || series.ay.len() != n || series.az.len() != n {
        return Err(CaptureError::Storage("column lengths differ".to_string()));
    }
    Ok(series)
}
