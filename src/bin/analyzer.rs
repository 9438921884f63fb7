//! Accelerometer Recording Analyzer
//!
//! Post-processing of finished recordings (CSV, or HDF5 with the `hdf5` feature).
//!
//! Usage:
//!   analyzer --input data/USB0_20240903_140507.csv --all
//!   analyzer --input run1.csv --fft --statistics
//!   analyzer --input run1.csv --start 1.0 --end 2.0 --fft

use clap::Parser;
use num_complex::Complex;
use rustfft::FftPlanner;
use serial_accel_capture::{CaptureError, RecordedSeries};
use std::f64::consts::PI;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// FFT window length in samples
const WINDOW_SIZE: usize = 2048;

/// High-pass cutoff applied before vibration RMS
const HIGH_PASS_HZ: f64 = 0.5;

#[derive(Parser, Debug)]
#[command(name = "analyzer")]
#[command(about = "Analyze accelerometer recordings", long_about = None)]
struct Args {
    /// Input recording (.csv, or .h5 when built with hdf5)
    #[arg(short, long)]
    input: PathBuf,

    /// Start time in seconds (optional, default: recording start)
    #[arg(long)]
    start: Option<f64>,

    /// End time in seconds (optional, default: recording end)
    #[arg(long)]
    end: Option<f64>,

    /// Sample rate override in Hz (default: inferred from timestamps)
    #[arg(long)]
    rate: Option<f64>,

    /// Perform FFT frequency analysis
    #[arg(long)]
    fft: bool,

    /// Compute statistical metrics
    #[arg(long)]
    statistics: bool,

    /// Compute vibration RMS
    #[arg(long)]
    vibration: bool,

    /// Run all analyses
    #[arg(long)]
    all: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn load(path: &Path) -> Result<RecordedSeries, CaptureError> {
    let is_hdf5 = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("h5") | Some("hdf5")
    );
    if is_hdf5 {
        load_hdf5(path)
    } else {
        RecordedSeries::from_csv_path(path)
    }
}

#[cfg(feature = "hdf5")]
fn load_hdf5(path: &Path) -> Result<RecordedSeries, CaptureError> {
    serial_accel_capture::hdf5_format::read_series(path)
}

#[cfg(not(feature = "hdf5"))]
fn load_hdf5(_path: &Path) -> Result<RecordedSeries, CaptureError> {
    Err(CaptureError::InvalidConfig(
        "reading HDF5 requires building with --features hdf5".to_string(),
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let run_statistics = args.all || args.statistics;
    let run_fft = args.all || args.fft;
    let run_vibration = args.all || args.vibration;

    if !run_statistics && !run_fft && !run_vibration {
        eprintln!("Error: Must specify at least one analysis type (--statistics, --fft, --vibration, or --all)");
        std::process::exit(1);
    }

    println!("Loading data from {}...", args.input.display());
    let recording = load(&args.input)?;

    let (Some(&file_start), Some(&file_end)) = (recording.t.first(), recording.t.last()) else {
        eprintln!("Error: No samples in file");
        return Ok(());
    };

    let start_time = args.start.unwrap_or(file_start);
    let end_time = args.end.unwrap_or(file_end);

    if start_time < file_start || end_time > file_end {
        eprintln!(
            "Warning: Requested time range [{}, {}] extends beyond file range [{}, {}]",
            start_time, end_time, file_start, file_end
        );
    }

    if start_time >= end_time {
        eprintln!("Error: Start time must be before end time");
        std::process::exit(1);
    }

    let series = recording.window(start_time, end_time);
    if series.len() < 2 {
        eprintln!("Error: Not enough samples in specified time range");
        return Ok(());
    }

    let sample_rate = match args.rate {
        Some(rate) => rate,
        None => infer_sample_rate(&series.t),
    };

    println!(
        "Loaded {} samples ({:.4}s to {:.4}s)",
        series.len(),
        series.t[0],
        series.t[series.len() - 1]
    );

    let mut output: Box<dyn Write> = if let Some(path) = &args.output {
        Box::new(File::create(path)?)
    } else {
        Box::new(io::stdout())
    };

    write_header(&mut output, &args.input, &series, sample_rate)?;

    let axes = [("X", &series.ax), ("Y", &series.ay), ("Z", &series.az)];

    if run_statistics {
        writeln!(output, "\n{}", "=".repeat(80))?;
        writeln!(output, "STATISTICAL ANALYSIS")?;
        writeln!(output, "{}", "=".repeat(80))?;
        run_statistics_analysis(&mut output, &axes)?;
    }

    if run_fft {
        writeln!(output, "\n{}", "=".repeat(80))?;
        writeln!(output, "FREQUENCY ANALYSIS (FFT)")?;
        writeln!(output, "{}", "=".repeat(80))?;
        run_fft_analysis(&mut output, &axes, sample_rate)?;
    }

    if run_vibration {
        writeln!(output, "\n{}", "=".repeat(80))?;
        writeln!(output, "VIBRATION ANALYSIS")?;
        writeln!(output, "{}", "=".repeat(80))?;
        run_vibration_analysis(&mut output, &axes, sample_rate)?;
    }

    writeln!(output, "\n{}", "=".repeat(80))?;
    writeln!(output, "Analysis complete!")?;

    Ok(())
}

/// Median spacing of the timestamps, as a rate
fn infer_sample_rate(t: &[f64]) -> f64 {
    let mut deltas: Vec<f64> = t.windows(2).map(|w| w[1] - w[0]).filter(|d| *d > 0.0).collect();
    if deltas.is_empty() {
        return 1.0;
    }
    deltas.sort_by(|a, b| a.total_cmp(b));
    1.0 / deltas[deltas.len() / 2]
}

fn write_header(
    output: &mut dyn Write,
    input: &Path,
    series: &RecordedSeries,
    sample_rate: f64,
) -> io::Result<()> {
    writeln!(output, "{}", "=".repeat(80))?;
    writeln!(output, "ACCELEROMETER DATA ANALYSIS REPORT")?;
    writeln!(output, "{}", "=".repeat(80))?;
    writeln!(output)?;
    writeln!(output, "File: {}", input.display())?;
    writeln!(output, "Sample rate: {:.1} Hz", sample_rate)?;
    writeln!(output)?;
    writeln!(output, "Analysis Range:")?;
    writeln!(output, "  Start: {:.4}s", series.t[0])?;
    writeln!(output, "  End: {:.4}s", series.t[series.len() - 1])?;
    writeln!(output, "  Duration: {:.4}s", series.duration_secs())?;
    writeln!(output, "  Samples: {}", series.len())?;
    Ok(())
}

// ============================================================================
// STATISTICS ANALYSIS
// ============================================================================

#[derive(Debug)]
struct Stats {
    mean: f64,
    rms: f64,
    std_dev: f64,
    min: f64,
    max: f64,
    peak_to_peak: f64,
}

fn compute_stats(data: &[f64]) -> Stats {
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let rms = compute_rms(data);
    let variance = data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Stats {
        mean,
        rms,
        std_dev: variance.sqrt(),
        min,
        max,
        peak_to_peak: max - min,
    }
}

fn run_statistics_analysis(output: &mut dyn Write, axes: &[(&str, &Vec<f64>)]) -> io::Result<()> {
    writeln!(output)?;
    writeln!(output, "Accelerometer Statistics (g):")?;
    writeln!(output, "{:-<80}", "")?;
    writeln!(
        output,
        "{:<10} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
        "Axis", "Mean", "RMS", "Std Dev", "Min", "Max", "Peak-Peak"
    )?;
    writeln!(output, "{:-<80}", "")?;

    for (axis, data) in axes {
        let s = compute_stats(data);
        writeln!(
            output,
            "{:<10} {:>12.5} {:>12.5} {:>12.5} {:>12.5} {:>12.5} {:>12.5}",
            axis, s.mean, s.rms, s.std_dev, s.min, s.max, s.peak_to_peak
        )?;
    }
    Ok(())
}

// ============================================================================
// FFT ANALYSIS
// ============================================================================

struct FrequencyPeak {
    frequency: f64,
    magnitude: f64,
}

fn apply_hann_window(data: &[f64]) -> Vec<f64> {
    let n = data.len() as f64;
    data.iter()
        .enumerate()
        .map(|(i, &x)| x * 0.5 * (1.0 - ((2.0 * PI * i as f64) / (n - 1.0)).cos()))
        .collect()
}

fn analyze_frequencies(data: &[f64], sample_rate: f64) -> Vec<FrequencyPeak> {
    if data.len() < WINDOW_SIZE {
        return Vec::new();
    }

    let mut buffer: Vec<Complex<f64>> = apply_hann_window(&data[..WINDOW_SIZE])
        .into_iter()
        .map(|x| Complex::new(x, 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(WINDOW_SIZE).process(&mut buffer);

    // Second half mirrors the first
    let magnitudes: Vec<f64> = buffer
        .iter()
        .take(WINDOW_SIZE / 2)
        .map(|c| c.norm() / WINDOW_SIZE as f64)
        .collect();

    let threshold = magnitudes.iter().copied().fold(0.0, f64::max) * 0.1;
    let mut peaks: Vec<FrequencyPeak> = (1..magnitudes.len() - 1)
        .filter(|&i| {
            magnitudes[i] > threshold
                && magnitudes[i] > magnitudes[i - 1]
                && magnitudes[i] > magnitudes[i + 1]
        })
        .map(|i| FrequencyPeak {
            frequency: i as f64 * sample_rate / WINDOW_SIZE as f64,
            magnitude: magnitudes[i],
        })
        .collect();

    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks
}

fn run_fft_analysis(
    output: &mut dyn Write,
    axes: &[(&str, &Vec<f64>)],
    sample_rate: f64,
) -> io::Result<()> {
    writeln!(output)?;
    writeln!(output, "FFT Parameters:")?;
    writeln!(output, "  Window size: {} samples", WINDOW_SIZE)?;
    writeln!(output, "  Window type: Hann")?;
    writeln!(output, "  Frequency resolution: {:.2} Hz", sample_rate / WINDOW_SIZE as f64)?;
    writeln!(output, "  Max frequency: {:.1} Hz", sample_rate / 2.0)?;

    for (axis, data) in axes {
        if data.len() < WINDOW_SIZE {
            writeln!(
                output,
                "\nWarning: Insufficient samples for FFT (need {}, have {})",
                WINDOW_SIZE,
                data.len()
            )?;
            return Ok(());
        }

        let peaks = analyze_frequencies(data, sample_rate);
        writeln!(output, "\nAccel {} - Top 5 Frequency Peaks:", axis)?;
        if peaks.is_empty() {
            writeln!(output, "  No significant peaks detected")?;
        }
        for (i, peak) in peaks.iter().take(5).enumerate() {
            writeln!(
                output,
                "  {}. {:.2} Hz (magnitude: {:.5})",
                i + 1,
                peak.frequency,
                peak.magnitude
            )?;
        }
    }
    Ok(())
}

// ============================================================================
// VIBRATION ANALYSIS
// ============================================================================

fn compute_rms(data: &[f64]) -> f64 {
    (data.iter().map(|&x| x * x).sum::<f64>() / data.len() as f64).sqrt()
}

/// First-order high-pass filter (removes gravity / DC offset)
fn high_pass_filter(data: &[f64], cutoff_hz: f64, sample_rate: f64) -> Vec<f64> {
    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let dt = 1.0 / sample_rate;
    let alpha = rc / (rc + dt);

    let mut filtered = Vec::with_capacity(data.len());
    let mut prev_input = data[0];
    let mut prev_output = 0.0;
    for &input in data {
        let out = alpha * (prev_output + input - prev_input);
        filtered.push(out);
        prev_input = input;
        prev_output = out;
    }
    filtered
}

fn run_vibration_analysis(
    output: &mut dyn Write,
    axes: &[(&str, &Vec<f64>)],
    sample_rate: f64,
) -> io::Result<()> {
    writeln!(output)?;
    writeln!(output, "Vibration Analysis Parameters:")?;
    writeln!(output, "  Sample rate: {:.1} Hz", sample_rate)?;
    writeln!(output, "  High-pass filter cutoff: {} Hz", HIGH_PASS_HZ)?;
    writeln!(output)?;

    let mut total_raw = 0.0;
    let mut total_ac = 0.0;
    writeln!(output, "{:<10} {:>14} {:>14} {:>14}", "Axis", "RMS (g)", "AC RMS (g)", "AC Peak (g)")?;
    writeln!(output, "{:-<56}", "")?;
    for (axis, data) in axes {
        let rms = compute_rms(data);
        let ac = high_pass_filter(data, HIGH_PASS_HZ, sample_rate);
        let ac_rms = compute_rms(&ac);
        let ac_peak = ac.iter().fold(0.0f64, |a, b| a.max(b.abs()));
        total_raw += rms * rms;
        total_ac += ac_rms * ac_rms;
        writeln!(output, "{:<10} {:>14.5} {:>14.5} {:>14.5}", axis, rms, ac_rms, ac_peak)?;
    }
    writeln!(output, "{:-<56}", "")?;
    writeln!(output, "{:<10} {:>14.5} {:>14.5}", "Total", total_raw.sqrt(), total_ac.sqrt())?;
    Ok(())
}
