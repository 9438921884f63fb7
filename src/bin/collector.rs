//! Single-port acceleration collector
//!
//! Captures one serial MEMS sensor (or replays a raw byte dump) into a CSV or
//! HDF5 recording.
//!
//! Usage:
//!   collector 10 /dev/ttyUSB0
//!   collector 10 /dev/ttyUSB0 --format hdf5 --output run1.h5
//!   collector 5 dump --replay capture.bin

use clap::{Parser, ValueEnum};
use serial_accel_capture::{
    open_serial, ByteSource, CancelToken, CaptureConfig, CaptureError, CsvSink, ReaderSource,
    RowSink, SessionPlan,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Hdf5,
}

#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(about = "Collect serial MEMS accelerometer data to a file", long_about = None)]
struct Args {
    /// Recording duration in whole seconds
    #[arg(default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    duration: u32,

    /// Serial port
    #[arg(default_value = "/dev/ttyUSB0")]
    port: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Output file (default: <output-dir>/<port>_<timestamp>.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for generated file names
    #[arg(long, default_value = "data")]
    output_dir: PathBuf,

    /// Serial baud rate
    #[arg(short, long, default_value_t = 3_000_000)]
    baud: u32,

    /// Sensor output rate in samples per second (used for timestamps)
    #[arg(short, long, default_value_t = 16000.0)]
    rate: f64,

    /// Acceleration in g per raw count
    #[arg(long, default_value_t = 16.0 / 32768.0)]
    scale: f64,

    /// Decode a raw byte dump instead of reading the serial port
    #[arg(long)]
    replay: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = CaptureConfig::for_port(args.port.as_str())
        .with_duration(args.duration)
        .with_baud_rate(args.baud)
        .with_sample_rate(args.rate)
        .with_scale_factor(args.scale)
        .with_output_dir(&args.output_dir);

    let output = args.output.clone().unwrap_or_else(|| {
        let path = config.output_path(&chrono::Local::now());
        match args.format {
            Format::Csv => path,
            Format::Hdf5 => path.with_extension("h5"),
        }
    });

    println!("Accelerometer Data Collector");
    println!("============================");
    match &args.replay {
        Some(path) => println!("Replay: {}", path.display()),
        None => println!("Port: {} @ {} baud", config.port, config.baud_rate),
    }
    println!("Duration: {} seconds", config.duration_secs);
    println!("Format: {:?}", args.format);
    println!("Output file: {}", output.display());
    println!();

    let cancel = CancelToken::new();
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping collection...");
        c.cancel();
    })?;

    let replay = args.replay.clone();
    let format = args.format;
    let sink_path = output.clone();
    let plan = SessionPlan::new(config, cancel, move |config: &CaptureConfig| {
        let source: Box<dyn ByteSource> = match replay {
            Some(path) => Box::new(ReaderSource::open_file(path)?),
            None => Box::new(open_serial(config)?),
        };
        let sink = open_sink(format, &sink_path, config)?;
        Ok((source, sink))
    })
    .with_output(output);

    println!("Starting data collection...");
    println!("Press Ctrl+C to stop\n");

    let outcome = plan.run();
    match outcome.result {
        Ok(report) => {
            if let Some(e) = &report.error {
                eprintln!("\nError during collection: {}", e);
            }
            println!("\nCollection {:?} ({})", report.state, report.termination);
            println!("Total frames: {}", report.frames);
            println!("Bytes lost: {}", report.lost_bytes);
            if report.partial_frame_discarded {
                println!("Trailing partial frame discarded");
            }
            println!("Elapsed time: {:.2} seconds", report.wall_time.as_secs_f64());
            println!("Actual sample rate: {:.1} Hz", report.mean_rate());
            if let Some(path) = outcome.output {
                println!("File: {}", path.display());
            }
            if let Some(e) = report.error {
                return Err(Box::new(e));
            }
        }
        Err(e) => {
            eprintln!("\nError during collection: {}", e);
            return Err(Box::new(e));
        }
    }

    Ok(())
}

fn open_sink(
    format: Format,
    path: &Path,
    config: &CaptureConfig,
) -> Result<Box<dyn RowSink>, CaptureError> {
    match format {
        Format::Csv => Ok(Box::new(CsvSink::create(path)?)),
        #[cfg(feature = "hdf5")]
        Format::Hdf5 => Ok(Box::new(serial_accel_capture::Hdf5Sink::create(
            path,
            &config.port,
            config.decoder.sample_rate,
        )?)),
        #[cfg(not(feature = "hdf5"))]
        Format::Hdf5 => {
            let _ = config;
            Err(CaptureError::InvalidConfig(
                "HDF5 output requires building with --features hdf5".to_string(),
            ))
        }
    }
}
