//! Dual-port acceleration capture
//!
//! Records two MEMS sensors concurrently, one per serial port, each into its
//! own timestamped CSV file.
//!
//! Usage:
//!   accel-capture 10
//!   accel-capture 10 --port-a /dev/ttyUSB0 --port-b /dev/ttyUSB1 --output-dir data

use clap::Parser;
use serial_accel_capture::{
    CancelToken, CaptureConfig, DualCaptureCoordinator, SessionOutcome, SessionPlan,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "accel-capture")]
#[command(about = "Capture two serial MEMS accelerometers concurrently", long_about = None)]
struct Args {
    /// Recording duration in whole seconds
    #[arg(default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    duration: u32,

    /// First serial port
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port_a: String,

    /// Second serial port
    #[arg(long, default_value = "/dev/ttyUSB1")]
    port_b: String,

    /// Serial baud rate
    #[arg(short, long, default_value_t = 3_000_000)]
    baud: u32,

    /// Sensor output rate in samples per second (used for timestamps)
    #[arg(short, long, default_value_t = 16000.0)]
    rate: f64,

    /// Acceleration in g per raw count
    #[arg(long, default_value_t = 16.0 / 32768.0)]
    scale: f64,

    /// Directory for the CSV recordings
    #[arg(short, long, default_value = "data")]
    output_dir: PathBuf,
}

impl Args {
    fn config_for(&self, port: &str) -> CaptureConfig {
        CaptureConfig::for_port(port)
            .with_duration(self.duration)
            .with_baud_rate(self.baud)
            .with_sample_rate(self.rate)
            .with_scale_factor(self.scale)
            .with_output_dir(&self.output_dir)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    println!("Dual Accelerometer Capture");
    println!("==========================");
    println!("Ports: {} + {}", args.port_a, args.port_b);
    println!("Duration: {} seconds", args.duration);
    println!("Sample rate: {} sps", args.rate);
    println!("Output directory: {}", args.output_dir.display());
    println!();

    let cancel_a = CancelToken::new();
    let cancel_b = CancelToken::new();
    {
        let (a, b) = (cancel_a.clone(), cancel_b.clone());
        ctrlc::set_handler(move || {
            println!("\nReceived Ctrl+C, stopping capture...");
            a.cancel();
            b.cancel();
        })?;
    }

    let first = SessionPlan::serial_csv(args.config_for(&args.port_a), cancel_a);
    let second = SessionPlan::serial_csv(args.config_for(&args.port_b), cancel_b);

    println!("Starting capture...");
    println!("Press Ctrl+C to stop\n");

    let report = DualCaptureCoordinator::new(first, second).run();

    println!();
    for outcome in report.outcomes() {
        print_outcome(outcome);
    }

    if report.outcomes().iter().any(|o| o.failed()) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_outcome(outcome: &SessionOutcome) {
    match &outcome.result {
        Ok(report) => {
            match &report.error {
                Some(e) => {
                    println!("{}: FAILED ({:?})", outcome.port, report.state);
                    println!("  Error: {}", e);
                }
                None => println!("{}: {:?} ({})", outcome.port, report.state, report.termination),
            }
            println!("  Frames captured: {}", report.frames);
            println!("  Bytes lost: {}", report.lost_bytes);
            println!(
                "  Elapsed: {} s ({:.2} s wall)",
                report.seconds_elapsed,
                report.wall_time.as_secs_f64()
            );
            println!("  Mean rate: {:.1} sps", report.mean_rate());
            if let Some(path) = &outcome.output {
                println!("  File: {}", path.display());
            }
        }
        Err(e) => {
            println!("{}: FAILED", outcome.port);
            println!("  Error: {}", e);
        }
    }
}
