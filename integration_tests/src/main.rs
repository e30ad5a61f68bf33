//! Hardware tests for the roomba-oi library.
//!
//! Run with a Create 2 or Roomba 600 connected over its serial cable.

mod device;

use clap::Parser;
use colored::Colorize;
use roomba_oi::config::serial::DEFAULT_BAUD_RATE;

use device::{resolve_port, RobotClient};
use tests::{print_results, run_all_tests};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Hardware tests for the Roomba Open Interface library")]
struct Args {
    /// Serial port for the robot (use "auto" to auto-detect)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("roomba_oi=warn")),
        )
        .init();

    let args = Args::parse();

    let port = resolve_port(&args.port, args.baud)?;

    println!("{}", "Roomba Open Interface Hardware Tests".bold());
    println!("Port: {}", port);
    println!("Baud: {}", args.baud);
    println!();

    println!("Connecting to robot...");
    let mut robot = RobotClient::new(&port, args.baud)?;
    robot.drain_buffer()?;
    println!("{}", "Connected!".green());

    println!("\nRunning tests...\n");

    let results = run_all_tests(&mut robot);
    print_results(&results);

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
