use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hexapod_runtime::config::{BAUDRATE, MOTOR_ENABLED, MOTOR_PORT, default_legs};
use hexapod_runtime::hexapod::HexapodDriver;

#[derive(Parser, Debug)]
#[command(about = "Hexapod walking runtime")]
struct Args {
    /// Serial port of the servo bus
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    /// Servo bus baud rate
    #[arg(long, default_value_t = BAUDRATE)]
    baud: u32,

    /// Run against simulated servos instead of the serial bus
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let result = if args.simulate || !MOTOR_ENABLED {
        info!("Running with simulated servos");
        match HexapodDriver::simulated(args.baud, default_legs()) {
            Ok(driver) => hexapod_runtime::runtime::run(driver).await,
            Err(e) => Err(e.into()),
        }
    } else {
        match HexapodDriver::open(&args.port, args.baud, default_legs()) {
            Ok(driver) => hexapod_runtime::runtime::run(driver).await,
            Err(e) => Err(e.into()),
        }
    };

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
