// Leg diagnostic: READ-ONLY check of every servo on the bus
//
// This tool does NOT write anything to the servos - it's completely safe.
// Run it before the runtime to check wiring, ids and calibration.
//
// Usage: cargo run --example leg_diagnostic -- [--port P] [--baud B] [--simulate]
// Example: cargo run --example leg_diagnostic -- --port /dev/ttyUSB0

use clap::Parser;
use hexapod_runtime::config::{BAUDRATE, MOTOR_PORT, default_legs};
use hexapod_runtime::hexapod::kinematics::{self, JointAngles, MountTransform};
use hexapod_runtime::motor::ax12::Register;
use hexapod_runtime::motor::joint::JointActuator;
use hexapod_runtime::motor::{Bus, SerialTransport, SimulatedServos, Transport};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    #[arg(long, default_value_t = BAUDRATE)]
    baud: u32,

    /// Read from simulated servos instead of the serial bus
    #[arg(long)]
    simulate: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           Hexapod Leg Diagnostic (READ-ONLY)                 ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  This tool only READS from servos - no writes, no movement   ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    if args.simulate {
        println!("Bus: simulated, {} baud", args.baud);
        let ids: Vec<u8> = (1..=18).collect();
        let bus = Bus::new(SimulatedServos::with_servos(&ids), args.baud)?;
        return diagnose(bus);
    }

    println!("Serial port: {} at {} baud", args.port, args.baud);
    println!("Step 1: Opening serial port...");
    let transport = match SerialTransport::open(&args.port, args.baud) {
        Ok(transport) => {
            println!("  ✓ Serial port opened successfully");
            transport
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the half-duplex adapter is connected and powered");
            return Err(e.into());
        }
    };
    diagnose(Bus::new(transport, args.baud)?)
}

fn diagnose<T: Transport>(bus: Bus<T>) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("Step 2: Reading every leg...");

    let mut missing = vec![];
    for leg in default_legs() {
        println!();
        println!("  === Leg {} ===", leg.name);

        let mut angles = [None; 3];
        for (slot, config) in leg.joints.iter().enumerate() {
            let mut joint = JointActuator::new(bus.clone(), *config);
            print!("    {:?} (ID {}): ", config.joint, config.id);

            match joint.servo().ping() {
                Ok(true) => println!("✓ RESPONDING"),
                Ok(false) => {
                    println!("✗ NO RESPONSE");
                    missing.push(config.id);
                    continue;
                }
                Err(e) => {
                    println!("✗ ERROR: {}", e);
                    missing.push(config.id);
                    continue;
                }
            }

            match joint.servo().read_u8(Register::TorqueEnable) {
                Ok(val) => {
                    let status = if val == 1 { "ENABLED" } else { "disabled" };
                    println!("      Torque Enable:    {} ({})", val, status);
                }
                Err(e) => println!("      Torque Enable:    ERROR - {}", e),
            }

            match joint.servo().read_u8(Register::PresentTemperature) {
                Ok(val) => println!("      Temperature:      {} °C", val),
                Err(e) => println!("      Temperature:      ERROR - {}", e),
            }

            match joint.servo().present_position() {
                Ok(raw) => {
                    let angle = joint.from_raw(raw);
                    let range = joint.range();
                    let flag = if angle < range.min || angle > range.max {
                        "  ⚠ outside joint range"
                    } else {
                        ""
                    };
                    println!("      Present Position: {} ({:.1}°){}", raw, angle, flag);
                    angles[slot] = Some(angle);
                }
                Err(e) => println!("      Present Position: ERROR - {}", e),
            }
        }

        if let [Some(base), Some(proximal), Some(distal)] = angles {
            let foot = kinematics::forward(
                &leg.geometry,
                &JointAngles {
                    base,
                    proximal,
                    distal,
                },
            );
            let body = MountTransform::new(leg.mount_offset, leg.mount_angle_deg).to_body(foot);
            println!(
                "    Foot: local ({:.2}, {:.2}, {:.2}), body ({:.2}, {:.2}, {:.2})",
                foot.x, foot.y, foot.z, body.x, body.y, body.z
            );
        }
    }

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                    Diagnostic Complete                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    if missing.is_empty() {
        println!("All 18 servos responded.");
    } else {
        println!("⚠ Servos not responding: {:?}", missing);
        println!("  - Check servo power supply and daisy-chain wiring");
        println!("  - Verify ids match the leg layout in config.rs");
    }

    Ok(())
}
