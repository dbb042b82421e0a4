// Keyboard teleop: WASD walk, R/F speed, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use hexapod_runtime::config::TOPIC_CMD_WALK;
use hexapod_runtime::messages::WalkCommand;
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS: [f32; 3] = [0.3, 0.6, 1.0]; // fraction of a full stride
const INPUT_TIMEOUT_MS: u64 = 100; // Release the direction after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_WALK).await?;

    info!("Controls: W/S=forward/back, A/D=left/right, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent direction state
    let mut cmd = WalkCommand::default();
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char(key @ ('w' | 'a' | 's' | 'd')) if pressed => {
                        steer(&mut cmd, key, SPEEDS[speed_idx]);
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(SPEEDS.len() - 1);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Release the direction if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd = WalkCommand::default();
        }

        // Always publish at ~50Hz
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    // Leave the robot standing
    publisher
        .put(serde_json::to_string(&WalkCommand::default())?)
        .await?;
    Ok(())
}

/// Body frame: z forward, x right
fn steer(cmd: &mut WalkCommand, key: char, speed: f32) {
    match key {
        'w' => cmd.z = speed,
        's' => cmd.z = -speed,
        'a' => cmd.x = -speed,
        'd' => cmd.x = speed,
        _ => {}
    }
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
