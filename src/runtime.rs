// 50 Hz loop with watchdog
// Walk commands arrive over zenoh; if they stop arriving the hexapod stops walking.
// After a bus failure the gait stays halted until the operator releases the command.

use std::time::{Duration, Instant};
use tokio::task::block_in_place;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{CMD_TIMEOUT, LOOP_HZ, MOVING_SPEED, TOPIC_CMD_WALK, TOPIC_GAIT, TOPIC_HEALTH};
use crate::hexapod::kinematics::Vec3;
use crate::hexapod::{HexapodDriver, HexapodError};
use crate::messages::{GaitStatus, RuntimeHealth, WalkCommand};
use crate::motor::transport::Transport;

pub struct Runtime {
    latest_cmd: Option<WalkCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
    faulted: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            faulted: false,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        if self.faulted {
            RuntimeHealth::ActuatorFault
        } else {
            self.health
        }
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: WalkCommand) {
        info!("Received command: {:?}", &cmd);
        self.on_command_at(cmd, Instant::now());
    }

    fn on_command_at(&mut self, cmd: WalkCommand, received_at: Instant) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = received_at;
    }

    /// The driver failed; hold still until the command goes to zero
    pub fn on_actuator_fault(&mut self, error: &HexapodError) {
        warn!("Actuator fault, holding until command is released: {}", error);
        self.faulted = true;
    }

    /// Walking direction based on watchdog and fault state
    pub fn compute_direction(&mut self) -> Vec3 {
        self.compute_direction_at(Instant::now())
    }

    fn compute_direction_at(&mut self, now: Instant) -> Vec3 {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        let direction = if cmd_age > CMD_TIMEOUT {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            Vec3::zeros()
        } else if let Some(ref cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            cmd.direction()
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            Vec3::zeros()
        };

        if self.faulted {
            if direction != Vec3::zeros() {
                return Vec3::zeros();
            }
            info!("Command released, clearing actuator fault");
            self.faulted = false;
        }
        direction
    }
}

/// Apply `direction` if it changed, then advance the gait
fn drive<T: Transport>(
    driver: &mut HexapodDriver<T>,
    applied: &mut Vec3,
    direction: Vec3,
) -> Result<(), HexapodError> {
    if direction != *applied {
        // Record first: after a failure the gait has already halted
        *applied = Vec3::zeros();
        driver.set_direction(direction)?;
        *applied = direction;
    }
    driver.update()
}

/// Bus I/O blocks on polling and wire time, so it runs off the async workers.
/// Needs the multi-threaded runtime.
pub async fn run<T: Transport>(
    mut driver: HexapodDriver<T>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    block_in_place(|| driver.initialize(MOVING_SPEED))?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_WALK).await?;
    let pub_gait = session.declare_publisher(TOPIC_GAIT).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut applied = Vec3::zeros();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_WALK);
    info!("Publishing to: {}, {}", TOPIC_GAIT, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            }
        }

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<WalkCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd);
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Compute direction (includes watchdog logic) and drive the legs
        let direction = runtime.compute_direction();
        if let Err(e) = block_in_place(|| drive(&mut driver, &mut applied, direction)) {
            runtime.on_actuator_fault(&e);
            applied = Vec3::zeros();
        }

        // 3. Publish gait status
        let status = GaitStatus::new(driver.gait_state(), driver.direction(), driver.steps());
        let status_json = serde_json::to_string(&status)?;
        pub_gait.put(status_json).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }

    block_in_place(|| {
        driver.stop()?;
        driver.disable_torque()
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BAUDRATE, default_legs};
    use crate::hexapod::GaitState;
    use crate::motor::ax12::Ax12Error;
    use crate::motor::sim::SimulatedServos;

    fn forward() -> WalkCommand {
        WalkCommand { x: 0.0, z: 1.0 }
    }

    #[test]
    fn test_starts_stale() {
        let mut runtime = Runtime::new();
        assert_eq!(runtime.compute_direction(), Vec3::zeros());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_fresh_command_is_followed() {
        let mut runtime = Runtime::new();
        let now = Instant::now();
        runtime.on_command_at(WalkCommand { x: 2.0, z: 0.0 }, now);

        let direction = runtime.compute_direction_at(now + Duration::from_millis(10));
        assert_eq!(direction, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_stops_stale_command() {
        let mut runtime = Runtime::new();
        let now = Instant::now();
        runtime.on_command_at(forward(), now);
        runtime.compute_direction_at(now);

        let later = now + CMD_TIMEOUT + Duration::from_millis(1);
        assert_eq!(runtime.compute_direction_at(later), Vec3::zeros());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_fault_holds_until_released() {
        let mut runtime = Runtime::new();
        let now = Instant::now();
        runtime.on_command_at(forward(), now);
        runtime.on_actuator_fault(&Ax12Error::Timeout { id: 4 }.into());

        assert_eq!(runtime.compute_direction_at(now), Vec3::zeros());
        assert_eq!(runtime.health(), RuntimeHealth::ActuatorFault);

        runtime.on_command_at(WalkCommand::default(), now);
        assert_eq!(runtime.compute_direction_at(now), Vec3::zeros());
        assert_eq!(runtime.health(), RuntimeHealth::Ok);

        runtime.on_command_at(forward(), now);
        assert_eq!(runtime.compute_direction_at(now), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_drive_applies_only_changes() {
        let mut driver = HexapodDriver::simulated(BAUDRATE, default_legs()).unwrap();
        driver.initialize(MOVING_SPEED).unwrap();
        let mut applied = Vec3::zeros();

        drive(&mut driver, &mut applied, Vec3::new(0.0, 0.0, 1.0)).unwrap();
        assert_eq!(applied, Vec3::new(0.0, 0.0, 1.0));
        // set_direction issued one step, update the next
        assert_eq!(driver.steps(), 2);

        drive(&mut driver, &mut applied, Vec3::new(0.0, 0.0, 1.0)).unwrap();
        assert_eq!(driver.steps(), 3);

        drive(&mut driver, &mut applied, Vec3::zeros()).unwrap();
        assert_eq!(driver.gait_state(), GaitState::Stopped);
        assert_eq!(driver.steps(), 3);
    }

    #[test]
    fn test_drive_failure_leaves_nothing_applied() {
        let mut driver = HexapodDriver::<SimulatedServos>::simulated(BAUDRATE, default_legs()).unwrap();
        driver.initialize(MOVING_SPEED).unwrap();
        driver.bus().lock().mute(10, true);
        let mut applied = Vec3::zeros();

        let err = drive(&mut driver, &mut applied, Vec3::new(1.0, 0.0, 0.0)).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(applied, Vec3::zeros());
        assert_eq!(driver.gait_state(), GaitState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drive_runs_off_the_async_workers() {
        let mut driver = HexapodDriver::simulated(BAUDRATE, default_legs()).unwrap();
        block_in_place(|| driver.initialize(MOVING_SPEED)).unwrap();
        let mut applied = Vec3::zeros();

        block_in_place(|| drive(&mut driver, &mut applied, Vec3::new(0.0, 0.0, 1.0))).unwrap();
        assert_eq!(driver.steps(), 2);
    }
}
