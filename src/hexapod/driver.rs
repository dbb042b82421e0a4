// High-level driver for the hexapod
//
// Owns the bus, the legs and the gait coordinator, and gives the runtime a
// small API: bring the servos up, walk in a direction, stop, tick.

use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::error::Result;
use super::gait::{Gait, GaitState};
use super::kinematics::Vec3;
use super::leg::{Leg, LegConfig, LegPosition};
use crate::motor::ax12::{Ax12, Ax12Error, Instruction, Mode, Register};
use crate::motor::sim::SimulatedServos;
use crate::motor::transport::{Bus, SerialTransport, Transport};

/// How long bring-up waits for the legs to reach the stance
pub const STAND_TIMEOUT: Duration = Duration::from_secs(3);

const SETTLE_POLL: Duration = Duration::from_millis(20);

pub struct HexapodDriver<T: Transport> {
    bus: Bus<T>,
    broadcast: Ax12<T>,
    legs: Vec<Leg<T>>,
    gait: Gait<T>,
    stand_timeout: Duration,
    torque_enabled: bool,
}

impl HexapodDriver<SerialTransport> {
    /// Connect to the servo bus on a serial port
    pub fn open(port: &str, baud_rate: u32, legs: Vec<LegConfig>) -> Result<Self> {
        info!("Opening servo bus on {} at {} baud", port, baud_rate);
        let transport = SerialTransport::open(port, baud_rate).map_err(Ax12Error::from)?;
        let bus = Bus::new(transport, baud_rate).map_err(Ax12Error::from)?;
        Ok(Self::new(bus, legs))
    }
}

impl HexapodDriver<SimulatedServos> {
    /// Driver backed by simulated servos carrying every configured id
    pub fn simulated(baud_rate: u32, legs: Vec<LegConfig>) -> Result<Self> {
        let ids: Vec<u8> = legs
            .iter()
            .flat_map(|leg| leg.joints.iter().map(|joint| joint.id))
            .collect();
        info!("Simulating {} servos", ids.len());
        let bus = Bus::new(SimulatedServos::with_servos(&ids), baud_rate).map_err(Ax12Error::from)?;
        Ok(Self::new(bus, legs))
    }
}

impl<T: Transport> HexapodDriver<T> {
    pub fn new(bus: Bus<T>, legs: Vec<LegConfig>) -> Self {
        let legs = legs
            .into_iter()
            .map(|config| Leg::new(bus.clone(), config))
            .collect();
        Self {
            broadcast: Ax12::broadcast(bus.clone()),
            gait: Gait::new(bus.clone()),
            bus,
            legs,
            stand_timeout: STAND_TIMEOUT,
            torque_enabled: false,
        }
    }

    pub fn with_stand_timeout(mut self, timeout: Duration) -> Self {
        self.stand_timeout = timeout;
        self
    }

    /// Every servo id, leg by leg
    pub fn servo_ids(&self) -> Vec<u8> {
        self.legs.iter().flat_map(|leg| leg.joint_ids()).collect()
    }

    /// Bring the servos up and stand on the neutral stance.
    ///
    /// Fails with a timeout naming the first servo that does not answer.
    pub fn initialize(&mut self, moving_speed: u16) -> Result<()> {
        let ids = self.servo_ids();
        info!("Initializing servos {:?}", ids);

        // First, check that all servos are reachable
        for &id in &ids {
            if Ax12::new(self.bus.clone(), id).ping()? {
                debug!("Servo {} responding", id);
            } else {
                warn!("Servo {} not responding to ping", id);
                return Err(Ax12Error::Timeout { id }.into());
            }
        }

        // Stopping before the stance is reached holds the pose found at power-up
        for leg in self.legs.iter_mut() {
            leg.hold_present()?;
        }

        for &id in &ids {
            let mut servo = Ax12::new(self.bus.clone(), id);
            servo.set_mode(Mode::Joint)?;
            servo.set_torque(true)?;
        }
        self.torque_enabled = true;

        let speeds: Vec<(u8, u16)> = ids.iter().map(|&id| (id, moving_speed)).collect();
        self.broadcast.sync_write_u16(Register::MovingSpeed, &speeds)?;

        // Stand: with no direction the start point is the neutral foot
        for leg in self.legs.iter_mut() {
            leg.set_direction(Vec3::zeros());
            leg.go_to(LegPosition::Start)?;
        }
        self.broadcast.send_trigger_broadcast()?;

        if !self.wait_until_settled(self.stand_timeout)? {
            warn!(
                "Stance not reached within {:?}, unsettled joints hold their power-up pose",
                self.stand_timeout
            );
        }

        info!("Servos initialized successfully");
        Ok(())
    }

    /// Poll the legs until every joint has settled or `timeout` runs out
    pub fn wait_until_settled(&mut self, timeout: Duration) -> Result<bool> {
        let started = Instant::now();
        loop {
            let mut settled = true;
            for leg in self.legs.iter_mut() {
                settled &= leg.refresh()?;
            }
            if settled {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            thread::sleep(SETTLE_POLL);
        }
    }

    pub fn set_direction(&mut self, direction: Vec3) -> Result<()> {
        self.gait.set_direction(&mut self.legs, direction)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.gait.stop(&mut self.legs)
    }

    pub fn update(&mut self) -> Result<()> {
        self.gait.update(&mut self.legs)
    }

    /// Let every servo go limp
    pub fn disable_torque(&mut self) -> Result<()> {
        info!("Disabling torque on all servos");
        self.broadcast
            .send_write_command(Instruction::Write, Register::TorqueEnable, &[0])?;
        self.torque_enabled = false;
        Ok(())
    }

    pub fn is_torque_enabled(&self) -> bool {
        self.torque_enabled
    }

    pub fn gait_state(&self) -> GaitState {
        self.gait.state()
    }

    pub fn direction(&self) -> Vec3 {
        self.gait.direction()
    }

    pub fn steps(&self) -> u64 {
        self.gait.steps()
    }

    pub fn legs(&self) -> &[Leg<T>] {
        &self.legs
    }

    pub fn bus(&self) -> &Bus<T> {
        &self.bus
    }
}

impl<T: Transport> Drop for HexapodDriver<T> {
    fn drop(&mut self) {
        // A goal write turns torque back on, so limp servos are left alone
        if !self.torque_enabled {
            return;
        }
        if let Err(e) = self.stop() {
            warn!("Failed to stop legs on drop: {}", e);
        }
    }
}
