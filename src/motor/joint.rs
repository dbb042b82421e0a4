// One leg joint driven by one servo
//
// Angles are joint angles in degrees. The calibration maps them onto the
// servo dial (0..300 degrees over 0..1023 raw).

use tracing::debug;

use super::ax12::{Ax12, POSITION_MAX, POSITION_RANGE_DEG, Register, Result};
use super::transport::{Bus, Transport};

/// Which joint of the leg a servo drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joint {
    /// Rotation about the vertical axis at the body
    Base,
    /// First link (femur)
    Proximal,
    /// Second link (tibia)
    Distal,
}

/// Allowed joint travel in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleRange {
    pub min: f32,
    pub max: f32,
}

impl AngleRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, angle: f32) -> f32 {
        angle.clamp(self.min, self.max)
    }
}

/// Where joint zero sits on the servo dial and which way it turns
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub zero_deg: f32,
    pub inverted: bool,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            zero_deg: POSITION_RANGE_DEG / 2.0,
            inverted: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JointConfig {
    pub joint: Joint,
    pub id: u8,
    pub range: AngleRange,
    pub calibration: Calibration,
}

pub struct JointActuator<T> {
    joint: Joint,
    servo: Ax12<T>,
    range: AngleRange,
    calibration: Calibration,
    target: f32,
    last_safe: f32,
    reached: bool,
}

impl<T: Transport> JointActuator<T> {
    pub fn new(bus: Bus<T>, config: JointConfig) -> Self {
        let rest = config.range.clamp(0.0);
        Self {
            joint: config.joint,
            servo: Ax12::new(bus, config.id),
            range: config.range,
            calibration: config.calibration,
            target: rest,
            last_safe: rest,
            reached: true,
        }
    }

    pub fn joint(&self) -> Joint {
        self.joint
    }

    pub fn id(&self) -> u8 {
        self.servo.id()
    }

    pub fn range(&self) -> AngleRange {
        self.range
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn last_safe(&self) -> f32 {
        self.last_safe
    }

    pub fn servo(&mut self) -> &mut Ax12<T> {
        &mut self.servo
    }

    /// Joint angle to raw goal position
    pub fn to_raw(&self, angle: f32) -> u16 {
        let offset = if self.calibration.inverted { -angle } else { angle };
        let dial = self.calibration.zero_deg + offset;
        let raw = (dial / POSITION_RANGE_DEG * POSITION_MAX as f32).round();
        raw.clamp(0.0, POSITION_MAX as f32) as u16
    }

    /// Raw position back to a joint angle
    pub fn from_raw(&self, raw: u16) -> f32 {
        let dial = raw as f32 * POSITION_RANGE_DEG / POSITION_MAX as f32;
        let offset = dial - self.calibration.zero_deg;
        if self.calibration.inverted { -offset } else { offset }
    }

    /// Buffer a move to `angle` (clamped to the range); it runs on the next trigger.
    /// Returns the angle actually commanded.
    pub fn move_to(&mut self, angle: f32) -> Result<f32> {
        let clamped = self.range.clamp(angle);
        if clamped != angle {
            debug!(
                "{:?} joint {} clamped {:.1} to {:.1}",
                self.joint,
                self.id(),
                angle,
                clamped
            );
        }

        let raw = self.to_raw(clamped);
        self.servo.reg_write_u16(Register::GoalPosition, raw)?;
        self.target = clamped;
        self.reached = false;
        Ok(clamped)
    }

    /// Adopt the servo's present position as target and last safe angle
    pub fn hold_present(&mut self) -> Result<f32> {
        let raw = self.servo.present_position()?;
        let angle = self.from_raw(raw);
        self.target = angle;
        self.last_safe = angle;
        self.reached = true;
        Ok(angle)
    }

    /// Halt by sending the last known safe position, effective immediately
    pub fn stop(&mut self) -> Result<()> {
        let raw = self.to_raw(self.last_safe);
        self.servo.set_goal_position(raw)?;
        self.target = self.last_safe;
        Ok(())
    }

    /// Last observed state; only updated by `refresh`
    pub fn has_reached_target(&self) -> bool {
        self.reached
    }

    /// Poll the servo's moving flag
    pub fn refresh(&mut self) -> Result<bool> {
        let moving = self.servo.is_moving()?;
        self.reached = !moving;
        if self.reached {
            self.last_safe = self.target;
        }
        Ok(self.reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::ax12::{Ax12Error, DEFAULT_BAUDRATE, StatusError};
    use crate::motor::sim::SimulatedServos;

    fn joint(bus: &Bus<SimulatedServos>, id: u8, inverted: bool) -> JointActuator<SimulatedServos> {
        JointActuator::new(
            bus.clone(),
            JointConfig {
                joint: Joint::Proximal,
                id,
                range: AngleRange::new(-90.0, 90.0),
                calibration: Calibration {
                    inverted,
                    ..Default::default()
                },
            },
        )
    }

    fn bus_with(ids: &[u8]) -> Bus<SimulatedServos> {
        Bus::new(SimulatedServos::with_servos(ids), DEFAULT_BAUDRATE).unwrap()
    }

    #[test]
    fn test_raw_conversion() {
        let bus = bus_with(&[]);
        let straight = joint(&bus, 1, false);
        let mirrored = joint(&bus, 2, true);

        assert_eq!(straight.to_raw(0.0), 512);
        assert_eq!(straight.to_raw(150.0), 1023);
        assert_eq!(straight.to_raw(-150.0), 0);
        assert_eq!(mirrored.to_raw(150.0), 0);
        assert!((straight.from_raw(straight.to_raw(30.0)) - 30.0).abs() < 0.3);
        assert!((mirrored.from_raw(mirrored.to_raw(-45.0)) + 45.0).abs() < 0.3);
    }

    #[test]
    fn test_move_is_clamped_and_buffered() {
        let bus = bus_with(&[1]);
        let mut joint = joint(&bus, 1, false);

        let commanded = joint.move_to(120.0).unwrap();
        assert_eq!(commanded, 90.0);
        assert!(!joint.has_reached_target());

        let sim = bus.lock();
        // Nothing moves until the trigger
        assert_eq!(sim.register_u16(1, Register::GoalPosition), 512);
        assert_eq!(sim.register(1, Register::Registered), 1);
        assert_eq!(sim.sent().last().unwrap()[4], 0x04);
    }

    #[test]
    fn test_refresh_tracks_moving_flag() {
        let bus = bus_with(&[1]);
        bus.lock().hold_motion(1, true);
        let mut joint = joint(&bus, 1, false);

        joint.move_to(30.0).unwrap();
        Ax12::broadcast(bus.clone()).send_trigger_broadcast().unwrap();
        assert!(!joint.refresh().unwrap());
        assert_eq!(joint.last_safe(), 0.0);

        bus.lock().finish_motion(1);
        assert!(joint.refresh().unwrap());
        assert!(joint.has_reached_target());
        assert_eq!(joint.last_safe(), 30.0);
    }

    #[test]
    fn test_stop_writes_last_safe_position_immediately() {
        let bus = bus_with(&[1]);
        bus.lock().hold_motion(1, true);
        let mut joint = joint(&bus, 1, false);

        joint.move_to(60.0).unwrap();
        Ax12::broadcast(bus.clone()).send_trigger_broadcast().unwrap();
        joint.stop().unwrap();

        let sim = bus.lock();
        assert_eq!(sim.sent().last().unwrap()[4], 0x03);
        assert_eq!(sim.register_u16(1, Register::GoalPosition), 512);
        assert_eq!(joint.target(), 0.0);
    }

    #[test]
    fn test_stop_holds_the_adopted_present_position() {
        let bus = bus_with(&[1]);
        bus.lock().set_register_u16(1, Register::PresentPosition, 700);
        let mut joint = joint(&bus, 1, true);

        let angle = joint.hold_present().unwrap();
        assert!((angle + 55.28).abs() < 0.01, "{}", angle);
        assert_eq!(joint.last_safe(), angle);

        joint.stop().unwrap();
        assert_eq!(bus.lock().register_u16(1, Register::GoalPosition), 700);
    }

    #[test]
    fn test_fault_is_reported() {
        let bus = bus_with(&[1]);
        bus.lock().set_fault(1, StatusError::ANGLE_LIMIT);
        let mut joint = joint(&bus, 1, false);

        let result = joint.move_to(10.0);
        assert!(matches!(result, Err(Ax12Error::Fault { id: 1, .. })));
        assert_eq!(joint.target(), 0.0);
    }

    #[test]
    fn test_silent_servo_times_out() {
        let bus = bus_with(&[1]);
        bus.lock().mute(1, true);
        let mut joint = joint(&bus, 1, false);

        assert!(matches!(joint.refresh(), Err(Ax12Error::Timeout { id: 1 })));
    }
}
