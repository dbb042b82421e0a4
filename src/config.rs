// Timeouts, topics, servo bus and leg layout
use std::time::Duration;

use crate::hexapod::kinematics::{LegGeometry, Vec3};
use crate::hexapod::leg::LegConfig;
use crate::motor::ax12::DEFAULT_BAUDRATE;
use crate::motor::joint::{AngleRange, Calibration, Joint, JointConfig};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_WALK: &str = "hexapod/cmd/walk"; // walking direction
pub const TOPIC_GAIT: &str = "hexapod/state/gait"; // gait status
pub const TOPIC_HEALTH: &str = "hexapod/state/health"; // health status

// Servo bus
// Serial port of the half-duplex adapter
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";
pub const BAUDRATE: u32 = DEFAULT_BAUDRATE;

// Drive real servos (set to false to run against the simulated bus)
pub const MOTOR_ENABLED: bool = true;

// Goal speed written to every servo on bring-up (raw units, 0 = max)
pub const MOVING_SPEED: u16 = 300;

// Leg geometry, in centimeters
pub const FEMUR_LENGTH: f32 = 4.0;
pub const TIBIA_LENGTH: f32 = 4.0;
pub const COXA_LENGTH: f32 = 0.0;
pub const BODY_RADIUS: f32 = 6.0;

// Standing foot position in each leg's local frame
pub const NEUTRAL_FOOT: [f32; 3] = [0.0, -4.0, 3.0];

// Half stride per unit of walking direction
pub const STEP_SPEED: f32 = 2.0;
// Foot rise while swinging
pub const IDLE_LIFT: f32 = 3.0;

pub const BASE_RANGE: AngleRange = AngleRange::new(-60.0, 60.0);
pub const PROXIMAL_RANGE: AngleRange = AngleRange::new(-90.0, 90.0);
pub const DISTAL_RANGE: AngleRange = AngleRange::new(0.0, 150.0);

/// Leg names and mounting directions, clockwise from the front right.
/// Angles are measured from body +z (forward) towards +x (right).
/// Consecutive legs alternate tripod groups.
pub const LEG_LAYOUT: [(&str, f32); 6] = [
    ("front_right", 45.0),
    ("middle_right", 90.0),
    ("rear_right", 135.0),
    ("rear_left", -135.0),
    ("middle_left", -90.0),
    ("front_left", -45.0),
];

/// The six legs, servo ids 1..=18 (base, proximal, distal per leg).
/// Servos on the left side are mounted mirrored, so their pitch joints turn
/// the other way.
pub fn default_legs() -> Vec<LegConfig> {
    LEG_LAYOUT
        .iter()
        .enumerate()
        .map(|(index, &(name, angle_deg))| {
            let first_id = index as u8 * 3 + 1;
            let mirrored = angle_deg < 0.0;
            let angle = angle_deg.to_radians();
            let outward = Vec3::new(angle.sin(), 0.0, angle.cos());

            LegConfig {
                name,
                mount_offset: outward * BODY_RADIUS,
                mount_angle_deg: -angle_deg,
                geometry: LegGeometry {
                    femur: FEMUR_LENGTH,
                    tibia: TIBIA_LENGTH,
                    coxa: COXA_LENGTH,
                    base_offset_deg: 0.0,
                },
                neutral_foot: Vec3::from(NEUTRAL_FOOT),
                step_speed: STEP_SPEED,
                idle_lift: IDLE_LIFT,
                joints: [
                    joint(Joint::Base, first_id, BASE_RANGE, false),
                    joint(Joint::Proximal, first_id + 1, PROXIMAL_RANGE, mirrored),
                    joint(Joint::Distal, first_id + 2, DISTAL_RANGE, mirrored),
                ],
            }
        })
        .collect()
}

fn joint(joint: Joint, id: u8, range: AngleRange, inverted: bool) -> JointConfig {
    JointConfig {
        joint,
        id,
        range,
        calibration: Calibration {
            inverted,
            ..Calibration::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hexapod::kinematics::MountTransform;

    #[test]
    fn test_default_legs_use_distinct_ids() {
        let mut ids: Vec<u8> = default_legs()
            .iter()
            .flat_map(|leg| leg.joints.iter().map(|joint| joint.id))
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids, (1..=18).collect::<Vec<u8>>());
    }

    #[test]
    fn test_tripods_straddle_the_body() {
        // Each group needs legs on both sides to stand on
        let legs = default_legs();
        for group in [0, 1] {
            let sides: Vec<bool> = legs
                .iter()
                .skip(group)
                .step_by(2)
                .map(|leg| leg.mount_offset.x > 0.0)
                .collect();
            assert!(sides.contains(&true) && sides.contains(&false), "{:?}", sides);
        }
    }

    #[test]
    fn test_legs_point_outward() {
        for leg in default_legs() {
            let mount = MountTransform::new(leg.mount_offset, leg.mount_angle_deg);
            let local = mount.to_local(leg.mount_offset * 2.0);
            assert!(local.x.abs() < 1e-4, "{} {:?}", leg.name, local);
            assert!((local.z - BODY_RADIUS).abs() < 1e-4, "{} {:?}", leg.name, local);
        }
    }

    #[test]
    fn test_left_side_pitch_joints_are_inverted() {
        for leg in default_legs() {
            let left = leg.mount_offset.x < 0.0;
            assert!(!leg.joints[0].calibration.inverted);
            assert_eq!(leg.joints[1].calibration.inverted, left, "{}", leg.name);
            assert_eq!(leg.joints[2].calibration.inverted, left, "{}", leg.name);
        }
    }
}
