// Leg inverse kinematics
//
// Local leg frame: y up, z pointing away from the body along the leg at zero
// base rotation, x completing the frame. The base joint turns the leg about
// y; the proximal and distal joints form a planar two-link arm in the
// vertical plane the base joint selects.

use nalgebra::Vector3;

pub type Vec3 = Vector3<f32>;

/// Slack allowed on the reach check before a target counts as unreachable
pub const REACH_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum KinematicsError {
    /// `distance` is the planar distance from the first joint to the target,
    /// or the (negative) horizontal reach when the target lies behind it
    #[error("Target at distance {distance:.3} is outside the reachable range [{min:.3}, {max:.3}]")]
    UnreachableTarget { distance: f32, min: f32, max: f32 },
}

/// Fixed two-link geometry of a leg
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegGeometry {
    /// Proximal link length
    pub femur: f32,
    /// Distal link length
    pub tibia: f32,
    /// Horizontal offset from the base axis to the proximal joint
    pub coxa: f32,
    /// Servo-facing offset added to the base rotation, degrees
    pub base_offset_deg: f32,
}

impl LegGeometry {
    /// Closest and farthest distance the two links can put the foot at
    pub fn reach(&self) -> (f32, f32) {
        ((self.tibia - self.femur).abs(), self.tibia + self.femur)
    }
}

/// Servo-facing joint angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointAngles {
    pub base: f32,
    pub proximal: f32,
    pub distal: f32,
}

/// Where a leg is mounted on the body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountTransform {
    pub offset: Vec3,
    /// Rotation about the vertical axis, radians
    pub angle: f32,
}

impl MountTransform {
    pub fn new(offset: Vec3, angle_deg: f32) -> Self {
        Self {
            offset,
            angle: angle_deg.to_radians(),
        }
    }

    pub fn to_local(&self, body: Vec3) -> Vec3 {
        let p = body - self.offset;
        let (sin, cos) = self.angle.sin_cos();
        Vec3::new(cos * p.x + sin * p.z, p.y, cos * p.z - sin * p.x)
    }

    pub fn to_body(&self, local: Vec3) -> Vec3 {
        let (sin, cos) = self.angle.sin_cos();
        let rotated = Vec3::new(
            cos * local.x - sin * local.z,
            local.y,
            sin * local.x + cos * local.z,
        );
        rotated + self.offset
    }
}

fn clamped_acos(cosine: f32) -> f32 {
    cosine.clamp(-1.0, 1.0).acos()
}

/// Joint angles placing the foot at `target` (local frame)
pub fn solve(geometry: &LegGeometry, target: Vec3) -> Result<JointAngles, KinematicsError> {
    let (min, max) = geometry.reach();
    let LegGeometry { femur, tibia, .. } = *geometry;

    let horizontal = (target.x * target.x + target.z * target.z).sqrt();
    let reach = horizontal - geometry.coxa;
    if reach < -REACH_EPSILON {
        return Err(KinematicsError::UnreachableTarget {
            distance: reach,
            min,
            max,
        });
    }
    let reach = reach.max(0.0);

    let distance = (reach * reach + target.y * target.y).sqrt();
    if distance < min - REACH_EPSILON || distance > max + REACH_EPSILON {
        return Err(KinematicsError::UnreachableTarget { distance, min, max });
    }

    let (elevation, knee) = if distance <= REACH_EPSILON {
        // Folded onto the proximal joint: keep the femur level
        (std::f32::consts::FRAC_PI_2, 0.0)
    } else {
        (
            clamped_acos(-target.y / distance),
            clamped_acos(
                (tibia * tibia - femur * femur - distance * distance) / (-2.0 * femur * distance),
            ),
        )
    };
    let ankle = clamped_acos(
        (distance * distance - tibia * tibia - femur * femur) / (-2.0 * tibia * femur),
    );

    Ok(JointAngles {
        base: target.x.atan2(target.z).to_degrees() + geometry.base_offset_deg,
        proximal: -(elevation + knee - std::f32::consts::FRAC_PI_2).to_degrees(),
        distal: 180.0 - ankle.to_degrees(),
    })
}

/// Foot position (local frame) produced by `angles`
pub fn forward(geometry: &LegGeometry, angles: &JointAngles) -> Vec3 {
    let base = (angles.base - geometry.base_offset_deg).to_radians();
    let femur_pitch = (-angles.proximal).to_radians();
    let tibia_pitch = femur_pitch - angles.distal.to_radians();

    let radial = geometry.coxa
        + geometry.femur * femur_pitch.cos()
        + geometry.tibia * tibia_pitch.cos();
    let height = geometry.femur * femur_pitch.sin() + geometry.tibia * tibia_pitch.sin();

    Vec3::new(radial * base.sin(), height, radial * base.cos())
}
