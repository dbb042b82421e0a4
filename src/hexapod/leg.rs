// A three-joint leg
//
// Foot targets arrive in the body frame, get moved into the leg's local frame
// and solved into joint angles. Moves are buffered on the servos; the gait
// decides when to trigger them.

use tracing::debug;

use super::error::{HexapodError, Result};
use super::kinematics::{self, JointAngles, LegGeometry, MountTransform, Vec3};
use crate::motor::joint::{JointActuator, JointConfig};
use crate::motor::transport::{Bus, Transport};

/// Named foot positions of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegPosition {
    /// Lifted above the walk center
    Idle,
    /// Touch-down point, ahead along the walking direction
    Start,
    /// Lift-off point, behind
    End,
}

#[derive(Debug, Clone, Copy)]
pub struct LegConfig {
    pub name: &'static str,
    pub mount_offset: Vec3,
    /// Mounting rotation about the vertical axis, degrees
    pub mount_angle_deg: f32,
    pub geometry: LegGeometry,
    /// Standing foot position in the local frame
    pub neutral_foot: Vec3,
    /// Half the step length per unit of direction
    pub step_speed: f32,
    /// How far the foot rises when idle
    pub idle_lift: f32,
    /// Base, proximal, distal
    pub joints: [JointConfig; 3],
}

pub struct Leg<T> {
    name: &'static str,
    mount: MountTransform,
    geometry: LegGeometry,
    walk_center: Vec3,
    step_speed: f32,
    idle_lift: f32,
    goal: Vec3,
    idle: Vec3,
    start: Vec3,
    end: Vec3,
    base: JointActuator<T>,
    proximal: JointActuator<T>,
    distal: JointActuator<T>,
}

impl<T: Transport> Leg<T> {
    pub fn new(bus: Bus<T>, config: LegConfig) -> Self {
        let mount = MountTransform::new(config.mount_offset, config.mount_angle_deg);
        let [base, proximal, distal] = config.joints;

        let mut leg = Self {
            name: config.name,
            mount,
            geometry: config.geometry,
            walk_center: mount.to_body(config.neutral_foot),
            step_speed: config.step_speed,
            idle_lift: config.idle_lift,
            goal: config.neutral_foot,
            idle: config.neutral_foot,
            start: config.neutral_foot,
            end: config.neutral_foot,
            base: JointActuator::new(bus.clone(), base),
            proximal: JointActuator::new(bus.clone(), proximal),
            distal: JointActuator::new(bus, distal),
        };
        leg.set_direction(Vec3::zeros());
        leg
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn geometry(&self) -> &LegGeometry {
        &self.geometry
    }

    /// Current foot goal, local frame
    pub fn goal(&self) -> Vec3 {
        self.goal
    }

    /// Walk center in the body frame
    pub fn walk_center(&self) -> Vec3 {
        self.walk_center
    }

    /// Reference position in the local frame
    pub fn position(&self, position: LegPosition) -> Vec3 {
        match position {
            LegPosition::Idle => self.idle,
            LegPosition::Start => self.start,
            LegPosition::End => self.end,
        }
    }

    pub fn joints(&self) -> [&JointActuator<T>; 3] {
        [&self.base, &self.proximal, &self.distal]
    }

    pub fn joint_ids(&self) -> [u8; 3] {
        [self.base.id(), self.proximal.id(), self.distal.id()]
    }

    pub fn to_local(&self, body: Vec3) -> Vec3 {
        self.mount.to_local(body)
    }

    /// Joint angles putting the foot at `target` (body frame)
    pub fn compute_joint_angles(&self, target: Vec3) -> Result<JointAngles> {
        self.solve_local(self.to_local(target))
    }

    fn solve_local(&self, local: Vec3) -> Result<JointAngles> {
        kinematics::solve(&self.geometry, local).map_err(|source| HexapodError::Kinematics {
            leg: self.name,
            source,
        })
    }

    /// Recompute start, end and idle around the walk center for `direction`
    pub fn set_direction(&mut self, direction: Vec3) {
        let stride = direction * self.step_speed;
        self.start = self.to_local(self.walk_center + stride);
        self.end = self.to_local(self.walk_center - stride);
        self.idle = self.to_local(self.walk_center + Vec3::new(0.0, self.idle_lift, 0.0));
    }

    /// Buffer a move to one of the reference positions
    pub fn go_to(&mut self, position: LegPosition) -> Result<JointAngles> {
        debug!("Leg {} -> {:?}", self.name, position);
        self.go_to_local(self.position(position))
    }

    /// Buffer a move to an arbitrary foot position (body frame)
    pub fn go_to_point(&mut self, target: Vec3) -> Result<JointAngles> {
        self.go_to_local(self.to_local(target))
    }

    fn go_to_local(&mut self, local: Vec3) -> Result<JointAngles> {
        let angles = self.solve_local(local)?;

        let commanded = JointAngles {
            base: self.base.move_to(angles.base)?,
            proximal: self.proximal.move_to(angles.proximal)?,
            distal: self.distal.move_to(angles.distal)?,
        };
        self.goal = local;
        Ok(commanded)
    }

    /// Halt all three joints where they last settled.
    /// Every joint gets the halt even if an earlier one fails.
    pub fn stop(&mut self) -> Result<()> {
        let base = self.base.stop();
        let proximal = self.proximal.stop();
        let distal = self.distal.stop();
        base.and(proximal).and(distal)?;
        Ok(())
    }

    /// Adopt the servos' present positions as where the leg last settled
    pub fn hold_present(&mut self) -> Result<()> {
        self.base.hold_present()?;
        self.proximal.hold_present()?;
        self.distal.hold_present()?;
        Ok(())
    }

    /// Poll every joint; true once all of them are at their targets
    pub fn refresh(&mut self) -> Result<bool> {
        let base = self.base.refresh()?;
        let proximal = self.proximal.refresh()?;
        let distal = self.distal.refresh()?;
        Ok(base && proximal && distal)
    }

    /// Last observed state; only updated by `refresh`
    pub fn has_reached_goal(&self) -> bool {
        self.base.has_reached_target()
            && self.proximal.has_reached_target()
            && self.distal.has_reached_target()
    }
}
