// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::hexapod::gait::{GaitState, StepPhase};
use crate::hexapod::kinematics::Vec3;

// Command from teleop/scripts -> runtime
// Walking direction in the ground plane of the body frame (z forward, x right)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct WalkCommand {
    pub x: f32,
    pub z: f32,
}

impl WalkCommand {
    /// Direction vector for the gait, its length capped at 1
    pub fn direction(&self) -> Vec3 {
        let direction = Vec3::new(self.x, 0.0, self.z);
        if !direction.iter().all(|c| c.is_finite()) {
            return Vec3::zeros();
        }
        let norm = direction.norm();
        if norm > 1.0 {
            direction / norm
        } else {
            direction
        }
    }
}

// Gait state published by the runtime every tick
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GaitStatus {
    pub walking: bool,
    pub phase: Option<StepPhase>,
    pub direction: [f32; 3],
    pub steps: u64,
}

impl GaitStatus {
    pub fn new(state: GaitState, direction: Vec3, steps: u64) -> Self {
        let phase = match state {
            GaitState::Walking(phase) => Some(phase),
            GaitState::Stopped => None,
        };
        Self {
            walking: phase.is_some(),
            phase,
            direction: [direction.x, direction.y, direction.z],
            steps,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    /// The servo bus failed and the gait halted
    ActuatorFault,
}
