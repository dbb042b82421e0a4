// Gait coordinator
//
// Alternating tripod: even-indexed legs form group A, odd-indexed legs group
// B. While one group swings (lift, then touch down ahead), the other pushes
// the body along. Every phase buffers all of its writes first and commits
// them with a single broadcast trigger.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{HexapodError, Result};
use super::kinematics::Vec3;
use super::leg::{Leg, LegPosition};
use crate::motor::ax12::Ax12;
use crate::motor::transport::{Bus, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    /// Group A lifts to idle, group B strokes to end
    LiftA,
    /// Group A touches down at start
    PlaceA,
    /// Group B lifts to idle, group A strokes to end
    LiftB,
    /// Group B touches down at start
    PlaceB,
}

impl StepPhase {
    pub fn next(self) -> Self {
        match self {
            StepPhase::LiftA => StepPhase::PlaceA,
            StepPhase::PlaceA => StepPhase::LiftB,
            StepPhase::LiftB => StepPhase::PlaceB,
            StepPhase::PlaceB => StepPhase::LiftA,
        }
    }

    /// Where leg `index` goes in this phase, `None` to hold
    pub fn target(self, index: usize) -> Option<LegPosition> {
        let group_a = index % 2 == 0;
        match (self, group_a) {
            (StepPhase::LiftA, true) | (StepPhase::LiftB, false) => Some(LegPosition::Idle),
            (StepPhase::LiftA, false) | (StepPhase::LiftB, true) => Some(LegPosition::End),
            (StepPhase::PlaceA, true) | (StepPhase::PlaceB, false) => Some(LegPosition::Start),
            (StepPhase::PlaceA, false) | (StepPhase::PlaceB, true) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaitState {
    Stopped,
    Walking(StepPhase),
}

pub struct Gait<T> {
    trigger: Ax12<T>,
    direction: Vec3,
    state: GaitState,
    steps: u64,
}

impl<T: Transport> Gait<T> {
    pub fn new(bus: Bus<T>) -> Self {
        Self {
            trigger: Ax12::broadcast(bus),
            direction: Vec3::zeros(),
            state: GaitState::Stopped,
            steps: 0,
        }
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn state(&self) -> GaitState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state == GaitState::Stopped
    }

    /// Phases committed since construction
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Start walking towards `direction` (body frame), or stop on zero
    pub fn set_direction(&mut self, legs: &mut [Leg<T>], direction: Vec3) -> Result<()> {
        if direction == Vec3::zeros() {
            return self.stop(legs);
        }

        for leg in legs.iter_mut() {
            leg.set_direction(direction);
        }
        if self.is_stopped() {
            info!("Gait starting towards {:?}", direction.as_slice());
        } else {
            info!("Gait direction changed to {:?}", direction.as_slice());
        }
        self.direction = direction;
        self.walk(legs)
    }

    /// Stop walking and halt every leg where it last settled.
    /// All legs are halted even if some of them fail; the first error is returned.
    pub fn stop(&mut self, legs: &mut [Leg<T>]) -> Result<()> {
        if !self.is_stopped() {
            info!("Gait stopping");
        }
        self.direction = Vec3::zeros();
        self.state = GaitState::Stopped;

        let mut first_error = None;
        for leg in legs.iter_mut() {
            if let Err(e) = leg.stop() {
                warn!("Failed to stop leg {}: {}", leg.name(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Periodic tick: advance to the next phase once every leg has settled
    pub fn update(&mut self, legs: &mut [Leg<T>]) -> Result<()> {
        let GaitState::Walking(phase) = self.state else {
            return Ok(());
        };

        let mut settled = true;
        for leg in legs.iter_mut() {
            match leg.refresh() {
                Ok(reached) => settled &= reached,
                Err(e) => return Err(self.halt(legs, e)),
            }
        }
        if !settled {
            return Ok(());
        }

        self.issue_step(legs, phase.next())
    }

    /// Begin a fresh step cycle from the first phase
    fn walk(&mut self, legs: &mut [Leg<T>]) -> Result<()> {
        self.issue_step(legs, StepPhase::LiftA)
    }

    fn issue_step(&mut self, legs: &mut [Leg<T>], phase: StepPhase) -> Result<()> {
        let buffered = legs.iter_mut().enumerate().try_for_each(|(index, leg)| {
            match phase.target(index) {
                Some(position) => leg.go_to(position).map(|_| ()),
                None => Ok(()),
            }
        });
        let committed = buffered.and_then(|()| {
            self.trigger
                .send_trigger_broadcast()
                .map_err(HexapodError::from)
        });
        if let Err(e) = committed {
            return Err(self.halt(legs, e));
        }

        self.state = GaitState::Walking(phase);
        self.steps += 1;
        Ok(())
    }

    /// Error policy: any failure mid-walk stops the gait
    fn halt(&mut self, legs: &mut [Leg<T>], error: HexapodError) -> HexapodError {
        warn!("Halting gait: {}", error);
        if let Err(e) = self.stop(legs) {
            warn!("Gait halted with legs not confirmed stopped: {}", e);
        }
        error
    }
}
