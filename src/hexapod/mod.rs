// Legs, gait and the driver tying them to the servo bus

pub mod driver;
pub mod error;
pub mod gait;
pub mod kinematics;
pub mod leg;

pub use driver::HexapodDriver;
pub use error::{HexapodError, Result};
pub use gait::{Gait, GaitState, StepPhase};
pub use kinematics::{JointAngles, KinematicsError, LegGeometry, MountTransform, Vec3};
pub use leg::{Leg, LegConfig, LegPosition};
