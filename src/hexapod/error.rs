//! Errors raised while moving legs

use thiserror::Error;

use super::kinematics::KinematicsError;
use crate::motor::Ax12Error;

#[derive(Error, Debug)]
pub enum HexapodError {
    /// A servo timed out, faulted or the bus failed
    #[error("Actuator error: {0}")]
    Actuator(#[from] Ax12Error),

    /// The requested foot position cannot be reached
    #[error("Leg {leg}: {source}")]
    Kinematics {
        leg: &'static str,
        #[source]
        source: KinematicsError,
    },
}

impl HexapodError {
    /// Whether the bus reported silence rather than a bad answer
    pub fn is_timeout(&self) -> bool {
        matches!(self, HexapodError::Actuator(Ax12Error::Timeout { .. }))
    }
}

pub type Result<T> = std::result::Result<T, HexapodError>;
