// Servo bus layer for the hexapod
//
// Provides:
// - Half-duplex transport over a serial port, plus an in-memory servo bus
// - Dynamixel AX-12 packet protocol
// - Joint actuators mapping angles to servo positions

pub mod ax12;
pub mod joint;
pub mod sim;
pub mod transport;

pub use ax12::{Ax12, Ax12Error, Instruction, Mode, Register, Status, StatusError};
pub use joint::{AngleRange, Calibration, Joint, JointActuator, JointConfig};
pub use sim::SimulatedServos;
pub use transport::{Bus, Direction, SerialTransport, Transaction, Transport};
