pub mod config;
pub mod hexapod;
pub mod messages;
pub mod motor;
pub mod runtime;
