//! Topic layout and message formats of the sensor node

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
