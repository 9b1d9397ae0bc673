//! Testing utilities and mock implementations
//!
//! Mocks for every collaborator of the sensor agent, usable without a
//! network, broker or sensor hardware.

pub mod mocks;

pub use mocks::*;
