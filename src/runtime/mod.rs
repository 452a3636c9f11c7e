//! Simulator backends.
//!
//! This module hosts the operand surface types and the [`Simulator`] contract
//! that the execution adapters call. The cycle-accurate engine lives outside
//! this crate; [`ReferenceSimulator`] is a functional stand-in.

pub mod reference;
pub mod simulator;
pub mod types;

pub use reference::ReferenceSimulator;
pub use simulator::{Simulator, UnavailableSimulator};
pub use types::{ActivationLayout, ConvOperands, GemmOperands, SimulationReport, SimulatorError};
