//! Contract of the external accelerator simulator.
//!
//! The cycle-accurate engine is a black box: it receives shaped operands,
//! writes the layer result into the output slice and returns a cycle count.
//! Implementations must not read or write outside the slices they are given.

use crate::config::AcceleratorConfig;
use crate::runtime::types::{ConvOperands, GemmOperands, SimulationReport, SimulatorError};

/// Entry points of a simulator backend.
pub trait Simulator {
    /// Simulates a dense convolution on an accelerator that supports it natively.
    fn simulate_dense_conv(
        &self,
        operands: &ConvOperands<'_>,
        output: &mut [f32],
        config: &AcceleratorConfig,
    ) -> Result<SimulationReport, SimulatorError>;

    /// Simulates a dense matrix multiplication.
    fn simulate_dense_gemm(
        &self,
        operands: &GemmOperands<'_>,
        output: &mut [f32],
        config: &AcceleratorConfig,
    ) -> Result<SimulationReport, SimulatorError>;

    /// Simulates a sparse matrix multiplication.
    fn simulate_sparse_gemm(
        &self,
        operands: &GemmOperands<'_>,
        output: &mut [f32],
        config: &AcceleratorConfig,
    ) -> Result<SimulationReport, SimulatorError>;
}

/// Backend for builds without a linked simulator.
pub struct UnavailableSimulator;

impl Simulator for UnavailableSimulator {
    fn simulate_dense_conv(
        &self,
        _operands: &ConvOperands<'_>,
        _output: &mut [f32],
        _config: &AcceleratorConfig,
    ) -> Result<SimulationReport, SimulatorError> {
        Err(SimulatorError::Unavailable("dense convolution".into()))
    }

    fn simulate_dense_gemm(
        &self,
        _operands: &GemmOperands<'_>,
        _output: &mut [f32],
        _config: &AcceleratorConfig,
    ) -> Result<SimulationReport, SimulatorError> {
        Err(SimulatorError::Unavailable("dense GEMM".into()))
    }

    fn simulate_sparse_gemm(
        &self,
        _operands: &GemmOperands<'_>,
        _output: &mut [f32],
        _config: &AcceleratorConfig,
    ) -> Result<SimulationReport, SimulatorError> {
        Err(SimulatorError::Unavailable("sparse GEMM".into()))
    }
}
