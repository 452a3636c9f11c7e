//! Shared surface types for simulator backends.

use std::fmt;

use crate::config::{Stationarity, TileConfig};
use crate::shapes::GemmShape;
use crate::types::ConvShape;

/// Orientation of the activation operand handed to a GEMM entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationLayout {
    /// Row-major `[K, N]`, as produced by im2col.
    KN,
    /// Row-major `[N, K]`, one row per output position.
    NK,
}

impl fmt::Display for ActivationLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationLayout::KN => write!(f, "KN"),
            ActivationLayout::NK => write!(f, "NK"),
        }
    }
}

/// Operands of the native dense convolution entry point.
#[derive(Clone, Copy, Debug)]
pub struct ConvOperands<'a> {
    pub layer_name: &'a str,
    pub shape: &'a ConvShape,
    /// NCHW input.
    pub input: &'a [f32],
    /// OIHW weights with `C / G` input channels per filter.
    pub weight: &'a [f32],
    pub tile: Option<&'a TileConfig>,
}

/// Operands of the dense and sparse GEMM entry points.
///
/// Computes `output[M, N] = weights[M, K/G] x activations`, where group `g`
/// owns filters `[g*M/G, (g+1)*M/G)` and activation rows `[g*K/G, (g+1)*K/G)`.
#[derive(Clone, Copy, Debug)]
pub struct GemmOperands<'a> {
    pub layer_name: &'a str,
    pub shape: GemmShape,
    pub groups: usize,
    pub weights: &'a [f32],
    pub activations: &'a [f32],
    pub layout: ActivationLayout,
    pub stationary: Stationarity,
    /// Percentage of pruned weights; informational for dense GEMM.
    pub sparsity_ratio: u32,
}

/// Raw outcome of one simulated layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulationReport {
    /// Cycle count as reported by the simulator, before validation.
    pub cycles: i64,
}

/// Structured simulator failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulatorError {
    /// The simulator refused the layer.
    #[error("simulator rejected layer {layer}: {message}")]
    Rejected { layer: String, message: String },
    /// The simulator returned a cycle count that cannot be a duration.
    #[error("simulator returned invalid cycle count {cycles} for layer {layer}")]
    InvalidCycleCount { layer: String, cycles: i64 },
    /// No simulator is linked for this entry point.
    #[error("simulator backend unavailable: {0}")]
    Unavailable(String),
}
