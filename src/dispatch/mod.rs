// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of stonne-bridge (tensor compiler to STONNE simulator bridge).

//! Capability-driven path selection.
//!
//! The execution path is chosen once per invocation from two capability
//! flags, in this order:
//!
//! 1. sparsity supported: im2col, then sparse GEMM with activations `[K, N]`
//!    and the filters stationary;
//! 2. no native convolution: im2col, transpose to `[N, K]`, then dense GEMM
//!    with the accelerator's configured stationarity;
//! 3. otherwise: native dense convolution, no lowering.
//!
//! There is no fallback between paths.

use std::fmt;

use tracing::debug;

use crate::config::{AcceleratorConfig, Stationarity, TileConfig};
use crate::exec::{run_dense_conv, run_dense_gemm, run_sparse_gemm};
use crate::lower::{im2col_into, transpose_into, Im2colParams};
use crate::pipeline::ForwardError;
use crate::runtime::{ActivationLayout, ConvOperands, GemmOperands, Simulator};
use crate::shapes::{derive_gemm_shape, GemmShape};
use crate::types::{ConvShape, LinearShape};

pub const SPARSE_CONV_TAG: &str = "Conv2dLayerSparse";
pub const DENSE_CONV_TAG: &str = "Conv2dLayerDense";
pub const SPARSE_LINEAR_TAG: &str = "FCLayerSparse";
pub const DENSE_LINEAR_TAG: &str = "FCLayerDense";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// im2col + sparse GEMM.
    Sparse,
    /// im2col + transpose + dense GEMM.
    GemmEmulation,
    /// Native dense convolution.
    NativeDense,
}

impl ExecutionPath {
    /// Pure function of `(sparsity_supported, native_conv_supported)`.
    pub fn from_capabilities(sparsity_supported: bool, native_conv_supported: bool) -> Self {
        match (sparsity_supported, native_conv_supported) {
            (true, _) => ExecutionPath::Sparse,
            (false, false) => ExecutionPath::GemmEmulation,
            (false, true) => ExecutionPath::NativeDense,
        }
    }

    pub fn select(config: &AcceleratorConfig) -> Self {
        Self::from_capabilities(config.sparsity_supported(), config.native_conv_supported())
    }

    /// Fully-connected layers are GEMMs already; native convolution support
    /// does not apply to them.
    pub fn select_for_linear(config: &AcceleratorConfig) -> Self {
        if config.sparsity_supported() {
            ExecutionPath::Sparse
        } else {
            ExecutionPath::GemmEmulation
        }
    }

    /// Name the simulated convolution layer is reported under.
    pub fn layer_tag(self, config: &AcceleratorConfig) -> String {
        match self {
            ExecutionPath::Sparse => SPARSE_CONV_TAG.to_string(),
            ExecutionPath::GemmEmulation => config.name().to_string(),
            ExecutionPath::NativeDense => DENSE_CONV_TAG.to_string(),
        }
    }

    pub fn linear_layer_tag(self) -> &'static str {
        match self {
            ExecutionPath::Sparse => SPARSE_LINEAR_TAG,
            ExecutionPath::GemmEmulation | ExecutionPath::NativeDense => DENSE_LINEAR_TAG,
        }
    }

    /// Whether the path lowers the input through im2col.
    pub fn lowers(self) -> bool {
        !matches!(self, ExecutionPath::NativeDense)
    }
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Sparse => write!(f, "sparse-gemm"),
            ExecutionPath::GemmEmulation => write!(f, "gemm-emulation"),
            ExecutionPath::NativeDense => write!(f, "native-dense"),
        }
    }
}

/// Heap-backed scratch for the lowered operands.
///
/// Buffers are resized to exactly the size the current invocation needs
/// before use. A caller running many layers can keep one instance alive to
/// avoid reallocating; parallel invocations need one instance each.
#[derive(Debug, Default)]
pub struct LoweringScratch {
    columns: Vec<f32>,
    transposed: Vec<f32>,
}

impl LoweringScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots currently reserved for lowered columns.
    pub fn columns_len(&self) -> usize {
        self.columns.len()
    }

    fn sized(buffer: &mut Vec<f32>, len: usize) -> &mut [f32] {
        buffer.clear();
        buffer.resize(len, 0.0);
        buffer.as_mut_slice()
    }
}

/// Validated operands of one convolution invocation.
#[derive(Debug, Clone, Copy)]
pub struct ConvInvocation<'a> {
    pub shape: &'a ConvShape,
    /// NCHW input, `C*X*Y` elements.
    pub input: &'a [f32],
    /// OIHW weights, `K*(C/G)*R*S` elements.
    pub weight: &'a [f32],
    pub tile: Option<&'a TileConfig>,
    pub sparsity_ratio: u32,
}

/// Unfold the input into `scratch.columns` and derive the GEMM extents.
fn lower_activations(
    shape: &ConvShape,
    input: &[f32],
    scratch: &mut LoweringScratch,
) -> Result<GemmShape, ForwardError> {
    let params = Im2colParams::from_conv(shape);
    let columns = LoweringScratch::sized(&mut scratch.columns, params.column_len()?);
    let (out_h, out_w) = im2col_into(input, &params, columns)?;
    let gemm = derive_gemm_shape(shape, out_h, out_w)?;
    gemm.expect_lowered_len(columns.len())?;
    debug!(gemm = %gemm, groups = shape.g, "lowered convolution");
    Ok(gemm)
}

/// Run a convolution on the given path; returns the simulated cycle count.
pub fn dispatch_conv(
    path: ExecutionPath,
    invocation: &ConvInvocation<'_>,
    output: &mut [f32],
    config: &AcceleratorConfig,
    simulator: &dyn Simulator,
    scratch: &mut LoweringScratch,
) -> Result<u64, ForwardError> {
    let layer = path.layer_tag(config);
    let shape = invocation.shape;
    debug!(%path, layer = %layer, accelerator = config.name(), "dispatch convolution");

    match path {
        ExecutionPath::NativeDense => {
            let operands = ConvOperands {
                layer_name: &layer,
                shape,
                input: invocation.input,
                weight: invocation.weight,
                tile: invocation.tile,
            };
            Ok(run_dense_conv(simulator, &operands, output, config)?)
        }
        ExecutionPath::Sparse => {
            let gemm = lower_activations(shape, invocation.input, scratch)?;
            let operands = GemmOperands {
                layer_name: &layer,
                shape: gemm,
                groups: shape.g,
                weights: invocation.weight,
                activations: &scratch.columns,
                layout: ActivationLayout::KN,
                stationary: Stationarity::Filters,
                sparsity_ratio: invocation.sparsity_ratio,
            };
            Ok(run_sparse_gemm(simulator, &operands, output, config)?)
        }
        ExecutionPath::GemmEmulation => {
            let gemm = lower_activations(shape, invocation.input, scratch)?;
            let transposed = LoweringScratch::sized(&mut scratch.transposed, gemm.activation_len());
            transpose_into(&scratch.columns, gemm.k, gemm.n, transposed)?;
            let operands = GemmOperands {
                layer_name: &layer,
                shape: gemm,
                groups: shape.g,
                weights: invocation.weight,
                activations: &scratch.transposed,
                layout: ActivationLayout::NK,
                stationary: config.stationary(),
                sparsity_ratio: invocation.sparsity_ratio,
            };
            Ok(run_dense_gemm(simulator, &operands, output, config)?)
        }
    }
}

/// Validated operands of one fully-connected invocation.
#[derive(Debug, Clone, Copy)]
pub struct LinearInvocation<'a> {
    pub shape: &'a LinearShape,
    /// `[1, in]` input row.
    pub input: &'a [f32],
    /// `[out, in]` weights.
    pub weight: &'a [f32],
    pub sparsity_ratio: u32,
}

/// Run a fully-connected layer as a single-column GEMM.
pub fn dispatch_linear(
    path: ExecutionPath,
    invocation: &LinearInvocation<'_>,
    output: &mut [f32],
    config: &AcceleratorConfig,
    simulator: &dyn Simulator,
) -> Result<u64, ForwardError> {
    let gemm = GemmShape::for_linear(invocation.shape);
    let layer = path.linear_layer_tag();
    debug!(%path, layer, gemm = %gemm, "dispatch linear layer");

    // With N = 1 the [K, N] and [N, K] orientations share one memory layout.
    let (layout, stationary) = match path {
        ExecutionPath::Sparse => (ActivationLayout::KN, Stationarity::Filters),
        _ => (ActivationLayout::NK, config.stationary()),
    };
    let operands = GemmOperands {
        layer_name: layer,
        shape: gemm,
        groups: 1,
        weights: invocation.weight,
        activations: invocation.input,
        layout,
        stationary,
        sparsity_ratio: invocation.sparsity_ratio,
    };
    let cycles = match path {
        ExecutionPath::Sparse => run_sparse_gemm(simulator, &operands, output, config)?,
        _ => run_dense_gemm(simulator, &operands, output, config)?,
    };
    Ok(cycles)
}

#[cfg(test)]
mod tests {
    use super::{ExecutionPath, LoweringScratch};
    use crate::config::AcceleratorConfig;

    #[test]
    fn capability_table() {
        assert_eq!(ExecutionPath::from_capabilities(true, true), ExecutionPath::Sparse);
        assert_eq!(ExecutionPath::from_capabilities(true, false), ExecutionPath::Sparse);
        assert_eq!(
            ExecutionPath::from_capabilities(false, false),
            ExecutionPath::GemmEmulation
        );
        assert_eq!(
            ExecutionPath::from_capabilities(false, true),
            ExecutionPath::NativeDense
        );
    }

    #[test]
    fn presets_route_as_expected() {
        assert_eq!(ExecutionPath::select(&AcceleratorConfig::sigma()), ExecutionPath::Sparse);
        assert_eq!(
            ExecutionPath::select(&AcceleratorConfig::tpu()),
            ExecutionPath::GemmEmulation
        );
        assert_eq!(
            ExecutionPath::select(&AcceleratorConfig::maeri()),
            ExecutionPath::NativeDense
        );
        assert_eq!(
            ExecutionPath::select_for_linear(&AcceleratorConfig::maeri()),
            ExecutionPath::GemmEmulation
        );
    }

    #[test]
    fn layer_tags() {
        let tpu = AcceleratorConfig::tpu();
        assert_eq!(ExecutionPath::Sparse.layer_tag(&tpu), "Conv2dLayerSparse");
        assert_eq!(ExecutionPath::GemmEmulation.layer_tag(&tpu), "TPU");
        assert_eq!(ExecutionPath::NativeDense.layer_tag(&tpu), "Conv2dLayerDense");
        assert_eq!(ExecutionPath::Sparse.linear_layer_tag(), "FCLayerSparse");
        assert!(!ExecutionPath::NativeDense.lowers());
    }

    #[test]
    fn scratch_is_sized_exactly() {
        let mut scratch = LoweringScratch::new();
        assert_eq!(LoweringScratch::sized(&mut scratch.columns, 12).len(), 12);
        assert_eq!(LoweringScratch::sized(&mut scratch.columns, 5).len(), 5);
        assert_eq!(scratch.columns_len(), 5);
    }
}
