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

use tracing::debug;

use super::{cycles_from_report, expect_len, ExecError};
use crate::config::AcceleratorConfig;
use crate::runtime::{GemmOperands, Simulator};

fn check_gemm_operands(operands: &GemmOperands<'_>, output: &[f32]) -> Result<(), ExecError> {
    let shape = operands.shape;
    expect_len("weights", operands.weights.len(), shape.weight_len(operands.groups))?;
    expect_len("activations", operands.activations.len(), shape.activation_len())?;
    expect_len("output", output.len(), shape.output_len())?;
    Ok(())
}

/// Dense GEMM on a matrix-multiplication-only accelerator.
pub fn run_dense_gemm(
    simulator: &dyn Simulator,
    operands: &GemmOperands<'_>,
    output: &mut [f32],
    config: &AcceleratorConfig,
) -> Result<u64, ExecError> {
    check_gemm_operands(operands, output)?;
    debug!(
        layer = operands.layer_name,
        gemm = %operands.shape,
        layout = %operands.layout,
        stationary = %operands.stationary,
        "simulate dense GEMM"
    );
    let report = simulator.simulate_dense_gemm(operands, output, config)?;
    Ok(cycles_from_report(operands.layer_name, report)?)
}

/// Sparse GEMM on an accelerator with sparsity support.
pub fn run_sparse_gemm(
    simulator: &dyn Simulator,
    operands: &GemmOperands<'_>,
    output: &mut [f32],
    config: &AcceleratorConfig,
) -> Result<u64, ExecError> {
    check_gemm_operands(operands, output)?;
    debug!(
        layer = operands.layer_name,
        gemm = %operands.shape,
        sparsity = operands.sparsity_ratio,
        stationary = %operands.stationary,
        "simulate sparse GEMM"
    );
    let report = simulator.simulate_sparse_gemm(operands, output, config)?;
    Ok(cycles_from_report(operands.layer_name, report)?)
}
