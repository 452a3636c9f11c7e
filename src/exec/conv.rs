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
use crate::runtime::{ConvOperands, Simulator};
use crate::types::element_count;

/// Native dense convolution: operands go to the simulator untouched.
pub fn run_dense_conv(
    simulator: &dyn Simulator,
    operands: &ConvOperands<'_>,
    output: &mut [f32],
    config: &AcceleratorConfig,
) -> Result<u64, ExecError> {
    let shape = operands.shape;
    expect_len("input", operands.input.len(), element_count(&[shape.c, shape.x, shape.y]))?;
    expect_len(
        "weight",
        operands.weight.len(),
        element_count(&[shape.k, shape.channels_per_group(), shape.r, shape.s]),
    )?;
    expect_len(
        "output",
        output.len(),
        element_count(&[shape.k, shape.h_out, shape.w_out]),
    )?;

    debug!(
        layer = operands.layer_name,
        groups = shape.g,
        tiled = operands.tile.is_some(),
        "simulate dense convolution"
    );
    let report = simulator.simulate_dense_conv(operands, output, config)?;
    Ok(cycles_from_report(operands.layer_name, report)?)
}

#[cfg(test)]
mod tests {
    use super::run_dense_conv;
    use crate::config::AcceleratorConfig;
    use crate::exec::ExecError;
    use crate::runtime::{ConvOperands, ReferenceSimulator, UnavailableSimulator};
    use crate::shapes::ShapeMismatch;
    use crate::types::ConvShape;

    #[test]
    fn short_weight_rejected_before_simulation() {
        let shape = ConvShape::new((3, 3), 1, 2, (4, 4));
        let ops = ConvOperands {
            layer_name: "Conv2dLayerDense",
            shape: &shape,
            input: &[1.0; 16],
            weight: &[1.0; 9],
            tile: None,
        };
        let mut out = vec![0.0f32; 8];
        let err = run_dense_conv(&ReferenceSimulator, &ops, &mut out, &AcceleratorConfig::maeri())
            .unwrap_err();
        assert_eq!(
            err,
            ExecError::Shape(ShapeMismatch::Operand {
                role: "weight",
                expected: 18,
                actual: 9,
            })
        );
    }

    #[test]
    fn simulator_failure_propagates() {
        let shape = ConvShape::new((1, 1), 1, 1, (1, 1));
        let ops = ConvOperands {
            layer_name: "Conv2dLayerDense",
            shape: &shape,
            input: &[1.0],
            weight: &[1.0],
            tile: None,
        };
        let mut out = [0.0f32];
        assert!(matches!(
            run_dense_conv(&UnavailableSimulator, &ops, &mut out, &AcceleratorConfig::maeri()),
            Err(ExecError::Simulator(_))
        ));
    }
}
