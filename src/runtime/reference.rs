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

//! Functional reference model of the simulator entry points.
//!
//! Produces exact layer results on the CPU and a deterministic analytic cycle
//! estimate (`ceil(work / lanes)`). It stands in for the cycle-accurate engine
//! in the CLI and in tests; it is not a timing model.

use tracing::info;

use crate::config::AcceleratorConfig;
use crate::lower::{sample_pixel, ImageDims};
use crate::runtime::simulator::Simulator;
use crate::runtime::types::{
    ActivationLayout, ConvOperands, GemmOperands, SimulationReport, SimulatorError,
};
use crate::types::element_count;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceSimulator;

impl ReferenceSimulator {
    pub fn new() -> Self {
        ReferenceSimulator
    }
}

fn reject(layer: &str, message: String) -> SimulatorError {
    SimulatorError::Rejected {
        layer: layer.to_string(),
        message,
    }
}

/// `ceil(work / lanes)`; an accelerator without lanes cannot run anything.
fn cycles_for(layer: &str, work: u64, lanes: usize) -> Result<u64, SimulatorError> {
    if lanes == 0 {
        return Err(reject(layer, "accelerator has no multiplier lanes".into()));
    }
    Ok(work.div_ceil(lanes as u64))
}

fn check_len(layer: &str, role: &str, actual: usize, expected: usize) -> Result<(), SimulatorError> {
    if actual != expected {
        return Err(reject(
            layer,
            format!("{role} holds {actual} elements, expected {expected}"),
        ));
    }
    Ok(())
}

fn emit_stats(config: &AcceleratorConfig, layer: &str, kind: &str, work: u64, cycles: u64) {
    if config.print_stats() {
        info!(
            target: "stonne_bridge::stats",
            accelerator = config.name(),
            layer,
            kind,
            ms_size = config.ms_size(),
            work,
            cycles,
            "layer statistics"
        );
    }
}

/// Shared GEMM kernel; returns the number of multiplications performed.
fn grouped_gemm(ops: &GemmOperands<'_>, output: &mut [f32], skip_zeros: bool) -> Result<u64, SimulatorError> {
    let layer = ops.layer_name;
    let shape = ops.shape;
    let groups = ops.groups;
    if shape.m == 0 || shape.n == 0 {
        return Err(reject(layer, format!("empty GEMM {}x{}", shape.m, shape.n)));
    }
    if groups == 0 || shape.m % groups != 0 || shape.k % groups != 0 {
        return Err(reject(
            layer,
            format!("{groups} groups do not split M={} K={}", shape.m, shape.k),
        ));
    }
    check_len(layer, "weights", ops.weights.len(), shape.weight_len(groups))?;
    check_len(layer, "activations", ops.activations.len(), shape.activation_len())?;
    check_len(layer, "output", output.len(), shape.output_len())?;

    let k_group = shape.k_per_group(groups);
    let m_group = shape.m / groups;
    let activation = |row: usize, col: usize| match ops.layout {
        ActivationLayout::KN => ops.activations[row * shape.n + col],
        ActivationLayout::NK => ops.activations[col * shape.k + row],
    };

    let mut multiplications = 0u64;
    for (m, out_row) in output.chunks_exact_mut(shape.n).enumerate() {
        let k_base = (m / m_group) * k_group;
        let w_row = &ops.weights[m * k_group..(m + 1) * k_group];
        out_row.fill(0.0);
        for (kk, &w) in w_row.iter().enumerate() {
            if skip_zeros && w == 0.0 {
                continue;
            }
            multiplications += shape.n as u64;
            for (n, slot) in out_row.iter_mut().enumerate() {
                *slot += w * activation(k_base + kk, n);
            }
        }
    }
    Ok(multiplications)
}

impl Simulator for ReferenceSimulator {
    fn simulate_dense_conv(
        &self,
        ops: &ConvOperands<'_>,
        output: &mut [f32],
        config: &AcceleratorConfig,
    ) -> Result<SimulationReport, SimulatorError> {
        let layer = ops.layer_name;
        let shape = ops.shape;
        shape.validate().map_err(|err| reject(layer, err.to_string()))?;
        let c_group = shape.channels_per_group();
        let k_group = shape.k / shape.g;

        check_len(layer, "input", ops.input.len(), element_count(&[shape.c, shape.x, shape.y]))?;
        check_len(
            layer,
            "weight",
            ops.weight.len(),
            element_count(&[shape.k, c_group, shape.r, shape.s]),
        )?;
        check_len(
            layer,
            "output",
            output.len(),
            element_count(&[shape.k, shape.h_out, shape.w_out]),
        )?;

        let lanes = match ops.tile {
            Some(tile) => {
                tile.validate().map_err(|err| reject(layer, err.to_string()))?;
                match tile.footprint() {
                    Some(footprint) if footprint <= config.ms_size() => footprint,
                    _ => {
                        return Err(reject(
                            layer,
                            format!(
                                "tile does not fit the {} multipliers of {}",
                                config.ms_size(),
                                config.name()
                            ),
                        ));
                    }
                }
            }
            None => config.ms_size(),
        };

        let dims = ImageDims {
            channels: shape.c,
            height: shape.x,
            width: shape.y,
        };
        let plane = shape.h_out * shape.w_out;
        for (m, out_plane) in output.chunks_exact_mut(plane).enumerate() {
            let group = m / k_group;
            for oh in 0..shape.h_out {
                for ow in 0..shape.w_out {
                    let mut acc = 0.0f32;
                    for cg in 0..c_group {
                        let channel = group * c_group + cg;
                        for kr in 0..shape.r {
                            let row = oh * shape.stride_x + kr * shape.dilation_x;
                            for ks in 0..shape.s {
                                let col = ow * shape.stride_y + ks * shape.dilation_y;
                                let w = ops.weight[((m * c_group + cg) * shape.r + kr) * shape.s + ks];
                                acc += w * sample_pixel(
                                    ops.input,
                                    dims,
                                    row,
                                    col,
                                    channel,
                                    shape.pad_x,
                                    shape.pad_y,
                                );
                            }
                        }
                    }
                    out_plane[oh * shape.w_out + ow] = acc;
                }
            }
        }

        let macs = shape.macs();
        let cycles = cycles_for(layer, macs, lanes)?;
        emit_stats(config, layer, "dense-conv", macs, cycles);
        Ok(SimulationReport {
            cycles: cycles as i64,
        })
    }

    fn simulate_dense_gemm(
        &self,
        ops: &GemmOperands<'_>,
        output: &mut [f32],
        config: &AcceleratorConfig,
    ) -> Result<SimulationReport, SimulatorError> {
        let macs = grouped_gemm(ops, output, false)?;
        let cycles = cycles_for(ops.layer_name, macs, config.ms_size())?;
        emit_stats(config, ops.layer_name, "dense-gemm", macs, cycles);
        Ok(SimulationReport {
            cycles: cycles as i64,
        })
    }

    fn simulate_sparse_gemm(
        &self,
        ops: &GemmOperands<'_>,
        output: &mut [f32],
        config: &AcceleratorConfig,
    ) -> Result<SimulationReport, SimulatorError> {
        let effectual = grouped_gemm(ops, output, true)?;
        let cycles = cycles_for(ops.layer_name, effectual, config.ms_size())?.max(1);
        emit_stats(config, ops.layer_name, "sparse-gemm", effectual, cycles);
        Ok(SimulationReport {
            cycles: cycles as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ReferenceSimulator;
    use crate::config::{AcceleratorConfig, Stationarity, TileConfig};
    use crate::runtime::simulator::Simulator;
    use crate::runtime::types::{ActivationLayout, ConvOperands, GemmOperands, SimulatorError};
    use crate::shapes::GemmShape;
    use crate::types::ConvShape;

    fn gemm_ops<'a>(weights: &'a [f32], activations: &'a [f32], layout: ActivationLayout) -> GemmOperands<'a> {
        GemmOperands {
            layer_name: "test",
            shape: GemmShape { m: 2, k: 3, n: 2 },
            groups: 1,
            weights,
            activations,
            layout,
            stationary: Stationarity::Filters,
            sparsity_ratio: 0,
        }
    }

    #[test]
    fn gemm_orientations_agree() {
        let weights = [1.0, 2.0, 3.0, 0.0, 1.0, 0.0];
        let kn = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let nk = [1.0, 3.0, 5.0, 2.0, 4.0, 6.0];
        let config = AcceleratorConfig::tpu();
        let sim = ReferenceSimulator::new();

        let mut out_kn = [0.0f32; 4];
        let mut out_nk = [0.0f32; 4];
        sim.simulate_dense_gemm(&gemm_ops(&weights, &kn, ActivationLayout::KN), &mut out_kn, &config)
            .expect("kn");
        sim.simulate_dense_gemm(&gemm_ops(&weights, &nk, ActivationLayout::NK), &mut out_nk, &config)
            .expect("nk");
        assert_eq!(out_kn, [22.0, 28.0, 3.0, 4.0]);
        assert_eq!(out_kn, out_nk);
    }

    #[test]
    fn sparse_gemm_counts_only_nonzero_weights() {
        let weights = [1.0, 0.0, 0.0, 0.0, 2.0, 0.0];
        let kn = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut config = AcceleratorConfig::sigma();
        config.set_print_stats(true);
        let mut out = [0.0f32; 4];
        let report = ReferenceSimulator
            .simulate_sparse_gemm(&gemm_ops(&weights, &kn, ActivationLayout::KN), &mut out, &config)
            .expect("sparse");
        assert_eq!(out, [1.0, 2.0, 6.0, 8.0]);
        assert_eq!(report.cycles, 1);
    }

    #[test]
    fn dense_conv_rejects_oversized_tile() {
        let shape = ConvShape::new((3, 3), 1, 1, (3, 3));
        let tile = TileConfig {
            t_r: 3,
            t_s: 3,
            t_c: 1,
            t_k: 1,
            t_g: 1,
            t_n: 1,
            t_x: 4,
            t_y: 4,
        };
        let ops = ConvOperands {
            layer_name: "conv",
            shape: &shape,
            input: &[0.0; 9],
            weight: &[0.0; 9],
            tile: Some(&tile),
        };
        let mut out = [0.0f32; 1];
        let err = ReferenceSimulator
            .simulate_dense_conv(&ops, &mut out, &AcceleratorConfig::maeri())
            .unwrap_err();
        assert!(matches!(err, SimulatorError::Rejected { .. }));
    }

    #[test]
    fn zero_lane_accelerator_is_rejected() {
        let config: AcceleratorConfig = toml::from_str("ms_size = 0\n").expect("config");
        let weights = [1.0; 6];
        let kn = [1.0; 6];
        let mut out = [0.0f32; 4];
        let err = ReferenceSimulator
            .simulate_dense_gemm(&gemm_ops(&weights, &kn, ActivationLayout::KN), &mut out, &config)
            .unwrap_err();
        assert!(matches!(err, SimulatorError::Rejected { .. }));

        let shape = ConvShape::new((1, 1), 1, 1, (1, 1));
        let ops = ConvOperands {
            layer_name: "conv",
            shape: &shape,
            input: &[1.0],
            weight: &[1.0],
            tile: None,
        };
        let mut single = [0.0f32];
        let err = ReferenceSimulator
            .simulate_dense_conv(&ops, &mut single, &config)
            .unwrap_err();
        assert!(matches!(err, SimulatorError::Rejected { .. }));
    }

    #[test]
    fn zero_extent_tile_is_rejected() {
        let shape = ConvShape::new((3, 3), 1, 1, (3, 3));
        let tile = TileConfig {
            t_r: 3,
            t_s: 3,
            t_c: 1,
            t_k: 0,
            t_g: 1,
            t_n: 1,
            t_x: 1,
            t_y: 1,
        };
        let ops = ConvOperands {
            layer_name: "conv",
            shape: &shape,
            input: &[1.0; 9],
            weight: &[1.0; 9],
            tile: Some(&tile),
        };
        let mut out = [0.0f32; 1];
        let err = ReferenceSimulator
            .simulate_dense_conv(&ops, &mut out, &AcceleratorConfig::maeri())
            .unwrap_err();
        assert!(matches!(err, SimulatorError::Rejected { .. }));
    }

    #[test]
    fn dense_conv_cycles_follow_tile_footprint() {
        let shape = ConvShape::new((3, 3), 1, 1, (3, 3));
        let tile = TileConfig {
            t_r: 3,
            t_s: 3,
            t_c: 1,
            t_k: 1,
            t_g: 1,
            t_n: 1,
            t_x: 1,
            t_y: 1,
        };
        let ops = ConvOperands {
            layer_name: "conv",
            shape: &shape,
            input: &[1.0; 9],
            weight: &[1.0; 9],
            tile: Some(&tile),
        };
        let mut out = [0.0f32; 1];
        let report = ReferenceSimulator
            .simulate_dense_conv(&ops, &mut out, &AcceleratorConfig::maeri())
            .expect("conv");
        assert_eq!(out, [9.0]);
        assert_eq!(report.cycles, 1);
    }
}
