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

//! Invocation entry points consumed by the tensor-compiler runtime.
//!
//! One call runs a single layer to completion: load the accelerator
//! descriptor, validate the shape and tensor views, select the execution
//! path, lower if needed, simulate, write the caller's output buffer and
//! report the cycle count. Nothing is shared between calls.

use std::path::{Path, PathBuf};

use crate::config::{AcceleratorConfig, ConfigError, TileConfig};
use crate::dispatch::{
    dispatch_conv, dispatch_linear, ConvInvocation, ExecutionPath, LinearInvocation,
    LoweringScratch,
};
use crate::exec::ExecError;
use crate::lower::LowerError;
use crate::metrics::{MetricsReporter, ReportSummary, TuningContext};
use crate::runtime::{Simulator, SimulatorError};
use crate::shapes::ShapeMismatch;
use crate::types::{ConvShape, LinearShape, TensorView, TensorViewMut};

/// Highest accepted sparsity percentage.
pub const MAX_SPARSITY_RATIO: u32 = 100;

/// Every input of a convolution invocation except the tensors.
#[derive(Debug, Clone)]
pub struct Conv2dRequest {
    /// Accelerator topology file; `None` or empty selects the default.
    pub arch_path: Option<PathBuf>,
    pub shape: ConvShape,
    /// Tiling hints, consulted by the native dense path only.
    pub tile_path: Option<PathBuf>,
    /// Percentage of pruned weights, `0..=100`.
    pub sparsity_ratio: u32,
    pub tuning: TuningContext,
    pub print_stats: bool,
}

impl Conv2dRequest {
    pub fn new(shape: ConvShape) -> Self {
        Self {
            arch_path: None,
            shape,
            tile_path: None,
            sparsity_ratio: 0,
            tuning: TuningContext::default(),
            print_stats: false,
        }
    }

    pub fn with_arch(mut self, path: impl Into<PathBuf>) -> Self {
        self.arch_path = Some(path.into());
        self
    }

    pub fn with_tile(mut self, path: impl Into<PathBuf>) -> Self {
        self.tile_path = Some(path.into());
        self
    }

    pub fn with_sparsity_ratio(mut self, ratio: u32) -> Self {
        self.sparsity_ratio = ratio;
        self
    }

    pub fn with_tuning(mut self, tuning: TuningContext) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_print_stats(mut self, enabled: bool) -> Self {
        self.print_stats = enabled;
        self
    }
}

/// Every input of a fully-connected invocation except the tensors.
#[derive(Debug, Clone)]
pub struct LinearRequest {
    pub arch_path: Option<PathBuf>,
    pub shape: LinearShape,
    pub sparsity_ratio: u32,
    pub tuning: TuningContext,
    pub print_stats: bool,
}

impl LinearRequest {
    pub fn new(shape: LinearShape) -> Self {
        Self {
            arch_path: None,
            shape,
            sparsity_ratio: 0,
            tuning: TuningContext::default(),
            print_stats: false,
        }
    }

    pub fn with_arch(mut self, path: impl Into<PathBuf>) -> Self {
        self.arch_path = Some(path.into());
        self
    }

    pub fn with_sparsity_ratio(mut self, ratio: u32) -> Self {
        self.sparsity_ratio = ratio;
        self
    }

    pub fn with_tuning(mut self, tuning: TuningContext) -> Self {
        self.tuning = tuning;
        self
    }
}

/// Outcome of one simulated layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub cycle_count: u64,
    pub layer_name: String,
    pub path: ExecutionPath,
    pub report: ReportSummary,
}

/// Errors that fail an invocation. Reporting failures are not among them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(#[from] ShapeMismatch),
    #[error("simulator error: {0}")]
    Simulator(#[from] SimulatorError),
}

impl From<LowerError> for ForwardError {
    fn from(err: LowerError) -> Self {
        match err {
            LowerError::Config(err) => ForwardError::Configuration(err),
            LowerError::Shape(err) => ForwardError::ShapeMismatch(err),
        }
    }
}

impl From<ExecError> for ForwardError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Shape(err) => ForwardError::ShapeMismatch(err),
            ExecError::Simulator(err) => ForwardError::Simulator(err),
        }
    }
}

fn load_accelerator(path: Option<&Path>, print_stats: bool) -> Result<AcceleratorConfig, ConfigError> {
    let mut config = AcceleratorConfig::from_arch_path(path)?;
    config.set_print_stats(print_stats);
    Ok(config)
}

fn check_sparsity(ratio: u32) -> Result<(), ConfigError> {
    if ratio > MAX_SPARSITY_RATIO {
        return Err(ConfigError::SparsityRatio(ratio));
    }
    Ok(())
}

fn load_tile(path: Option<&Path>) -> Result<Option<TileConfig>, ConfigError> {
    match path {
        Some(p) if !p.as_os_str().is_empty() => TileConfig::load(p).map(Some),
        _ => Ok(None),
    }
}

/// Simulate one 2-D convolution and write its result into `output`.
pub fn conv2d_forward(
    request: &Conv2dRequest,
    input: TensorView<'_>,
    weight: TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    simulator: &dyn Simulator,
    reporter: &MetricsReporter,
) -> Result<ExecutionResult, ForwardError> {
    let mut scratch = LoweringScratch::new();
    conv2d_forward_with_scratch(request, input, weight, output, simulator, reporter, &mut scratch)
}

/// [`conv2d_forward`] reusing caller-owned lowering buffers.
pub fn conv2d_forward_with_scratch(
    request: &Conv2dRequest,
    input: TensorView<'_>,
    weight: TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    simulator: &dyn Simulator,
    reporter: &MetricsReporter,
    scratch: &mut LoweringScratch,
) -> Result<ExecutionResult, ForwardError> {
    let config = load_accelerator(request.arch_path.as_deref(), request.print_stats)?;
    check_sparsity(request.sparsity_ratio)?;

    let shape = &request.shape;
    shape.validate()?;
    input.expect_shape(&shape.input_shape(), "input")?;
    weight.expect_shape(&shape.weight_shape(), "weight")?;
    output.expect_shape(&shape.output_shape(), "output")?;

    let path = ExecutionPath::select(&config);
    let tile = if path == ExecutionPath::NativeDense {
        load_tile(request.tile_path.as_deref())?
    } else {
        None
    };

    let invocation = ConvInvocation {
        shape,
        input: input.data(),
        weight: weight.data(),
        tile: tile.as_ref(),
        sparsity_ratio: request.sparsity_ratio,
    };
    let cycle_count = dispatch_conv(path, &invocation, output.data_mut(), &config, simulator, scratch)?;

    let layer_name = path.layer_tag(&config);
    let report = reporter.report(&layer_name, cycle_count, &request.tuning);
    Ok(ExecutionResult {
        cycle_count,
        layer_name,
        path,
        report,
    })
}

/// Simulate one fully-connected layer: `output[1, out] = input[1, in] x weight[out, in]^T`.
pub fn linear_forward(
    request: &LinearRequest,
    input: TensorView<'_>,
    weight: TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    simulator: &dyn Simulator,
    reporter: &MetricsReporter,
) -> Result<ExecutionResult, ForwardError> {
    let config = load_accelerator(request.arch_path.as_deref(), request.print_stats)?;
    check_sparsity(request.sparsity_ratio)?;

    let shape = &request.shape;
    shape.validate()?;
    input.expect_shape(&[1, shape.in_features], "input")?;
    weight.expect_shape(&[shape.out_features, shape.in_features], "weight")?;
    output.expect_shape(&[1, shape.out_features], "output")?;

    let path = ExecutionPath::select_for_linear(&config);
    let invocation = LinearInvocation {
        shape,
        input: input.data(),
        weight: weight.data(),
        sparsity_ratio: request.sparsity_ratio,
    };
    let cycle_count = dispatch_linear(path, &invocation, output.data_mut(), &config, simulator)?;

    let layer_name = path.linear_layer_tag().to_string();
    let report = reporter.report(&layer_name, cycle_count, &request.tuning);
    Ok(ExecutionResult {
        cycle_count,
        layer_name,
        path,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ReportingConfig;
    use crate::runtime::{ReferenceSimulator, UnavailableSimulator};

    fn reporter(dir: &tempfile::TempDir) -> MetricsReporter {
        MetricsReporter::new(ReportingConfig::new(dir.path().join("cycles.json")))
    }

    #[test]
    fn sparsity_ratio_is_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shape = ConvShape::new((1, 1), 1, 1, (1, 1));
        let request = Conv2dRequest::new(shape).with_sparsity_ratio(101);
        let mut out = [7.0f32];
        let out_shape = [1, 1, 1, 1];
        let mut output = TensorViewMut::new(&mut out, &out_shape).expect("view");
        let err = conv2d_forward(
            &request,
            TensorView::new(&[1.0], &out_shape).expect("input"),
            TensorView::new(&[1.0], &out_shape).expect("weight"),
            &mut output,
            &ReferenceSimulator,
            &reporter(&dir),
        )
        .unwrap_err();
        assert_eq!(err, ForwardError::Configuration(ConfigError::SparsityRatio(101)));
        assert_eq!(out, [7.0]);
    }

    #[test]
    fn output_view_checked_before_dispatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shape = ConvShape::new((3, 3), 1, 1, (3, 3));
        let request = Conv2dRequest::new(shape);
        let input = [1.0f32; 9];
        let weight = [1.0f32; 9];
        let mut out = [0.0f32; 4];
        let wrong = [1, 1, 2, 2];
        let mut output = TensorViewMut::new(&mut out, &wrong).expect("view");
        let err = conv2d_forward(
            &request,
            TensorView::new(&input, &[1, 1, 3, 3]).expect("input"),
            TensorView::new(&weight, &[1, 1, 3, 3]).expect("weight"),
            &mut output,
            &ReferenceSimulator,
            &reporter(&dir),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ForwardError::ShapeMismatch(ShapeMismatch::Shape { role: "output", .. })
        ));
        assert!(!dir.path().join("cycles.json").exists());
    }

    #[test]
    fn simulator_failure_skips_reporting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let request = Conv2dRequest::new(ConvShape::new((1, 1), 1, 1, (2, 2)));
        let data = [1.0f32; 4];
        let mut out = [0.0f32; 4];
        let shape = [1, 1, 2, 2];
        let mut output = TensorViewMut::new(&mut out, &shape).expect("view");
        let err = conv2d_forward(
            &request,
            TensorView::new(&data, &shape).expect("input"),
            TensorView::new(&[2.0], &[1, 1, 1, 1]).expect("weight"),
            &mut output,
            &UnavailableSimulator,
            &reporter(&dir),
        )
        .unwrap_err();
        assert!(matches!(err, ForwardError::Simulator(SimulatorError::Unavailable(_))));
        assert!(!dir.path().join("cycles.json").exists());
    }

    /// Delegates to the reference model and remembers the statistics flag it saw.
    #[derive(Default)]
    struct StatsSpy(std::sync::Mutex<Vec<bool>>);

    impl StatsSpy {
        fn seen(&self) -> Vec<bool> {
            self.0.lock().expect("spy lock").clone()
        }
    }

    impl Simulator for StatsSpy {
        fn simulate_dense_conv(
            &self,
            operands: &crate::runtime::ConvOperands<'_>,
            output: &mut [f32],
            config: &AcceleratorConfig,
        ) -> Result<crate::runtime::SimulationReport, SimulatorError> {
            self.0.lock().expect("spy lock").push(config.print_stats());
            ReferenceSimulator.simulate_dense_conv(operands, output, config)
        }

        fn simulate_dense_gemm(
            &self,
            operands: &crate::runtime::GemmOperands<'_>,
            output: &mut [f32],
            config: &AcceleratorConfig,
        ) -> Result<crate::runtime::SimulationReport, SimulatorError> {
            self.0.lock().expect("spy lock").push(config.print_stats());
            ReferenceSimulator.simulate_dense_gemm(operands, output, config)
        }

        fn simulate_sparse_gemm(
            &self,
            operands: &crate::runtime::GemmOperands<'_>,
            output: &mut [f32],
            config: &AcceleratorConfig,
        ) -> Result<crate::runtime::SimulationReport, SimulatorError> {
            self.0.lock().expect("spy lock").push(config.print_stats());
            ReferenceSimulator.simulate_sparse_gemm(operands, output, config)
        }
    }

    #[test]
    fn request_stats_flag_overrides_topology_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let arch = dir.path().join("arch.toml");
        std::fs::write(&arch, "print_stats = true\n").expect("write arch");
        let spy = StatsSpy::default();
        let shape = [1, 1, 2, 2];
        let data = [1.0f32; 4];

        for requested in [false, true] {
            let request = Conv2dRequest::new(ConvShape::new((1, 1), 1, 1, (2, 2)))
                .with_arch(&arch)
                .with_print_stats(requested);
            let mut out = [0.0f32; 4];
            let mut output = TensorViewMut::new(&mut out, &shape).expect("view");
            conv2d_forward(
                &request,
                TensorView::new(&data, &shape).expect("input"),
                TensorView::new(&[1.0], &[1, 1, 1, 1]).expect("weight"),
                &mut output,
                &spy,
                &reporter(&dir),
            )
            .expect("forward");
        }
        assert_eq!(spy.seen(), vec![false, true]);
    }

    #[test]
    fn linear_runs_dense_gemm_on_default_accelerator() {
        let dir = tempfile::tempdir().expect("tempdir");
        let request = LinearRequest::new(LinearShape::new(3, 2))
            .with_tuning(TuningContext::inactive("fc"));
        let input = [1.0f32, 2.0, 3.0];
        let weight = [1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut out = [0.0f32; 2];
        let out_shape = [1, 2];
        let mut output = TensorViewMut::new(&mut out, &out_shape).expect("view");
        let result = linear_forward(
            &request,
            TensorView::new(&input, &[1, 3]).expect("input"),
            TensorView::new(&weight, &[2, 3]).expect("weight"),
            &mut output,
            &ReferenceSimulator,
            &reporter(&dir),
        )
        .expect("linear");
        assert_eq!(result.layer_name, "FCLayerDense");
        assert_eq!(result.path, ExecutionPath::GemmEmulation);
        assert_eq!(out, [1.0, 6.0]);
    }
}
