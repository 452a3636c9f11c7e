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

//! Command-line driver: run single layers through the reference simulator
//! and inspect path selection.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use stonne_bridge::metrics::{MetricsReporter, ReportingConfig, TuningContext};
use stonne_bridge::pipeline::{conv2d_forward, linear_forward, Conv2dRequest, LinearRequest};
use stonne_bridge::telemetry::init_tracing;
use stonne_bridge::types::element_count;
use stonne_bridge::{
    AcceleratorConfig, ConvShape, ExecutionPath, ExecutionResult, LinearShape, ReferenceSimulator,
    TensorView, TensorViewMut,
};

#[derive(Parser, Debug)]
#[command(author, version, about = None, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate one 2-D convolution on synthetic tensors.
    Conv2d(Conv2dArgs),
    /// Simulate one fully-connected layer on synthetic tensors.
    Linear(LinearArgs),
    /// Print the execution path an accelerator selects.
    Path {
        /// Accelerator topology file.
        #[arg(long, value_name = "FILE", conflicts_with = "preset")]
        arch: Option<PathBuf>,
        /// Built-in accelerator.
        #[arg(long, value_enum)]
        preset: Option<Preset>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    Maeri,
    Sigma,
    Tpu,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Fill {
    /// Every element is 1.
    #[default]
    Ones,
    /// Element `i` is `i mod 7`.
    Ramp,
}

impl Fill {
    fn tensor(self, len: usize) -> Vec<f32> {
        match self {
            Fill::Ones => vec![1.0; len],
            Fill::Ramp => (0..len).map(|i| (i % 7) as f32).collect(),
        }
    }
}

#[derive(Args, Debug)]
struct Reporting {
    /// Accelerator topology file (default architecture when omitted).
    #[arg(long, value_name = "FILE")]
    arch: Option<PathBuf>,
    /// Percentage of pruned weights (0-100).
    #[arg(long, default_value_t = 0)]
    sparsity: u32,
    /// Record the cost in the tuning log as well.
    #[arg(long)]
    tuning: bool,
    /// Run name used as the metrics and cost key.
    #[arg(long, value_name = "NAME", default_value = "stonne-bridge")]
    run_name: String,
    /// Tuning cost log (JSON lines).
    #[arg(long, value_name = "FILE", requires = "tuning")]
    costs: Option<PathBuf>,
    /// Metrics artifact; defaults to $STONNE_BRIDGE_METRICS or the temp dir.
    #[arg(long, value_name = "FILE")]
    metrics: Option<PathBuf>,
    /// Emit per-layer simulator statistics.
    #[arg(long)]
    print_stats: bool,
    /// Synthetic tensor contents.
    #[arg(long, value_enum, default_value_t = Fill::Ones)]
    fill: Fill,
    /// Print every output element.
    #[arg(long)]
    dump: bool,
}

impl Reporting {
    fn tuning_context(&self) -> TuningContext {
        if self.tuning {
            TuningContext::tuning(&self.run_name, self.costs.clone().unwrap_or_default())
        } else {
            TuningContext::inactive(&self.run_name)
        }
    }

    fn reporter(&self) -> MetricsReporter {
        match &self.metrics {
            Some(path) => MetricsReporter::new(ReportingConfig::new(path)),
            None => MetricsReporter::from_env(),
        }
    }
}

#[derive(Args, Debug)]
struct Conv2dArgs {
    /// Kernel rows.
    #[arg(long, short = 'r')]
    r: usize,
    /// Kernel columns.
    #[arg(long, short = 's')]
    s: usize,
    /// Input channels.
    #[arg(long, short = 'c')]
    c: usize,
    /// Output channels.
    #[arg(long, short = 'k')]
    k: usize,
    /// Groups.
    #[arg(long, short = 'g', default_value_t = 1)]
    g: usize,
    /// Input rows.
    #[arg(long, short = 'x')]
    x: usize,
    /// Input columns.
    #[arg(long, short = 'y')]
    y: usize,
    #[arg(long, default_value_t = 1)]
    stride_x: usize,
    #[arg(long, default_value_t = 1)]
    stride_y: usize,
    #[arg(long, default_value_t = 0)]
    pad_x: usize,
    #[arg(long, default_value_t = 0)]
    pad_y: usize,
    #[arg(long, default_value_t = 1)]
    dilation_x: usize,
    #[arg(long, default_value_t = 1)]
    dilation_y: usize,
    /// Tiling hints for the native dense path.
    #[arg(long, value_name = "FILE")]
    tile: Option<PathBuf>,
    #[command(flatten)]
    reporting: Reporting,
}

#[derive(Args, Debug)]
struct LinearArgs {
    #[arg(long)]
    in_features: usize,
    #[arg(long)]
    out_features: usize,
    #[command(flatten)]
    reporting: Reporting,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // A subscriber installed by an embedding process wins.
    let _ = init_tracing();

    match cli.command {
        Command::Conv2d(args) => run_conv2d(&args),
        Command::Linear(args) => run_linear(&args),
        Command::Path { arch, preset } => run_path(arch, preset),
    }
}

fn run_conv2d(args: &Conv2dArgs) -> anyhow::Result<()> {
    let shape = ConvShape::new((args.r, args.s), args.c, args.k, (args.x, args.y))
        .with_stride(args.stride_x, args.stride_y)
        .with_padding(args.pad_x, args.pad_y)
        .with_dilation(args.dilation_x, args.dilation_y)
        .with_groups(args.g);
    shape.validate().context("invalid convolution shape")?;

    let reporting = &args.reporting;
    let mut request = Conv2dRequest::new(shape)
        .with_sparsity_ratio(reporting.sparsity)
        .with_tuning(reporting.tuning_context())
        .with_print_stats(reporting.print_stats);
    request.arch_path = reporting.arch.clone();
    request.tile_path = args.tile.clone();

    let (in_shape, w_shape, out_shape) =
        (shape.input_shape(), shape.weight_shape(), shape.output_shape());
    let input = reporting.fill.tensor(element_count(&in_shape));
    let weight = reporting.fill.tensor(element_count(&w_shape));
    let mut output = vec![0.0f32; element_count(&out_shape)];

    let result = {
        let mut out_view = TensorViewMut::new(&mut output, &out_shape)?;
        conv2d_forward(
            &request,
            TensorView::new(&input, &in_shape)?,
            TensorView::new(&weight, &w_shape)?,
            &mut out_view,
            &ReferenceSimulator,
            &reporting.reporter(),
        )
        .context("convolution failed")?
    };

    print_result(&result, &output, shape.w_out, reporting.dump);
    Ok(())
}

fn run_linear(args: &LinearArgs) -> anyhow::Result<()> {
    let shape = LinearShape::new(args.in_features, args.out_features);
    shape.validate().context("invalid linear shape")?;
    let reporting = &args.reporting;
    let mut request = LinearRequest::new(shape)
        .with_sparsity_ratio(reporting.sparsity)
        .with_tuning(reporting.tuning_context());
    request.arch_path = reporting.arch.clone();
    request.print_stats = reporting.print_stats;

    let in_shape = [1, shape.in_features];
    let w_shape = [shape.out_features, shape.in_features];
    let out_shape = [1, shape.out_features];
    let input = reporting.fill.tensor(shape.in_features);
    let weight = reporting.fill.tensor(element_count(&w_shape));
    let mut output = vec![0.0f32; shape.out_features];

    let result = {
        let mut out_view = TensorViewMut::new(&mut output, &out_shape)?;
        linear_forward(
            &request,
            TensorView::new(&input, &in_shape)?,
            TensorView::new(&weight, &w_shape)?,
            &mut out_view,
            &ReferenceSimulator,
            &reporting.reporter(),
        )
        .context("linear layer failed")?
    };

    print_result(&result, &output, shape.out_features, reporting.dump);
    Ok(())
}

fn run_path(arch: Option<PathBuf>, preset: Option<Preset>) -> anyhow::Result<()> {
    let config = match (arch, preset) {
        (Some(path), _) => AcceleratorConfig::load(&path)?,
        (None, Some(Preset::Maeri)) | (None, None) => AcceleratorConfig::maeri(),
        (None, Some(Preset::Sigma)) => AcceleratorConfig::sigma(),
        (None, Some(Preset::Tpu)) => AcceleratorConfig::tpu(),
    };
    let path = ExecutionPath::select(&config);
    println!("accelerator: {}", config.name());
    println!("path: {path}");
    println!("layer: {}", path.layer_tag(&config));
    Ok(())
}

fn print_result(result: &ExecutionResult, output: &[f32], row_len: usize, dump: bool) {
    let checksum: f64 = output.iter().map(|&v| f64::from(v)).sum();
    println!("layer: {}", result.layer_name);
    println!("path: {}", result.path);
    println!("cycles: {}", result.cycle_count);
    println!("checksum: {checksum:.6}");
    if !result.report.metrics.is_recorded() {
        eprintln!("warning: cycle count was not recorded in the metrics artifact");
    }
    if dump {
        for row in output.chunks(row_len.max(1)) {
            let cells: Vec<String> = row.iter().map(|v| format!("{v}")).collect();
            println!("{}", cells.join(" "));
        }
    }
}

