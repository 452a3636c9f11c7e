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

//! Execution adapters: the seam where the simulator is invoked.
//!
//! | Adapter           | Entry point                      | Activations |
//! |-------------------|----------------------------------|-------------|
//! | `run_dense_conv`  | `Simulator::simulate_dense_conv` | NCHW        |
//! | `run_dense_gemm`  | `Simulator::simulate_dense_gemm` | `[N, K]`    |
//! | `run_sparse_gemm` | `Simulator::simulate_sparse_gemm`| `[K, N]`    |
//!
//! Adapters own no state. They check every operand length against the shape
//! before the call, so a simulator never sees a buffer it could overrun, and
//! they validate the returned cycle count.

pub mod conv;
pub mod gemm;

pub use conv::run_dense_conv;
pub use gemm::{run_dense_gemm, run_sparse_gemm};

use crate::runtime::{SimulationReport, SimulatorError};
use crate::shapes::ShapeMismatch;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
    #[error(transparent)]
    Simulator(#[from] SimulatorError),
}

fn cycles_from_report(layer: &str, report: SimulationReport) -> Result<u64, SimulatorError> {
    u64::try_from(report.cycles).map_err(|_| SimulatorError::InvalidCycleCount {
        layer: layer.to_string(),
        cycles: report.cycles,
    })
}

fn expect_len(role: &'static str, actual: usize, expected: usize) -> Result<(), ShapeMismatch> {
    if actual != expected {
        return Err(ShapeMismatch::Operand {
            role,
            expected,
            actual,
        });
    }
    Ok(())
}
