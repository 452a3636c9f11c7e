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

//! Operand shape bookkeeping shared by lowering, adapters and views.

pub mod engine;

pub use engine::{derive_gemm_shape, GemmShape};

/// A buffer or shape disagrees with what the operation requires.
///
/// Always detected before any write; buffers are never truncated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeMismatch {
    /// Element count does not match the product of the extents.
    #[error("{role} buffer holds {actual} elements but shape {shape:?} needs {expected}")]
    Buffer {
        role: &'static str,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    /// A tensor has different extents than the convolution implies.
    #[error("{role} has shape {actual:?}, expected {expected:?}")]
    Shape {
        role: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// A flat operand has the wrong length for its GEMM role.
    #[error("{role} operand holds {actual} elements, GEMM shape requires {expected}")]
    Operand {
        role: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The lowering produced a different output extent than configured.
    #[error("lowered output {lowered_h}x{lowered_w} disagrees with configured {out_h}x{out_w}")]
    OutputExtent {
        lowered_h: usize,
        lowered_w: usize,
        out_h: usize,
        out_w: usize,
    },
}
