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

//! Convolution-to-GEMM lowering.
//!
//! Accelerators that cannot execute convolutions natively receive the input
//! re-expressed as a patch matrix. The pixel sampler in [`pixel`] is the only
//! place padding semantics are defined; [`im2col`] builds the `[K, N]`
//! activation matrix from it and [`im2col::transpose`] provides the `[N, K]`
//! orientation.

pub mod im2col;
pub mod pixel;

pub use im2col::{im2col, im2col_into, transpose, transpose_into, Im2colParams, Lowered};
pub use pixel::{sample_pixel, ImageDims};

use crate::config::ConfigError;
use crate::shapes::ShapeMismatch;

/// Failure while lowering an operand.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
}
