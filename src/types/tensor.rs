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

//! Non-owning views over externally allocated `f32` tensors.
//!
//! A view is validated once when it is built (element count against shape)
//! and is then passed by reference. Views never copy or reallocate storage.

use super::element_count;
use crate::shapes::ShapeMismatch;

/// Read-only tensor view (input and weight operands).
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    data: &'a [f32],
    shape: &'a [usize],
}

impl<'a> TensorView<'a> {
    pub fn new(data: &'a [f32], shape: &'a [usize]) -> Result<Self, ShapeMismatch> {
        let expected = element_count(shape);
        if data.len() != expected {
            return Err(ShapeMismatch::Buffer {
                role: "tensor",
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, shape })
    }

    pub fn data(&self) -> &'a [f32] {
        self.data
    }

    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check that the view has exactly the extents `expected`.
    pub fn expect_shape(&self, expected: &[usize], role: &'static str) -> Result<(), ShapeMismatch> {
        check_shape(self.shape, expected, role)
    }
}

/// Mutable tensor view (output operand, written in place).
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    data: &'a mut [f32],
    shape: &'a [usize],
}

impl<'a> TensorViewMut<'a> {
    pub fn new(data: &'a mut [f32], shape: &'a [usize]) -> Result<Self, ShapeMismatch> {
        let expected = element_count(shape);
        if data.len() != expected {
            return Err(ShapeMismatch::Buffer {
                role: "output",
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, shape })
    }

    pub fn data(&self) -> &[f32] {
        &*self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut *self.data
    }

    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn expect_shape(&self, expected: &[usize], role: &'static str) -> Result<(), ShapeMismatch> {
        check_shape(self.shape, expected, role)
    }
}

fn check_shape(actual: &[usize], expected: &[usize], role: &'static str) -> Result<(), ShapeMismatch> {
    if actual != expected {
        return Err(ShapeMismatch::Shape {
            role,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}
