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

//! Convolution shape descriptors in the simulator's variable taxonomy.
//!
//! # Example
//! ```
//! use stonne_bridge::types::ConvShape;
//! let shape = ConvShape::new((3, 3), 1, 1, (5, 5)).with_padding(1, 1);
//! assert_eq!((shape.h_out, shape.w_out), (5, 5));
//! assert!(shape.validate().is_ok());
//! ```

pub mod tensor;

pub use tensor::{TensorView, TensorViewMut};

use crate::config::ConfigError;

/// Product of `extents`, saturating at `usize::MAX`.
///
/// No `f32` buffer can hold `usize::MAX` elements, so a saturated count never
/// matches a real buffer length.
pub fn element_count(extents: &[usize]) -> usize {
    extents
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .unwrap_or(usize::MAX)
}

/// Output extent of a single convolution axis.
///
/// Computes `floor((input + 2*pad - (dilation*(kernel-1)+1)) / stride) + 1`.
/// Returns `None` when the dilated kernel does not fit inside the padded input,
/// when any of `kernel`, `dilation`, `stride` is zero, or when the padded or
/// dilated extent overflows.
pub fn conv_output_dim(
    input: usize,
    pad: usize,
    kernel: usize,
    dilation: usize,
    stride: usize,
) -> Option<usize> {
    if kernel == 0 || dilation == 0 || stride == 0 {
        return None;
    }
    let padded = pad.checked_mul(2)?.checked_add(input)?;
    let effective = dilation.checked_mul(kernel - 1)?.checked_add(1)?;
    if padded < effective {
        return None;
    }
    Some((padded - effective) / stride + 1)
}

/// `dilation*(kernel-1)+1`, saturating; used in error reports only.
pub(crate) fn effective_extent(kernel: usize, dilation: usize) -> usize {
    dilation
        .saturating_mul(kernel.saturating_sub(1))
        .saturating_add(1)
}

/// `input+2*pad`, saturating; used in error reports only.
pub(crate) fn padded_extent(input: usize, pad: usize) -> usize {
    pad.saturating_mul(2).saturating_add(input)
}

/// Shape parameters of one 2-D convolution.
///
/// Field names follow the simulator taxonomy:
/// - `r`, `s`: filter rows and columns
/// - `c`: filter and input channels
/// - `k`: filters, i.e. output channels
/// - `g`: groups
/// - `n`: inputs (only 1 is supported)
/// - `x`, `y`: input rows and columns
/// - `h_out`, `w_out`: output rows and columns
///
/// The `*_x` parameters apply to the row axis (paired with `r`), the `*_y`
/// parameters to the column axis (paired with `s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvShape {
    pub r: usize,
    pub s: usize,
    pub c: usize,
    pub k: usize,
    pub g: usize,
    pub n: usize,
    pub x: usize,
    pub y: usize,
    pub h_out: usize,
    pub w_out: usize,
    pub stride_x: usize,
    pub stride_y: usize,
    pub pad_x: usize,
    pub pad_y: usize,
    pub dilation_x: usize,
    pub dilation_y: usize,
}

impl ConvShape {
    /// Ungrouped, unpadded, unit-stride convolution of a single input.
    ///
    /// `h_out`/`w_out` are derived from the other fields; a kernel that does
    /// not fit leaves them at zero so that [`ConvShape::validate`] rejects it.
    pub fn new(kernel: (usize, usize), c: usize, k: usize, input: (usize, usize)) -> Self {
        let mut shape = ConvShape {
            r: kernel.0,
            s: kernel.1,
            c,
            k,
            g: 1,
            n: 1,
            x: input.0,
            y: input.1,
            h_out: 0,
            w_out: 0,
            stride_x: 1,
            stride_y: 1,
            pad_x: 0,
            pad_y: 0,
            dilation_x: 1,
            dilation_y: 1,
        };
        shape.refresh_output_dims();
        shape
    }

    pub fn with_stride(mut self, stride_x: usize, stride_y: usize) -> Self {
        self.stride_x = stride_x;
        self.stride_y = stride_y;
        self.refresh_output_dims();
        self
    }

    pub fn with_padding(mut self, pad_x: usize, pad_y: usize) -> Self {
        self.pad_x = pad_x;
        self.pad_y = pad_y;
        self.refresh_output_dims();
        self
    }

    pub fn with_dilation(mut self, dilation_x: usize, dilation_y: usize) -> Self {
        self.dilation_x = dilation_x;
        self.dilation_y = dilation_y;
        self.refresh_output_dims();
        self
    }

    pub fn with_groups(mut self, g: usize) -> Self {
        self.g = g;
        self
    }

    fn refresh_output_dims(&mut self) {
        self.h_out = conv_output_dim(self.x, self.pad_x, self.r, self.dilation_x, self.stride_x)
            .unwrap_or(0);
        self.w_out = conv_output_dim(self.y, self.pad_y, self.s, self.dilation_y, self.stride_y)
            .unwrap_or(0);
    }

    /// Derive a shape from NCHW data and OIHW kernel extents.
    ///
    /// The kernel's second extent is the per-group channel count `C / G`.
    pub fn from_nchw(
        data: [usize; 4],
        kernel: [usize; 4],
        strides: (usize, usize),
        padding: (usize, usize),
        dilation: (usize, usize),
        groups: usize,
    ) -> Result<Self, ConfigError> {
        let [n, c, h, w] = data;
        let [k, c_per_group, r, s] = kernel;

        if n > 1 {
            return Err(ConfigError::Batch(n));
        }
        if dilation.0 < 1 || dilation.1 < 1 {
            return Err(ConfigError::InvalidShape(
                "dilation should be a positive value".into(),
            ));
        }
        if groups == 0 || c_per_group * groups != c {
            return Err(ConfigError::InvalidShape(format!(
                "kernel expects {c_per_group} channels per group for {groups} groups, input has {c}"
            )));
        }

        let shape = ConvShape::new((r, s), c, k, (h, w))
            .with_stride(strides.0, strides.1)
            .with_padding(padding.0, padding.1)
            .with_dilation(dilation.0, dilation.1)
            .with_groups(groups);
        shape.validate()?;
        Ok(shape)
    }

    /// Output extents implied by the shape parameters (not the stored ones).
    pub fn expected_output_dims(&self) -> Result<(usize, usize), ConfigError> {
        let h = conv_output_dim(self.x, self.pad_x, self.r, self.dilation_x, self.stride_x)
            .ok_or(ConfigError::EmptyOutput {
                axis: "row",
                effective: effective_extent(self.r, self.dilation_x),
                padded: padded_extent(self.x, self.pad_x),
            })?;
        let w = conv_output_dim(self.y, self.pad_y, self.s, self.dilation_y, self.stride_y)
            .ok_or(ConfigError::EmptyOutput {
                axis: "column",
                effective: effective_extent(self.s, self.dilation_y),
                padded: padded_extent(self.y, self.pad_y),
            })?;
        Ok((h, w))
    }

    /// Check every shape invariant before any tensor buffer is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dims = [
            ("R", self.r),
            ("S", self.s),
            ("C", self.c),
            ("K", self.k),
            ("G", self.g),
            ("X", self.x),
            ("Y", self.y),
            ("stride_x", self.stride_x),
            ("stride_y", self.stride_y),
            ("dilation_x", self.dilation_x),
            ("dilation_y", self.dilation_y),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::InvalidShape(format!("{name} must be positive")));
        }
        if self.n != 1 {
            return Err(ConfigError::Batch(self.n));
        }
        if self.c % self.g != 0 {
            return Err(ConfigError::GroupMismatch {
                groups: self.g,
                what: "input channels",
                value: self.c,
            });
        }
        if self.k % self.g != 0 {
            return Err(ConfigError::GroupMismatch {
                groups: self.g,
                what: "output channels",
                value: self.k,
            });
        }

        let (h, w) = self.expected_output_dims()?;
        if h != self.h_out {
            return Err(ConfigError::OutputExtent {
                axis: "row",
                supplied: self.h_out,
                computed: h,
            });
        }
        if w != self.w_out {
            return Err(ConfigError::OutputExtent {
                axis: "column",
                supplied: self.w_out,
                computed: w,
            });
        }

        let extents = [
            ("input", vec![self.c, self.x, self.y]),
            ("weight", vec![self.k, self.channels_per_group(), self.r, self.s]),
            ("output", vec![self.k, self.h_out, self.w_out]),
            ("lowered activation", vec![self.r, self.s, self.c, self.h_out, self.w_out]),
            (
                "multiply-accumulate",
                vec![self.k, self.h_out, self.w_out, self.r, self.s, self.channels_per_group()],
            ),
        ];
        for (what, dims) in &extents {
            if element_count(dims) == usize::MAX {
                return Err(ConfigError::InvalidShape(format!("{what} element count overflows")));
            }
        }
        Ok(())
    }

    /// Input channels seen by each group.
    pub fn channels_per_group(&self) -> usize {
        self.c / self.g.max(1)
    }

    /// NCHW input extents.
    pub fn input_shape(&self) -> Vec<usize> {
        vec![self.n, self.c, self.x, self.y]
    }

    /// OIHW weight extents; the channel extent is per group.
    pub fn weight_shape(&self) -> Vec<usize> {
        vec![self.k, self.channels_per_group(), self.r, self.s]
    }

    /// NCHW output extents.
    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.n, self.k, self.h_out, self.w_out]
    }

    /// Multiply-accumulate operations of the whole layer.
    pub fn macs(&self) -> u64 {
        [
            self.k,
            self.h_out,
            self.w_out,
            self.r,
            self.s,
            self.channels_per_group(),
        ]
        .iter()
        .try_fold(1u64, |acc, &d| acc.checked_mul(d as u64))
        .unwrap_or(u64::MAX)
    }
}

/// Fully-connected layer extents (`[1, in] x [out, in]^T`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearShape {
    pub in_features: usize,
    pub out_features: usize,
}

impl LinearShape {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self {
            in_features,
            out_features,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.in_features == 0 || self.out_features == 0 {
            return Err(ConfigError::InvalidShape(format!(
                "linear layer {}x{} has an empty extent",
                self.out_features, self.in_features
            )));
        }
        if element_count(&[self.out_features, self.in_features]) == usize::MAX {
            return Err(ConfigError::InvalidShape(
                "linear weight element count overflows".into(),
            ));
        }
        Ok(())
    }
}
