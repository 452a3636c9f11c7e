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

//! im2col: unfold convolution patches into a `[C*KH*KW, OH*OW]` matrix.

use super::pixel::{sample_pixel, ImageDims};
use super::LowerError;
use crate::config::ConfigError;
use crate::shapes::ShapeMismatch;
use crate::types::{conv_output_dim, effective_extent, element_count, padded_extent, ConvShape};

/// Geometry of one im2col lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Im2colParams {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
}

impl Im2colParams {
    /// Lowering geometry of a convolution. Rows follow the `x` axis,
    /// columns the `y` axis.
    pub fn from_conv(shape: &ConvShape) -> Self {
        Im2colParams {
            channels: shape.c,
            height: shape.x,
            width: shape.y,
            kernel_h: shape.r,
            kernel_w: shape.s,
            pad_h: shape.pad_x,
            pad_w: shape.pad_y,
            stride_h: shape.stride_x,
            stride_w: shape.stride_y,
            dilation_h: shape.dilation_x,
            dilation_w: shape.dilation_y,
        }
    }

    pub fn image_dims(&self) -> ImageDims {
        ImageDims {
            channels: self.channels,
            height: self.height,
            width: self.width,
        }
    }

    /// Rows of the lowered matrix.
    pub fn expanded_channels(&self) -> usize {
        element_count(&[self.channels, self.kernel_h, self.kernel_w])
    }

    /// `(out_h, out_w)`; fails when the dilated kernel does not fit.
    pub fn output_dims(&self) -> Result<(usize, usize), ConfigError> {
        let out_h = conv_output_dim(
            self.height,
            self.pad_h,
            self.kernel_h,
            self.dilation_h,
            self.stride_h,
        )
        .ok_or(ConfigError::EmptyOutput {
            axis: "row",
            effective: effective_extent(self.kernel_h, self.dilation_h),
            padded: padded_extent(self.height, self.pad_h),
        })?;
        let out_w = conv_output_dim(
            self.width,
            self.pad_w,
            self.kernel_w,
            self.dilation_w,
            self.stride_w,
        )
        .ok_or(ConfigError::EmptyOutput {
            axis: "column",
            effective: effective_extent(self.kernel_w, self.dilation_w),
            padded: padded_extent(self.width, self.pad_w),
        })?;
        Ok((out_h, out_w))
    }

    /// Exact number of `f32` slots the lowered matrix occupies.
    pub fn column_len(&self) -> Result<usize, ConfigError> {
        let (out_h, out_w) = self.output_dims()?;
        let len = element_count(&[self.expanded_channels(), out_h, out_w]);
        if len == usize::MAX {
            return Err(ConfigError::InvalidShape("lowered matrix element count overflows".into()));
        }
        Ok(len)
    }
}

/// Lowered activation matrix together with the spatial extents it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Lowered {
    pub data: Vec<f32>,
    pub out_h: usize,
    pub out_w: usize,
}

/// Unfold `input` into the caller-provided `dst`.
///
/// `dst` must hold exactly [`Im2colParams::column_len`] elements; it is never
/// grown or truncated. Element `(c, h, w)` of the output lives at
/// `(c * out_h + h) * out_w + w`, where the expanded channel `c` decomposes
/// into `(input_channel, h_offset, w_offset)` with the kernel column fastest.
pub fn im2col_into(
    input: &[f32],
    params: &Im2colParams,
    dst: &mut [f32],
) -> Result<(usize, usize), LowerError> {
    let expected = params.column_len()?;
    let (out_h, out_w) = params.output_dims()?;
    let dims = params.image_dims();

    if input.len() != dims.len() {
        return Err(ShapeMismatch::Buffer {
            role: "im2col input",
            shape: vec![dims.channels, dims.height, dims.width],
            expected: dims.len(),
            actual: input.len(),
        }
        .into());
    }
    if dst.len() != expected {
        return Err(ShapeMismatch::Buffer {
            role: "im2col destination",
            shape: vec![params.expanded_channels(), element_count(&[out_h, out_w])],
            expected,
            actual: dst.len(),
        }
        .into());
    }

    let kw = params.kernel_w;
    let kh = params.kernel_h;
    for (c, plane) in dst.chunks_exact_mut(element_count(&[out_h, out_w])).enumerate() {
        let w_offset = c % kw;
        let h_offset = (c / kw) % kh;
        let channel = c / (kw * kh);
        for (h, row_out) in plane.chunks_exact_mut(out_w).enumerate() {
            let row = h_offset * params.dilation_h + h * params.stride_h;
            for (w, slot) in row_out.iter_mut().enumerate() {
                let col = w_offset * params.dilation_w + w * params.stride_w;
                *slot = sample_pixel(input, dims, row, col, channel, params.pad_h, params.pad_w);
            }
        }
    }

    Ok((out_h, out_w))
}

/// Unfold `input` into a freshly allocated, exactly sized buffer.
pub fn im2col(input: &[f32], params: &Im2colParams) -> Result<Lowered, LowerError> {
    let len = params.column_len()?;
    let mut data = vec![0.0f32; len];
    let (out_h, out_w) = im2col_into(input, params, &mut data)?;
    Ok(Lowered { data, out_h, out_w })
}

/// Transpose a row-major `[rows, cols]` matrix into `dst` as `[cols, rows]`.
pub fn transpose_into(
    src: &[f32],
    rows: usize,
    cols: usize,
    dst: &mut [f32],
) -> Result<(), ShapeMismatch> {
    let expected = rows * cols;
    if src.len() != expected {
        return Err(ShapeMismatch::Buffer {
            role: "transpose source",
            shape: vec![rows, cols],
            expected,
            actual: src.len(),
        });
    }
    if dst.len() != expected {
        return Err(ShapeMismatch::Buffer {
            role: "transpose destination",
            shape: vec![cols, rows],
            expected,
            actual: dst.len(),
        });
    }
    for (i, row) in src.chunks_exact(cols.max(1)).enumerate().take(rows) {
        for (j, value) in row.iter().enumerate() {
            dst[j * rows + i] = *value;
        }
    }
    Ok(())
}

pub fn transpose(src: &[f32], rows: usize, cols: usize) -> Result<Vec<f32>, ShapeMismatch> {
    let mut dst = vec![0.0f32; rows * cols];
    transpose_into(src, rows, cols, &mut dst)?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::{im2col, im2col_into, transpose, Im2colParams};
    use crate::config::ConfigError;
    use crate::lower::LowerError;
    use crate::shapes::ShapeMismatch;
    use crate::types::ConvShape;

    fn params(shape: &ConvShape) -> Im2colParams {
        Im2colParams::from_conv(shape)
    }

    #[test]
    fn unit_kernel_reproduces_input() {
        let shape = ConvShape::new((1, 1), 3, 2, (4, 5));
        let input: Vec<f32> = (0..60).map(|v| v as f32 * 0.5).collect();
        let lowered = im2col(&input, &params(&shape)).expect("lowered");
        assert_eq!((lowered.out_h, lowered.out_w), (4, 5));
        assert_eq!(lowered.data, input);
    }

    #[test]
    fn overflowing_geometry_is_a_config_error() {
        let mut p = params(&ConvShape::new((3, 3), 1, 1, (5, 5)));
        p.pad_h = usize::MAX / 2 + 1;
        assert!(matches!(
            p.column_len(),
            Err(ConfigError::EmptyOutput { axis: "row", padded: usize::MAX, .. })
        ));

        let mut wide = params(&ConvShape::new((1, 1), 1, 1, (1, 1)));
        wide.channels = usize::MAX / 2;
        wide.height = 4;
        assert!(matches!(wide.column_len(), Err(ConfigError::InvalidShape(_))));
        assert!(matches!(
            im2col_into(&[], &wide, &mut []),
            Err(LowerError::Config(ConfigError::InvalidShape(_)))
        ));
    }

    #[test]
    fn padded_three_by_three_patch_layout() {
        // 1x3x3 input, 3x3 kernel, pad 1: centre output column sees the whole image.
        let shape = ConvShape::new((3, 3), 1, 1, (3, 3)).with_padding(1, 1);
        let input: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let lowered = im2col(&input, &params(&shape)).expect("lowered");
        assert_eq!(lowered.data.len(), 9 * 9);

        let centre = 4;
        let column: Vec<f32> = (0..9).map(|c| lowered.data[c * 9 + centre]).collect();
        assert_eq!(column, input);

        // Top-left output: kernel rows/cols 0 fall into padding.
        let corner: Vec<f32> = (0..9).map(|c| lowered.data[c * 9]).collect();
        assert_eq!(corner, vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 4.0, 5.0]);
    }

    #[test]
    fn stride_and_dilation_pick_spaced_pixels() {
        // 1x5x5 input, 2x2 kernel, dilation 2, stride 2 -> 2x2 output.
        let shape = ConvShape::new((2, 2), 1, 1, (5, 5))
            .with_dilation(2, 2)
            .with_stride(2, 2);
        let input: Vec<f32> = (0..25).map(|v| v as f32).collect();
        let lowered = im2col(&input, &params(&shape)).expect("lowered");
        assert_eq!((lowered.out_h, lowered.out_w), (2, 2));
        // Expanded channel 3 = (h_offset 1, w_offset 1): source (2 + 2h, 2 + 2w).
        assert_eq!(&lowered.data[12..16], &[12.0, 14.0, 22.0, 24.0]);
    }

    #[test]
    fn asymmetric_padding_uses_per_axis_pad() {
        let shape = ConvShape::new((1, 1), 1, 1, (2, 2)).with_padding(0, 1);
        let input = vec![1.0, 2.0, 3.0, 4.0];
        let lowered = im2col(&input, &params(&shape)).expect("lowered");
        assert_eq!((lowered.out_h, lowered.out_w), (2, 4));
        assert_eq!(lowered.data, vec![0.0, 1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn oversized_kernel_fails_fast() {
        let mut p = params(&ConvShape::new((1, 1), 1, 1, (2, 2)));
        p.kernel_h = 3;
        let err = im2col(&[0.0; 4], &p).unwrap_err();
        assert!(matches!(
            err,
            LowerError::Config(ConfigError::EmptyOutput { axis: "row", effective: 3, padded: 2 })
        ));
    }

    #[test]
    fn undersized_destination_rejected() {
        let shape = ConvShape::new((3, 3), 1, 1, (5, 5));
        let mut dst = vec![0.0f32; 80];
        let err = im2col_into(&[0.0; 25], &params(&shape), &mut dst).unwrap_err();
        assert!(matches!(
            err,
            LowerError::Shape(ShapeMismatch::Buffer { expected: 81, actual: 80, .. })
        ));
    }

    #[test]
    fn transpose_swaps_orientation() {
        let src = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(
            transpose(&src, 2, 3).expect("transpose"),
            vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
        );
        assert!(transpose(&src, 4, 2).is_err());
    }
}
