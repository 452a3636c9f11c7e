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

use std::fmt;

use super::ShapeMismatch;
use crate::types::{element_count, ConvShape, LinearShape};

/// GEMM extents of a lowered operation: `[M, K] x [K, N] -> [M, N]`.
///
/// - `m`: filters (output channels)
/// - `k`: contracted patch size `R*S*C` over all channels
/// - `n`: output spatial positions `H_out*W_out`
///
/// For grouped convolutions `k` still spans every channel so that it matches
/// the lowered activation matrix; each group contracts over
/// [`GemmShape::k_per_group`] rows of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmShape {
    pub m: usize,
    pub k: usize,
    pub n: usize,
}

impl fmt::Display for GemmShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M={} K={} N={}", self.m, self.k, self.n)
    }
}

impl GemmShape {
    /// Fully-connected layer as a GEMM with a single output column.
    pub fn for_linear(shape: &LinearShape) -> Self {
        GemmShape {
            m: shape.out_features,
            k: shape.in_features,
            n: 1,
        }
    }

    /// Contraction length seen by one group.
    pub fn k_per_group(&self, groups: usize) -> usize {
        self.k / groups.max(1)
    }

    /// Elements of the `[K, N]` activation operand.
    pub fn activation_len(&self) -> usize {
        element_count(&[self.k, self.n])
    }

    /// Elements of the `[M, K/G]` filter operand.
    pub fn weight_len(&self, groups: usize) -> usize {
        element_count(&[self.m, self.k_per_group(groups)])
    }

    /// Elements of the `[M, N]` result.
    pub fn output_len(&self) -> usize {
        element_count(&[self.m, self.n])
    }

    /// Contract between lowering and derivation: the lowered buffer must hold
    /// exactly `K*N` elements.
    pub fn expect_lowered_len(&self, len: usize) -> Result<(), ShapeMismatch> {
        if len != self.activation_len() {
            return Err(ShapeMismatch::Operand {
                role: "lowered activation",
                expected: self.activation_len(),
                actual: len,
            });
        }
        Ok(())
    }
}

/// Derive GEMM extents from a convolution and the lowering's output extents.
///
/// `lowered_out_h`/`lowered_out_w` must agree with the shape's configured
/// `h_out`/`w_out`.
pub fn derive_gemm_shape(
    conv: &ConvShape,
    lowered_out_h: usize,
    lowered_out_w: usize,
) -> Result<GemmShape, ShapeMismatch> {
    if lowered_out_h != conv.h_out || lowered_out_w != conv.w_out {
        return Err(ShapeMismatch::OutputExtent {
            lowered_h: lowered_out_h,
            lowered_w: lowered_out_w,
            out_h: conv.h_out,
            out_w: conv.w_out,
        });
    }
    Ok(GemmShape {
        m: conv.k,
        k: element_count(&[conv.r, conv.s, conv.c]),
        n: element_count(&[lowered_out_h, lowered_out_w]),
    })
}

#[cfg(test)]
mod tests {
    use super::{derive_gemm_shape, GemmShape};
    use crate::shapes::ShapeMismatch;
    use crate::types::{element_count, ConvShape, LinearShape};

    #[test]
    fn derives_mkn_from_conv() {
        let conv = ConvShape::new((3, 3), 2, 4, (10, 10)).with_padding(1, 1);
        let gemm = derive_gemm_shape(&conv, 10, 10).expect("gemm");
        assert_eq!(gemm, GemmShape { m: 4, k: 18, n: 100 });
        assert_eq!(gemm.to_string(), "M=4 K=18 N=100");
    }

    #[test]
    fn grouped_weight_operand_is_per_group() {
        let conv = ConvShape::new((3, 3), 4, 4, (6, 6)).with_groups(2);
        let gemm = derive_gemm_shape(&conv, 4, 4).expect("gemm");
        assert_eq!(gemm.k, 36);
        assert_eq!(gemm.k_per_group(2), 18);
        assert_eq!(gemm.weight_len(2), 4 * 18);
    }

    #[test]
    fn rejects_diverging_extent() {
        let conv = ConvShape::new((3, 3), 1, 1, (5, 5));
        assert!(matches!(
            derive_gemm_shape(&conv, 5, 5),
            Err(ShapeMismatch::OutputExtent { out_h: 3, out_w: 3, .. })
        ));
    }

    #[test]
    fn lowered_length_contract() {
        let gemm = GemmShape::for_linear(&LinearShape::new(2, 6));
        assert_eq!((gemm.m, gemm.k, gemm.n), (6, 2, 1));
        assert!(gemm.expect_lowered_len(2).is_ok());
        assert_eq!(
            gemm.expect_lowered_len(3),
            Err(ShapeMismatch::Operand {
                role: "lowered activation",
                expected: 2,
                actual: 3,
            })
        );
    }
}
