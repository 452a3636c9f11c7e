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

/// Extents of a channel-outermost (CHW) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDims {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageDims {
    pub fn len(&self) -> usize {
        crate::types::element_count(&[self.channels, self.height, self.width])
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read one pixel addressed in padded coordinates.
///
/// `pad_h`/`pad_w` are subtracted from `row`/`col`; anything that lands
/// outside `[0, height) x [0, width)` is padding and reads as `0.0`.
/// Otherwise returns `image[col + width * (row + height * channel)]`.
#[inline]
pub fn sample_pixel(
    image: &[f32],
    dims: ImageDims,
    row: usize,
    col: usize,
    channel: usize,
    pad_h: usize,
    pad_w: usize,
) -> f32 {
    debug_assert!(channel < dims.channels);
    let r = row as isize - pad_h as isize;
    let c = col as isize - pad_w as isize;
    if r < 0 || c < 0 || r >= dims.height as isize || c >= dims.width as isize {
        return 0.0;
    }
    let (r, c) = (r as usize, c as usize);
    image[c + dims.width * (r + dims.height * channel)]
}
