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

/// C declarations matching [`super::capi`].
#[cfg(feature = "ffi-c")]
pub fn generate_header() -> String {
    let header = r#"#ifndef STONNE_BRIDGE_H
#define STONNE_BRIDGE_H
#include <stdint.h>
#ifdef __cplusplus
extern "C" {
#endif

typedef struct { float* data; uint32_t ndim; const uint64_t* shape; } SbTensor;
typedef struct {
  const char* arch_path;
  uint64_t r, s, c, k, g, n, x, y, h_out, w_out;
  uint64_t stride_x, stride_y, pad_x, pad_y, dilation_x, dilation_y;
  const char* tile_path;
  uint32_t sparsity_ratio;
  uint8_t tuning;
  const char* tuning_name;
  const char* costs_path;
  uint8_t print_stats;
  const char* metrics_path;
} SbConv2dArgs;

int sb_conv2d_forward(const SbConv2dArgs* args, const SbTensor* input, const SbTensor* weight, const SbTensor* output);
const char* sb_last_error(void);

#ifdef __cplusplus
} // extern "C"
#endif
#endif
"#;
    header.to_string()
}
