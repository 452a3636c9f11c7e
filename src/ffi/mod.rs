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

#[cfg(feature = "ffi-c")]
pub mod capi {
    use std::cell::RefCell;
    use std::ffi::{CStr, CString};
    use std::os::raw::{c_char, c_int};
    use std::path::PathBuf;
    use std::ptr;

    use crate::metrics::{MetricsReporter, ReportingConfig, TuningContext};
    use crate::pipeline::{conv2d_forward, Conv2dRequest};
    use crate::runtime::ReferenceSimulator;
    use crate::types::{ConvShape, TensorView, TensorViewMut};

    /// Externally owned `f32` tensor.
    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SbTensor {
        pub data: *mut f32,
        pub ndim: u32,
        pub shape: *const u64,
    }

    /// Scalar arguments of one convolution invocation.
    ///
    /// String fields may be null; null or empty paths select the defaults.
    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SbConv2dArgs {
        pub arch_path: *const c_char,
        pub r: u64,
        pub s: u64,
        pub c: u64,
        pub k: u64,
        pub g: u64,
        pub n: u64,
        pub x: u64,
        pub y: u64,
        pub h_out: u64,
        pub w_out: u64,
        pub stride_x: u64,
        pub stride_y: u64,
        pub pad_x: u64,
        pub pad_y: u64,
        pub dilation_x: u64,
        pub dilation_y: u64,
        pub tile_path: *const c_char,
        pub sparsity_ratio: u32,
        pub tuning: u8,
        pub tuning_name: *const c_char,
        pub costs_path: *const c_char,
        pub print_stats: u8,
        /// Metrics artifact; null defers to `STONNE_BRIDGE_METRICS`.
        pub metrics_path: *const c_char,
    }

    thread_local! {
        static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    }

    fn write_error(msg: impl Into<String>) -> c_int {
        let string = CString::new(msg.into().replace('\0', " ")).unwrap_or_default();
        LAST_ERROR.with(|slot| {
            *slot.borrow_mut() = Some(string);
        });
        -1
    }

    fn clear_error() {
        LAST_ERROR.with(|slot| {
            slot.borrow_mut().take();
        });
    }

    fn to_usize(name: &str, value: u64) -> Result<usize, String> {
        usize::try_from(value).map_err(|_| format!("{name}={value} exceeds the platform pointer width"))
    }

    /// # Safety
    ///
    /// `raw` must be null or a NUL-terminated string valid for reads.
    unsafe fn opt_string(raw: *const c_char) -> Result<Option<String>, String> {
        if raw.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null and NUL-terminated per the caller's contract.
        let text = unsafe { CStr::from_ptr(raw) };
        text.to_str()
            .map(|s| Some(s.to_string()))
            .map_err(|_| "string argument is not valid UTF-8".to_string())
    }

    /// # Safety
    ///
    /// `tensor.shape` must point to `tensor.ndim` readable `u64`s.
    unsafe fn tensor_dims(role: &str, tensor: &SbTensor) -> Result<(Vec<usize>, usize), String> {
        if tensor.data.is_null() || tensor.shape.is_null() {
            return Err(format!("{role} tensor has a null data or shape pointer"));
        }
        // SAFETY: shape holds ndim entries per the caller's contract.
        let raw = unsafe { std::slice::from_raw_parts(tensor.shape, tensor.ndim as usize) };
        let dims = raw
            .iter()
            .map(|&d| to_usize(role, d))
            .collect::<Result<Vec<_>, _>>()?;
        let len = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| format!("{role} tensor element count overflows"))?;
        Ok((dims, len))
    }

    fn shape_from_args(args: &SbConv2dArgs) -> Result<ConvShape, String> {
        let field = |name: &str, v: u64| to_usize(name, v);
        let mut shape = ConvShape::new(
            (field("R", args.r)?, field("S", args.s)?),
            field("C", args.c)?,
            field("K", args.k)?,
            (field("X", args.x)?, field("Y", args.y)?),
        )
        .with_stride(field("stride_x", args.stride_x)?, field("stride_y", args.stride_y)?)
        .with_padding(field("pad_x", args.pad_x)?, field("pad_y", args.pad_y)?)
        .with_dilation(
            field("dilation_x", args.dilation_x)?,
            field("dilation_y", args.dilation_y)?,
        )
        .with_groups(field("G", args.g)?);
        shape.n = field("N", args.n)?;
        shape.h_out = field("H_out", args.h_out)?;
        shape.w_out = field("W_out", args.w_out)?;
        Ok(shape)
    }

    /// # Safety
    ///
    /// Same contract as [`sb_conv2d_forward`].
    unsafe fn forward(
        args: &SbConv2dArgs,
        input: &SbTensor,
        weight: &SbTensor,
        output: &SbTensor,
    ) -> Result<(), String> {
        let shape = shape_from_args(args)?;
        // SAFETY: string pointers are null or NUL-terminated.
        let (arch, tile, run, costs, metrics) = unsafe {
            (
                opt_string(args.arch_path)?,
                opt_string(args.tile_path)?,
                opt_string(args.tuning_name)?,
                opt_string(args.costs_path)?,
                opt_string(args.metrics_path)?,
            )
        };

        let run = run.unwrap_or_default();
        let tuning = if args.tuning != 0 {
            TuningContext::tuning(run, costs.unwrap_or_default())
        } else {
            TuningContext::inactive(run)
        };
        let mut request = Conv2dRequest::new(shape)
            .with_sparsity_ratio(args.sparsity_ratio)
            .with_tuning(tuning)
            .with_print_stats(args.print_stats != 0);
        request.arch_path = arch.map(PathBuf::from);
        request.tile_path = tile.map(PathBuf::from);

        let reporter = match metrics {
            Some(path) if !path.is_empty() => MetricsReporter::new(ReportingConfig::new(path)),
            _ => MetricsReporter::from_env(),
        };

        // SAFETY: descriptors are valid per the caller's contract.
        let (in_dims, in_len) = unsafe { tensor_dims("input", input)? };
        let (w_dims, w_len) = unsafe { tensor_dims("weight", weight)? };
        let (out_dims, out_len) = unsafe { tensor_dims("output", output)? };
        // SAFETY: each data pointer addresses as many floats as its shape
        // implies, and the output does not alias the inputs.
        let (in_data, w_data, out_data) = unsafe {
            (
                std::slice::from_raw_parts(input.data.cast_const(), in_len),
                std::slice::from_raw_parts(weight.data.cast_const(), w_len),
                std::slice::from_raw_parts_mut(output.data, out_len),
            )
        };

        let input = TensorView::new(in_data, &in_dims).map_err(|e| e.to_string())?;
        let weight = TensorView::new(w_data, &w_dims).map_err(|e| e.to_string())?;
        let mut output = TensorViewMut::new(out_data, &out_dims).map_err(|e| e.to_string())?;
        conv2d_forward(
            &request,
            input,
            weight,
            &mut output,
            &ReferenceSimulator,
            &reporter,
        )
        .map(|_| ())
        .map_err(|e| e.to_string())
    }

    /// Simulate one convolution with the reference simulator.
    ///
    /// Returns 0 on success and -1 on failure; the message is available from
    /// [`sb_last_error`].
    ///
    /// # Safety
    ///
    /// All pointers must be null or valid. Each tensor's `shape` must hold
    /// `ndim` entries and its `data` as many floats as the shape implies.
    /// `output.data` must be writable and must not overlap the inputs.
    #[no_mangle]
    pub unsafe extern "C" fn sb_conv2d_forward(
        args: *const SbConv2dArgs,
        input: *const SbTensor,
        weight: *const SbTensor,
        output: *const SbTensor,
    ) -> c_int {
        clear_error();
        if args.is_null() || input.is_null() || weight.is_null() || output.is_null() {
            return write_error("sb_conv2d_forward received a null argument");
        }
        // SAFETY: all four pointers are non-null and valid per the contract.
        let result = unsafe { forward(&*args, &*input, &*weight, &*output) };
        match result {
            Ok(()) => 0,
            Err(message) => write_error(message),
        }
    }

    #[no_mangle]
    pub extern "C" fn sb_last_error() -> *const c_char {
        LAST_ERROR.with(|slot| {
            if let Some(s) = slot.borrow().as_ref() {
                s.as_ptr()
            } else {
                ptr::null()
            }
        })
    }

    pub fn last_error_as_str() -> Option<String> {
        LAST_ERROR.with(|slot| {
            slot.borrow()
                .as_ref()
                .map(|s| s.to_string_lossy().into_owned())
        })
    }

}

#[cfg(feature = "ffi-c")]
pub mod header;
