#![cfg(feature = "ffi-c")]

use std::ffi::CString;
use std::ptr;

use stonne_bridge::ffi::capi::{last_error_as_str, sb_conv2d_forward, SbConv2dArgs, SbTensor};

#[test]
fn header_contains_expected_symbols() {
    let header = stonne_bridge::ffi::header::generate_header();
    assert!(header.contains("SbTensor"));
    assert!(header.contains("sb_conv2d_forward"));
    assert!(header.contains("sb_last_error"));
}

fn args(metrics: &CString) -> SbConv2dArgs {
    SbConv2dArgs {
        arch_path: ptr::null(),
        r: 3,
        s: 3,
        c: 1,
        k: 1,
        g: 1,
        n: 1,
        x: 5,
        y: 5,
        h_out: 5,
        w_out: 5,
        stride_x: 1,
        stride_y: 1,
        pad_x: 1,
        pad_y: 1,
        dilation_x: 1,
        dilation_y: 1,
        tile_path: ptr::null(),
        sparsity_ratio: 0,
        tuning: 0,
        tuning_name: ptr::null(),
        costs_path: ptr::null(),
        print_stats: 0,
        metrics_path: metrics.as_ptr(),
    }
}

#[test]
fn conv2d_through_c_abi() {
    let dir = tempfile::tempdir().expect("tempdir");
    let metrics = CString::new(dir.path().join("cycles.json").to_string_lossy().into_owned())
        .expect("metrics path");

    let mut input = vec![1.0f32; 25];
    let mut weight = vec![1.0f32; 9];
    let mut output = vec![0.0f32; 25];
    let image_shape = [1u64, 1, 5, 5];
    let kernel_shape = [1u64, 1, 3, 3];
    let tensor = |data: &mut Vec<f32>, shape: &[u64; 4]| SbTensor {
        data: data.as_mut_ptr(),
        ndim: 4,
        shape: shape.as_ptr(),
    };
    let (t_in, t_w, t_out) = (
        tensor(&mut input, &image_shape),
        tensor(&mut weight, &kernel_shape),
        tensor(&mut output, &image_shape),
    );

    let call_args = args(&metrics);
    // SAFETY: every descriptor points at live buffers of the declared shape.
    let rc = unsafe { sb_conv2d_forward(&call_args, &t_in, &t_w, &t_out) };
    assert_eq!(rc, 0, "{:?}", last_error_as_str());
    assert_eq!(output[0], 4.0);
    assert_eq!(output[2], 6.0);
    assert_eq!(output[12], 9.0);
    assert!(dir.path().join("cycles.json").exists());
}

#[test]
fn huge_padding_returns_an_error_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let metrics = CString::new(dir.path().join("cycles.json").to_string_lossy().into_owned())
        .expect("metrics path");
    let mut call_args = args(&metrics);
    call_args.pad_x = u64::MAX / 2;
    call_args.dilation_y = u64::MAX / 2;

    let mut data = vec![1.0f32; 25];
    let shape = [1u64, 1, 5, 5];
    let t = SbTensor {
        data: data.as_mut_ptr(),
        ndim: 4,
        shape: shape.as_ptr(),
    };
    let mut kernel = vec![1.0f32; 9];
    let kshape = [1u64, 1, 3, 3];
    let k = SbTensor {
        data: kernel.as_mut_ptr(),
        ndim: 4,
        shape: kshape.as_ptr(),
    };
    let mut out = vec![0.0f32; 25];
    let o = SbTensor {
        data: out.as_mut_ptr(),
        ndim: 4,
        shape: shape.as_ptr(),
    };

    // SAFETY: descriptors are valid; the shape arguments are the only bad input.
    let rc = unsafe { sb_conv2d_forward(&call_args, &t, &k, &o) };
    assert_eq!(rc, -1);
    assert!(last_error_as_str().expect("message").contains("exceeds padded input"));
    assert!(out.iter().all(|&v| v == 0.0));
}

#[test]
fn mismatched_output_extent_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let metrics = CString::new(dir.path().join("cycles.json").to_string_lossy().into_owned())
        .expect("metrics path");
    let mut call_args = args(&metrics);
    call_args.h_out = 4;

    let mut data = vec![1.0f32; 25];
    let shape = [1u64, 1, 5, 5];
    let t = SbTensor {
        data: data.as_mut_ptr(),
        ndim: 4,
        shape: shape.as_ptr(),
    };
    let mut kernel = vec![1.0f32; 9];
    let kshape = [1u64, 1, 3, 3];
    let k = SbTensor {
        data: kernel.as_mut_ptr(),
        ndim: 4,
        shape: kshape.as_ptr(),
    };
    let mut out = vec![0.0f32; 25];
    let o = SbTensor {
        data: out.as_mut_ptr(),
        ndim: 4,
        shape: shape.as_ptr(),
    };

    // SAFETY: descriptors are valid; the call must fail before writing.
    let rc = unsafe { sb_conv2d_forward(&call_args, &t, &k, &o) };
    assert_eq!(rc, -1);
    assert!(last_error_as_str().expect("message").contains("extent"));
    assert!(out.iter().all(|&v| v == 0.0));
}
