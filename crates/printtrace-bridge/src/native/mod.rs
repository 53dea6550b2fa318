// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Native engine: links libprinttrace and forwards every call through its C
// API. Callbacks are the `extern "C"` trampolines from `callback`, with the
// operation's registry key as `user_data`.

use std::ffi::{CStr, CString, c_char, c_double, c_int, c_void};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use printtrace_core::error::ErrorCode;
use printtrace_core::types::{ParamRange, ParameterRanges, PipelineStage, ProcessingParameters};

use crate::callback::{ContextHandle, error_trampoline, progress_trampoline};
use crate::raw::{RawContour, RawImageBuffer};
use crate::traits::{ProcessingEngine, StageOutput};

type ProgressFn = unsafe extern "C" fn(c_double, *const c_char, *mut c_void);
type ErrorFn = unsafe extern "C" fn(c_int, *const c_char, *mut c_void);

/// `pt_parameters` as laid out by the C header.
#[repr(C)]
struct PtParameters {
    warp_size: c_int,
    real_world_size_mm: c_double,
    canny_lower: c_double,
    canny_upper: c_double,
    canny_aperture: c_int,
    clahe_clip_limit: c_double,
    clahe_tile_size: c_int,
    blur_size: c_int,
    enable_morphology: bool,
    morph_kernel_size: c_int,
    contour_merge_distance: c_double,
    enable_subpixel_refinement: bool,
    subpixel_window_size: c_int,
    polygon_epsilon_factor: c_double,
    enable_smoothing: bool,
    smoothing_amount_mm: c_double,
    dilation_amount_mm: c_double,
    enable_debug_output: bool,
}

impl From<&ProcessingParameters> for PtParameters {
    fn from(p: &ProcessingParameters) -> Self {
        Self {
            warp_size: p.warp_size,
            real_world_size_mm: p.real_world_size_mm,
            canny_lower: p.canny_lower,
            canny_upper: p.canny_upper,
            canny_aperture: p.canny_aperture,
            clahe_clip_limit: p.clahe_clip_limit,
            clahe_tile_size: p.clahe_tile_size,
            blur_size: p.blur_size,
            enable_morphology: p.enable_morphology,
            morph_kernel_size: p.morph_kernel_size,
            contour_merge_distance: p.contour_merge_distance,
            enable_subpixel_refinement: p.enable_subpixel_refinement,
            subpixel_window_size: p.subpixel_window_size,
            polygon_epsilon_factor: p.polygon_epsilon_factor,
            enable_smoothing: p.enable_smoothing,
            smoothing_amount_mm: p.smoothing_amount_mm,
            dilation_amount_mm: p.dilation_amount_mm,
            enable_debug_output: p.enable_debug_output,
        }
    }
}

#[repr(C)]
#[derive(Default, Clone, Copy)]
struct PtIntRange {
    min: c_int,
    max: c_int,
}

#[repr(C)]
#[derive(Default, Clone, Copy)]
struct PtDoubleRange {
    min: c_double,
    max: c_double,
}

impl From<PtIntRange> for ParamRange<i32> {
    fn from(r: PtIntRange) -> Self {
        ParamRange::new(r.min, r.max)
    }
}

impl From<PtDoubleRange> for ParamRange<f64> {
    fn from(r: PtDoubleRange) -> Self {
        ParamRange::new(r.min, r.max)
    }
}

#[repr(C)]
#[derive(Default)]
struct PtParameterRanges {
    warp_size: PtIntRange,
    real_world_size_mm: PtDoubleRange,
    canny_lower: PtDoubleRange,
    canny_upper: PtDoubleRange,
    canny_aperture: PtIntRange,
    clahe_clip_limit: PtDoubleRange,
    clahe_tile_size: PtIntRange,
    blur_size: PtIntRange,
    morph_kernel_size: PtIntRange,
    contour_merge_distance: PtDoubleRange,
    subpixel_window_size: PtIntRange,
    polygon_epsilon_factor: PtDoubleRange,
    smoothing_amount_mm: PtDoubleRange,
    dilation_amount_mm: PtDoubleRange,
}

impl From<PtParameterRanges> for ParameterRanges {
    fn from(r: PtParameterRanges) -> Self {
        Self {
            warp_size: r.warp_size.into(),
            real_world_size_mm: r.real_world_size_mm.into(),
            canny_lower: r.canny_lower.into(),
            canny_upper: r.canny_upper.into(),
            canny_aperture: r.canny_aperture.into(),
            clahe_clip_limit: r.clahe_clip_limit.into(),
            clahe_tile_size: r.clahe_tile_size.into(),
            blur_size: r.blur_size.into(),
            morph_kernel_size: r.morph_kernel_size.into(),
            contour_merge_distance: r.contour_merge_distance.into(),
            subpixel_window_size: r.subpixel_window_size.into(),
            polygon_epsilon_factor: r.polygon_epsilon_factor.into(),
            smoothing_amount_mm: r.smoothing_amount_mm.into(),
            dilation_amount_mm: r.dilation_amount_mm.into(),
        }
    }
}

#[link(name = "printtrace")]
unsafe extern "C" {
    fn pt_version() -> *const c_char;
    fn pt_get_parameter_ranges(out: *mut PtParameterRanges);
    fn pt_validate_parameters(params: *const PtParameters) -> c_int;
    fn pt_is_valid_input_file(path: *const c_char) -> bool;
    /// Seconds; negative when unknown.
    fn pt_estimate_processing_time(path: *const c_char) -> c_double;

    fn pt_process_to_contour(
        input: *const c_char,
        params: *const PtParameters,
        out_contour: *mut RawContour,
        on_progress: ProgressFn,
        on_error: ErrorFn,
        user_data: *mut c_void,
    ) -> c_int;

    fn pt_process_to_dxf(
        input: *const c_char,
        output: *const c_char,
        params: *const PtParameters,
        on_progress: ProgressFn,
        on_error: ErrorFn,
        user_data: *mut c_void,
    ) -> c_int;

    fn pt_process_to_stage(
        input: *const c_char,
        params: *const PtParameters,
        stage: c_int,
        out_image: *mut RawImageBuffer,
        out_contour: *mut RawContour,
        on_progress: ProgressFn,
        on_error: ErrorFn,
        user_data: *mut c_void,
    ) -> c_int;

    fn pt_free_contour(contour: *mut RawContour);
    fn pt_free_image_buffer(buffer: *mut RawImageBuffer);
}

fn c_path(path: &Path) -> Option<CString> {
    CString::new(path.as_os_str().as_encoded_bytes()).ok()
}

fn check_context(ctx: &ContextHandle) {
    if !ctx.is_global() {
        warn!(key = ctx.key(), "context not bound to the global registry, engine callbacks will be dropped");
    }
}

/// Engine backed by the linked C library.
#[derive(Debug, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessingEngine for NativeEngine {
    fn version(&self) -> String {
        // SAFETY: the library returns a static NUL-terminated string or null.
        let ptr = unsafe { pt_version() };
        if ptr.is_null() {
            return String::from("unknown");
        }
        // SAFETY: non-null static string, see above.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    fn parameter_ranges(&self) -> ParameterRanges {
        let mut raw = PtParameterRanges::default();
        // SAFETY: `raw` is a valid, writable out-parameter.
        unsafe { pt_get_parameter_ranges(&mut raw) };
        raw.into()
    }

    fn validate_parameters(&self, params: &ProcessingParameters) -> Result<(), ErrorCode> {
        let raw = PtParameters::from(params);
        // SAFETY: `raw` outlives the call.
        let code = ErrorCode(unsafe { pt_validate_parameters(&raw) });
        if code.is_success() { Ok(()) } else { Err(code) }
    }

    fn is_valid_input_file(&self, path: &Path) -> bool {
        let Some(path) = c_path(path) else {
            return false;
        };
        // SAFETY: `path` is NUL-terminated and outlives the call.
        unsafe { pt_is_valid_input_file(path.as_ptr()) }
    }

    fn estimate_processing_time(&self, path: &Path) -> Option<Duration> {
        let path = c_path(path)?;
        // SAFETY: `path` is NUL-terminated and outlives the call.
        let seconds = unsafe { pt_estimate_processing_time(path.as_ptr()) };
        Duration::try_from_secs_f64(seconds).ok()
    }

    #[instrument(skip(self, params, ctx), fields(key = ctx.key()))]
    fn process_to_contour(
        &self,
        input: &Path,
        params: &ProcessingParameters,
        ctx: &ContextHandle,
    ) -> (ErrorCode, Option<RawContour>) {
        check_context(ctx);
        let Some(input) = c_path(input) else {
            return (ErrorCode::INVALID_INPUT, None);
        };
        let raw = PtParameters::from(params);
        let mut contour = RawContour::empty();

        // SAFETY: every pointer is valid for the duration of the call, and
        // `user_data` is only a registry key.
        let code = ErrorCode(unsafe {
            pt_process_to_contour(
                input.as_ptr(),
                &raw,
                &mut contour,
                progress_trampoline,
                error_trampoline,
                ctx.user_data(),
            )
        });
        debug!(%code, populated = contour.is_populated(), "pt_process_to_contour returned");

        // A populated buffer is handed back even on failure so the caller
        // still releases it.
        (code, contour.is_populated().then_some(contour))
    }

    #[instrument(skip(self, params, ctx), fields(key = ctx.key()))]
    fn process_to_dxf_file(
        &self,
        input: &Path,
        output: &Path,
        params: &ProcessingParameters,
        ctx: &ContextHandle,
    ) -> ErrorCode {
        check_context(ctx);
        let (Some(input), Some(output)) = (c_path(input), c_path(output)) else {
            return ErrorCode::INVALID_INPUT;
        };
        let raw = PtParameters::from(params);

        // SAFETY: as in `process_to_contour`.
        ErrorCode(unsafe {
            pt_process_to_dxf(
                input.as_ptr(),
                output.as_ptr(),
                &raw,
                progress_trampoline,
                error_trampoline,
                ctx.user_data(),
            )
        })
    }

    #[instrument(skip(self, params, ctx), fields(key = ctx.key()))]
    fn process_to_stage(
        &self,
        input: &Path,
        params: &ProcessingParameters,
        stage: PipelineStage,
        ctx: &ContextHandle,
    ) -> StageOutput {
        check_context(ctx);
        let Some(input) = c_path(input) else {
            return StageOutput {
                code: ErrorCode::INVALID_INPUT,
                image: None,
                contour: None,
            };
        };
        let raw = PtParameters::from(params);
        let mut image = RawImageBuffer::empty();
        let mut contour = RawContour::empty();

        // SAFETY: as in `process_to_contour`.
        let code = ErrorCode(unsafe {
            pt_process_to_stage(
                input.as_ptr(),
                &raw,
                stage.as_raw(),
                &mut image,
                &mut contour,
                progress_trampoline,
                error_trampoline,
                ctx.user_data(),
            )
        });

        StageOutput {
            code,
            image: image.is_populated().then_some(image),
            contour: contour.is_populated().then_some(contour),
        }
    }

    fn free_contour(&self, mut contour: RawContour) {
        // SAFETY: `contour` was filled by the library and is consumed here.
        unsafe { pt_free_contour(&mut contour) };
    }

    fn free_image_buffer(&self, mut buffer: RawImageBuffer) {
        // SAFETY: `buffer` was filled by the library and is consumed here.
        unsafe { pt_free_image_buffer(&mut buffer) };
    }
}
