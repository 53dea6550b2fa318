// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The contract every processing engine implements.
//
// Mirrors the C API one-to-one: synchronous calls, raw result codes, and
// engine-owned output buffers that must be handed back through `free_*`.

use std::path::Path;
use std::time::Duration;

use printtrace_core::error::ErrorCode;
use printtrace_core::types::{ParameterRanges, PipelineStage, ProcessingParameters};

use crate::callback::ContextHandle;
use crate::raw::{RawContour, RawImageBuffer};

/// Output of [`ProcessingEngine::process_to_stage`].
#[derive(Debug)]
pub struct StageOutput {
    pub code: ErrorCode,
    /// Intermediate image, when the stage produces one.
    pub image: Option<RawImageBuffer>,
    /// Only guaranteed for [`PipelineStage::Final`].
    pub contour: Option<RawContour>,
}

/// A synchronous, blocking image-processing engine.
///
/// The `process_*` calls may run for seconds and must be issued from a
/// worker thread. They report progress and informational errors through
/// `ctx` zero or more times, and return exactly once. Every buffer they
/// return must be released exactly once through the matching `free_*`
/// method, whatever the result code.
pub trait ProcessingEngine: Send + Sync + 'static {
    /// Engine version string.
    fn version(&self) -> String;

    /// Currently valid bounds for each tunable.
    fn parameter_ranges(&self) -> ParameterRanges;

    /// Check parameters without processing anything.
    fn validate_parameters(&self, params: &ProcessingParameters) -> Result<(), ErrorCode>;

    /// Cheap existence and format check.
    fn is_valid_input_file(&self, path: &Path) -> bool;

    /// Rough duration of a full run on `path`, if the engine can tell.
    fn estimate_processing_time(&self, path: &Path) -> Option<Duration>;

    /// Trace the object in `input`.
    fn process_to_contour(
        &self,
        input: &Path,
        params: &ProcessingParameters,
        ctx: &ContextHandle,
    ) -> (ErrorCode, Option<RawContour>);

    /// Trace the object in `input` and write its outline to `output` as DXF.
    fn process_to_dxf_file(
        &self,
        input: &Path,
        output: &Path,
        params: &ProcessingParameters,
        ctx: &ContextHandle,
    ) -> ErrorCode;

    /// Run the pipeline up to `stage` and return its intermediate output.
    fn process_to_stage(
        &self,
        input: &Path,
        params: &ProcessingParameters,
        stage: PipelineStage,
        ctx: &ContextHandle,
    ) -> StageOutput;

    fn free_contour(&self, contour: RawContour);

    fn free_image_buffer(&self, buffer: RawImageBuffer);
}
