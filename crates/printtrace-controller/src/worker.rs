// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The blocking half of an operation. Runs on the blocking pool, owns the
// callback context for exactly the duration of the engine call, and converts
// engine buffers into owned values before they are released.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use printtrace_bridge::{ContextHandle, ContourGuard, ImageGuard, ProcessingEngine, RawContour, RawImageBuffer};
use printtrace_core::error::{ErrorCode, PrintTraceError};
use printtrace_core::geometry::ProcessedContour;
use printtrace_core::types::{ProcessingParameters, RequestKind};

use crate::result::ProcessingOutput;

/// Why the worker produced no output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WorkerError {
    /// The engine returned a failure code. Mapped by the controller, which
    /// holds the engine's last message.
    Engine(ErrorCode),
    /// Failure decided on this side of the boundary.
    Local(PrintTraceError),
}

impl From<PrintTraceError> for WorkerError {
    fn from(e: PrintTraceError) -> Self {
        Self::Local(e)
    }
}

/// Everything the worker needs, owned so it can cross into the blocking pool.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub kind: RequestKind,
    pub input: PathBuf,
    pub parameters: ProcessingParameters,
}

/// Run `job` against `engine`. `ctx` is dropped, and so released, when this
/// returns or unwinds.
pub(crate) fn run<E: ProcessingEngine + ?Sized>(
    engine: &E,
    job: &Job,
    ctx: ContextHandle,
) -> Result<ProcessingOutput, WorkerError> {
    checkpoint(&ctx)?;
    debug!(key = ctx.key(), kind = job.kind.name(), "calling engine");

    match &job.kind {
        RequestKind::ToContour => {
            let (code, contour) = engine.process_to_contour(&job.input, &job.parameters, &ctx);
            let contour = contour.map(|c| ContourGuard::new(engine, c));
            engine_result(code)?;
            checkpoint(&ctx)?;
            Ok(ProcessingOutput::Contour(measure(contour.as_deref(), &job.parameters)?))
        }
        RequestKind::ToDxf { output } => {
            let code = engine.process_to_dxf_file(&job.input, output, &job.parameters, &ctx);
            engine_result(code)?;
            // Only a successful call wrote the file; anything already at
            // `output` otherwise belongs to the user.
            if ctx.is_cancelled() {
                discard_output(output);
            }
            checkpoint(&ctx)?;
            info!(output = %output.display(), "DXF written");
            Ok(ProcessingOutput::Dxf { path: output.clone() })
        }
        RequestKind::ToStage(stage) => {
            let out = engine.process_to_stage(&job.input, &job.parameters, *stage, &ctx);
            let image = out.image.map(|b| ImageGuard::new(engine, b));
            let contour = out.contour.map(|c| ContourGuard::new(engine, c));
            engine_result(out.code)?;
            checkpoint(&ctx)?;

            let contour = match contour.as_deref() {
                Some(raw) => Some(raw.to_processed()?),
                None if stage.carries_contour() => Some(measure(None, &job.parameters)?),
                None => None,
            };
            Ok(ProcessingOutput::Stage {
                stage: *stage,
                image: image.as_deref().and_then(RawImageBuffer::to_dynamic_image),
                contour,
            })
        }
    }
}

fn checkpoint(ctx: &ContextHandle) -> Result<(), WorkerError> {
    if ctx.is_cancelled() {
        debug!(key = ctx.key(), "cancelled at checkpoint");
        return Err(PrintTraceError::Cancelled.into());
    }
    Ok(())
}

fn engine_result(code: ErrorCode) -> Result<(), WorkerError> {
    if code.is_success() {
        Ok(())
    } else {
        Err(WorkerError::Engine(code))
    }
}

/// A successful call may leave the contour buffer unpopulated when nothing
/// was traced; that measures as an empty contour.
fn measure(raw: Option<&RawContour>, parameters: &ProcessingParameters) -> Result<ProcessedContour, WorkerError> {
    let contour = match raw {
        Some(raw) => raw.to_processed()?,
        None => ProcessedContour::new(Vec::new(), parameters.pixels_per_mm())?,
    };
    Ok(contour)
}

fn discard_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "removed DXF from cancelled operation"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "failed to remove DXF from cancelled operation: {e}"),
    }
}
