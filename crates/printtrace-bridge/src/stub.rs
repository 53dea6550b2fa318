// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub engine for desktop/CI builds where the native PrintTrace library is
// not linked.
//
// It performs the checks that need no detector (file exists, decodes, is at
// least 100×100 px), walks the pipeline stages reporting progress, and
// honours cancellation between stages. It has no object detector: the traced
// outline is the image frame inset by a fixed margin, scaled into the warp
// resolution the parameters ask for.

use std::fmt::Write as _;
use std::path::Path;
use std::thread;
use std::time::Duration;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info, warn};

use printtrace_core::error::ErrorCode;
use printtrace_core::types::{ParameterRanges, PipelineStage, ProcessingParameters};

use crate::callback::ContextHandle;
use crate::raw::{RawContour, RawImageBuffer, RawPoint};
use crate::traits::{ProcessingEngine, StageOutput};

/// Smallest accepted image side, in pixels.
const MIN_IMAGE_SIDE: u32 = 100;

/// Fraction of each image side left between the frame and the outline.
const OUTLINE_INSET: f64 = 0.1;

/// Engine used when no native library is available.
#[derive(Debug, Clone)]
pub struct StubEngine {
    ranges: ParameterRanges,
    stage_delay: Duration,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            ranges: ParameterRanges::default(),
            stage_delay: Duration::ZERO,
        }
    }

    /// Sleep this long in every stage, to make progress observable.
    pub fn with_stage_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = delay;
        self
    }

    fn load(&self, input: &Path, ctx: &ContextHandle) -> Result<DynamicImage, ErrorCode> {
        if !input.exists() {
            return Err(fail(ctx, ErrorCode::FILE_NOT_FOUND, &format!("{} does not exist", input.display())));
        }
        let image = image::open(input)
            .map_err(|e| fail(ctx, ErrorCode::IMAGE_LOAD_FAILED, &format!("decode {}: {e}", input.display())))?;

        let (width, height) = image.dimensions();
        if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
            return Err(fail(
                ctx,
                ErrorCode::IMAGE_TOO_SMALL,
                &format!("{width}x{height} is below {MIN_IMAGE_SIDE}x{MIN_IMAGE_SIDE}"),
            ));
        }
        Ok(image)
    }

    /// Report progress for every stage up to and including `last`.
    fn run_stages(&self, last: PipelineStage, ctx: &ContextHandle) -> Result<(), ErrorCode> {
        let stages: Vec<PipelineStage> = PipelineStage::ALL.into_iter().filter(|s| *s <= last).collect();
        let total = stages.len() as f64;

        for (i, stage) in stages.into_iter().enumerate() {
            if ctx.is_cancelled() {
                debug!(%stage, "stub engine stopping at cancellation checkpoint");
                return Err(ErrorCode::CANCELLED);
            }
            if !self.stage_delay.is_zero() {
                thread::sleep(self.stage_delay);
            }
            ctx.report_progress((i + 1) as f64 / total, stage.label());
        }
        Ok(())
    }

    fn trace(
        &self,
        input: &Path,
        params: &ProcessingParameters,
        last: PipelineStage,
        ctx: &ContextHandle,
    ) -> Result<(DynamicImage, Vec<RawPoint>), ErrorCode> {
        if let Err(code) = self.validate_parameters(params) {
            return Err(fail(ctx, code, "parameters out of range"));
        }
        let image = self.load(input, ctx)?;
        self.run_stages(last, ctx)?;
        let outline = inset_outline(image.width(), image.height(), params.warp_size);
        Ok((image, outline))
    }
}

impl ProcessingEngine for StubEngine {
    fn version(&self) -> String {
        format!("stub-{}", env!("CARGO_PKG_VERSION"))
    }

    fn parameter_ranges(&self) -> ParameterRanges {
        self.ranges.clone()
    }

    fn validate_parameters(&self, params: &ProcessingParameters) -> Result<(), ErrorCode> {
        params
            .validate_against(&self.ranges)
            .map_err(|_| ErrorCode::INVALID_PARAMETERS)
    }

    fn is_valid_input_file(&self, path: &Path) -> bool {
        // Reads only the header.
        path.is_file() && image::image_dimensions(path).is_ok()
    }

    fn estimate_processing_time(&self, path: &Path) -> Option<Duration> {
        let (width, height) = image::image_dimensions(path).ok()?;
        let pixels = u64::from(width) * u64::from(height);
        Some(Duration::from_millis(50 + pixels / 100_000) + self.stage_delay * PipelineStage::ALL.len() as u32)
    }

    fn process_to_contour(
        &self,
        input: &Path,
        params: &ProcessingParameters,
        ctx: &ContextHandle,
    ) -> (ErrorCode, Option<RawContour>) {
        match self.trace(input, params, PipelineStage::Final, ctx) {
            Ok((_, outline)) => (
                ErrorCode::SUCCESS,
                Some(RawContour::from_vec(outline, params.pixels_per_mm())),
            ),
            Err(code) => (code, None),
        }
    }

    fn process_to_dxf_file(
        &self,
        input: &Path,
        output: &Path,
        params: &ProcessingParameters,
        ctx: &ContextHandle,
    ) -> ErrorCode {
        let outline = match self.trace(input, params, PipelineStage::Final, ctx) {
            Ok((_, outline)) => outline,
            Err(code) => return code,
        };
        let ppm = params.pixels_per_mm();
        let points_mm: Vec<(f64, f64)> = outline.iter().map(|p| (p.x / ppm, p.y / ppm)).collect();

        match std::fs::write(output, dxf_document(&points_mm)) {
            Ok(()) => {
                info!(output = %output.display(), "stub engine wrote DXF");
                ErrorCode::SUCCESS
            }
            Err(e) => fail(ctx, ErrorCode::OUTPUT_WRITE_FAILED, &format!("write {}: {e}", output.display())),
        }
    }

    fn process_to_stage(
        &self,
        input: &Path,
        params: &ProcessingParameters,
        stage: PipelineStage,
        ctx: &ContextHandle,
    ) -> StageOutput {
        let (image, outline) = match self.trace(input, params, stage, ctx) {
            Ok(traced) => traced,
            Err(code) => {
                return StageOutput {
                    code,
                    image: None,
                    contour: None,
                };
            }
        };

        // Decoded images always match their dimensions, so `None` only
        // means the image is too large for the C layout.
        let buffer = if stage == PipelineStage::Loaded {
            let rgba = image.to_rgba8();
            let (w, h) = rgba.dimensions();
            RawImageBuffer::from_vec(rgba.into_raw(), w, h, 4)
        } else {
            let gray = image.to_luma8();
            let (w, h) = gray.dimensions();
            RawImageBuffer::from_vec(gray.into_raw(), w, h, 1)
        };

        StageOutput {
            code: ErrorCode::SUCCESS,
            image: buffer,
            contour: stage
                .carries_contour()
                .then(|| RawContour::from_vec(outline, params.pixels_per_mm())),
        }
    }

    fn free_contour(&self, contour: RawContour) {
        // SAFETY: every contour this engine hands out comes from `from_vec`.
        unsafe { contour.release_owned() }
    }

    fn free_image_buffer(&self, buffer: RawImageBuffer) {
        // SAFETY: every buffer this engine hands out comes from `from_vec`.
        unsafe { buffer.release_owned() }
    }
}

/// Report `code` through the error callback, as the native engine does,
/// and hand it back for returning.
fn fail(ctx: &ContextHandle, code: ErrorCode, message: &str) -> ErrorCode {
    warn!(%code, engine_message = message, "stub engine failure");
    ctx.report_error(code, message);
    code
}

/// Inset frame of a `width`×`height` image, in warp-space pixels.
fn inset_outline(width: u32, height: u32, warp_size: i32) -> Vec<RawPoint> {
    let scale = f64::from(warp_size) / f64::from(width.max(height));
    let (w, h) = (f64::from(width) * scale, f64::from(height) * scale);
    let (x0, y0) = (w * OUTLINE_INSET, h * OUTLINE_INSET);
    let (x1, y1) = (w - x0, h - y0);
    vec![
        RawPoint { x: x0, y: y0 },
        RawPoint { x: x1, y: y0 },
        RawPoint { x: x1, y: y1 },
        RawPoint { x: x0, y: y1 },
    ]
}

/// Minimal DXF with one closed LWPOLYLINE, millimetre units, Y pointing up.
fn dxf_document(points_mm: &[(f64, f64)]) -> String {
    let max_y = points_mm.iter().map(|p| p.1).fold(0.0, f64::max);
    let mut out = String::new();

    // $INSUNITS 4 = millimetres.
    out.push_str("0\nSECTION\n2\nHEADER\n9\n$INSUNITS\n70\n4\n0\nENDSEC\n");
    out.push_str("0\nSECTION\n2\nENTITIES\n");
    let _ = write!(out, "0\nLWPOLYLINE\n8\n0\n90\n{}\n70\n1\n", points_mm.len());
    for (x, y) in points_mm {
        let _ = write!(out, "10\n{x:.4}\n20\n{:.4}\n", max_y - y);
    }
    out.push_str("0\nENDSEC\n0\nEOF\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{BridgeEvent, CallbackRegistry};
    use image::{GrayImage, Luma};
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        GrayImage::from_pixel(width, height, Luma([200u8]))
            .save(&path)
            .unwrap();
        path
    }

    fn context() -> (ContextHandle, UnboundedReceiver<BridgeEvent>, Arc<AtomicBool>) {
        let (tx, rx) = unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = Arc::new(CallbackRegistry::new()).bind(tx, Arc::clone(&cancelled));
        (handle, rx, cancelled)
    }

    #[test]
    fn contour_is_inset_frame_in_warp_space() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "photo.png", 200, 100);
        let engine = StubEngine::new();
        let params = ProcessingParameters::default();
        let (ctx, mut rx, _) = context();

        let (code, contour) = engine.process_to_contour(&input, &params, &ctx);
        assert_eq!(code, ErrorCode::SUCCESS);
        let contour = contour.unwrap();
        assert_eq!(contour.points().len(), 4);

        // 200 px wide image scaled to 3508 px, inset 10% on each side.
        let processed = contour.to_processed().unwrap();
        let rect = processed.bounding_rect_mm();
        assert!((rect.width - 0.8 * 297.0).abs() < 0.01);
        engine.free_contour(contour);

        let mut fractions = Vec::new();
        while let Ok(BridgeEvent::Progress { fraction, .. }) = rx.try_recv() {
            fractions.push(fraction);
        }
        assert_eq!(fractions.len(), PipelineStage::ALL.len());
        assert_eq!(fractions.last(), Some(&1.0));
    }

    #[test]
    fn missing_file_reports_and_returns_file_not_found() {
        let engine = StubEngine::new();
        let (ctx, mut rx, _) = context();
        let (code, contour) =
            engine.process_to_contour(Path::new("/nonexistent/photo.jpg"), &ProcessingParameters::default(), &ctx);
        assert_eq!(code, ErrorCode::FILE_NOT_FOUND);
        assert!(contour.is_none());
        assert!(matches!(
            rx.try_recv(),
            Ok(BridgeEvent::EngineMessage {
                code: ErrorCode::FILE_NOT_FOUND,
                ..
            })
        ));
    }

    #[test]
    fn tiny_image_is_too_small() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "tiny.png", 60, 300);
        let (ctx, _rx, _) = context();
        let (code, _) = StubEngine::new().process_to_contour(&input, &ProcessingParameters::default(), &ctx);
        assert_eq!(code, ErrorCode::IMAGE_TOO_SMALL);
    }

    #[test]
    fn undecodable_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.png");
        std::fs::write(&input, b"definitely not a png").unwrap();
        let engine = StubEngine::new();
        assert!(!engine.is_valid_input_file(&input));
        let (ctx, _rx, _) = context();
        let (code, _) = engine.process_to_contour(&input, &ProcessingParameters::default(), &ctx);
        assert_eq!(code, ErrorCode::IMAGE_LOAD_FAILED);
    }

    #[test]
    fn cancelled_context_stops_before_first_stage() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "photo.png", 150, 150);
        let (ctx, mut rx, cancelled) = context();
        cancelled.store(true, std::sync::atomic::Ordering::Release);

        let (code, contour) = StubEngine::new().process_to_contour(&input, &ProcessingParameters::default(), &ctx);
        assert_eq!(code, ErrorCode::CANCELLED);
        assert!(contour.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dxf_contains_section_and_entities() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "photo.png", 300, 200);
        let output = dir.path().join("outline.dxf");
        let (ctx, _rx, _) = context();

        let code = StubEngine::new().process_to_dxf_file(&input, &output, &ProcessingParameters::default(), &ctx);
        assert_eq!(code, ErrorCode::SUCCESS);

        let dxf = std::fs::read_to_string(&output).unwrap();
        assert!(dxf.contains("SECTION"));
        assert!(dxf.contains("ENTITIES"));
        assert!(dxf.contains("LWPOLYLINE"));
    }

    #[test]
    fn unwritable_dxf_path_is_output_write_failed() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "photo.png", 300, 200);
        let output = dir.path().join("missing-dir").join("outline.dxf");
        let (ctx, _rx, _) = context();
        let code = StubEngine::new().process_to_dxf_file(&input, &output, &ProcessingParameters::default(), &ctx);
        assert_eq!(code, ErrorCode::OUTPUT_WRITE_FAILED);
    }

    #[test]
    fn stage_output_only_final_has_contour() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "photo.png", 120, 160);
        let engine = StubEngine::new();
        let params = ProcessingParameters::default();

        let (ctx, _rx, _) = context();
        let loaded = engine.process_to_stage(&input, &params, PipelineStage::Loaded, &ctx);
        assert_eq!(loaded.code, ErrorCode::SUCCESS);
        assert!(loaded.contour.is_none());
        let image = loaded.image.unwrap();
        assert_eq!((image.width(), image.height(), image.channels()), (120, 160, 4));
        engine.free_image_buffer(image);

        let (ctx, _rx, _) = context();
        let last = engine.process_to_stage(&input, &params, PipelineStage::Final, &ctx);
        assert_eq!(last.image.as_ref().map(|i| i.channels()), Some(1));
        engine.free_contour(last.contour.unwrap());
        engine.free_image_buffer(last.image.unwrap());
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let engine = StubEngine::new();
        let params = ProcessingParameters {
            warp_size: 10,
            ..Default::default()
        };
        assert_eq!(engine.validate_parameters(&params), Err(ErrorCode::INVALID_PARAMETERS));
    }
}
