// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for PrintTrace.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PrintTraceError, Result};

/// Unique identifier for one processing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Intermediate steps of the engine's pipeline, in execution order.
///
/// Discriminants are the values the engine expects across the C boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum PipelineStage {
    Loaded = 0,
    Cropped = 1,
    Normalized = 2,
    BoundaryDetected = 3,
    ObjectDetected = 4,
    Smoothed = 5,
    Dilated = 6,
    Final = 7,
}

impl PipelineStage {
    pub const ALL: [Self; 8] = [
        Self::Loaded,
        Self::Cropped,
        Self::Normalized,
        Self::BoundaryDetected,
        Self::ObjectDetected,
        Self::Smoothed,
        Self::Dilated,
        Self::Final,
    ];

    /// Label used in progress updates.
    pub fn label(self) -> &'static str {
        match self {
            Self::Loaded => "Loading image",
            Self::Cropped => "Cropping to paper",
            Self::Normalized => "Normalizing lighting",
            Self::BoundaryDetected => "Detecting paper boundary",
            Self::ObjectDetected => "Detecting object",
            Self::Smoothed => "Smoothing contour",
            Self::Dilated => "Dilating contour",
            Self::Final => "Finalizing",
        }
    }

    /// Whether the engine guarantees a contour at this stage.
    pub fn carries_contour(self) -> bool {
        self == Self::Final
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a processing request should produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// Trace the object and return its contour.
    ToContour,
    /// Trace the object and write the outline as a DXF file.
    ToDxf { output: PathBuf },
    /// Run the pipeline up to the given stage and return its intermediate output.
    ToStage(PipelineStage),
}

impl RequestKind {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ToContour => "contour",
            Self::ToDxf { .. } => "dxf",
            Self::ToStage(_) => "stage",
        }
    }
}

/// One progress update for an in-flight operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    /// Completion in `[0.0, 1.0]`.
    pub fraction: f64,
    /// Human-readable pipeline stage.
    pub stage: String,
    /// Estimated time until completion, once enough progress exists to guess.
    pub estimated_remaining: Option<Duration>,
}

impl ProcessingProgress {
    pub fn new(fraction: f64, stage: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            stage: stage.into(),
            estimated_remaining: None,
        }
    }

    /// Percentage complete (0–100) for display. `fraction` is public, so
    /// it is clamped again here.
    pub fn percent(&self) -> u8 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Named parameter presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Preset {
    #[default]
    Default,
    /// Sub-pixel refinement and light smoothing for tight-fitting inserts.
    HighPrecision,
    /// Lower resolution warp and no refinement, for quick previews.
    Fast,
}

/// Tunables handed to the engine for one request.
///
/// Treated as immutable once a request has been made: the controller takes
/// it by value and hands the same value back in the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingParameters {
    /// Long side of the perspective-corrected paper image, in pixels.
    pub warp_size: i32,
    /// Physical length of the paper's long side, in millimetres.
    pub real_world_size_mm: f64,

    pub canny_lower: f64,
    pub canny_upper: f64,
    /// Sobel aperture for Canny; odd.
    pub canny_aperture: i32,

    pub clahe_clip_limit: f64,
    pub clahe_tile_size: i32,
    /// Gaussian blur kernel size; odd.
    pub blur_size: i32,

    pub enable_morphology: bool,
    pub morph_kernel_size: i32,
    /// Distance (px) under which neighbouring contours are merged.
    pub contour_merge_distance: f64,

    pub enable_subpixel_refinement: bool,
    pub subpixel_window_size: i32,
    /// Polygon approximation epsilon as a fraction of the perimeter.
    pub polygon_epsilon_factor: f64,

    pub enable_smoothing: bool,
    pub smoothing_amount_mm: f64,
    /// Outward offset applied to the final outline, in millimetres.
    pub dilation_amount_mm: f64,

    pub enable_debug_output: bool,
}

impl Default for ProcessingParameters {
    fn default() -> Self {
        Self::from_preset(Preset::Default)
    }
}

impl ProcessingParameters {
    /// Parameters for a named preset.
    pub fn from_preset(preset: Preset) -> Self {
        // A4 long side at 300 DPI.
        let base = Self {
            warp_size: 3508,
            real_world_size_mm: 297.0,
            canny_lower: 50.0,
            canny_upper: 150.0,
            canny_aperture: 3,
            clahe_clip_limit: 2.0,
            clahe_tile_size: 8,
            blur_size: 5,
            enable_morphology: true,
            morph_kernel_size: 5,
            contour_merge_distance: 5.0,
            enable_subpixel_refinement: true,
            subpixel_window_size: 5,
            polygon_epsilon_factor: 0.0005,
            enable_smoothing: true,
            smoothing_amount_mm: 0.2,
            dilation_amount_mm: 0.0,
            enable_debug_output: false,
        };

        match preset {
            Preset::Default => base,
            Preset::HighPrecision => Self {
                subpixel_window_size: 7,
                polygon_epsilon_factor: 0.0002,
                smoothing_amount_mm: 0.1,
                ..base
            },
            Preset::Fast => Self {
                warp_size: 1754,
                enable_subpixel_refinement: false,
                enable_smoothing: false,
                polygon_epsilon_factor: 0.001,
                ..base
            },
        }
    }

    /// Scale of the warped image.
    pub fn pixels_per_mm(&self) -> f64 {
        f64::from(self.warp_size) / self.real_world_size_mm
    }

    /// Check every tunable against `ranges`, reporting the first violation.
    ///
    /// Also enforces the constraints that are not plain ranges: Canny
    /// thresholds must be ordered and kernel sizes odd.
    pub fn validate_against(&self, ranges: &ParameterRanges) -> Result<()> {
        ranges.warp_size.check("warp_size", self.warp_size)?;
        ranges.real_world_size_mm.check("real_world_size_mm", self.real_world_size_mm)?;
        ranges.canny_lower.check("canny_lower", self.canny_lower)?;
        ranges.canny_upper.check("canny_upper", self.canny_upper)?;
        ranges.canny_aperture.check("canny_aperture", self.canny_aperture)?;
        ranges.clahe_clip_limit.check("clahe_clip_limit", self.clahe_clip_limit)?;
        ranges.clahe_tile_size.check("clahe_tile_size", self.clahe_tile_size)?;
        ranges.blur_size.check("blur_size", self.blur_size)?;
        ranges.morph_kernel_size.check("morph_kernel_size", self.morph_kernel_size)?;
        ranges
            .contour_merge_distance
            .check("contour_merge_distance", self.contour_merge_distance)?;
        ranges
            .subpixel_window_size
            .check("subpixel_window_size", self.subpixel_window_size)?;
        ranges
            .polygon_epsilon_factor
            .check("polygon_epsilon_factor", self.polygon_epsilon_factor)?;
        ranges.smoothing_amount_mm.check("smoothing_amount_mm", self.smoothing_amount_mm)?;
        ranges.dilation_amount_mm.check("dilation_amount_mm", self.dilation_amount_mm)?;

        if self.canny_lower >= self.canny_upper {
            return Err(PrintTraceError::InvalidParameters(format!(
                "canny_lower ({}) must be below canny_upper ({})",
                self.canny_lower, self.canny_upper
            )));
        }
        for (name, value) in [
            ("canny_aperture", self.canny_aperture),
            ("blur_size", self.blur_size),
        ] {
            if value % 2 == 0 {
                return Err(PrintTraceError::InvalidParameters(format!(
                    "{name} must be odd, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Inclusive bounds for one tunable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy + fmt::Display> ParamRange<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// NaN is never contained.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }

    fn check(&self, name: &str, value: T) -> Result<()> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(PrintTraceError::InvalidParameters(format!(
                "{name} = {value} is outside [{}, {}]",
                self.min, self.max
            )))
        }
    }
}

/// Snapshot of the engine's currently valid bounds for each tunable.
///
/// Queried from the engine rather than hardcoded; [`Default`] holds the
/// bounds the stub engine reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRanges {
    pub warp_size: ParamRange<i32>,
    pub real_world_size_mm: ParamRange<f64>,
    pub canny_lower: ParamRange<f64>,
    pub canny_upper: ParamRange<f64>,
    pub canny_aperture: ParamRange<i32>,
    pub clahe_clip_limit: ParamRange<f64>,
    pub clahe_tile_size: ParamRange<i32>,
    pub blur_size: ParamRange<i32>,
    pub morph_kernel_size: ParamRange<i32>,
    pub contour_merge_distance: ParamRange<f64>,
    pub subpixel_window_size: ParamRange<i32>,
    pub polygon_epsilon_factor: ParamRange<f64>,
    pub smoothing_amount_mm: ParamRange<f64>,
    pub dilation_amount_mm: ParamRange<f64>,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            warp_size: ParamRange::new(500, 8000),
            real_world_size_mm: ParamRange::new(50.0, 1500.0),
            canny_lower: ParamRange::new(0.0, 255.0),
            canny_upper: ParamRange::new(0.0, 255.0),
            canny_aperture: ParamRange::new(3, 7),
            clahe_clip_limit: ParamRange::new(0.1, 40.0),
            clahe_tile_size: ParamRange::new(2, 32),
            blur_size: ParamRange::new(1, 31),
            morph_kernel_size: ParamRange::new(1, 21),
            contour_merge_distance: ParamRange::new(0.0, 50.0),
            subpixel_window_size: ParamRange::new(3, 21),
            polygon_epsilon_factor: ParamRange::new(0.0, 0.05),
            smoothing_amount_mm: ParamRange::new(0.0, 5.0),
            dilation_amount_mm: ParamRange::new(0.0, 20.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_stays_within_bounds() {
        let mut progress = ProcessingProgress::new(0.456, "Detecting object");
        assert_eq!(progress.percent(), 46);
        progress.fraction = 7.5;
        assert_eq!(progress.percent(), 100);
        progress.fraction = -2.0;
        assert_eq!(progress.percent(), 0);
    }

    #[test]
    fn presets_validate_against_default_ranges() {
        let ranges = ParameterRanges::default();
        for preset in [Preset::Default, Preset::HighPrecision, Preset::Fast] {
            ProcessingParameters::from_preset(preset)
                .validate_against(&ranges)
                .unwrap_or_else(|e| panic!("{preset:?} rejected: {e}"));
        }
    }

    #[test]
    fn out_of_range_value_names_the_parameter() {
        let params = ProcessingParameters {
            clahe_tile_size: 100,
            ..Default::default()
        };
        let err = params.validate_against(&ParameterRanges::default()).unwrap_err();
        match err {
            PrintTraceError::InvalidParameters(msg) => assert!(msg.contains("clahe_tile_size")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nan_is_rejected() {
        let params = ProcessingParameters {
            real_world_size_mm: f64::NAN,
            ..Default::default()
        };
        assert!(params.validate_against(&ParameterRanges::default()).is_err());
    }

    #[test]
    fn canny_thresholds_must_be_ordered() {
        let params = ProcessingParameters {
            canny_lower: 200.0,
            canny_upper: 100.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate_against(&ParameterRanges::default()),
            Err(PrintTraceError::InvalidParameters(_))
        ));
    }

    #[test]
    fn even_kernel_is_rejected() {
        let params = ProcessingParameters {
            blur_size: 4,
            ..Default::default()
        };
        assert!(params.validate_against(&ParameterRanges::default()).is_err());
    }

    #[test]
    fn default_scale_is_a4_at_300_dpi() {
        let ppm = ProcessingParameters::default().pixels_per_mm();
        assert!((ppm - 11.811).abs() < 0.01);
    }

    #[test]
    fn stages_are_ordered_and_only_final_carries_contour() {
        assert!(PipelineStage::ALL.windows(2).all(|w| w[0] < w[1]));
        let carrying: Vec<_> = PipelineStage::ALL
            .iter()
            .filter(|s| s.carries_contour())
            .collect();
        assert_eq!(carrying, vec![&PipelineStage::Final]);
        assert_eq!(PipelineStage::Final.as_raw(), 7);
    }

    #[test]
    fn progress_is_clamped_on_construction() {
        assert_eq!(ProcessingProgress::new(1.7, "x").fraction, 1.0);
        assert_eq!(ProcessingProgress::new(-0.2, "x").fraction, 0.0);
        assert_eq!(ProcessingProgress::new(0.456, "x").percent(), 46);
    }
}
