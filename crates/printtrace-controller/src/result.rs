// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// What a successful operation hands back.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::DynamicImage;

use printtrace_core::geometry::ProcessedContour;
use printtrace_core::types::{OperationId, PipelineStage, ProcessingParameters};

/// Output of one operation, by request kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutput {
    Contour(ProcessedContour),
    /// The DXF file the engine wrote.
    Dxf { path: PathBuf },
    /// Intermediate pipeline output. `contour` is only guaranteed at
    /// [`PipelineStage::Final`].
    Stage {
        stage: PipelineStage,
        image: Option<DynamicImage>,
        contour: Option<ProcessedContour>,
    },
}

impl ProcessingOutput {
    /// The measured contour, if this output carries one.
    pub fn contour(&self) -> Option<&ProcessedContour> {
        match self {
            Self::Contour(contour) => Some(contour),
            Self::Stage { contour, .. } => contour.as_ref(),
            Self::Dxf { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    pub operation_id: OperationId,
    pub output: ProcessingOutput,
    /// Wall-clock time from acceptance to completion.
    pub duration: Duration,
    pub parameters: ProcessingParameters,
    pub completed_at: DateTime<Utc>,
}
