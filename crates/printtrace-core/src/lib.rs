// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PrintTrace — Core types, error taxonomy, and contour geometry shared across
// all crates.

pub mod config;
pub mod error;
pub mod geometry;
pub mod human_errors;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorCode, PrintTraceError};
pub use geometry::{ContourMeasurements, Point, ProcessedContour, RectMm};
pub use types::*;
