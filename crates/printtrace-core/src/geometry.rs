// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contour geometry — physical measurements of a traced outline.
//
// The engine returns points in pixel space of the perspective-corrected
// paper image together with its pixels-per-millimetre scale. Everything here
// converts to millimetres. A point sequence of two or more points is a closed
// polygon: the last point connects back to the first.

use serde::{Deserialize, Serialize};

use crate::error::{PrintTraceError, Result};

/// A 2D point in image coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(self, other: Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectMm {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectMm {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };
}

/// Derived measurements of a closed contour.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContourMeasurements {
    pub bounding_rect_mm: RectMm,
    pub area_mm2: f64,
    pub perimeter_mm: f64,
}

/// Compute bounding box, area and perimeter of `points` in millimetres.
///
/// Empty input yields all zeros. Fails with `InvalidScale` unless
/// `pixels_per_mm` is finite and positive, and with `InvalidGeometry` if any
/// coordinate is NaN or infinite.
pub fn compute(points: &[Point], pixels_per_mm: f64) -> Result<ContourMeasurements> {
    if !pixels_per_mm.is_finite() || pixels_per_mm <= 0.0 {
        return Err(PrintTraceError::InvalidScale(pixels_per_mm));
    }
    if let Some(index) = points.iter().position(|p| !p.is_finite()) {
        return Err(PrintTraceError::InvalidGeometry(format!(
            "non-finite coordinate at point {index}"
        )));
    }

    let Some(&first) = points.first() else {
        return Ok(ContourMeasurements::default());
    };

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    let mut twice_area = 0.0;
    let mut perimeter = 0.0;

    for (i, &p) in points.iter().enumerate() {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);

        // With a single point the wrap-around edge is that point to itself.
        let next = points[(i + 1) % points.len()];
        twice_area += p.x * next.y - next.x * p.y;
        perimeter += p.distance(next);
    }

    Ok(ContourMeasurements {
        bounding_rect_mm: RectMm {
            x: min_x / pixels_per_mm,
            y: min_y / pixels_per_mm,
            width: (max_x - min_x) / pixels_per_mm,
            height: (max_y - min_y) / pixels_per_mm,
        },
        area_mm2: twice_area.abs() / 2.0 / (pixels_per_mm * pixels_per_mm),
        perimeter_mm: perimeter / pixels_per_mm,
    })
}

/// A traced contour with its measurements computed once at construction.
///
/// Deserializing reads only the points and scale and goes through
/// [`ProcessedContour::new`], so stored measurements are never trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ContourSource")]
pub struct ProcessedContour {
    points: Vec<Point>,
    pixels_per_mm: f64,
    measurements: ContourMeasurements,
}

#[derive(Deserialize)]
struct ContourSource {
    points: Vec<Point>,
    pixels_per_mm: f64,
}

impl TryFrom<ContourSource> for ProcessedContour {
    type Error = PrintTraceError;

    fn try_from(source: ContourSource) -> Result<Self> {
        Self::new(source.points, source.pixels_per_mm)
    }
}

impl ProcessedContour {
    pub fn new(points: Vec<Point>, pixels_per_mm: f64) -> Result<Self> {
        let measurements = compute(&points, pixels_per_mm)?;
        Ok(Self {
            points,
            pixels_per_mm,
            measurements,
        })
    }

    /// Points in pixel space.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn pixels_per_mm(&self) -> f64 {
        self.pixels_per_mm
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn measurements(&self) -> ContourMeasurements {
        self.measurements
    }

    pub fn bounding_rect_mm(&self) -> RectMm {
        self.measurements.bounding_rect_mm
    }

    pub fn area_mm2(&self) -> f64 {
        self.measurements.area_mm2
    }

    pub fn perimeter_mm(&self) -> f64 {
        self.measurements.perimeter_mm
    }

    /// Points converted to millimetres, for CAD export.
    pub fn points_mm(&self) -> Vec<Point> {
        self.points
            .iter()
            .map(|p| Point::new(p.x / self.pixels_per_mm, p.y / self.pixels_per_mm))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 0.1;

    fn square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ]
    }

    #[test]
    fn square_measurements() {
        let m = compute(&square(), 10.0).unwrap();
        assert!((m.area_mm2 - 100.0).abs() < EPS);
        assert!((m.perimeter_mm - 40.0).abs() < EPS);
        assert!((m.bounding_rect_mm.width - 10.0).abs() < EPS);
        assert!((m.bounding_rect_mm.height - 10.0).abs() < EPS);
    }

    #[test]
    fn empty_is_all_zero() {
        let m = compute(&[], 10.0).unwrap();
        assert_eq!(m.bounding_rect_mm, RectMm::ZERO);
        assert_eq!(m.area_mm2, 0.0);
        assert_eq!(m.perimeter_mm, 0.0);
    }

    #[test]
    fn single_point_is_zero_size_rect_at_point() {
        let m = compute(&[Point::new(50.0, 20.0)], 10.0).unwrap();
        assert_eq!(
            m.bounding_rect_mm,
            RectMm {
                x: 5.0,
                y: 2.0,
                width: 0.0,
                height: 0.0
            }
        );
        assert_eq!(m.area_mm2, 0.0);
        assert_eq!(m.perimeter_mm, 0.0);
    }

    #[test]
    fn two_points_have_out_and_back_perimeter() {
        let m = compute(&[Point::new(0.0, 0.0), Point::new(30.0, 40.0)], 1.0).unwrap();
        assert_eq!(m.area_mm2, 0.0);
        assert!((m.perimeter_mm - 100.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_scale_is_an_error() {
        for ppm in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = compute(&square(), ppm).unwrap_err();
            assert!(matches!(err, PrintTraceError::InvalidScale(_)), "{ppm}");
        }
        // Even with nothing to measure.
        assert!(compute(&[], 0.0).is_err());
    }

    #[test]
    fn non_finite_point_is_an_error() {
        let mut pts = square();
        pts[2].y = f64::NAN;
        assert!(matches!(
            compute(&pts, 10.0),
            Err(PrintTraceError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn winding_order_does_not_matter() {
        let quad = vec![
            Point::new(12.5, 3.0),
            Point::new(250.0, 40.0),
            Point::new(90.0, 310.25),
            Point::new(-20.0, 120.0),
        ];
        let reversed: Vec<Point> = quad.iter().rev().copied().collect();

        let a = compute(&quad, 11.81).unwrap();
        let b = compute(&reversed, 11.81).unwrap();
        assert!((a.area_mm2 - b.area_mm2).abs() < 1e-9);
        assert!((a.perimeter_mm - b.perimeter_mm).abs() < 1e-9);
        assert_eq!(a.bounding_rect_mm, b.bounding_rect_mm);
    }

    #[test]
    fn deserializing_recomputes_measurements() {
        let json = r#"{
            "points": [{"x":0,"y":0},{"x":100,"y":0},{"x":100,"y":100},{"x":0,"y":100}],
            "pixels_per_mm": 10.0,
            "measurements": {
                "bounding_rect_mm": {"x":0,"y":0,"width":1,"height":1},
                "area_mm2": 12345.0,
                "perimeter_mm": 1.0
            }
        }"#;
        let contour: ProcessedContour = serde_json::from_str(json).unwrap();
        assert!((contour.area_mm2() - 100.0).abs() < 1e-9);
        assert!((contour.perimeter_mm() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn deserializing_rejects_invalid_scale() {
        let json = r#"{"points": [{"x":0,"y":0},{"x":1,"y":1}], "pixels_per_mm": 0.0}"#;
        assert!(serde_json::from_str::<ProcessedContour>(json).is_err());
    }

    #[test]
    fn serialized_contour_reads_back_equal() {
        let contour = ProcessedContour::new(square(), 10.0).unwrap();
        let json = serde_json::to_string(&contour).unwrap();
        assert_eq!(serde_json::from_str::<ProcessedContour>(&json).unwrap(), contour);
    }

    #[test]
    fn processed_contour_caches_measurements() {
        let contour = ProcessedContour::new(square(), 10.0).unwrap();
        assert!((contour.area_mm2() - 100.0).abs() < EPS);
        assert!((contour.perimeter_mm() - 40.0).abs() < EPS);
        assert_eq!(contour.points().len(), 4);
        assert_eq!(contour.points_mm()[2], Point::new(10.0, 10.0));
    }

    #[test]
    fn processed_contour_rejects_bad_scale() {
        assert!(ProcessedContour::new(square(), -2.0).is_err());
    }
}
