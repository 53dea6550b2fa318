// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine-owned output buffers and the guards that release them.
//
// `RawContour` and `RawImageBuffer` are laid out exactly as the C API fills
// them. Neither is `Clone`: the only way to release one is to move it into
// `ProcessingEngine::free_*`, so releasing twice does not type-check. The
// guards below make that release happen on every exit path of the worker.

use std::mem::ManuallyDrop;
use std::ops::Deref;

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use printtrace_core::error::Result;
use printtrace_core::geometry::{Point, ProcessedContour};

use crate::traits::ProcessingEngine;

/// One contour vertex as the engine writes it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
}

impl From<RawPoint> for Point {
    fn from(p: RawPoint) -> Self {
        Point::new(p.x, p.y)
    }
}

/// Contour buffer owned by the engine until released.
#[repr(C)]
#[derive(Debug)]
pub struct RawContour {
    points: *mut RawPoint,
    count: i32,
    pixels_per_mm: f64,
}

impl RawContour {
    /// An unpopulated contour, suitable as a C out-parameter.
    pub const fn empty() -> Self {
        Self {
            points: std::ptr::null_mut(),
            count: 0,
            pixels_per_mm: 0.0,
        }
    }

    /// Wrap a buffer allocated by Rust. Must be released with
    /// [`release_owned`](Self::release_owned).
    pub fn from_vec(mut points: Vec<RawPoint>, pixels_per_mm: f64) -> Self {
        // The C layout counts with an i32.
        points.truncate(i32::MAX as usize);
        let boxed = points.into_boxed_slice();
        let count = boxed.len() as i32;
        Self {
            points: Box::into_raw(boxed) as *mut RawPoint,
            count,
            pixels_per_mm,
        }
    }

    /// Free a contour created by [`from_vec`](Self::from_vec).
    ///
    /// # Safety
    ///
    /// `self` must have been produced by `from_vec`, not by a foreign
    /// allocator.
    pub unsafe fn release_owned(self) {
        if self.points.is_null() {
            return;
        }
        let slice = std::ptr::slice_from_raw_parts_mut(self.points, self.count.max(0) as usize);
        // SAFETY: per the contract above this is the pointer/length pair
        // `Box::into_raw` produced in `from_vec`.
        drop(unsafe { Box::from_raw(slice) });
    }

    /// Whether the engine wrote anything into this buffer.
    pub fn is_populated(&self) -> bool {
        !self.points.is_null()
    }

    pub fn points(&self) -> &[RawPoint] {
        if self.points.is_null() || self.count <= 0 {
            return &[];
        }
        // SAFETY: a populated contour points at `count` initialised
        // `RawPoint`s that stay valid until the contour is released, and
        // releasing consumes `self`.
        unsafe { std::slice::from_raw_parts(self.points, self.count as usize) }
    }

    pub fn pixels_per_mm(&self) -> f64 {
        self.pixels_per_mm
    }

    /// Copy the points out and compute the contour's measurements.
    pub fn to_processed(&self) -> Result<ProcessedContour> {
        let points = self.points().iter().copied().map(Point::from).collect();
        ProcessedContour::new(points, self.pixels_per_mm)
    }
}

/// Interleaved 8-bit pixel buffer owned by the engine until released.
#[repr(C)]
#[derive(Debug)]
pub struct RawImageBuffer {
    data: *mut u8,
    width: i32,
    height: i32,
    channels: i32,
}

impl RawImageBuffer {
    pub const fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            width: 0,
            height: 0,
            channels: 0,
        }
    }

    /// Wrap a buffer allocated by Rust. Must be released with
    /// [`release_owned`](Self::release_owned).
    ///
    /// `None` unless `data` holds exactly `width * height * channels` bytes,
    /// both sides fit the C layout's `i32`, and `channels` is 1 to 4.
    pub fn from_vec(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Option<Self> {
        let c_width = i32::try_from(width).ok()?;
        let c_height = i32::try_from(height).ok()?;
        if !(1..=4).contains(&channels) {
            return None;
        }
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(usize::from(channels))?;
        if data.len() != expected {
            return None;
        }
        let boxed = data.into_boxed_slice();
        Some(Self {
            data: Box::into_raw(boxed) as *mut u8,
            width: c_width,
            height: c_height,
            channels: i32::from(channels),
        })
    }

    /// Free a buffer created by [`from_vec`](Self::from_vec).
    ///
    /// # Safety
    ///
    /// `self` must have been produced by `from_vec`.
    pub unsafe fn release_owned(self) {
        if self.data.is_null() {
            return;
        }
        let slice = std::ptr::slice_from_raw_parts_mut(self.data, self.len());
        // SAFETY: pointer/length pair from `Box::into_raw` in `from_vec`.
        drop(unsafe { Box::from_raw(slice) });
    }

    pub fn is_populated(&self) -> bool {
        !self.data.is_null()
    }

    pub fn width(&self) -> u32 {
        self.width.max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.height.max(0) as u32
    }

    pub fn channels(&self) -> u8 {
        self.channels.clamp(0, 4) as u8
    }

    fn len(&self) -> usize {
        self.width() as usize * self.height() as usize * self.channels() as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        // SAFETY: a populated buffer holds width*height*channels bytes until
        // it is released, which consumes `self`.
        unsafe { std::slice::from_raw_parts(self.data, self.len()) }
    }

    /// Copy the pixels into an owned image. `None` for unsupported channel
    /// counts or an unpopulated buffer.
    pub fn to_dynamic_image(&self) -> Option<DynamicImage> {
        if !self.is_populated() {
            return None;
        }
        let (w, h, bytes) = (self.width(), self.height(), self.as_bytes().to_vec());
        match self.channels() {
            1 => GrayImage::from_raw(w, h, bytes).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgba8),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Release guards
// ---------------------------------------------------------------------------

/// Releases a contour through its engine when dropped.
pub struct ContourGuard<'e, E: ProcessingEngine + ?Sized> {
    engine: &'e E,
    contour: ManuallyDrop<RawContour>,
}

impl<'e, E: ProcessingEngine + ?Sized> ContourGuard<'e, E> {
    pub fn new(engine: &'e E, contour: RawContour) -> Self {
        Self {
            engine,
            contour: ManuallyDrop::new(contour),
        }
    }
}

impl<E: ProcessingEngine + ?Sized> Deref for ContourGuard<'_, E> {
    type Target = RawContour;

    fn deref(&self) -> &RawContour {
        &self.contour
    }
}

impl<E: ProcessingEngine + ?Sized> Drop for ContourGuard<'_, E> {
    fn drop(&mut self) {
        // SAFETY: `contour` is never touched again after this take.
        let contour = unsafe { ManuallyDrop::take(&mut self.contour) };
        self.engine.free_contour(contour);
    }
}

/// Releases an image buffer through its engine when dropped.
pub struct ImageGuard<'e, E: ProcessingEngine + ?Sized> {
    engine: &'e E,
    buffer: ManuallyDrop<RawImageBuffer>,
}

impl<'e, E: ProcessingEngine + ?Sized> ImageGuard<'e, E> {
    pub fn new(engine: &'e E, buffer: RawImageBuffer) -> Self {
        Self {
            engine,
            buffer: ManuallyDrop::new(buffer),
        }
    }
}

impl<E: ProcessingEngine + ?Sized> Deref for ImageGuard<'_, E> {
    type Target = RawImageBuffer;

    fn deref(&self) -> &RawImageBuffer {
        &self.buffer
    }
}

impl<E: ProcessingEngine + ?Sized> Drop for ImageGuard<'_, E> {
    fn drop(&mut self) {
        // SAFETY: `buffer` is never touched again after this take.
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        self.engine.free_image_buffer(buffer);
    }
}
