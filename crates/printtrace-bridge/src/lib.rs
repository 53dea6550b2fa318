// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printtrace-bridge — The boundary to the blocking, callback-driven image
// processing engine.
//
// Provides:
// - `ProcessingEngine`, the synchronous contract both engines implement
// - `NativeEngine` (feature `native`), linking the C library
// - `StubEngine`, a detector-less engine for desktop builds and CI
// - The callback registry that turns engine callbacks into channel messages

pub mod callback;
#[cfg(feature = "native")]
pub mod native;
pub mod raw;
pub mod stub;
pub mod traits;

use std::sync::Arc;

pub use callback::{BridgeEvent, CallbackRegistry, ContextHandle, ContextKey};
pub use raw::{ContourGuard, ImageGuard, RawContour, RawImageBuffer, RawPoint};
pub use stub::StubEngine;
pub use traits::{ProcessingEngine, StageOutput};

/// The engine this build links against: the native library when compiled
/// with `native`, the stub otherwise.
pub fn default_engine() -> Arc<dyn ProcessingEngine> {
    #[cfg(feature = "native")]
    {
        Arc::new(native::NativeEngine::new())
    }
    #[cfg(not(feature = "native"))]
    {
        tracing::info!("native engine not compiled in, using stub engine");
        Arc::new(StubEngine::new())
    }
}
