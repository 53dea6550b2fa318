// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Callback bridge between the engine's progress/error callbacks and the
// controller that issued the call.
//
// The engine calls back on a thread of its choosing with nothing but an
// opaque `void *` for context. Rather than handing it a pointer to live Rust
// state, we hand it a key into a registry of live operation contexts. Each
// entry holds a channel sender to the owning controller; callbacks only ever
// send on that channel, and all state changes happen on the controller side.
//
// The registry entry is owned by exactly one `ContextHandle`. Dropping the
// handle is the only way to release the entry, so a released context can't be
// released again, and a callback arriving for a released (or never issued)
// key is a no-op.

use std::collections::HashMap;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

use printtrace_core::error::ErrorCode;

/// Key identifying one live callback context. Never zero.
///
/// Pointer-sized so it survives the round trip through `void *` intact on
/// every target.
pub type ContextKey = usize;

/// Update relayed from the engine to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Progress in `[0.0, 1.0]` (already clamped).
    Progress { fraction: f64, stage: String },
    /// The engine's error callback fired. Informational: the call's return
    /// code is what decides success or failure.
    EngineMessage { code: ErrorCode, message: String },
}

struct LiveContext {
    events: UnboundedSender<BridgeEvent>,
}

/// Table of live callback contexts, keyed by [`ContextKey`].
pub struct CallbackRegistry {
    next_key: AtomicUsize,
    live: Mutex<HashMap<ContextKey, LiveContext>>,
}

static GLOBAL: LazyLock<Arc<CallbackRegistry>> = LazyLock::new(|| Arc::new(CallbackRegistry::new()));

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            next_key: AtomicUsize::new(1),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry the `extern "C"` trampolines dispatch into.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Register a new context whose updates go to `events`.
    ///
    /// `cancelled` is the operation's cancellation flag, exposed to
    /// cooperative engines through [`ContextHandle::is_cancelled`].
    pub fn bind(
        self: &Arc<Self>,
        events: UnboundedSender<BridgeEvent>,
        cancelled: Arc<AtomicBool>,
    ) -> ContextHandle {
        let key = self.allocate_key();
        self.lock().insert(key, LiveContext { events });
        debug!(key, "callback context bound");
        ContextHandle {
            key,
            registry: Arc::clone(self),
            cancelled,
        }
    }

    /// Relay a progress update for `key`.
    ///
    /// Out-of-range fractions are clamped into `[0, 1]`; NaN is dropped.
    pub fn on_progress(&self, key: ContextKey, fraction: f64, stage: &str) {
        if fraction.is_nan() {
            warn!(key, stage, "engine reported NaN progress, dropped");
            return;
        }
        let clamped = fraction.clamp(0.0, 1.0);
        if clamped != fraction {
            debug!(key, fraction, "engine progress out of range, clamped");
        }
        trace!(key, fraction = clamped, stage, "engine progress");
        self.send(
            key,
            BridgeEvent::Progress {
                fraction: clamped,
                stage: stage.to_owned(),
            },
        );
    }

    /// Relay the engine's error callback for `key`. Never resolves the
    /// operation.
    pub fn on_error(&self, key: ContextKey, code: ErrorCode, message: &str) {
        debug!(key, %code, engine_message = message, "engine error callback");
        self.send(
            key,
            BridgeEvent::EngineMessage {
                code,
                message: message.to_owned(),
            },
        );
    }

    /// Number of contexts currently bound.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_live(&self, key: ContextKey) -> bool {
        self.lock().contains_key(&key)
    }

    /// Next non-zero key. The counter wraps, skipping zero; a key is only
    /// reused after `usize::MAX` further binds.
    fn allocate_key(&self) -> ContextKey {
        loop {
            let key = self.next_key.fetch_add(1, Ordering::Relaxed);
            if key != 0 {
                return key;
            }
        }
    }

    fn send(&self, key: ContextKey, event: BridgeEvent) {
        // Clone the sender so the lock is not held while sending.
        let Some(events) = self.lock().get(&key).map(|ctx| ctx.events.clone()) else {
            trace!(key, "callback for released context ignored");
            return;
        };
        if events.send(event).is_err() {
            trace!(key, "controller gone, callback ignored");
        }
    }

    fn release(&self, key: ContextKey) {
        if self.lock().remove(&key).is_some() {
            debug!(key, "callback context released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContextKey, LiveContext>> {
        // A panic while holding the lock can't leave the map inconsistent.
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Sole owner of one registry entry. Dropping it releases the entry.
///
/// Engines receive it by reference for the duration of one call; it is not
/// `Clone`, so nothing can hold on to it past the worker scope that created
/// it.
pub struct ContextHandle {
    key: ContextKey,
    registry: Arc<CallbackRegistry>,
    cancelled: Arc<AtomicBool>,
}

impl ContextHandle {
    pub fn key(&self) -> ContextKey {
        self.key
    }

    /// The value to pass as the C API's `user_data`.
    pub fn user_data(&self) -> *mut c_void {
        self.key as *mut c_void
    }

    pub fn report_progress(&self, fraction: f64, stage: &str) {
        self.registry.on_progress(self.key, fraction, stage);
    }

    pub fn report_error(&self, code: ErrorCode, message: &str) {
        self.registry.on_error(self.key, code, message);
    }

    /// Whether the controller asked for this operation to stop.
    ///
    /// Only engines that poll this can stop early; a blocking native call
    /// runs to completion regardless.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether this handle dispatches through the global registry (and so
    /// can be reached from the `extern "C"` trampolines).
    pub fn is_global(&self) -> bool {
        Arc::ptr_eq(&self.registry, &GLOBAL)
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.registry.release(self.key);
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("key", &self.key)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// C trampolines
// ---------------------------------------------------------------------------

fn key_from_user_data(user_data: *mut c_void) -> Option<ContextKey> {
    match user_data as ContextKey {
        0 => None,
        key => Some(key),
    }
}

/// Copy a nullable C string into an owned `String`, replacing invalid UTF-8.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for the
/// duration of the call.
unsafe fn lossy_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: non-null and NUL-terminated per the contract above.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Progress callback handed to the C API.
///
/// # Safety
///
/// `stage` must be null or a valid NUL-terminated string for the duration
/// of the call. `user_data` is only interpreted as a registry key.
pub unsafe extern "C" fn progress_trampoline(progress: f64, stage: *const c_char, user_data: *mut c_void) {
    let Some(key) = key_from_user_data(user_data) else {
        return;
    };
    // SAFETY: forwarded from this function's contract.
    let stage = unsafe { lossy_string(stage) };
    // Unwinding into C is undefined behaviour.
    let outcome = std::panic::catch_unwind(|| GLOBAL.on_progress(key, progress, &stage));
    if outcome.is_err() {
        warn!(key, "panic in progress callback suppressed at FFI boundary");
    }
}

/// Error callback handed to the C API.
///
/// # Safety
///
/// `message` must be null or a valid NUL-terminated string for the duration
/// of the call. `user_data` is only interpreted as a registry key.
pub unsafe extern "C" fn error_trampoline(code: c_int, message: *const c_char, user_data: *mut c_void) {
    let Some(key) = key_from_user_data(user_data) else {
        return;
    };
    // SAFETY: forwarded from this function's contract.
    let message = unsafe { lossy_string(message) };
    let outcome = std::panic::catch_unwind(|| GLOBAL.on_error(key, ErrorCode(code), &message));
    if outcome.is_err() {
        warn!(key, "panic in error callback suppressed at FFI boundary");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use tokio::sync::mpsc::unbounded_channel;

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn progress_is_forwarded_in_order_and_clamped() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, mut rx) = unbounded_channel();
        let handle = registry.bind(tx, flag());

        handle.report_progress(0.25, "Cropping to paper");
        handle.report_progress(1.5, "Finalizing");
        handle.report_progress(-3.0, "Loading image");
        handle.report_progress(f64::NAN, "bogus");

        let fractions: Vec<f64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| match event {
                BridgeEvent::Progress { fraction, .. } => fraction,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(fractions, vec![0.25, 1.0, 0.0]);
    }

    #[test]
    fn drop_releases_exactly_once() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, _rx) = unbounded_channel();
        let handle = registry.bind(tx, flag());
        let key = handle.key();
        assert!(registry.is_live(key));
        assert_eq!(registry.live_count(), 1);

        drop(handle);
        assert!(!registry.is_live(key));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn callbacks_after_release_are_ignored() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, mut rx) = unbounded_channel();
        let key = registry.bind(tx, flag()).key();

        registry.on_progress(key, 0.5, "late");
        registry.on_error(key, ErrorCode::PROCESSING_FAILED, "late");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_controller_channel_does_not_panic() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, rx) = unbounded_channel();
        let handle = registry.bind(tx, flag());
        drop(rx);
        handle.report_progress(0.5, "orphaned");
        handle.report_error(ErrorCode::INVALID_INPUT, "orphaned");
    }

    #[test]
    fn keys_are_unique_and_non_zero() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, _rx) = unbounded_channel();
        let a = registry.bind(tx.clone(), flag());
        let b = registry.bind(tx, flag());
        assert_ne!(a.key(), 0);
        assert_ne!(a.key(), b.key());
        assert!(!a.is_global());
    }

    #[test]
    fn key_counter_wraps_past_zero() {
        let registry = Arc::new(CallbackRegistry::new());
        registry.next_key.store(usize::MAX, Ordering::Relaxed);
        let (tx, _rx) = unbounded_channel();
        let last = registry.bind(tx.clone(), flag());
        let wrapped = registry.bind(tx, flag());
        assert_eq!(last.key(), usize::MAX);
        assert_eq!(wrapped.key(), 1);
    }

    #[test]
    fn user_data_round_trips_the_key() {
        let registry = Arc::new(CallbackRegistry::new());
        registry.next_key.store(usize::MAX - 1, Ordering::Relaxed);
        let (tx, _rx) = unbounded_channel();
        let handle = registry.bind(tx, flag());
        assert_eq!(key_from_user_data(handle.user_data()), Some(handle.key()));
        assert_eq!(key_from_user_data(std::ptr::null_mut()), None);
    }

    #[test]
    fn cancellation_flag_is_visible_through_handle() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, _rx) = unbounded_channel();
        let cancelled = flag();
        let handle = registry.bind(tx, Arc::clone(&cancelled));
        assert!(!handle.is_cancelled());
        cancelled.store(true, Ordering::Release);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn trampolines_dispatch_through_global_registry() {
        let registry = CallbackRegistry::global();
        let (tx, mut rx) = unbounded_channel();
        let handle = registry.bind(tx, flag());
        assert!(handle.is_global());

        let stage = CString::new("Detecting object").unwrap();
        let message = CString::new("low contrast").unwrap();
        unsafe {
            progress_trampoline(0.4, stage.as_ptr(), handle.user_data());
            error_trampoline(7, message.as_ptr(), handle.user_data());
            progress_trampoline(0.9, std::ptr::null(), handle.user_data());
            // Null user data is never a live key.
            progress_trampoline(0.1, stage.as_ptr(), std::ptr::null_mut());
        }

        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeEvent::Progress {
                fraction: 0.4,
                stage: "Detecting object".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeEvent::EngineMessage {
                code: ErrorCode::NO_OBJECT_DETECTED,
                message: "low contrast".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeEvent::Progress {
                fraction: 0.9,
                stage: String::new()
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
