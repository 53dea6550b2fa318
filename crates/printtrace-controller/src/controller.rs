// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-flight controller around a blocking processing engine.
//
// At most one operation runs at a time. Accepting a request is one
// check-and-set under the state lock. From then on the operation is driven by
// two tasks:
//
//   worker  (blocking pool)  binds a callback context, calls the engine,
//                            releases every buffer, drops the context
//   pump    (runtime)        drains the context's event channel in order,
//                            applies it to state, then resolves the operation
//
// Engine callbacks only send on the channel. The channel closes when the
// worker drops the context, so every progress update is applied before the
// terminal transition.

use std::future::{Future, IntoFuture};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use printtrace_bridge::{BridgeEvent, CallbackRegistry, ProcessingEngine};
use printtrace_core::error::{ErrorCode, PrintTraceError, Result};
use printtrace_core::types::{OperationId, ParameterRanges, ProcessingParameters, ProcessingProgress, RequestKind};

use crate::result::{ProcessingOutput, ProcessingResult};
use crate::state::OperationState;
use crate::worker::{self, Job, WorkerError};

/// Lifecycle notifications, delivered to every subscriber in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Started {
        operation_id: OperationId,
        kind: RequestKind,
    },
    Progress {
        operation_id: OperationId,
        progress: ProcessingProgress,
    },
    /// The engine's error callback fired. Informational only.
    EngineMessage {
        operation_id: OperationId,
        code: ErrorCode,
        message: String,
    },
    Completed {
        operation_id: OperationId,
        duration: Duration,
    },
    Failed {
        operation_id: OperationId,
        error: PrintTraceError,
    },
}

struct Inner {
    state: OperationState,
    /// Cancellation flag of the in-flight operation.
    cancel: Option<Arc<AtomicBool>>,
}

struct Shared {
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<UnboundedSender<ControllerEvent>>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send to every live subscriber, dropping the ones that hung up.
    ///
    /// Callers hold the state lock, so events of consecutive operations
    /// never interleave.
    fn publish(&self, event: ControllerEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Awaitable result of an accepted request.
#[must_use = "the operation runs regardless, but its result is only observable through the handle"]
pub struct OperationHandle {
    operation_id: OperationId,
    reply: oneshot::Receiver<Result<ProcessingResult>>,
}

impl OperationHandle {
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }
}

impl IntoFuture for OperationHandle {
    type Output = Result<ProcessingResult>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            self.reply.await.unwrap_or_else(|_| {
                Err(PrintTraceError::ProcessingFailed(
                    "operation ended without a result".into(),
                ))
            })
        })
    }
}

/// Single-flight async front end to a [`ProcessingEngine`].
pub struct ProcessingController<E: ProcessingEngine + ?Sized = dyn ProcessingEngine> {
    engine: Arc<E>,
    registry: Arc<CallbackRegistry>,
    shared: Arc<Shared>,
}

impl<E: ProcessingEngine + ?Sized> ProcessingController<E> {
    /// Controller dispatching engine callbacks through the process-wide
    /// registry, which is what the native trampolines reach.
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            registry: CallbackRegistry::global(),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: OperationState::default(),
                    cancel: None,
                }),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Start an operation.
    ///
    /// Fails with `AlreadyInProgress` if one is in flight (nothing changes),
    /// or `InvalidParameters` if `parameters` fall outside the engine's
    /// ranges. Otherwise the operation is running when this returns; await
    /// the handle for its result. Must be called within a Tokio runtime.
    #[instrument(skip(self, parameters), fields(input = %input.display()))]
    pub fn request(
        &self,
        kind: RequestKind,
        input: &Path,
        parameters: ProcessingParameters,
    ) -> Result<OperationHandle> {
        let runtime = Handle::try_current()
            .map_err(|e| PrintTraceError::ProcessingFailed(format!("no async runtime: {e}")))?;
        let ranges = self.engine.parameter_ranges();

        let operation_id = OperationId::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut inner = self.shared.lock();
            if inner.state.is_processing() {
                warn!("request refused, operation already in progress");
                return Err(PrintTraceError::AlreadyInProgress);
            }
            parameters.validate_against(&ranges)?;
            inner.state.try_begin(operation_id, kind.clone())?;
            inner.cancel = Some(Arc::clone(&cancelled));
            self.shared.publish(ControllerEvent::Started {
                operation_id,
                kind: kind.clone(),
            });
        }
        info!(%operation_id, kind = kind.name(), "operation accepted");

        let accepted = Instant::now();
        let (events_tx, events_rx) = unbounded_channel();
        let ctx = self.registry.bind(events_tx, cancelled);
        let job = Job {
            kind,
            input: input.to_path_buf(),
            parameters,
        };

        let engine = Arc::clone(&self.engine);
        let worker_job = job.clone();
        let worker = runtime.spawn_blocking(move || worker::run(&*engine, &worker_job, ctx));

        let (reply_tx, reply_rx) = oneshot::channel();
        runtime.spawn(pump(
            Arc::clone(&self.shared),
            Accepted {
                operation_id,
                parameters: job.parameters,
                at: accepted,
            },
            events_rx,
            worker,
            reply_tx,
        ));

        Ok(OperationHandle {
            operation_id,
            reply: reply_rx,
        })
    }

    /// [`request`](Self::request) and await the result.
    pub async fn process(
        &self,
        kind: RequestKind,
        input: &Path,
        parameters: ProcessingParameters,
    ) -> Result<ProcessingResult> {
        self.request(kind, input, parameters)?.await
    }

    /// Ask the in-flight operation to stop. Returns whether one was in flight.
    ///
    /// Best effort: the operation stops at the next checkpoint (before and
    /// after the engine call, and between stages for engines that poll the
    /// context). A native engine call already running is not interrupted;
    /// its result is discarded and its buffers released. Either way the
    /// operation resolves with `Cancelled`.
    pub fn cancel(&self) -> bool {
        let inner = self.shared.lock();
        match &inner.cancel {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                info!(operation_id = ?inner.state.operation_id(), "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Receive every [`ControllerEvent`] emitted from now on.
    pub fn subscribe(&self) -> UnboundedReceiver<ControllerEvent> {
        let (tx, rx) = unbounded_channel();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub fn state(&self) -> OperationState {
        self.shared.lock().state.clone()
    }

    pub fn is_processing(&self) -> bool {
        self.shared.lock().state.is_processing()
    }

    pub fn last_error(&self) -> Option<PrintTraceError> {
        self.shared.lock().state.last_error.clone()
    }

    // -- Engine pass-throughs --

    pub fn version(&self) -> String {
        self.engine.version()
    }

    pub fn parameter_ranges(&self) -> ParameterRanges {
        self.engine.parameter_ranges()
    }

    pub fn validate_parameters(&self, parameters: &ProcessingParameters) -> Result<()> {
        self.engine
            .validate_parameters(parameters)
            .map_err(|code| PrintTraceError::from_foreign(code, "parameters rejected by engine"))
    }

    pub fn is_valid_input_file(&self, path: &Path) -> bool {
        self.engine.is_valid_input_file(path)
    }

    pub fn estimate_processing_time(&self, path: &Path) -> Option<Duration> {
        self.engine.estimate_processing_time(path)
    }
}

struct Accepted {
    operation_id: OperationId,
    parameters: ProcessingParameters,
    at: Instant,
}

/// Apply bridge events to state until the worker releases its context, then
/// resolve the operation.
async fn pump(
    shared: Arc<Shared>,
    op: Accepted,
    mut events: UnboundedReceiver<BridgeEvent>,
    worker: JoinHandle<std::result::Result<ProcessingOutput, WorkerError>>,
    reply: oneshot::Sender<Result<ProcessingResult>>,
) {
    let operation_id = op.operation_id;
    let mut last_message: Option<String> = None;

    while let Some(event) = events.recv().await {
        match event {
            BridgeEvent::Progress { fraction, stage } => {
                let mut progress = ProcessingProgress::new(fraction, stage);
                progress.estimated_remaining = estimate_remaining(op.at.elapsed(), progress.fraction);

                let mut inner = shared.lock();
                if inner.state.record_progress(operation_id, progress.clone()) {
                    shared.publish(ControllerEvent::Progress { operation_id, progress });
                }
            }
            BridgeEvent::EngineMessage { code, message } => {
                debug!(%operation_id, %code, engine_message = %message, "engine reported an error");
                let _inner = shared.lock();
                shared.publish(ControllerEvent::EngineMessage {
                    operation_id,
                    code,
                    message: message.clone(),
                });
                last_message = Some(message);
            }
        }
    }

    let outcome = match worker.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(%operation_id, "worker did not complete: {e}");
            Err(WorkerError::Local(PrintTraceError::ProcessingFailed(format!(
                "worker did not complete: {e}"
            ))))
        }
    };

    let duration = op.at.elapsed();
    let result = outcome
        .map(|output| ProcessingResult {
            operation_id,
            output,
            duration,
            parameters: op.parameters,
            completed_at: Utc::now(),
        })
        .map_err(|e| match e {
            WorkerError::Engine(code) => {
                let message = last_message.unwrap_or_else(|| format!("engine returned code {code}"));
                PrintTraceError::from_foreign(code, &message)
            }
            WorkerError::Local(e) => e,
        });

    {
        let mut inner = shared.lock();
        inner.cancel = None;
        match &result {
            Ok(_) => {
                inner.state.finish(None);
                shared.publish(ControllerEvent::Completed { operation_id, duration });
                info!(%operation_id, ?duration, "operation completed");
            }
            Err(e) => {
                inner.state.finish(Some(e.clone()));
                shared.publish(ControllerEvent::Failed {
                    operation_id,
                    error: e.clone(),
                });
                warn!(%operation_id, "operation failed: {e}");
            }
        }
    }

    // The caller may have dropped the handle.
    let _ = reply.send(result);
}

/// Linear extrapolation from time spent so far.
fn estimate_remaining(elapsed: Duration, fraction: f64) -> Option<Duration> {
    if fraction <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(elapsed.as_secs_f64() * (1.0 - fraction) / fraction).ok()
}
