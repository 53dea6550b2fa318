// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Observable state of the controller.

use printtrace_core::error::{PrintTraceError, Result};
use printtrace_core::types::{OperationId, ProcessingProgress, RequestKind};

/// Whether an operation is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Processing {
        operation_id: OperationId,
        kind: RequestKind,
    },
}

/// Snapshot of the controller's state.
///
/// `progress` is only ever set while processing; `last_error` only after a
/// failed operation, and is cleared by the next accepted request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationState {
    pub phase: Phase,
    pub progress: Option<ProcessingProgress>,
    pub last_error: Option<PrintTraceError>,
}

impl OperationState {
    pub fn is_processing(&self) -> bool {
        matches!(self.phase, Phase::Processing { .. })
    }

    /// Id of the in-flight operation, if any.
    pub fn operation_id(&self) -> Option<OperationId> {
        match &self.phase {
            Phase::Processing { operation_id, .. } => Some(*operation_id),
            Phase::Idle => None,
        }
    }

    /// The single-flight check-and-set. Leaves `self` untouched on refusal.
    pub(crate) fn try_begin(&mut self, operation_id: OperationId, kind: RequestKind) -> Result<()> {
        if self.is_processing() {
            return Err(PrintTraceError::AlreadyInProgress);
        }
        self.phase = Phase::Processing { operation_id, kind };
        self.progress = None;
        self.last_error = None;
        Ok(())
    }

    /// Record progress for `operation_id`. Returns `false` (and changes
    /// nothing) if that operation is not the one in flight.
    pub(crate) fn record_progress(&mut self, operation_id: OperationId, progress: ProcessingProgress) -> bool {
        if self.operation_id() != Some(operation_id) {
            return false;
        }
        self.progress = Some(progress);
        true
    }

    /// Terminal transition back to idle.
    pub(crate) fn finish(&mut self, error: Option<PrintTraceError>) {
        self.phase = Phase::Idle;
        self.progress = None;
        self.last_error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_refused_without_mutation() {
        let mut state = OperationState::default();
        let first = OperationId::new();
        state.try_begin(first, RequestKind::ToContour).unwrap();
        state.record_progress(first, ProcessingProgress::new(0.4, "Detecting object"));

        let before = state.clone();
        let err = state.try_begin(OperationId::new(), RequestKind::ToContour).unwrap_err();
        assert_eq!(err, PrintTraceError::AlreadyInProgress);
        assert_eq!(state, before);
    }

    #[test]
    fn begin_clears_previous_error_and_progress() {
        let mut state = OperationState {
            last_error: Some(PrintTraceError::NoObjectDetected),
            ..Default::default()
        };
        state.try_begin(OperationId::new(), RequestKind::ToContour).unwrap();
        assert!(state.last_error.is_none());
        assert!(state.progress.is_none());
    }

    #[test]
    fn progress_for_stale_operation_is_ignored() {
        let mut state = OperationState::default();
        state.try_begin(OperationId::new(), RequestKind::ToContour).unwrap();
        assert!(!state.record_progress(OperationId::new(), ProcessingProgress::new(0.5, "x")));
        assert!(state.progress.is_none());
    }

    #[test]
    fn finish_returns_to_idle() {
        let mut state = OperationState::default();
        let id = OperationId::new();
        state.try_begin(id, RequestKind::ToContour).unwrap();
        state.record_progress(id, ProcessingProgress::new(1.0, "Finalizing"));
        state.finish(Some(PrintTraceError::Cancelled));

        assert_eq!(state.phase, Phase::Idle);
        assert!(state.progress.is_none());
        assert_eq!(state.last_error, Some(PrintTraceError::Cancelled));
    }
}
