// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printtrace-controller — Single-flight async controller around the blocking
// PrintTrace engine.

pub mod controller;
pub mod result;
pub mod state;
mod worker;

pub use controller::{ControllerEvent, OperationHandle, ProcessingController};
pub use result::{ProcessingOutput, ProcessingResult};
pub use state::{OperationState, Phase};
