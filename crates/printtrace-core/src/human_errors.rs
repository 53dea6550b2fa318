// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages.
//
// Every taxonomy member is mapped to a short plain-English explanation and,
// where the user can do something about it, a recovery suggestion. Severity
// drives UI presentation.

use crate::error::PrintTraceError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Trying again as-is may succeed.
    Transient,
    /// The user must change something (photo, paper, parameters).
    ActionRequired,
    /// Cannot be fixed by retrying or adjusting input.
    Permanent,
}

/// A human-readable error with an optional recovery suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Short summary (shown as a heading).
    pub message: String,
    /// What the user should try, if anything is actionable.
    pub suggestion: Option<String>,
    /// Whether retrying the same request can help.
    pub retriable: bool,
    /// Severity level (drives icon/colour in UI).
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: Option<&str>, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.map(Into::into),
            retriable,
            severity,
        }
    }
}

/// Convert a `PrintTraceError` into something a user can act on.
pub fn humanize_error(err: &PrintTraceError) -> HumanError {
    use Severity::*;

    match err {
        PrintTraceError::InvalidInput => HumanError::new(
            "The input could not be used.",
            Some("Choose a photo file (JPEG or PNG) and try again."),
            false,
            ActionRequired,
        ),

        PrintTraceError::FileNotFound => HumanError::new(
            "The image file couldn't be found.",
            Some("It may have been moved or deleted. Choose the file again."),
            false,
            ActionRequired,
        ),

        PrintTraceError::ImageLoadFailed => HumanError::new(
            "The image couldn't be opened.",
            Some("The file may be damaged or in an unusual format. Save it as a JPEG or PNG first."),
            false,
            ActionRequired,
        ),

        PrintTraceError::ImageTooSmall => HumanError::new(
            "The image is too small.",
            Some("Use a photo of at least 100×100 px. A full-resolution camera photo works best."),
            false,
            ActionRequired,
        ),

        PrintTraceError::NoContoursFound => HumanError::new(
            "No outlines were found in the photo.",
            Some("Make sure the object contrasts with the paper and the photo is in focus."),
            false,
            ActionRequired,
        ),

        PrintTraceError::NoBoundaryDetected => HumanError::new(
            "The paper edges couldn't be found.",
            Some("Photograph the whole sheet on a darker background so all four corners are visible."),
            false,
            ActionRequired,
        ),

        PrintTraceError::NoObjectDetected => HumanError::new(
            "No object was found on the paper.",
            Some("Place the object fully inside the sheet, away from the edges, and avoid strong shadows."),
            false,
            ActionRequired,
        ),

        PrintTraceError::OutputWriteFailed => HumanError::new(
            "The output file couldn't be written.",
            Some("Check that the destination folder exists and has free space, then try again."),
            true,
            Transient,
        ),

        PrintTraceError::InvalidParameters(_) => HumanError::new(
            "Some processing settings are out of range.",
            Some("Reset the settings to a preset and try again."),
            false,
            ActionRequired,
        ),

        PrintTraceError::ProcessingFailed(_) => HumanError::new(
            "Processing failed.",
            Some("Try again. If this keeps happening, try a different photo."),
            true,
            Transient,
        ),

        PrintTraceError::AlreadyInProgress => HumanError::new(
            "A photo is already being processed.",
            Some("Wait for the current run to finish, or cancel it first."),
            true,
            Transient,
        ),

        PrintTraceError::Cancelled => {
            HumanError::new("Processing was cancelled.", None, true, Transient)
        }

        // The engine's own text is the most useful thing we have here.
        PrintTraceError::Unknown(detail) => HumanError {
            message: "Something unexpected went wrong.".into(),
            suggestion: Some(format!("Try again. If this keeps happening, please report it. (Detail: {detail})")),
            retriable: true,
            severity: Transient,
        },

        PrintTraceError::InvalidScale(_) | PrintTraceError::InvalidGeometry(_) => HumanError::new(
            "The traced outline couldn't be measured.",
            Some("Check the paper size setting and try again."),
            false,
            ActionRequired,
        ),

        PrintTraceError::Config(_) => HumanError::new(
            "The app settings couldn't be read.",
            Some("Settings were reset to defaults. Adjust them again if needed."),
            false,
            Permanent,
        ),
    }
}
