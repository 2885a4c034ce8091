//! Advisory failures collected alongside successful results
//!
//! Cleanup, verification and listing problems never fail an operation.
//! They are recorded here and logged so callers can surface them.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ImageCleanup,
    TempCleanup,
    WriteVerification,
    FileRead,
    Listing,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticKind::ImageCleanup => "image cleanup",
            DiagnosticKind::TempCleanup => "temp cleanup",
            DiagnosticKind::WriteVerification => "write verification",
            DiagnosticKind::FileRead => "file read",
            DiagnosticKind::Listing => "listing",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A successful result plus the advisory failures met while producing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self { value, diagnostics }
    }

    /// Record an advisory failure and log it.
    pub fn note(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics.push(record(kind, message));
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            diagnostics: self.diagnostics,
        }
    }
}

/// Build a diagnostic, emitting it as a warning on the way.
pub fn record(kind: DiagnosticKind, message: impl Into<String>) -> Diagnostic {
    let message = message.into();
    warn!(kind = %kind, "{}", message);
    Diagnostic { kind, message }
}
