use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::BundleError;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const DIAG_UNSUPPORTED_STYLE: &str = "BND-STYLE-001";
pub const DIAG_PREPROCESS_FAILED: &str = "BND-STYLE-002";
pub const DIAG_STYLE_READ_FAILED: &str = "BND-STYLE-003";
pub const DIAG_CSS_MINIFY: &str = "BND-MINIFY-001";
pub const DIAG_JS_MINIFY: &str = "BND-MINIFY-002";
pub const DIAG_EMPTY_BUNDLE: &str = "BND-BUNDLE-001";
pub const DIAG_INVALID_INPUT: &str = "BND-INPUT-001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A build problem that was recorded instead of aborting the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub level: DiagnosticLevel,
    pub message: String,
    /// Absolute path of the offending file, when there is one.
    pub file: Option<String>,
}

impl Diagnostic {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            level: DiagnosticLevel::Error,
            message: message.into(),
            file: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            level: DiagnosticLevel::Warning,
            message: message.into(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl From<BundleError> for Diagnostic {
    fn from(err: BundleError) -> Self {
        let (code, file) = match &err {
            BundleError::UnsupportedStyle { path, .. } => {
                (DIAG_UNSUPPORTED_STYLE, Some(path.display().to_string()))
            }
            BundleError::Preprocess { path, .. } => {
                (DIAG_PREPROCESS_FAILED, Some(path.display().to_string()))
            }
            BundleError::Io { path, .. } => {
                (DIAG_STYLE_READ_FAILED, Some(path.display().to_string()))
            }
            BundleError::Config { .. } | BundleError::Json(_) => (DIAG_INVALID_INPUT, None),
        };
        Self {
            code: code.to_string(),
            level: DiagnosticLevel::Error,
            message: err.to_string(),
            file,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINK
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only diagnostic list shared by parallel compile tasks.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        tracing::debug!(code = %diagnostic.code, "{}", diagnostic.message);
        self.lock().push(diagnostic);
    }

    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.lock().extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.lock().iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains everything collected so far.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.lock())
    }

    // A panicking compile task must not hide the diagnostics of the others.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
