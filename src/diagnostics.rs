//! Diagnostics - transpile-time diagnostics collection and output

use serde::Serialize;
use std::path::Path;

use crate::error::KelpieError;

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticSpan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub span: DiagnosticSpan,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Accumulated diagnostics for one transpile invocation. Warnings and errors
/// share the collection; only errors make the run fail.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Diagnostics {
    pub diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn add(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self).unwrap_or_else(|_| "{}".to_string())
    }

    /// One line per diagnostic: `file:line:col: severity: message`.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for diag in &self.diagnostics {
            let file = diag.span.file.as_deref().unwrap_or("<input>");
            out.push_str(&format!(
                "{}:{}:{}: {}: {}\n",
                file,
                diag.span.line,
                diag.span.column,
                diag.severity.label(),
                diag.message
            ));
        }
        out
    }
}

pub fn span_at(file: Option<&Path>, line: usize, column: usize) -> DiagnosticSpan {
    DiagnosticSpan {
        file: file.map(|p| p.display().to_string()),
        line,
        column,
        end_line: line,
        end_column: column,
    }
}

pub fn error_diag(code: &str, message: String, span: DiagnosticSpan, phase: &str) -> Diagnostic {
    Diagnostic {
        code: code.to_string(),
        message,
        severity: Severity::Error,
        span,
        phase: phase.to_string(),
        meta: None,
    }
}

pub fn warning_diag(code: &str, message: String, span: DiagnosticSpan, phase: &str) -> Diagnostic {
    Diagnostic {
        code: code.to_string(),
        message,
        severity: Severity::Warning,
        span,
        phase: phase.to_string(),
        meta: None,
    }
}

/// Maps a pipeline error onto a single-entry diagnostics collection.
pub fn from_error(err: &KelpieError, file: Option<&Path>) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let mut meta = None;
    let (code, message, line, col, phase) = match err {
        KelpieError::LexError { line, col, message } => {
            ("KLP-LEX-ERROR", message.clone(), *line, *col, "lex")
        }
        KelpieError::ParseError { line, col, message } => {
            ("KLP-PARSE-ERROR", message.clone(), *line, *col, "parse")
        }
        KelpieError::SemanticError { line, col, message } => {
            ("KLP-SEMANTIC-ERROR", message.clone(), *line, *col, "semantic")
        }
        KelpieError::UnresolvedImport {
            importer,
            specifier,
        } => {
            meta = Some(serde_json::json!({
                "importer": importer,
                "specifier": specifier,
            }));
            (
                "KLP-UNRESOLVED-IMPORT",
                format!("Unresolved import '{specifier}' requested by {importer}"),
                1,
                1,
                "resolve",
            )
        }
        KelpieError::CyclicImport { chain } => {
            meta = Some(serde_json::json!({ "chain": chain }));
            (
                "KLP-CYCLIC-IMPORT",
                format!("Cyclic import: {}", chain.join(" -> ")),
                1,
                1,
                "resolve",
            )
        }
        KelpieError::UnsupportedConstruct {
            construct,
            line,
            col,
        } => (
            "KLP-UNSUPPORTED-CONSTRUCT",
            format!("Unsupported construct: {construct}"),
            *line,
            *col,
            "generate",
        ),
        KelpieError::InternalInvariant(message) => (
            "KLP-INTERNAL-INVARIANT",
            message.clone(),
            1,
            1,
            "generate",
        ),
        KelpieError::IoError(_) => ("KLP-IO-ERROR", format!("{err}"), 1, 1, "io"),
    };
    let span = span_at(file, line, col);
    let mut diag = error_diag(code, message, span, phase);
    diag.meta = meta;
    diags.add(diag);
    diags
}
