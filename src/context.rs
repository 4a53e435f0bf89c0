//! Per-invocation transpile state.
//!
//! One `TranspileContext` is built for each top-level transpile call and
//! each library module resolved during it. Contexts never share mutable
//! state; a library's context hands its exports back to the importer and
//! nothing else.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;

use crate::diagnostics::{warning_diag, Diagnostics};
use crate::parser::ast::{NodeId, Span};
use crate::semantic::symbols::SymbolTable;

/// What the analyzer recorded about one `History` node. Missing entries at
/// generation time are an internal invariant violation, not a user error.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryAccess {
    /// Base variable name when the base is a plain identifier.
    pub base: Option<String>,
    /// Offset when it is an integer literal; dynamic offsets are `None`.
    pub offset: Option<i64>,
}

/// One exported library function, as seen by an importer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFn {
    pub name: String,
    pub params: Vec<String>,
}

/// A resolved `import` binding: alias on the importer's side, mangling
/// prefix and export list from the library's side.
#[derive(Debug, Clone)]
pub struct LibraryBinding {
    pub alias: String,
    pub specifier: String,
    pub prefix: String,
    pub exports: Vec<ExportedFn>,
}

/// Script kind declared by `indicator(...)`, `strategy(...)` or
/// `library(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    #[default]
    Indicator,
    Strategy,
    Library,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputMeta {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub default: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotMeta {
    pub id: String,
    pub title: String,
}

/// Chart-controller facing description of the transpiled script: which
/// inputs it takes, which plots it produces, and how much history its
/// literal offsets reach back.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ScriptMetadata {
    pub kind: ScriptKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_title: Option<String>,
    pub overlay: bool,
    pub inputs: Vec<InputMeta>,
    pub plots: Vec<PlotMeta>,
    pub imports: Vec<String>,
    /// Exported function names, for library modules.
    pub exports: Vec<String>,
    pub max_lookback: usize,
}

/// Mutable state threaded through analysis and generation for one module.
#[derive(Debug, Default)]
pub struct TranspileContext {
    pub file: Option<PathBuf>,
    pub symbols: SymbolTable,
    pub diagnostics: Diagnostics,
    /// Variables whose reassignment reads their own history: these emit as
    /// explicit bar loops instead of whole-series expressions.
    pub recursive: HashSet<String>,
    /// Side table keyed by `History` node identity; the tree itself is
    /// never rewritten.
    pub history: HashMap<NodeId, HistoryAccess>,
    pub libraries: Vec<LibraryBinding>,
    pub metadata: ScriptMetadata,
    /// Compiled library bodies in dependency order, prepended to the
    /// module body at assembly.
    pub fragments: Vec<String>,
    /// Output buffer the generator appends to.
    pub out: String,
    /// Set for library modules: every top-level name is emitted with this
    /// prefix so fragments are alias-independent and collision-free.
    pub mangle_prefix: Option<String>,
}

impl TranspileContext {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            file,
            ..Self::default()
        }
    }

    /// Context for a library module resolved under `specifier`.
    pub fn for_library(specifier: &str) -> Self {
        let mut ctx = Self::new(None);
        ctx.mangle_prefix = Some(library_prefix(specifier));
        ctx.metadata.kind = ScriptKind::Library;
        ctx
    }

    pub fn is_library(&self) -> bool {
        self.mangle_prefix.is_some()
    }

    pub fn library_for_alias(&self, alias: &str) -> Option<&LibraryBinding> {
        self.libraries.iter().find(|b| b.alias == alias)
    }

    pub fn warn(&mut self, code: &str, message: impl Into<String>, span: Span, phase: &str) {
        let span = crate::diagnostics::span_at(self.file.as_deref(), span.line, span.col);
        self.diagnostics
            .add(warning_diag(code, message.into(), span, phase));
    }

    /// The emitted name for a top-level symbol of this module.
    pub fn emitted_name(&self, name: &str) -> String {
        match &self.mangle_prefix {
            Some(prefix) => format!("{prefix}${name}"),
            None => name.to_string(),
        }
    }
}

/// `acme/util/1` becomes `lib$acme_util_1`. User identifiers cannot
/// contain `$`, so prefixed names never collide with script variables.
pub fn library_prefix(specifier: &str) -> String {
    let sanitized: String = specifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("lib${sanitized}")
}
