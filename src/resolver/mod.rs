//! Resolver module - import resolution and library compilation.
//!
//! Where library code comes from is the host's business: the resolver
//! only sees a [`LibrarySource`] lookup. Each imported library is
//! compiled once per run with its own mangling prefix, its exports are
//! bound to the importer's alias, and its emitted body is collected as
//! a fragment for the final module in dependency order.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::context::{library_prefix, ExportedFn, LibraryBinding, TranspileContext};
use crate::diagnostics::{from_error, Diagnostics};
use crate::emitter;
use crate::emitter::builtins::is_builtin_namespace;
use crate::error::{KelpieError, Result};
use crate::parser;
use crate::parser::ast::{Program, Span, Stmt};
use crate::semantic;
use crate::semantic::symbols::SymbolKind;

/// Lookup capability for library code. `load` returns the source text
/// for a specifier, or `None` when the specifier is unknown.
pub trait LibrarySource {
    fn load(&self, specifier: &str) -> Option<String>;
}

/// In-memory source map, used by embedders and tests.
#[derive(Debug, Default)]
pub struct MemoryLibrarySource {
    entries: HashMap<String, String>,
}

impl MemoryLibrarySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, specifier: &str, source: &str) {
        self.entries.insert(specifier.to_string(), source.to_string());
    }
}

impl LibrarySource for MemoryLibrarySource {
    fn load(&self, specifier: &str) -> Option<String> {
        self.entries.get(specifier).cloned()
    }
}

/// Loads `<root>/<specifier>.klp`. Specifier segments may not be empty
/// or traverse upward, so lookups stay inside the root directory.
#[derive(Debug)]
pub struct DirLibrarySource {
    root: PathBuf,
}

impl DirLibrarySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LibrarySource for DirLibrarySource {
    fn load(&self, specifier: &str) -> Option<String> {
        if specifier.contains('\\')
            || specifier
                .split('/')
                .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return None;
        }
        let path = self.root.join(format!("{specifier}.klp"));
        std::fs::read_to_string(path).ok()
    }
}

struct NoLibraries;

impl LibrarySource for NoLibraries {
    fn load(&self, _specifier: &str) -> Option<String> {
        None
    }
}

struct CompiledLibrary {
    prefix: String,
    exports: Vec<ExportedFn>,
    body: String,
}

struct LibraryResolver<'s> {
    source: &'s dyn LibrarySource,
    cache: HashMap<String, CompiledLibrary>,
    /// Completion order; a library appears after everything it imports.
    order: Vec<String>,
    /// Specifiers currently being compiled, for cycle detection.
    in_progress: Vec<String>,
    /// Diagnostics from resolution and from compiled libraries, merged
    /// into the importing context at the end.
    collected: Diagnostics,
}

impl<'s> LibraryResolver<'s> {
    fn new(source: &'s dyn LibrarySource) -> Self {
        Self {
            source,
            cache: HashMap::new(),
            order: Vec::new(),
            in_progress: Vec::new(),
            collected: Diagnostics::new(),
        }
    }

    /// Compiles `specifier` and its transitive imports into the cache.
    fn resolve(
        &mut self,
        specifier: &str,
        importer: &str,
        importer_file: Option<&Path>,
    ) -> Result<()> {
        if self.cache.contains_key(specifier) {
            return Ok(());
        }
        if let Some(pos) = self.in_progress.iter().position(|s| s == specifier) {
            let mut chain: Vec<String> = self.in_progress[pos..].to_vec();
            chain.push(specifier.to_string());
            let err = KelpieError::CyclicImport { chain };
            self.collected.extend(from_error(&err, importer_file));
            return Err(err);
        }
        let Some(text) = self.source.load(specifier) else {
            let err = KelpieError::UnresolvedImport {
                importer: importer.to_string(),
                specifier: specifier.to_string(),
            };
            self.collected.extend(from_error(&err, importer_file));
            return Err(err);
        };

        let lib_file = PathBuf::from(specifier);
        let program = match parser::parse(&text) {
            Ok(program) => program,
            Err(err) => {
                self.collected.extend(from_error(&err, Some(&lib_file)));
                return Err(err);
            }
        };

        self.in_progress.push(specifier.to_string());
        let mut lib_ctx = TranspileContext::for_library(specifier);
        lib_ctx.file = Some(lib_file);

        let mut failed = self.bind_imports(&program, &mut lib_ctx).err();
        if failed.is_none() {
            failed = semantic::analyze(&program, &mut lib_ctx).err();
        }
        let mut body = String::new();
        if failed.is_none() {
            match emitter::emit_body(&program, &mut lib_ctx) {
                Ok(emitted) => body = emitted,
                Err(err) => failed = Some(err),
            }
        }
        self.in_progress.pop();
        self.collected
            .extend(std::mem::take(&mut lib_ctx.diagnostics));
        if let Some(err) = failed {
            return Err(err);
        }

        let exports: Vec<ExportedFn> = lib_ctx
            .symbols
            .iter()
            .filter(|sym| sym.exported)
            .map(|sym| ExportedFn {
                name: sym.name.clone(),
                params: match &sym.kind {
                    SymbolKind::Function { params } => params.clone(),
                    SymbolKind::Variable => Vec::new(),
                },
            })
            .collect();
        self.order.push(specifier.to_string());
        self.cache.insert(
            specifier.to_string(),
            CompiledLibrary {
                prefix: library_prefix(specifier),
                exports,
                body,
            },
        );
        Ok(())
    }

    /// Resolves every `import` in `program` and installs the alias
    /// bindings into `ctx`. Failures are collected per import; the
    /// first one is returned after the loop.
    fn bind_imports(&mut self, program: &Program, ctx: &mut TranspileContext) -> Result<()> {
        let importer = match &ctx.file {
            Some(path) => path.display().to_string(),
            None => "<main>".to_string(),
        };
        let mut first_error = None;
        for stmt in &program.statements {
            let Stmt::Import {
                specifier,
                alias,
                span,
            } = stmt
            else {
                continue;
            };
            match self.resolve(specifier, &importer, ctx.file.as_deref()) {
                Ok(()) => {
                    if ctx.libraries.iter().any(|b| b.alias == *alias) {
                        let err = duplicate_alias(alias, *span);
                        ctx.diagnostics.extend(from_error(&err, ctx.file.as_deref()));
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                        continue;
                    }
                    if is_builtin_namespace(alias) {
                        ctx.warn(
                            "KLP-SHADOWED-NAMESPACE",
                            format!("import alias '{alias}' shadows the builtin namespace '{alias}'"),
                            *span,
                            "resolve",
                        );
                    }
                    let lib = &self.cache[specifier.as_str()];
                    ctx.libraries.push(LibraryBinding {
                        alias: alias.clone(),
                        specifier: specifier.clone(),
                        prefix: lib.prefix.clone(),
                        exports: lib.exports.clone(),
                    });
                    ctx.metadata.imports.push(specifier.clone());
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Resolves the program's imports against `source`, leaving compiled
/// fragments on the context in dependency order. A program without
/// imports never touches the source.
pub fn resolve_program(
    program: &Program,
    ctx: &mut TranspileContext,
    source: Option<&dyn LibrarySource>,
) -> Result<()> {
    if !program
        .statements
        .iter()
        .any(|stmt| matches!(stmt, Stmt::Import { .. }))
    {
        return Ok(());
    }
    let fallback = NoLibraries;
    let source = source.unwrap_or(&fallback);
    let mut resolver = LibraryResolver::new(source);
    let result = resolver.bind_imports(program, ctx);
    ctx.fragments = resolver
        .order
        .iter()
        .map(|specifier| resolver.cache[specifier.as_str()].body.clone())
        .collect();
    ctx.diagnostics.extend(resolver.collected);
    result
}

fn duplicate_alias(alias: &str, span: Span) -> KelpieError {
    KelpieError::SemanticError {
        line: span.line,
        col: span.col,
        message: format!("import alias '{alias}' is already in use"),
    }
}
