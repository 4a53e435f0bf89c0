//! Kelpie - indicator script to JavaScript transpiler
//!
//! # Overview
//! Compiles Pine-style indicator and strategy scripts into
//! self-contained JavaScript modules that run against a host-provided
//! series runtime (`$`). Recursive formulas compile to explicit bar
//! loops; everything else becomes whole-series runtime calls.

pub mod context;
pub mod diagnostics;
pub mod emitter;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod semantic;

use std::path::Path;

use crate::context::{ScriptMetadata, TranspileContext};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::resolver::LibrarySource;

/// Outcome of a successful transpilation: the generated module, the
/// script metadata gathered along the way, and any warnings.
#[derive(Debug)]
pub struct TranspileResult {
    pub code: String,
    pub metadata: ScriptMetadata,
    pub diagnostics: Diagnostics,
}

/// Transpile script source to a JavaScript module. Imports fail as
/// unresolved; use [`transpile_with_libraries`] to provide them.
pub fn transpile(source: &str) -> Result<String> {
    let program = parser::parse(source)?;
    let mut ctx = TranspileContext::new(None);
    resolver::resolve_program(&program, &mut ctx, None)?;
    semantic::analyze(&program, &mut ctx)?;
    emitter::emit(&program, &mut ctx)
}

/// Transpile with library code available through `libs`.
pub fn transpile_with_libraries(source: &str, libs: &dyn LibrarySource) -> Result<String> {
    let program = parser::parse(source)?;
    let mut ctx = TranspileContext::new(None);
    resolver::resolve_program(&program, &mut ctx, Some(libs))?;
    semantic::analyze(&program, &mut ctx)?;
    emitter::emit(&program, &mut ctx)
}

/// Full pipeline with structured diagnostics. On success the returned
/// diagnostics hold at most warnings; on failure every diagnostic
/// recorded up to the failing phase comes back.
pub fn transpile_with_diagnostics(
    source: &str,
    file: Option<&Path>,
    libs: Option<&dyn LibrarySource>,
) -> std::result::Result<TranspileResult, Diagnostics> {
    let program = match parser::parse(source) {
        Ok(program) => program,
        Err(err) => return Err(diagnostics::from_error(&err, file)),
    };

    let mut ctx = TranspileContext::new(file.map(Path::to_path_buf));
    if let Err(err) = resolver::resolve_program(&program, &mut ctx, libs) {
        return Err(failure_diagnostics(ctx, &err, file));
    }
    if let Err(err) = semantic::analyze(&program, &mut ctx) {
        return Err(failure_diagnostics(ctx, &err, file));
    }
    match emitter::emit(&program, &mut ctx) {
        Ok(code) => Ok(TranspileResult {
            code,
            metadata: ctx.metadata,
            diagnostics: ctx.diagnostics,
        }),
        Err(err) => Err(failure_diagnostics(ctx, &err, file)),
    }
}

/// Errors are normally recorded as they are hit; internal invariant
/// failures abort without recording, so backfill those here.
fn failure_diagnostics(
    mut ctx: TranspileContext,
    err: &error::KelpieError,
    file: Option<&Path>,
) -> Diagnostics {
    let mut diags = std::mem::take(&mut ctx.diagnostics);
    if !diags.has_errors() {
        diags.extend(diagnostics::from_error(err, file));
    }
    diags
}

/// Transpile a script file to a JavaScript file.
pub fn transpile_file(input: &Path, output: &Path) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(input)?;
    let code = transpile(&source)?;
    std::fs::write(output, code)?;
    Ok(())
}
