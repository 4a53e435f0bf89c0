//! Semantic analysis.
//!
//! A single sequential pass over the statement list: names must be
//! declared before use, exactly as scripts execute. The pass fills the
//! context's side tables (symbols, per-node history classification, the
//! recursive-variable set, script metadata) without rewriting the tree;
//! the generator reads those tables to pick an emission strategy per
//! statement.

pub mod symbols;


use crate::context::{HistoryAccess, ScriptKind, TranspileContext};
use crate::diagnostics::from_error;
use crate::emitter::builtins::{
    color_constant_target, declaration_kind, get_builtin_spec, is_builtin_namespace,
    is_unsupported_namespace, resolve_call_args, series_var_target, BuiltinKind, BuiltinSpec,
};
use crate::error::{KelpieError, Result};
use crate::parser::ast::{Expr, NodeId, Program, Span, Stmt, UnaryOp};
use symbols::{Symbol, SymbolKind};

/// Analyzes a program, filling `ctx`'s side tables. All errors are
/// accumulated into `ctx.diagnostics`; the returned error is the first
/// one encountered, so callers get both the full report and a plain
/// `Result`.
pub fn analyze(program: &Program, ctx: &mut TranspileContext) -> Result<()> {
    let mut analyzer = Analyzer::new(ctx);
    analyzer.run(program)
}

struct Analyzer<'c, 'p> {
    ctx: &'c mut TranspileContext,
    first_error: Option<KelpieError>,
    /// Conditions guarding the statement under analysis. A reassignment
    /// is recursive when its value or any enclosing condition reads the
    /// variable's own history.
    cond_stack: Vec<&'p Expr>,
    /// Parameters of the function body under analysis; they shadow
    /// module symbols.
    fn_params: Vec<String>,
    /// Set while the value of a declaration is the expression root, the
    /// only position where `input.*` calls are allowed.
    allow_input: bool,
    /// Set while a top-level expression statement is the root, the only
    /// position where chart calls are allowed.
    allow_chart: bool,
    saw_declaration: bool,
}

impl<'c, 'p> Analyzer<'c, 'p> {
    fn new(ctx: &'c mut TranspileContext) -> Self {
        Self {
            ctx,
            first_error: None,
            cond_stack: Vec::new(),
            fn_params: Vec::new(),
            allow_input: false,
            allow_chart: false,
            saw_declaration: false,
        }
    }

    fn run(&mut self, program: &'p Program) -> Result<()> {
        self.ctx.metadata.version = program.version;
        if program.version.is_none() && !self.ctx.is_library() {
            self.ctx.warn(
                "KLP-MISSING-VERSION",
                "missing //@version pragma",
                Span::new(1, 1),
                "semantic",
            );
        }

        for stmt in &program.statements {
            if let Err(err) = self.stmt(stmt) {
                if matches!(err, KelpieError::InternalInvariant(_)) {
                    return Err(err);
                }
                self.record(err);
            }
        }

        if self.ctx.is_library() && !self.saw_declaration {
            self.ctx.warn(
                "KLP-MISSING-LIBRARY-DECL",
                "library module does not declare library()",
                Span::new(1, 1),
                "semantic",
            );
        }

        match self.first_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Records an error and keeps analyzing, so one pass reports as much
    /// as it can.
    fn record(&mut self, err: KelpieError) {
        self.ctx
            .diagnostics
            .extend(from_error(&err, self.ctx.file.as_deref()));
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    /// Library restrictions also apply to a main file that declares
    /// `library(...)`, so such files can be checked standalone.
    fn in_library(&self) -> bool {
        self.ctx.is_library() || self.ctx.metadata.kind == ScriptKind::Library
    }

    fn err_at(&self, span: Span, message: impl Into<String>) -> KelpieError {
        KelpieError::SemanticError {
            line: span.line,
            col: span.col,
            message: message.into(),
        }
    }

    fn unsupported(&self, span: Span, construct: impl Into<String>) -> KelpieError {
        KelpieError::UnsupportedConstruct {
            construct: construct.into(),
            line: span.line,
            col: span.col,
        }
    }

    fn stmt(&mut self, stmt: &'p Stmt) -> Result<()> {
        match stmt {
            Stmt::Assign { name, value, span } => self.assign(name, value, *span),
            Stmt::Reassign { name, value, span } => self.reassign(name, value, *span),
            Stmt::If {
                condition,
                then_body,
                else_body,
                ..
            } => self.if_stmt(condition, then_body, else_body.as_deref()),
            Stmt::FuncDef {
                name,
                params,
                body,
                exported,
                span,
            } => self.func_def(name, params, body, *exported, *span),
            Stmt::Import {
                specifier,
                alias,
                span,
            } => self.import(specifier, alias, *span),
            Stmt::Expr(expr) => self.expr_stmt(expr),
        }
    }

    fn assign(&mut self, name: &str, value: &'p Expr, span: Span) -> Result<()> {
        self.check_fresh_name(name, span)?;
        self.allow_input = true;
        self.expr(value)?;
        self.ctx.symbols.define(Symbol::variable(name, span));
        Ok(())
    }

    fn reassign(&mut self, name: &str, value: &'p Expr, span: Span) -> Result<()> {
        match self.ctx.symbols.lookup(name) {
            None => {
                return Err(self.err_at(
                    span,
                    format!("cannot reassign undeclared variable '{name}'"),
                ))
            }
            Some(sym) => {
                if matches!(sym.kind, SymbolKind::Function { .. }) {
                    return Err(self.err_at(span, format!("cannot reassign function '{name}'")));
                }
                if sym.source_library.is_some() {
                    return Err(
                        self.err_at(span, format!("cannot reassign imported name '{name}'"))
                    );
                }
            }
        }

        self.expr(value)?;

        let recursive = reads_history_of(value, name)
            || self.cond_stack.iter().any(|c| reads_history_of(c, name));
        if let Some(sym) = self.ctx.symbols.lookup_mut(name) {
            sym.reassigned = true;
            if recursive {
                sym.recursive = true;
            }
        }
        if recursive {
            self.ctx.recursive.insert(name.to_string());
        }
        Ok(())
    }

    fn if_stmt(
        &mut self,
        condition: &'p Expr,
        then_body: &'p [Stmt],
        else_body: Option<&'p [Stmt]>,
    ) -> Result<()> {
        self.expr(condition)?;
        self.cond_stack.push(condition);
        let mut walk = || -> Result<()> {
            for s in then_body {
                self.stmt(s)?;
            }
            if let Some(body) = else_body {
                for s in body {
                    self.stmt(s)?;
                }
            }
            Ok(())
        };
        let result = walk();
        self.cond_stack.pop();
        result
    }

    fn func_def(
        &mut self,
        name: &str,
        params: &[String],
        body: &'p Expr,
        exported: bool,
        span: Span,
    ) -> Result<()> {
        self.check_fresh_name(name, span)?;
        if exported && !self.in_library() {
            return Err(self.err_at(span, "export is only allowed in library scripts"));
        }
        for (i, param) in params.iter().enumerate() {
            if params[..i].contains(param) {
                return Err(self.err_at(span, format!("duplicate parameter '{param}'")));
            }
        }

        self.fn_params = params.to_vec();
        let result = self.expr(body);
        self.fn_params.clear();
        result?;

        self.ctx
            .symbols
            .define(Symbol::function(name, params.to_vec(), span, exported));
        Ok(())
    }

    /// Imports are resolved before analysis; here the binding only has to
    /// exist. A missing one means the pipeline ran without a library
    /// source.
    fn import(&mut self, specifier: &str, alias: &str, _span: Span) -> Result<()> {
        if self.ctx.library_for_alias(alias).is_none() {
            let importer = self
                .ctx
                .file
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<main>".to_string());
            return Err(KelpieError::UnresolvedImport {
                importer,
                specifier: specifier.to_string(),
            });
        }
        Ok(())
    }

    fn expr_stmt(&mut self, expr: &'p Expr) -> Result<()> {
        if let Expr::Call {
            func,
            args,
            kwargs,
            span,
        } = expr
        {
            if let Expr::Ident { name, .. } = func.as_ref() {
                if let Some(kind) = declaration_kind(name) {
                    return self.declaration(name, kind, args, kwargs, *span);
                }
            }
        }
        self.allow_chart = true;
        self.expr(expr)
    }

    /// `indicator(...)`, `strategy(...)` and `library(...)` are metadata
    /// declarations: validated like calls, never emitted.
    fn declaration(
        &mut self,
        name: &str,
        kind: ScriptKind,
        args: &'p [Expr],
        kwargs: &'p [(String, Expr)],
        span: Span,
    ) -> Result<()> {
        if self.saw_declaration {
            return Err(self.err_at(span, "duplicate script declaration"));
        }
        self.saw_declaration = true;

        if self.ctx.is_library() && kind != ScriptKind::Library {
            return Err(self.err_at(
                span,
                format!("'{name}' cannot be used inside a library"),
            ));
        }

        let Some(spec) = get_builtin_spec(name) else {
            return Err(KelpieError::InternalInvariant(format!(
                "declaration '{name}' missing from builtin table"
            )));
        };
        let slots = resolve_call_args(spec.params, spec.required, false, args, kwargs)
            .map_err(|msg| self.err_at(span, format!("{name}: {msg}")))?;

        if let Some(Expr::StringLiteral(title)) = slots.first().copied().flatten() {
            self.ctx.metadata.title = Some(title.clone());
        }
        if let Some(Expr::StringLiteral(short)) = slots.get(1).copied().flatten() {
            self.ctx.metadata.short_title = Some(short.clone());
        }
        if let Some(Expr::BoolLiteral(overlay)) = slots.get(2).copied().flatten() {
            self.ctx.metadata.overlay = *overlay;
        }
        self.ctx.metadata.kind = kind;

        if kind == ScriptKind::Strategy {
            self.ctx.warn(
                "KLP-STRATEGY-AS-INDICATOR",
                "strategy scripts run with indicator semantics; strategy.* calls are unavailable",
                span,
                "semantic",
            );
        }

        for arg in args {
            self.expr(arg)?;
        }
        for (_, value) in kwargs {
            self.expr(value)?;
        }
        Ok(())
    }

    /// Rejects declarations that would shadow a builtin name.
    fn check_fresh_name(&mut self, name: &str, span: Span) -> Result<()> {
        if self.ctx.symbols.contains(name) {
            return Err(self.err_at(span, format!("'{name}' is already declared")));
        }
        if series_var_target(name).is_some()
            || get_builtin_spec(name).is_some()
            || is_builtin_namespace(name)
        {
            return Err(self.err_at(span, format!("cannot shadow builtin '{name}'")));
        }
        if self.ctx.library_for_alias(name).is_some() {
            return Err(self.err_at(span, format!("'{name}' is already an import alias")));
        }
        Ok(())
    }

    fn expr(&mut self, expr: &'p Expr) -> Result<()> {
        let allow_input = std::mem::take(&mut self.allow_input);
        let allow_chart = std::mem::take(&mut self.allow_chart);
        match expr {
            Expr::IntLiteral(_)
            | Expr::FloatLiteral(_)
            | Expr::StringLiteral(_)
            | Expr::BoolLiteral(_) => Ok(()),
            Expr::Ident { name, span } => self.ident_value(name, *span),
            Expr::Member { object, name, span } => self.member_value(object, name, *span),
            Expr::BinOp { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::UnaryOp { operand, .. } => self.expr(operand),
            Expr::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                self.expr(condition)?;
                self.expr(then_value)?;
                self.expr(else_value)
            }
            Expr::Call {
                func,
                args,
                kwargs,
                span,
            } => self.call(func, args, kwargs, *span, allow_input, allow_chart),
            Expr::History {
                id,
                base,
                offset,
                span,
            } => self.history(*id, base, offset, *span),
        }
    }

    fn ident_value(&mut self, name: &str, span: Span) -> Result<()> {
        if self.fn_params.iter().any(|p| p == name) {
            return Ok(());
        }
        if series_var_target(name).is_some() {
            return Ok(());
        }
        if let Some(sym) = self.ctx.symbols.lookup(name) {
            if matches!(sym.kind, SymbolKind::Function { .. }) {
                return Err(self.err_at(span, format!("function '{name}' used as a value")));
            }
            return Ok(());
        }
        if self.ctx.library_for_alias(name).is_some() {
            return Err(self.err_at(span, format!("'{name}' is a library alias, not a value")));
        }
        if is_unsupported_namespace(name) {
            return Err(self.unsupported(span, format!("namespace '{name}'")));
        }
        if is_builtin_namespace(name) {
            return Err(self.err_at(span, format!("namespace '{name}' cannot be used as a value")));
        }
        if get_builtin_spec(name).is_some() {
            return Err(self.err_at(span, format!("function '{name}' used as a value")));
        }
        Err(self.err_at(span, format!("undefined variable '{name}'")))
    }

    fn member_value(&mut self, object: &str, name: &str, span: Span) -> Result<()> {
        if let Some(binding) = self.ctx.library_for_alias(object) {
            if binding.exports.iter().any(|e| e.name == name) {
                return Err(self.err_at(
                    span,
                    format!("library function '{object}.{name}' used as a value"),
                ));
            }
            return Err(self.err_at(span, format!("library '{object}' has no export '{name}'")));
        }
        if object == "color" && color_constant_target(name).is_some() {
            return Ok(());
        }
        if is_unsupported_namespace(object) {
            return Err(self.unsupported(span, format!("{object}.{name}")));
        }
        if is_builtin_namespace(object) {
            let full = format!("{object}.{name}");
            if get_builtin_spec(&full).is_some() {
                return Err(self.err_at(span, format!("function '{full}' used as a value")));
            }
            return Err(self.err_at(span, format!("namespace '{object}' has no member '{name}'")));
        }
        if self.ctx.symbols.contains(object) || self.fn_params.iter().any(|p| p == object) {
            return Err(self.err_at(
                span,
                format!("'{object}' is not a namespace or import alias"),
            ));
        }
        Err(self.err_at(span, format!("undefined name '{object}'")))
    }

    fn call(
        &mut self,
        func: &'p Expr,
        args: &'p [Expr],
        kwargs: &'p [(String, Expr)],
        span: Span,
        allow_input: bool,
        allow_chart: bool,
    ) -> Result<()> {
        match func {
            Expr::Ident { name, .. } => {
                if declaration_kind(name).is_some() {
                    return Err(
                        self.err_at(span, format!("'{name}' must be a top-level statement"))
                    );
                }
                if let Some(spec) = get_builtin_spec(name.as_str()) {
                    return self.builtin_call(spec, args, kwargs, span, allow_input, allow_chart);
                }
                if let Some(sym) = self.ctx.symbols.lookup(name) {
                    return match &sym.kind {
                        SymbolKind::Function { params } => {
                            let params = params.clone();
                            self.user_call(name, &params, args, kwargs, span)
                        }
                        SymbolKind::Variable => {
                            Err(self.err_at(span, format!("'{name}' is not a function")))
                        }
                    };
                }
                if self.fn_params.iter().any(|p| p == name) {
                    return Err(self.err_at(span, format!("'{name}' is not a function")));
                }
                if series_var_target(name).is_some() {
                    return Err(self.err_at(span, format!("'{name}' is not a function")));
                }
                if self.ctx.library_for_alias(name).is_some() {
                    return Err(self.err_at(
                        span,
                        format!("'{name}' is a library alias; call '{name}.<function>'"),
                    ));
                }
                Err(self.err_at(span, format!("undefined function '{name}'")))
            }
            Expr::Member { object, name, .. } => {
                if let Some(binding) = self.ctx.library_for_alias(object) {
                    let Some(export) = binding.exports.iter().find(|e| e.name == name.as_str())
                    else {
                        return Err(
                            self.err_at(span, format!("library '{object}' has no export '{name}'"))
                        );
                    };
                    let params = export.params.clone();
                    let label = format!("{object}.{name}");
                    return self.user_call(&label, &params, args, kwargs, span);
                }
                if is_unsupported_namespace(object) {
                    return Err(self.unsupported(span, format!("{object}.{name}")));
                }
                let full = format!("{object}.{name}");
                if let Some(spec) = get_builtin_spec(&full) {
                    return self.builtin_call(spec, args, kwargs, span, allow_input, allow_chart);
                }
                if is_builtin_namespace(object) {
                    return Err(self.err_at(
                        span,
                        format!("namespace '{object}' has no function '{name}'"),
                    ));
                }
                Err(self.err_at(
                    span,
                    format!("'{object}' is not a namespace or import alias"),
                ))
            }
            _ => Err(self.err_at(span, "call target must be a function name")),
        }
    }

    fn builtin_call(
        &mut self,
        spec: &'static BuiltinSpec,
        args: &'p [Expr],
        kwargs: &'p [(String, Expr)],
        span: Span,
        allow_input: bool,
        allow_chart: bool,
    ) -> Result<()> {
        if spec.chart_only && self.in_library() {
            return Err(self.unsupported(span, format!("'{}' inside a library", spec.name)));
        }
        let is_input = spec.name == "input" || spec.name.starts_with("input.");
        if is_input {
            if !allow_input {
                return Err(self.err_at(
                    span,
                    format!("'{}' must directly initialize a variable", spec.name),
                ));
            }
        } else if spec.chart_only && !allow_chart {
            return Err(self.err_at(
                span,
                format!("'{}' must be a top-level statement", spec.name),
            ));
        }

        let source_default = matches!(spec.kind, BuiltinKind::SourceDefault { .. });
        resolve_call_args(spec.params, spec.required, source_default, args, kwargs)
            .map_err(|msg| self.err_at(span, format!("{}: {msg}", spec.name)))?;

        for arg in args {
            self.expr(arg)?;
        }
        for (_, value) in kwargs {
            self.expr(value)?;
        }
        Ok(())
    }

    fn user_call(
        &mut self,
        label: &str,
        params: &[String],
        args: &'p [Expr],
        kwargs: &'p [(String, Expr)],
        span: Span,
    ) -> Result<()> {
        let names: Vec<&str> = params.iter().map(|s| s.as_str()).collect();
        resolve_call_args(&names, names.len(), false, args, kwargs)
            .map_err(|msg| self.err_at(span, format!("{label}: {msg}")))?;
        for arg in args {
            self.expr(arg)?;
        }
        for (_, value) in kwargs {
            self.expr(value)?;
        }
        Ok(())
    }

    /// Classifies one `x[n]` node into the side table the generator reads.
    fn history(&mut self, id: NodeId, base: &'p Expr, offset: &'p Expr, span: Span) -> Result<()> {
        self.expr(base)?;
        self.expr(offset)?;

        // Unary minus is not folded into literals, so `x[-1]` arrives as
        // a negation node.
        let offset_lit = match offset {
            Expr::IntLiteral(n) => Some(*n),
            Expr::UnaryOp {
                op: UnaryOp::Neg,
                operand,
            } if matches!(operand.as_ref(), Expr::IntLiteral(_)) => {
                return Err(self.err_at(span, "history offset cannot be negative"));
            }
            Expr::FloatLiteral(_) => {
                return Err(self.err_at(span, "history offset must be an integer"));
            }
            _ => None,
        };
        let base_name = match base {
            Expr::Ident { name, .. } => Some(name.clone()),
            _ => None,
        };

        if let (Some(name), Some(n)) = (&base_name, offset_lit) {
            if let Some(sym) = self.ctx.symbols.lookup_mut(name) {
                sym.max_history_depth = sym.max_history_depth.max(n as usize);
            }
        }
        if let Some(n) = offset_lit {
            self.ctx.metadata.max_lookback = self.ctx.metadata.max_lookback.max(n as usize);
        }

        self.ctx.history.insert(
            id,
            HistoryAccess {
                base: base_name,
                offset: offset_lit,
            },
        );
        Ok(())
    }
}

/// True when `expr` reads the history of `name` (`name[k]` anywhere in
/// the tree). A bare read of `name` is not history: it refers to the
/// current bar and never forces loop emission.
pub fn reads_history_of(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::History { base, offset, .. } => {
            matches!(base.as_ref(), Expr::Ident { name: n, .. } if n == name)
                || reads_history_of(base, name)
                || reads_history_of(offset, name)
        }
        Expr::BinOp { left, right, .. } => {
            reads_history_of(left, name) || reads_history_of(right, name)
        }
        Expr::UnaryOp { operand, .. } => reads_history_of(operand, name),
        Expr::Ternary {
            condition,
            then_value,
            else_value,
        } => {
            reads_history_of(condition, name)
                || reads_history_of(then_value, name)
                || reads_history_of(else_value, name)
        }
        Expr::Call { args, kwargs, .. } => {
            args.iter().any(|a| reads_history_of(a, name))
                || kwargs.iter().any(|(_, v)| reads_history_of(v, name))
        }
        _ => false,
    }
}
