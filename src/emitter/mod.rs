//! Emitter module - JavaScript code generation.
//!
//! Two strategies, chosen per statement from the analyzer's side tables.
//! The default translates every expression to whole-series runtime calls
//! (`$.op.add`, `$.ta.sma`, `$.offset`), one statement per binding. A
//! reassignment that reads its own history cannot be expressed that way,
//! so it compiles to an explicit bar loop: an IIFE that fills an output
//! array bar by bar, with self-history reads served from the array and
//! every self-free subexpression hoisted out of the loop as a
//! whole-series constant.

pub mod builtins;

#[cfg(test)]
mod tests;

use crate::context::{InputMeta, PlotMeta, TranspileContext};
use crate::diagnostics::from_error;
use crate::emitter::builtins::{
    color_constant_target, declaration_kind, get_builtin_spec, resolve_call_args,
    series_var_target, BuiltinKind, BuiltinSpec,
};
use crate::error::{KelpieError, Result};
use crate::parser::ast::{BinOp, Expr, Program, Span, Stmt, UnaryOp};
use crate::semantic::reads_history_of;
use crate::semantic::symbols::SymbolKind;

/// Emits the complete module: the runtime wrapper, resolved library
/// fragments in dependency order, then the program body.
pub fn emit(program: &Program, ctx: &mut TranspileContext) -> Result<String> {
    let body = emit_body(program, ctx)?;
    let mut out = String::with_capacity(body.len() + 64);
    out.push_str("($) => {\n");
    for fragment in &ctx.fragments {
        push_indented(&mut out, fragment);
    }
    push_indented(&mut out, &body);
    out.push_str("}\n");
    Ok(out)
}

/// Emits the statement body alone, as used for library fragments.
pub fn emit_body(program: &Program, ctx: &mut TranspileContext) -> Result<String> {
    let mut emitter = JsEmitter::new(ctx);
    emitter.run(program)
}

fn push_indented(out: &mut String, block: &str) {
    for line in block.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
}

/// One reassignment gathered from a conditional block, with the chain of
/// conditions (and their polarity) guarding it.
struct GuardedReassign<'p> {
    name: &'p str,
    conds: Vec<(&'p Expr, bool)>,
    value: &'p Expr,
    span: Span,
}

/// State of one bar loop under construction: hoisted whole-series
/// subexpressions and whether the previous-bar shortcut is referenced.
struct BarLoop {
    hoists: Vec<String>,
    uses_prev: bool,
}

/// JavaScript code emitter.
struct JsEmitter<'c> {
    ctx: &'c mut TranspileContext,
    first_error: Option<KelpieError>,
    /// Function parameters of the body being emitted; these are plain
    /// JavaScript bindings, never series lookups.
    locals: Vec<String>,
    plot_counter: usize,
}

impl<'c> JsEmitter<'c> {
    fn new(ctx: &'c mut TranspileContext) -> Self {
        Self {
            ctx,
            first_error: None,
            locals: Vec::new(),
            plot_counter: 0,
        }
    }

    fn run(&mut self, program: &Program) -> Result<String> {
        for stmt in &program.statements {
            if let Err(err) = self.stmt(stmt) {
                if matches!(err, KelpieError::InternalInvariant(_)) {
                    return Err(err);
                }
                self.record(err);
            }
        }
        match self.first_error.take() {
            Some(err) => Err(err),
            None => Ok(std::mem::take(&mut self.ctx.out)),
        }
    }

    fn record(&mut self, err: KelpieError) {
        self.ctx
            .diagnostics
            .extend(from_error(&err, self.ctx.file.as_deref()));
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    fn push_line(&mut self, line: &str) {
        self.ctx.out.push_str(line);
        self.ctx.out.push('\n');
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Assign { name, value, span } => self.assign(name, value, *span),
            Stmt::Reassign { name, value, span } => {
                let entry = GuardedReassign {
                    name: name.as_str(),
                    conds: Vec::new(),
                    value,
                    span: *span,
                };
                if reads_history_of(value, name) {
                    self.emit_bar_loop(name, &[&entry])
                } else {
                    let target = self.ctx.emitted_name(name);
                    let js = self.emit_series(value)?;
                    self.push_line(&format!("{target} = {js};"));
                    Ok(())
                }
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
                ..
            } => self.lower_if(condition, then_body, else_body.as_deref()),
            Stmt::FuncDef {
                name, params, body, ..
            } => {
                if matches!(self.ctx.symbols.lookup(name), Some(sym) if sym.exported) {
                    self.ctx.metadata.exports.push(name.clone());
                }
                let target = self.ctx.emitted_name(name);
                self.locals = params.to_vec();
                let js = self.emit_series(body);
                self.locals.clear();
                let js = js?;
                self.push_line(&format!("const {} = ({}) => {};", target, params.join(", "), js));
                Ok(())
            }
            // Import bindings were resolved into fragments already; the
            // statement itself emits nothing.
            Stmt::Import { .. } => Ok(()),
            Stmt::Expr(expr) => self.expr_stmt(expr),
        }
    }

    fn assign(&mut self, name: &str, value: &Expr, _span: Span) -> Result<()> {
        if let Expr::Call {
            func, args, kwargs, ..
        } = value
        {
            let spec = match func.as_ref() {
                Expr::Ident { name: f, .. } if f == "input" => get_builtin_spec("input"),
                Expr::Member { object, name: f, .. } if object == "input" => {
                    get_builtin_spec(&format!("input.{f}"))
                }
                _ => None,
            };
            if let Some(spec) = spec {
                return self.input_decl(name, spec, args, kwargs);
            }
        }

        let keyword = match self.ctx.symbols.lookup(name) {
            Some(sym) if sym.reassigned => "let",
            _ => "const",
        };
        let target = self.ctx.emitted_name(name);
        let js = self.emit_series(value)?;
        self.push_line(&format!("{keyword} {target} = {js};"));
        Ok(())
    }

    /// `len = input.int(14, "Length")` emits a runtime input read keyed
    /// by the variable name and records the input in the metadata.
    fn input_decl(
        &mut self,
        name: &str,
        spec: &'static BuiltinSpec,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<()> {
        let slots = resolve_call_args(spec.params, spec.required, false, args, kwargs)
            .map_err(|msg| internal(format!("input call failed revalidation: {msg}")))?;

        let default = slots
            .first()
            .copied()
            .flatten()
            .map(literal_json)
            .unwrap_or(serde_json::Value::Null);
        let title = match slots.get(1).copied().flatten() {
            Some(Expr::StringLiteral(s)) => s.clone(),
            _ => String::new(),
        };
        self.ctx.metadata.inputs.push(InputMeta {
            id: name.to_string(),
            kind: spec
                .name
                .strip_prefix("input.")
                .unwrap_or("value")
                .to_string(),
            title,
            default,
        });

        let target = self.ctx.emitted_name(name);
        let id = format!("\"{}\"", escape_js_string(name));
        let call_args = self.join_slot_args(&slots, Some(id))?;
        self.push_line(&format!("const {target} = {}({call_args});", spec.target));
        Ok(())
    }

    fn expr_stmt(&mut self, expr: &Expr) -> Result<()> {
        if let Expr::Call { func, args, kwargs, .. } = expr {
            if let Expr::Ident { name, .. } = func.as_ref() {
                if declaration_kind(name).is_some() {
                    return Ok(());
                }
                if name == "plot" || name == "plotshape" {
                    self.record_plot(name, args, kwargs);
                }
            }
        }
        let js = self.emit_series(expr)?;
        self.push_line(&format!("{js};"));
        Ok(())
    }

    fn record_plot(&mut self, name: &str, args: &[Expr], kwargs: &[(String, Expr)]) {
        let title = get_builtin_spec(name)
            .and_then(|spec| {
                resolve_call_args(spec.params, spec.required, false, args, kwargs).ok()
            })
            .and_then(|slots| match slots.get(1).copied().flatten() {
                Some(Expr::StringLiteral(s)) => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.ctx.metadata.plots.push(PlotMeta {
            id: format!("plot{}", self.plot_counter),
            title,
        });
        self.plot_counter += 1;
    }

    /// Lowers a conditional block. Reassignments under conditions become
    /// per-variable `$.op.select` chains; a variable whose guarded value
    /// or guard reads its own history gets a bar loop instead, with the
    /// conditions folded into per-bar ternaries.
    fn lower_if(
        &mut self,
        condition: &Expr,
        then_body: &[Stmt],
        else_body: Option<&[Stmt]>,
    ) -> Result<()> {
        let mut entries = Vec::new();
        let mut chain = Vec::new();
        collect_guarded(condition, then_body, else_body, &mut chain, &mut entries)?;

        let mut vars: Vec<&str> = Vec::new();
        for e in &entries {
            if !vars.contains(&e.name) {
                vars.push(e.name);
            }
        }

        // Per-variable lowering evaluates each variable's statement
        // against pre-block bindings; references between the block's
        // variables would observe partially updated state.
        for e in &entries {
            for &v in &vars {
                let value_conflict = v != e.name && reads_var(e.value, v);
                let cond_conflict =
                    vars.len() > 1 && e.conds.iter().any(|(c, _)| reads_var(c, v));
                if value_conflict || cond_conflict {
                    return Err(KelpieError::UnsupportedConstruct {
                        construct: format!(
                            "conditional reassignment of '{}' reading '{v}' from the same block",
                            e.name
                        ),
                        line: e.span.line,
                        col: e.span.col,
                    });
                }
            }
        }

        for &v in &vars {
            let var_entries: Vec<&GuardedReassign> =
                entries.iter().filter(|e| e.name == v).collect();
            let recursive = var_entries.iter().any(|e| {
                reads_history_of(e.value, v)
                    || e.conds.iter().any(|(c, _)| reads_history_of(c, v))
            });
            if recursive {
                self.emit_bar_loop(v, &var_entries)?;
            } else {
                self.emit_selects(v, &var_entries)?;
            }
        }
        Ok(())
    }

    fn emit_selects(&mut self, name: &str, entries: &[&GuardedReassign]) -> Result<()> {
        let target = self.ctx.emitted_name(name);
        // Each entry wraps the accumulator in statement order, so when
        // guards overlap the textually last reassignment wins.
        let mut acc = target.clone();
        for entry in entries {
            let cond = self.cond_series(&entry.conds)?;
            let rhs = self.emit_series(entry.value)?;
            acc = format!("$.op.select({cond}, {rhs}, {acc})");
        }
        self.push_line(&format!("{target} = {acc};"));
        Ok(())
    }

    fn cond_series(&self, conds: &[(&Expr, bool)]) -> Result<String> {
        let mut acc: Option<String> = None;
        for &(cond, polarity) in conds {
            let mut js = self.emit_series(cond)?;
            if !polarity {
                js = format!("$.op.not({js})");
            }
            acc = Some(match acc {
                Some(prev) => format!("$.op.and({prev}, {js})"),
                None => js,
            });
        }
        acc.ok_or_else(|| internal("conditional entry with empty guard chain".to_string()))
    }

    /// Emits one variable's reassignments as an explicit bar loop.
    fn emit_bar_loop(&mut self, name: &str, entries: &[&GuardedReassign]) -> Result<()> {
        let target = self.ctx.emitted_name(name);
        let mut lp = BarLoop {
            hoists: Vec::new(),
            uses_prev: false,
        };

        let mut acc = format!("$.at({target}, $i)");
        for entry in entries {
            let rhs = self.emit_bar(entry.value, name, &target, &mut lp)?;
            if entry.conds.is_empty() {
                acc = rhs;
            } else {
                let cond = self.cond_bar(&entry.conds, name, &target, &mut lp)?;
                acc = format!("({cond} ? {rhs} : {acc})");
            }
        }

        let mut block = String::new();
        block.push_str(&format!("{target} = (() => {{\n"));
        block.push_str("  const $n = $.bars;\n");
        block.push_str("  const $out = new Array($n).fill(NaN);\n");
        for (i, expr) in lp.hoists.iter().enumerate() {
            block.push_str(&format!("  const $h{i} = {expr};\n"));
        }
        block.push_str("  for (let $i = 0; $i < $n; $i++) {\n");
        if lp.uses_prev {
            block.push_str("    const $prev = $i >= 1 ? $out[$i - 1] : NaN;\n");
        }
        block.push_str(&format!("    $out[$i] = {acc};\n"));
        block.push_str("  }\n");
        block.push_str("  return $.series($out);\n");
        block.push_str("})();");
        self.push_line(&block);
        Ok(())
    }

    fn cond_bar(
        &self,
        conds: &[(&Expr, bool)],
        var: &str,
        target: &str,
        lp: &mut BarLoop,
    ) -> Result<String> {
        let mut parts = Vec::new();
        for &(cond, polarity) in conds {
            let js = self.emit_bar(cond, var, target, lp)?;
            parts.push(if polarity { js } else { format!("!{js}") });
        }
        Ok(parts.join(" && "))
    }

    /// Whole-series expression emission.
    fn emit_series(&self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::IntLiteral(n) => Ok(n.to_string()),
            Expr::FloatLiteral(f) => Ok(f.to_string()),
            Expr::StringLiteral(s) => Ok(format!("\"{}\"", escape_js_string(s))),
            Expr::BoolLiteral(b) => Ok(b.to_string()),
            Expr::Ident { name, .. } => {
                if self.locals.iter().any(|p| p == name) {
                    return Ok(name.clone());
                }
                if let Some(value) = series_var_target(name) {
                    return Ok(value.to_string());
                }
                if let Some(sym) = self.ctx.symbols.lookup(name) {
                    return Ok(match &sym.target {
                        Some(target) => target.clone(),
                        None => self.ctx.emitted_name(name),
                    });
                }
                Err(internal(format!(
                    "identifier '{name}' reached generation unresolved"
                )))
            }
            Expr::Member { object, name, .. } => {
                if object == "color" {
                    if let Some(target) = color_constant_target(name) {
                        return Ok(target);
                    }
                }
                Err(internal(format!(
                    "member '{object}.{name}' reached generation unresolved"
                )))
            }
            Expr::BinOp { left, op, right } => {
                let l = self.emit_series(left)?;
                let r = self.emit_series(right)?;
                Ok(format!("$.op.{}({l}, {r})", series_op(*op)))
            }
            Expr::UnaryOp { op, operand } => {
                let js = self.emit_series(operand)?;
                Ok(match op {
                    UnaryOp::Neg => format!("$.op.neg({js})"),
                    UnaryOp::Not => format!("$.op.not({js})"),
                    UnaryOp::Pos => js,
                })
            }
            Expr::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let c = self.emit_series(condition)?;
                let t = self.emit_series(then_value)?;
                let e = self.emit_series(else_value)?;
                Ok(format!("$.op.select({c}, {t}, {e})"))
            }
            Expr::Call {
                func, args, kwargs, ..
            } => self.emit_call_series(func, args, kwargs),
            Expr::History {
                id, base, offset, ..
            } => {
                let Some(access) = self.ctx.history.get(id) else {
                    return Err(internal(
                        "history node missing from the analysis table".to_string(),
                    ));
                };
                let base_js = self.emit_series(base)?;
                let offset_js = match access.offset {
                    Some(n) => n.to_string(),
                    None => self.emit_series(offset)?,
                };
                Ok(format!("$.offset({base_js}, {offset_js})"))
            }
        }
    }

    fn emit_call_series(
        &self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<String> {
        match func {
            Expr::Ident { name, .. } => {
                if let Some(spec) = get_builtin_spec(name) {
                    return self.builtin_call_series(spec, args, kwargs);
                }
                if let Some(sym) = self.ctx.symbols.lookup(name) {
                    if let SymbolKind::Function { params } = &sym.kind {
                        let params = params.clone();
                        let target = match &sym.target {
                            Some(target) => target.clone(),
                            None => self.ctx.emitted_name(name),
                        };
                        return self.user_call_series(&target, &params, args, kwargs);
                    }
                }
                Err(internal(format!(
                    "call to '{name}' reached generation unresolved"
                )))
            }
            Expr::Member { object, name, .. } => {
                if let Some(binding) = self.ctx.library_for_alias(object) {
                    if let Some(export) = binding.exports.iter().find(|e| e.name == name.as_str())
                    {
                        let target = format!("{}${}", binding.prefix, name);
                        let params = export.params.clone();
                        return self.user_call_series(&target, &params, args, kwargs);
                    }
                }
                let full = format!("{object}.{name}");
                if let Some(spec) = get_builtin_spec(&full) {
                    return self.builtin_call_series(spec, args, kwargs);
                }
                Err(internal(format!(
                    "call to '{full}' reached generation unresolved"
                )))
            }
            _ => Err(internal("call target is not a name".to_string())),
        }
    }

    fn builtin_call_series(
        &self,
        spec: &'static BuiltinSpec,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<String> {
        let source_default = matches!(spec.kind, BuiltinKind::SourceDefault { .. });
        let slots = resolve_call_args(spec.params, spec.required, source_default, args, kwargs)
            .map_err(|msg| internal(format!("'{}' failed revalidation: {msg}", spec.name)))?;

        let call_args = match spec.kind {
            BuiltinKind::SourceDefault { source } if slots[0].is_none() => {
                self.join_slot_args(&slots[1..], Some(source.to_string()))?
            }
            _ => self.join_slot_args(&slots, None)?,
        };
        Ok(format!("{}({call_args})", spec.target))
    }

    fn user_call_series(
        &self,
        target: &str,
        params: &[String],
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<String> {
        let names: Vec<&str> = params.iter().map(|s| s.as_str()).collect();
        let slots = resolve_call_args(&names, names.len(), false, args, kwargs)
            .map_err(|msg| internal(format!("'{target}' failed revalidation: {msg}")))?;
        let call_args = self.join_slot_args(&slots, None)?;
        Ok(format!("{target}({call_args})"))
    }

    /// Renders slot-mapped arguments: trailing absent slots are dropped,
    /// interior ones become `undefined` so later positions stay aligned.
    fn join_slot_args(&self, slots: &[Option<&Expr>], lead: Option<String>) -> Result<String> {
        let mut parts: Vec<Option<String>> = Vec::new();
        if let Some(lead) = lead {
            parts.push(Some(lead));
        }
        for slot in slots {
            parts.push(match slot {
                Some(expr) => Some(self.emit_series(expr)?),
                None => None,
            });
        }
        while matches!(parts.last(), Some(None)) {
            parts.pop();
        }
        let rendered: Vec<String> = parts
            .into_iter()
            .map(|p| p.unwrap_or_else(|| "undefined".to_string()))
            .collect();
        Ok(rendered.join(", "))
    }

    /// Per-bar scalar emission inside `var`'s loop. Self-history comes
    /// from the output array; everything self-free that cannot run on
    /// scalars is hoisted out as a whole-series constant.
    fn emit_bar(&self, expr: &Expr, var: &str, target: &str, lp: &mut BarLoop) -> Result<String> {
        match expr {
            Expr::IntLiteral(n) => Ok(n.to_string()),
            Expr::FloatLiteral(f) => Ok(f.to_string()),
            Expr::StringLiteral(s) => Ok(format!("\"{}\"", escape_js_string(s))),
            Expr::BoolLiteral(b) => Ok(b.to_string()),
            Expr::Ident { name, .. } => {
                if name == var {
                    return Ok(format!("$.at({target}, $i)"));
                }
                if name == "na" {
                    return Ok("NaN".to_string());
                }
                if let Some(value) = series_var_target(name) {
                    return Ok(format!("$.at({value}, $i)"));
                }
                if let Some(sym) = self.ctx.symbols.lookup(name) {
                    let emitted = match &sym.target {
                        Some(target) => target.clone(),
                        None => self.ctx.emitted_name(name),
                    };
                    return Ok(format!("$.at({emitted}, $i)"));
                }
                Err(internal(format!(
                    "identifier '{name}' reached generation unresolved"
                )))
            }
            Expr::Member { object, name, span } => {
                if object == "color" {
                    if let Some(target) = color_constant_target(name) {
                        return Ok(target);
                    }
                }
                Err(unsupported_at(
                    *span,
                    format!("'{object}.{name}' inside a recursive formula"),
                ))
            }
            Expr::BinOp { left, op, right } => {
                let l = self.emit_bar(left, var, target, lp)?;
                let r = self.emit_bar(right, var, target, lp)?;
                Ok(format!("({l} {} {r})", bar_op(*op)))
            }
            Expr::UnaryOp { op, operand } => {
                let js = self.emit_bar(operand, var, target, lp)?;
                Ok(match op {
                    UnaryOp::Neg => format!("(-{js})"),
                    UnaryOp::Not => format!("(!{js})"),
                    UnaryOp::Pos => js,
                })
            }
            Expr::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let c = self.emit_bar(condition, var, target, lp)?;
                let t = self.emit_bar(then_value, var, target, lp)?;
                let e = self.emit_bar(else_value, var, target, lp)?;
                Ok(format!("({c} ? {t} : {e})"))
            }
            Expr::History {
                id,
                base,
                offset: _,
                span,
            } => {
                let Some(access) = self.ctx.history.get(id) else {
                    return Err(internal(
                        "history node missing from the analysis table".to_string(),
                    ));
                };
                if matches!(base.as_ref(), Expr::Ident { name, .. } if name == var) {
                    return match access.offset {
                        Some(0) => Ok(format!("$.at({target}, $i)")),
                        Some(1) => {
                            lp.uses_prev = true;
                            Ok("$prev".to_string())
                        }
                        Some(k) => Ok(format!("($i >= {k} ? $out[$i - {k}] : NaN)")),
                        None => Err(unsupported_at(
                            *span,
                            format!("dynamic history offset on recursive variable '{var}'"),
                        )),
                    };
                }
                if !reads_var(expr, var) {
                    return self.hoist(expr, lp);
                }
                Err(unsupported_at(
                    *span,
                    format!("history of an expression depending on '{var}'"),
                ))
            }
            Expr::Call {
                func, args, kwargs, span,
            } => {
                if !reads_var(expr, var) {
                    return self.hoist(expr, lp);
                }
                // The call itself depends on the recursive series; only
                // pointwise builtins can run per bar.
                if let Some(spec) = call_spec(func) {
                    if spec.pointwise() {
                        let slots =
                            resolve_call_args(spec.params, spec.required, false, args, kwargs)
                                .map_err(|msg| {
                                    internal(format!("'{}' failed revalidation: {msg}", spec.name))
                                })?;
                        let mut parts: Vec<Option<String>> = Vec::new();
                        for slot in &slots {
                            parts.push(match slot {
                                Some(expr) => Some(self.emit_bar(expr, var, target, lp)?),
                                None => None,
                            });
                        }
                        while matches!(parts.last(), Some(None)) {
                            parts.pop();
                        }
                        let rendered: Vec<String> = parts
                            .into_iter()
                            .map(|p| p.unwrap_or_else(|| "undefined".to_string()))
                            .collect();
                        return Ok(format!("{}({})", spec.target, rendered.join(", ")));
                    }
                }
                let label = call_label(func);
                Err(unsupported_at(
                    *span,
                    format!("'{label}' applied to recursive variable '{var}'"),
                ))
            }
        }
    }

    /// Hoists a self-free subexpression out of the loop, reusing an
    /// existing hoist when the rendered series is identical.
    fn hoist(&self, expr: &Expr, lp: &mut BarLoop) -> Result<String> {
        let series = self.emit_series(expr)?;
        let idx = match lp.hoists.iter().position(|h| h == &series) {
            Some(idx) => idx,
            None => {
                lp.hoists.push(series);
                lp.hoists.len() - 1
            }
        };
        Ok(format!("$.at($h{idx}, $i)"))
    }
}

fn collect_guarded<'p>(
    condition: &'p Expr,
    then_body: &'p [Stmt],
    else_body: Option<&'p [Stmt]>,
    chain: &mut Vec<(&'p Expr, bool)>,
    out: &mut Vec<GuardedReassign<'p>>,
) -> Result<()> {
    chain.push((condition, true));
    for stmt in then_body {
        collect_guarded_stmt(stmt, chain, out)?;
    }
    chain.pop();
    if let Some(body) = else_body {
        chain.push((condition, false));
        for stmt in body {
            collect_guarded_stmt(stmt, chain, out)?;
        }
        chain.pop();
    }
    Ok(())
}

fn collect_guarded_stmt<'p>(
    stmt: &'p Stmt,
    chain: &mut Vec<(&'p Expr, bool)>,
    out: &mut Vec<GuardedReassign<'p>>,
) -> Result<()> {
    match stmt {
        Stmt::Reassign { name, value, span } => {
            out.push(GuardedReassign {
                name: name.as_str(),
                conds: chain.clone(),
                value,
                span: *span,
            });
            Ok(())
        }
        Stmt::If {
            condition,
            then_body,
            else_body,
            ..
        } => collect_guarded(condition, then_body, else_body.as_deref(), chain, out),
        _ => Err(internal(
            "conditional block contains a non-reassignment statement".to_string(),
        )),
    }
}

/// True when `expr` reads `name` at all, bare or through history.
fn reads_var(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Ident { name: n, .. } => n == name,
        Expr::BinOp { left, right, .. } => reads_var(left, name) || reads_var(right, name),
        Expr::UnaryOp { operand, .. } => reads_var(operand, name),
        Expr::Ternary {
            condition,
            then_value,
            else_value,
        } => {
            reads_var(condition, name)
                || reads_var(then_value, name)
                || reads_var(else_value, name)
        }
        Expr::Call { args, kwargs, .. } => {
            args.iter().any(|a| reads_var(a, name))
                || kwargs.iter().any(|(_, v)| reads_var(v, name))
        }
        Expr::History { base, offset, .. } => {
            reads_var(base, name) || reads_var(offset, name)
        }
        _ => false,
    }
}

fn call_spec(func: &Expr) -> Option<&'static BuiltinSpec> {
    match func {
        Expr::Ident { name, .. } => get_builtin_spec(name),
        Expr::Member { object, name, .. } => get_builtin_spec(&format!("{object}.{name}")),
        _ => None,
    }
}

fn call_label(func: &Expr) -> String {
    match func {
        Expr::Ident { name, .. } => name.clone(),
        Expr::Member { object, name, .. } => format!("{object}.{name}"),
        _ => "<expression>".to_string(),
    }
}

fn series_op(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Mod => "mod",
        BinOp::Eq => "eq",
        BinOp::NotEq => "neq",
        BinOp::Lt => "lt",
        BinOp::Gt => "gt",
        BinOp::LtEq => "lte",
        BinOp::GtEq => "gte",
        BinOp::And => "and",
        BinOp::Or => "or",
    }
}

fn bar_op(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "===",
        BinOp::NotEq => "!==",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::LtEq => "<=",
        BinOp::GtEq => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}

/// Maps a literal default to its metadata JSON value. Identifier
/// defaults (`input.source(close)`) are recorded by name.
fn literal_json(expr: &Expr) -> serde_json::Value {
    match expr {
        Expr::IntLiteral(n) => serde_json::Value::from(*n),
        Expr::FloatLiteral(f) => serde_json::Value::from(*f),
        Expr::BoolLiteral(b) => serde_json::Value::from(*b),
        Expr::StringLiteral(s) => serde_json::Value::from(s.as_str()),
        Expr::Ident { name, .. } => serde_json::Value::from(name.as_str()),
        _ => serde_json::Value::Null,
    }
}

fn internal(message: String) -> KelpieError {
    KelpieError::InternalInvariant(message)
}

fn unsupported_at(span: Span, construct: String) -> KelpieError {
    KelpieError::UnsupportedConstruct {
        construct,
        line: span.line,
        col: span.col,
    }
}

/// Escapes a string for a double-quoted JavaScript literal.
fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
