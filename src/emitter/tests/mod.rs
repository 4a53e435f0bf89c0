use crate::context::TranspileContext;
use crate::emitter;
use crate::error::KelpieError;
use crate::parser;
use crate::semantic;
use pretty_assertions::assert_eq;

fn emitted(source: &str) -> String {
    let (js, _) = emitted_ctx(source);
    js
}

fn emitted_ctx(source: &str) -> (String, TranspileContext) {
    let program = parser::parse(source).expect("parse failed");
    let mut ctx = TranspileContext::new(None);
    semantic::analyze(&program, &mut ctx).expect("analysis failed");
    let js = emitter::emit(&program, &mut ctx).expect("emission failed");
    (js, ctx)
}

fn emitted_err(source: &str) -> KelpieError {
    let program = parser::parse(source).expect("parse failed");
    let mut ctx = TranspileContext::new(None);
    semantic::analyze(&program, &mut ctx).expect("analysis failed");
    emitter::emit(&program, &mut ctx).expect_err("emission should fail")
}

#[test]
fn wraps_body_in_runtime_closure() {
    let js = emitted("indicator(\"Spread\")\nplot(close)\n");
    assert!(js.starts_with("($) => {\n"));
    assert!(js.ends_with("}\n"));
    assert!(js.contains("\n  $.plot($.close);\n"));
}

#[test]
fn arithmetic_becomes_series_ops() {
    let js = emitted("spread = (high - low) / 2\n");
    assert!(js.contains("const spread = $.op.div($.op.sub($.high, $.low), 2);"));
}

#[test]
fn history_read_becomes_offset_call() {
    let js = emitted("mom = close - close[1]\n");
    assert!(js.contains("const mom = $.op.sub($.close, $.offset($.close, 1));"));
}

#[test]
fn reassigned_binding_uses_let() {
    let js = emitted("s = 0.0\ns := close\n");
    assert!(js.contains("let s = 0;"));
    assert!(js.contains("s = $.close;"));
}

#[test]
fn unassigned_binding_uses_const() {
    let js = emitted("basis = hl2\n");
    assert!(js.contains("const basis = $.hl2;"));
}

#[test]
fn ternary_becomes_select() {
    let js = emitted("d = close > open ? 1 : -1\n");
    assert!(js.contains(
        "const d = $.op.select($.op.gt($.close, $.open), 1, $.op.neg(1));"
    ));
}

#[test]
fn builtin_call_with_named_arguments() {
    let js = emitted("m = ta.sma(length=3, source=close)\n");
    assert!(js.contains("const m = $.ta.sma($.close, 3);"));
}

#[test]
fn source_default_is_filled_in() {
    let js = emitted("h = ta.highest(5)\nl = ta.lowest(5)\n");
    assert!(js.contains("const h = $.ta.highest($.high, 5);"));
    assert!(js.contains("const l = $.ta.lowest($.low, 5);"));
}

#[test]
fn absent_interior_argument_becomes_undefined() {
    let js = emitted("x = input.float(0.5, minval=0.1)\n");
    assert!(js.contains("const x = $.input.float(\"x\", 0.5, undefined, 0.1);"));
}

#[test]
fn na_literal_and_nz() {
    let js = emitted("x = na\ny = nz(close, 0.0)\n");
    assert!(js.contains("const x = NaN;"));
    assert!(js.contains("const y = $.nz($.close, 0);"));
}

#[test]
fn input_call_emits_keyed_read_and_metadata() {
    let (js, ctx) = emitted_ctx(
        "indicator(\"T\")\nlen = input.int(14, \"Length\", minval=1)\nplot(ta.sma(close, len))\n",
    );
    assert!(js.contains("const len = $.input.int(\"len\", 14, \"Length\", 1);"));
    assert!(js.contains("$.plot($.ta.sma($.close, len));"));
    assert_eq!(ctx.metadata.inputs.len(), 1);
    let input = &ctx.metadata.inputs[0];
    assert_eq!(input.id, "len");
    assert_eq!(input.kind, "int");
    assert_eq!(input.title, "Length");
    assert_eq!(input.default, serde_json::json!(14));
}

#[test]
fn source_input_records_identifier_default() {
    let (_, ctx) = emitted_ctx("src = input.source(hl2, \"Source\")\n");
    assert_eq!(ctx.metadata.inputs[0].kind, "source");
    assert_eq!(ctx.metadata.inputs[0].default, serde_json::json!("hl2"));
}

#[test]
fn plots_are_numbered_in_emission_order() {
    let (js, ctx) = emitted_ctx(
        "indicator(\"T\")\nplot(close, \"Close\")\nplot(open)\nplotshape(close > open, \"Up\")\n",
    );
    assert!(js.contains("$.plot($.close, \"Close\");"));
    let ids: Vec<&str> = ctx.metadata.plots.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["plot0", "plot1", "plot2"]);
    assert_eq!(ctx.metadata.plots[0].title, "Close");
    assert_eq!(ctx.metadata.plots[1].title, "");
    assert_eq!(ctx.metadata.plots[2].title, "Up");
}

#[test]
fn declaration_call_emits_nothing() {
    let js = emitted("indicator(\"T\", overlay=true)\nplot(close)\n");
    assert!(!js.contains("indicator"));
}

#[test]
fn string_arguments_are_escaped() {
    let js = emitted("plot(close, \"a \\\"b\\\"\")\n");
    assert!(js.contains("$.plot($.close, \"a \\\"b\\\"\");"));
}

#[test]
fn color_constants_and_chart_calls() {
    let js = emitted("bgcolor(color.new(color.red, 80))\nhline(30, \"OS\", color.gray)\n");
    assert!(js.contains("$.bgcolor($.color.new($.color.red, 80));"));
    assert!(js.contains("$.hline(30, \"OS\", $.color.gray);"));
}

#[test]
fn function_definition_becomes_arrow_function() {
    let js = emitted("half(x) => x / 2\nplot(half(close))\n");
    assert!(js.contains("const half = (x) => $.op.div(x, 2);"));
    assert!(js.contains("$.plot(half($.close));"));
}

#[test]
fn conditional_reassignment_folds_into_select() {
    let js = emitted("s = 0.0\nif close > open\n    s := 1.0\n");
    assert!(js.contains("s = $.op.select($.op.gt($.close, $.open), 1, s);"));
}

#[test]
fn else_branch_gets_negated_condition() {
    let js = emitted("s = 0.0\nif close > open\n    s := 1.0\nelse\n    s := 2.0\n");
    assert!(js.contains(
        "s = $.op.select($.op.not($.op.gt($.close, $.open)), 2, \
         $.op.select($.op.gt($.close, $.open), 1, s));"
    ));
}

#[test]
fn later_overlapping_update_wins() {
    let js = emitted(
        "up = close > open\nbig = high - low > 1\ns = 0.0\n\
         if up\n    s := 1.0\n    if big\n        s := 2.0\n",
    );
    assert!(js.contains(
        "s = $.op.select($.op.and(up, big), 2, $.op.select(up, 1, s));"
    ));
}

#[test]
fn nested_conditions_are_anded() {
    let js = emitted(
        "up = close > open\nwide = high - low > 1\ns = 0.0\n\
         if up\n    if wide\n        s := 1.0\n    else\n        s := 2.0\n",
    );
    assert!(js.contains("$.op.and(up, wide)"));
    assert!(js.contains("$.op.and(up, $.op.not(wide))"));
}

#[test]
fn recursive_formula_compiles_to_bar_loop() {
    let js = emitted("s = close\ns := 0.7 * close + 0.3 * s[1]\n");
    assert!(js.contains("s = (() => {"));
    assert!(js.contains("const $n = $.bars;"));
    assert!(js.contains("const $out = new Array($n).fill(NaN);"));
    assert!(js.contains("const $prev = $i >= 1 ? $out[$i - 1] : NaN;"));
    assert!(js.contains("$out[$i] = ((0.7 * $.at($.close, $i)) + (0.3 * $prev));"));
    assert!(js.contains("return $.series($out);"));
}

#[test]
fn deep_self_history_reads_output_array() {
    let js = emitted("s = close\ns := s[2] + 1\n");
    assert!(js.contains("$out[$i] = (($i >= 2 ? $out[$i - 2] : NaN) + 1);"));
}

#[test]
fn self_free_windows_are_hoisted_out_of_the_loop() {
    let js = emitted("s = 0.0\ns := nz(s[1]) + ta.sma(close, 3)\n");
    assert!(js.contains("const $h0 = $.ta.sma($.close, 3);"));
    assert!(js.contains("$out[$i] = ($.nz($prev) + $.at($h0, $i));"));
}

#[test]
fn identical_hoists_are_shared() {
    let js = emitted("s = 0.0\ns := nz(s[1]) + ta.sma(close, 3) - ta.sma(close, 3)\n");
    assert!(js.contains("const $h0 = $.ta.sma($.close, 3);"));
    assert!(!js.contains("$h1"));
}

#[test]
fn guarded_recursive_update_becomes_loop_ternary() {
    let js = emitted("stop = low\nif close > stop[1]\n    stop := math.max(stop[1], low)\n");
    assert!(js.contains(
        "$out[$i] = (($.at($.close, $i) > $prev) \
         ? $.math.max($prev, $.at($.low, $i)) : $.at(stop, $i));"
    ));
}

#[test]
fn dynamic_self_offset_is_rejected() {
    let err = emitted_err("k = 2\ns = close\ns := s[k] + 1\n");
    match err {
        KelpieError::UnsupportedConstruct { construct, .. } => {
            assert!(construct.contains("dynamic history offset"), "{construct}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn windowed_builtin_over_self_is_rejected() {
    let err = emitted_err("s = close\ns := ta.sma(s[1], 3)\n");
    match err {
        KelpieError::UnsupportedConstruct { construct, .. } => {
            assert!(construct.contains("'ta.sma'"), "{construct}");
            assert!(construct.contains("'s'"), "{construct}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn windowed_math_aggregate_over_self_is_rejected() {
    let err = emitted_err("s = close\ns := math.sum(s[1], 3)\n");
    match err {
        KelpieError::UnsupportedConstruct { construct, .. } => {
            assert!(construct.contains("'math.sum'"), "{construct}");
            assert!(construct.contains("'s'"), "{construct}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn self_free_math_sum_is_hoisted_not_inlined() {
    let js = emitted("s = 0.0\ns := nz(s[1]) + math.sum(close, 3)\n");
    assert!(js.contains("const $h0 = $.math.sum($.close, 3);"));
    assert!(js.contains("$out[$i] = ($.nz($prev) + $.at($h0, $i));"));
}

#[test]
fn cross_referencing_conditional_block_is_rejected() {
    let err = emitted_err(
        "a = 0.0\nb = 0.0\nif close > open\n    a := b + 1\n    b := 2.0\n",
    );
    match err {
        KelpieError::UnsupportedConstruct { construct, .. } => {
            assert!(construct.contains("'a'"), "{construct}");
            assert!(construct.contains("'b'"), "{construct}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn library_bindings_are_mangled() {
    let program = parser::parse(
        "library(\"util\")\nscale = 2.0\nexport boost(x) => x * scale\n",
    )
    .expect("parse failed");
    let mut ctx = TranspileContext::for_library("acme/util/1");
    semantic::analyze(&program, &mut ctx).expect("analysis failed");
    let body = emitter::emit_body(&program, &mut ctx).expect("emission failed");
    assert!(body.contains("const lib$acme_util_1$scale = 2;"));
    assert!(body.contains(
        "const lib$acme_util_1$boost = (x) => $.op.mul(x, lib$acme_util_1$scale);"
    ));
    assert_eq!(ctx.metadata.exports, vec!["boost".to_string()]);
}

#[test]
fn fragments_are_prepended_inside_the_wrapper() {
    let program = parser::parse("indicator(\"T\")\nplot(close)\n").expect("parse failed");
    let mut ctx = TranspileContext::new(None);
    semantic::analyze(&program, &mut ctx).expect("analysis failed");
    ctx.fragments
        .push("const lib$acme_util_1$boost = (x) => $.op.mul(x, 2);\n".to_string());
    let js = emitter::emit(&program, &mut ctx).expect("emission failed");
    let fragment_at = js.find("  const lib$acme_util_1$boost").expect("fragment");
    let body_at = js.find("  $.plot($.close);").expect("body");
    assert!(fragment_at < body_at);
}
