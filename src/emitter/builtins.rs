//! Declarative builtin definition table.
//!
//! One table drives call validation in the analyzer and expansion in the
//! generator: runtime target name, parameter names for named-argument
//! mapping, arity, and whether the builtin belongs to the chart surface
//! (and is therefore rejected inside library modules).

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::context::ScriptKind;
use crate::parser::ast::Expr;

/// How a builtin call expands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// Plain runtime call: `target(args...)`.
    Function,
    /// Calls that omit the source series read a default one
    /// (`ta.highest(len)` reads the high series).
    SourceDefault { source: &'static str },
}

/// Builtin function specification.
pub struct BuiltinSpec {
    /// Normalized name (`"ta.sma"`, bare `"plot"`).
    pub name: &'static str,
    /// Runtime target (`"$.ta.sma"`); declaration calls never emit.
    pub target: &'static str,
    pub kind: BuiltinKind,
    /// Positional parameter names; named arguments map onto these.
    pub params: &'static [&'static str],
    /// How many leading parameters are required.
    pub required: usize,
    /// Chart-surface builtin, rejected inside library modules.
    pub chart_only: bool,
}

/// Builtins whose result at a bar depends only on that bar's argument
/// values. Windowed aggregates (`ta.*`, `math.sum`) are excluded: a bar
/// loop must hoist them as whole-series values, never call them on
/// scalars.
const POINTWISE_BUILTINS: &[&str] = &[
    "math.abs", "math.max", "math.min", "math.avg", "math.pow", "math.sqrt", "math.log",
    "math.exp", "math.floor", "math.ceil", "math.round", "math.sign", "str.tostring", "color.new",
    "color.rgb", "na", "nz",
];

impl BuiltinSpec {
    /// Safe for a bar loop to call on per-bar scalars.
    pub fn pointwise(&self) -> bool {
        POINTWISE_BUILTINS.contains(&self.name)
    }
}

/// Builtin function registry.
pub const BUILTIN_SPECS: &[BuiltinSpec] = &[
    // Script declarations. Validated like calls, emitted as metadata only.
    BuiltinSpec {
        name: "indicator",
        target: "",
        kind: BuiltinKind::Function,
        params: &["title", "shorttitle", "overlay"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "strategy",
        target: "",
        kind: BuiltinKind::Function,
        params: &["title", "shorttitle", "overlay"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "library",
        target: "",
        kind: BuiltinKind::Function,
        params: &["title"],
        required: 1,
        chart_only: false,
    },
    // Chart surface.
    BuiltinSpec {
        name: "plot",
        target: "$.plot",
        kind: BuiltinKind::Function,
        params: &["series", "title", "color", "linewidth"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "plotshape",
        target: "$.plotshape",
        kind: BuiltinKind::Function,
        params: &["series", "title", "style", "color"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "hline",
        target: "$.hline",
        kind: BuiltinKind::Function,
        params: &["price", "title", "color"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "bgcolor",
        target: "$.bgcolor",
        kind: BuiltinKind::Function,
        params: &["color"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "barcolor",
        target: "$.barcolor",
        kind: BuiltinKind::Function,
        params: &["color"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "alertcondition",
        target: "$.alertcondition",
        kind: BuiltinKind::Function,
        params: &["condition", "title", "message"],
        required: 1,
        chart_only: true,
    },
    // Value helpers.
    BuiltinSpec {
        name: "na",
        target: "$.na",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "nz",
        target: "$.nz",
        kind: BuiltinKind::Function,
        params: &["value", "replacement"],
        required: 1,
        chart_only: false,
    },
    // Inputs. The generator prepends the bound variable name as the
    // stable input id.
    BuiltinSpec {
        name: "input",
        target: "$.input.value",
        kind: BuiltinKind::Function,
        params: &["defval", "title"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "input.int",
        target: "$.input.int",
        kind: BuiltinKind::Function,
        params: &["defval", "title", "minval", "maxval", "step"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "input.float",
        target: "$.input.float",
        kind: BuiltinKind::Function,
        params: &["defval", "title", "minval", "maxval", "step"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "input.bool",
        target: "$.input.bool",
        kind: BuiltinKind::Function,
        params: &["defval", "title"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "input.string",
        target: "$.input.string",
        kind: BuiltinKind::Function,
        params: &["defval", "title"],
        required: 1,
        chart_only: true,
    },
    BuiltinSpec {
        name: "input.source",
        target: "$.input.source",
        kind: BuiltinKind::Function,
        params: &["defval", "title"],
        required: 1,
        chart_only: true,
    },
    // Technical analysis.
    BuiltinSpec {
        name: "ta.sma",
        target: "$.ta.sma",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.ema",
        target: "$.ta.ema",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.rma",
        target: "$.ta.rma",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.wma",
        target: "$.ta.wma",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.vwma",
        target: "$.ta.vwma",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.rsi",
        target: "$.ta.rsi",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.stdev",
        target: "$.ta.stdev",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.mom",
        target: "$.ta.mom",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.roc",
        target: "$.ta.roc",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.change",
        target: "$.ta.change",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.cum",
        target: "$.ta.cum",
        kind: BuiltinKind::Function,
        params: &["source"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.highest",
        target: "$.ta.highest",
        kind: BuiltinKind::SourceDefault { source: "$.high" },
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.lowest",
        target: "$.ta.lowest",
        kind: BuiltinKind::SourceDefault { source: "$.low" },
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.atr",
        target: "$.ta.atr",
        kind: BuiltinKind::Function,
        params: &["length"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.crossover",
        target: "$.ta.crossover",
        kind: BuiltinKind::Function,
        params: &["source1", "source2"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.crossunder",
        target: "$.ta.crossunder",
        kind: BuiltinKind::Function,
        params: &["source1", "source2"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.cross",
        target: "$.ta.cross",
        kind: BuiltinKind::Function,
        params: &["source1", "source2"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.valuewhen",
        target: "$.ta.valuewhen",
        kind: BuiltinKind::Function,
        params: &["condition", "source", "occurrence"],
        required: 3,
        chart_only: false,
    },
    BuiltinSpec {
        name: "ta.barssince",
        target: "$.ta.barssince",
        kind: BuiltinKind::Function,
        params: &["condition"],
        required: 1,
        chart_only: false,
    },
    // Math.
    BuiltinSpec {
        name: "math.abs",
        target: "$.math.abs",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.max",
        target: "$.math.max",
        kind: BuiltinKind::Function,
        params: &["value1", "value2"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.min",
        target: "$.math.min",
        kind: BuiltinKind::Function,
        params: &["value1", "value2"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.avg",
        target: "$.math.avg",
        kind: BuiltinKind::Function,
        params: &["value1", "value2"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.pow",
        target: "$.math.pow",
        kind: BuiltinKind::Function,
        params: &["base", "exponent"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.sqrt",
        target: "$.math.sqrt",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.log",
        target: "$.math.log",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.exp",
        target: "$.math.exp",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.floor",
        target: "$.math.floor",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.ceil",
        target: "$.math.ceil",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.round",
        target: "$.math.round",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.sign",
        target: "$.math.sign",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "math.sum",
        target: "$.math.sum",
        kind: BuiltinKind::Function,
        params: &["source", "length"],
        required: 2,
        chart_only: false,
    },
    // Strings and colors.
    BuiltinSpec {
        name: "str.tostring",
        target: "$.str.tostring",
        kind: BuiltinKind::Function,
        params: &["value"],
        required: 1,
        chart_only: false,
    },
    BuiltinSpec {
        name: "color.new",
        target: "$.color.new",
        kind: BuiltinKind::Function,
        params: &["color", "transp"],
        required: 2,
        chart_only: false,
    },
    BuiltinSpec {
        name: "color.rgb",
        target: "$.color.rgb",
        kind: BuiltinKind::Function,
        params: &["red", "green", "blue", "transp"],
        required: 3,
        chart_only: false,
    },
];

pub static BUILTIN_MAP: Lazy<HashMap<&'static str, &'static BuiltinSpec>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for spec in BUILTIN_SPECS {
        m.insert(spec.name, spec);
    }
    m
});

/// Looks up a spec by normalized name (`"plot"`, `"ta.sma"`).
pub fn get_builtin_spec(name: &str) -> Option<&'static BuiltinSpec> {
    BUILTIN_MAP.get(name).copied()
}

/// Bare identifiers that resolve to runtime values.
pub const SERIES_VARS: &[(&str, &str)] = &[
    ("open", "$.open"),
    ("high", "$.high"),
    ("low", "$.low"),
    ("close", "$.close"),
    ("volume", "$.volume"),
    ("hl2", "$.hl2"),
    ("hlc3", "$.hlc3"),
    ("ohlc4", "$.ohlc4"),
    ("bar_index", "$.bar_index"),
    ("time", "$.time"),
    ("na", "NaN"),
];

pub fn series_var_target(name: &str) -> Option<&'static str> {
    SERIES_VARS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, target)| *target)
}

/// Color constants usable in value position (`color.red`).
pub const COLOR_CONSTANTS: &[&str] = &[
    "red", "green", "blue", "orange", "purple", "gray", "silver", "black", "white", "yellow",
    "aqua", "lime", "maroon", "navy", "olive", "teal", "fuchsia",
];

pub fn color_constant_target(name: &str) -> Option<String> {
    COLOR_CONSTANTS
        .iter()
        .find(|c| **c == name)
        .map(|c| format!("$.color.{c}"))
}

/// Namespaces this transpiler resolves through the builtin table.
pub const BUILTIN_NAMESPACES: &[&str] = &["ta", "math", "str", "input", "color"];

/// Namespaces recognized but deliberately not covered. Calls into these
/// report an unsupported construct instead of an unknown name.
pub const UNSUPPORTED_NAMESPACES: &[&str] = &[
    "array", "matrix", "map", "line", "label", "box", "table", "strategy", "request", "ticker",
    "syminfo", "barstate", "session", "timeframe",
];

pub fn is_builtin_namespace(name: &str) -> bool {
    BUILTIN_NAMESPACES.contains(&name)
}

pub fn is_unsupported_namespace(name: &str) -> bool {
    UNSUPPORTED_NAMESPACES.contains(&name)
}

/// Script declaration calls (`indicator`, `strategy`, `library`).
pub fn declaration_kind(name: &str) -> Option<ScriptKind> {
    match name {
        "indicator" => Some(ScriptKind::Indicator),
        "strategy" => Some(ScriptKind::Strategy),
        "library" => Some(ScriptKind::Library),
        _ => None,
    }
}

/// Maps positional and named arguments onto a parameter list, returning
/// one slot per parameter. `source_default` implements the shifted
/// positional form of builtins like `ta.highest(length)`.
pub fn resolve_call_args<'a>(
    params: &[&str],
    required: usize,
    source_default: bool,
    args: &'a [Expr],
    kwargs: &'a [(String, Expr)],
) -> std::result::Result<Vec<Option<&'a Expr>>, String> {
    let mut slots: Vec<Option<&'a Expr>> = vec![None; params.len()];
    let provided = args.len() + kwargs.len();
    let skip_source = source_default
        && provided < params.len()
        && !kwargs.iter().any(|(n, _)| n == params[0]);
    let base = usize::from(skip_source);
    if args.len() + base > params.len() {
        return Err(format!(
            "expected at most {} arguments, got {}",
            params.len(),
            args.len()
        ));
    }
    for (i, arg) in args.iter().enumerate() {
        slots[base + i] = Some(arg);
    }
    for (name, value) in kwargs {
        let Some(idx) = params.iter().position(|p| p == name) else {
            return Err(format!("unknown argument '{name}'"));
        };
        if slots[idx].is_some() {
            return Err(format!("argument '{name}' provided twice"));
        }
        slots[idx] = Some(value);
    }
    for (i, param) in params.iter().enumerate().take(required) {
        if slots[i].is_none() && !(source_default && i == 0) {
            return Err(format!("missing argument '{param}'"));
        }
    }
    Ok(slots)
}
