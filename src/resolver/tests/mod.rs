use crate::context::TranspileContext;
use crate::emitter;
use crate::error::KelpieError;
use crate::parser;
use crate::resolver::{self, DirLibrarySource, LibrarySource, MemoryLibrarySource};
use crate::semantic;
use pretty_assertions::assert_eq;

fn sources() -> MemoryLibrarySource {
    let mut libs = MemoryLibrarySource::new();
    libs.insert("acme/util/1", "library(\"util\")\nexport boost(x) => x * 2\n");
    libs.insert("acme/base/1", "library(\"base\")\nexport scale(x) => x * 10\n");
    libs.insert(
        "acme/chain/1",
        "library(\"chain\")\nimport acme/base/1 as base\nexport lift(x) => base.scale(x) + 1\n",
    );
    libs
}

fn resolved(source: &str, libs: &MemoryLibrarySource) -> (String, TranspileContext) {
    let program = parser::parse(source).expect("parse failed");
    let mut ctx = TranspileContext::new(None);
    resolver::resolve_program(&program, &mut ctx, Some(libs)).expect("resolution failed");
    semantic::analyze(&program, &mut ctx).expect("analysis failed");
    let js = emitter::emit(&program, &mut ctx).expect("emission failed");
    (js, ctx)
}

fn resolve_err(source: &str, libs: &MemoryLibrarySource) -> (KelpieError, TranspileContext) {
    let program = parser::parse(source).expect("parse failed");
    let mut ctx = TranspileContext::new(None);
    let err =
        resolver::resolve_program(&program, &mut ctx, Some(libs)).expect_err("should not resolve");
    (err, ctx)
}

#[test]
fn imported_function_call_uses_mangled_name() {
    let (js, _) = resolved(
        "import acme/util/1 as util\nplot(util.boost(close))\n",
        &sources(),
    );
    assert!(js.contains("  const lib$acme_util_1$boost = (x) => $.op.mul(x, 2);"));
    assert!(js.contains("$.plot(lib$acme_util_1$boost($.close));"));
}

#[test]
fn fragments_do_not_depend_on_the_alias() {
    let a = resolved("import acme/util/1 as util\nplot(util.boost(close))\n", &sources()).0;
    let b = resolved("import acme/util/1 as u\nplot(u.boost(close))\n", &sources()).0;
    assert_eq!(a, b);
}

#[test]
fn shared_import_is_compiled_once() {
    let (js, ctx) = resolved(
        "import acme/util/1 as u1\nimport acme/util/1 as u2\nplot(u1.boost(u2.boost(close)))\n",
        &sources(),
    );
    assert_eq!(js.matches("const lib$acme_util_1$boost").count(), 1);
    assert_eq!(ctx.fragments.len(), 1);
}

#[test]
fn nested_imports_come_out_in_dependency_order() {
    let (js, ctx) = resolved(
        "import acme/chain/1 as chain\nplot(chain.lift(close))\n",
        &sources(),
    );
    assert_eq!(ctx.fragments.len(), 2);
    let base_at = js.find("const lib$acme_base_1$scale").expect("base fragment");
    let chain_at = js.find("const lib$acme_chain_1$lift").expect("chain fragment");
    assert!(base_at < chain_at);
    assert!(js.contains(
        "const lib$acme_chain_1$lift = (x) => $.op.add(lib$acme_base_1$scale(x), 1);"
    ));
}

#[test]
fn imports_are_recorded_in_metadata() {
    let (_, ctx) = resolved(
        "import acme/util/1 as u\nimport acme/base/1 as b\nplot(u.boost(b.scale(close)))\n",
        &sources(),
    );
    assert_eq!(
        ctx.metadata.imports,
        vec!["acme/util/1".to_string(), "acme/base/1".to_string()]
    );
}

#[test]
fn unknown_specifier_is_an_unresolved_import() {
    let (err, ctx) = resolve_err("import acme/missing/1 as m\nplot(close)\n", &sources());
    match err {
        KelpieError::UnresolvedImport {
            importer,
            specifier,
        } => {
            assert_eq!(importer, "<main>");
            assert_eq!(specifier, "acme/missing/1");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ctx
        .diagnostics
        .diagnostics
        .iter()
        .any(|d| d.code == "KLP-UNRESOLVED-IMPORT"));
}

#[test]
fn import_cycle_reports_the_chain() {
    let mut libs = MemoryLibrarySource::new();
    libs.insert(
        "acme/a/1",
        "library(\"a\")\nimport acme/b/1 as b\nexport fa(x) => x\n",
    );
    libs.insert(
        "acme/b/1",
        "library(\"b\")\nimport acme/a/1 as a\nexport fb(x) => x\n",
    );
    let (err, _) = resolve_err("import acme/a/1 as a\nplot(close)\n", &libs);
    match err {
        KelpieError::CyclicImport { chain } => {
            assert_eq!(chain, vec!["acme/a/1", "acme/b/1", "acme/a/1"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn duplicate_alias_is_rejected() {
    let (err, _) = resolve_err(
        "import acme/util/1 as u\nimport acme/base/1 as u\nplot(close)\n",
        &sources(),
    );
    match err {
        KelpieError::SemanticError { message, .. } => {
            assert!(message.contains("alias 'u' is already in use"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn alias_shadowing_a_builtin_namespace_warns() {
    let (_, ctx) = resolved("import acme/util/1 as ta\nplot(close)\n", &sources());
    assert!(ctx
        .diagnostics
        .diagnostics
        .iter()
        .any(|d| d.code == "KLP-SHADOWED-NAMESPACE"));
}

#[test]
fn library_errors_carry_the_library_file() {
    let mut libs = MemoryLibrarySource::new();
    libs.insert(
        "acme/bad/1",
        "library(\"bad\")\nexport f(x) => x + missing\n",
    );
    let (err, ctx) = resolve_err("import acme/bad/1 as bad\nplot(close)\n", &libs);
    match err {
        KelpieError::SemanticError { message, .. } => {
            assert!(message.contains("missing"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ctx
        .diagnostics
        .diagnostics
        .iter()
        .any(|d| d.span.file.as_deref() == Some("acme/bad/1")));
}

#[test]
fn program_without_imports_never_consults_the_source() {
    struct PanickySource;
    impl LibrarySource for PanickySource {
        fn load(&self, _specifier: &str) -> Option<String> {
            panic!("library source should not be consulted")
        }
    }
    let program = parser::parse("plot(close)\n").expect("parse failed");
    let mut ctx = TranspileContext::new(None);
    resolver::resolve_program(&program, &mut ctx, Some(&PanickySource)).expect("resolve");
    assert!(ctx.fragments.is_empty());
}

#[test]
fn dir_source_rejects_traversal() {
    let libs = DirLibrarySource::new("/nonexistent");
    assert_eq!(libs.load("../secrets"), None);
    assert_eq!(libs.load("acme/../secrets"), None);
    assert_eq!(libs.load("/etc/passwd"), None);
    assert_eq!(libs.load("acme//util"), None);
    assert_eq!(libs.load("acme\\util"), None);
}
