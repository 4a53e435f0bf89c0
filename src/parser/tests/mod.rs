//! parser module tests

use super::*;
use crate::error::KelpieError;

#[test]
fn test_parse_simple_assignment() {
    let result = parse("len = 9").unwrap();
    assert_eq!(result.statements.len(), 1);
    if let Stmt::Assign { name, value, span } = &result.statements[0] {
        assert_eq!(name, "len");
        assert_eq!(*value, Expr::IntLiteral(9));
        assert_eq!(*span, Span::new(1, 1));
    } else {
        panic!("expected assignment");
    }
}

#[test]
fn test_parse_reassignment_is_distinct() {
    let result = parse("x = 1\nx := 2\n").unwrap();
    assert!(matches!(result.statements[0], Stmt::Assign { .. }));
    assert!(matches!(result.statements[1], Stmt::Reassign { .. }));
}

#[test]
fn test_parse_program_without_eof_sentinel() {
    let program = Parser::new(Vec::new()).parse_program().unwrap();
    assert!(program.statements.is_empty());
    assert_eq!(program.version, None);

    let tokens = vec![
        Token::new(TokenKind::Ident("x".to_string()), "x", 1, 1),
        Token::new(TokenKind::Operator(Operator::Assign), "=", 1, 3),
        Token::new(TokenKind::IntLiteral(1), "1", 1, 5),
        Token::new(TokenKind::Newline, "\n", 1, 6),
    ];
    let program = Parser::new(tokens).parse_program().unwrap();
    assert_eq!(program.statements.len(), 1);
    assert!(matches!(program.statements[0], Stmt::Assign { .. }));
}

#[test]
fn test_parse_version_pragma() {
    let result = parse("//@version=5\nx = 1\n").unwrap();
    assert_eq!(result.version, Some(5));
    assert_eq!(result.statements.len(), 1);
}

#[test]
fn test_parse_misplaced_version_pragma() {
    let err = parse("x = 1\n//@version=5\n").unwrap_err();
    match err {
        KelpieError::ParseError { message, .. } => {
            assert!(message.contains("version pragma"));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_parse_precedence() {
    let result = parse("y = a + b * c").unwrap();
    if let Stmt::Assign { value, .. } = &result.statements[0] {
        if let Expr::BinOp { op, right, .. } = value {
            assert_eq!(*op, BinOp::Add);
            assert!(matches!(
                **right,
                Expr::BinOp {
                    op: BinOp::Mul,
                    ..
                }
            ));
        } else {
            panic!("expected binary op");
        }
    }
}

#[test]
fn test_parse_comparison_binds_looser_than_arithmetic() {
    let result = parse("y = a + 1 > b").unwrap();
    if let Stmt::Assign { value, .. } = &result.statements[0] {
        assert!(matches!(value, Expr::BinOp { op: BinOp::Gt, .. }));
    }
}

#[test]
fn test_parse_ternary() {
    let result = parse("y = c ? a : b").unwrap();
    if let Stmt::Assign { value, .. } = &result.statements[0] {
        assert!(matches!(value, Expr::Ternary { .. }));
    }
}

#[test]
fn test_parse_nested_ternary_right_associative() {
    let result = parse("y = a ? 1 : b ? 2 : 3").unwrap();
    if let Stmt::Assign { value, .. } = &result.statements[0] {
        if let Expr::Ternary { else_value, .. } = value {
            assert!(matches!(**else_value, Expr::Ternary { .. }));
        } else {
            panic!("expected ternary");
        }
    }
}

#[test]
fn test_parse_history_access() {
    let result = parse("y = close[1]").unwrap();
    if let Stmt::Assign { value, .. } = &result.statements[0] {
        if let Expr::History { base, offset, .. } = value {
            assert!(matches!(**base, Expr::Ident { ref name, .. } if name == "close"));
            assert_eq!(**offset, Expr::IntLiteral(1));
        } else {
            panic!("expected history access");
        }
    }
}

#[test]
fn test_parse_history_node_ids_are_unique() {
    let result = parse("y = close[1] + close[2]").unwrap();
    let mut ids = Vec::new();
    if let Stmt::Assign { value, .. } = &result.statements[0] {
        if let Expr::BinOp { left, right, .. } = value {
            for side in [left, right] {
                if let Expr::History { id, .. } = &**side {
                    ids.push(*id);
                }
            }
        }
    }
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn test_parse_history_of_call() {
    let result = parse("y = ta.sma(close, 9)[1]").unwrap();
    if let Stmt::Assign { value, .. } = &result.statements[0] {
        if let Expr::History { base, .. } = value {
            assert!(matches!(**base, Expr::Call { .. }));
        } else {
            panic!("expected history access over call");
        }
    }
}

#[test]
fn test_parse_namespaced_call_with_kwargs() {
    let result = parse(r#"p = input.int(9, title="Length")"#).unwrap();
    if let Stmt::Assign { value, .. } = &result.statements[0] {
        if let Expr::Call {
            func, args, kwargs, ..
        } = value
        {
            assert!(
                matches!(**func, Expr::Member { ref object, ref name, .. } if object == "input" && name == "int")
            );
            assert_eq!(args.len(), 1);
            assert_eq!(kwargs.len(), 1);
            assert_eq!(kwargs[0].0, "title");
        } else {
            panic!("expected call");
        }
    }
}

#[test]
fn test_parse_positional_after_named_is_error() {
    let err = parse(r#"p = plot(title="x", close)"#).unwrap_err();
    match err {
        KelpieError::ParseError { message, .. } => {
            assert!(message.contains("positional argument after named"));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_parse_nested_member_access_is_error() {
    let err = parse("y = a.b.c").unwrap_err();
    assert!(matches!(err, KelpieError::ParseError { .. }));
}

#[test]
fn test_parse_import_with_alias() {
    let result = parse("import acme/util/2 as u\n").unwrap();
    if let Stmt::Import {
        specifier, alias, ..
    } = &result.statements[0]
    {
        assert_eq!(specifier, "acme/util/2");
        assert_eq!(alias, "u");
    } else {
        panic!("expected import");
    }
}

#[test]
fn test_parse_import_default_alias_is_library_name() {
    let result = parse("import acme/util/2\n").unwrap();
    if let Stmt::Import { alias, .. } = &result.statements[0] {
        assert_eq!(alias, "util");
    }
}

#[test]
fn test_parse_function_def() {
    let result = parse("boost(x, f) => x * f\n").unwrap();
    if let Stmt::FuncDef {
        name,
        params,
        exported,
        ..
    } = &result.statements[0]
    {
        assert_eq!(name, "boost");
        assert_eq!(params, &vec!["x".to_string(), "f".to_string()]);
        assert!(!exported);
    } else {
        panic!("expected function definition");
    }
}

#[test]
fn test_parse_exported_function_def() {
    let result = parse("export boost(x) => x * 2\n").unwrap();
    if let Stmt::FuncDef { exported, .. } = &result.statements[0] {
        assert!(exported);
    }
}

#[test]
fn test_parse_duplicate_parameter_is_error() {
    let err = parse("f(a, a) => a\n").unwrap_err();
    match err {
        KelpieError::ParseError { message, .. } => {
            assert!(message.contains("duplicate parameter"));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_parse_multi_line_function_body_is_unsupported() {
    let err = parse("f(a) =>\n    a * 2\n").unwrap_err();
    assert!(matches!(err, KelpieError::UnsupportedConstruct { .. }));
}

#[test]
fn test_call_statement_is_not_function_def() {
    let result = parse("plot(close)\n").unwrap();
    assert!(matches!(result.statements[0], Stmt::Expr(Expr::Call { .. })));
}

#[test]
fn test_parse_if_else() {
    let code = "if c\n    x := 1\nelse\n    x := 2\n";
    let result = parse(code).unwrap();
    if let Stmt::If {
        then_body,
        else_body,
        ..
    } = &result.statements[0]
    {
        assert_eq!(then_body.len(), 1);
        assert_eq!(else_body.as_ref().unwrap().len(), 1);
    } else {
        panic!("expected if statement");
    }
}

#[test]
fn test_parse_else_if_chain() {
    let code = "if a\n    x := 1\nelse if b\n    x := 2\nelse\n    x := 3\n";
    let result = parse(code).unwrap();
    if let Stmt::If { else_body, .. } = &result.statements[0] {
        let chained = else_body.as_ref().unwrap();
        assert_eq!(chained.len(), 1);
        assert!(matches!(chained[0], Stmt::If { .. }));
    }
}

#[test]
fn test_parse_declaration_in_conditional_block_is_unsupported() {
    let code = "if c\n    x = 1\n";
    let err = parse(code).unwrap_err();
    assert!(matches!(err, KelpieError::UnsupportedConstruct { .. }));
}

#[test]
fn test_parse_for_loop_is_unsupported() {
    let err = parse("for i\n    x := 1\n").unwrap_err();
    match err {
        KelpieError::UnsupportedConstruct { construct, .. } => {
            assert!(construct.contains("for"));
        }
        other => panic!("expected unsupported construct, got {other:?}"),
    }
}

#[test]
fn test_parse_var_declaration_is_unsupported() {
    let err = parse("var x = 0\n").unwrap_err();
    assert!(matches!(err, KelpieError::UnsupportedConstruct { .. }));
}

#[test]
fn test_parse_error_carries_position() {
    let err = parse("x = \n").unwrap_err();
    match err {
        KelpieError::ParseError { line, col, .. } => {
            assert_eq!(line, 1);
            assert_eq!(col, 5);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_parse_multi_line_call() {
    let code = "plot(close,\n    \"Price\")\n";
    let result = parse(code).unwrap();
    assert_eq!(result.statements.len(), 1);
    assert!(matches!(result.statements[0], Stmt::Expr(Expr::Call { .. })));
}

#[test]
fn test_parse_unary_chain() {
    let result = parse("y = not -x").unwrap();
    if let Stmt::Assign { value, .. } = &result.statements[0] {
        if let Expr::UnaryOp { op, operand } = value {
            assert_eq!(*op, UnaryOp::Not);
            assert!(matches!(
                **operand,
                Expr::UnaryOp {
                    op: UnaryOp::Neg,
                    ..
                }
            ));
        } else {
            panic!("expected unary op");
        }
    }
}
