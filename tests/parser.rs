use rox::ast::{Expr, Stmt};
use rox::ast_printer::AstPrinter;
use rox::parser::Parser;
use rox::scanner::scan;
use rox::LoxError;

fn parse(source: &str) -> Result<Vec<Stmt>, Vec<LoxError>> {
    let (tokens, errors) = scan(source.as_bytes());
    assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
    Parser::new(tokens).parse()
}

fn print_expr(source: &str) -> String {
    let (tokens, _) = scan(source.as_bytes());
    let expr = Parser::new(tokens)
        .parse_expression()
        .expect("expression should parse");
    AstPrinter::print(&expr)
}

#[test]
fn precedence_and_grouping() {
    assert_eq!(print_expr("-123 * (45.67)"), "(* (- 123.0) (group 45.67))");
    assert_eq!(print_expr("1 + 2 * 3 - 4"), "(- (+ 1.0 (* 2.0 3.0)) 4.0)");
    assert_eq!(print_expr("a or b and !c == d"), "(or a (and b (== (! c) d)))");
    assert_eq!(print_expr("1 < 2 == true"), "(== (< 1.0 2.0) true)");
}

#[test]
fn call_and_property_chain_is_left_associative() {
    assert_eq!(print_expr("a.b(1)(2).c"), "(. (call (call (. a b) 1.0) 2.0) c)");
}

#[test]
fn assignment_targets_are_checked_after_parsing() {
    let program = parse("a.b.c = 1; x = y = 2;").unwrap();
    assert_eq!(
        AstPrinter::print_program(&program),
        "(; (= (. a b) c 1.0))\n(; (= x (= y 2.0)))"
    );

    let errors = parse("a + b = c;").unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].to_string(),
        "[line 1] Error at '=': Invalid assignment target."
    );
}

#[test]
fn for_loop_is_desugared_to_while() {
    let program = parse("for (var i = 0; i < 3; i = i + 1) print i;").unwrap();

    assert_eq!(program.len(), 1);
    assert_eq!(
        AstPrinter::print_stmt(&program[0]),
        "(block (var i 0.0) (while (< i 3.0) (block (print i) (; (= i (+ i 1.0))))))"
    );

    let bare = parse("for (;;) print 1;").unwrap();
    assert_eq!(AstPrinter::print_stmt(&bare[0]), "(while true (print 1.0))");
}

#[test]
fn class_with_superclass_and_methods() {
    let program = parse("class B < A { init(x) { this.x = x; } get() { return super.get(); } }")
        .unwrap();

    match &program[0] {
        Stmt::Class {
            name,
            superclass: Some(Expr::Variable { name: sup, .. }),
            methods,
        } => {
            assert_eq!(name.lexeme, "B");
            assert_eq!(sup.lexeme, "A");
            assert_eq!(methods.len(), 2);
            assert_eq!(methods[0].params.len(), 1);
        }
        other => panic!("expected class, got {:?}", other),
    }

    assert_eq!(
        AstPrinter::print_program(&program),
        "(class B < A (method init(x) (; (= this x x))) (method get() (return (call (super get)))))"
    );
}

#[test]
fn recovers_and_reports_every_statement_error() {
    let errors = parse("var = 1;\nprint 2;\nvar ;\n").unwrap_err();

    let lines: Vec<_> = errors.iter().filter_map(LoxError::line).collect();
    assert_eq!(lines, vec![1, 3]);
    assert_eq!(
        errors[0].to_string(),
        "[line 1] Error at '=': Expect variable name."
    );
}

#[test]
fn missing_semicolon_reports_at_end() {
    let errors = parse("print 1").unwrap_err();
    assert_eq!(
        errors[0].to_string(),
        "[line 1] Error at end: Expect ';' after value."
    );
}

#[test]
fn too_many_arguments_is_reported_but_parsing_continues() {
    let args = vec!["1"; 256].join(", ");
    let source = format!("f({});\nprint ;", args);

    let errors = parse(&source).unwrap_err();
    let messages: Vec<_> = errors.iter().map(LoxError::message).collect();

    assert_eq!(
        messages,
        vec![
            "Can't have more than 255 arguments.".to_string(),
            "Expect expression.".to_string(),
        ]
    );
}

#[test]
fn resolution_targets_get_distinct_ids() {
    let program = parse("a = a;").unwrap();

    let Stmt::Expression(Expr::Assign { id, value, .. }) = &program[0] else {
        panic!("expected assignment");
    };
    let Expr::Variable { id: read_id, .. } = value.as_ref() else {
        panic!("expected variable");
    };

    assert_ne!(id, read_id);
}

#[test]
fn printing_is_idempotent() {
    let source = "fun f(a, b) { if (a) return b; else { while (b) b = b - 1; } }\n\
                  class C { m() { print this.f; } }\n\
                  var x = f(1, \"two\");";

    let first = AstPrinter::print_program(&parse(source).unwrap());
    let second = AstPrinter::print_program(&parse(source).unwrap());

    assert_eq!(first, second);
    assert!(first.starts_with("(fun f(a b) (if-else a (return b) (block (while b"));
}
