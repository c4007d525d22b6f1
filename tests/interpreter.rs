mod common;

use common::{output_of, run, session, SharedBuf};
use rox::interpreter::DEFAULT_MAX_CALL_DEPTH;
use rox::lox::{Lox, RunError};

fn runtime_error(source: &str) -> (String, String, Option<usize>) {
    let (out, result) = run(source);
    match result {
        Err(RunError::Runtime(e)) => (out, e.message(), e.line()),
        other => panic!("expected runtime error, got {:?}", other),
    }
}

// ── scoping ─────────────────────────────────────────────────────────────────

#[test]
fn block_shadowing_restores_outer_binding() {
    assert_eq!(
        output_of("var a = 1; { var a = 2; print a; } print a;"),
        "2\n1\n"
    );
}

#[test]
fn closures_bind_lexically_not_dynamically() {
    let source = r#"
        var a = "global";
        {
            fun showA() { print a; }
            showA();
            var a = "block";
            showA();
        }
    "#;
    assert_eq!(output_of(source), "global\nglobal\n");
}

#[test]
fn counter_shares_captured_environment() {
    let source = r#"
        fun makeCounter() {
            var i = 0;
            fun inc() { i = i + 1; return i; }
            return inc;
        }
        var c = makeCounter();
        print c();
        print c();
        var d = makeCounter();
        print d();
    "#;
    assert_eq!(output_of(source), "1\n2\n1\n");
}

#[test]
fn globals_may_be_redefined_and_used_before_definition() {
    let source = r#"
        fun later() { return value; }
        var value = 1;
        var value = 2;
        print later();
    "#;
    assert_eq!(output_of(source), "2\n");
}

#[test]
fn nil_binding_reads_as_nil() {
    assert_eq!(output_of("var a; print a; { var b; print b; }"), "nil\nnil\n");
}

// ── control flow ────────────────────────────────────────────────────────────

#[test]
fn for_and_while_loops() {
    assert_eq!(
        output_of("for (var i = 0; i < 3; i = i + 1) print i;"),
        "0\n1\n2\n"
    );
    assert_eq!(
        output_of("var n = 3; while (n > 0) { print n; n = n - 1; }"),
        "3\n2\n1\n"
    );
}

#[test]
fn for_loop_closures_share_one_variable() {
    let source = r#"
        var fs = nil;
        for (var i = 0; i < 2; i = i + 1) {
            fun f() { print i; }
            if (i == 0) fs = f;
        }
        fs();
    "#;
    assert_eq!(output_of(source), "2\n");
}

#[test]
fn return_unwinds_only_to_its_call() {
    let source = r#"
        fun find() {
            var i = 0;
            while (true) {
                if (i == 3) return i;
                i = i + 1;
            }
        }
        fun outer() { var r = find(); return r * 10; }
        print outer();
        fun none() { return; }
        print none();
        fun fallsOff() {}
        print fallsOff();
    "#;
    assert_eq!(output_of(source), "30\nnil\nnil\n");
}

#[test]
fn recursion() {
    let source = r#"
        fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
        print fib(15);
    "#;
    assert_eq!(output_of(source), "610\n");
}

// ── operators ───────────────────────────────────────────────────────────────

#[test]
fn truthiness_and_equality() {
    let source = r#"
        if ("") print "empty string truthy";
        if (0) print "zero truthy";
        if (nil) print "nope"; else print "nil falsy";
        print nil == nil;
        print nil == false;
        print 1 == "1";
        print "a" == "a";
        print !nil;
    "#;
    assert_eq!(
        output_of(source),
        "empty string truthy\nzero truthy\nnil falsy\ntrue\nfalse\nfalse\ntrue\ntrue\n"
    );
}

#[test]
fn logical_operators_return_operands() {
    let source = r#"
        print nil or "fallback";
        print 1 and 2;
        print false and undefinedName;
        print "left" or undefinedName;
    "#;
    assert_eq!(output_of(source), "fallback\n2\nfalse\nleft\n");
}

#[test]
fn arithmetic_and_formatting() {
    assert_eq!(
        output_of("print 1 + 2; print 7 / 2; print -3 * 2; print \"con\" + \"cat\"; print 1 / 0;"),
        "3\n3.5\n-6\nconcat\nInfinity\n"
    );
}

#[test]
fn type_errors_name_the_operator_line() {
    let (_, msg, line) = runtime_error("\n\"a\" + 1;");
    assert_eq!(msg, "Operands must be two numbers or two strings.");
    assert_eq!(line, Some(2));

    let (_, msg, _) = runtime_error("print 1 < \"2\";");
    assert_eq!(msg, "Operands must be numbers.");

    let (_, msg, _) = runtime_error("print -\"x\";");
    assert_eq!(msg, "Operand must be a number.");
}

#[test]
fn runtime_error_halts_remaining_statements() {
    let (out, msg, _) = runtime_error("print 1; print undefinedThing; print 2;");
    assert_eq!(out, "1\n");
    assert_eq!(msg, "Undefined variable 'undefinedThing'.");
}

#[test]
fn assignment_to_undeclared_global_fails() {
    let (_, msg, _) = runtime_error("ghost = 1;");
    assert_eq!(msg, "Undefined variable 'ghost'.");
}

// ── calls ───────────────────────────────────────────────────────────────────

#[test]
fn arity_and_callee_errors() {
    let (_, msg, line) = runtime_error("fun f(a, b) {}\nf(1);");
    assert_eq!(msg, "Expected 2 arguments but got 1.");
    assert_eq!(line, Some(2));

    let (_, msg, _) = runtime_error("\"not a function\"();");
    assert_eq!(msg, "Can only call functions and classes.");

    let (_, msg, _) = runtime_error("class A { init(x) {} } A();");
    assert_eq!(msg, "Expected 1 arguments but got 0.");
}

#[test]
fn arguments_evaluate_left_to_right() {
    let source = r#"
        var log = "";
        fun note(s) { log = log + s; return s; }
        fun three(a, b, c) {}
        three(note("a"), note("b"), note("c"));
        print log;
    "#;
    assert_eq!(output_of(source), "abc\n");
}

#[test]
fn callables_print_their_kind() {
    assert_eq!(
        output_of("fun f() {} class K {} print f; print clock; print K; print K();"),
        "<fn f>\n<native fn>\nK\nK instance\n"
    );
    assert_eq!(output_of("print clock() > 0;"), "true\n");
}

// ── classes ─────────────────────────────────────────────────────────────────

#[test]
fn fields_are_created_on_write_and_shadow_methods() {
    let source = r#"
        class Box { value() { return "method"; } }
        var b = Box();
        b.contents = 42;
        print b.contents;
        print b.value();
        b.value = "field";
        print b.value;
    "#;
    assert_eq!(output_of(source), "42\nmethod\nfield\n");
}

#[test]
fn property_errors() {
    let (_, msg, _) = runtime_error("class A {} print A().missing;");
    assert_eq!(msg, "Undefined property 'missing'.");

    let (_, msg, _) = runtime_error("var x = 1; print x.y;");
    assert_eq!(msg, "Only instances have properties.");

    let (_, msg, _) = runtime_error("var x = 1; x.y = 2;");
    assert_eq!(msg, "Only instances have fields.");
}

#[test]
fn bound_methods_remember_their_instance() {
    let source = r#"
        class Person {
            init(name) { this.name = name; }
            greet() { print "hi " + this.name; }
        }
        var greet = Person("ada").greet;
        greet();
    "#;
    assert_eq!(output_of(source), "hi ada\n");
}

#[test]
fn initializer_always_yields_instance() {
    let source = r#"
        class Foo { init() { this.ready = true; return; } }
        var f = Foo();
        print f;
        print f.ready;
        print f.init();
    "#;
    assert_eq!(output_of(source), "Foo instance\ntrue\nFoo instance\n");
}

#[test]
fn inherited_method_sees_subclass_instance() {
    let source = r#"
        class A { describe() { return "I am " + this.name; } }
        class B < A { init(name) { this.name = name; } }
        print B("b").describe();
    "#;
    assert_eq!(output_of(source), "I am b\n");
}

#[test]
fn overrides_take_priority() {
    let source = r#"
        class A { speak() { return "A"; } }
        class B < A { speak() { return "B"; } }
        print B().speak();
        print A().speak();
    "#;
    assert_eq!(output_of(source), "B\nA\n");
}

#[test]
fn super_dispatches_from_the_defining_class() {
    let source = r#"
        class A { method() { print "A method"; } }
        class B < A {
            method() { print "B method"; }
            test() { super.method(); }
        }
        class C < B {}
        C().test();
    "#;
    assert_eq!(output_of(source), "A method\n");
}

#[test]
fn super_chains_through_three_levels() {
    let source = r#"
        class A { name() { return "A"; } }
        class B < A { name() { return "B>" + super.name(); } }
        class C < B { name() { return "C>" + super.name(); } }
        print C().name();
    "#;
    assert_eq!(output_of(source), "C>B>A\n");
}

#[test]
fn inherited_initializer_runs() {
    let source = r#"
        class Base { init(x) { this.x = x; } }
        class Derived < Base { init(x, y) { super.init(x); this.y = y; } }
        var d = Derived(1, 2);
        print d.x + d.y;
        class Plain < Base {}
        print Plain(5).x;
    "#;
    assert_eq!(output_of(source), "3\n5\n");
}

#[test]
fn superclass_must_be_a_class() {
    let (_, msg, _) = runtime_error("var NotAClass = \"nope\"; class B < NotAClass {}");
    assert_eq!(msg, "Superclass must be a class.");

    let (_, msg, _) = runtime_error("class A {} class B < A { m() { return super.missing; } } B().m();");
    assert_eq!(msg, "Undefined property 'missing'.");
}

#[test]
fn instances_compare_by_identity() {
    let source = r#"
        class A {}
        var a = A();
        var b = a;
        print a == b;
        print a == A();
    "#;
    assert_eq!(output_of(source), "true\nfalse\n");
}

// ── call depth ──────────────────────────────────────────────────────────────

#[test]
fn runaway_recursion_is_a_runtime_error() {
    let (out, msg, line) = runtime_error("print \"start\";\nfun f() { f(); }\nf();");
    assert_eq!(out, "start\n");
    assert_eq!(msg, "Stack overflow.");
    assert_eq!(line, Some(2));
}

#[test]
fn recursive_constructor_overflows_cleanly() {
    let (_, msg, _) = runtime_error("class A { init() { A(); } } A();");
    assert_eq!(msg, "Stack overflow.");
}

#[test]
fn session_survives_stack_overflow() {
    let (mut lox, buf) = session();

    let err = lox
        .run(b"fun f(n) { if (n == 0) return 0; return 1 + f(n - 1); } print f(100000);")
        .unwrap_err();
    assert!(matches!(err, RunError::Runtime(_)));
    assert_eq!(err.exit_code(), 70);

    // The unwound calls released their depth, so a full-depth call fits again.
    let depth = DEFAULT_MAX_CALL_DEPTH - 1;
    lox.run(format!("print f({});", depth).as_bytes()).unwrap();
    assert_eq!(buf.contents(), format!("{}\n", depth));
}

#[test]
fn call_depth_limit_is_configurable() {
    let buf = SharedBuf::default();
    let mut lox = Lox::with_output(Box::new(buf.clone())).with_max_call_depth(3);

    lox.run(b"fun f(n) { if (n == 0) return 0; return 1 + f(n - 1); } print f(2);")
        .unwrap();
    assert_eq!(buf.contents(), "2\n");

    let err = lox.run(b"print f(3);").unwrap_err();
    assert_eq!(err.to_string(), "Stack overflow.\n[line 1]");

    // Native calls are not counted.
    lox.run(b"fun g(n) { if (n == 0) return clock() > 0; return g(n - 1); } print g(2);")
        .unwrap();
    assert_eq!(buf.contents(), "2\ntrue\n");
}

// ── sessions ────────────────────────────────────────────────────────────────

#[test]
fn session_keeps_globals_and_closures_between_runs() {
    let (mut lox, buf) = session();

    lox.run(b"var x = 1; fun makeAdder(n) { fun add(m) { return n + m; } return add; }")
        .unwrap();
    lox.run(b"var add2 = makeAdder(2);").unwrap();

    assert!(lox.run(b"print undefinedHere;").is_err());

    lox.run(b"print add2(x);").unwrap();
    assert_eq!(buf.contents(), "3\n");
}

#[test]
fn evaluate_single_expression() {
    let (mut lox, _) = session();
    assert_eq!(lox.evaluate(b"(1 + 2) * 3").unwrap().to_string(), "9");
    assert_eq!(lox.evaluate(b"\"a\" + \"b\"").unwrap().to_string(), "ab");

    let err = lox.evaluate(b"1 +").unwrap_err();
    assert_eq!(err.exit_code(), 65);

    let err = lox.evaluate(b"-nil").unwrap_err();
    assert_eq!(err.exit_code(), 70);
}
