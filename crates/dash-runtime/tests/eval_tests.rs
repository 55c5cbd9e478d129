//! End-to-end tests for Dash evaluation

use std::path::{Path, PathBuf};

use dash_runtime::{EnvRef, Evaluator, Value};
use dash_stdlib::stdlib_registry;

fn evaluator() -> Evaluator {
    Evaluator::with_natives(stdlib_registry())
}

fn eval(source: &str) -> Value {
    evaluator().eval_str(source).expect("Failed to evaluate")
}

fn render(source: &str) -> String {
    eval(source).to_string()
}

fn eval_err(source: &str) -> String {
    match evaluator().eval_str(source) {
        Ok(value) => panic!("expected an error, got {}", value.describe()),
        Err(e) => e.to_string(),
    }
}

/// Evaluator plus a module environment that survives between snippets
fn session() -> (Evaluator, EnvRef) {
    let evaluator = evaluator();
    let env = evaluator.new_root_env().expect("root env").sub();
    (evaluator, env)
}

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

// =============================================================================
// Arithmetic
// =============================================================================

#[test]
fn test_unary() {
    assert_eq!(render("-42"), "-42");
    assert_eq!(render("-(-42)"), "42");
    assert_eq!(render("+-42"), "-42");
    assert_eq!(render("!0"), "1");
    assert_eq!(render("!\"\""), "1");
}

#[test]
fn test_operator_precedence() {
    assert_eq!(render("8*6/3"), "16");
    assert_eq!(render("(8+6)/2"), "7");
    assert_eq!(render("8**2/4"), "16");
    assert_eq!(render("8/2**4"), "0.5");
    assert_eq!(render("5+6-2*4/8"), "10");
    assert_eq!(render("5+(6-2)*4/8"), "7");
    assert_eq!(render("2**3**2"), "512");
}

#[test]
fn test_numeric_result_types() {
    assert_eq!(render("typeof(1 + 2)"), "i32");
    assert_eq!(render("typeof(4 / 2)"), "float64");
    assert_eq!(render("typeof(2 ** 3)"), "i32");
    assert_eq!(render("typeof(1 + 0.5)"), "float64");
    assert_eq!(render("typeof(1 == 1)"), "i8");
    assert_eq!(render("typeof((1 as i64) + 1)"), "i64");
    assert_eq!(render("7 % 3"), "1");
    assert_eq!(eval_err("7 % 0"), "Division by zero");
}

#[test]
fn test_comparisons_are_numeric_booleans() {
    assert_eq!(render("32==32"), "1");
    assert_eq!(render("32!=40"), "1");
    assert_eq!(render("32<=31"), "0");
    assert_eq!(render("1 && 0"), "0");
    assert_eq!(render("1 || 0"), "1");
}

// =============================================================================
// Strings, arrays, objects
// =============================================================================

#[test]
fn test_string_concat() {
    assert_eq!(render(r#""a".."bc".."d".."e""#), "abcde");
    assert_eq!(render(r#""foo"==("f".."oo")"#), "1");
    assert_eq!(render(r#""n: " .. 5"#), "n: 5");
    assert_eq!(render(r#"5 .. "!""#), "5!");
}

#[test]
fn test_string_members() {
    assert_eq!(render(r#""hello".length"#), "5");
    assert_eq!(render(r#""abc".upper()"#), "ABC");
    assert_eq!(render(r#""ABC".lower()"#), "abc");
    assert_eq!(render(r#""abc"[1]"#), "b");
    assert_eq!(
        eval_err(r#""abc".nope"#),
        "property 'nope' does not exist on str"
    );
}

#[test]
fn test_array_members() {
    assert_eq!(render("[1, 2, 3].length"), "3");
    assert_eq!(render("[1, 2, 3][0]"), "1");
    assert_eq!(render("[1, 2].add(3, 4)"), "[1, 2, 3, 4]");
    assert_eq!(render("[1, 2].has(2)"), "1");
    assert_eq!(render("[1, 2].at(1)"), "2");
    assert_eq!(render(r#"[1, "a"].toString()"#), r#"[1, "a"]"#);
    assert_eq!(eval_err("[1][5]"), "Index out of bounds: 5 (length: 1)");
}

#[test]
fn test_object_members() {
    assert_eq!(render(r#"{ a: 1, b: "x" }.b"#), "x");
    assert_eq!(render(r#"{ a: 1, b: "x" }"#), r#"{ a: 1, b: "x" }"#);
    assert_eq!(
        eval_err("{ a: 1 }.zz"),
        "property 'zz' does not exist on obj"
    );
}

#[test]
fn test_json_serialization() {
    let value = eval(r#"{ a: [1, 2.5, "s"], t: i32 }"#);
    let json = serde_json::to_string(&value).unwrap();
    assert_eq!(json, r#"{"a":[1,2.5,"s"],"t":"i32"}"#);
}

// =============================================================================
// Declarations and types
// =============================================================================

#[test]
fn test_incompatible_assignment() {
    let err = eval_err(r#"x: int = 5; x = "hi""#);
    insta::assert_snapshot!(err, @"cannot assign str to 'x' of type int");
}

#[test]
fn test_declarations() {
    let (evaluator, env) = session();
    evaluator
        .eval_str_in("x := 1; y: i8 = 300; z: float = 2.5", &env)
        .unwrap();
    assert_eq!(env.get("y").unwrap().describe(), "[i8 44]");
    assert_eq!(env.get("z").unwrap().describe(), "[float64 2.5]");

    evaluator.eval_str_in(r#"x = "now a string""#, &env).unwrap();
    assert_eq!(env.get("x").unwrap().as_str(), Some("now a string"));

    let err = evaluator.eval_str_in("x := 2", &env).unwrap_err();
    assert_eq!(err.to_string(), "already declared 'x'");
    let err = evaluator.eval_str_in("w = 2", &env).unwrap_err();
    assert_eq!(err.to_string(), "cannot assign to undeclared 'w'");
}

#[test]
fn test_casts() {
    assert_eq!(render("300 as i8"), "44");
    assert_eq!(render("1.9 as i32"), "1");
    assert_eq!(render(r#""42" as i64 + 1"#), "43");
    assert_eq!(render(r#"(7 as str) .. "!""#), "7!");
    assert_eq!(eval_err("5 as int"), "ambiguous number type");
    assert_eq!(eval_err(r#""x" as i32"#), "cannot cast str to i32");
}

#[test]
fn test_type_values() {
    assert_eq!(render("typeof(1) == i32"), "1");
    assert_eq!(render(r#"typeof("a")"#), "str");
    assert_eq!(render("typeof(i32)"), "type");
    assert_eq!(render("typeof(fn() = 1)"), "func");
}

#[test]
fn test_undefined_identifier() {
    assert_eq!(eval_err("nope"), "Undefined 'nope'");
}

#[test]
fn test_unsupported_operator() {
    assert_eq!(eval_err(r#""a" - 1"#), "cannot do op - on type str");
    assert_eq!(eval_err("-[1]"), "cannot do op - on type array");
}

// =============================================================================
// Functions and overloads
// =============================================================================

#[test]
fn test_overload_selected_by_type() {
    let forward = r#"{
        fn f(x: i32) = "int"
        fn f(x: str) = "str"
        [f(1), f("a")]
    }"#;
    let backward = r#"{
        fn f(x: str) = "str"
        fn f(x: i32) = "int"
        [f(1), f("a")]
    }"#;
    assert_eq!(render(forward), r#"["int", "str"]"#);
    assert_eq!(render(backward), r#"["int", "str"]"#);
}

#[test]
fn test_overload_prefers_nearest_type() {
    let source = r#"{
        fn h(x: i64) = "i64"
        fn h(x: float64) = "float64"
        fn h(x: number) = "number"
        fn h(x: str) = "str"
        [h(1), h(1.5), h("s")]
    }"#;
    assert_eq!(render(source), r#"["i64", "float64", "str"]"#);
}

#[test]
fn test_untyped_overload_ties_with_exact_type() {
    let err = eval_err(r#"{ fn f(x) = "any"; fn f(x: i32) = "i32"; f(1) }"#);
    insta::assert_snapshot!(err, @"identical matches for args [i32] calling 'f'");
    assert_eq!(render(r#"{ fn f(x) = "any"; fn f(x: i32) = "i32"; f("s") }"#), "any");
}

#[test]
fn test_user_overload_keeps_native_overloads() {
    let source = r#"{ fn typeof(x: i32, y: i32) = "mine"; [typeof("s"), typeof(1, 2)] }"#;
    assert_eq!(render(source), r#"[str, "mine"]"#);
}

#[test]
fn test_session_overload_keeps_native_overloads() {
    let (evaluator, env) = session();
    evaluator
        .eval_str_in(r#"fn typeof(x: i32, y: i32) = "mine""#, &env)
        .unwrap();
    assert_eq!(evaluator.eval_str_in(r#"typeof("s")"#, &env).unwrap().to_string(), "str");
    assert_eq!(evaluator.eval_str_in("typeof(1, 2)", &env).unwrap().to_string(), "mine");
}

#[test]
fn test_overload_no_match() {
    let err = eval_err("{ fn f(x: i32) = 1; fn f(x: str) = 2; f([]) }");
    insta::assert_snapshot!(err, @r###"
    no match for args [array] calling 'f'
    Found (i32)
    Found (str)
    "###);
}

#[test]
fn test_overload_identical_matches() {
    let err = eval_err("{ fn g(a: i32) = 1; fn g(b: i32) = 2; g(3) }");
    insta::assert_snapshot!(err, @"identical matches for args [i32] calling 'g'");
}

#[test]
fn test_default_parameters() {
    assert_eq!(render("{ fn f(a, b = a * 2) = a + b; [f(1), f(1, 5)] }"), "[3, 6]");
}

#[test]
fn test_direct_call_errors() {
    assert_eq!(
        eval_err("{ g := fn(a, b) = a; g(1) }"),
        "incorrect arg count: expected 2, got 1"
    );
    assert_eq!(
        eval_err("{ g := fn(a: str) = a; g(1) }"),
        "arg 0 expected str got i32"
    );
    assert_eq!(
        eval_err("{ x := 5; x() }"),
        "target is not callable: [i32 5]"
    );
}

#[test]
fn test_return_types() {
    assert_eq!(render("{ fn f() -> i8 = 300; f() }"), "44");
    assert_eq!(
        eval_err("{ fn f() -> str = 1; f() }"),
        "return type mismatch: expected str, got i32"
    );
}

#[test]
fn test_recursion() {
    let source = "{ fn sum(n) = if n == 0 { 0 } else { n + sum(n - 1) }; sum(500) }";
    assert_eq!(render(source), "125250");
}

#[test]
fn test_stack_overflow_is_reported() {
    let evaluator = evaluator().with_max_depth(100);
    let err = evaluator
        .eval_str("{ fn f(n) = f(n + 1); f(0) }")
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Stack overflow: recursion deeper than 100");
}

// =============================================================================
// Closures
// =============================================================================

#[test]
fn test_closure_keeps_call_scope() {
    let source = r#"{
        fn counter() { n := 0; fn() { n = n + 1; n } }
        c := counter()
        c(); c(); c()
    }"#;
    assert_eq!(render(source), "3");
}

#[test]
fn test_closure_resolves_at_definition_site() {
    let source = r#"{
        x := "outer"
        fn show() = x
        fn call_with_local() { x := "local"; show() }
        call_with_local()
    }"#;
    assert_eq!(render(source), "outer");
}

#[test]
fn test_saved_and_live_capture_diverge() {
    let (evaluator, env) = session();
    evaluator.eval_str_in("x := 1", &env).unwrap();

    let live = evaluator.eval_str_in("fn() = x", &env).unwrap();
    let saved_env = env.save();
    let saved = evaluator.eval_str_in("fn() = x", &saved_env).unwrap();

    evaluator.eval_str_in("x = 2", &env).unwrap();

    let live = evaluator.call_value(&live, &env, &[]).unwrap();
    let saved = evaluator.call_value(&saved, &env, &[]).unwrap();
    assert_eq!(live.as_int(), Some(2));
    assert_eq!(saved.as_int(), Some(1));
}

// =============================================================================
// Control flow and iteration
// =============================================================================

#[test]
fn test_range_iteration() {
    let (evaluator, env) = session();
    evaluator
        .eval_str_in(
            "count := 0; seen := []; for i in 1..5 { count = count + 1; seen = seen.add(i) }",
            &env,
        )
        .unwrap();
    assert_eq!(env.get("count").unwrap().as_int(), Some(5));
    assert_eq!(env.get("seen").unwrap().to_string(), "[1, 2, 3, 4, 5]");
    assert_eq!(render("5..1"), "[5, 4, 3, 2, 1]");
    assert_eq!(render("typeof((1..2)[0])"), "i64");
    assert_eq!(eval_err("1..2.5"), "Invalid operation: range only possible with integers");
}

#[test]
fn test_iterator_protocol_termination() {
    let source = r#"{
        n := 0
        it := { done: fn() = n >= 3, next: fn() { n = n + 1; n } }
        total := 0
        for x in it { total = total + x }
        [n, total]
    }"#;
    assert_eq!(render(source), "[3, 6]");
}

#[test]
fn test_iter_factory() {
    let source = r#"{
        source := { iter: fn() = [10, 20].iter() };
        [for x in source { x + 1 }]
    }"#;
    assert_eq!(render(source), "[11, 21]");
}

#[test]
fn test_function_generator() {
    let source = r#"{
        n := 0
        fn count() { n = n + 1; if n > 3 { stop } else n };
        [for x in count { x * 10 }]
    }"#;
    assert_eq!(render(source), "[10, 20, 30]");
    let source = r#"{
        source := { iter: fn() { k := 0; fn() { k = k + 1; if k > 2 { stop } else k } } };
        [for x in source { x }]
    }"#;
    assert_eq!(render(source), "[1, 2]");
}

#[test]
fn test_iterator_exhausted() {
    assert_eq!(render("{ i := [1].iter(); i.next(); i.done() }"), "1");
    assert_eq!(
        eval_err("{ i := [1].iter(); i.next(); i.next() }"),
        "iterator already exhausted"
    );
}

#[test]
fn test_not_iterable() {
    assert_eq!(eval_err("for x in 5 { x }"), "i32 not iterable");
}

#[test]
fn test_comprehensions() {
    assert_eq!(render("[for x in [1, 2, 3] { x * 2 }]"), "[2, 4, 6]");
    assert_eq!(render("[0, for x in 1..2 { x }, 9]"), "[0, 1, 2, 9]");
    assert_eq!(render(r#"(for c in "ab" { c .. "!" })"#), r#"["a!", "b!"]"#);
}

#[test]
fn test_return_from_loop() {
    let source = "{ fn first_over(xs, n) { for x in xs { if x > n { return x } }; -1 }; [first_over([1, 5, 9], 4), first_over([1], 4)] }";
    assert_eq!(render(source), "[5, -1]");
}

#[test]
fn test_return_from_nested_expression() {
    let source = "{ fn f(x) { y := if x { return 5 } else 2; y + 100 }; [f(1), f(0)] }";
    assert_eq!(render(source), "[5, 102]");
    let source = "{ fn f(xs) { [for x in xs { if x { return x } else 0 }] }; [f([0, 3]), f([0])] }";
    assert_eq!(render(source), "[3, [0]]");
}

#[test]
fn test_if_else() {
    assert_eq!(render(r#"if 1 { "yes" } else { "no" }"#), "yes");
    assert_eq!(render(r#"if "" { "yes" } else { "no" }"#), "no");
    assert_eq!(render(r#"if 0 { "a" } else if 0.5 { "b" } else { "c" }"#), "b");
}

#[test]
fn test_switch() {
    let source = r#"{ x := 2; switch x { $ == 1 => "one", $ == 2 => "two", else => "many" } }"#;
    assert_eq!(render(source), "two");
    assert_eq!(render(r#"switch { 1 > 2 => "a", else => "b" }"#), "b");
    assert_eq!(eval_err("switch 5 { $ == 1 => 1 }"), "No match");
}

#[test]
fn test_throw() {
    assert_eq!(eval_err(r#"{ throw "bad" }"#), "Throw! [str bad]");
}

// =============================================================================
// Modules
// =============================================================================

#[test]
fn test_module_exports() {
    assert_eq!(render("export a := 1; b := 2"), "{ a: 1 }");
    assert_eq!(
        eval_err("export nothing"),
        "cannot export unknown identifier 'nothing'"
    );
    assert_eq!(eval_err("x := 1; export x; export x"), "'x' already exported");
}

#[test]
fn test_eval_file_with_imports() {
    let value = evaluator().eval_file(fixtures().join("main.dash")).unwrap();
    insta::assert_snapshot!(value.to_string(), @"{ result: 1764 }");
}

#[test]
fn test_import_bare_expression_and_cache() {
    let (evaluator, env) = session();
    evaluator.set_base_path(fixtures());
    let answer = evaluator.import_module(&env, "answer").unwrap();
    assert_eq!(answer.as_int(), Some(42));
    assert!(env.cached_module(&fixtures().join("answer.dash")).is_some());

    let math = evaluator.eval_str_in(r#"import("math.dash")"#, &env).unwrap();
    assert_eq!(math.to_string(), "{ square: <fn (...)>, pi: 3.14 }");
    assert!(math.property("hidden").is_none());
}

#[test]
fn test_failed_import_is_not_cached() {
    let (evaluator, env) = session();
    evaluator.set_base_path(fixtures());
    let err = evaluator.import_module(&env, "broken").unwrap_err();
    assert!(err.to_string().starts_with("Parse error: "));
    assert!(env.cached_module(&fixtures().join("broken.dash")).is_none());
}

#[test]
fn test_namespaces() {
    let evaluator = evaluator().with_namespace("fx", fixtures());
    let value = evaluator.eval_str(r#"import("fx:math").pi"#).unwrap();
    assert_eq!(value.to_string(), "3.14");

    let evaluator = self::evaluator();
    evaluator.set_base_path(fixtures());
    let value = evaluator
        .eval_str(r#"import("dash:greet").greet("dash")"#)
        .unwrap();
    assert_eq!(value.to_string(), "hello dash");

    assert_eq!(
        eval_err(r#"import("zz:foo")"#),
        "unknown import namespace 'zz'"
    );
}

#[test]
fn test_missing_module() {
    let evaluator = evaluator();
    evaluator.set_base_path(fixtures());
    let err = evaluator.eval_str(r#"import("nope")"#).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("module '"), "{}", message);
    assert!(message.ends_with("nope.dash' not found"), "{}", message);
}

#[test]
fn test_circular_import() {
    let err = evaluator()
        .eval_file(fixtures().join("cycle_a.dash"))
        .unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("circular import of '"), "{}", message);
    assert!(message.ends_with("cycle_a.dash'"), "{}", message);
}
