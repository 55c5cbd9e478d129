//! Tests for the native functions seen from Dash source

use dash_runtime::{Evaluator, Type, Value};
use dash_stdlib::stdlib_registry;

fn eval(source: &str) -> Value {
    Evaluator::with_natives(stdlib_registry())
        .eval_str(source)
        .expect("Failed to evaluate")
}

fn render(source: &str) -> String {
    eval(source).to_string()
}

fn eval_err(source: &str) -> String {
    match Evaluator::with_natives(stdlib_registry()).eval_str(source) {
        Ok(value) => panic!("expected an error, got {}", value.describe()),
        Err(e) => e.to_string(),
    }
}

// =============================================================================
// Base
// =============================================================================

#[test]
fn test_typeof() {
    assert_eq!(eval("typeof(1)").ty(), Type::Type);
    assert_eq!(render("typeof(1.5)"), "float64");
    assert_eq!(render("typeof([])"), "array");
    assert_eq!(render("typeof({})"), "obj");
    assert_eq!(render("typeof(typeof)"), "func");
}

#[test]
fn test_array_builder() {
    assert_eq!(render(r#"array(1, "a")"#), r#"[1, "a"]"#);
    assert_eq!(render("array()"), "[]");
}

#[test]
fn test_print_and_write_return_their_text() {
    assert_eq!(render(r#"print("a", 1)"#), "a 1");
    assert_eq!(eval("write(7)").describe(), "[str 7]");
    assert_eq!(render(r#"write("a", 1, [2])"#), "a1[2]");
    assert_eq!(
        eval_err("write()"),
        "incorrect arg count: expected at least 1, got 0"
    );
}

#[test]
fn test_stop_binding() {
    assert_eq!(render("typeof(stop)"), "any");
    assert_eq!(render("stop"), "stop");
    assert_eq!(render("if stop { 1 } else 2"), "2");
}

#[test]
fn test_iter_over_generator_function() {
    assert_eq!(render("iter(fn() = stop).done()"), "1");
    let source = r#"{
        n := 0
        it := iter(fn() { n = n + 1; if n > 2 { stop } else n });
        [it.next(), it.done(), it.next(), it.done()]
    }"#;
    assert_eq!(render(source), "[1, 0, 2, 1]");
}

#[test]
fn test_iter_over_string() {
    let source = r#"{
        it := iter("ab")
        out := []
        n := 0
        for c in it { out = out.add(c, n); n = n + 1 }
        out
    }"#;
    assert_eq!(render(source), r#"["a", 0, "b", 1]"#);
}

#[test]
fn test_iter_rejects_numbers() {
    assert_eq!(eval_err("iter(3)"), "i32 not iterable");
}

#[test]
fn test_import_requires_string() {
    insta::assert_snapshot!(eval_err("import(1)"), @r###"
    no match for args [i32] calling 'import'
    Found (str)
    "###);
}

// =============================================================================
// native
// =============================================================================

#[test]
fn test_native_abs() {
    assert_eq!(render("native.abs(-3)"), "3");
    assert_eq!(render("native.abs(-2.5)"), "2.5");
    assert_eq!(render("typeof(native.abs(-3 as i8))"), "i8");
}

#[test]
fn test_native_rounding() {
    assert_eq!(render("native.floor(2.7)"), "2");
    assert_eq!(render("typeof(native.floor(2.7))"), "float64");
    assert_eq!(render("native.ceil(2.1)"), "3");
    assert_eq!(render("native.floor(5)"), "5");
}

#[test]
fn test_native_sqrt() {
    assert_eq!(render("native.sqrt(16)"), "4");
    assert_eq!(render("typeof(native.sqrt(16))"), "float64");
    assert_eq!(render("typeof(native.sqrt(4 as float32))"), "float32");
}

#[test]
fn test_native_mod() {
    assert_eq!(render("native.mod(7, 3)"), "1");
    assert_eq!(render("native.mod(7.5, 2)"), "1.5");
    assert_eq!(eval_err("native.mod(1, 0)"), "Division by zero");
}

#[test]
fn test_native_min_max() {
    assert_eq!(render("native.min(3, 1.5)"), "1.5");
    assert_eq!(render("native.max(3, 1.5)"), "3");
    assert_eq!(render("native.max(2, 2)"), "2");
}

#[test]
fn test_native_len() {
    assert_eq!(render(r#"native.len("héllo")"#), "5");
    assert_eq!(render("native.len([1, 2, 3])"), "3");
    assert_eq!(render("native.len({ a: 1, b: 2 })"), "2");
    assert_eq!(
        eval_err("native.len(1)"),
        "arg 0 expected str, array or obj got i32"
    );
}

#[test]
fn test_native_argument_errors() {
    assert_eq!(
        eval_err(r#"native.sqrt("x")"#),
        "arg 0 expected number got str"
    );
    assert_eq!(
        eval_err("native.min(1)"),
        "incorrect arg count: expected 2, got 1"
    );
}
