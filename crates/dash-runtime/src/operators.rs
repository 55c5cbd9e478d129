//! Per-type operator tables
//!
//! `binary` and `unary` return only the operators a type defines itself;
//! [`Type::binary_operator`] walks the super-type chain.

use std::sync::Arc;

use dash_parser::{BinaryOp, UnaryOp};

use crate::error::{DashError, EvalResult};
use crate::function::FunctionValue;
use crate::iter::{iterator_object, SequenceIterator};
use crate::types::{BinaryOperator, Type, UnaryOperator};
use crate::value::{Data, Value};

pub(crate) fn binary(ty: Type, op: BinaryOp) -> Option<BinaryOperator> {
    let f: BinaryOperator = match (ty, op) {
        (Type::Number, BinaryOp::Add) => num_add,
        (Type::Number, BinaryOp::Sub) => num_sub,
        (Type::Number, BinaryOp::Mul) => num_mul,
        (Type::Number, BinaryOp::Div) => num_div,
        (Type::Number, BinaryOp::Mod) => num_mod,
        (Type::Number, BinaryOp::Pow) => num_pow,
        (Type::Number, BinaryOp::Concat) => num_concat,
        (Type::Number, BinaryOp::Eq) => num_eq,
        (Type::Number, BinaryOp::Ne) => num_ne,
        (Type::Number, BinaryOp::Lt) => num_lt,
        (Type::Number, BinaryOp::Le) => num_le,
        (Type::Number, BinaryOp::Gt) => num_gt,
        (Type::Number, BinaryOp::Ge) => num_ge,
        (Type::Number, BinaryOp::And) => num_and,
        (Type::Number, BinaryOp::Or) => num_or,

        (Type::String, BinaryOp::Eq) => str_eq,
        (Type::String, BinaryOp::Ne) => str_ne,
        (Type::String, BinaryOp::Concat) => str_concat,
        (Type::String, BinaryOp::Dereference) => str_dereference,

        (Type::Array, BinaryOp::Eq) => payload_eq,
        (Type::Array, BinaryOp::Ne) => payload_ne,
        (Type::Array, BinaryOp::Dereference) => array_dereference,

        (Type::Object, BinaryOp::Dereference) => object_dereference,

        (Type::Type, BinaryOp::Eq) => payload_eq,
        (Type::Type, BinaryOp::Ne) => payload_ne,

        _ => return None,
    };
    Some(f)
}

pub(crate) fn unary(ty: Type, op: UnaryOp) -> Option<UnaryOperator> {
    let f: UnaryOperator = match (ty, op) {
        (Type::Number, UnaryOp::Negate) => num_negate,
        (Type::Number, UnaryOp::Plus) => num_plus,
        (Type::Number, UnaryOp::Not) => not,
        (Type::String, UnaryOp::Not) => not,
        _ => return None,
    };
    Some(f)
}

// =============================================================================
// Numbers
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        if !value.ty().is_numeric() {
            return None;
        }
        match value.data() {
            Data::Int(i) => Some(Num::Int(*i)),
            Data::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn as_integral(self) -> Option<i64> {
        match self {
            Num::Int(i) => Some(i),
            Num::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
            Num::Float(_) => None,
        }
    }
}

fn int_rank(ty: Type) -> u32 {
    ty.int_width().unwrap_or(64)
}

/// Result type of arithmetic between two numeric types
fn widen(left: Type, right: Type) -> Type {
    if left.is_integer() && right.is_integer() {
        match int_rank(left).max(int_rank(right)) {
            8 => Type::Int8,
            16 => Type::Int16,
            32 => Type::Int32,
            _ => Type::Int64,
        }
    } else {
        float_result(left, right)
    }
}

fn float_result(left: Type, right: Type) -> Type {
    if left == Type::Float32 && right == Type::Float32 {
        Type::Float32
    } else {
        Type::Float64
    }
}

fn operands(op: BinaryOp, a: &Value, b: &Value) -> EvalResult<(Num, Num)> {
    match (Num::of(a), Num::of(b)) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(DashError::IncompatibleOperands {
            op: op.to_string(),
            left: a.ty().name().to_string(),
            right: b.ty().name().to_string(),
        }),
    }
}

fn arithmetic(
    op: BinaryOp,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    let (x, y) = operands(op, a, b)?;
    let ty = widen(a.ty(), b.ty());
    Ok(match (x, y) {
        (Num::Int(x), Num::Int(y)) if ty.is_integer() => Value::int(ty, int_op(x, y)),
        _ => Value::float(ty, float_op(x.as_f64(), y.as_f64())),
    })
}

fn num_add(a: &Value, b: &Value) -> EvalResult<Value> {
    arithmetic(BinaryOp::Add, a, b, i64::wrapping_add, |x, y| x + y)
}

fn num_sub(a: &Value, b: &Value) -> EvalResult<Value> {
    arithmetic(BinaryOp::Sub, a, b, i64::wrapping_sub, |x, y| x - y)
}

fn num_mul(a: &Value, b: &Value) -> EvalResult<Value> {
    arithmetic(BinaryOp::Mul, a, b, i64::wrapping_mul, |x, y| x * y)
}

fn num_div(a: &Value, b: &Value) -> EvalResult<Value> {
    let (x, y) = operands(BinaryOp::Div, a, b)?;
    Ok(Value::float(
        float_result(a.ty(), b.ty()),
        x.as_f64() / y.as_f64(),
    ))
}

fn num_mod(a: &Value, b: &Value) -> EvalResult<Value> {
    let (x, y) = operands(BinaryOp::Mod, a, b)?;
    let ty = widen(a.ty(), b.ty());
    match (x, y) {
        (Num::Int(_), Num::Int(0)) if ty.is_integer() => Err(DashError::DivisionByZero),
        (Num::Int(x), Num::Int(y)) if ty.is_integer() => Ok(Value::int(ty, x.wrapping_rem(y))),
        _ => Ok(Value::float(ty, x.as_f64() % y.as_f64())),
    }
}

fn num_pow(a: &Value, b: &Value) -> EvalResult<Value> {
    let (x, y) = operands(BinaryOp::Pow, a, b)?;
    let ty = widen(a.ty(), b.ty());
    match (x, y) {
        (Num::Int(x), Num::Int(y)) if ty.is_integer() && (0..=u32::MAX as i64).contains(&y) => {
            Ok(Value::int(ty, x.wrapping_pow(y as u32)))
        }
        _ => Ok(Value::float(
            float_result(a.ty(), b.ty()),
            x.as_f64().powf(y.as_f64()),
        )),
    }
}

/// `..` on numbers: an inclusive integer range, or string concatenation
/// when the right side is a string
fn num_concat(a: &Value, b: &Value) -> EvalResult<Value> {
    if b.ty().extends(Type::String) {
        return str_concat(a, b);
    }
    let (x, y) = operands(BinaryOp::Concat, a, b)?;
    match (x.as_integral(), y.as_integral()) {
        (Some(start), Some(stop)) => Ok(Value::array(range(start, stop))),
        _ => Err(DashError::invalid("range only possible with integers")),
    }
}

fn range(start: i64, stop: i64) -> Vec<Value> {
    let step = (i128::from(stop) - i128::from(start)).signum() as i64;
    let len = (start.abs_diff(stop) as usize).saturating_add(1);
    let mut items = Vec::with_capacity(len.min(1 << 16));
    let mut current = start;
    loop {
        items.push(Value::int(Type::Int64, current));
        if current == stop {
            break;
        }
        current += step;
    }
    items
}

fn compare(
    op: BinaryOp,
    a: &Value,
    b: &Value,
    test: fn(std::cmp::Ordering) -> bool,
) -> EvalResult<Value> {
    let (x, y) = operands(op, a, b)?;
    let ordering = match (x, y) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
        _ => x.as_f64().partial_cmp(&y.as_f64()),
    };
    Ok(Value::boolean(ordering.is_some_and(test)))
}

fn num_eq(a: &Value, b: &Value) -> EvalResult<Value> {
    if Num::of(b).is_none() {
        return Ok(Value::boolean(false));
    }
    compare(BinaryOp::Eq, a, b, |o| o.is_eq())
}

fn num_ne(a: &Value, b: &Value) -> EvalResult<Value> {
    if Num::of(b).is_none() {
        return Ok(Value::boolean(true));
    }
    compare(BinaryOp::Ne, a, b, |o| o.is_ne())
}

fn num_lt(a: &Value, b: &Value) -> EvalResult<Value> {
    compare(BinaryOp::Lt, a, b, |o| o.is_lt())
}

fn num_le(a: &Value, b: &Value) -> EvalResult<Value> {
    compare(BinaryOp::Le, a, b, |o| o.is_le())
}

fn num_gt(a: &Value, b: &Value) -> EvalResult<Value> {
    compare(BinaryOp::Gt, a, b, |o| o.is_gt())
}

fn num_ge(a: &Value, b: &Value) -> EvalResult<Value> {
    compare(BinaryOp::Ge, a, b, |o| o.is_ge())
}

fn num_and(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::boolean(a.is_truthy() && b.is_truthy()))
}

fn num_or(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::boolean(a.is_truthy() || b.is_truthy()))
}

fn num_negate(a: &Value) -> EvalResult<Value> {
    match a.data() {
        Data::Int(i) => Ok(Value::int(a.ty(), i.wrapping_neg())),
        Data::Float(f) => Ok(Value::float(a.ty(), -f)),
        _ => Err(DashError::type_error("number", a.ty().name())),
    }
}

fn num_plus(a: &Value) -> EvalResult<Value> {
    Ok(a.clone())
}

fn not(a: &Value) -> EvalResult<Value> {
    Ok(Value::boolean(!a.is_truthy()))
}

// =============================================================================
// Strings
// =============================================================================

fn str_eq(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::boolean(a.as_str().is_some() && a.as_str() == b.as_str()))
}

fn str_ne(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::boolean(a.as_str() != b.as_str()))
}

fn str_concat(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::string(format!("{}{}", a, b)))
}

fn str_dereference(a: &Value, key: &Value) -> EvalResult<Value> {
    let text = a.as_str().unwrap_or_default();
    if let Some(index) = key.as_index() {
        return text
            .chars()
            .nth(checked_index(index, text.chars().count())?)
            .map(|c| Value::string(c.to_string()))
            .ok_or(DashError::IndexOutOfBounds {
                index,
                length: text.chars().count(),
            });
    }

    let owned: Arc<str> = Arc::from(text);
    match key.as_str() {
        Some("length") => Ok(Value::i32(text.chars().count() as i64)),
        Some("lower") => Ok(Value::function(FunctionValue::native(
            "lower",
            move |_, _, _| Ok(Value::string(owned.to_lowercase())),
        ))),
        Some("upper") => Ok(Value::function(FunctionValue::native(
            "upper",
            move |_, _, _| Ok(Value::string(owned.to_uppercase())),
        ))),
        _ => Err(property_not_found(a, key)),
    }
}

// =============================================================================
// Arrays, objects and shared helpers
// =============================================================================

fn payload_eq(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::boolean(a == b))
}

fn payload_ne(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::boolean(a != b))
}

fn array_dereference(a: &Value, key: &Value) -> EvalResult<Value> {
    let items = match a.data() {
        Data::Array(items) => Arc::clone(items),
        _ => Arc::new(Vec::new()),
    };

    if let Some(index) = key.as_index() {
        return element(&items, index);
    }

    let method = |name: &str, f: fn(&Arc<Vec<Value>>, &[Value]) -> EvalResult<Value>| {
        let items = Arc::clone(&items);
        Value::function(FunctionValue::native(name, move |args, _, _| f(&items, args)))
    };

    match key.as_str() {
        Some("length") => Ok(Value::i32(items.len() as i64)),
        Some("add") => Ok(method("add", |items, args| {
            let mut extended = items.as_ref().clone();
            extended.extend(args.iter().cloned());
            Ok(Value::array(extended))
        })),
        Some("at") => Ok(method("at", |items, args| {
            let index = args
                .first()
                .and_then(Value::as_index)
                .ok_or_else(|| DashError::type_error("int", arg_type(args, 0)))?;
            element(items, index)
        })),
        Some("has") => Ok(method("has", |items, args| {
            Ok(Value::boolean(
                args.first().is_some_and(|needle| items.contains(needle)),
            ))
        })),
        Some("iter") => Ok(method("iter", |items, _| {
            Ok(iterator_object(SequenceIterator::new(items.as_ref().clone())))
        })),
        Some("toString") => {
            let text = a.to_string();
            Ok(Value::function(FunctionValue::native(
                "toString",
                move |_, _, _| Ok(Value::string(text.clone())),
            )))
        }
        _ => key
            .as_str()
            .and_then(|name| a.property(name))
            .cloned()
            .ok_or_else(|| property_not_found(a, key)),
    }
}

fn object_dereference(a: &Value, key: &Value) -> EvalResult<Value> {
    let name = key.to_string();
    a.field(&name)
        .cloned()
        .ok_or_else(|| property_not_found(a, key))
}

fn element(items: &[Value], index: i64) -> EvalResult<Value> {
    Ok(items[checked_index(index, items.len())?].clone())
}

fn checked_index(index: i64, length: usize) -> EvalResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < length)
        .ok_or(DashError::IndexOutOfBounds { index, length })
}

fn arg_type(args: &[Value], index: usize) -> &'static str {
    args.get(index).map_or("none", |v| v.ty().name())
}

fn property_not_found(target: &Value, key: &Value) -> DashError {
    DashError::PropertyNotFound {
        property: key.to_string(),
        ty: target.ty().name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(op: BinaryOp, a: Value, b: Value) -> EvalResult<Value> {
        let f = a
            .ty()
            .binary_operator(op)
            .expect("operator should be defined");
        f(&a, &b)
    }

    #[test]
    fn test_integer_arithmetic_widens() {
        let sum = apply(BinaryOp::Add, Value::int(Type::Int8, 1), Value::i32(2)).unwrap();
        assert_eq!(sum.ty(), Type::Int32);
        assert_eq!(sum.as_int(), Some(3));

        let wrapped = apply(
            BinaryOp::Add,
            Value::int(Type::Int8, 127),
            Value::int(Type::Int8, 1),
        )
        .unwrap();
        assert_eq!(wrapped.as_int(), Some(-128));
    }

    #[test]
    fn test_division_is_float() {
        let q = apply(BinaryOp::Div, Value::i32(8), Value::i32(16)).unwrap();
        assert_eq!(q.ty(), Type::Float64);
        assert_eq!(q.to_string(), "0.5");
    }

    #[test]
    fn test_comparisons_are_numeric_booleans() {
        let eq = apply(BinaryOp::Eq, Value::i32(32), Value::i32(32)).unwrap();
        assert_eq!(eq.ty(), Type::Int8);
        assert_eq!(eq.as_int(), Some(1));
        let mixed = apply(BinaryOp::Eq, Value::i32(1), Value::string("1")).unwrap();
        assert_eq!(mixed.as_int(), Some(0));
    }

    #[test]
    fn test_concat_dual_meaning() {
        let r = apply(BinaryOp::Concat, Value::i32(3), Value::i32(1)).unwrap();
        assert_eq!(r.to_string(), "[3, 2, 1]");
        let s = apply(BinaryOp::Concat, Value::i32(3), Value::string("x")).unwrap();
        assert_eq!(s.as_str(), Some("3x"));
        let err = apply(
            BinaryOp::Concat,
            Value::float(Type::Float64, 1.5),
            Value::i32(3),
        );
        assert_eq!(
            err,
            Err(DashError::invalid("range only possible with integers"))
        );
    }

    #[test]
    fn test_mismatched_operands() {
        let err = apply(BinaryOp::Mul, Value::i32(3), Value::string("x")).unwrap_err();
        assert_eq!(err.to_string(), "cannot do op * on types i32 and str");
    }

    #[test]
    fn test_string_dereference() {
        let s = Value::string("Dash");
        assert_eq!(
            apply(BinaryOp::Dereference, s.clone(), Value::string("length"))
                .unwrap()
                .as_int(),
            Some(4)
        );
        assert_eq!(
            apply(BinaryOp::Dereference, s.clone(), Value::i32(1))
                .unwrap()
                .as_str(),
            Some("a")
        );
        let err = apply(BinaryOp::Dereference, s, Value::string("nope")).unwrap_err();
        assert_eq!(err.to_string(), "property 'nope' does not exist on str");
    }

    #[test]
    fn test_array_index_bounds() {
        let a = Value::array(vec![Value::i32(1)]);
        assert!(matches!(
            apply(BinaryOp::Dereference, a, Value::i32(3)),
            Err(DashError::IndexOutOfBounds { index: 3, length: 1 })
        ));
    }
}
