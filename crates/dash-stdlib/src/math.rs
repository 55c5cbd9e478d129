//! The `native` object: numeric helpers and `len`

use std::sync::Arc;

use dash_runtime::{Data, DashError, EnvRef, EvalResult, Evaluator, NativeRegistry, Type, Value};

use crate::base::get_arg;

pub fn register(registry: &mut NativeRegistry) {
    registry.register_group_function("native", "mod", Arc::new(native_mod));
    registry.register_group_function("native", "abs", Arc::new(native_abs));
    registry.register_group_function("native", "floor", Arc::new(native_floor));
    registry.register_group_function("native", "ceil", Arc::new(native_ceil));
    registry.register_group_function("native", "sqrt", Arc::new(native_sqrt));
    registry.register_group_function("native", "min", Arc::new(native_min));
    registry.register_group_function("native", "max", Arc::new(native_max));
    registry.register_group_function("native", "len", Arc::new(native_len));
}

fn get_number_arg(args: &[Value], index: usize) -> EvalResult<&Value> {
    let value = get_arg(args, index)?;
    if value.ty().is_numeric() {
        Ok(value)
    } else {
        Err(DashError::ArgTypeMismatch {
            index,
            expected: "number".to_string(),
            actual: value.ty().name().to_string(),
        })
    }
}

fn get_float_arg(args: &[Value], index: usize) -> EvalResult<f64> {
    get_number_arg(args, index)?
        .as_float()
        .ok_or_else(|| DashError::type_error("number", args[index].ty().name()))
}

/// Float result keeping the argument's float width, `float64` for integers
fn float_like(source: &Value, value: f64) -> Value {
    let ty = if source.ty().is_float() {
        source.ty()
    } else {
        Type::Float64
    };
    Value::float(ty, value)
}

fn native_mod(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    let a = get_number_arg(args, 0)?;
    let b = get_number_arg(args, 1)?;
    match (a.data(), b.data()) {
        (Data::Int(_), Data::Int(0)) => Err(DashError::DivisionByZero),
        (Data::Int(x), Data::Int(y)) => Ok(Value::int(a.ty(), x.wrapping_rem(*y))),
        _ => Ok(float_like(a, get_float_arg(args, 0)? % get_float_arg(args, 1)?)),
    }
}

fn native_abs(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    let x = get_number_arg(args, 0)?;
    match x.data() {
        Data::Int(i) => Ok(Value::int(x.ty(), i.wrapping_abs())),
        _ => Ok(float_like(x, get_float_arg(args, 0)?.abs())),
    }
}

fn native_floor(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    let x = get_number_arg(args, 0)?;
    match x.data() {
        Data::Int(_) => Ok(x.clone()),
        _ => Ok(float_like(x, get_float_arg(args, 0)?.floor())),
    }
}

fn native_ceil(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    let x = get_number_arg(args, 0)?;
    match x.data() {
        Data::Int(_) => Ok(x.clone()),
        _ => Ok(float_like(x, get_float_arg(args, 0)?.ceil())),
    }
}

fn native_sqrt(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    let x = get_number_arg(args, 0)?;
    Ok(float_like(x, get_float_arg(args, 0)?.sqrt()))
}

fn native_min(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    let a = get_number_arg(args, 0)?;
    let b = get_number_arg(args, 1)?;
    let pick_b = get_float_arg(args, 1)? < get_float_arg(args, 0)?;
    Ok(if pick_b { b.clone() } else { a.clone() })
}

fn native_max(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    let a = get_number_arg(args, 0)?;
    let b = get_number_arg(args, 1)?;
    let pick_b = get_float_arg(args, 1)? > get_float_arg(args, 0)?;
    Ok(if pick_b { b.clone() } else { a.clone() })
}

fn native_len(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    let value = get_arg(args, 0)?;
    let length = match value.data() {
        Data::Str(s) => s.chars().count(),
        Data::Array(items) => items.len(),
        Data::Object(fields) => fields.len() + value.properties().map_or(0, |p| p.len()),
        _ => {
            return Err(DashError::ArgTypeMismatch {
                index: 0,
                expected: "str, array or obj".to_string(),
                actual: value.ty().name().to_string(),
            })
        }
    };
    Ok(Value::i32(length as i64))
}
