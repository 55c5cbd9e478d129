//! Core native functions: console I/O, reflection, imports and iteration

use std::io::{BufRead, Write};
use std::sync::Arc;

use dash_runtime::{
    iterator_value, Data, DashError, EnvRef, EvalResult, Evaluator, NativeRegistry, Param, Type,
    Value,
};
use tracing::debug;

pub fn register(registry: &mut NativeRegistry) {
    // Console
    registry.register_function("print", Arc::new(print));
    registry.register_function("write", Arc::new(write));
    registry.register_function("input", Arc::new(input));

    // Generators
    registry.register_value("stop", Value::stop());

    // Reflection
    registry.register_function_with_params(
        "typeof",
        vec![Param::new("value", Type::Any)],
        Arc::new(type_of),
    );

    // Modules
    registry.register_function_with_params(
        "import",
        vec![Param::new("path", Type::String)],
        Arc::new(import),
    );

    // Collections
    registry.register_function("array", Arc::new(array));
    registry.register_function_with_params(
        "iter",
        vec![Param::new("value", Type::Any)],
        Arc::new(iter),
    );
}

/// Format arguments the way `print` writes them
pub(crate) fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn print(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    let text = join_args(args);
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text)?;
    Ok(Value::string(text))
}

/// Arguments back to back, without a separator or a newline
fn write(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    if args.is_empty() {
        return Err(DashError::IncorrectArgCount {
            expected: "at least 1".to_string(),
            actual: 0,
        });
    }
    let text: String = args.iter().map(|arg| arg.to_string()).collect();
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", text)?;
    stdout.flush()?;
    Ok(Value::string(text))
}

/// `input(prompt?, type?)` reads one line, cast to `type` when given
fn input(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    if let Some(prompt) = args.first() {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;
    }
    let line = read_line(&mut std::io::stdin().lock())?;
    convert_input(line, args.get(1))
}

fn convert_input(line: Option<String>, target: Option<&Value>) -> EvalResult<Value> {
    let answer = Value::try_new(Type::String, line.map(|text| Data::Str(text.into())))?;
    match target {
        None => Ok(answer),
        Some(target) => {
            let ty = target.as_type().ok_or_else(|| DashError::ArgTypeMismatch {
                index: 1,
                expected: "type".to_string(),
                actual: target.ty().name().to_string(),
            })?;
            ty.cast(&answer)
        }
    }
}

/// One line without its terminator; `None` at end of input
fn read_line(reader: &mut impl BufRead) -> EvalResult<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

fn type_of(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    Ok(Value::type_value(get_arg(args, 0)?.ty()))
}

fn import(args: &[Value], eval: &Evaluator, env: &EnvRef) -> EvalResult<Value> {
    let path = get_arg(args, 0)?
        .as_str()
        .ok_or_else(|| DashError::type_error("str", args[0].ty().name()))?;
    debug!(path, "import requested");
    eval.import_module(env, path)
}

fn array(args: &[Value], _eval: &Evaluator, _env: &EnvRef) -> EvalResult<Value> {
    Ok(Value::array(args.to_vec()))
}

fn iter(args: &[Value], eval: &Evaluator, env: &EnvRef) -> EvalResult<Value> {
    iterator_value(eval, get_arg(args, 0)?, env)
}

pub(crate) fn get_arg(args: &[Value], index: usize) -> EvalResult<&Value> {
    args.get(index).ok_or(DashError::IncorrectArgCount {
        expected: (index + 1).to_string(),
        actual: args.len(),
    })
}
