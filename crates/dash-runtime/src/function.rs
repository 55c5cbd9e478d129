//! Function values: interpreted closures and native callbacks

use std::fmt;
use std::sync::Arc;

use dash_parser::{Expr, FunctionLiteral};

use crate::error::{DashError, EvalResult};
use crate::evaluator::{Evaluator, Flow};
use crate::scope::EnvRef;
use crate::types::Type;
use crate::value::Value;

/// Native function type
pub type NativeFn = Arc<dyn Fn(&[Value], &Evaluator, &EnvRef) -> EvalResult<Value>>;

/// Declared function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    /// False for parameters with a default value
    pub required: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, ty: Type) -> Self {
        Self {
            required: false,
            ..Self::new(name, ty)
        }
    }
}

/// A function defined in Dash source, closed over its defining environment
pub struct Closure {
    pub params: Vec<Param>,
    pub return_type: Option<Type>,
    pub literal: Arc<FunctionLiteral>,
    pub env: EnvRef,
}

/// A host function
pub struct NativeFunction {
    pub name: String,
    /// Used for overload matching only; `None` accepts any arguments
    pub params: Option<Vec<Param>>,
    pub callback: NativeFn,
}

pub enum FunctionValue {
    Interpreted(Closure),
    Native(NativeFunction),
}

impl FunctionValue {
    pub fn native(
        name: impl Into<String>,
        callback: impl Fn(&[Value], &Evaluator, &EnvRef) -> EvalResult<Value> + 'static,
    ) -> Self {
        FunctionValue::Native(NativeFunction {
            name: name.into(),
            params: None,
            callback: Arc::new(callback),
        })
    }

    pub fn native_with_params(
        name: impl Into<String>,
        params: Vec<Param>,
        callback: impl Fn(&[Value], &Evaluator, &EnvRef) -> EvalResult<Value> + 'static,
    ) -> Self {
        FunctionValue::Native(NativeFunction {
            name: name.into(),
            params: Some(params),
            callback: Arc::new(callback),
        })
    }

    pub fn params(&self) -> Option<&[Param]> {
        match self {
            FunctionValue::Interpreted(closure) => Some(&closure.params),
            FunctionValue::Native(native) => native.params.as_deref(),
        }
    }

    /// Parameter types, e.g. `(i32, str)`
    pub fn signature(&self) -> String {
        match self.params() {
            Some(params) => format!(
                "({})",
                params
                    .iter()
                    .map(|p| p.ty.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            None => "(...)".to_string(),
        }
    }

    /// Could this function be called with arguments of these types
    pub fn accepts(&self, arg_types: &[Type]) -> bool {
        let Some(params) = self.params() else {
            return true;
        };
        let required = params.iter().filter(|p| p.required).count();
        if arg_types.len() < required || arg_types.len() > params.len() {
            return false;
        }
        arg_types
            .iter()
            .zip(params)
            .all(|(arg, param)| param.ty == Type::Any || arg.is_implicit_castable_to(param.ty))
    }

    /// Mean distance from the argument types to the parameter types
    pub fn distance(&self, arg_types: &[Type]) -> EvalResult<f64> {
        let Some(params) = self.params() else {
            return Ok(0.0);
        };
        if arg_types.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0u32;
        for (arg, param) in arg_types.iter().zip(params) {
            total += arg.get_distance(param.ty)?;
        }
        Ok(f64::from(total) / arg_types.len() as f64)
    }

    /// Evaluate argument expressions in the caller's environment, then call
    ///
    /// A `return` reached while evaluating an argument skips the call.
    pub fn call_expr(
        &self,
        evaluator: &Evaluator,
        env: &EnvRef,
        args: &[Expr],
    ) -> EvalResult<Flow> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match evaluator.eval_flow(arg, env)? {
                Flow::Normal(value) => values.push(value),
                Flow::Return(value) => return Ok(Flow::Return(value)),
            }
        }
        Ok(Flow::Normal(self.call(evaluator, env, &values)?))
    }

    /// Call with already evaluated arguments; `env` is the caller's environment
    pub fn call(&self, evaluator: &Evaluator, env: &EnvRef, args: &[Value]) -> EvalResult<Value> {
        match self {
            FunctionValue::Native(native) => (native.callback)(args, evaluator, env),
            FunctionValue::Interpreted(closure) => {
                let scope = self.map_args_to_params(evaluator, args)?;
                let result = evaluator.eval_expr(&closure.literal.body, &scope)?;
                match closure.return_type {
                    Some(expected) if !expected.is_assignable(result.ty()) => {
                        Err(DashError::ReturnTypeMismatch {
                            expected: expected.name().to_string(),
                            actual: result.ty().name().to_string(),
                        })
                    }
                    Some(expected) => expected.coerce(result),
                    None => Ok(result),
                }
            }
        }
    }

    /// Bind arguments into a fresh child of the captured environment
    ///
    /// Missing trailing arguments take their defaults, evaluated in the new
    /// scope so they can refer to earlier parameters.
    pub fn map_args_to_params(&self, evaluator: &Evaluator, args: &[Value]) -> EvalResult<EnvRef> {
        let FunctionValue::Interpreted(closure) = self else {
            return Err(DashError::invalid("native functions have no parameter scope"));
        };

        let params = &closure.params;
        let required = params.iter().filter(|p| p.required).count();
        if args.len() < required || args.len() > params.len() {
            let expected = if required == params.len() {
                params.len().to_string()
            } else {
                format!("{} to {}", required, params.len())
            };
            return Err(DashError::IncorrectArgCount {
                expected,
                actual: args.len(),
            });
        }

        let scope = closure.env.sub();
        for (index, (param, syntax)) in params.iter().zip(&closure.literal.params).enumerate() {
            let value = match (args.get(index), &syntax.default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => evaluator.eval_expr(default, &scope)?,
                (None, None) => {
                    return Err(DashError::IncorrectArgCount {
                        expected: params.len().to_string(),
                        actual: args.len(),
                    })
                }
            };
            if param.ty != Type::Any && !param.ty.is_assignable(value.ty()) {
                return Err(DashError::ArgTypeMismatch {
                    index,
                    expected: param.ty.name().to_string(),
                    actual: value.ty().name().to_string(),
                });
            }
            scope.declare(&param.name, param.ty, value)?;
        }
        Ok(scope)
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionValue::Interpreted(_) => write!(f, "Closure{}", self.signature()),
            FunctionValue::Native(native) => write!(f, "Native({}{})", native.name, self.signature()),
        }
    }
}
