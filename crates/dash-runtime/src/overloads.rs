//! Overload sets and distance-based resolution

use std::cell::RefCell;
use std::sync::Arc;

use tracing::trace;

use crate::error::{DashError, EvalResult};
use crate::function::FunctionValue;
use crate::types::Type;
use crate::value::Value;

/// Shared, growable overload set
pub type OverloadsRef = Arc<RefCell<FunctionOverloads>>;

/// All implementations registered under one function name
///
/// Resolution is recomputed on every call, since overloads can be added
/// until the call site runs. A set declared in an inner scope extends the
/// set of the same name in the enclosing scope instead of hiding it.
#[derive(Debug, Clone)]
pub struct FunctionOverloads {
    name: String,
    entries: Vec<Arc<FunctionValue>>,
    /// Same-named set of an enclosing scope, consulted live
    outer: Option<OverloadsRef>,
}

impl FunctionOverloads {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_outer(name, None)
    }

    pub fn with_outer(name: impl Into<String>, outer: Option<OverloadsRef>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            outer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&mut self, function: Arc<FunctionValue>) {
        self.entries.push(function);
    }

    /// Implementations added in this scope
    pub fn entries(&self) -> &[Arc<FunctionValue>] {
        &self.entries
    }

    /// Implementations of this set followed by those of the enclosing sets
    pub fn candidates(&self) -> Vec<Arc<FunctionValue>> {
        let mut all = self.entries.clone();
        if let Some(outer) = &self.outer {
            all.extend(outer.borrow().candidates());
        }
        all
    }

    /// A standalone copy holding every candidate, unaffected by later additions
    pub fn detached(&self) -> Self {
        Self {
            name: self.name.clone(),
            entries: self.candidates(),
            outer: None,
        }
    }

    /// Candidates whose parameters accept the argument types
    pub fn matches(&self, arg_types: &[Type]) -> Vec<Arc<FunctionValue>> {
        self.candidates()
            .into_iter()
            .filter(|f| f.params().is_some() && f.accepts(arg_types))
            .collect()
    }

    /// The closest candidate; exact ties are an error
    ///
    /// Untyped natives only match when no typed candidate does.
    pub fn nearest_match(&self, arg_types: &[Type]) -> EvalResult<Option<Arc<FunctionValue>>> {
        let mut nearest: Option<(f64, Arc<FunctionValue>)> = None;
        let mut tied = false;

        for candidate in self.matches(arg_types) {
            let distance = candidate.distance(arg_types)?;
            trace!(name = %self.name, signature = %candidate.signature(), distance, "overload candidate");
            match nearest {
                Some((best, _)) if distance > best => {}
                Some((best, _)) if distance == best => tied = true,
                _ => {
                    nearest = Some((distance, candidate));
                    tied = false;
                }
            }
        }

        if tied {
            return Err(DashError::AmbiguousOverload {
                name: self.name.clone(),
                args: type_list(arg_types),
            });
        }

        let untyped = || {
            self.candidates()
                .into_iter()
                .find(|f| f.params().is_none())
        };
        Ok(nearest.map(|(_, f)| f).or_else(untyped))
    }

    /// Resolve the implementation for a call with these arguments
    pub fn resolve(&self, args: &[Value]) -> EvalResult<Arc<FunctionValue>> {
        let arg_types: Vec<Type> = args.iter().map(Value::ty).collect();
        self.nearest_match(&arg_types)?
            .ok_or_else(|| DashError::NoMatchingOverload {
                name: self.name.clone(),
                args: type_list(&arg_types),
                candidates: self
                    .candidates()
                    .iter()
                    .map(|f| format!("\nFound {}", f.signature()))
                    .collect(),
            })
    }

    /// A callable value that resolves against the live set on each call
    pub fn to_value(overloads: &OverloadsRef) -> Value {
        let set = Arc::clone(overloads);
        let name = overloads.borrow().name.clone();
        Value::function(FunctionValue::native(name, move |args, evaluator, env| {
            let function = set.borrow().resolve(args)?;
            function.call(evaluator, env, args)
        }))
    }
}

fn type_list(types: &[Type]) -> String {
    types
        .iter()
        .map(|ty| ty.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Param;

    fn native(params: Vec<Param>, tag: &'static str) -> Arc<FunctionValue> {
        Arc::new(FunctionValue::native_with_params(tag, params, move |_, _, _| {
            Ok(Value::string(tag))
        }))
    }

    fn tag(f: &FunctionValue) -> &str {
        match f {
            FunctionValue::Native(native) => &native.name,
            FunctionValue::Interpreted(_) => "closure",
        }
    }

    #[test]
    fn test_selects_exact_signature_regardless_of_order() {
        for flip in [false, true] {
            let mut set = FunctionOverloads::new("f");
            let int = native(vec![Param::new("x", Type::Int32)], "int");
            let string = native(vec![Param::new("x", Type::String)], "str");
            if flip {
                set.add(string);
                set.add(int);
            } else {
                set.add(int);
                set.add(string);
            }
            let chosen = set.resolve(&[Value::i32(1)]).unwrap();
            assert_eq!(tag(&chosen), "int");
            let chosen = set.resolve(&[Value::string("s")]).unwrap();
            assert_eq!(tag(&chosen), "str");
        }
    }

    #[test]
    fn test_closer_type_wins() {
        let mut set = FunctionOverloads::new("f");
        set.add(native(vec![Param::new("x", Type::String)], "str"));
        set.add(native(vec![Param::new("x", Type::Number)], "number"));
        set.add(native(vec![Param::new("x", Type::Float64)], "float"));
        assert_eq!(tag(&set.resolve(&[Value::i32(1)]).unwrap()), "number");
        assert_eq!(tag(&set.resolve(&[Value::float64(1.0)]).unwrap()), "float");
        assert_eq!(tag(&set.resolve(&[Value::string("s")]).unwrap()), "str");
    }

    #[test]
    fn test_any_ties_with_exact_match() {
        let mut set = FunctionOverloads::new("f");
        set.add(native(vec![Param::new("x", Type::Any)], "any"));
        set.add(native(vec![Param::new("x", Type::Int32)], "int"));
        let err = set.resolve(&[Value::i32(1)]).unwrap_err();
        assert_eq!(
            err,
            DashError::AmbiguousOverload {
                name: "f".to_string(),
                args: "i32".to_string(),
            }
        );
        assert_eq!(tag(&set.resolve(&[Value::string("s")]).unwrap()), "any");
    }

    #[test]
    fn test_identical_signatures_are_ambiguous() {
        let mut set = FunctionOverloads::new("f");
        set.add(native(vec![Param::new("x", Type::Int32)], "a"));
        set.add(native(vec![Param::new("y", Type::Int32)], "b"));
        let err = set.resolve(&[Value::i32(1)]).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"identical matches for args [i32] calling 'f'");
    }

    #[test]
    fn test_no_match_lists_signatures() {
        let mut set = FunctionOverloads::new("f");
        set.add(native(vec![Param::new("x", Type::Int32)], "a"));
        set.add(native(
            vec![Param::new("x", Type::Int32), Param::optional("y", Type::String)],
            "b",
        ));
        let err = set.resolve(&[Value::array(vec![])]).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r###"
        no match for args [array] calling 'f'
        Found (i32)
        Found (i32, str)
        "###);
    }

    #[test]
    fn test_optional_parameters_extend_arity() {
        let mut set = FunctionOverloads::new("f");
        set.add(native(
            vec![Param::new("x", Type::Int32), Param::optional("y", Type::Int32)],
            "ab",
        ));
        assert!(set.resolve(&[Value::i32(1)]).is_ok());
        assert!(set.resolve(&[Value::i32(1), Value::i32(2)]).is_ok());
        assert!(set.resolve(&[Value::i32(1), Value::i32(2), Value::i32(3)]).is_err());
    }

    #[test]
    fn test_untyped_native_is_fallback() {
        let mut set = FunctionOverloads::new("f");
        set.add(Arc::new(FunctionValue::native("untyped", |_, _, _| {
            Ok(Value::void())
        })));
        set.add(native(vec![Param::new("x", Type::Int32)], "typed"));
        assert_eq!(tag(&set.resolve(&[Value::i32(1)]).unwrap()), "typed");
        assert_eq!(tag(&set.resolve(&[Value::string("s")]).unwrap()), "untyped");
    }

    #[test]
    fn test_inner_set_extends_outer() {
        let outer: OverloadsRef = Arc::new(RefCell::new(FunctionOverloads::new("f")));
        outer
            .borrow_mut()
            .add(native(vec![Param::new("x", Type::String)], "outer"));
        let mut inner = FunctionOverloads::with_outer("f", Some(Arc::clone(&outer)));
        inner.add(native(vec![Param::new("x", Type::Int32)], "inner"));

        assert_eq!(tag(&inner.resolve(&[Value::i32(1)]).unwrap()), "inner");
        assert_eq!(tag(&inner.resolve(&[Value::string("s")]).unwrap()), "outer");
        assert_eq!(inner.entries().len(), 1);

        let detached = inner.detached();
        outer
            .borrow_mut()
            .add(native(vec![Param::new("x", Type::Array)], "late"));
        assert!(inner.resolve(&[Value::array(vec![])]).is_ok());
        assert!(detached.resolve(&[Value::array(vec![])]).is_err());
    }
}
