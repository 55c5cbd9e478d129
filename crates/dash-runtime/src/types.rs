//! The Dash type lattice
//!
//! Every built-in type is a node in a single-inheritance tree:
//!
//! ```text
//! any   type   obj   array   func
//! datum
//! ├── number
//! │   ├── int   ── i8 i16 i32 i64
//! │   └── float ── float32 float64
//! └── str
//! ```
//!
//! Operator tables hang off each node and are looked up through the
//! super-type chain. `any` sits outside the tree as a universal sink.

use std::fmt;

use dash_parser::{BinaryOp, UnaryOp};

use crate::error::{DashError, EvalResult};
use crate::operators;
use crate::value::{Data, Value};

/// Binary operator implementation
pub type BinaryOperator = fn(&Value, &Value) -> EvalResult<Value>;

/// Unary operator implementation
pub type UnaryOperator = fn(&Value) -> EvalResult<Value>;

/// A built-in Dash type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Any,
    Type,
    Object,
    Array,
    Function,
    Datum,
    Number,
    Integer,
    Float,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
}

impl Type {
    pub const ALL: [Type; 16] = [
        Type::Any,
        Type::Type,
        Type::Object,
        Type::Array,
        Type::Function,
        Type::Datum,
        Type::Number,
        Type::Integer,
        Type::Float,
        Type::Int8,
        Type::Int16,
        Type::Int32,
        Type::Int64,
        Type::Float32,
        Type::Float64,
        Type::String,
    ];

    pub fn super_type(self) -> Option<Type> {
        match self {
            Type::Number | Type::String => Some(Type::Datum),
            Type::Integer | Type::Float => Some(Type::Number),
            Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64 => Some(Type::Integer),
            Type::Float32 | Type::Float64 => Some(Type::Float),
            Type::Any | Type::Type | Type::Object | Type::Array | Type::Function | Type::Datum => {
                None
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Any => "any",
            Type::Type => "type",
            Type::Object => "obj",
            Type::Array => "array",
            Type::Function => "func",
            Type::Datum => "datum",
            Type::Number => "number",
            Type::Integer => "int",
            Type::Float => "float",
            Type::Int8 => "i8",
            Type::Int16 => "i16",
            Type::Int32 => "i32",
            Type::Int64 => "i64",
            Type::Float32 => "float32",
            Type::Float64 => "float64",
            Type::String => "str",
        }
    }

    /// Super types of `self`, nearest first
    pub fn ancestors(self) -> impl Iterator<Item = Type> {
        std::iter::successors(self.super_type(), |ty| ty.super_type())
    }

    /// `self` is `other` or one of its descendants
    pub fn extends(self, other: Type) -> bool {
        self == other || self.ancestors().any(|ty| ty == other)
    }

    pub fn is_numeric(self) -> bool {
        self.extends(Type::Number)
    }

    pub fn is_integer(self) -> bool {
        self.extends(Type::Integer)
    }

    pub fn is_float(self) -> bool {
        self.extends(Type::Float)
    }

    /// Bit width of a sized integer type
    pub fn int_width(self) -> Option<u32> {
        match self {
            Type::Int8 => Some(8),
            Type::Int16 => Some(16),
            Type::Int32 => Some(32),
            Type::Int64 => Some(64),
            _ => None,
        }
    }

    /// Numeric type with a concrete storage width
    pub fn is_sized(self) -> bool {
        self.int_width().is_some() || matches!(self, Type::Float32 | Type::Float64)
    }

    /// Can a value of type `candidate` be used where `self` is expected
    pub fn is_assignable(self, candidate: Type) -> bool {
        self == Type::Any
            || self == candidate
            || candidate.is_implicit_castable_to(self)
            || candidate.extends(self)
    }

    pub fn is_implicit_castable_to(self, target: Type) -> bool {
        if target == Type::Any || self == Type::Any || self == target {
            return true;
        }
        if self.is_integer() {
            return target.is_integer() || target.is_float() || self.extends(target);
        }
        if self.is_float() {
            return target.is_float() || self.extends(target);
        }
        self.extends(target)
    }

    pub fn is_castable_to(self, target: Type) -> bool {
        if self.is_implicit_castable_to(target) || target == Type::String {
            return true;
        }
        (self.is_numeric() || self == Type::String) && target.is_numeric()
    }

    /// Number of super-type hops from `self` up to `ancestor`
    fn hops_to(self, ancestor: Type) -> Option<u32> {
        std::iter::once(self)
            .chain(self.ancestors())
            .position(|ty| ty == ancestor)
            .map(|hops| hops as u32)
    }

    /// Closeness of an argument of type `self` to a parameter of type `param`
    ///
    /// Types implicitly castable both ways are at distance 0, so `any` is as
    /// close to every argument as an exact match.
    pub fn get_distance(self, param: Type) -> EvalResult<u32> {
        if self.is_implicit_castable_to(param) && param.is_implicit_castable_to(self) {
            return Ok(0);
        }
        if let Some(hops) = self.hops_to(param) {
            return Ok(hops);
        }
        if self.is_implicit_castable_to(param) {
            let common = std::iter::once(self)
                .chain(self.ancestors())
                .find_map(|ancestor| {
                    param
                        .hops_to(ancestor)
                        .and_then(|down| self.hops_to(ancestor).map(|up| up + down))
                });
            if let Some(distance) = common {
                return Ok(distance);
            }
        }
        Err(DashError::UnrelatedTypes {
            from: self.name().to_string(),
            to: param.name().to_string(),
        })
    }

    /// Find a binary operator on this type or the nearest super type defining it
    pub fn binary_operator(self, op: BinaryOp) -> Option<BinaryOperator> {
        let mut current = Some(self);
        while let Some(ty) = current {
            if let Some(f) = operators::binary(ty, op) {
                return Some(f);
            }
            current = ty.super_type();
        }
        None
    }

    /// Find a unary operator on this type or the nearest super type defining it
    pub fn unary_operator(self, op: UnaryOp) -> Option<UnaryOperator> {
        let mut current = Some(self);
        while let Some(ty) = current {
            if let Some(f) = operators::unary(ty, op) {
                return Some(f);
            }
            current = ty.super_type();
        }
        None
    }

    /// Explicit conversion of `value` into this type
    pub fn cast(self, value: &Value) -> EvalResult<Value> {
        if value.ty() == Type::Number {
            return Err(DashError::AmbiguousNumberType);
        }
        let mut current = Some(self);
        while let Some(ty) = current {
            if let Some(result) = ty.cast_rule(self, value) {
                return result;
            }
            current = ty.super_type();
        }
        Err(self.cannot_cast(value))
    }

    /// Bring a value already known to be assignable into the storage
    /// representation of a sized numeric constraint
    pub fn coerce(self, value: Value) -> EvalResult<Value> {
        if self.is_sized() && value.ty() != self && value.ty().is_numeric() {
            self.cast(&value)
        } else {
            Ok(value)
        }
    }

    fn cannot_cast(self, value: &Value) -> DashError {
        DashError::CannotCast {
            from: value.ty().name().to_string(),
            to: self.name().to_string(),
        }
    }

    /// Cast rule owned by `self`, applied on behalf of `target`
    fn cast_rule(self, target: Type, value: &Value) -> Option<EvalResult<Value>> {
        let result = match self {
            Type::Any => Ok(value.clone()),
            Type::String => Ok(Value::string(value.to_string())),
            Type::Number => Err(DashError::AmbiguousNumberType),
            Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64 => match value.data() {
                Data::Int(i) => Ok(Value::int(target, *i)),
                Data::Float(f) if f.is_finite() => Ok(Value::int(target, f.trunc() as i64)),
                Data::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(|i| Value::int(target, i))
                    .map_err(|_| target.cannot_cast(value)),
                _ => Err(target.cannot_cast(value)),
            },
            Type::Float32 | Type::Float64 => match value.data() {
                Data::Int(i) => Ok(Value::float(target, *i as f64)),
                Data::Float(f) => Ok(Value::float(target, *f)),
                Data::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(|f| Value::float(target, f))
                    .map_err(|_| target.cannot_cast(value)),
                _ => Err(target.cannot_cast(value)),
            },
            Type::Type | Type::Object | Type::Array | Type::Function => {
                if value.ty().extends(self) {
                    Ok(value.clone())
                } else {
                    Err(target.cannot_cast(value))
                }
            }
            Type::Datum | Type::Integer | Type::Float => return None,
        };
        Some(result)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
