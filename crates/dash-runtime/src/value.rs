//! Runtime values for Dash

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{DashError, EvalResult};
use crate::function::FunctionValue;
use crate::types::Type;

/// Named values attached to objects, arrays and module bundles
pub type Properties = IndexMap<String, Value>;

/// Value payload
#[derive(Debug, Clone)]
pub enum Data {
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Type(Type),
    Array(Arc<Vec<Value>>),
    Object(Arc<Properties>),
    Function(Arc<FunctionValue>),
    /// Sentinel a generator function returns when it has no more items
    Stop,
}

/// Runtime value: a type, a payload and optional named properties
///
/// Values are immutable; operations build new values.
#[derive(Clone)]
pub struct Value {
    ty: Type,
    data: Data,
    properties: Option<Arc<Properties>>,
}

impl Value {
    /// Build a value from a host payload that may be missing
    pub fn try_new(ty: Type, data: Option<Data>) -> EvalResult<Self> {
        match data {
            Some(data) => Ok(Self::new(ty, data)),
            None => Err(DashError::NullPayload(ty.name().to_string())),
        }
    }

    pub fn new(ty: Type, data: Data) -> Self {
        Self {
            ty,
            data,
            properties: None,
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Some(Arc::new(properties));
        self
    }

    /// Result of statements and branches that produce nothing
    pub fn void() -> Self {
        Self::new(Type::Integer, Data::Int(0))
    }

    /// The value bound to `stop`
    pub fn stop() -> Self {
        Self::new(Type::Any, Data::Stop)
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.data, Data::Stop)
    }

    /// Integer of type `ty`, wrapped to its width
    pub fn int(ty: Type, value: i64) -> Self {
        let value = match ty.int_width() {
            Some(8) => value as i8 as i64,
            Some(16) => value as i16 as i64,
            Some(32) => value as i32 as i64,
            _ => value,
        };
        Self::new(ty, Data::Int(value))
    }

    pub fn i32(value: i64) -> Self {
        Self::int(Type::Int32, value)
    }

    /// Float of type `ty`, rounded to its precision
    pub fn float(ty: Type, value: f64) -> Self {
        let value = if ty == Type::Float32 {
            value as f32 as f64
        } else {
            value
        };
        Self::new(ty, Data::Float(value))
    }

    pub fn float64(value: f64) -> Self {
        Self::float(Type::Float64, value)
    }

    /// Numeric boolean: `1` or `0` as an `i8`
    pub fn boolean(value: bool) -> Self {
        Self::int(Type::Int8, value as i64)
    }

    pub fn string(value: impl Into<Arc<str>>) -> Self {
        Self::new(Type::String, Data::Str(value.into()))
    }

    pub fn type_value(ty: Type) -> Self {
        Self::new(Type::Type, Data::Type(ty))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::new(Type::Array, Data::Array(Arc::new(items)))
    }

    pub fn object(fields: Properties) -> Self {
        Self::new(Type::Object, Data::Object(Arc::new(fields)))
    }

    pub fn function(function: FunctionValue) -> Self {
        Self::new(Type::Function, Data::Function(Arc::new(function)))
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn properties(&self) -> Option<&Properties> {
        self.properties.as_deref()
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.as_ref()?.get(name)
    }

    /// Named member: properties first, then object literal fields
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.property(name).or_else(|| match &self.data {
            Data::Object(fields) => fields.get(name),
            _ => None,
        })
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.data {
            Data::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.data {
            Data::Int(i) => Some(i as f64),
            Data::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Integral numeric payload usable as an index
    pub fn as_index(&self) -> Option<i64> {
        if !self.ty.is_numeric() {
            return None;
        }
        match self.data {
            Data::Int(i) => Some(i),
            Data::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            Data::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<Type> {
        match self.data {
            Data::Type(ty) if self.ty == Type::Type => Some(ty),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arc<Vec<Value>>> {
        match &self.data {
            Data::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Arc<FunctionValue>> {
        match &self.data {
            Data::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Zero and empty payloads are falsy
    pub fn is_truthy(&self) -> bool {
        match &self.data {
            Data::Int(i) => *i != 0,
            Data::Float(f) => *f != 0.0 && !f.is_nan(),
            Data::Str(s) => !s.is_empty(),
            Data::Array(items) => !items.is_empty(),
            Data::Type(_) | Data::Object(_) | Data::Function(_) => true,
            Data::Stop => false,
        }
    }

    /// Type-tagged rendering used in diagnostics, e.g. `[i32 5]`
    pub fn describe(&self) -> String {
        format!("[{} {}]", self.ty, self)
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Data::Str(s) => write!(f, "\"{}\"", escape_string(s)),
            _ => write!(f, "{}", self),
        }
    }
}

fn fmt_float(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        write!(f, "NaN")
    } else if n.is_infinite() {
        if n > 0.0 {
            write!(f, "∞")
        } else {
            write!(f, "-∞")
        }
    } else {
        write!(f, "{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Data::Int(i) => write!(f, "{}", i),
            Data::Float(n) => fmt_float(*n, f),
            Data::Str(s) => write!(f, "{}", s),
            Data::Type(ty) => write!(f, "{}", ty),
            Data::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            Data::Object(fields) => {
                let members = self.properties().into_iter().flatten().chain(fields.iter());
                write!(f, "{{")?;
                for (i, (name, value)) in members.enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: ", name)?;
                    value.fmt_nested(f)?;
                }
                if self.properties().is_some_and(|p| !p.is_empty()) || !fields.is_empty() {
                    write!(f, " ")?;
                }
                write!(f, "}}")
            }
            Data::Function(function) => write!(f, "<fn {}>", function.signature()),
            Data::Stop => write!(f, "stop"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            c => result.push(c),
        }
    }
    result
}

/// Payload equality; numbers compare by value across widths
impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Data::Int(a), Data::Int(b)) => a == b,
            (Data::Float(a), Data::Float(b)) => a == b,
            (Data::Int(a), Data::Float(b)) | (Data::Float(b), Data::Int(a)) => (*a as f64) == *b,
            (Data::Str(a), Data::Str(b)) => a == b,
            (Data::Type(a), Data::Type(b)) => a == b,
            (Data::Array(a), Data::Array(b)) => a == b,
            (Data::Object(a), Data::Object(b)) => a == b,
            (Data::Function(a), Data::Function(b)) => Arc::ptr_eq(a, b),
            (Data::Stop, Data::Stop) => true,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.properties == other.properties
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.data {
            Data::Int(i) => serializer.serialize_i64(*i),
            Data::Float(n) => serializer.serialize_f64(*n),
            Data::Str(s) => serializer.serialize_str(s),
            Data::Type(ty) => serializer.serialize_str(ty.name()),
            Data::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Data::Object(fields) => {
                let properties = self.properties().into_iter().flatten();
                let mut map = serializer.serialize_map(None)?;
                for (name, value) in properties.chain(fields.iter()) {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Data::Function(function) => {
                serializer.serialize_str(&format!("<fn {}>", function.signature()))
            }
            Data::Stop => serializer.serialize_unit(),
        }
    }
}
