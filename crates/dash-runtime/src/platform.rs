//! Built-in type registry
//!
//! The platform maps the language's datum tags to [`Type`] nodes and owns the
//! type-name surface seeded into every root environment.

use std::collections::HashMap;

use crate::types::Type;
use crate::value::{Data, Value};

/// Built-in datum tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatumType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Function,
    String,
    Type,
    Array,
    Object,
    Any,
    Number,
    Integer,
    Float,
}

impl DatumType {
    pub const ALL: [DatumType; 15] = [
        DatumType::Int8,
        DatumType::Int16,
        DatumType::Int32,
        DatumType::Int64,
        DatumType::Float32,
        DatumType::Float64,
        DatumType::Function,
        DatumType::String,
        DatumType::Type,
        DatumType::Array,
        DatumType::Object,
        DatumType::Any,
        DatumType::Number,
        DatumType::Integer,
        DatumType::Float,
    ];
}

/// Names bound in every root environment, with the datum they denote
const TYPE_NAMES: [(&str, DatumType); 14] = [
    ("float", DatumType::Float),
    ("float32", DatumType::Float32),
    ("float64", DatumType::Float64),
    ("int", DatumType::Integer),
    ("i8", DatumType::Int8),
    ("i16", DatumType::Int16),
    ("i32", DatumType::Int32),
    ("i64", DatumType::Int64),
    ("func", DatumType::Function),
    ("str", DatumType::String),
    ("type", DatumType::Type),
    ("obj", DatumType::Object),
    ("array", DatumType::Array),
    ("any", DatumType::Any),
];

/// Type registry shared by every environment of one program
#[derive(Debug)]
pub struct Platform {
    types: HashMap<DatumType, Type>,
    type_values: HashMap<Type, Value>,
}

impl Default for Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform {
    pub fn new() -> Self {
        let mut platform = Self {
            types: HashMap::new(),
            type_values: HashMap::new(),
        };
        for datum in DatumType::ALL {
            platform.define_base_type(datum, Self::bootstrap_type(datum));
        }
        platform
    }

    fn bootstrap_type(datum: DatumType) -> Type {
        match datum {
            DatumType::Int8 => Type::Int8,
            DatumType::Int16 => Type::Int16,
            DatumType::Int32 => Type::Int32,
            DatumType::Int64 => Type::Int64,
            DatumType::Float32 => Type::Float32,
            DatumType::Float64 => Type::Float64,
            DatumType::Function => Type::Function,
            DatumType::String => Type::String,
            DatumType::Type => Type::Type,
            DatumType::Array => Type::Array,
            DatumType::Object => Type::Object,
            DatumType::Any => Type::Any,
            DatumType::Number => Type::Number,
            DatumType::Integer => Type::Integer,
            DatumType::Float => Type::Float,
        }
    }

    fn define_base_type(&mut self, datum: DatumType, ty: Type) {
        debug_assert!(!self.types.contains_key(&datum), "{:?} defined twice", datum);
        self.types.insert(datum, ty);
        self.type_values.insert(ty, Value::type_value(ty));
    }

    pub fn base_type(&self, datum: DatumType) -> Type {
        self.types
            .get(&datum)
            .copied()
            .unwrap_or_else(|| Self::bootstrap_type(datum))
    }

    /// The `type`-typed value wrapping a base type
    pub fn base_type_value(&self, datum: DatumType) -> Value {
        let ty = self.base_type(datum);
        self.type_values
            .get(&ty)
            .cloned()
            .unwrap_or_else(|| Value::type_value(ty))
    }

    pub fn new_datum_value(&self, datum: DatumType, data: Data) -> Value {
        Value::new(self.base_type(datum), data)
    }

    /// Type of integer literals
    pub fn int_literal(&self, value: i64) -> Value {
        Value::int(self.base_type(DatumType::Int32), value)
    }

    /// Type of float literals
    pub fn float_literal(&self, value: f64) -> Value {
        Value::float(self.base_type(DatumType::Float64), value)
    }

    /// Global type names and their type values
    pub fn type_names(&self) -> impl Iterator<Item = (&'static str, Value)> + '_ {
        TYPE_NAMES
            .iter()
            .map(|(name, datum)| (*name, self.base_type_value(*datum)))
    }
}
