//! Runtime error types

use thiserror::Error;

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, DashError>;

/// Evaluation error
///
/// Every failure inside the runtime is reported through this one type; the
/// variants only group the human readable message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DashError {
    // Binding errors
    #[error("Undefined '{0}'")]
    Undefined(String),

    #[error("already declared '{0}'")]
    AlreadyDeclared(String),

    #[error("cannot assign to undeclared '{0}'")]
    Undeclared(String),

    #[error("cannot assign {actual} to '{name}' of type {expected}")]
    IncompatibleAssignment {
        name: String,
        expected: String,
        actual: String,
    },

    // Type errors
    #[error("cannot do op {op} on type {ty}")]
    UnsupportedOperator { op: String, ty: String },

    #[error("cannot do op {op} on types {left} and {right}")]
    IncompatibleOperands {
        op: String,
        left: String,
        right: String,
    },

    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    #[error("cannot cast {from} to {to}")]
    CannotCast { from: String, to: String },

    #[error("ambiguous number type")]
    AmbiguousNumberType,

    #[error("cannot measure distance from {from} to unrelated type {to}")]
    UnrelatedTypes { from: String, to: String },

    #[error("property '{property}' does not exist on {ty}")]
    PropertyNotFound { property: String, ty: String },

    #[error("Index out of bounds: {index} (length: {length})")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    // Call errors
    #[error("incorrect arg count: expected {expected}, got {actual}")]
    IncorrectArgCount { expected: String, actual: usize },

    #[error("arg {index} expected {expected} got {actual}")]
    ArgTypeMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("return type mismatch: expected {expected}, got {actual}")]
    ReturnTypeMismatch { expected: String, actual: String },

    #[error("target is not callable: {0}")]
    NotCallable(String),

    #[error("no match for args [{args}] calling '{name}'{candidates}")]
    NoMatchingOverload {
        name: String,
        args: String,
        candidates: String,
    },

    #[error("identical matches for args [{args}] calling '{name}'")]
    AmbiguousOverload { name: String, args: String },

    // Iteration errors
    #[error("{0} not iterable")]
    NotIterable(String),

    #[error("iterator already exhausted")]
    IteratorExhausted,

    #[error("No match")]
    NoMatchingCase,

    // Module errors
    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    #[error("unknown import namespace '{0}'")]
    UnknownNamespace(String),

    #[error("namespace '{0}' already defined")]
    NamespaceDefined(String),

    #[error("cannot export unknown identifier '{0}'")]
    UnknownExport(String),

    #[error("'{0}' already exported")]
    DuplicateExport(String),

    #[error("circular import of '{0}'")]
    CircularImport(String),

    // Construction invariant
    #[error("null or undefined payload for {0}")]
    NullPayload(String),

    #[error("Throw! {0}")]
    Thrown(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Stack overflow: recursion deeper than {0}")]
    StackOverflow(usize),
}

impl DashError {
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        DashError::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        DashError::InvalidOperation(message.into())
    }
}

impl From<dash_parser::ParseError> for DashError {
    fn from(err: dash_parser::ParseError) -> Self {
        DashError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for DashError {
    fn from(err: std::io::Error) -> Self {
        DashError::Io(err.to_string())
    }
}
