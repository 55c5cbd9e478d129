//! Dash Runtime
//!
//! This crate provides the type lattice, values, environments and the
//! evaluator for the Dash scripting language.

// Allow Arc with non-Send/Sync types - this is a single-threaded runtime
// that uses Arc for shared ownership, not for cross-thread sharing.
#![allow(clippy::arc_with_non_send_sync)]

pub mod error;
pub mod evaluator;
pub mod function;
pub mod iter;
pub mod loader;
mod operators;
pub mod overloads;
pub mod platform;
pub mod scope;
pub mod types;
pub mod value;

pub use error::{DashError, EvalResult};
pub use evaluator::{Evaluator, Flow, NativeRegistry, DEFAULT_MAX_DEPTH};
pub use function::{Closure, FunctionValue, NativeFn, NativeFunction, Param};
pub use iter::{
    generator_object, get_iterator, iterator_object, iterator_value, GeneratorIterator,
    SequenceIterator, ValueIterator,
};
pub use loader::ModuleLoader;
pub use overloads::{FunctionOverloads, OverloadsRef};
pub use platform::{DatumType, Platform};
pub use scope::{EnvRef, Environment};
pub use types::Type;
pub use value::{Data, Properties, Value};
