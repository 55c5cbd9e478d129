//! Iterator protocol
//!
//! An iterator is any value exposing zero-argument `done` and `next`
//! functions, either directly or through an `iter` factory. A function is
//! iterated as a generator: each call yields an item until it returns `stop`.

use std::cell::{Cell, RefCell};
use std::mem;
use std::sync::Arc;

use tracing::trace;

use crate::error::{DashError, EvalResult};
use crate::evaluator::Evaluator;
use crate::function::FunctionValue;
use crate::scope::EnvRef;
use crate::value::{Data, Properties, Value};

/// Cursor over a materialized sequence
#[derive(Debug, Clone)]
pub struct SequenceIterator {
    items: Arc<Vec<Value>>,
    position: Arc<Cell<usize>>,
}

impl SequenceIterator {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: Arc::new(items),
            position: Arc::new(Cell::new(0)),
        }
    }

    pub fn is_done(&self) -> bool {
        self.position.get() >= self.items.len()
    }

    pub fn advance(&self) -> EvalResult<Value> {
        let position = self.position.get();
        let item = self
            .items
            .get(position)
            .cloned()
            .ok_or(DashError::IteratorExhausted)?;
        self.position.set(position + 1);
        Ok(item)
    }
}

/// Expose a sequence as a `{ done, next }` object
pub fn iterator_object(sequence: SequenceIterator) -> Value {
    let done = sequence.clone();
    let next = sequence;

    let mut fields = Properties::new();
    fields.insert(
        "done".to_string(),
        Value::function(FunctionValue::native("done", move |_, _, _| {
            Ok(Value::boolean(done.is_done()))
        })),
    );
    fields.insert(
        "next".to_string(),
        Value::function(FunctionValue::native("next", move |_, _, _| next.advance())),
    );
    Value::object(fields)
}

#[derive(Default)]
enum Pending {
    /// The next item has not been pulled yet
    #[default]
    Unknown,
    Ready(Value),
    Finished,
}

/// Pulls items from a zero-argument function until it returns `stop`
#[derive(Clone)]
pub struct GeneratorIterator {
    function: Arc<FunctionValue>,
    pending: Arc<RefCell<Pending>>,
}

impl GeneratorIterator {
    pub fn new(function: Arc<FunctionValue>) -> Self {
        Self {
            function,
            pending: Arc::new(RefCell::new(Pending::Unknown)),
        }
    }

    fn pull(&self, evaluator: &Evaluator, env: &EnvRef) -> EvalResult<()> {
        if matches!(*self.pending.borrow(), Pending::Unknown) {
            let item = self.function.call(evaluator, env, &[])?;
            *self.pending.borrow_mut() = if item.is_stop() {
                Pending::Finished
            } else {
                Pending::Ready(item)
            };
        }
        Ok(())
    }

    pub fn is_done(&self, evaluator: &Evaluator, env: &EnvRef) -> EvalResult<bool> {
        self.pull(evaluator, env)?;
        Ok(matches!(*self.pending.borrow(), Pending::Finished))
    }

    pub fn advance(&self, evaluator: &Evaluator, env: &EnvRef) -> EvalResult<Value> {
        self.pull(evaluator, env)?;
        let mut pending = self.pending.borrow_mut();
        match mem::take(&mut *pending) {
            Pending::Ready(item) => Ok(item),
            other => {
                *pending = other;
                Err(DashError::IteratorExhausted)
            }
        }
    }
}

/// Expose a generator as a `{ done, next }` object
pub fn generator_object(generator: GeneratorIterator) -> Value {
    let done = generator.clone();
    let next = generator;

    let mut fields = Properties::new();
    fields.insert(
        "done".to_string(),
        Value::function(FunctionValue::native("done", move |_, evaluator, env| {
            Ok(Value::boolean(done.is_done(evaluator, env)?))
        })),
    );
    fields.insert(
        "next".to_string(),
        Value::function(FunctionValue::native("next", move |_, evaluator, env| {
            next.advance(evaluator, env)
        })),
    );
    Value::object(fields)
}

/// A resolved `{ done, next }` pair
///
/// Once `done` has reported true, further `next` calls fail instead of
/// reaching the underlying function.
pub struct ValueIterator {
    done: Arc<FunctionValue>,
    next: Arc<FunctionValue>,
    finished: Cell<bool>,
}

impl ValueIterator {
    pub fn is_done(&self, evaluator: &Evaluator, env: &EnvRef) -> EvalResult<bool> {
        if self.finished.get() {
            return Ok(true);
        }
        let done = self.done.call(evaluator, env, &[])?.is_truthy();
        self.finished.set(done);
        Ok(done)
    }

    pub fn next(&self, evaluator: &Evaluator, env: &EnvRef) -> EvalResult<Value> {
        if self.finished.get() {
            return Err(DashError::IteratorExhausted);
        }
        self.next.call(evaluator, env, &[])
    }

    fn from_protocol(value: &Value) -> Option<Self> {
        let done = value.field("done")?.as_function()?;
        let next = value.field("next")?.as_function()?;
        Some(Self {
            done: Arc::clone(done),
            next: Arc::clone(next),
            finished: Cell::new(false),
        })
    }
}

/// The `{ done, next }` object for `value`
///
/// Arrays and strings get a fresh cursor and functions become generators;
/// objects are returned as they are when they already follow the protocol,
/// or asked for one via `iter()`.
pub fn iterator_value(evaluator: &Evaluator, value: &Value, env: &EnvRef) -> EvalResult<Value> {
    match value.data() {
        Data::Array(items) => Ok(iterator_object(SequenceIterator::new(
            items.as_ref().clone(),
        ))),
        Data::Str(text) => Ok(iterator_object(SequenceIterator::new(
            text.chars().map(|c| Value::string(c.to_string())).collect(),
        ))),
        Data::Function(function) => Ok(generator_object(GeneratorIterator::new(Arc::clone(
            function,
        )))),
        Data::Object(_) if ValueIterator::from_protocol(value).is_some() => Ok(value.clone()),
        Data::Object(_) => match value.field("iter").and_then(Value::as_function) {
            Some(factory) => {
                let produced = factory.call(evaluator, env, &[])?;
                match produced.as_function() {
                    Some(function) => Ok(generator_object(GeneratorIterator::new(Arc::clone(
                        function,
                    )))),
                    None => Ok(produced),
                }
            }
            None => Err(DashError::NotIterable(value.ty().name().to_string())),
        },
        _ => Err(DashError::NotIterable(value.ty().name().to_string())),
    }
}

/// Obtain an iterator for `value`
pub fn get_iterator(evaluator: &Evaluator, value: &Value, env: &EnvRef) -> EvalResult<ValueIterator> {
    let protocol = iterator_value(evaluator, value, env)?;
    trace!(ty = %value.ty(), "created iterator");
    ValueIterator::from_protocol(&protocol)
        .ok_or_else(|| DashError::NotIterable(value.ty().name().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_runs_out() {
        let sequence = SequenceIterator::new(vec![Value::i32(1), Value::i32(2)]);
        assert!(!sequence.is_done());
        assert_eq!(sequence.advance().unwrap().as_int(), Some(1));
        assert_eq!(sequence.advance().unwrap().as_int(), Some(2));
        assert!(sequence.is_done());
        assert_eq!(sequence.advance(), Err(DashError::IteratorExhausted));
    }

    #[test]
    fn test_generator_stops_at_sentinel() {
        let evaluator = Evaluator::new();
        let env = evaluator.new_root_env().unwrap();
        let calls = Arc::new(Cell::new(0));
        let counter = Arc::clone(&calls);
        let function = FunctionValue::native("count", move |_, _, _| {
            counter.set(counter.get() + 1);
            Ok(match counter.get() {
                n if n <= 2 => Value::i32(n),
                _ => Value::stop(),
            })
        });
        let generator = GeneratorIterator::new(Arc::new(function));

        assert!(!generator.is_done(&evaluator, &env).unwrap());
        assert!(!generator.is_done(&evaluator, &env).unwrap());
        assert_eq!(calls.get(), 1);
        assert_eq!(generator.advance(&evaluator, &env).unwrap().as_int(), Some(1));
        assert_eq!(generator.advance(&evaluator, &env).unwrap().as_int(), Some(2));
        assert!(generator.is_done(&evaluator, &env).unwrap());
        assert_eq!(
            generator.advance(&evaluator, &env),
            Err(DashError::IteratorExhausted)
        );
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_protocol_detection() {
        let object = iterator_object(SequenceIterator::new(vec![Value::i32(1)]));
        assert!(object.field("done").and_then(Value::as_function).is_some());
        assert!(ValueIterator::from_protocol(&object).is_some());
        assert!(ValueIterator::from_protocol(&Value::i32(1)).is_none());
    }
}
