//! Evaluator for Dash
//!
//! A recursive walk over the AST. Expressions produce values, statements may
//! stop the enclosing block early through `return`.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dash_parser::{
    Block, Chunk, Declaration, ExportItem, Expr, ExprKind, ForLoop, FunctionDecl, FunctionLiteral,
    Module, Stmt, StmtKind,
};
use indexmap::IndexMap;
use tracing::debug;

use crate::error::{DashError, EvalResult};
use crate::function::{Closure, FunctionValue, NativeFn, NativeFunction, Param};
use crate::iter::get_iterator;
use crate::loader::{normalize_path, ModuleLoader};
use crate::platform::Platform;
use crate::scope::{EnvRef, Environment};
use crate::types::Type;
use crate::value::{Properties, Value};

/// Minimum stack space to keep available before recursing
const RED_ZONE: usize = 100 * 1024;

/// Stack space allocated each time the stack has to grow
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Default limit on nested evaluations
pub const DEFAULT_MAX_DEPTH: usize = 10_000;

#[derive(Clone)]
struct NativeEntry {
    name: String,
    params: Option<Vec<Param>>,
    callback: NativeFn,
}

impl NativeEntry {
    fn to_function(&self) -> FunctionValue {
        FunctionValue::Native(NativeFunction {
            name: self.name.clone(),
            params: self.params.clone(),
            callback: Arc::clone(&self.callback),
        })
    }
}

/// Native functions installed into every root environment
#[derive(Default, Clone)]
pub struct NativeRegistry {
    functions: Vec<NativeEntry>,
    /// Functions exposed as fields of one object binding, e.g. `native.abs`
    groups: IndexMap<String, Vec<NativeEntry>>,
    /// Plain bindings such as `stop`
    values: Vec<(String, Value)>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function accepting any arguments
    pub fn register_function(&mut self, name: &str, f: NativeFn) {
        self.functions.push(NativeEntry {
            name: name.to_string(),
            params: None,
            callback: f,
        });
    }

    /// Register one overload with a typed signature
    pub fn register_function_with_params(&mut self, name: &str, params: Vec<Param>, f: NativeFn) {
        self.functions.push(NativeEntry {
            name: name.to_string(),
            params: Some(params),
            callback: f,
        });
    }

    pub fn register_group_function(&mut self, group: &str, name: &str, f: NativeFn) {
        self.groups.entry(group.to_string()).or_default().push(NativeEntry {
            name: name.to_string(),
            params: None,
            callback: f,
        });
    }

    pub fn register_value(&mut self, name: &str, value: Value) {
        self.values.push((name.to_string(), value));
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|entry| entry.name.as_str())
    }

    /// Define the functions and declare the groups and values in `env`
    pub fn install(&self, env: &EnvRef) -> EvalResult<()> {
        for entry in &self.functions {
            env.define_fn(&entry.name, entry.to_function());
        }
        for (name, value) in &self.values {
            env.declare(name, Type::Any, value.clone())?;
        }
        for (group, entries) in &self.groups {
            let fields: Properties = entries
                .iter()
                .map(|entry| (entry.name.clone(), Value::function(entry.to_function())))
                .collect();
            env.declare(group, Type::Any, Value::object(fields))?;
        }
        Ok(())
    }
}

/// Result of evaluating something that may contain a `return`
///
/// A `Return` travels up through every enclosing expression until a
/// function body or a module ends.
#[derive(Debug)]
pub enum Flow<T = Value> {
    Normal(T),
    Return(Value),
}

impl Flow {
    /// Collapse at a function or module boundary
    pub fn into_value(self) -> Value {
        match self {
            Flow::Normal(value) | Flow::Return(value) => value,
        }
    }
}

impl<T> Flow<T> {
    pub fn returned(self) -> Option<Value> {
        match self {
            Flow::Normal(_) => None,
            Flow::Return(value) => Some(value),
        }
    }
}

/// Unwrap a normal result or hand a `return` to the caller
macro_rules! normal {
    ($flow:expr) => {
        match $flow {
            Flow::Normal(value) => value,
            Flow::Return(value) => return Ok(Flow::Return(value)),
        }
    };
}

/// Dash evaluator
pub struct Evaluator {
    platform: Arc<Platform>,
    /// Native functions installed into each fresh root environment
    pub natives: NativeRegistry,
    /// Module loader for handling imports
    loader: RefCell<ModuleLoader>,
    /// Namespaces defined on each fresh root environment
    namespaces: IndexMap<String, PathBuf>,
    /// Recursion depth limit
    max_depth: usize,
    /// Current recursion depth
    depth: Cell<usize>,
}

impl Evaluator {
    /// Create a new evaluator
    pub fn new() -> Self {
        Self::with_natives(NativeRegistry::new())
    }

    /// Create an evaluator with native functions
    pub fn with_natives(natives: NativeRegistry) -> Self {
        let mut namespaces = IndexMap::new();
        namespaces.insert("dash".to_string(), PathBuf::from("./stdlib/"));
        Self {
            platform: Arc::new(Platform::new()),
            natives,
            loader: RefCell::new(ModuleLoader::default()),
            namespaces,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: Cell::new(0),
        }
    }

    /// Use a custom module loader
    pub fn with_loader(mut self, loader: ModuleLoader) -> Self {
        self.loader = RefCell::new(loader);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Add or replace an import namespace
    pub fn with_namespace(mut self, alias: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        self.namespaces.insert(alias.into(), base.into());
        self
    }

    pub fn platform(&self) -> &Arc<Platform> {
        &self.platform
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Set the base path for module loading
    pub fn set_base_path(&self, path: impl AsRef<Path>) {
        self.loader.borrow_mut().set_base_path(path);
    }

    pub fn base_path(&self) -> PathBuf {
        self.loader.borrow().base_path().to_path_buf()
    }

    /// A root environment with type names, natives and namespaces
    pub fn new_root_env(&self) -> EvalResult<EnvRef> {
        let root = Environment::root(Arc::clone(&self.platform));
        self.natives.install(&root)?;
        for (alias, base) in &self.namespaces {
            root.define_ns(alias, base.clone())?;
        }
        Ok(root)
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Evaluate source text in a fresh environment
    pub fn eval_str(&self, source: &str) -> EvalResult<Value> {
        let root = self.new_root_env()?;
        self.eval_str_in(source, &root.sub())
    }

    /// Evaluate source text in an existing environment
    pub fn eval_str_in(&self, source: &str, env: &EnvRef) -> EvalResult<Value> {
        let chunk = dash_parser::parse_chunk(source)?;
        self.eval_chunk(&chunk, env)
    }

    /// Evaluate a file in a fresh environment
    ///
    /// Relative imports made while evaluating it resolve against the file's
    /// directory.
    pub fn eval_file(&self, path: impl AsRef<Path>) -> EvalResult<Value> {
        let path = path.as_ref();
        let absolute = if path.is_relative() {
            normalize_path(&self.base_path().join(path))
        } else {
            normalize_path(path)
        };
        if let Some(parent) = absolute.parent() {
            self.set_base_path(parent);
        }
        let root = self.new_root_env()?;
        self.load_module(&root, absolute)
    }

    /// Bare expressions evaluate to their value, modules to their export bundle
    pub fn eval_chunk(&self, chunk: &Chunk, env: &EnvRef) -> EvalResult<Value> {
        match chunk {
            Chunk::Expression(expr) => self.eval_expr(expr, env),
            Chunk::Module(module) => self.eval_module(module, env),
        }
    }

    /// Run module statements in `env`
    ///
    /// A top-level `return` ends the module with that value.
    pub fn eval_module(&self, module: &Module, env: &EnvRef) -> EvalResult<Value> {
        for stmt in &module.statements {
            if let Some(value) = self.apply(stmt, env)? {
                return Ok(value);
            }
        }
        env.exports_value()
    }

    /// Import a module by specifier, relative to the loader's base path
    pub fn import_module(&self, env: &EnvRef, spec: &str) -> EvalResult<Value> {
        let path = env.resolve_import_path(spec, &self.base_path())?;
        self.load_module(env, path)
    }

    fn load_module(&self, env: &EnvRef, path: PathBuf) -> EvalResult<Value> {
        if let Some(cached) = env.cached_module(&path) {
            debug!(path = %path.display(), "module cache hit");
            return Ok(cached);
        }

        self.loader.borrow_mut().begin(&path)?;
        let result = self.eval_module_file(env, &path);
        self.loader.borrow_mut().finish(&path);

        let value = result?;
        debug!(path = %path.display(), "loaded module");
        env.cache_module(path, value.clone());
        Ok(value)
    }

    fn eval_module_file(&self, env: &EnvRef, path: &Path) -> EvalResult<Value> {
        let source = self.loader.borrow().load_source(path)?;
        let chunk = dash_parser::parse_chunk(&source)
            .map_err(|e| DashError::Parse(format!("{}: {}", path.display(), e)))?;
        let module_env = env.root_env().sub();
        self.eval_chunk(&chunk, &module_env)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Execute a statement; `Some` carries the value of a `return`
    pub fn apply(&self, stmt: &Stmt, env: &EnvRef) -> EvalResult<Option<Value>> {
        match &stmt.kind {
            StmtKind::Expr(expr) => Ok(self.eval_flow(expr, env)?.returned()),
            StmtKind::Declaration(decl) => Ok(self.declare(decl, env)?.returned()),
            StmtKind::Assignment { target, value } => {
                Ok(self.assign(&target.node, value, env)?.returned())
            }
            StmtKind::Function(decl) => {
                self.define_function(decl, env)?;
                Ok(None)
            }
            StmtKind::Export(item) => Ok(self.export(item, env)?.returned()),
            StmtKind::For(for_loop) => self.eval_for(for_loop, env, |_| {}),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_flow(expr, env)?.into_value(),
                    None => Value::void(),
                };
                Ok(Some(value))
            }
            StmtKind::Throw(expr) => match self.eval_flow(expr, env)? {
                Flow::Normal(value) => Err(DashError::Thrown(value.describe())),
                Flow::Return(value) => Ok(Some(value)),
            },
        }
    }

    /// Annotations wrap the value innermost first: `@a @b x := v` binds `a(b(v))`
    fn declare(&self, decl: &Declaration, env: &EnvRef) -> EvalResult<Flow<()>> {
        let ty = match &decl.ty {
            Some(ty) => self.eval_type(ty, env)?,
            None => Type::Any,
        };
        let mut value = normal!(self.eval_flow(&decl.value, env)?);
        for annotation in decl.annotations.iter().rev() {
            let annotation = normal!(self.eval_flow(annotation, env)?);
            value = self.call_value(&annotation, env, &[value])?;
        }
        env.declare(&decl.name.node, ty, value)?;
        Ok(Flow::Normal(()))
    }

    fn assign(&self, name: &str, value: &Expr, env: &EnvRef) -> EvalResult<Flow<()>> {
        let value = normal!(self.eval_flow(value, env)?);
        env.assign(name, value)?;
        Ok(Flow::Normal(()))
    }

    fn export(&self, item: &ExportItem, env: &EnvRef) -> EvalResult<Flow<()>> {
        let name = match item {
            ExportItem::Declaration(decl) => {
                normal!(self.declare(decl, env)?);
                &decl.name
            }
            ExportItem::Function(decl) => {
                self.define_function(decl, env)?;
                &decl.name
            }
            ExportItem::Name(name) => name,
        };
        env.add_export(&name.node)?;
        Ok(Flow::Normal(()))
    }

    fn define_function(&self, decl: &FunctionDecl, env: &EnvRef) -> EvalResult<()> {
        let function = self.make_closure(&decl.function, env)?;
        env.define_fn(&decl.name.node, function);
        Ok(())
    }

    fn make_closure(&self, literal: &Arc<FunctionLiteral>, env: &EnvRef) -> EvalResult<FunctionValue> {
        let params = literal
            .params
            .iter()
            .map(|param| {
                let ty = match &param.ty {
                    Some(ty) => self.eval_type(ty, env)?,
                    None => Type::Any,
                };
                Ok(if param.default.is_some() {
                    Param::optional(param.name.node.clone(), ty)
                } else {
                    Param::new(param.name.node.clone(), ty)
                })
            })
            .collect::<EvalResult<Vec<_>>>()?;
        let return_type = literal
            .return_type
            .as_ref()
            .map(|ty| self.eval_type(ty, env))
            .transpose()?;

        Ok(FunctionValue::Interpreted(Closure {
            params,
            return_type,
            literal: Arc::clone(literal),
            env: Arc::clone(env),
        }))
    }

    /// Run a for loop, handing each body value to `each`
    fn eval_for(
        &self,
        for_loop: &ForLoop,
        env: &EnvRef,
        mut each: impl FnMut(Value),
    ) -> EvalResult<Option<Value>> {
        let iterable = match self.eval_flow(&for_loop.iterable, env)? {
            Flow::Normal(value) => value,
            Flow::Return(value) => return Ok(Some(value)),
        };
        let iterator = get_iterator(self, &iterable, env)?;
        while !iterator.is_done(self, env)? {
            let item = iterator.next(self, env)?;
            let scope = env.sub();
            scope.declare(&for_loop.variable.node, Type::Any, item)?;
            match self.exec_block(&for_loop.body, &scope)? {
                Flow::Return(value) => return Ok(Some(value)),
                Flow::Normal(value) => each(value),
            }
        }
        Ok(None)
    }

    fn exec_block(&self, block: &Block, env: &EnvRef) -> EvalResult<Flow> {
        let scope = env.sub();
        for stmt in &block.statements {
            if let Some(value) = self.apply(stmt, &scope)? {
                return Ok(Flow::Return(value));
            }
        }
        match &block.tail {
            Some(tail) => self.eval_flow(tail, &scope),
            None => Ok(Flow::Normal(Value::void())),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Evaluate an expression, treating a `return` inside it as its value
    pub fn eval_expr(&self, expr: &Expr, env: &EnvRef) -> EvalResult<Value> {
        Ok(self.eval_flow(expr, env)?.into_value())
    }

    /// Evaluate an expression, keeping a `return` reached inside it
    pub fn eval_flow(&self, expr: &Expr, env: &EnvRef) -> EvalResult<Flow> {
        let current_depth = self.depth.get();
        if current_depth >= self.max_depth {
            return Err(DashError::StackOverflow(self.max_depth));
        }
        self.depth.set(current_depth + 1);
        let result = stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || {
            self.eval_flow_inner(expr, env)
        });
        self.depth.set(current_depth);
        result
    }

    fn eval_flow_inner(&self, expr: &Expr, env: &EnvRef) -> EvalResult<Flow> {
        let value = match &expr.kind {
            // Literals
            ExprKind::Int(i) => self.platform.int_literal(*i),
            ExprKind::Float(f) => self.platform.float_literal(*f),
            ExprKind::String(s) => Value::string(s.as_str()),
            ExprKind::Identifier(name) => env.get(name)?,

            ExprKind::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    if let ExprKind::For(for_loop) = &element.kind {
                        if let Some(value) = self.eval_for(for_loop, env, |v| items.push(v))? {
                            return Ok(Flow::Return(value));
                        }
                    } else {
                        items.push(normal!(self.eval_flow(element, env)?));
                    }
                }
                Value::array(items)
            }
            ExprKind::Object(fields) => {
                let mut properties = Properties::new();
                for (name, value) in fields {
                    let value = normal!(self.eval_flow(value, env)?);
                    properties.insert(name.node.clone(), value);
                }
                Value::object(properties)
            }
            ExprKind::Function(literal) => Value::function(self.make_closure(literal, env)?),
            ExprKind::Block(block) => return self.exec_block(block, env),

            ExprKind::Binary { op, left, right } => {
                let left = normal!(self.eval_flow(left, env)?);
                let operator =
                    left.ty()
                        .binary_operator(*op)
                        .ok_or_else(|| DashError::UnsupportedOperator {
                            op: op.symbol().to_string(),
                            ty: left.ty().name().to_string(),
                        })?;
                let right = normal!(self.eval_flow(right, env)?);
                operator(&left, &right)?
            }
            ExprKind::Unary { op, operand } => {
                let operand = normal!(self.eval_flow(operand, env)?);
                let operator = operand.ty().unary_operator(*op).ok_or_else(|| {
                    DashError::UnsupportedOperator {
                        op: op.to_string(),
                        ty: operand.ty().name().to_string(),
                    }
                })?;
                operator(&operand)?
            }
            ExprKind::Call { callee, args } => {
                let callee = normal!(self.eval_flow(callee, env)?);
                let function = callable(&callee)?;
                normal!(function.call_expr(self, env, args)?)
            }
            ExprKind::Cast { value, ty } => {
                let value = normal!(self.eval_flow(value, env)?);
                self.eval_type(ty, env)?.cast(&value)?
            }

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if normal!(self.eval_flow(condition, env)?).is_truthy() {
                    return self.eval_flow(then_branch, env);
                }
                match else_branch {
                    Some(branch) => return self.eval_flow(branch, env),
                    None => Value::void(),
                }
            }
            ExprKind::Switch {
                subject,
                cases,
                default,
            } => {
                let scope = env.sub();
                if let Some(subject) = subject {
                    let value = normal!(self.eval_flow(subject, env)?);
                    scope.declare("$", Type::Any, value)?;
                }
                for case in cases {
                    if normal!(self.eval_flow(&case.pattern, &scope)?).is_truthy() {
                        return self.eval_flow(&case.result, &scope);
                    }
                }
                match default {
                    Some(default) => return self.eval_flow(default, &scope),
                    None => return Err(DashError::NoMatchingCase),
                }
            }
            ExprKind::For(for_loop) => {
                let mut items = Vec::new();
                if let Some(value) = self.eval_for(for_loop, env, |v| items.push(v))? {
                    return Ok(Flow::Return(value));
                }
                Value::array(items)
            }
        };
        Ok(Flow::Normal(value))
    }

    /// Evaluate an expression that must produce a type value
    pub fn eval_type(&self, expr: &Expr, env: &EnvRef) -> EvalResult<Type> {
        let value = self.eval_expr(expr, env)?;
        value
            .as_type()
            .ok_or_else(|| DashError::type_error("type", value.ty().name()))
    }

    /// Call a function value with evaluated arguments
    pub fn call_value(&self, callee: &Value, env: &EnvRef, args: &[Value]) -> EvalResult<Value> {
        callable(callee)?.call(self, env, args)
    }
}

fn callable(callee: &Value) -> EvalResult<&Arc<FunctionValue>> {
    if !Type::Function.is_assignable(callee.ty()) {
        return Err(DashError::NotCallable(callee.describe()));
    }
    callee
        .as_function()
        .ok_or_else(|| DashError::NotCallable(callee.describe()))
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}
