//! Environment chain for Dash evaluation
//!
//! Every lexical block, function call and module load gets its own
//! [`Environment`]. Children hold their parent; closures hold the environment
//! they were defined in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::debug;

use crate::error::{DashError, EvalResult};
use crate::function::FunctionValue;
use crate::loader::normalize_path;
use crate::overloads::{FunctionOverloads, OverloadsRef};
use crate::platform::Platform;
use crate::types::Type;
use crate::value::{Properties, Value};

/// Reference to an environment (shared)
pub type EnvRef = Arc<Environment>;

/// Bindings owned by a single environment
#[derive(Debug, Default, Clone)]
struct Frame {
    /// Declared type constraint per name
    declarations: HashMap<String, Type>,
    bindings: HashMap<String, Value>,
    functions: HashMap<String, OverloadsRef>,
    exports: IndexSet<String>,
    /// Import namespace alias -> base directory
    namespaces: HashMap<String, PathBuf>,
    /// Normalized module path -> module value; only used on the root
    module_cache: HashMap<PathBuf, Value>,
}

/// Lexical scope
#[derive(Debug)]
pub struct Environment {
    parent: Option<EnvRef>,
    platform: Arc<Platform>,
    frame: RefCell<Frame>,
}

impl Environment {
    /// Create a root environment with the built-in type names declared
    pub fn root(platform: Arc<Platform>) -> EnvRef {
        let mut frame = Frame::default();
        for (name, value) in platform.type_names() {
            frame.declarations.insert(name.to_string(), Type::Type);
            frame.bindings.insert(name.to_string(), value);
        }
        Arc::new(Self {
            parent: None,
            platform,
            frame: RefCell::new(frame),
        })
    }

    /// Create a child that sees later changes to this environment
    pub fn sub(self: &EnvRef) -> EnvRef {
        Arc::new(Self {
            parent: Some(Arc::clone(self)),
            platform: Arc::clone(&self.platform),
            frame: RefCell::new(Frame::default()),
        })
    }

    /// Snapshot the whole chain into a detached root
    ///
    /// Later assignments and function declarations in the original chain are
    /// not visible through the snapshot, and vice versa.
    pub fn save(&self) -> EnvRef {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = &current.parent {
            current = parent.as_ref();
            chain.push(current);
        }

        let mut flat = Frame::default();
        for env in chain.into_iter().rev() {
            let frame = env.frame.borrow();
            flat.declarations.extend(frame.declarations.clone());
            flat.bindings.extend(frame.bindings.clone());
            for (name, overloads) in &frame.functions {
                let copy = overloads.borrow().detached();
                flat.functions.insert(name.clone(), Arc::new(RefCell::new(copy)));
            }
            flat.namespaces.extend(frame.namespaces.clone());
            flat.module_cache.extend(frame.module_cache.clone());
        }

        Arc::new(Self {
            parent: None,
            platform: Arc::clone(&self.platform),
            frame: RefCell::new(flat),
        })
    }

    pub fn platform(&self) -> &Arc<Platform> {
        &self.platform
    }

    pub fn parent(&self) -> Option<&EnvRef> {
        self.parent.as_ref()
    }

    /// The root of this chain
    pub fn root_env(self: &EnvRef) -> EnvRef {
        let mut env = Arc::clone(self);
        while let Some(parent) = env.parent.clone() {
            env = parent;
        }
        env
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Introduce `name` in this scope with constraint `ty`
    pub fn declare(&self, name: &str, ty: Type, value: Value) -> EvalResult<()> {
        let mut frame = self.frame.borrow_mut();
        if frame.declarations.contains_key(name) {
            return Err(DashError::AlreadyDeclared(name.to_string()));
        }
        let value = check_constraint(name, ty, value)?;
        frame.declarations.insert(name.to_string(), ty);
        frame.bindings.insert(name.to_string(), value);
        Ok(())
    }

    /// Rebind `name` in the nearest scope that declares it
    pub fn assign(&self, name: &str, value: Value) -> EvalResult<()> {
        let mut env = self;
        loop {
            let ty = env.frame.borrow().declarations.get(name).copied();
            if let Some(ty) = ty {
                let value = check_constraint(name, ty, value)?;
                env.frame
                    .borrow_mut()
                    .bindings
                    .insert(name.to_string(), value);
                return Ok(());
            }
            match &env.parent {
                Some(parent) => env = parent,
                None => return Err(DashError::Undeclared(name.to_string())),
            }
        }
    }

    /// Look up a variable or function, walking the parent chain
    pub fn get(&self, name: &str) -> EvalResult<Value> {
        self.lookup(name)
            .ok_or_else(|| DashError::Undefined(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        {
            let frame = self.frame.borrow();
            if let Some(value) = frame.bindings.get(name) {
                return Some(value.clone());
            }
            if let Some(overloads) = frame.functions.get(name) {
                return Some(FunctionOverloads::to_value(overloads));
            }
        }
        self.parent.as_ref()?.lookup(name)
    }

    /// Declared constraint of `name`, if declared anywhere in the chain
    pub fn constraint(&self, name: &str) -> Option<Type> {
        let ty = self.frame.borrow().declarations.get(name).copied();
        ty.or_else(|| self.parent.as_ref()?.constraint(name))
    }

    fn has_local(&self, name: &str) -> bool {
        let frame = self.frame.borrow();
        frame.bindings.contains_key(name) || frame.functions.contains_key(name)
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Add `function` to the overload set `name` of this scope
    ///
    /// A new set links to the same-named set of the enclosing scopes, so
    /// overloads declared here sit beside those declared further out.
    pub fn define_fn(&self, name: &str, function: FunctionValue) -> OverloadsRef {
        let existing = self.frame.borrow().functions.get(name).cloned();
        let overloads = match existing {
            Some(overloads) => overloads,
            None => {
                let outer = self.parent.as_ref().and_then(|parent| parent.overloads(name));
                let overloads = Arc::new(RefCell::new(FunctionOverloads::with_outer(name, outer)));
                self.frame
                    .borrow_mut()
                    .functions
                    .insert(name.to_string(), Arc::clone(&overloads));
                overloads
            }
        };
        overloads.borrow_mut().add(Arc::new(function));
        overloads
    }

    /// Overload set declared in this scope or an ancestor
    pub fn overloads(&self, name: &str) -> Option<OverloadsRef> {
        let found = self.frame.borrow().functions.get(name).cloned();
        found.or_else(|| self.parent.as_ref()?.overloads(name))
    }

    // =========================================================================
    // Exports
    // =========================================================================

    /// Mark a locally bound name as part of the module surface
    pub fn add_export(&self, name: &str) -> EvalResult<()> {
        if !self.has_local(name) {
            return Err(DashError::UnknownExport(name.to_string()));
        }
        if !self.frame.borrow_mut().exports.insert(name.to_string()) {
            return Err(DashError::DuplicateExport(name.to_string()));
        }
        Ok(())
    }

    pub fn exports(&self) -> Vec<String> {
        self.frame.borrow().exports.iter().cloned().collect()
    }

    /// The export bundle: an object whose properties are the exported values
    pub fn exports_value(&self) -> EvalResult<Value> {
        let mut properties = Properties::new();
        for name in self.exports() {
            let value = self.get(&name)?;
            properties.insert(name, value);
        }
        Ok(Value::object(Properties::new()).with_properties(properties))
    }

    // =========================================================================
    // Namespaces and module cache
    // =========================================================================

    /// Register an import namespace in this scope
    pub fn define_ns(&self, alias: &str, base: impl Into<PathBuf>) -> EvalResult<()> {
        let mut frame = self.frame.borrow_mut();
        if frame.namespaces.contains_key(alias) {
            return Err(DashError::NamespaceDefined(alias.to_string()));
        }
        let base = base.into();
        debug!(alias, base = %base.display(), "defined namespace");
        frame.namespaces.insert(alias.to_string(), base);
        Ok(())
    }

    pub fn lookup_namespace(&self, alias: &str) -> Option<PathBuf> {
        let found = self.frame.borrow().namespaces.get(alias).cloned();
        found.or_else(|| self.parent.as_ref()?.lookup_namespace(alias))
    }

    /// Turn an import specifier into a normalized module path
    ///
    /// `ns:rest` is rewritten through the namespace table, relative paths are
    /// joined onto `base_dir` and `.dash` is appended when missing.
    pub fn resolve_import_path(&self, spec: &str, base_dir: &Path) -> EvalResult<PathBuf> {
        let mut path = match spec.split_once(':') {
            Some((alias, rest)) => {
                let base = self
                    .lookup_namespace(alias)
                    .ok_or_else(|| DashError::UnknownNamespace(alias.to_string()))?;
                base.join(rest)
            }
            None => PathBuf::from(spec),
        };
        if path.extension().map_or(true, |ext| ext != "dash") {
            let mut name = path.into_os_string();
            name.push(".dash");
            path = PathBuf::from(name);
        }
        if path.is_relative() {
            path = base_dir.join(path);
        }
        Ok(normalize_path(&path))
    }

    pub fn cached_module(self: &EnvRef, path: &Path) -> Option<Value> {
        let root = self.root_env();
        let cached = root.frame.borrow().module_cache.get(path).cloned();
        cached
    }

    pub fn cache_module(self: &EnvRef, path: PathBuf, value: Value) {
        let root = self.root_env();
        root.frame.borrow_mut().module_cache.insert(path, value);
    }
}

/// Check `value` against a declared constraint, casting to sized numeric types
fn check_constraint(name: &str, ty: Type, value: Value) -> EvalResult<Value> {
    if !ty.is_assignable(value.ty()) {
        return Err(DashError::IncompatibleAssignment {
            name: name.to_string(),
            expected: ty.name().to_string(),
            actual: value.ty().name().to_string(),
        });
    }
    ty.coerce(value)
}
