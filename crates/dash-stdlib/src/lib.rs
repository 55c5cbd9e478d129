//! Dash Standard Library
//!
//! This crate provides the native functions installed into every Dash root
//! environment.

// Allow Arc with non-Send/Sync types - this is a single-threaded runtime
#![allow(clippy::arc_with_non_send_sync)]

mod base;
mod math;

use dash_runtime::NativeRegistry;

/// Register all standard library native functions
pub fn register_stdlib(registry: &mut NativeRegistry) {
    base::register(registry);
    math::register(registry);
}

/// Create a native registry with all stdlib functions registered
pub fn stdlib_registry() -> NativeRegistry {
    let mut registry = NativeRegistry::new();
    register_stdlib(&mut registry);
    registry
}
