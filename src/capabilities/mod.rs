//! Host capabilities exposed to macro scripts
//!
//! Each capability module declares its functions, properties and
//! enumerations explicitly; the [`ModuleRegistry`] installs them into a
//! session's global namespace before any user code runs.

pub mod actions;
pub mod binding;
pub mod registry;

pub use actions::{ActionHost, ActionType, ActionsModule};
pub use binding::{
    Arity, CapabilityModule, EnumBinding, FunctionBinding, ModuleDescriptor, PropertyBinding,
};
pub use registry::ModuleRegistry;
