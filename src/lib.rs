//! Arc Macro - scripting runtime for Arc Citadel macros
//!
//! Two halves: [`modifiers`] strips inline directives such as `<wait.2>`
//! from command lines, and [`runtime`] runs Lua macro scripts in isolated
//! sessions against the host [`capabilities`].

pub mod capabilities;
pub mod core;
pub mod modifiers;
pub mod runtime;

pub use crate::core::{BridgeConfig, MacroError, Result};
