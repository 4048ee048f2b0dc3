//! Script runtime bridge
//!
//! Hosts create one [`ScriptSession`] per running macro through the
//! [`ScriptRuntimeBridge`]. A session owns its interpreter, binds the
//! registered capability modules, runs user code as a coroutine and removes
//! everything it installed when it ends.

pub mod bridge;
pub mod diagnostics;
pub mod driver;
pub mod events;
pub mod macros;
pub mod session;
pub mod snippets;

pub use bridge::ScriptRuntimeBridge;
pub use diagnostics::{extract_error_details, GENERIC_ERROR_MESSAGE};
pub use driver::{MacroRunner, RunOutcome};
pub use events::{EventPayload, TriggerEvent, TriggerEventType};
pub use macros::{InMemoryMacroStore, MacroStore};
pub use session::{ScriptSession, SessionState, StepOutcome};
