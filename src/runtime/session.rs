//! One script session: an interpreter bound to the capability modules
//!
//! Lifecycle: `Created -> Bound -> Running -> {Completed | Failed | Cancelled}`.
//! Binding first records a baseline of the interpreter's globals and standard
//! tables, then sandboxes it. Every terminal transition tears the session
//! down exactly once, removing all globals the session installed. Handing
//! the interpreter back for reuse restores the baseline, so user globals and
//! changes to standard tables do not reach the next session.

use mlua::{Function, Lua, MultiValue, Table, Thread, ThreadStatus, Value};
use serde::Serialize;
use std::sync::Arc;

use crate::capabilities::registry::ModuleRegistry;
use crate::core::error::{MacroError, Result};
use crate::core::types::SessionId;
use crate::runtime::diagnostics::{extract_error_details, GETINFO_REGISTRY_KEY};
use crate::runtime::events::{trigger_table, TriggerEvent, TRIGGER_DATA_GLOBAL};
use crate::runtime::macros::MacroStore;
use crate::runtime::snippets::{
    wrap_entrypoint, FSTRING_SNIPPET, REQUIRE_SNIPPET, SANDBOX_SNIPPET, WAIT_SNIPPET,
};

/// Host-only accessor returning a stored macro body, or nil
pub const INTERNAL_MACRO_TEXT: &str = "__arc_get_macro_text";

/// Globals installed by the session itself (modules are tracked by the registry)
pub const HELPER_GLOBALS: [&str; 5] = [
    "arc",
    "f",
    "print",
    INTERNAL_MACRO_TEXT,
    TRIGGER_DATA_GLOBAL,
];

/// Log target for script `print` output
pub const SCRIPT_LOG_TARGET: &str = "arc_macro::script";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Created,
    Bound,
    /// User frame started; between steps it is suspended at `arc.wait`
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// Result of running the user frame until it stops
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Suspended at a host-designated point; resume after the wait
    Suspended { wait_seconds: f64 },
    Completed,
    /// The script raised; carries the extracted diagnostic
    Failed(String),
}

/// Event context owned by one session
#[derive(Debug, Clone, Default)]
struct SessionContext {
    trigger: Option<TriggerEvent>,
}

pub struct ScriptSession {
    id: SessionId,
    macro_name: String,
    lua: Lua,
    modules: Arc<ModuleRegistry>,
    macros: Arc<dyn MacroStore>,
    require_paths: Arc<[String]>,
    default_wait_seconds: f64,
    state: SessionState,
    context: SessionContext,
    thread: Option<Thread>,
    close_coroutine: Option<Function>,
    restore_baseline: Option<Function>,
    last_error: Option<String>,
    torn_down: bool,
}

impl ScriptSession {
    pub(crate) fn new(
        macro_name: &str,
        lua: Lua,
        modules: Arc<ModuleRegistry>,
        macros: Arc<dyn MacroStore>,
        require_paths: Arc<[String]>,
        default_wait_seconds: f64,
    ) -> Self {
        Self {
            id: SessionId::new(),
            macro_name: macro_name.to_string(),
            lua,
            modules,
            macros,
            require_paths,
            default_wait_seconds,
            state: SessionState::Created,
            context: SessionContext::default(),
            thread: None,
            close_coroutine: None,
            restore_baseline: None,
            last_error: None,
            torn_down: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn macro_name(&self) -> &str {
        &self.macro_name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Diagnostic captured when the session failed
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Most recently delivered event
    pub fn trigger(&self) -> Option<&TriggerEvent> {
        self.context.trigger.as_ref()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// The underlying interpreter
    pub fn interpreter(&self) -> &Lua {
        &self.lua
    }

    /// Install modules, helpers and the event table
    ///
    /// On failure every binding made so far is removed and the session ends
    /// in `Failed`.
    pub fn bind(&mut self) -> Result<()> {
        self.expect_state(SessionState::Created, "Created")?;

        if let Err(e) = self.install() {
            tracing::error!(session = %self.id, "Failed to bind macro {}: {}", self.macro_name, e);
            self.last_error = Some(e.to_string());
            self.state = SessionState::Failed;
            self.teardown();
            return Err(e.into());
        }

        self.state = SessionState::Bound;
        tracing::debug!(session = %self.id, "Bound macro {}", self.macro_name);
        Ok(())
    }

    fn install(&mut self) -> mlua::Result<()> {
        let lua = &self.lua;
        let globals = lua.globals();

        let (restore, getinfo, getlocal): (Function, Option<Function>, Option<Function>) =
            lua.load(SANDBOX_SNIPPET).set_name("=arc:sandbox").call(())?;
        self.restore_baseline = Some(restore);
        if let Some(getinfo) = getinfo {
            lua.set_named_registry_value(GETINFO_REGISTRY_KEY, getinfo)?;
        }

        self.modules.bind(lua)?;

        let coroutine: Table = globals.get("coroutine")?;
        self.close_coroutine = Some(coroutine.get("close")?);

        let tostring: Function = globals.get("tostring")?;
        let session = self.id;
        let macro_name = self.macro_name.clone();
        let print = lua.create_function(move |_, args: MultiValue| {
            let parts = args
                .into_iter()
                .map(|value| tostring.call::<String>(value))
                .collect::<mlua::Result<Vec<_>>>()?;
            tracing::info!(
                target: SCRIPT_LOG_TARGET,
                session = %session,
                macro_name = %macro_name,
                "{}",
                parts.join("\t")
            );
            Ok(())
        })?;
        globals.raw_set("print", print)?;

        let store = Arc::clone(&self.macros);
        let get_macro_text =
            lua.create_function(move |_, name: String| Ok(store.macro_text(&name)))?;
        globals.raw_set(INTERNAL_MACRO_TEXT, get_macro_text.clone())?;

        let fstring: Function = lua
            .load(FSTRING_SNIPPET)
            .set_name("=arc:fstring")
            .call(getlocal)?;
        globals.raw_set("f", fstring)?;

        let paths = lua.create_sequence_from(self.require_paths.iter().cloned())?;
        lua.load(REQUIRE_SNIPPET)
            .set_name("=arc:require")
            .call::<()>((get_macro_text, paths.clone()))?;

        let wait: Function = lua
            .load(WAIT_SNIPPET)
            .set_name("=arc:wait")
            .call(self.default_wait_seconds)?;

        let require = lua.create_table()?;
        require.raw_set("paths", paths)?;
        let arc = lua.create_table()?;
        arc.raw_set("require", require)?;
        arc.raw_set("wait", wait)?;
        arc.raw_set("session", self.id.to_string())?;
        arc.raw_set("macro", self.macro_name.as_str())?;
        globals.raw_set("arc", arc)?;

        globals.raw_set(
            TRIGGER_DATA_GLOBAL,
            trigger_table(lua, self.context.trigger.as_ref())?,
        )?;

        Ok(())
    }

    /// Compile `script` inside the entry point and run it until it first
    /// suspends or ends
    pub fn start(&mut self, script: &str) -> Result<StepOutcome> {
        self.expect_state(SessionState::Bound, "Bound")?;

        let entry = self
            .lua
            .load(wrap_entrypoint(script))
            .set_name(format!("={}", self.macro_name))
            .call::<Function>(());
        let thread = match entry.and_then(|entry| self.lua.create_thread(entry)) {
            Ok(thread) => thread,
            Err(e) => return Ok(self.fail(e)),
        };

        self.thread = Some(thread);
        self.state = SessionState::Running;
        tracing::info!(session = %self.id, "Started macro {}", self.macro_name);
        Ok(self.step())
    }

    /// Continue a suspended user frame
    pub fn resume(&mut self) -> Result<StepOutcome> {
        self.expect_state(SessionState::Running, "Running")?;
        Ok(self.step())
    }

    fn step(&mut self) -> StepOutcome {
        let Some(thread) = self.thread.clone() else {
            return self.fail(mlua::Error::RuntimeError(
                "session has no user frame".into(),
            ));
        };

        match thread.resume::<MultiValue>(()) {
            Ok(values) if thread.status() == ThreadStatus::Resumable => {
                let wait_seconds = match values.into_iter().next() {
                    Some(Value::Integer(i)) => i as f64,
                    Some(Value::Number(n)) => n,
                    _ => self.default_wait_seconds,
                };
                tracing::trace!(session = %self.id, "Suspended for {}s", wait_seconds);
                StepOutcome::Suspended { wait_seconds }
            }
            Ok(_) => {
                self.state = SessionState::Completed;
                tracing::info!(session = %self.id, "Macro {} completed", self.macro_name);
                self.teardown();
                StepOutcome::Completed
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: mlua::Error) -> StepOutcome {
        let message = extract_error_details(&self.lua, self.thread.as_ref(), &error);
        tracing::error!(session = %self.id, "Macro {} failed: {}", self.macro_name, message);
        self.last_error = Some(message.clone());
        self.state = SessionState::Failed;
        self.teardown();
        StepOutcome::Failed(message)
    }

    /// Replace the session's event context and rebuild `TriggerData`
    ///
    /// Events delivered before binding are applied when the session binds.
    pub fn deliver_event(&mut self, event: TriggerEvent) -> Result<()> {
        if self.state.is_terminal() {
            return Err(MacroError::InvalidState {
                expected: "a live session",
                actual: self.state,
            });
        }

        tracing::trace!(session = %self.id, "Delivering {}", event.event_type);
        self.context.trigger = Some(event);

        if matches!(self.state, SessionState::Bound | SessionState::Running) {
            let table = trigger_table(&self.lua, self.context.trigger.as_ref())?;
            self.lua.globals().raw_set(TRIGGER_DATA_GLOBAL, table)?;
        }
        Ok(())
    }

    /// Cancel the session at its current suspension point
    ///
    /// Returns false when the session had already ended.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        tracing::info!(session = %self.id, "Cancelling macro {}", self.macro_name);
        self.state = SessionState::Cancelled;
        self.teardown();
        true
    }

    /// Hand the interpreter back for reuse, cancelling first if still live
    ///
    /// Globals and standard tables are put back as they were before
    /// [`bind`](Self::bind), undoing both the sandbox and anything the
    /// script changed.
    pub fn into_interpreter(mut self) -> Lua {
        self.cancel();
        if let Some(restore) = self.restore_baseline.take() {
            match restore.call::<()>(()) {
                Ok(()) => tracing::debug!(session = %self.id, "Interpreter restored to baseline"),
                Err(e) => tracing::warn!(session = %self.id, "Failed to restore baseline: {}", e),
            }
        }
        self.lua.expire_registry_values();
        std::mem::replace(&mut self.lua, Lua::new())
    }

    fn expect_state(&self, expected: SessionState, name: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(MacroError::InvalidState {
                expected: name,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let thread = self.thread.take();
        let close = self.close_coroutine.take();
        if let (Some(thread), Some(close)) = (thread, close) {
            if thread.status() == ThreadStatus::Resumable {
                if let Err(e) = close.call::<MultiValue>(thread) {
                    tracing::warn!(session = %self.id, "Failed to close user frame: {}", e);
                }
            }
        }

        if let Err(e) = self.modules.unbind(&self.lua) {
            tracing::warn!(session = %self.id, "Failed to unbind modules: {}", e);
        }

        let globals = self.lua.globals();
        for name in HELPER_GLOBALS {
            if let Err(e) = globals.raw_set(name, Value::Nil) {
                tracing::warn!(session = %self.id, "Failed to clear {}: {}", name, e);
            }
        }

        if let Err(e) = self.lua.unset_named_registry_value(GETINFO_REGISTRY_KEY) {
            tracing::warn!(session = %self.id, "Failed to release captured getinfo: {}", e);
        }

        self.lua.expire_registry_values();
        if let Err(e) = self.lua.gc_collect() {
            tracing::warn!(session = %self.id, "Garbage collection failed: {}", e);
        }

        tracing::debug!(session = %self.id, "Session torn down ({:?})", self.state);
    }
}

impl Drop for ScriptSession {
    fn drop(&mut self) {
        if !self.torn_down {
            tracing::debug!(session = %self.id, "Dropping live session {}", self.macro_name);
            self.teardown();
        }
    }
}

impl std::fmt::Debug for ScriptSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptSession")
            .field("id", &self.id)
            .field("macro_name", &self.macro_name)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::BridgeConfig;
    use crate::runtime::bridge::ScriptRuntimeBridge;
    use crate::runtime::events::TriggerEventType;
    use crate::runtime::macros::InMemoryMacroStore;

    fn bridge() -> ScriptRuntimeBridge {
        ScriptRuntimeBridge::new(
            Arc::new(ModuleRegistry::new()),
            Arc::new(InMemoryMacroStore::new()),
            &BridgeConfig::default(),
        )
    }

    #[test]
    fn test_start_requires_bind() {
        let mut session = bridge().create_session("m");
        let err = session.start("return 1").unwrap_err();
        assert!(matches!(
            err,
            MacroError::InvalidState {
                actual: SessionState::Created,
                ..
            }
        ));
    }

    #[test]
    fn test_wait_suspends_with_seconds() {
        let mut session = bridge().prepare_session("m").unwrap();
        let outcome = session.start("arc.wait(2.5)\narc.wait()").unwrap();
        assert_eq!(outcome, StepOutcome::Suspended { wait_seconds: 2.5 });
        assert_eq!(session.state(), SessionState::Running);

        let outcome = session.resume().unwrap();
        assert_eq!(outcome, StepOutcome::Suspended { wait_seconds: 0.0 });
        assert_eq!(session.resume().unwrap(), StepOutcome::Completed);
        assert!(session.is_torn_down());
        assert!(session.resume().is_err());
    }

    #[test]
    fn test_syntax_error_fails_session() {
        let mut session = bridge().prepare_session("bad").unwrap();
        match session.start("if then") {
            Ok(StepOutcome::Failed(message)) => assert!(!message.is_empty()),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.last_error().is_some());
    }

    #[test]
    fn test_event_before_bind_applied() {
        let mut session = bridge().create_session("m");
        session
            .deliver_event(TriggerEvent::new(
                TriggerEventType::OnChatMessage,
                7,
                serde_json::json!({ "message": "hi" }),
            ))
            .unwrap();
        session.bind().unwrap();

        let message: String = session
            .interpreter()
            .load("return TriggerData.message")
            .eval()
            .unwrap();
        assert_eq!(message, "hi");
    }

    #[test]
    fn test_event_rejected_after_end() {
        let mut session = bridge().prepare_session("m").unwrap();
        assert!(session.cancel());
        let result = session.deliver_event(TriggerEvent::now(
            TriggerEventType::OnUpdate,
            serde_json::Value::Null,
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_to_be_closed_runs_on_cancel() {
        let mut session = bridge().prepare_session("m").unwrap();
        let outcome = session
            .start(
                "local guard <close> = setmetatable({}, { __close = function() closed = true end })\n\
                 arc.wait(1)",
            )
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Suspended { .. }));

        assert!(session.cancel());
        let closed: bool = session.interpreter().globals().get("closed").unwrap();
        assert!(closed);
    }
}
