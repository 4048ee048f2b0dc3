//! Entry point for hosts: creates isolated script sessions

use mlua::{Lua, LuaOptions, StdLib};
use std::sync::Arc;

use crate::capabilities::registry::ModuleRegistry;
use crate::core::config::BridgeConfig;
use crate::core::error::Result;
use crate::modifiers::{MacroPreprocessor, ModifierRegistry, PreprocessedLine};
use crate::runtime::macros::MacroStore;
use crate::runtime::session::ScriptSession;

/// Shared, read-only state every session is created from
pub struct ScriptRuntimeBridge {
    modules: Arc<ModuleRegistry>,
    macros: Arc<dyn MacroStore>,
    require_paths: Arc<[String]>,
    default_wait_seconds: f64,
    preprocessor: MacroPreprocessor,
}

impl ScriptRuntimeBridge {
    /// Build a bridge; require paths are validated here, once
    pub fn new(
        modules: Arc<ModuleRegistry>,
        macros: Arc<dyn MacroStore>,
        config: &BridgeConfig,
    ) -> Self {
        let require_paths: Arc<[String]> = config.validated_require_paths().into();
        let preprocessor = MacroPreprocessor::new(Arc::new(ModifierRegistry::standard()))
            .with_max_passes_per_parser(config.max_passes_per_parser);

        tracing::info!(
            "Script bridge ready: {} module(s), {} require path(s)",
            modules.len(),
            require_paths.len()
        );

        Self {
            modules,
            macros,
            require_paths,
            default_wait_seconds: config.default_wait_seconds,
            preprocessor,
        }
    }

    /// New session on a fresh interpreter
    pub fn create_session(&self, macro_name: &str) -> ScriptSession {
        self.recycle_session(macro_name, new_interpreter())
    }

    /// New session on an interpreter handed back by
    /// [`ScriptSession::into_interpreter`]
    pub fn recycle_session(&self, macro_name: &str, lua: Lua) -> ScriptSession {
        let session = ScriptSession::new(
            macro_name,
            lua,
            Arc::clone(&self.modules),
            Arc::clone(&self.macros),
            Arc::clone(&self.require_paths),
            self.default_wait_seconds,
        );
        tracing::debug!(session = %session.id(), "Created session for {}", macro_name);
        session
    }

    /// Create and bind in one step
    pub fn prepare_session(&self, macro_name: &str) -> Result<ScriptSession> {
        let mut session = self.create_session(macro_name);
        session.bind()?;
        Ok(session)
    }

    /// Strip directives from one command line using the configured limits
    pub fn preprocess_line(&self, line: &str) -> Result<PreprocessedLine> {
        Ok(self.preprocessor.preprocess(line)?)
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn macros(&self) -> &dyn MacroStore {
        self.macros.as_ref()
    }

    /// Require paths that passed validation
    pub fn require_paths(&self) -> &[String] {
        &self.require_paths
    }
}

fn new_interpreter() -> Lua {
    // SAFETY: `ScriptSession::bind` runs the sandbox before any other chunk.
    // It keeps `getinfo` and `getlocal` for the host, then removes `debug`
    // from the globals and `package.loaded`, drops `package.loadlib` and the C
    // searchers and restricts `load`, `loadfile` and `dofile` to text chunks.
    // No user chunk is compiled before that, and the baseline restore only
    // reinstates `debug` after the user frame is closed.
    unsafe { Lua::unsafe_new_with(StdLib::ALL_SAFE | StdLib::DEBUG, LuaOptions::new()) }
}
