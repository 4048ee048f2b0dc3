//! Access to stored macro bodies

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lookup of stored macros by name
pub trait MacroStore: Send + Sync {
    /// Body text of the named macro, without its metadata header
    fn macro_text(&self, name: &str) -> Option<String>;
}

/// Marks the end of an optional metadata header at the top of a macro
const METADATA_END: &str = "--[[end-metadata]]";

/// Strip a leading metadata block (`--[[metadata ... --[[end-metadata]]`)
pub fn content_without_metadata(content: &str) -> &str {
    if !content.trim_start().starts_with("--[[metadata") {
        return content;
    }
    match content.find(METADATA_END) {
        Some(end) => content[end + METADATA_END.len()..].trim_start_matches(['\r', '\n']),
        None => content,
    }
}

/// Thread-safe in-memory macro store
#[derive(Debug, Default)]
pub struct InMemoryMacroStore {
    macros: RwLock<HashMap<String, String>>,
}

impl InMemoryMacroStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a macro
    pub fn insert(&self, name: impl Into<String>, content: impl Into<String>) {
        self.write().insert(name.into(), content.into());
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Updates are single map operations; a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.macros.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Macro store lock poisoned, continuing");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.macros.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Macro store lock poisoned, continuing");
            poisoned.into_inner()
        })
    }
}

impl MacroStore for InMemoryMacroStore {
    fn macro_text(&self, name: &str) -> Option<String> {
        self.read()
            .get(name)
            .map(|content| content_without_metadata(content).to_string())
    }
}
