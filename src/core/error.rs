use thiserror::Error;

use crate::modifiers::ModifierError;
use crate::runtime::session::SessionState;

#[derive(Error, Debug)]
pub enum MacroError {
    #[error("Module registration conflict for '{name}': {reason}")]
    ModuleConflict { name: String, reason: String },

    #[error("Invalid session state: expected {expected}, found {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: SessionState,
    },

    #[error("Script error: {0}")]
    Script(#[from] mlua::Error),

    #[error("Modifier error: {0}")]
    Modifier(#[from] ModifierError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, MacroError>;
