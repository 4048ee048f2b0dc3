//! Strip inline directives from a command line before dispatch
//!
//! raw line -> MacroPreprocessor -> PreprocessedLine { text, modifiers } -> dispatcher

use serde::Serialize;
use std::sync::Arc;

use crate::modifiers::parser::{Modifier, ModifierError};
use crate::modifiers::registry::ModifierRegistry;

/// Passes allowed per registered parser before giving up on a line
pub const DEFAULT_MAX_PASSES_PER_PARSER: usize = 16;

/// A command line with every recognized directive removed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreprocessedLine {
    pub text: String,
    /// Extracted directives in discovery order
    pub modifiers: Vec<Modifier>,
}

/// Applies a [`ModifierRegistry`] to command lines until they are stable
#[derive(Debug, Clone)]
pub struct MacroPreprocessor {
    registry: Arc<ModifierRegistry>,
    max_passes_per_parser: usize,
}

impl MacroPreprocessor {
    pub fn new(registry: Arc<ModifierRegistry>) -> Self {
        Self {
            registry,
            max_passes_per_parser: DEFAULT_MAX_PASSES_PER_PARSER,
        }
    }

    /// Preprocessor over the built-in directive kinds
    pub fn standard() -> Self {
        Self::new(Arc::new(ModifierRegistry::standard()))
    }

    pub fn with_max_passes_per_parser(mut self, passes: usize) -> Self {
        self.max_passes_per_parser = passes.max(1);
        self
    }

    pub fn registry(&self) -> &ModifierRegistry {
        &self.registry
    }

    /// Extract every directive from `line`
    ///
    /// Each pass offers the text to every parser in registration order and
    /// takes at most one token per parser. Passes repeat until one finds
    /// nothing, so a line with several tokens of one kind yields them
    /// leftmost first, interleaved with other kinds by registration order.
    pub fn preprocess(&self, line: &str) -> Result<PreprocessedLine, ModifierError> {
        let max_passes = self.max_passes_per_parser * self.registry.len().max(1);
        let mut text = line.to_string();
        let mut modifiers = Vec::new();

        for _ in 0..max_passes {
            let mut matched = false;

            for parser in self.registry.parsers() {
                if let Some(extraction) = parser.try_parse(&text)? {
                    tracing::trace!(
                        "Extracted {} modifier {:?}",
                        parser.kind(),
                        extraction.modifier.raw
                    );
                    text = extraction.remaining;
                    modifiers.push(extraction.modifier);
                    matched = true;
                }
            }

            if !matched {
                return Ok(PreprocessedLine { text, modifiers });
            }
        }

        tracing::warn!("Modifier preprocessing exceeded {} passes: {:?}", max_passes, line);
        Err(ModifierError::NonTermination {
            text: line.to_string(),
            passes: max_passes,
        })
    }
}
