//! Ordered set of modifier parsers

use crate::modifiers::distance::DistanceParser;
use crate::modifiers::flags::FlagParser;
use crate::modifiers::index::IndexParser;
use crate::modifiers::parser::{ModifierKind, ModifierParser};
use crate::modifiers::wait::{MaxWaitParser, WaitParser};

/// Registry of modifier parsers, consulted in registration order
///
/// Registration order is the precedence rule: when one command line carries
/// directives of several kinds, the preprocessor reports them grouped by the
/// order their parsers were registered, not by their position in the text.
#[derive(Default)]
pub struct ModifierRegistry {
    parsers: Vec<Box<dyn ModifierParser>>,
}

impl ModifierRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in directive kind
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(DistanceParser);
        registry.register(WaitParser);
        registry.register(MaxWaitParser);
        registry.register(IndexParser);
        registry.register(FlagParser::echo());
        registry.register(FlagParser::unsafe_flag());
        registry
    }

    /// Append a parser; it runs after every parser registered before it
    pub fn register<P: ModifierParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    pub fn parsers(&self) -> impl Iterator<Item = &dyn ModifierParser> {
        self.parsers.iter().map(|p| p.as_ref())
    }

    pub fn kinds(&self) -> Vec<ModifierKind> {
        self.parsers.iter().map(|p| p.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl std::fmt::Debug for ModifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModifierRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
