//! Value-less directives: `<echo>` and `<unsafe>`

use crate::modifiers::parser::{
    find_flag_token, Extraction, ModifierError, ModifierKind, ModifierParser, ModifierValue,
};

/// Parser for a directive that carries no parameter
#[derive(Debug, Clone, Copy)]
pub struct FlagParser {
    kind: ModifierKind,
    value: fn() -> ModifierValue,
}

impl FlagParser {
    pub fn echo() -> Self {
        Self {
            kind: ModifierKind::Echo,
            value: || ModifierValue::Echo,
        }
    }

    pub fn unsafe_flag() -> Self {
        Self {
            kind: ModifierKind::Unsafe,
            value: || ModifierValue::Unsafe,
        }
    }
}

impl ModifierParser for FlagParser {
    fn kind(&self) -> ModifierKind {
        self.kind
    }

    fn try_parse(&self, text: &str) -> Result<Option<Extraction>, ModifierError> {
        Ok(find_flag_token(text, self.kind.token_name())
            .map(|token| token.extract(text, (self.value)())))
    }
}
