//! `<index.N>`: one-based selector for commands that act on a list

use crate::modifiers::parser::{
    find_valued_token, is_decimal_char, Extraction, ModifierError, ModifierKind, ModifierParser,
    ModifierValue,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct IndexParser;

impl ModifierParser for IndexParser {
    fn kind(&self) -> ModifierKind {
        ModifierKind::Index
    }

    fn try_parse(&self, text: &str) -> Result<Option<Extraction>, ModifierError> {
        let Some(token) = find_valued_token(text, self.kind().token_name(), is_decimal_char) else {
            return Ok(None);
        };

        let index: u32 = token
            .param
            .parse()
            .map_err(|_| token.malformed(text, self.kind(), "expected a whole number"))?;
        if index == 0 {
            return Err(token.malformed(text, self.kind(), "index is one-based"));
        }

        Ok(Some(token.extract(text, ModifierValue::Index { index })))
    }
}
