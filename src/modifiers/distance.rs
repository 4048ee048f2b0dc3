//! `<distance.N>`: maximum distance for targeting and interaction
//!
//! `/target "Training Dummy" <distance.3>` restricts targeting to 3 distance
//! units. N is a non-negative integer or a number with one decimal point.

use crate::modifiers::parser::{
    find_valued_token, is_decimal_char, parse_decimal, Extraction, ModifierError, ModifierKind,
    ModifierParser, ModifierValue,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct DistanceParser;

impl ModifierParser for DistanceParser {
    fn kind(&self) -> ModifierKind {
        ModifierKind::Distance
    }

    fn try_parse(&self, text: &str) -> Result<Option<Extraction>, ModifierError> {
        let Some(token) = find_valued_token(text, self.kind().token_name(), is_decimal_char)
        else {
            return Ok(None);
        };

        let distance =
            parse_decimal(token.param).map_err(|reason| token.malformed(text, self.kind(), reason))?;

        Ok(Some(token.extract(text, ModifierValue::Distance { distance })))
    }
}
