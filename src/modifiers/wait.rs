//! Timing directives: `<wait.N>`, `<wait.MIN-MAX>` and `<maxwait.N>`

use crate::modifiers::parser::{
    find_valued_token, is_decimal_char, parse_decimal, Extraction, ModifierError, ModifierKind,
    ModifierParser, ModifierValue,
};

fn is_range_char(c: char) -> bool {
    is_decimal_char(c) || c == '-'
}

/// Seconds to wait after the command; a range waits a random duration
/// chosen by the dispatcher
#[derive(Debug, Default, Clone, Copy)]
pub struct WaitParser;

impl ModifierParser for WaitParser {
    fn kind(&self) -> ModifierKind {
        ModifierKind::Wait
    }

    fn try_parse(&self, text: &str) -> Result<Option<Extraction>, ModifierError> {
        let Some(token) = find_valued_token(text, self.kind().token_name(), is_range_char) else {
            return Ok(None);
        };
        let malformed = |reason| token.malformed(text, self.kind(), reason);

        let (min, max) = match token.param.split_once('-') {
            Some((low, high)) => {
                let min = parse_decimal(low).map_err(malformed)?;
                let max = parse_decimal(high).map_err(malformed)?;
                if min > max {
                    return Err(malformed("range minimum exceeds maximum"));
                }
                (min, max)
            }
            None => {
                let seconds = parse_decimal(token.param).map_err(malformed)?;
                (seconds, seconds)
            }
        };

        Ok(Some(token.extract(text, ModifierValue::Wait { min, max })))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MaxWaitParser;

impl ModifierParser for MaxWaitParser {
    fn kind(&self) -> ModifierKind {
        ModifierKind::MaxWait
    }

    fn try_parse(&self, text: &str) -> Result<Option<Extraction>, ModifierError> {
        let Some(token) = find_valued_token(text, self.kind().token_name(), is_decimal_char)
        else {
            return Ok(None);
        };

        let seconds =
            parse_decimal(token.param).map_err(|reason| token.malformed(text, self.kind(), reason))?;

        Ok(Some(token.extract(text, ModifierValue::MaxWait { seconds })))
    }
}
