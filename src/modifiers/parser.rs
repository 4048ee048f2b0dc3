//! Modifier parser trait and the shared directive token scanner
//!
//! Every directive is written inline as `<name.param>` (or `<name>` for
//! flags). Parsers locate their own token with [`find_valued_token`] or
//! [`find_flag_token`], then validate and decode the parameter.

use nom::bytes::complete::{tag_no_case, take_while1};
use nom::character::complete::char;
use nom::combinator::recognize;
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The kind of an inline directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    Distance,
    Wait,
    MaxWait,
    Index,
    Echo,
    Unsafe,
}

impl ModifierKind {
    /// Directive name as written inside the token
    pub fn token_name(&self) -> &'static str {
        match self {
            ModifierKind::Distance => "distance",
            ModifierKind::Wait => "wait",
            ModifierKind::MaxWait => "maxwait",
            ModifierKind::Index => "index",
            ModifierKind::Echo => "echo",
            ModifierKind::Unsafe => "unsafe",
        }
    }
}

impl fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token_name())
    }
}

/// Decoded value of a directive
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModifierValue {
    /// Maximum targeting/interaction distance in host distance units
    Distance { distance: f32 },
    /// Seconds to wait after the command; `min == max` for a fixed wait
    Wait { min: f32, max: f32 },
    /// Upper bound in seconds for a command's condition wait
    MaxWait { seconds: f32 },
    /// One-based selector for list-like commands
    Index { index: u32 },
    /// Echo the command to the log when it runs
    Echo,
    /// Skip the host's safety checks for the command
    Unsafe,
}

impl ModifierValue {
    pub fn kind(&self) -> ModifierKind {
        match self {
            ModifierValue::Distance { .. } => ModifierKind::Distance,
            ModifierValue::Wait { .. } => ModifierKind::Wait,
            ModifierValue::MaxWait { .. } => ModifierKind::MaxWait,
            ModifierValue::Index { .. } => ModifierKind::Index,
            ModifierValue::Echo => ModifierKind::Echo,
            ModifierValue::Unsafe => ModifierKind::Unsafe,
        }
    }
}

/// A directive extracted from a command line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Modifier {
    /// The matched token, delimiters included, exactly as written
    pub raw: String,
    pub value: ModifierValue,
}

impl Modifier {
    pub fn kind(&self) -> ModifierKind {
        self.value.kind()
    }
}

/// Successful parse: the modifier plus the text with its token removed
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub modifier: Modifier,
    pub remaining: String,
}

/// Errors raised while extracting modifiers from a command line
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModifierError {
    /// The token matched but its embedded value failed validation
    #[error("Malformed value '{value}' in {kind} modifier '{raw}': {reason}")]
    MalformedValue {
        kind: ModifierKind,
        raw: String,
        value: String,
        reason: String,
    },

    /// The pass-count guard tripped
    #[error("Modifier preprocessing did not settle after {passes} passes: {text}")]
    NonTermination { text: String, passes: usize },
}

/// Recognizes and extracts one kind of inline directive
///
/// `Ok(None)` is a miss and leaves the caller's text untouched. On
/// `Ok(Some(_))` exactly the matched token is removed from the returned text.
pub trait ModifierParser: Send + Sync {
    fn kind(&self) -> ModifierKind;

    fn try_parse(&self, text: &str) -> Result<Option<Extraction>, ModifierError>;
}

/// Location of a token inside the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenMatch<'a> {
    pub start: usize,
    pub end: usize,
    /// Parameter region (empty for flag tokens)
    pub param: &'a str,
}

impl<'a> TokenMatch<'a> {
    /// The full token text, delimiters included
    pub fn raw<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start..self.end]
    }

    /// Build the extraction for this token
    pub fn extract(&self, text: &str, value: ModifierValue) -> Extraction {
        let mut remaining = String::with_capacity(text.len() - (self.end - self.start));
        remaining.push_str(&text[..self.start]);
        remaining.push_str(&text[self.end..]);

        Extraction {
            modifier: Modifier {
                raw: self.raw(text).to_string(),
                value,
            },
            remaining,
        }
    }

    /// Malformed-value error for this token
    pub fn malformed(&self, text: &str, kind: ModifierKind, reason: &str) -> ModifierError {
        ModifierError::MalformedValue {
            kind,
            raw: self.raw(text).to_string(),
            value: self.param.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn valued_token<'a>(
    input: &'a str,
    name: &str,
    is_param: fn(char) -> bool,
) -> IResult<&'a str, &'a str> {
    delimited(
        char('<'),
        preceded((tag_no_case(name), char('.')), take_while1(is_param)),
        char('>'),
    )
    .parse(input)
}

fn flag_token<'a>(input: &'a str, name: &str) -> IResult<&'a str, &'a str> {
    recognize((char('<'), tag_no_case(name), char('>'))).parse(input)
}

/// Find the leftmost `<name.param>` token whose parameter consists only of
/// characters accepted by `is_param`
pub fn find_valued_token<'a>(
    text: &'a str,
    name: &str,
    is_param: fn(char) -> bool,
) -> Option<TokenMatch<'a>> {
    text.match_indices('<').find_map(|(start, _)| {
        valued_token(&text[start..], name, is_param)
            .ok()
            .map(|(rest, param)| TokenMatch {
                start,
                end: text.len() - rest.len(),
                param,
            })
    })
}

/// Find the leftmost `<name>` flag token
pub fn find_flag_token<'a>(text: &'a str, name: &str) -> Option<TokenMatch<'a>> {
    text.match_indices('<').find_map(|(start, _)| {
        flag_token(&text[start..], name)
            .ok()
            .map(|(rest, _)| TokenMatch {
                start,
                end: text.len() - rest.len(),
                param: "",
            })
    })
}

/// Parameter characters for decimal-valued directives
pub fn is_decimal_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

/// Decode `\d+(\.\d+)?` as a finite non-negative `f32`
///
/// Uses `str::parse`, which never consults the process locale.
pub fn parse_decimal(value: &str) -> Result<f32, &'static str> {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value, None),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err("expected digits before the decimal point");
    }
    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err("expected digits after a single decimal point");
        }
    }

    let parsed: f32 = value.parse().map_err(|_| "not a number")?;
    if !parsed.is_finite() {
        return Err("value out of range");
    }
    Ok(parsed)
}
