//! Inline command modifiers
//!
//! A macro command line may carry directives such as `<distance.3>` or
//! `<wait.2>`. They adjust how the command runs without touching dispatch:
//! the preprocessor removes them and hands the dispatcher the cleaned text
//! plus the decoded values.

pub mod distance;
pub mod flags;
pub mod index;
pub mod parser;
pub mod preprocessor;
pub mod registry;
pub mod wait;

pub use parser::{Extraction, Modifier, ModifierError, ModifierKind, ModifierParser, ModifierValue};
pub use preprocessor::{MacroPreprocessor, PreprocessedLine};
pub use registry::ModifierRegistry;
