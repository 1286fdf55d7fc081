//! Recoverable errors raised while reading expression text.

use thiserror::Error;

/// Failure to turn surface syntax into an [`Expression`](crate::expression::Expression).
///
/// These are ordinary results: a live metric editor shows the message and keeps the last
/// valid expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Unexpected character '{0}'")]
    UnexpectedCharacter(char),

    #[error("Invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("Unexpected token {0}")]
    UnexpectedToken(String),

    #[error("Unexpected end of input, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("Unknown variable: {name} (allowed: {allowed})")]
    UnknownVariable { name: String, allowed: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("'^' needs a numeric literal on one side, got '{base}' ^ '{exponent}'")]
    NonLiteralPower { base: String, exponent: String },

    #[error("Logarithm base must be a numeric literal, got '{0}'")]
    NonLiteralLogBase(String),

    #[error("Unexpected trailing input starting at {0}")]
    TrailingInput(String),
}
