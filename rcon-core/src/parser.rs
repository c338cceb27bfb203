//! Typed response parsing hooks.
//!
//! The client never interprets response bodies itself. A caller that
//! wants a typed value supplies a [`ResponseParser`], either directly or
//! by implementing [`Parseable`] for the target type so the parser can
//! be looked up from the type alone.

use crate::error::{RconError, Result};

/// Recognizes and converts one response shape.
pub trait ResponseParser {
    type Output;

    /// Whether `body` has the shape this parser understands.
    fn is_match(&self, body: &str) -> bool;

    /// Convert a body that passed [`ResponseParser::is_match`].
    fn parse(&self, body: &str) -> Result<Self::Output>;

    /// Name used in error messages.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self::Output>()
    }
}

/// Types with a registered parser for their response shape.
pub trait Parseable: Sized {
    type Parser: ResponseParser<Output = Self> + Default;
}

/// Run `parser` over `body`: check the shape, then convert.
pub fn parse_with<P: ResponseParser + ?Sized>(parser: &P, body: String) -> Result<P::Output> {
    if !parser.is_match(&body) {
        return Err(RconError::UnexpectedResponse {
            parser: parser.name(),
            body,
        });
    }
    parser.parse(&body)
}
