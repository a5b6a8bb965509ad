use thiserror::Error;

/// Failure to decode a payload in the engine's JSON-superset grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character '{found}' at offset {at}")]
    Unexpected { at: usize, found: char },
    #[error("invalid number '{text}' at offset {at}")]
    InvalidNumber { at: usize, text: String },
    #[error("invalid escape sequence at offset {at}")]
    InvalidEscape { at: usize },
    #[error("trailing characters at offset {at}")]
    TrailingCharacters { at: usize },
}

/// Failure to parse a textual path expression into an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty path expression")]
    Empty,
    #[error("unknown pseudo-operation '@{0}'")]
    UnknownPseudo(String),
    #[error("'@elem' must be followed by a key")]
    MissingElemKey,
    #[error("unterminated quote in path expression")]
    UnterminatedQuote,
    #[error("invalid element key '{key}': {source}")]
    InvalidKey { key: String, source: WireError },
}
