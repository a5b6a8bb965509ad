use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::AddressError, wire};

/// One step of an address into the engine's object graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(String),
    /// Element lookup; holds the key in its wire encoding.
    Elem(String),
    Insert,
    Erase,
    Size,
    Keys,
    List,
    Type,
    Signature,
}

impl Segment {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn elem(key: impl Into<Value>) -> Self {
        Self::Elem(wire::encode(&key.into()))
    }

    pub fn is_pseudo(&self) -> bool {
        !matches!(self, Self::Field(_))
    }

    fn pseudo_name(&self) -> Option<&'static str> {
        match self {
            Self::Field(_) => None,
            Self::Elem(_) => Some("elem"),
            Self::Insert => Some("insert"),
            Self::Erase => Some("erase"),
            Self::Size => Some("size"),
            Self::Keys => Some("keys"),
            Self::List => Some("list"),
            Self::Type => Some("type"),
            Self::Signature => Some("signature"),
        }
    }

    fn from_pseudo_name(name: &str) -> Option<Self> {
        Some(match name {
            "insert" => Self::Insert,
            "erase" => Self::Erase,
            "size" => Self::Size,
            "keys" => Self::Keys,
            "list" => Self::List,
            "type" => Self::Type,
            "signature" => Self::Signature,
            _ => return None,
        })
    }
}

/// Path to an object in the engine, e.g. `/minsky/model/items/@elem/0`.
///
/// Two addresses are equal exactly when their wire forms are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    segments: Vec<Segment>,
}

impl Address {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(AddressError::Empty);
        }

        let mut segments = Vec::with_capacity(tokens.len());
        let mut tokens = tokens.into_iter();
        while let Some(token) = tokens.next() {
            let Some(pseudo) = token.strip_prefix('@') else {
                segments.push(Segment::Field(token));
                continue;
            };
            if pseudo == "elem" {
                let key = tokens.next().ok_or(AddressError::MissingElemKey)?;
                segments.push(Segment::Elem(wire::encode(&parse_key(&key)?)));
                continue;
            }
            let segment = Segment::from_pseudo_name(pseudo)
                .ok_or_else(|| AddressError::UnknownPseudo(pseudo.to_string()))?;
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn join(&self, segment: Segment) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(segment);
        Self { segments }
    }

    pub fn field(&self, name: impl Into<String>) -> Self {
        self.join(Segment::field(name))
    }

    /// Name of the trailing field, if the address ends in one.
    pub fn last_field(&self) -> Option<&str> {
        match self.segments.last() {
            Some(Segment::Field(name)) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => write!(f, "/{name}")?,
                Segment::Elem(key) => write!(f, "/@elem/{key}")?,
                pseudo => {
                    if let Some(name) = pseudo.pseudo_name() {
                        write!(f, "/@{name}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A renderable engine surface such as the main canvas or a tab view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RenderTarget(Address);

impl RenderTarget {
    pub fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> &Address {
        &self.0
    }
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for RenderTarget {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value).map(Self)
    }
}

impl From<RenderTarget> for String {
    fn from(value: RenderTarget) -> Self {
        value.to_string()
    }
}

/// Splits a path expression on its delimiter, honouring quoted keys.
///
/// Expressions starting with `/` are slash-delimited; anything else uses the
/// dotted form (`minsky.canvas.item`).
fn tokenize(text: &str) -> Result<Vec<String>, AddressError> {
    let text = text.trim();
    let delimiter = if text.starts_with('/') { '/' } else { '.' };

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None if c == delimiter => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                current.push(c);
            }
        }
    }
    if quote.is_some() {
        return Err(AddressError::UnterminatedQuote);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_key(token: &str) -> Result<Value, AddressError> {
    match wire::decode(token) {
        Ok(value) => Ok(value),
        // bare keys such as `:K` are plain strings
        Err(_) if !token.starts_with(['"', '\'']) => Ok(Value::String(token.to_string())),
        Err(source) => Err(AddressError::InvalidKey {
            key: token.to_string(),
            source,
        }),
    }
}
