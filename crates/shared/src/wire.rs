//! Payload codec for the engine command protocol.
//!
//! The engine accepts and emits a superset of JSON: object keys may be bare
//! identifiers, strings may use single quotes, comments and trailing commas are
//! tolerated, and numbers may carry a sign, a hexadecimal prefix or a dangling
//! decimal point. Decoding is permissive; encoding always produces plain JSON,
//! which the engine reads back unchanged.

use serde_json::{Map, Number, Value};

use crate::error::WireError;

/// Encodes a single payload value.
pub fn encode(value: &Value) -> String {
    value.to_string()
}

/// Encodes a call's argument list: nothing for no arguments, the bare value for
/// one, and an array for several.
pub fn encode_args(args: &[Value]) -> String {
    match args {
        [] => String::new(),
        [single] => encode(single),
        many => encode(&Value::Array(many.to_vec())),
    }
}

/// Decodes an engine response or argument string.
///
/// Blank input decodes to `null`, matching engine methods that return nothing.
pub fn decode(input: &str) -> Result<Value, WireError> {
    let mut decoder = Decoder { src: input, x: 0 };
    decoder.skip_insignificant()?;
    if decoder.x >= input.len() {
        return Ok(Value::Null);
    }
    let value = decoder.read_any()?;
    decoder.skip_insignificant()?;
    if decoder.x < input.len() {
        return Err(WireError::TrailingCharacters { at: decoder.x });
    }
    Ok(value)
}

struct Decoder<'a> {
    src: &'a str,
    x: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.x..].chars().next()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.src.as_bytes().get(self.x).copied()
    }

    fn unexpected(&self) -> WireError {
        match self.peek() {
            Some(found) => WireError::Unexpected { at: self.x, found },
            None => WireError::UnexpectedEnd,
        }
    }

    fn skip_insignificant(&mut self) -> Result<(), WireError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() || c == '\u{feff}' => self.x += c.len_utf8(),
                Some('/') => match self.src.as_bytes().get(self.x + 1) {
                    Some(b'/') => {
                        self.x = self.src[self.x..]
                            .find('\n')
                            .map_or(self.src.len(), |offset| self.x + offset + 1);
                    }
                    Some(b'*') => {
                        let body = self.x + 2;
                        let Some(offset) = self.src[body..].find("*/") else {
                            return Err(WireError::UnexpectedEnd);
                        };
                        self.x = body + offset + 2;
                    }
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    fn read_any(&mut self) -> Result<Value, WireError> {
        self.skip_insignificant()?;
        match self.peek() {
            None => Err(WireError::UnexpectedEnd),
            Some('{') => self.read_obj(),
            Some('[') => self.read_arr(),
            Some(quote @ ('"' | '\'')) => self.read_str(quote).map(Value::String),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.read_num(),
            Some(c) if is_ident_start(c) => {
                let at = self.x;
                match self.read_ident() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    // not representable in a JSON value
                    "Infinity" | "NaN" => Ok(Value::Null),
                    _ => {
                        self.x = at;
                        Err(self.unexpected())
                    }
                }
            }
            Some(_) => Err(self.unexpected()),
        }
    }

    fn read_ident(&mut self) -> &'a str {
        let start = self.x;
        while let Some(c) = self.peek() {
            if !is_ident_continue(c) {
                break;
            }
            self.x += c.len_utf8();
        }
        &self.src[start..self.x]
    }

    fn read_obj(&mut self) -> Result<Value, WireError> {
        self.x += 1;
        let mut obj = Map::new();
        loop {
            self.skip_insignificant()?;
            let key = match self.peek() {
                None => return Err(WireError::UnexpectedEnd),
                Some('}') => {
                    self.x += 1;
                    return Ok(Value::Object(obj));
                }
                Some(quote @ ('"' | '\'')) => self.read_str(quote)?,
                Some(c) if is_ident_start(c) => self.read_ident().to_string(),
                Some(_) => return Err(self.unexpected()),
            };
            self.skip_insignificant()?;
            if self.peek_byte() != Some(b':') {
                return Err(self.unexpected());
            }
            self.x += 1;
            let value = self.read_any()?;
            obj.insert(key, value);
            self.skip_insignificant()?;
            match self.peek_byte() {
                Some(b',') => self.x += 1,
                Some(b'}') => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn read_arr(&mut self) -> Result<Value, WireError> {
        self.x += 1;
        let mut arr = Vec::new();
        loop {
            self.skip_insignificant()?;
            if self.peek_byte() == Some(b']') {
                self.x += 1;
                return Ok(Value::Array(arr));
            }
            arr.push(self.read_any()?);
            self.skip_insignificant()?;
            match self.peek_byte() {
                Some(b',') => self.x += 1,
                Some(b']') => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn read_str(&mut self, quote: char) -> Result<String, WireError> {
        self.x += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(WireError::UnexpectedEnd);
            };
            if c == quote {
                self.x += 1;
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                self.x += c.len_utf8();
                continue;
            }
            let at = self.x;
            self.x += 1;
            let Some(escaped) = self.peek() else {
                return Err(WireError::UnexpectedEnd);
            };
            self.x += escaped.len_utf8();
            match escaped {
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                '\r' => {
                    // line continuation over CRLF
                    if self.peek_byte() == Some(b'\n') {
                        self.x += 1;
                    }
                }
                't' => out.push('\t'),
                'v' => out.push('\u{b}'),
                '0' if !self.peek().is_some_and(|c| c.is_ascii_digit()) => out.push('\0'),
                'x' => out.push(self.read_hex_char(2, at)?),
                'u' => out.push(self.read_unicode_escape(at)?),
                '\n' | '\u{2028}' | '\u{2029}' => {}
                c if c.is_ascii_digit() => return Err(WireError::InvalidEscape { at }),
                other => out.push(other),
            }
        }
    }

    fn read_hex_units(&mut self, digits: usize, at: usize) -> Result<u32, WireError> {
        let end = self.x + digits;
        let text = self
            .src
            .get(self.x..end)
            .ok_or(WireError::InvalidEscape { at })?;
        let unit = u32::from_str_radix(text, 16).map_err(|_| WireError::InvalidEscape { at })?;
        self.x = end;
        Ok(unit)
    }

    fn read_hex_char(&mut self, digits: usize, at: usize) -> Result<char, WireError> {
        let unit = self.read_hex_units(digits, at)?;
        char::from_u32(unit).ok_or(WireError::InvalidEscape { at })
    }

    fn read_unicode_escape(&mut self, at: usize) -> Result<char, WireError> {
        let high = self.read_hex_units(4, at)?;
        if !(0xD800..0xDC00).contains(&high) {
            return char::from_u32(high).ok_or(WireError::InvalidEscape { at });
        }
        if !self.src[self.x..].starts_with("\\u") {
            return Err(WireError::InvalidEscape { at });
        }
        self.x += 2;
        let low = self.read_hex_units(4, at)?;
        if !(0xDC00..0xE000).contains(&low) {
            return Err(WireError::InvalidEscape { at });
        }
        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        char::from_u32(code).ok_or(WireError::InvalidEscape { at })
    }

    fn read_num(&mut self) -> Result<Value, WireError> {
        let start = self.x;
        let bytes = self.src.as_bytes();
        let mut x = self.x;
        let negative = match bytes.get(x) {
            Some(b'-') => {
                x += 1;
                true
            }
            Some(b'+') => {
                x += 1;
                false
            }
            _ => false,
        };

        let rest = &self.src[x..];
        if rest.starts_with("Infinity") || rest.starts_with("NaN") {
            self.x = x + if rest.starts_with('I') { 8 } else { 3 };
            return Ok(Value::Null);
        }

        if rest.starts_with("0x") || rest.starts_with("0X") {
            let digits_start = x + 2;
            let mut end = digits_start;
            while end < bytes.len() && bytes[end].is_ascii_hexdigit() {
                end += 1;
            }
            let magnitude = i64::from_str_radix(&self.src[digits_start..end], 16).map_err(|_| {
                WireError::InvalidNumber {
                    at: start,
                    text: self.src[start..end].to_string(),
                }
            })?;
            self.x = end;
            let value = if negative { -magnitude } else { magnitude };
            return Ok(Value::Number(value.into()));
        }

        let mut digits = 0;
        while x < bytes.len() && bytes[x].is_ascii_digit() {
            x += 1;
            digits += 1;
        }
        let mut is_float = false;
        if bytes.get(x) == Some(&b'.') {
            is_float = true;
            x += 1;
            while x < bytes.len() && bytes[x].is_ascii_digit() {
                x += 1;
                digits += 1;
            }
        }
        if digits > 0 && matches!(bytes.get(x), Some(b'e' | b'E')) {
            is_float = true;
            x += 1;
            if matches!(bytes.get(x), Some(b'+' | b'-')) {
                x += 1;
            }
            let exponent_start = x;
            while x < bytes.len() && bytes[x].is_ascii_digit() {
                x += 1;
            }
            if x == exponent_start {
                digits = 0;
            }
        }

        let text = &self.src[start..x];
        let invalid = || WireError::InvalidNumber {
            at: start,
            text: text.to_string(),
        };
        if digits == 0 {
            return Err(invalid());
        }
        self.x = x;

        let unsigned = text.trim_start_matches('+');
        if !is_float {
            if let Ok(n) = unsigned.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
            if let Ok(n) = unsigned.parse::<u64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        let n = unsigned.parse::<f64>().map_err(|_| invalid())?;
        Ok(Number::from_f64(n).map_or(Value::Null, Value::Number))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_argument_lists_by_arity() {
        assert_eq!(encode_args(&[]), "");
        assert_eq!(encode_args(&[json!(3)]), "3");
        assert_eq!(encode_args(&[json!("a")]), "\"a\"");
        assert_eq!(encode_args(&[json!(1), json!(2.5)]), "[1,2.5]");
        assert_eq!(encode_args(&[json!([1, 2])]), "[[1,2]]");
    }

    #[test]
    fn decodes_plain_json() {
        assert_eq!(
            decode(r#"{"a":[1,2,{"b":null}],"c":"x"}"#).expect("decode"),
            json!({"a": [1, 2, {"b": null}], "c": "x"})
        );
    }

    #[test]
    fn tolerates_unquoted_keys_single_quotes_and_trailing_commas() {
        assert_eq!(
            decode("{ name: 'stock', $ref: 1, list: [1, 2,], }").expect("decode"),
            json!({"name": "stock", "$ref": 1, "list": [1, 2]})
        );
    }

    #[test]
    fn skips_comments() {
        let text = "// leading\n[1, /* inline */ 2]\n// trailing";
        assert_eq!(decode(text).expect("decode"), json!([1, 2]));
    }

    #[test]
    fn reads_extended_numbers() {
        assert_eq!(decode("0x1F").expect("hex"), json!(31));
        assert_eq!(decode("-0x10").expect("negative hex"), json!(-16));
        assert_eq!(decode("+5").expect("plus"), json!(5));
        assert_eq!(decode(".5").expect("leading dot"), json!(0.5));
        assert_eq!(decode("2.").expect("trailing dot"), json!(2.0));
        assert_eq!(decode("1e3").expect("exponent"), json!(1000.0));
        assert_eq!(decode("18446744073709551615").expect("u64"), json!(u64::MAX));
        assert_eq!(decode("Infinity").expect("inf"), Value::Null);
        assert_eq!(decode("-Infinity").expect("-inf"), Value::Null);
        assert_eq!(decode("NaN").expect("nan"), Value::Null);
    }

    #[test]
    fn reads_string_escapes() {
        assert_eq!(
            decode(r#""tab\thereé\x41\'""#).expect("escapes"),
            json!("tab\there\u{e9}A'")
        );
        assert_eq!(decode(r#""\uD83D\uDE00""#).expect("surrogates"), json!("\u{1F600}"));
        assert_eq!(decode("'line\\\ncontinued'").expect("continuation"), json!("linecontinued"));
    }

    #[test]
    fn blank_input_is_null() {
        assert_eq!(decode("").expect("empty"), Value::Null);
        assert_eq!(decode("  \n").expect("blank"), Value::Null);
    }

    #[test]
    fn reports_malformed_input() {
        assert_eq!(decode("[1, 2"), Err(WireError::UnexpectedEnd));
        assert_eq!(
            decode("{a 1}"),
            Err(WireError::Unexpected { at: 3, found: '1' })
        );
        assert_eq!(decode("1 2"), Err(WireError::TrailingCharacters { at: 2 }));
        assert!(matches!(decode("-"), Err(WireError::InvalidNumber { .. })));
        assert!(matches!(decode("bogus"), Err(WireError::Unexpected { at: 0, .. })));
        assert!(matches!(decode(r#""\1""#), Err(WireError::InvalidEscape { .. })));
    }

    #[test]
    fn canonical_encodings_survive_a_decode() {
        let samples = [
            "null",
            "true",
            "-12",
            "0.25",
            "\"quote \\\" and \\\\ slash\"",
            "[1,\"two\",[false,null]]",
            "{\"zeta\":1,\"alpha\":{\"inner\":[1.5,\"x\"]},\"mid\":true}",
        ];
        for sample in samples {
            let value = decode(sample).expect("decode sample");
            assert_eq!(encode(&value), sample);
        }
    }
}
