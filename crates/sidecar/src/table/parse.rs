use super::{Key, Table, Value};
use crate::error::{ErrorKind, Result};

/// Decode a table literal.
///
/// Everything before the first `{` (comments, `return`) is skipped, as is
/// anything after the closing brace.
pub fn parse(input: &str) -> Result<Table> {
    let Some(start) = input.find('{') else {
        exn::bail!(ErrorKind::Syntax { offset: input.len(), reason: "no table literal" });
    };
    let mut parser = Parser { input, pos: start };
    parser.table()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}
impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            return true;
        }
        false
    }

    fn expect(&mut self, c: char, reason: &'static str) -> Result<()> {
        match self.eat(c) {
            true => Ok(()),
            false => exn::bail!(self.error(reason)),
        }
    }

    fn error(&self, reason: &'static str) -> ErrorKind {
        ErrorKind::Syntax { offset: self.pos, reason }
    }

    /// Whitespace and comments, including `--[[ long ]]` ones.
    fn skip_trivia(&mut self) {
        loop {
            let trimmed = self.rest().trim_start();
            self.pos = self.input.len() - trimmed.len();
            if !trimmed.starts_with("--") {
                return;
            }
            self.pos += 2;
            if let Some(level) = self.long_bracket_level() {
                let close = format!("]{}]", "=".repeat(level));
                self.pos = match self.rest().find(&close) {
                    Some(end) => self.pos + end + close.len(),
                    None => self.input.len(),
                };
            } else {
                self.pos = match self.rest().find('\n') {
                    Some(end) => self.pos + end + 1,
                    None => self.input.len(),
                };
            }
        }
    }

    /// If a long bracket (`[[`, `[==[`) starts here, consume it and return its level.
    fn long_bracket_level(&mut self) -> Option<usize> {
        let rest = self.rest().strip_prefix('[')?;
        let level = rest.chars().take_while(|c| *c == '=').count();
        if rest[level..].starts_with('[') {
            self.pos += level + 2;
            return Some(level);
        }
        None
    }

    fn table(&mut self) -> Result<Table> {
        self.expect('{', "expected `{`")?;
        let mut table = Table::new();
        let mut next_index = 1;
        loop {
            self.skip_trivia();
            if self.eat('}') {
                return Ok(table);
            }
            let (key, value) = self.field(&mut next_index)?;
            if let Some(value) = value {
                table.insert(key, value);
            }
            self.skip_trivia();
            if self.eat(',') || self.eat(';') {
                continue;
            }
            self.expect('}', "expected `,` or `}`")?;
            return Ok(table);
        }
    }

    fn field(&mut self, next_index: &mut i64) -> Result<(Key, Option<Value>)> {
        if self.peek() == Some('[') && !self.rest().starts_with("[[") && !self.rest().starts_with("[=") {
            self.bump();
            self.skip_trivia();
            let key = match self.value()? {
                Some(Value::Str(name)) => Key::Name(name),
                Some(value) => match value.as_i64() {
                    Some(index) => Key::Index(index),
                    None => exn::bail!(self.error("unsupported key type")),
                },
                None => exn::bail!(self.error("nil key")),
            };
            self.skip_trivia();
            self.expect(']', "expected `]`")?;
            self.skip_trivia();
            self.expect('=', "expected `=`")?;
            self.skip_trivia();
            return Ok((key, self.value()?));
        }
        let checkpoint = self.pos;
        if let Some(name) = self.identifier() {
            self.skip_trivia();
            if self.peek() == Some('=') && !self.rest().starts_with("==") {
                self.bump();
                self.skip_trivia();
                return Ok((Key::Name(name.to_string()), self.value()?));
            }
            self.pos = checkpoint;
        }
        let key = Key::Index(*next_index);
        *next_index += 1;
        Ok((key, self.value()?))
    }

    fn identifier(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        if !rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            return None;
        }
        let len = rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(rest.len());
        let start = self.pos;
        self.pos += len;
        let input: &'a str = self.input;
        Some(&input[start..self.pos])
    }

    /// `None` is `nil`.
    fn value(&mut self) -> Result<Option<Value>> {
        match self.peek() {
            Some('{') => Ok(Some(Value::Table(self.table()?))),
            Some('"' | '\'') => Ok(Some(Value::Str(self.quoted()?))),
            Some('[') => match self.long_bracket_level() {
                Some(level) => Ok(Some(Value::Str(self.long_string(level)?))),
                None => exn::bail!(self.error("unexpected `[`")),
            },
            Some(c) if c.is_ascii_digit() || c == '-' || c == '.' => Ok(Some(self.number()?)),
            Some(_) => match self.identifier() {
                Some("true") => Ok(Some(Value::Bool(true))),
                Some("false") => Ok(Some(Value::Bool(false))),
                Some("nil") => Ok(None),
                _ => exn::bail!(self.error("unexpected token")),
            },
            None => exn::bail!(self.error("unexpected end of input")),
        }
    }

    fn long_string(&mut self, level: usize) -> Result<String> {
        let close = format!("]{}]", "=".repeat(level));
        let Some(end) = self.rest().find(&close) else {
            exn::bail!(self.error("unterminated long string"));
        };
        let body = &self.rest()[..end];
        // A newline directly after the opening bracket is not part of the string.
        let body = body.strip_prefix("\r\n").or_else(|| body.strip_prefix('\n')).unwrap_or(body).to_string();
        self.pos += end + close.len();
        Ok(body)
    }

    fn quoted(&mut self) -> Result<String> {
        let Some(quote) = self.bump() else {
            exn::bail!(self.error("expected string"));
        };
        // Decimal escapes address raw bytes, so build bytes and validate at the end.
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            let Some(c) = self.bump() else {
                exn::bail!(self.error("unterminated string"));
            };
            match c {
                c if c == quote => break,
                '\n' => exn::bail!(self.error("unescaped newline in string")),
                '\\' => self.escape(&mut bytes)?,
                c => bytes.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
            }
        }
        String::from_utf8(bytes).map_err(|_| exn::Exn::from(self.error("string is not valid UTF-8")))
    }

    fn escape(&mut self, bytes: &mut Vec<u8>) -> Result<()> {
        let Some(c) = self.bump() else {
            exn::bail!(self.error("unterminated escape"));
        };
        match c {
            'n' | '\n' => bytes.push(b'\n'),
            '\r' => {
                self.eat('\n');
                bytes.push(b'\n');
            },
            'r' => bytes.push(b'\r'),
            't' => bytes.push(b'\t'),
            'a' => bytes.push(0x07),
            'b' => bytes.push(0x08),
            'f' => bytes.push(0x0c),
            'v' => bytes.push(0x0b),
            '\\' | '"' | '\'' => bytes.push(c as u8),
            'z' => {
                let trimmed = self.rest().trim_start();
                self.pos = self.input.len() - trimmed.len();
            },
            'x' => {
                let hex = self.rest().get(..2).ok_or_else(|| exn::Exn::from(self.error("short hex escape")))?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| exn::Exn::from(self.error("bad hex escape")))?;
                self.pos += 2;
                bytes.push(byte);
            },
            'u' => {
                self.expect('{', "expected `{` in unicode escape")?;
                let Some(end) = self.rest().find('}') else {
                    exn::bail!(self.error("unterminated unicode escape"));
                };
                let c = u32::from_str_radix(&self.rest()[..end], 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| exn::Exn::from(self.error("bad unicode escape")))?;
                self.pos += end + 1;
                bytes.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes());
            },
            c if c.is_ascii_digit() => {
                let mut value = c.to_digit(10).unwrap_or_default();
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(10)) {
                        Some(d) => {
                            value = value * 10 + d;
                            self.bump();
                        },
                        None => break,
                    }
                }
                let byte = u8::try_from(value).map_err(|_| exn::Exn::from(self.error("decimal escape too large")))?;
                bytes.push(byte);
            },
            _ => exn::bail!(self.error("invalid escape")),
        }
        Ok(())
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        let negative = self.eat('-');
        let digits_start = self.pos;
        if self.rest().starts_with("0x") || self.rest().starts_with("0X") {
            self.pos += 2;
            let len = self.rest().find(|c: char| !c.is_ascii_hexdigit()).unwrap_or(self.rest().len());
            let hex = &self.rest()[..len];
            self.pos += len;
            let value = i64::from_str_radix(hex, 16).map_err(|_| exn::Exn::from(self.error("bad hex number")))?;
            return Ok(Value::Int(if negative { -value } else { value }));
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {},
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('+' | '-')) {
                        self.bump();
                    }
                    continue;
                },
                _ => break,
            }
            self.bump();
        }
        if self.pos == digits_start {
            exn::bail!(self.error("expected number"));
        }
        let text = &self.input[start..self.pos];
        if !is_float && let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        text.parse::<f64>().map(Value::Float).map_err(|_| exn::Exn::from(ErrorKind::Syntax { offset: start, reason: "bad number" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_document() {
        let input = r#"-- we can read Lua syntax here!
return {
    ["annotations"] = {
        [1] = {
            ["datetime"] = "2024-01-02 03:04:05",
            ["pageno"] = 12,
            ["text"] = "Call me \"Ishmael\".",
        },
    },
    ["percent_finished"] = 0.25,
    ["summary"] = {
        ["status"] = "complete",
    },
    doc_path = '/mnt/ext1/Books/moby.epub',
    ["flag"] = true,
    ["gone"] = nil,
}
"#;
        let table = parse(input).unwrap();
        assert_eq!(table.get_path(&["summary", "status"]).and_then(Value::as_str), Some("complete"));
        assert_eq!(table.get("doc_path").and_then(Value::as_str), Some("/mnt/ext1/Books/moby.epub"));
        assert_eq!(table.get("percent_finished"), Some(&Value::Float(0.25)));
        assert_eq!(table.get("flag"), Some(&Value::Bool(true)));
        assert!(table.get("gone").is_none());
        let annotations = table.get("annotations").and_then(Value::as_table).unwrap();
        let first = annotations.get(1).and_then(Value::as_table).unwrap();
        assert_eq!(first.get("text").and_then(Value::as_str), Some("Call me \"Ishmael\"."));
        assert_eq!(first.get("pageno").and_then(Value::as_i64), Some(12));
    }

    #[rstest]
    #[case(r#"{"a\
b"}"#, "a\nb")]
    #[case(r#"{"tab\there"}"#, "tab\there")]
    #[case(r#"{"caf\195\169"}"#, "café")]
    #[case(r#"{"\x41\u{42}"}"#, "AB")]
    #[case(r#"{'it\'s'}"#, "it's")]
    #[case("{[[long\nstring]]}", "long\nstring")]
    #[case("{[==[\nwith ]] inside]==]}", "with ]] inside")]
    fn test_parse_strings(#[case] input: &str, #[case] expected: &str) {
        let table = parse(input).unwrap();
        assert_eq!(table.get(1).and_then(Value::as_str), Some(expected));
    }

    #[rstest]
    #[case("{1}", Value::Int(1))]
    #[case("{-42}", Value::Int(-42))]
    #[case("{0x1F}", Value::Int(31))]
    #[case("{1.5}", Value::Float(1.5))]
    #[case("{1e3}", Value::Float(1000.0))]
    #[case("{99999999999999999999}", Value::Float(1e20))]
    fn test_parse_numbers(#[case] input: &str, #[case] expected: Value) {
        assert_eq!(parse(input).unwrap().get(1), Some(&expected));
    }

    #[test]
    fn test_positional_and_comments() {
        let table = parse("{ 'a', --[[ block ]] 'b'; -- trailing\n [5] = 'e', 'c' }").unwrap();
        let values: Vec<&str> = table.sequence().into_iter().filter_map(Value::as_str).collect();
        assert_eq!(values, ["a", "b", "c", "e"]);
    }

    #[rstest]
    #[case("")]
    #[case("return nothing")]
    #[case("{")]
    #[case("{ [\"a\"] = }")]
    #[case("{ \"unterminated }")]
    #[case("{ a = 1 b = 2 }")]
    #[case("{ [true] = 1 }")]
    fn test_malformed(#[case] input: &str) {
        let err = parse(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Syntax { .. }));
    }
}
