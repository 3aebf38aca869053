//! A positioned cursor over JSON text.
//!
//! The reader knows nothing about schemas. It scans tokens, reports byte offsets and can be
//! rewound to any earlier offset, which is what lets the decoder revisit deferred keys. String
//! escapes are delegated to `serde_json`; everything else is scanned by hand.

use std::borrow::Cow;

use crate::error::{DecodeError, DecodeErrorKind, DecodeResult};
use crate::span::Span;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    pub allow_comments: bool,
    pub allow_trailing_comma: bool,
}

#[derive(Debug, Clone)]
pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    options: ReaderOptions,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a [u8], options: ReaderOptions) -> DecodeResult<Self> {
        if u32::try_from(input.len()).is_err() {
            return Err(DecodeError::syntax("input is larger than 4 GiB", 0));
        }
        Ok(Reader {
            input,
            pos: 0,
            options,
        })
    }

    pub fn input(&self) -> &'a [u8] {
        self.input
    }

    pub fn position(&self) -> u32 {
        self.pos as u32
    }

    pub fn set_position(&mut self, pos: u32) {
        self.pos = (pos as usize).min(self.input.len());
    }

    pub fn fail(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::syntax(message, self.position())
    }

    pub fn fail_unexpected(&self, expected: &str) -> DecodeError {
        match self.input.get(self.pos) {
            Some(&b) => self.fail(format!(
                "expected {expected}, found `{}`",
                char::from(b).escape_default()
            )),
            None => self.fail(format!("expected {expected}, found end of input")),
        }
    }

    /// Raw byte at the cursor, without skipping whitespace.
    pub fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    pub fn skip_whitespace(&mut self) -> DecodeResult<()> {
        loop {
            match self.peek_byte() {
                Some(b' ' | b'\t' | b'\n' | b'\r') => self.pos += 1,
                Some(b'/') if self.options.allow_comments => self.skip_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_comment(&mut self) -> DecodeResult<()> {
        let start = self.position();
        match self.input.get(self.pos + 1) {
            Some(b'/') => {
                self.pos += 2;
                while let Some(b) = self.peek_byte() {
                    self.pos += 1;
                    if b == b'\n' {
                        break;
                    }
                }
                Ok(())
            }
            Some(b'*') => {
                self.pos += 2;
                while self.pos + 1 < self.input.len() {
                    if self.input[self.pos] == b'*' && self.input[self.pos + 1] == b'/' {
                        self.pos += 2;
                        return Ok(());
                    }
                    self.pos += 1;
                }
                Err(DecodeError::syntax("unterminated block comment", start))
            }
            _ => Err(self.fail_unexpected("a comment")),
        }
    }

    /// Next significant byte.
    pub fn peek(&mut self) -> DecodeResult<Option<u8>> {
        self.skip_whitespace()?;
        Ok(self.peek_byte())
    }

    pub fn next_is(&mut self, token: u8) -> DecodeResult<bool> {
        Ok(self.peek()? == Some(token))
    }

    pub fn try_token(&mut self, token: u8) -> DecodeResult<bool> {
        if self.next_is(token)? {
            self.pos += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn expect_token(&mut self, token: u8) -> DecodeResult<()> {
        if self.try_token(token)? {
            Ok(())
        } else {
            Err(self.fail_unexpected(&format!("`{}`", char::from(token))))
        }
    }

    pub fn expect_colon(&mut self) -> DecodeResult<()> {
        self.expect_token(b':')
    }

    /// Consumes a separating comma if there is one. A comma directly followed by `closing` is
    /// rejected unless trailing commas are allowed.
    pub fn try_skip_comma(&mut self, closing: u8) -> DecodeResult<bool> {
        if !self.try_token(b',')? {
            return Ok(false);
        }
        if !self.options.allow_trailing_comma && self.next_is(closing)? {
            return Err(self.fail("trailing comma is not allowed"));
        }
        Ok(true)
    }

    /// Reads a quoted string, borrowing from the input unless it contains escapes.
    pub fn read_string(&mut self) -> DecodeResult<Cow<'a, str>> {
        self.skip_whitespace()?;
        if self.peek_byte() != Some(b'"') {
            return Err(self.fail_unexpected("a string"));
        }
        let start = self.pos;
        let (end, escaped) = self.scan_string(start)?;
        self.pos = end;
        if escaped {
            let raw = &self.input[start..end];
            serde_json::from_slice::<String>(raw)
                .map(Cow::Owned)
                .map_err(|e| DecodeError::syntax(format!("invalid string: {e}"), start as u32))
        } else {
            std::str::from_utf8(&self.input[start + 1..end - 1])
                .map(Cow::Borrowed)
                .map_err(|_| DecodeError::syntax("string is not valid UTF-8", start as u32))
        }
    }

    /// Object keys are strings.
    pub fn read_key(&mut self) -> DecodeResult<Cow<'a, str>> {
        self.read_string()
    }

    /// Finds the end (one past the closing quote) of the string opening at `start`.
    fn scan_string(&self, start: usize) -> DecodeResult<(usize, bool)> {
        let mut i = start + 1;
        let mut escaped = false;
        while let Some(&b) = self.input.get(i) {
            match b {
                b'"' => return Ok((i + 1, escaped)),
                b'\\' => {
                    escaped = true;
                    i += 2;
                }
                0x00..=0x1f => {
                    return Err(DecodeError::syntax(
                        "control character in string",
                        i as u32,
                    ))
                }
                _ => i += 1,
            }
        }
        Err(DecodeError::syntax("unterminated string", start as u32))
    }

    fn try_literal(&mut self, literal: &[u8]) -> DecodeResult<bool> {
        self.skip_whitespace()?;
        let end = self.pos + literal.len();
        if self.input.get(self.pos..end) != Some(literal) {
            return Ok(false);
        }
        if self.input.get(end).is_some_and(|b| is_word_byte(*b)) {
            return Ok(false);
        }
        self.pos = end;
        Ok(true)
    }

    /// Consumes `null` if it is next.
    pub fn try_null(&mut self) -> DecodeResult<bool> {
        self.try_literal(b"null")
    }

    pub fn read_null(&mut self) -> DecodeResult<()> {
        if self.try_null()? {
            Ok(())
        } else {
            Err(self.fail_unexpected("`null`"))
        }
    }

    pub fn read_bool(&mut self) -> DecodeResult<bool> {
        if self.try_literal(b"true")? {
            Ok(true)
        } else if self.try_literal(b"false")? {
            Ok(false)
        } else {
            Err(self.fail_unexpected("a boolean"))
        }
    }

    fn number_token(&mut self) -> DecodeResult<(u32, &'a str)> {
        self.skip_whitespace()?;
        let start = self.pos;
        let mut end = start;
        while self
            .input
            .get(end)
            .is_some_and(|b| matches!(b, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E'))
        {
            end += 1;
        }
        if end == start {
            return Err(self.fail_unexpected("a number"));
        }
        // Only ASCII bytes were accepted above.
        let text = std::str::from_utf8(&self.input[start..end]).unwrap_or_default();
        if !is_json_number(text.as_bytes()) {
            return Err(DecodeError::at(
                DecodeErrorKind::Syntax {
                    message: format!("`{text}` is not a valid JSON number"),
                },
                Span::new(start as u32, end as u32),
            ));
        }
        self.pos = end;
        Ok((start as u32, text))
    }

    pub fn read_i64(&mut self) -> DecodeResult<i64> {
        let (start, text) = self.number_token()?;
        text.parse()
            .map_err(|_| DecodeError::syntax(format!("`{text}` is not a valid integer"), start))
    }

    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        let (start, text) = self.number_token()?;
        text.parse().map_err(|_| {
            DecodeError::syntax(format!("`{text}` is not a valid unsigned integer"), start)
        })
    }

    pub fn read_f64(&mut self) -> DecodeResult<f64> {
        let (start, text) = self.number_token()?;
        text.parse()
            .map_err(|_| DecodeError::syntax(format!("`{text}` is not a valid number"), start))
    }

    /// Reads a scalar wrapped in quotes, as found in object keys.
    pub fn read_quoted<T>(
        &mut self,
        read: impl FnOnce(&mut Reader<'a>) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        self.expect_token(b'"')?;
        let value = read(self)?;
        if self.peek_byte() != Some(b'"') {
            return Err(self.fail_unexpected("`\"`"));
        }
        self.pos += 1;
        Ok(value)
    }

    /// Skips one complete value. Nesting is tracked with an explicit stack.
    pub fn skip_value(&mut self) -> DecodeResult<()> {
        let mut open: Vec<u8> = Vec::new();
        loop {
            if open.last() == Some(&b'}') {
                self.skip_member_key()?;
            }
            match self.peek()? {
                Some(b'"') => {
                    let (end, _) = self.scan_string(self.pos)?;
                    self.pos = end;
                }
                Some(b @ (b'{' | b'[')) => {
                    self.pos += 1;
                    let closing = if b == b'{' { b'}' } else { b']' };
                    if !self.try_token(closing)? {
                        open.push(closing);
                        continue;
                    }
                }
                Some(b'n') => self.read_null()?,
                Some(b't' | b'f') => {
                    self.read_bool()?;
                }
                Some(b'-' | b'0'..=b'9') => {
                    self.number_token()?;
                }
                _ => return Err(self.fail_unexpected("a value")),
            }

            // A value inside a container was completed: move on to the next one or close.
            loop {
                let Some(&closing) = open.last() else {
                    return Ok(());
                };
                if self.try_token(closing)? {
                    open.pop();
                    continue;
                }
                if self.try_skip_comma(closing)? {
                    if self.try_token(closing)? {
                        open.pop();
                        continue;
                    }
                    break;
                }
                return Err(self.fail_unexpected(&format!("`,` or `{}`", char::from(closing))));
            }
        }
    }

    /// Skips `"key":` inside an object that is being skipped.
    fn skip_member_key(&mut self) -> DecodeResult<()> {
        if self.peek()? != Some(b'"') {
            return Err(self.fail_unexpected("a key"));
        }
        let (end, _) = self.scan_string(self.pos)?;
        self.pos = end;
        self.expect_colon()
    }

    /// Fails unless only whitespace remains.
    pub fn expect_end(&mut self) -> DecodeResult<()> {
        self.skip_whitespace()?;
        match self.peek_byte() {
            None => Ok(()),
            Some(b) => Err(self.fail(format!(
                "unexpected trailing character `{}`",
                char::from(b).escape_default()
            ))),
        }
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// `-? (0 | [1-9][0-9]*) (. [0-9]+)? ([eE] [+-]? [0-9]+)?`
fn is_json_number(text: &[u8]) -> bool {
    fn digits(text: &[u8], mut i: usize) -> usize {
        while text.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    }

    let mut i = usize::from(text.first() == Some(&b'-'));
    match text.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => i = digits(text, i + 1),
        _ => return false,
    }
    if text.get(i) == Some(&b'.') {
        let end = digits(text, i + 1);
        if end == i + 1 {
            return false;
        }
        i = end;
    }
    if matches!(text.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(text.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let end = digits(text, i);
        if end == i {
            return false;
        }
        i = end;
    }
    i == text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(input: &str) -> Reader<'_> {
        Reader::new(input.as_bytes(), ReaderOptions::default()).unwrap()
    }

    #[test]
    fn strings_borrow_unless_escaped() {
        let mut r = reader(r#" "plain" "esc\"apedA" "#);
        assert!(matches!(r.read_string().unwrap(), Cow::Borrowed("plain")));
        assert_eq!(r.read_string().unwrap(), "esc\"apedA");
        r.expect_end().unwrap();
    }

    #[test]
    fn numbers_and_literals() {
        let mut r = reader("[-12, 7, 1.5e3, true, false, null]");
        r.expect_token(b'[').unwrap();
        assert_eq!(r.read_i64().unwrap(), -12);
        r.try_skip_comma(b']').unwrap();
        assert_eq!(r.read_u64().unwrap(), 7);
        r.try_skip_comma(b']').unwrap();
        assert_eq!(r.read_f64().unwrap(), 1500.0);
        r.try_skip_comma(b']').unwrap();
        assert!(r.read_bool().unwrap());
        r.try_skip_comma(b']').unwrap();
        assert!(!r.read_bool().unwrap());
        r.try_skip_comma(b']').unwrap();
        assert!(r.try_null().unwrap());
        r.expect_token(b']').unwrap();
    }

    #[test]
    fn nullable_word_is_not_null() {
        let mut r = reader("nullx");
        assert!(!r.try_null().unwrap());
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn skip_nested_value() {
        let input = r#"{"a": [1, {"b": "}"}, []], "c": {}} , 5"#;
        let mut r = reader(input);
        r.skip_value().unwrap();
        assert!(r.try_skip_comma(b'}').unwrap());
        assert_eq!(r.read_i64().unwrap(), 5);
    }

    #[test]
    fn skip_rejects_mismatched_brackets() {
        let mut r = reader("[1, 2}");
        assert!(r.skip_value().is_err());
    }

    #[test]
    fn comments_and_trailing_commas() {
        let options = ReaderOptions {
            allow_comments: true,
            allow_trailing_comma: true,
        };
        let mut r = Reader::new(b"[1, /* two */ 2, // end\n]", options).unwrap();
        r.skip_value().unwrap();
        r.expect_end().unwrap();

        let mut strict = reader("[1,]");
        assert!(strict.skip_value().is_err());
    }

    #[test]
    fn numbers_follow_json_grammar() {
        for text in ["0", "-0", "10", "-3.25", "1e9", "2E-3", "0.5e+2"] {
            assert!(reader(text).read_f64().is_ok(), "{text}");
        }
        for text in ["+1", "01", "1.", ".5", "-", "1e", "1.e3", "--1", "1-2"] {
            let err = reader(text).read_f64().unwrap_err();
            assert!(matches!(err.kind, DecodeErrorKind::Syntax { .. }), "{text}");
        }
    }

    #[test]
    fn invalid_number_is_reported_over_the_whole_token() {
        let mut r = reader("[1, 01]");
        let err = r.skip_value().unwrap_err();
        assert_eq!(err.span, Some(Span::new(4, 6)));
    }

    #[test]
    fn skipped_objects_need_keys_and_colons() {
        for input in [r#"{"q","r"}"#, r#"{"a" 1}"#, r#"{1: 2}"#, r#"{"a": {"b"}}"#, r#"{"a":1,}"#] {
            assert!(reader(input).skip_value().is_err(), "{input}");
        }
        let mut r = reader(r#"{"a": {"b": [1, {}]}, "c": null}"#);
        r.skip_value().unwrap();
        r.expect_end().unwrap();
    }

    #[test]
    fn quoted_number_key() {
        let mut r = reader(r#""42""#);
        assert_eq!(r.read_quoted(|r| r.read_i64()).unwrap(), 42);
    }

    #[test]
    fn trailing_garbage_is_reported_at_its_position() {
        let mut r = reader("{} x");
        r.skip_value().unwrap();
        let err = r.expect_end().unwrap_err();
        assert_eq!(err.position(), Some(3));
    }
}
