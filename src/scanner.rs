//! Lexical scanner for PDF syntax.
//!
//! The scanner is a forward cursor with O(1) seek over a random-access byte
//! buffer. It recognizes every PDF token type: numbers (integer and real
//! kept apart), literal and hex strings (escape sequences decoded here),
//! names with `#hh` escapes, the structural delimiters, bareword keywords,
//! indirect references fused from the `N G R` pattern, and stream payloads.
//!
//! Stream payload extraction honors a caller-provided length hint (see
//! [`Scanner::set_next_stream_length`]) so an indirect `/Length` can be
//! resolved by the object loader and injected before the payload is read.
//! The hint is the only parser state that survives a seek.

use crate::config::ParseOptions;
use crate::error::{Error, Location, Result};
use crate::object::{ObjectRef, StringFormat};
use crate::recovery::{Action, RecoveryStrategy};
use nom::IResult;
use nom::bytes::complete::take_while;
use nom::character::complete::{char as nom_char, digit1, one_of};
use nom::combinator::opt;
use nom::sequence::preceded;
use std::sync::Arc;

/// Longest bareword the scanner will accept. The longest legitimate PDF
/// keyword is `endstream` (9 bytes); anything past this is damage.
const MAX_BAREWORD: usize = 127;

/// Token types produced by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer number.
    Integer(i64),
    /// Real number. Any source number containing `.` becomes a real.
    Real(f64),
    /// `true` / `false`.
    Boolean(bool),
    /// `null`.
    Null,
    /// String with escapes/hex already decoded, plus source form.
    String(Vec<u8>, StringFormat),
    /// Name with `#hh` escapes decoded.
    Name(String),
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// Indirect reference fused from `N G R`.
    Ref(ObjectRef),
    /// Any other bareword: `obj`, `endobj`, `endstream`, `trailer`,
    /// `xref`, `startxref`, `f`, `n`, `R`, ...
    Keyword(String),
    /// Stream payload extracted between `stream` and `endstream`.
    Stream(Vec<u8>),
    /// End of input.
    Eof,
}

/// PDF whitespace per the spec: NUL, HT, LF, FF, CR, SP.
pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

/// Delimiter characters that terminate barewords, names, and numbers.
pub(crate) fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Number as scanned, before any reference fusion.
#[derive(Debug, Clone, Copy)]
enum RawNumber {
    /// `plain` is true for unsigned, undotted digit runs; only those can
    /// participate in an `N G R` reference pattern.
    Integer { value: i64, plain: bool },
    Real(f64),
}

/// Lex a number: optional sign, digits, optional `.` and more digits.
/// No exponent form. A `.` always yields a real, even for `5.0`.
fn lex_number(input: &[u8]) -> IResult<&[u8], RawNumber> {
    let (rest, sign) = opt(one_of("+-"))(input)?;
    let (rest, int_part) = opt(digit1)(rest)?;
    let (rest, frac_part) = opt(preceded(nom_char('.'), opt(digit1)))(rest)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        )));
    }

    if let Some(frac) = frac_part {
        let mut text = String::new();
        if sign == Some('-') {
            text.push('-');
        }
        match int_part {
            Some(digits) => text.push_str(std::str::from_utf8(digits).unwrap_or("0")),
            None => text.push('0'),
        }
        text.push('.');
        if let Some(digits) = frac {
            text.push_str(std::str::from_utf8(digits).unwrap_or("0"));
        } else {
            text.push('0');
        }
        let value: f64 = text.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
        })?;
        Ok((rest, RawNumber::Real(value)))
    } else {
        let digits = int_part.expect("checked above");
        let mut text = String::with_capacity(digits.len() + 1);
        if sign == Some('-') {
            text.push('-');
        }
        text.push_str(std::str::from_utf8(digits).unwrap_or("0"));
        match text.parse::<i64>() {
            Ok(value) => Ok((rest, RawNumber::Integer {
                value,
                plain: sign.is_none(),
            })),
            // Integers too large for i64 degrade to reals, as readers do.
            Err(_) => Ok((rest, RawNumber::Real(text.parse().unwrap_or(0.0)))),
        }
    }
}

/// Lex a name body (after the `/`).
fn lex_name_body(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(is_regular)(input)
}

/// Decode `#hh` escape sequences in a name.
pub(crate) fn decode_name_escapes(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' {
            if let Some(pair) = raw.get(i + 1..i + 3) {
                if let Ok(byte) = u8::from_str_radix(&String::from_utf8_lossy(pair), 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
            // Invalid escape: keep the '#' literal.
            out.push(b'#');
            i += 1;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Decode the escape sequences of a literal string body.
///
/// Handles the single-character escapes, 1-3 digit octal escapes, the
/// `\<EOL>` line continuation (producing no byte), and EOL normalization
/// (a bare CR or CRLF inside the string reads as LF).
pub(crate) fn decode_literal_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'\\' if i + 1 < raw.len() => {
                match raw[i + 1] {
                    b'n' => {
                        out.push(b'\n');
                        i += 2;
                    }
                    b'r' => {
                        out.push(b'\r');
                        i += 2;
                    }
                    b't' => {
                        out.push(b'\t');
                        i += 2;
                    }
                    b'b' => {
                        out.push(0x08);
                        i += 2;
                    }
                    b'f' => {
                        out.push(0x0C);
                        i += 2;
                    }
                    b'(' => {
                        out.push(b'(');
                        i += 2;
                    }
                    b')' => {
                        out.push(b')');
                        i += 2;
                    }
                    b'\\' => {
                        out.push(b'\\');
                        i += 2;
                    }
                    // Line continuation produces no byte.
                    b'\n' => i += 2,
                    b'\r' => {
                        i += 2;
                        if i < raw.len() && raw[i] == b'\n' {
                            i += 1;
                        }
                    }
                    c if c.is_ascii_digit() && c < b'8' => {
                        let mut value = 0u32;
                        let mut len = 0;
                        while len < 3 {
                            match raw.get(i + 1 + len) {
                                Some(&d) if d.is_ascii_digit() && d < b'8' => {
                                    value = value * 8 + (d - b'0') as u32;
                                    len += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push((value & 0xFF) as u8);
                        i += 1 + len;
                    }
                    // Unknown escape: the backslash is ignored.
                    other => {
                        out.push(other);
                        i += 2;
                    }
                }
            }
            b'\\' => i += 1,
            b'\r' => {
                out.push(b'\n');
                i += 1;
                if i < raw.len() && raw[i] == b'\n' {
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Forward token cursor over a byte buffer.
pub struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
    stream_hint: Option<usize>,
    options: ParseOptions,
    recovery: Arc<dyn RecoveryStrategy>,
}

impl<'a> Scanner<'a> {
    /// Create a scanner over `buf`.
    pub fn new(buf: &'a [u8], options: ParseOptions, recovery: Arc<dyn RecoveryStrategy>) -> Self {
        Self {
            buf,
            pos: 0,
            stream_hint: None,
            options,
            recovery,
        }
    }

    /// Total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// The limits this scanner was created with.
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// The recovery strategy this scanner consults.
    pub fn recovery(&self) -> &Arc<dyn RecoveryStrategy> {
        &self.recovery
    }

    /// True when the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Byte offset of the next token start (whitespace and comments
    /// skipped).
    pub fn position(&mut self) -> u64 {
        self.skip_ws();
        self.pos as u64
    }

    /// Move the cursor. O(1); only the stream-length hint survives.
    pub fn seek_to(&mut self, offset: u64) {
        self.pos = (offset as usize).min(self.buf.len());
    }

    /// Provide the payload length for the next `stream` keyword, resolved
    /// by the caller (possibly from an indirect `/Length`). A negative
    /// value clears any prior hint.
    pub fn set_next_stream_length(&mut self, length: i64) {
        if length < 0 {
            self.stream_hint = None;
        } else {
            self.stream_hint = Some(length as usize);
        }
    }

    /// Read the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ws();
        let Some(&first) = self.buf.get(self.pos) else {
            return Ok(Token::Eof);
        };
        match first {
            b'[' => {
                self.pos += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Ok(Token::ArrayEnd)
            }
            b'<' if self.buf.get(self.pos + 1) == Some(&b'<') => {
                self.pos += 2;
                Ok(Token::DictStart)
            }
            b'<' => self.scan_hex_string(),
            b'>' if self.buf.get(self.pos + 1) == Some(&b'>') => {
                self.pos += 2;
                Ok(Token::DictEnd)
            }
            b'(' => self.scan_literal_string(),
            b'/' => self.scan_name(),
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.scan_number(),
            b')' | b'>' | b'{' | b'}' => {
                let err = self.lexical(format!("unexpected delimiter {:?}", first as char));
                self.pos += 1;
                Err(err)
            }
            _ => self.scan_bareword(),
        }
    }

    /// Read the next token without consuming it.
    ///
    /// Peeking a `stream` keyword performs (and then rewinds) the payload
    /// extraction; callers that expect a stream should use
    /// [`Scanner::next_token`] directly.
    pub fn peek_token(&mut self) -> Result<Token> {
        let save_pos = self.pos;
        let save_hint = self.stream_hint;
        let token = self.next_token();
        self.pos = save_pos;
        self.stream_hint = save_hint;
        token
    }

    /// Consume a specific keyword or fail with a lexical error.
    pub fn expect_keyword(&mut self, word: &str) -> Result<()> {
        let offset = self.position();
        match self.next_token()? {
            Token::Keyword(found) if found == word => Ok(()),
            other => Err(Error::Lexical {
                offset,
                reason: format!("expected keyword {:?}, found {:?}", word, other),
            }),
        }
    }

    fn lexical(&self, reason: String) -> Error {
        Error::Lexical {
            offset: self.pos as u64,
            reason,
        }
    }

    fn consult(&self, err: &Error) -> Action {
        self.recovery
            .on_error(err, &Location::at("scanner", self.pos as u64))
    }

    fn skip_ws(&mut self) {
        loop {
            while self.pos < self.buf.len() && is_whitespace(self.buf[self.pos]) {
                self.pos += 1;
            }
            if self.pos < self.buf.len() && self.buf[self.pos] == b'%' {
                while self.pos < self.buf.len() && !matches!(self.buf[self.pos], b'\r' | b'\n') {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn scan_number(&mut self) -> Result<Token> {
        let rest = &self.buf[self.pos..];
        let (after, number) = lex_number(rest)
            .map_err(|_| self.lexical("malformed number".to_string()))?;
        self.pos += rest.len() - after.len();

        match number {
            RawNumber::Real(value) => Ok(Token::Real(value)),
            RawNumber::Integer { value, plain } => {
                // `N G R` fusion: only plain non-negative integers qualify.
                if plain && value >= 0 && value <= u32::MAX as i64 {
                    if let Some(gen) = self.try_fuse_reference() {
                        return Ok(Token::Ref(ObjectRef::new(value as u32, gen)));
                    }
                }
                Ok(Token::Integer(value))
            }
        }
    }

    /// After a plain integer, look for `G R` with G a plain integer in
    /// generation range. Consumes the pattern on success; otherwise the
    /// cursor is unchanged.
    fn try_fuse_reference(&mut self) -> Option<u16> {
        let save = self.pos;
        self.skip_ws();
        let rest = &self.buf[self.pos..];
        let (after, number) = match lex_number(rest) {
            Ok(parsed) => parsed,
            Err(_) => {
                self.pos = save;
                return None;
            }
        };
        let gen = match number {
            RawNumber::Integer { value, plain: true } if (0..=65535).contains(&value) => {
                value as u16
            }
            _ => {
                self.pos = save;
                return None;
            }
        };
        self.pos += rest.len() - after.len();
        self.skip_ws();

        // The third token must be exactly the bareword `R`.
        let word_start = self.pos;
        let mut end = word_start;
        while end < self.buf.len() && is_regular(self.buf[end]) {
            end += 1;
        }
        if &self.buf[word_start..end] == b"R" {
            self.pos = end;
            Some(gen)
        } else {
            self.pos = save;
            None
        }
    }

    fn scan_bareword(&mut self) -> Result<Token> {
        let start = self.pos;
        while self.pos < self.buf.len() && is_regular(self.buf[self.pos]) {
            self.pos += 1;
            if self.pos - start > MAX_BAREWORD {
                return Err(self.lexical("overlong bareword".to_string()));
            }
        }
        let word = &self.buf[start..self.pos];
        match word {
            b"true" => Ok(Token::Boolean(true)),
            b"false" => Ok(Token::Boolean(false)),
            b"null" => Ok(Token::Null),
            b"stream" => self.scan_stream_payload(),
            _ => Ok(Token::Keyword(
                String::from_utf8_lossy(word).into_owned(),
            )),
        }
    }

    fn scan_literal_string(&mut self) -> Result<Token> {
        debug_assert_eq!(self.buf[self.pos], b'(');
        let body_start = self.pos + 1;
        let mut i = body_start;
        let mut depth = 1usize;
        while i < self.buf.len() {
            match self.buf[i] {
                b'\\' => i += 2,
                b'(' => {
                    depth += 1;
                    i += 1;
                }
                b')' => {
                    depth -= 1;
                    i += 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => i += 1,
            }
            if i - body_start > self.options.max_string_len {
                return Err(Error::LimitExceeded {
                    limit: "max_string_len",
                });
            }
        }
        if depth != 0 {
            return Err(Error::Truncated);
        }
        let raw = &self.buf[body_start..i - 1];
        self.pos = i.min(self.buf.len());
        let decoded = decode_literal_escapes(raw);
        if decoded.len() > self.options.max_string_len {
            return Err(Error::LimitExceeded {
                limit: "max_string_len",
            });
        }
        Ok(Token::String(decoded, StringFormat::Literal))
    }

    fn scan_hex_string(&mut self) -> Result<Token> {
        debug_assert_eq!(self.buf[self.pos], b'<');
        let mut i = self.pos + 1;
        let mut digits: Vec<u8> = Vec::new();
        loop {
            match self.buf.get(i) {
                None => return Err(Error::Truncated),
                Some(&b'>') => {
                    i += 1;
                    break;
                }
                Some(&b) if b.is_ascii_hexdigit() => {
                    digits.push(b);
                    i += 1;
                }
                Some(&b) if is_whitespace(b) => i += 1,
                Some(&b) => {
                    let err = self.lexical(format!("invalid hex string byte 0x{:02x}", b));
                    match self.consult(&err) {
                        Action::Fail => return Err(err),
                        // Tolerate and drop the stray byte.
                        _ => i += 1,
                    }
                }
            }
            if digits.len() / 2 > self.options.max_string_len {
                return Err(Error::LimitExceeded {
                    limit: "max_string_len",
                });
            }
        }
        self.pos = i;

        // Odd digit count reads as if a trailing '0' were present.
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }
        let mut bytes = Vec::with_capacity(digits.len() / 2);
        for pair in digits.chunks_exact(2) {
            let hi = (pair[0] as char).to_digit(16).expect("checked hex digit") as u8;
            let lo = (pair[1] as char).to_digit(16).expect("checked hex digit") as u8;
            bytes.push(hi << 4 | lo);
        }
        Ok(Token::String(bytes, StringFormat::Hex))
    }

    fn scan_name(&mut self) -> Result<Token> {
        debug_assert_eq!(self.buf[self.pos], b'/');
        let rest = &self.buf[self.pos + 1..];
        let (after, body) =
            lex_name_body(rest).map_err(|_| self.lexical("malformed name".to_string()))?;
        if body.len() > self.options.max_string_len {
            return Err(Error::LimitExceeded {
                limit: "max_string_len",
            });
        }
        self.pos += 1 + (rest.len() - after.len());
        Ok(Token::Name(decode_name_escapes(body)))
    }

    /// Extract the payload following a `stream` keyword.
    fn scan_stream_payload(&mut self) -> Result<Token> {
        // A single EOL follows the keyword: LF or CRLF. A lone CR or a
        // missing EOL is damage some producers emit anyway.
        match (self.buf.get(self.pos), self.buf.get(self.pos + 1)) {
            (Some(&b'\r'), Some(&b'\n')) => self.pos += 2,
            (Some(&b'\n'), _) => self.pos += 1,
            (Some(&b'\r'), _) => {
                let err = self.lexical("CR alone after stream keyword".to_string());
                if self.consult(&err) == Action::Fail {
                    return Err(err);
                }
                self.pos += 1;
            }
            _ => {
                let err = self.lexical("missing EOL after stream keyword".to_string());
                if self.consult(&err) == Action::Fail {
                    return Err(err);
                }
            }
        }

        let payload_start = self.pos;
        let hint = self.stream_hint.take();

        if let Some(length) = hint {
            if length > self.options.max_stream_len {
                return Err(Error::LimitExceeded {
                    limit: "max_stream_len",
                });
            }
            if payload_start + length <= self.buf.len() {
                let payload_end = payload_start + length;
                // The hint is trusted only if `endstream` actually follows.
                let mut probe = payload_end;
                while probe < self.buf.len() && is_whitespace(self.buf[probe]) {
                    probe += 1;
                }
                if self.buf[probe..].starts_with(b"endstream") {
                    self.pos = probe + b"endstream".len();
                    return Ok(Token::Stream(self.buf[payload_start..payload_end].to_vec()));
                }
                let err = self.lexical(format!(
                    "stream length {} does not reach endstream",
                    length
                ));
                match self.consult(&err) {
                    Action::Fail => return Err(err),
                    Action::Warn => {
                        self.pos = payload_end;
                        return Ok(Token::Stream(self.buf[payload_start..payload_end].to_vec()));
                    }
                    // Fix / Skip: fall back to scanning for endstream.
                    _ => {}
                }
            } else {
                let err = Error::Truncated;
                if self.consult(&err) == Action::Fail {
                    return Err(err);
                }
            }
        }

        self.scan_to_endstream(payload_start)
    }

    /// Locate `endstream`, trimming the single EOL that precedes it.
    fn scan_to_endstream(&mut self, payload_start: usize) -> Result<Token> {
        let needle = b"endstream";
        let hay = &self.buf[payload_start..];
        let found = hay
            .windows(needle.len())
            .position(|window| window == needle)
            .ok_or(Error::Truncated)?;

        let mut payload_end = payload_start + found;
        if payload_end > payload_start && self.buf[payload_end - 1] == b'\n' {
            payload_end -= 1;
            if payload_end > payload_start && self.buf[payload_end - 1] == b'\r' {
                payload_end -= 1;
            }
        } else if payload_end > payload_start && self.buf[payload_end - 1] == b'\r' {
            payload_end -= 1;
        }

        if payload_end - payload_start > self.options.max_stream_len {
            return Err(Error::LimitExceeded {
                limit: "max_stream_len",
            });
        }

        self.pos = payload_start + found + needle.len();
        Ok(Token::Stream(self.buf[payload_start..payload_end].to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{LenientRecovery, StrictRecovery};

    fn scanner(input: &[u8]) -> Scanner<'_> {
        Scanner::new(input, ParseOptions::default(), Arc::new(StrictRecovery))
    }

    fn lenient_scanner(input: &[u8]) -> Scanner<'_> {
        Scanner::new(input, ParseOptions::default(), Arc::new(LenientRecovery))
    }

    #[test]
    fn test_integers() {
        assert_eq!(scanner(b"42").next_token().unwrap(), Token::Integer(42));
        assert_eq!(scanner(b"-123").next_token().unwrap(), Token::Integer(-123));
        assert_eq!(scanner(b"+17").next_token().unwrap(), Token::Integer(17));
        assert_eq!(scanner(b"0").next_token().unwrap(), Token::Integer(0));
    }

    #[test]
    fn test_reals() {
        assert_eq!(scanner(b"3.14").next_token().unwrap(), Token::Real(3.14));
        assert_eq!(scanner(b"-.002").next_token().unwrap(), Token::Real(-0.002));
        assert_eq!(scanner(b".5").next_token().unwrap(), Token::Real(0.5));
        // Trailing zeros still force a real token.
        assert_eq!(scanner(b"5.0").next_token().unwrap(), Token::Real(5.0));
        assert_eq!(scanner(b"5.").next_token().unwrap(), Token::Real(5.0));
    }

    #[test]
    fn test_literal_string_escapes() {
        let mut s = scanner(b"(Line1\\nLine2)");
        assert_eq!(
            s.next_token().unwrap(),
            Token::String(b"Line1\nLine2".to_vec(), StringFormat::Literal)
        );

        let mut s = scanner(b"(nested (parens) kept)");
        assert_eq!(
            s.next_token().unwrap(),
            Token::String(b"nested (parens) kept".to_vec(), StringFormat::Literal)
        );

        let mut s = scanner(b"(octal \\101\\102)");
        assert_eq!(
            s.next_token().unwrap(),
            Token::String(b"octal AB".to_vec(), StringFormat::Literal)
        );
    }

    #[test]
    fn test_literal_string_line_continuation() {
        let mut s = scanner(b"(split\\\nword)");
        assert_eq!(
            s.next_token().unwrap(),
            Token::String(b"splitword".to_vec(), StringFormat::Literal)
        );
    }

    #[test]
    fn test_hex_string() {
        let mut s = scanner(b"<68656c6c6f20776f726c64>");
        assert_eq!(
            s.next_token().unwrap(),
            Token::String(b"hello world".to_vec(), StringFormat::Hex)
        );
    }

    #[test]
    fn test_hex_string_odd_length_pads_zero() {
        let mut s = scanner(b"<68656c>");
        assert_eq!(
            s.next_token().unwrap(),
            Token::String(vec![0x68, 0x65, 0x6c], StringFormat::Hex)
        );
        // Odd count: trailing digit reads as high nibble.
        let mut s = scanner(b"<901FA>");
        assert_eq!(
            s.next_token().unwrap(),
            Token::String(vec![0x90, 0x1F, 0xA0], StringFormat::Hex)
        );
    }

    #[test]
    fn test_hex_string_ignores_whitespace() {
        let mut s = scanner(b"<48 65 6C\n6C 6F>");
        assert_eq!(
            s.next_token().unwrap(),
            Token::String(b"Hello".to_vec(), StringFormat::Hex)
        );
    }

    #[test]
    fn test_names() {
        assert_eq!(
            scanner(b"/Type").next_token().unwrap(),
            Token::Name("Type".to_string())
        );
        assert_eq!(
            scanner(b"/A#20B").next_token().unwrap(),
            Token::Name("A B".to_string())
        );
        assert_eq!(
            scanner(b"/A#ZZ").next_token().unwrap(),
            Token::Name("A#ZZ".to_string())
        );
    }

    #[test]
    fn test_delimiters_and_keywords() {
        let mut s = scanner(b"[ ] << >> obj endobj trailer xref startxref");
        assert_eq!(s.next_token().unwrap(), Token::ArrayStart);
        assert_eq!(s.next_token().unwrap(), Token::ArrayEnd);
        assert_eq!(s.next_token().unwrap(), Token::DictStart);
        assert_eq!(s.next_token().unwrap(), Token::DictEnd);
        for expected in ["obj", "endobj", "trailer", "xref", "startxref"] {
            assert_eq!(s.next_token().unwrap(), Token::Keyword(expected.to_string()));
        }
        assert_eq!(s.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_booleans_and_null() {
        let mut s = scanner(b"true false null");
        assert_eq!(s.next_token().unwrap(), Token::Boolean(true));
        assert_eq!(s.next_token().unwrap(), Token::Boolean(false));
        assert_eq!(s.next_token().unwrap(), Token::Null);
    }

    #[test]
    fn test_comments_skipped() {
        let mut s = scanner(b"% a comment\n 42 % trailing\n7");
        assert_eq!(s.next_token().unwrap(), Token::Integer(42));
        assert_eq!(s.next_token().unwrap(), Token::Integer(7));
    }

    #[test]
    fn test_reference_fusion() {
        let mut s = scanner(b"10 0 R");
        assert_eq!(s.next_token().unwrap(), Token::Ref(ObjectRef::new(10, 0)));

        // `obj` is not `R`: no fusion.
        let mut s = scanner(b"10 0 obj");
        assert_eq!(s.next_token().unwrap(), Token::Integer(10));
        assert_eq!(s.next_token().unwrap(), Token::Integer(0));
        assert_eq!(s.next_token().unwrap(), Token::Keyword("obj".to_string()));
    }

    #[test]
    fn test_reference_fusion_rejects_signed_and_real() {
        // A signed first number is not an ordinary integer.
        let mut s = scanner(b"-10 0 R");
        assert_eq!(s.next_token().unwrap(), Token::Integer(-10));

        // `+0` generation is not plain either.
        let mut s = scanner(b"10 +0 R");
        assert_eq!(s.next_token().unwrap(), Token::Integer(10));
        assert_eq!(s.next_token().unwrap(), Token::Integer(0));

        // Reals never fuse.
        let mut s = scanner(b"10.0 0 R");
        assert_eq!(s.next_token().unwrap(), Token::Real(10.0));
    }

    #[test]
    fn test_reference_fusion_not_greedy_across_xref_rows() {
        // An xref row must stay three separate tokens.
        let mut s = scanner(b"0000000017 00000 n");
        assert_eq!(s.next_token().unwrap(), Token::Integer(17));
        assert_eq!(s.next_token().unwrap(), Token::Integer(0));
        assert_eq!(s.next_token().unwrap(), Token::Keyword("n".to_string()));
    }

    #[test]
    fn test_position_and_seek() {
        let mut s = scanner(b"  12 34");
        assert_eq!(s.position(), 2);
        assert_eq!(s.next_token().unwrap(), Token::Integer(12));
        assert_eq!(s.position(), 5);
        s.seek_to(0);
        assert_eq!(s.next_token().unwrap(), Token::Integer(12));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut s = scanner(b"/One /Two");
        assert_eq!(s.peek_token().unwrap(), Token::Name("One".to_string()));
        assert_eq!(s.next_token().unwrap(), Token::Name("One".to_string()));
        assert_eq!(s.next_token().unwrap(), Token::Name("Two".to_string()));
    }

    #[test]
    fn test_stream_with_hint() {
        let mut s = scanner(b"stream\nhello worldendstream rest");
        s.seek_to(0);
        s.set_next_stream_length(11);
        assert_eq!(s.next_token().unwrap(), Token::Stream(b"hello world".to_vec()));
        assert_eq!(s.next_token().unwrap(), Token::Keyword("rest".to_string()));
    }

    #[test]
    fn test_stream_hint_reads_exact_binary() {
        // Payload contains the word "endstream": the hint must win.
        let payload = b"abc endstream def";
        let mut file = Vec::new();
        file.extend_from_slice(b"stream\r\n");
        file.extend_from_slice(payload);
        file.extend_from_slice(b"\nendstream");
        let mut s = scanner(&file);
        s.set_next_stream_length(payload.len() as i64);
        assert_eq!(s.next_token().unwrap(), Token::Stream(payload.to_vec()));
    }

    #[test]
    fn test_stream_without_hint_scans_endstream() {
        let mut s = scanner(b"stream\npayload bytes\nendstream");
        assert_eq!(s.next_token().unwrap(), Token::Stream(b"payload bytes".to_vec()));
    }

    #[test]
    fn test_stream_hint_cleared_by_negative() {
        let mut s = scanner(b"stream\nabc\nendstream");
        s.set_next_stream_length(2);
        s.set_next_stream_length(-1);
        assert_eq!(s.next_token().unwrap(), Token::Stream(b"abc".to_vec()));
    }

    #[test]
    fn test_bad_stream_hint_strict_fails_lenient_rescans() {
        let data = b"stream\nabcdef\nendstream";

        let mut strict = scanner(data);
        strict.set_next_stream_length(3);
        assert!(strict.next_token().is_err());

        let mut lenient = lenient_scanner(data);
        lenient.set_next_stream_length(3);
        assert_eq!(lenient.next_token().unwrap(), Token::Stream(b"abcdef".to_vec()));
    }

    #[test]
    fn test_string_limit() {
        let mut opts = ParseOptions::default();
        opts.max_string_len = 4;
        let mut s = Scanner::new(b"(abcdefgh)", opts, Arc::new(StrictRecovery));
        assert!(matches!(
            s.next_token(),
            Err(Error::LimitExceeded { limit: "max_string_len" })
        ));
    }

    #[test]
    fn test_unterminated_string_is_truncated() {
        let mut s = scanner(b"(never closed");
        assert!(matches!(s.next_token(), Err(Error::Truncated)));
    }

    #[test]
    fn test_eof() {
        let mut s = scanner(b"   % only a comment");
        assert_eq!(s.next_token().unwrap(), Token::Eof);
    }
}
