//! The streaming JSON tokenizer.
//!
//! [`Tokenizer`] pulls bytes from an [`std::io::Read`] source in bounded
//! chunks, decodes them incrementally and emits prefix-tagged
//! [`ParseEvent`]s. It carries no knowledge of response semantics; the
//! classifier layered on top decides what the events mean.
//!
//! The lexer and the parse-state dispatcher are split the classic way: the
//! lexer turns characters into tokens, the dispatcher turns tokens into
//! structural events while maintaining a stack of open containers. Because the
//! tokenizer owns its reader and can refill the buffer on demand, a token is
//! never cut in half by a chunk boundary; the only hard stop is true end of
//! input.

use std::{collections::VecDeque, io::Read};

use crate::{
    error::{Error, Result},
    event::{ParseEvent, Prefix, Scalar},
};

/// Default read size, in bytes, for one pull from the underlying stream.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

// ------------------------------------------------------------------------------------------------
// Chunked byte source
// ------------------------------------------------------------------------------------------------

enum SourceError {
    Io(std::io::Error),
    InvalidUtf8,
}

/// Expected UTF-8 sequence length from its leading byte, `None` for bytes
/// that cannot start a sequence.
fn utf8_len(b: u8) -> Option<usize> {
    match b {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

/// A byte ring fed from a reader in bounded chunks, decoded one scalar at a
/// time. A multi-byte sequence split across chunk boundaries is completed by
/// further reads before being decoded.
struct ChunkedSource<R: Read> {
    reader: R,
    ring: VecDeque<u8>,
    scratch: Vec<u8>,
    eof: bool,
}

impl<R: Read> ChunkedSource<R> {
    fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            ring: VecDeque::new(),
            scratch: vec![0; chunk_size.max(1)],
            eof: false,
        }
    }

    /// Pulls one chunk from the reader into the ring.
    fn fill(&mut self) -> std::io::Result<()> {
        loop {
            match self.reader.read(&mut self.scratch) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.ring.extend(&self.scratch[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Decodes the next character without consuming it, refilling the ring as
    /// needed. `Ok(None)` means the stream is exhausted.
    fn peek_char(&mut self) -> core::result::Result<Option<char>, SourceError> {
        loop {
            let Some(&b0) = self.ring.front() else {
                if self.eof {
                    return Ok(None);
                }
                self.fill().map_err(SourceError::Io)?;
                continue;
            };
            let Some(need) = utf8_len(b0) else {
                return Err(SourceError::InvalidUtf8);
            };
            if self.ring.len() < need {
                if self.eof {
                    return Err(SourceError::InvalidUtf8);
                }
                self.fill().map_err(SourceError::Io)?;
                continue;
            }
            let mut buf = [0u8; 4];
            for (i, slot) in buf.iter_mut().enumerate().take(need) {
                *slot = self.ring[i];
            }
            let (decoded, size) = bstr::decode_utf8(&buf[..need]);
            return match decoded {
                Some(c) if size == need => Ok(Some(c)),
                _ => Err(SourceError::InvalidUtf8),
            };
        }
    }

    /// Drops the bytes of the most recently peeked character.
    fn consume(&mut self, len: usize) {
        for _ in 0..len {
            self.ring.pop_front();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Lexer internals
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Token {
    Eof,
    PropertyName { value: String },
    String(String),
    Boolean(bool),
    Null,
    Number(f64),
    /// One of `{` `}` `[` `]` `:` `,`
    Punctuator(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Peeked {
    Char(char),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Start,
    BeforePropertyName,
    AfterPropertyName,
    BeforePropertyValue,
    BeforeArrayValue,
    AfterPropertyValue,
    AfterArrayValue,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Default,
    Value,
    ValueLiteral,
    Sign,
    Zero,
    DecimalInteger,
    DecimalPoint,
    DecimalFraction,
    DecimalExponent,
    DecimalExponentSign,
    DecimalExponentInteger,
    String,
    StringEscape,
    StringEscapeUnicode,
    StringEscapeSurrogate,
    StringEscapeSurrogateU,
    Start,
    BeforePropertyName,
    AfterPropertyName,
    BeforePropertyValue,
    BeforeArrayValue,
    AfterPropertyValue,
    AfterArrayValue,
    End,
}

impl From<ParseState> for LexState {
    fn from(state: ParseState) -> Self {
        match state {
            ParseState::Start => LexState::Start,
            ParseState::BeforePropertyName => LexState::BeforePropertyName,
            ParseState::AfterPropertyName => LexState::AfterPropertyName,
            ParseState::BeforePropertyValue => LexState::BeforePropertyValue,
            ParseState::BeforeArrayValue => LexState::BeforeArrayValue,
            ParseState::AfterPropertyValue => LexState::AfterPropertyValue,
            ParseState::AfterArrayValue => LexState::AfterArrayValue,
            ParseState::End => LexState::End,
        }
    }
}

/// What happened after feeding one more character into the literal matcher.
enum LiteralStep {
    NeedMore,
    Done(Token),
    Reject,
}

/// Matches the tail of `null`, `true` or `false` after the first character
/// has identified which literal is expected.
#[derive(Debug, Clone, Copy)]
struct LiteralMatcher(Option<(&'static [u8], &'static str)>);

impl LiteralMatcher {
    fn none() -> Self {
        Self(None)
    }

    fn new(first: char) -> Self {
        match first {
            'n' => Self(Some((b"ull", "null"))),
            't' => Self(Some((b"rue", "true"))),
            'f' => Self(Some((b"alse", "false"))),
            _ => Self::none(),
        }
    }

    fn step(&mut self, c: char) -> LiteralStep {
        let Some((bytes, literal)) = self.0.take() else {
            return LiteralStep::Reject;
        };
        match bytes.split_first() {
            Some((&b, rest)) if b as char == c => {
                if rest.is_empty() {
                    LiteralStep::Done(match literal {
                        "null" => Token::Null,
                        "true" => Token::Boolean(true),
                        _ => Token::Boolean(false),
                    })
                } else {
                    self.0 = Some((rest, literal));
                    LiteralStep::NeedMore
                }
            }
            _ => LiteralStep::Reject,
        }
    }
}

enum EscapeStep {
    NeedMore,
    /// A high surrogate was decoded; the next characters must be the `\u`
    /// introducer of the matching low surrogate.
    NeedLowSurrogate,
    Char(char),
}

/// Accumulates the four hex digits of a `\uXXXX` escape, pairing UTF-16
/// surrogate halves into a single scalar value.
#[derive(Debug)]
struct EscapeBuffer {
    digits: [u8; 4],
    len: u8,
    pending_high: Option<u32>,
}

impl EscapeBuffer {
    fn new() -> Self {
        Self {
            digits: [0; 4],
            len: 0,
            pending_high: None,
        }
    }

    fn reset(&mut self) {
        self.len = 0;
        self.pending_high = None;
    }

    fn feed(&mut self, c: char) -> core::result::Result<EscapeStep, String> {
        if !c.is_ascii_hexdigit() {
            return Err(format!("invalid unicode escape character {c:?}"));
        }
        self.digits[usize::from(self.len)] = c as u8;
        self.len += 1;
        if self.len < 4 {
            return Ok(EscapeStep::NeedMore);
        }
        self.len = 0;

        // The buffer holds ASCII hex digits by construction.
        let hex = core::str::from_utf8(&self.digits).map_err(|e| e.to_string())?;
        let code = u32::from_str_radix(hex, 16).map_err(|e| e.to_string())?;

        if let Some(high) = self.pending_high.take() {
            if !(0xDC00..=0xDFFF).contains(&code) {
                return Err(format!("expected low surrogate, found \\u{code:04X}"));
            }
            let combined = 0x10000 + ((high - 0xD800) << 10) + (code - 0xDC00);
            return char::from_u32(combined)
                .map(EscapeStep::Char)
                .ok_or_else(|| format!("invalid surrogate pair \\u{high:04X}\\u{code:04X}"));
        }
        if (0xD800..=0xDBFF).contains(&code) {
            self.pending_high = Some(code);
            return Ok(EscapeStep::NeedLowSurrogate);
        }
        if (0xDC00..=0xDFFF).contains(&code) {
            return Err(format!("lone low surrogate \\u{code:04X}"));
        }
        char::from_u32(code)
            .map(EscapeStep::Char)
            .ok_or_else(|| format!("invalid unicode escape \\u{code:04X}"))
    }
}

// ------------------------------------------------------------------------------------------------
// Container frames and prefixes
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
enum Frame {
    Object { pending_key: Option<String> },
    Array,
}

#[derive(Debug)]
struct Entry {
    /// The segment under which this container sits in its parent; `None` for
    /// the document root.
    segment: Option<String>,
    frame: Frame,
}

/// Stack of open containers, one entry per `{` or `[` not yet closed.
#[derive(Debug, Default)]
struct FrameStack {
    entries: Vec<Entry>,
}

impl FrameStack {
    fn last_frame(&self) -> Option<&Frame> {
        self.entries.last().map(|e| &e.frame)
    }

    fn last_frame_mut(&mut self) -> Option<&mut Frame> {
        self.entries.last_mut().map(|e| &mut e.frame)
    }

    /// The segment a value pushed right now would occupy: the pending object
    /// key, or `item` inside an array.
    fn child_segment(&self) -> Option<String> {
        self.last_frame().map(|f| match f {
            Frame::Object { pending_key } => pending_key.clone().unwrap_or_default(),
            Frame::Array => "item".to_string(),
        })
    }

    /// The verbatim member key a value pushed right now would occupy, `None`
    /// for array elements and the root. Unlike prefix segments this is never
    /// flattened, so keys containing `.` come through intact.
    fn child_slot(&self) -> Option<String> {
        match self.last_frame() {
            Some(Frame::Object { pending_key }) => pending_key.clone(),
            _ => None,
        }
    }

    fn push(&mut self, frame: Frame) {
        let segment = self.child_segment();
        self.entries.push(Entry { segment, frame });
    }

    fn pop(&mut self) -> Option<Frame> {
        self.entries.pop().map(|e| e.frame)
    }

    /// Prefix of the innermost open container.
    fn prefix(&self) -> Prefix {
        Prefix::from_segments(self.entries.iter().filter_map(|e| e.segment.as_deref()))
    }

    /// Prefix a scalar pushed right now would carry.
    fn child_prefix(&self) -> Prefix {
        let segment = self.child_segment();
        Prefix::from_segments(
            self.entries
                .iter()
                .filter_map(|e| e.segment.as_deref())
                .chain(segment.as_deref()),
        )
    }
}

// ------------------------------------------------------------------------------------------------
// Tokenizer
// ------------------------------------------------------------------------------------------------

/// A streaming JSON tokenizer over a byte stream.
///
/// Implements `Iterator`, yielding [`ParseEvent`]s in document order. The
/// stream is forward-only: events are produced exactly once and the source is
/// never rewound. Invalid JSON surfaces as [`Error::MalformedStream`] and
/// terminates the iteration; read failures surface as [`Error::Read`].
///
/// # Examples
///
/// ```
/// use snowstream::{ParseEvent, Tokenizer};
///
/// let body = std::io::Cursor::new(br#"{"result": {"sys_id": "a1"}}"#.to_vec());
/// let events: Result<Vec<_>, _> = Tokenizer::new(body, 1024).collect();
/// let events = events.unwrap();
/// assert!(matches!(&events[1], ParseEvent::StartMap { prefix, .. } if prefix.is("result")));
/// ```
#[derive(Debug)]
pub struct Tokenizer<R: Read> {
    source: ChunkedSource<R>,

    /// Current position, for error reporting.
    line: usize,
    column: usize,

    parse_state: ParseState,
    lex_state: LexState,

    /// Reused for numbers, literals and strings.
    buffer: String,
    escape_buffer: EscapeBuffer,
    expected_literal: LiteralMatcher,

    frames: FrameStack,
    pending: VecDeque<ParseEvent>,

    done: bool,
    failed: bool,
}

impl<R: Read> core::fmt::Debug for ChunkedSource<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChunkedSource")
            .field("buffered", &self.ring.len())
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl<R: Read> Tokenizer<R> {
    /// Creates a tokenizer reading `reader` in chunks of `chunk_size` bytes.
    #[must_use]
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            source: ChunkedSource::new(reader, chunk_size),
            line: 1,
            column: 1,
            parse_state: ParseState::Start,
            lex_state: LexState::Default,
            buffer: String::new(),
            escape_buffer: EscapeBuffer::new(),
            expected_literal: LiteralMatcher::none(),
            frames: FrameStack::default(),
            pending: VecDeque::new(),
            done: false,
            failed: false,
        }
    }

    fn malformed(&self, message: impl Into<String>) -> Error {
        Error::MalformedStream {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    fn invalid_char(&self, c: Peeked) -> Error {
        match c {
            Peeked::Char(c) => self.malformed(format!("invalid character {c:?}")),
            Peeked::End => self.malformed("unexpected end of input"),
        }
    }

    fn unexpected_eof(&self) -> Error {
        self.malformed("unexpected end of input")
    }

    fn peek(&mut self) -> Result<Peeked> {
        match self.source.peek_char() {
            Ok(Some(c)) => Ok(Peeked::Char(c)),
            Ok(None) => Ok(Peeked::End),
            Err(SourceError::Io(e)) => Err(Error::Read(e)),
            Err(SourceError::InvalidUtf8) => Err(self.malformed("invalid UTF-8 in byte stream")),
        }
    }

    fn advance(&mut self, c: char) {
        self.source.consume(c.len_utf8());
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    // --------------------------------------------------------------------------------------------
    // Lexer
    // --------------------------------------------------------------------------------------------

    fn lex(&mut self) -> Result<Token> {
        self.lex_state = LexState::Default;
        loop {
            let next = self.peek()?;
            let state = self.lex_state;
            if let Some(tok) = self.lex_step(state, next)? {
                return Ok(tok);
            }
        }
    }

    fn produce_string(&mut self) -> Token {
        let value = core::mem::take(&mut self.buffer);
        if self.parse_state == ParseState::BeforePropertyName {
            Token::PropertyName { value }
        } else {
            Token::String(value)
        }
    }

    fn number_token(&mut self) -> Result<Option<Token>> {
        match self.buffer.parse::<f64>() {
            Ok(n) => {
                self.buffer.clear();
                Ok(Some(Token::Number(n)))
            }
            Err(_) => Err(self.malformed("invalid number literal")),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn lex_step(&mut self, state: LexState, next: Peeked) -> Result<Option<Token>> {
        use LexState::*;
        match state {
            Default => match next {
                Peeked::Char(c @ (' ' | '\t' | '\n' | '\r')) => {
                    self.advance(c);
                    Ok(None)
                }
                Peeked::End => Ok(Some(Token::Eof)),
                Peeked::Char(_) => self.lex_step(self.parse_state.into(), next),
            },

            // -------------------------- value entry --------------------------
            Value => match next {
                Peeked::Char(c @ ('{' | '[')) => {
                    self.advance(c);
                    Ok(Some(Token::Punctuator(c as u8)))
                }
                Peeked::Char(c @ ('n' | 't' | 'f')) => {
                    self.advance(c);
                    self.expected_literal = LiteralMatcher::new(c);
                    self.lex_state = ValueLiteral;
                    Ok(None)
                }
                Peeked::Char(c @ '-') => {
                    self.buffer.clear();
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = Sign;
                    Ok(None)
                }
                Peeked::Char(c @ '0') => {
                    self.buffer.clear();
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = Zero;
                    Ok(None)
                }
                Peeked::Char(c) if c.is_ascii_digit() => {
                    self.buffer.clear();
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalInteger;
                    Ok(None)
                }
                Peeked::Char(c @ '"') => {
                    self.advance(c);
                    self.buffer.clear();
                    self.lex_state = String;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            // -------------------------- literals -----------------------------
            ValueLiteral => match next {
                Peeked::Char(c) => match self.expected_literal.step(c) {
                    LiteralStep::NeedMore => {
                        self.advance(c);
                        Ok(None)
                    }
                    LiteralStep::Done(tok) => {
                        self.advance(c);
                        Ok(Some(tok))
                    }
                    LiteralStep::Reject => Err(self.invalid_char(next)),
                },
                Peeked::End => Err(self.unexpected_eof()),
            },

            // -------------------------- numbers ------------------------------
            Sign => match next {
                Peeked::Char(c @ '0') => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = Zero;
                    Ok(None)
                }
                Peeked::Char(c) if c.is_ascii_digit() => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalInteger;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            Zero => match next {
                Peeked::Char(c @ '.') => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalPoint;
                    Ok(None)
                }
                Peeked::Char(c @ ('e' | 'E')) => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalExponent;
                    Ok(None)
                }
                _ => self.number_token(),
            },

            DecimalInteger => match next {
                Peeked::Char(c @ '.') => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalPoint;
                    Ok(None)
                }
                Peeked::Char(c @ ('e' | 'E')) => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalExponent;
                    Ok(None)
                }
                Peeked::Char(c) if c.is_ascii_digit() => {
                    self.advance(c);
                    self.buffer.push(c);
                    Ok(None)
                }
                _ => self.number_token(),
            },

            DecimalPoint => match next {
                Peeked::Char(c) if c.is_ascii_digit() => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalFraction;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            DecimalFraction => match next {
                Peeked::Char(c @ ('e' | 'E')) => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalExponent;
                    Ok(None)
                }
                Peeked::Char(c) if c.is_ascii_digit() => {
                    self.advance(c);
                    self.buffer.push(c);
                    Ok(None)
                }
                _ => self.number_token(),
            },

            DecimalExponent => match next {
                Peeked::Char(c @ ('+' | '-')) => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalExponentSign;
                    Ok(None)
                }
                Peeked::Char(c) if c.is_ascii_digit() => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalExponentInteger;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            DecimalExponentSign => match next {
                Peeked::Char(c) if c.is_ascii_digit() => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = DecimalExponentInteger;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            DecimalExponentInteger => match next {
                Peeked::Char(c) if c.is_ascii_digit() => {
                    self.advance(c);
                    self.buffer.push(c);
                    Ok(None)
                }
                _ => self.number_token(),
            },

            // -------------------------- strings ------------------------------
            String => match next {
                Peeked::Char(c @ '\\') => {
                    self.advance(c);
                    self.lex_state = StringEscape;
                    Ok(None)
                }
                Peeked::Char(c @ '"') => {
                    self.advance(c);
                    Ok(Some(self.produce_string()))
                }
                Peeked::Char(c @ '\0'..='\x1F') => Err(self.invalid_char(Peeked::Char(c))),
                Peeked::Char(c) => {
                    self.advance(c);
                    self.buffer.push(c);
                    Ok(None)
                }
                Peeked::End => Err(self.unexpected_eof()),
            },

            StringEscape => match next {
                Peeked::Char(c @ ('"' | '\\' | '/')) => {
                    self.advance(c);
                    self.buffer.push(c);
                    self.lex_state = String;
                    Ok(None)
                }
                Peeked::Char(c @ ('b' | 'f' | 'n' | 'r' | 't')) => {
                    self.advance(c);
                    self.buffer.push(match c {
                        'b' => '\u{0008}',
                        'f' => '\u{000C}',
                        'n' => '\n',
                        'r' => '\r',
                        _ => '\t',
                    });
                    self.lex_state = String;
                    Ok(None)
                }
                Peeked::Char(c @ 'u') => {
                    self.advance(c);
                    self.escape_buffer.reset();
                    self.lex_state = StringEscapeUnicode;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            StringEscapeUnicode => match next {
                Peeked::Char(c) if c.is_ascii_hexdigit() => {
                    self.advance(c);
                    match self.escape_buffer.feed(c) {
                        Ok(EscapeStep::NeedMore) => Ok(None),
                        Ok(EscapeStep::NeedLowSurrogate) => {
                            self.lex_state = StringEscapeSurrogate;
                            Ok(None)
                        }
                        Ok(EscapeStep::Char(decoded)) => {
                            self.buffer.push(decoded);
                            self.lex_state = String;
                            Ok(None)
                        }
                        Err(msg) => Err(self.malformed(msg)),
                    }
                }
                c => Err(self.invalid_char(c)),
            },

            StringEscapeSurrogate => match next {
                Peeked::Char(c @ '\\') => {
                    self.advance(c);
                    self.lex_state = StringEscapeSurrogateU;
                    Ok(None)
                }
                _ => Err(self.malformed("expected low surrogate escape")),
            },

            StringEscapeSurrogateU => match next {
                Peeked::Char(c @ 'u') => {
                    self.advance(c);
                    self.lex_state = StringEscapeUnicode;
                    Ok(None)
                }
                _ => Err(self.malformed("expected low surrogate escape")),
            },

            // -------------------------- structural ---------------------------
            Start => match next {
                Peeked::Char(c @ ('{' | '[')) => {
                    self.advance(c);
                    Ok(Some(Token::Punctuator(c as u8)))
                }
                _ => {
                    self.lex_state = Value;
                    Ok(None)
                }
            },

            BeforePropertyName => match next {
                Peeked::Char(c @ '}') => {
                    self.advance(c);
                    Ok(Some(Token::Punctuator(b'}')))
                }
                Peeked::Char(c @ '"') => {
                    self.advance(c);
                    self.buffer.clear();
                    self.lex_state = String;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            AfterPropertyName => match next {
                Peeked::Char(c @ ':') => {
                    self.advance(c);
                    Ok(Some(Token::Punctuator(b':')))
                }
                c => Err(self.invalid_char(c)),
            },

            BeforePropertyValue => {
                self.lex_state = Value;
                Ok(None)
            }

            AfterPropertyValue => match next {
                Peeked::Char(c @ (',' | '}')) => {
                    self.advance(c);
                    Ok(Some(Token::Punctuator(c as u8)))
                }
                c => Err(self.invalid_char(c)),
            },

            BeforeArrayValue => match next {
                Peeked::Char(c @ ']') => {
                    self.advance(c);
                    Ok(Some(Token::Punctuator(b']')))
                }
                _ => {
                    self.lex_state = Value;
                    Ok(None)
                }
            },

            AfterArrayValue => match next {
                Peeked::Char(c @ (',' | ']')) => {
                    self.advance(c);
                    Ok(Some(Token::Punctuator(c as u8)))
                }
                c => Err(self.invalid_char(c)),
            },

            End => Err(self.malformed("trailing data after document")),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Parse-state dispatcher
    // --------------------------------------------------------------------------------------------

    fn dispatch(&mut self, token: Token) -> Result<()> {
        use ParseState::*;
        match self.parse_state {
            Start | BeforePropertyValue => self.push_value(token),

            BeforePropertyName => match token {
                Token::PropertyName { value } => {
                    match self.frames.last_frame_mut() {
                        Some(Frame::Object { pending_key }) => *pending_key = Some(value),
                        _ => return Err(self.malformed("property name outside of object")),
                    }
                    self.parse_state = AfterPropertyName;
                    Ok(())
                }
                Token::Punctuator(b'}') => self.pop_frame(),
                _ => Err(self.malformed("expected property name or `}`")),
            },

            AfterPropertyName => match token {
                Token::Punctuator(b':') => {
                    self.parse_state = BeforePropertyValue;
                    Ok(())
                }
                _ => Err(self.malformed("expected `:`")),
            },

            BeforeArrayValue => match token {
                Token::Punctuator(b']') => self.pop_frame(),
                _ => self.push_value(token),
            },

            AfterPropertyValue => match token {
                Token::Punctuator(b',') => {
                    if let Some(Frame::Object { pending_key }) = self.frames.last_frame_mut() {
                        *pending_key = None;
                    }
                    self.parse_state = BeforePropertyName;
                    Ok(())
                }
                Token::Punctuator(b'}') => self.pop_frame(),
                _ => Err(self.malformed("expected `,` or `}`")),
            },

            AfterArrayValue => match token {
                Token::Punctuator(b',') => {
                    self.parse_state = BeforeArrayValue;
                    Ok(())
                }
                Token::Punctuator(b']') => self.pop_frame(),
                _ => Err(self.malformed("expected `,` or `]`")),
            },

            End => Err(self.malformed("trailing data after document")),
        }
    }

    fn push_value(&mut self, token: Token) -> Result<()> {
        match token {
            Token::Punctuator(b'{') => {
                let slot = self.frames.child_slot();
                self.frames.push(Frame::Object { pending_key: None });
                self.pending.push_back(ParseEvent::StartMap {
                    prefix: self.frames.prefix(),
                    slot,
                });
                self.parse_state = ParseState::BeforePropertyName;
                Ok(())
            }
            Token::Punctuator(b'[') => {
                let slot = self.frames.child_slot();
                self.frames.push(Frame::Array);
                self.pending.push_back(ParseEvent::StartArray {
                    prefix: self.frames.prefix(),
                    slot,
                });
                self.parse_state = ParseState::BeforeArrayValue;
                Ok(())
            }
            Token::Null => self.push_scalar(Scalar::Null),
            Token::Boolean(b) => self.push_scalar(Scalar::Boolean(b)),
            Token::Number(n) => self.push_scalar(Scalar::Number(n)),
            Token::String(s) => self.push_scalar(Scalar::String(s)),
            _ => Err(self.malformed("unexpected token")),
        }
    }

    fn push_scalar(&mut self, value: Scalar) -> Result<()> {
        let prefix = self.frames.child_prefix();
        let slot = self.frames.child_slot();
        self.pending.push_back(ParseEvent::Scalar {
            prefix,
            slot,
            value,
        });
        if let Some(Frame::Object { pending_key }) = self.frames.last_frame_mut() {
            *pending_key = None;
        }
        self.settle_parse_state();
        Ok(())
    }

    fn pop_frame(&mut self) -> Result<()> {
        let prefix = self.frames.prefix();
        match self.frames.pop() {
            Some(Frame::Object { .. }) => {
                self.pending.push_back(ParseEvent::EndMap { prefix });
            }
            Some(Frame::Array) => {
                self.pending.push_back(ParseEvent::EndArray { prefix });
            }
            None => return Err(self.malformed("unbalanced closing bracket")),
        }
        self.settle_parse_state();
        Ok(())
    }

    /// Restores the parse state after a value completed, based on the
    /// innermost still-open container.
    fn settle_parse_state(&mut self) {
        self.parse_state = match self.frames.last_frame() {
            None => ParseState::End,
            Some(Frame::Array) => ParseState::AfterArrayValue,
            Some(Frame::Object { .. }) => ParseState::AfterPropertyValue,
        };
    }
}

impl<R: Read> Iterator for Tokenizer<R> {
    type Item = Result<ParseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.failed {
            return None;
        }
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Some(Ok(ev));
            }
            let token = match self.lex() {
                Ok(tok) => tok,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            if matches!(token, Token::Eof) {
                self.done = true;
                if self.parse_state == ParseState::End {
                    return None;
                }
                self.failed = true;
                return Some(Err(self.unexpected_eof()));
            }
            if let Err(e) = self.dispatch(token) {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}
