//! Events emitted by the streaming tokenizer.
//!
//! Each [`ParseEvent`] carries a [`Prefix`], the dotted structural path of the
//! event relative to the document root. Object members contribute their key as
//! a segment; array elements contribute the literal segment `item`. The root
//! container has the empty prefix, the `result` object the prefix `result`,
//! and an element of a `result` array the prefix `result.item`.
//!
//! Events are produced in document order and consumed exactly once; the
//! underlying stream is forward-only and never replayed.

use crate::value::Value;

/// The dotted structural path of a parse event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Prefix(String);

impl Prefix {
    /// The empty prefix of the document root.
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Joins path segments with `.` into a prefix.
    pub fn from_segments<'a, I>(segments: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = String::new();
        for seg in segments {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(seg);
        }
        Self(out)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact prefix equality.
    #[must_use]
    pub fn is(&self, other: &str) -> bool {
        self.0 == other
    }

    /// Segment-aware containment: `true` when this prefix is `base` itself or
    /// lies strictly below it. `result.item` is within `result`, while
    /// `results` is not.
    #[must_use]
    pub fn within(&self, base: &str) -> bool {
        if base.is_empty() {
            return true;
        }
        if !self.0.starts_with(base) {
            return false;
        }
        match self.0.as_bytes().get(base.len()) {
            None => true,
            Some(b'.') => true,
            Some(_) => false,
        }
    }
}

impl From<&str> for Prefix {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl core::fmt::Display for Prefix {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A leaf value carried by a [`ParseEvent::Scalar`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Null => Value::Null,
            Scalar::Boolean(b) => Value::Boolean(b),
            Scalar::Number(n) => Value::Number(n),
            Scalar::String(s) => Value::String(s),
        }
    }
}

/// One structural event from the tokenizer.
///
/// Events that open a value carry `slot`: the verbatim member key under which
/// the value sits in its enclosing object, or `None` for array elements and
/// the document root. The prefix flattens keys into a dotted path for shape
/// matching; `slot` is the authoritative key text and survives keys that
/// themselves contain dots.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    /// An object opened at `prefix`.
    StartMap { prefix: Prefix, slot: Option<String> },
    /// The object at `prefix` closed.
    EndMap { prefix: Prefix },
    /// An array opened at `prefix`.
    StartArray { prefix: Prefix, slot: Option<String> },
    /// The array at `prefix` closed.
    EndArray { prefix: Prefix },
    /// A leaf value at `prefix`.
    Scalar {
        prefix: Prefix,
        slot: Option<String>,
        value: Scalar,
    },
}

impl ParseEvent {
    /// The structural path of this event.
    #[must_use]
    pub fn prefix(&self) -> &Prefix {
        match self {
            ParseEvent::StartMap { prefix, .. }
            | ParseEvent::EndMap { prefix }
            | ParseEvent::StartArray { prefix, .. }
            | ParseEvent::EndArray { prefix }
            | ParseEvent::Scalar { prefix, .. } => prefix,
        }
    }
}
