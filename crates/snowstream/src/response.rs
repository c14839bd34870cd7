//! Response-level API: the HTTP gate and record accessors.
//!
//! [`Response`] wraps a status line and an unread body. Nothing is pulled
//! from the body until records are requested, and the accessors short-circuit
//! as early as the stream allows: [`first`] stops after one record,
//! [`one`] after two.
//!
//! [`first`]: Response::first
//! [`one`]: Response::one

use std::io::Read;

use http::{Method, StatusCode};
use tracing::debug;

use crate::{
    classifier::{Classifier, Record},
    error::{Error, Result},
    tokenizer::{DEFAULT_CHUNK_SIZE, Tokenizer},
};

/// Cap on how much of a non-2xx body is kept for the error message.
const MAX_ERROR_BODY: u64 = 64 * 1024;

/// Knobs for record extraction.
#[derive(Debug, Clone, Copy)]
pub struct ResponseOptions {
    /// Turn an empty result set into [`Error::NoResults`] instead of a
    /// single empty record.
    pub raise_on_empty: bool,
    /// Bytes pulled from the body per read.
    pub chunk_size: usize,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            raise_on_empty: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A server response awaiting interpretation.
///
/// # Examples
///
/// ```
/// use http::{Method, StatusCode};
/// use snowstream::{Response, Result};
///
/// let body = std::io::Cursor::new(br#"{"result": [{"sys_id": "a1"}]}"#.to_vec());
/// let response = Response::new(Method::GET, StatusCode::OK, body);
/// let records = response.all().collect::<Result<Vec<_>>>().unwrap();
/// assert_eq!(records.len(), 1);
/// ```
#[derive(Debug)]
pub struct Response<R: Read> {
    method: Method,
    status: StatusCode,
    body: R,
    options: ResponseOptions,
}

impl<R: Read> Response<R> {
    pub fn new(method: Method, status: StatusCode, body: R) -> Self {
        Self::with_options(method, status, body, ResponseOptions::default())
    }

    pub fn with_options(
        method: Method,
        status: StatusCode,
        body: R,
        options: ResponseOptions,
    ) -> Self {
        Self {
            method,
            status,
            body,
            options,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The lazy record sequence. Nothing is read from the body until the
    /// iterator is pulled, and each pull reads only as far as the next
    /// record's closing brace.
    pub fn all(self) -> Records<R> {
        Records {
            inner: Inner::Gate {
                method: self.method,
                status: self.status,
                body: self.body,
                options: self.options,
            },
        }
    }

    fn all_strict(mut self) -> Records<R> {
        self.options.raise_on_empty = true;
        self.all()
    }

    /// The first record. Empty result sets are an error here regardless of
    /// [`ResponseOptions::raise_on_empty`].
    pub fn first(self) -> Result<Record> {
        match self.all_strict().next() {
            Some(record) => record,
            None => Err(Error::NoResults),
        }
    }

    /// The first record, or `None` when the result set is empty.
    pub fn first_or_none(self) -> Result<Option<Record>> {
        match self.first() {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_no_results() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Exactly one record: [`Error::NoResults`] when there are none,
    /// [`Error::MultipleResults`] when there is more than one.
    pub fn one(self) -> Result<Record> {
        let mut records = self.all_strict();
        let first = match records.next() {
            Some(record) => record?,
            None => return Err(Error::NoResults),
        };
        match records.next() {
            None => Ok(first),
            Some(Ok(_)) => Err(Error::MultipleResults),
            Some(Err(e)) => Err(e),
        }
    }

    /// Like [`one`](Response::one) but an empty result set yields `None`.
    pub fn one_or_none(self) -> Result<Option<Record>> {
        match self.one() {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_no_results() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<R: Read> core::fmt::Display for Response<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "<Response [{} - {}]>", self.status.as_u16(), self.method)
    }
}

#[derive(Debug)]
enum Inner<R: Read> {
    /// Status line not yet examined.
    Gate {
        method: Method,
        status: StatusCode,
        body: R,
        options: ResponseOptions,
    },
    /// Streaming records out of a parsed body.
    Parse(Classifier<Tokenizer<R>>),
    /// Records synthesized without touching the body.
    Fixed(std::vec::IntoIter<Record>),
    /// A gate-level error not yet delivered.
    Failed(Option<Error>),
    Done,
}

/// Iterator over the records of a [`Response`].
#[derive(Debug)]
pub struct Records<R: Read> {
    inner: Inner<R>,
}

impl<R: Read> Records<R> {
    /// Number of parsed records yielded so far. Stays at zero for
    /// synthesized records (deletions, lenient empty results). Named to
    /// stay clear of [`Iterator::count`], which consumes the iterator.
    #[must_use]
    pub fn record_count(&self) -> usize {
        match &self.inner {
            Inner::Parse(classifier) => classifier.record_count(),
            _ => 0,
        }
    }

    fn resolve(
        method: Method,
        status: StatusCode,
        mut body: R,
        options: ResponseOptions,
    ) -> Inner<R> {
        debug!(%method, %status, "interpreting response");
        if method == Method::DELETE && status == StatusCode::NO_CONTENT {
            let mut record = Record::new();
            record.insert("status".to_owned(), "record deleted".into());
            return Inner::Fixed(vec![record].into_iter());
        }
        if status == StatusCode::NOT_FOUND {
            if options.raise_on_empty {
                return Inner::Failed(Some(Error::NoResults));
            }
            return Inner::Fixed(vec![Record::new()].into_iter());
        }
        if !status.is_success() {
            // Best effort: a body that cannot be read still reports the status.
            let mut buf = Vec::new();
            let _ = body.by_ref().take(MAX_ERROR_BODY).read_to_end(&mut buf);
            let body = String::from_utf8_lossy(&buf).into_owned();
            return Inner::Failed(Some(Error::Http { status, body }));
        }
        Inner::Parse(Classifier::new(
            Tokenizer::new(body, options.chunk_size),
            options.raise_on_empty,
        ))
    }
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.inner {
                Inner::Gate { .. } => {
                    let gate = core::mem::replace(&mut self.inner, Inner::Done);
                    let Inner::Gate {
                        method,
                        status,
                        body,
                        options,
                    } = gate
                    else {
                        return None;
                    };
                    self.inner = Self::resolve(method, status, body, options);
                }
                Inner::Parse(classifier) => return classifier.next(),
                Inner::Fixed(iter) => return iter.next().map(Ok),
                Inner::Failed(err) => {
                    let err = err.take();
                    self.inner = Inner::Done;
                    return err.map(Err);
                }
                Inner::Done => return None,
            }
        }
    }
}
