//! Classifies a parse-event stream into server records.
//!
//! A table-API payload has one of three top-level shapes: a `result` key
//! holding a single object, a `result` key holding an array of objects, or an
//! `error` object describing a failure. [`Classifier`] watches the event
//! prefixes for whichever shape appears first, assembles the matching
//! subtrees with [`ObjectBuilder`] and yields each finished record as soon as
//! its closing brace arrives, without waiting for the rest of the stream.

use tracing::debug;

use crate::{
    builder::ObjectBuilder,
    error::{Error, Result},
    event::ParseEvent,
    value::{Map, Value},
};

/// One record from the `result` payload, keyed by field name.
pub type Record = Map;

#[derive(Debug)]
enum State {
    /// Watching top-level prefixes for a `result` or `error` shape.
    Scanning,
    /// Inside `"result": {...}`, assembling the lone record.
    Single(ObjectBuilder),
    /// Inside `"result": [...]`; `item` holds the record currently open.
    Many { item: Option<ObjectBuilder> },
    /// Inside `"error": {...}`, assembling the failure object.
    ErrorShape(ObjectBuilder),
}

/// Streaming record extractor over tokenizer events.
///
/// Yields `Ok(Record)` per completed result record, or a single `Err` for a
/// server error object, a malformed stream, or a payload missing both
/// `result` and `error`. After the event stream ends, the empty-result
/// policy applies: with `raise_on_empty` set, zero records become
/// [`Error::NoResults`]; otherwise a single empty record is yielded and
/// [`record_count`] stays at zero.
///
/// [`record_count`]: Classifier::record_count
#[derive(Debug)]
pub struct Classifier<E> {
    events: E,
    state: State,
    count: usize,
    raise_on_empty: bool,
    saw_result: bool,
    finished: bool,
}

impl<E> Classifier<E>
where
    E: Iterator<Item = Result<ParseEvent>>,
{
    pub fn new(events: E, raise_on_empty: bool) -> Self {
        Self {
            events,
            state: State::Scanning,
            count: 0,
            raise_on_empty,
            saw_result: false,
            finished: false,
        }
    }

    /// Number of records yielded so far. The synthesized empty record of a
    /// lenient empty result is not counted. Named to stay clear of
    /// [`Iterator::count`], which consumes the iterator.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.count
    }

    /// Applies the post-stream policy once the event source is exhausted.
    fn end_of_stream(&mut self) -> Option<Result<Record>> {
        self.finished = true;
        if !self.saw_result {
            return Some(Err(Error::MissingResult));
        }
        if self.count == 0 {
            if self.raise_on_empty {
                return Some(Err(Error::NoResults));
            }
            debug!("empty result set, yielding placeholder record");
            return Some(Ok(Record::new()));
        }
        None
    }

    fn fail(&mut self, err: Error) -> Option<Result<Record>> {
        self.finished = true;
        Some(Err(err))
    }
}

/// Splits a finished error object into its `message` and `detail` fields,
/// rendering non-string values through their JSON form.
fn error_fields(mut map: Map) -> (String, String) {
    let mut field = |key: &str| match map.remove(key) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    (field("message"), field("detail"))
}

impl<E> Iterator for Classifier<E>
where
    E: Iterator<Item = Result<ParseEvent>>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let event = match self.events.next() {
                Some(Ok(ev)) => ev,
                Some(Err(e)) => return self.fail(e),
                None => return self.end_of_stream(),
            };

            match &mut self.state {
                State::Scanning => match &event {
                    ParseEvent::StartMap { prefix, .. } if prefix.is("result") => {
                        debug!("matched single-record result");
                        self.saw_result = true;
                        let mut builder = ObjectBuilder::new();
                        builder.feed(&event);
                        self.state = State::Single(builder);
                    }
                    ParseEvent::StartArray { prefix, .. } if prefix.is("result") => {
                        debug!("matched result array");
                        self.saw_result = true;
                        self.state = State::Many { item: None };
                    }
                    ParseEvent::StartMap { prefix, .. } if prefix.is("error") => {
                        debug!("matched error object");
                        let mut builder = ObjectBuilder::new();
                        builder.feed(&event);
                        self.state = State::ErrorShape(builder);
                    }
                    // Scalars at these keys and unrelated subtrees are
                    // passed over; a scalar `result` leaves the payload
                    // unclassified.
                    _ => {}
                },

                State::Single(builder) => {
                    builder.feed(&event);
                    if builder.is_complete() {
                        let record = builder
                            .take()
                            .and_then(Value::into_object)
                            .unwrap_or_default();
                        self.state = State::Scanning;
                        self.count += 1;
                        return Some(Ok(record));
                    }
                }

                State::Many { item } => match item {
                    Some(builder) => {
                        builder.feed(&event);
                        if builder.is_complete() {
                            let record = builder
                                .take()
                                .and_then(Value::into_object)
                                .unwrap_or_default();
                            *item = None;
                            self.count += 1;
                            return Some(Ok(record));
                        }
                    }
                    None => match &event {
                        ParseEvent::StartMap { prefix, .. } if prefix.is("result.item") => {
                            let mut builder = ObjectBuilder::new();
                            builder.feed(&event);
                            *item = Some(builder);
                        }
                        ParseEvent::EndArray { prefix } if prefix.is("result") => {
                            self.state = State::Scanning;
                        }
                        // Scalar and array elements carry no record shape.
                        _ => {}
                    },
                },

                State::ErrorShape(builder) => {
                    builder.feed(&event);
                    if builder.is_complete() {
                        let map = builder
                            .take()
                            .and_then(Value::into_object)
                            .unwrap_or_default();
                        let (message, detail) = error_fields(map);
                        debug!(%message, "server reported an error");
                        return self.fail(Error::Response { message, detail });
                    }
                }
            }
        }
    }
}
