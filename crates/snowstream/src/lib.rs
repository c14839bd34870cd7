//! Streaming interpreter for ServiceNow table-API responses.
//!
//! The server answers every table operation with a JSON envelope: a `result`
//! key holding one record or an array of records, or an `error` object when
//! the request failed. This crate reads that envelope incrementally off any
//! [`std::io::Read`] body and yields records as soon as each one closes,
//! without buffering the rest of the stream.
//!
//! The layers, bottom up:
//!
//! - [`Tokenizer`] lexes the body in bounded chunks into prefix-tagged
//!   [`ParseEvent`]s (`result`, `result.item`, `error`, ...).
//! - [`Classifier`] watches the prefixes for the response shape and
//!   assembles each record with [`ObjectBuilder`].
//! - [`Response`] applies HTTP-level rules first (a `DELETE` answered with
//!   204 becomes a synthetic deletion record, 404 an empty result set, other
//!   non-2xx statuses an error carrying the body) and exposes the accessors
//!   [`all`], [`first`], [`one`] and their `_or_none` variants.
//!
//! ```
//! use http::{Method, StatusCode};
//! use snowstream::Response;
//!
//! let body = std::io::Cursor::new(
//!     br#"{"result": [{"sys_id": "a1"}, {"sys_id": "b2"}]}"#.to_vec(),
//! );
//! let records = Response::new(Method::GET, StatusCode::OK, body)
//!     .all()
//!     .collect::<snowstream::Result<Vec<_>>>()
//!     .unwrap();
//! assert_eq!(records.len(), 2);
//! ```
//!
//! [`all`]: Response::all
//! [`first`]: Response::first
//! [`one`]: Response::one

mod builder;
mod classifier;
mod error;
mod event;
mod response;
mod tokenizer;
mod value;

pub use builder::ObjectBuilder;
pub use classifier::{Classifier, Record};
pub use error::{Error, Result};
pub use event::{ParseEvent, Prefix, Scalar};
pub use response::{Records, Response, ResponseOptions};
pub use tokenizer::{DEFAULT_CHUNK_SIZE, Tokenizer};
pub use value::{Array, Map, Value};
