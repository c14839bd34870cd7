#![allow(missing_docs)]
use std::io::{Cursor, Read};

use http::{Method, StatusCode};
use quickcheck::{QuickCheck, TestResult};
use rstest::rstest;
use serde_json::json;
use snowstream::{Error, Map, Record, Response, ResponseOptions, Result, Value};

fn resp(method: Method, status: StatusCode, body: &str) -> Response<Cursor<Vec<u8>>> {
    Response::new(method, status, Cursor::new(body.as_bytes().to_vec()))
}

fn resp_strict(method: Method, status: StatusCode, body: &str) -> Response<Cursor<Vec<u8>>> {
    Response::with_options(
        method,
        status,
        Cursor::new(body.as_bytes().to_vec()),
        ResponseOptions {
            raise_on_empty: true,
            ..ResponseOptions::default()
        },
    )
}

fn rec(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), Value::String((*v).to_owned())))
        .collect()
}

#[test]
fn array_result_preserves_order() {
    let body = json!({"result": [
        {"sys_id": "a", "number": "INC001"},
        {"sys_id": "b", "number": "INC002"},
        {"sys_id": "c", "number": "INC003"},
    ]})
    .to_string();
    let records = resp(Method::GET, StatusCode::OK, &body).all().collect::<Result<Vec<_>>>().unwrap();
    assert_eq!(
        records,
        vec![
            rec(&[("sys_id", "a"), ("number", "INC001")]),
            rec(&[("sys_id", "b"), ("number", "INC002")]),
            rec(&[("sys_id", "c"), ("number", "INC003")]),
        ]
    );
}

#[test]
fn single_object_result() {
    let body = r#"{"result": {"sys_id": "a1", "active": true}}"#;
    let records = resp(Method::GET, StatusCode::OK, body).all().collect::<Result<Vec<_>>>().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("active"), Some(&Value::Boolean(true)));
}

#[test]
fn empty_result_lenient_yields_one_empty_record() {
    let records = resp(Method::GET, StatusCode::OK, r#"{"result": []}"#)
        .all()
        .collect::<Result<Vec<_>>>()
        .unwrap();
    assert_eq!(records, vec![Map::new()]);
}

#[test]
fn empty_result_strict_is_no_results() {
    let err = resp_strict(Method::GET, StatusCode::OK, r#"{"result": []}"#)
        .all()
        .collect::<Result<Vec<_>>>()
        .unwrap_err();
    assert!(matches!(err, Error::NoResults));
}

#[test]
fn error_object_raises_with_message_and_detail() {
    let body = json!({
        "error": {
            "message": "User Not Authenticated",
            "detail": "Required to provide Auth information"
        },
        "status": "failure"
    })
    .to_string();
    match resp(Method::GET, StatusCode::OK, &body).all().collect::<Result<Vec<_>>>() {
        Err(Error::Response { message, detail }) => {
            assert_eq!(message, "User Not Authenticated");
            assert_eq!(detail, "Required to provide Auth information");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn payload_without_result_or_error_is_missing_result() {
    let err = resp(Method::GET, StatusCode::OK, r#"{"unexpected": 1}"#)
        .all()
        .collect::<Result<Vec<_>>>()
        .unwrap_err();
    assert!(matches!(err, Error::MissingResult));
}

#[test]
fn one_accepts_exactly_one_record() {
    let record = resp(Method::GET, StatusCode::OK, r#"{"result": [{"sys_id": "a"}]}"#)
        .one()
        .unwrap();
    assert_eq!(record, rec(&[("sys_id", "a")]));
}

#[test]
fn one_rejects_two_records() {
    let err = resp(
        Method::GET,
        StatusCode::OK,
        r#"{"result": [{"sys_id": "a"}, {"sys_id": "b"}]}"#,
    )
    .one()
    .unwrap_err();
    assert!(matches!(err, Error::MultipleResults));
}

#[test]
fn one_rejects_empty() {
    let err = resp(Method::GET, StatusCode::OK, r#"{"result": []}"#)
        .one()
        .unwrap_err();
    assert!(matches!(err, Error::NoResults));
}

#[test]
fn one_or_none_maps_empty_to_none() {
    let found = resp(Method::GET, StatusCode::OK, r#"{"result": []}"#)
        .one_or_none()
        .unwrap();
    assert_eq!(found, None);

    let err = resp(
        Method::GET,
        StatusCode::OK,
        r#"{"result": [{"a": "1"}, {"a": "2"}]}"#,
    )
    .one_or_none()
    .unwrap_err();
    assert!(matches!(err, Error::MultipleResults));
}

#[test]
fn first_returns_the_first_of_many() {
    let record = resp(
        Method::GET,
        StatusCode::OK,
        r#"{"result": [{"sys_id": "a"}, {"sys_id": "b"}]}"#,
    )
    .first()
    .unwrap();
    assert_eq!(record, rec(&[("sys_id", "a")]));
}

#[test]
fn first_is_strict_about_empty() {
    let err = resp(Method::GET, StatusCode::OK, r#"{"result": []}"#)
        .first()
        .unwrap_err();
    assert!(matches!(err, Error::NoResults));

    let found = resp(Method::GET, StatusCode::OK, r#"{"result": []}"#)
        .first_or_none()
        .unwrap();
    assert_eq!(found, None);
}

#[test]
fn delete_no_content_reports_deletion() {
    let records = resp(Method::DELETE, StatusCode::NO_CONTENT, "")
        .all()
        .collect::<Result<Vec<_>>>()
        .unwrap();
    assert_eq!(records, vec![rec(&[("status", "record deleted")])]);
}

#[test]
fn not_found_follows_empty_policy() {
    let records = resp(Method::GET, StatusCode::NOT_FOUND, "").all().collect::<Result<Vec<_>>>().unwrap();
    assert_eq!(records, vec![Map::new()]);

    let err = resp_strict(Method::GET, StatusCode::NOT_FOUND, "")
        .all()
        .collect::<Result<Vec<_>>>()
        .unwrap_err();
    assert!(matches!(err, Error::NoResults));
}

#[test]
fn non_success_status_carries_body_text() {
    let err = resp(
        Method::POST,
        StatusCode::FORBIDDEN,
        "operation not permitted",
    )
    .all()
    .collect::<Result<Vec<_>>>()
    .unwrap_err();
    match err {
        Error::Http { status, body } => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(body, "operation not permitted");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn record_count_reflects_yielded_records() {
    let body = r#"{"result": [{"a": "1"}, {"a": "2"}]}"#;
    let mut records = resp(Method::GET, StatusCode::OK, body).all();
    assert_eq!(records.record_count(), 0);
    assert!(records.next().is_some());
    assert_eq!(records.record_count(), 1);
    assert!(records.next().is_some());
    assert!(records.next().is_none());
    assert_eq!(records.record_count(), 2);
    // Exhausting the iterator again does not disturb the tally.
    assert!(records.next().is_none());
    assert_eq!(records.record_count(), 2);
}

#[test]
fn record_count_stays_zero_for_synthesized_records() {
    let mut records = resp(Method::DELETE, StatusCode::NO_CONTENT, "").all();
    assert!(records.next().is_some());
    assert_eq!(records.record_count(), 0);

    let mut records = resp(Method::GET, StatusCode::OK, r#"{"result": []}"#).all();
    assert!(records.next().is_some());
    assert_eq!(records.record_count(), 0);
}

#[test]
fn field_names_containing_dots_survive() {
    let body = r#"{"result": [{"a.b": "v", "u_custom.field": {"x.y": "z"}}]}"#;
    let records = resp(Method::GET, StatusCode::OK, body)
        .all()
        .collect::<Result<Vec<_>>>()
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].get("a.b"),
        Some(&Value::String("v".to_owned()))
    );
    let nested = records[0]
        .get("u_custom.field")
        .and_then(Value::as_object)
        .unwrap();
    assert_eq!(nested.get("x.y"), Some(&Value::String("z".to_owned())));
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(16)]
#[case(1024)]
#[case(4096)]
fn chunk_size_never_changes_records(#[case] chunk_size: usize) {
    let body = json!({"result": [
        {"short_description": "naïve café ☕", "priority": "1"},
        {"short_description": "обычный инцидент", "priority": "2"},
        {"short_description": "絵文字 😀 включено", "priority": "3"},
    ]})
    .to_string();
    let response = Response::with_options(
        Method::GET,
        StatusCode::OK,
        Cursor::new(body.into_bytes()),
        ResponseOptions {
            raise_on_empty: false,
            chunk_size,
        },
    );
    let records = response.all().collect::<Result<Vec<_>>>().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records[2].get("short_description").and_then(Value::as_str),
        Some("絵文字 😀 включено")
    );
}

/// A reader that serves a fixed prefix and then fails, to prove how much of
/// the body an accessor actually needed.
struct TruncatedReader {
    data: Cursor<Vec<u8>>,
}

impl TruncatedReader {
    fn new(prefix: &str) -> Self {
        Self {
            data: Cursor::new(prefix.as_bytes().to_vec()),
        }
    }
}

impl Read for TruncatedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.data.read(buf)?;
        if n == 0 {
            return Err(std::io::Error::other("read past available prefix"));
        }
        Ok(n)
    }
}

#[test]
fn first_does_not_read_past_the_first_record() {
    // The body breaks off right after the first record closes.
    let reader = TruncatedReader::new(r#"{"result": [{"sys_id": "early"}"#);
    let record = Response::new(Method::GET, StatusCode::OK, reader)
        .all()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(record, rec(&[("sys_id", "early")]));
}

#[test]
fn read_failure_mid_stream_surfaces() {
    let reader = TruncatedReader::new(r#"{"result": [{"sys_id": "early"}"#);
    let mut records = Response::new(Method::GET, StatusCode::OK, reader).all();
    assert!(records.next().unwrap().is_ok());
    assert!(matches!(records.next(), Some(Err(Error::Read(_)))));
}

/// Property: any set of string-field records survives a round trip through
/// the envelope at any chunk size, in order.
#[test]
fn record_roundtrip_quickcheck() {
    fn prop(fields: Vec<Vec<(String, String)>>, chunk_seed: usize) -> TestResult {
        if fields.is_empty() {
            return TestResult::discard();
        }
        let expected: Vec<Record> = fields
            .iter()
            .map(|pairs| {
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect()
            })
            .collect();
        let items: Vec<Value> = expected.iter().cloned().map(Value::Object).collect();
        let mut envelope = Map::new();
        envelope.insert("result".to_owned(), Value::Array(items));
        let body = Value::Object(envelope).to_string();

        let chunk_size = 1 + chunk_seed % 64;
        let response = Response::with_options(
            Method::GET,
            StatusCode::OK,
            Cursor::new(body.into_bytes()),
            ResponseOptions {
                raise_on_empty: true,
                chunk_size,
            },
        );
        match response.all().collect::<Result<Vec<_>>>() {
            Ok(records) => TestResult::from_bool(records == expected),
            Err(_) => TestResult::failed(),
        }
    }
    QuickCheck::new()
        .tests(200)
        .quickcheck(prop as fn(Vec<Vec<(String, String)>>, usize) -> TestResult);
}

/// Property: every Rust string survives JSON escaping and re-parsing as a
/// field value, including control characters and astral-plane scalars.
#[quickcheck_macros::quickcheck]
fn string_field_roundtrip(value: String) -> bool {
    let mut record = Map::new();
    record.insert("field".to_owned(), Value::String(value.clone()));
    let mut envelope = Map::new();
    envelope.insert("result".to_owned(), Value::Array(vec![Value::Object(record)]));
    let body = Value::Object(envelope).to_string();

    let records = resp(Method::GET, StatusCode::OK, &body).all().collect::<Result<Vec<_>>>().unwrap();
    records[0].get("field").and_then(Value::as_str) == Some(value.as_str())
}

/// Cross-check our reading of a nested document against serde_json's.
#[test]
fn agrees_with_serde_json_on_nested_fields() {
    let doc = json!({"result": [{
        "sys_id": "a1",
        "assigned_to": {"link": "https://instance/api/now/table/sys_user/u1", "value": "u1"},
        "tags": ["vip", "network"]
    }]});
    let body = doc.to_string();
    let records = resp(Method::GET, StatusCode::OK, &body).all().collect::<Result<Vec<_>>>().unwrap();
    let record = &records[0];

    let reference = &doc["result"][0];
    assert_eq!(
        record
            .get("assigned_to")
            .and_then(Value::as_object)
            .and_then(|m| m.get("value"))
            .and_then(Value::as_str),
        reference["assigned_to"]["value"].as_str()
    );
    match record.get("tags") {
        Some(Value::Array(tags)) => {
            let ours: Vec<&str> = tags.iter().filter_map(Value::as_str).collect();
            assert_eq!(ours, vec!["vip", "network"]);
        }
        other => panic!("unexpected tags value: {other:?}"),
    }
}
