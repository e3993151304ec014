// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record augmentation: parse a raw JSON object, stamp it with the arrival time and serialize
//! it back to bytes ready for delivery.

use crate::errors::AugmentError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Field overwritten with the arrival time of every record.
pub const TIMESTAMP_FIELD: &str = "Timestamp";

/// Stamps `raw` with the current time. See [`augment_at`].
pub fn augment(raw: &[u8]) -> Result<Vec<u8>, AugmentError> {
    augment_at(raw, Utc::now())
}

/// Parses `raw` as a JSON object, sets [`TIMESTAMP_FIELD`] to `now` formatted as RFC 3339
/// (UTC, second precision) and re-serializes the object.
///
/// Every other field is kept as received. Numbers keep their exact textual form. The output
/// never contains a literal newline, so it can be stored as a single spool line.
pub fn augment_at(raw: &[u8], now: DateTime<Utc>) -> Result<Vec<u8>, AugmentError> {
    let mut record = match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(AugmentError::MalformedRecord(format!(
                "expected a JSON object, found {}",
                kind(&other)
            )))
        }
        Err(e) => return Err(AugmentError::MalformedRecord(e.to_string())),
    };

    record.insert(
        TIMESTAMP_FIELD.to_string(),
        Value::String(format_timestamp(now)),
    );

    serde_json::to_vec(&record).map_err(AugmentError::Serialization)
}

/// RFC 3339 with a `Z` suffix, e.g. `2024-05-01T12:00:00Z`.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap()
    }

    fn parse(bytes: &[u8]) -> Map<String, Value> {
        match serde_json::from_slice(bytes).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_adds_timestamp_and_keeps_fields() {
        let out = augment_at(br#"{"id":1,"name":"door","tags":["a","b"]}"#, fixed_time()).unwrap();
        let record = parse(&out);

        assert_eq!(record.len(), 4);
        assert_eq!(record["id"], json!(1));
        assert_eq!(record["name"], json!("door"));
        assert_eq!(record["tags"], json!(["a", "b"]));
        assert_eq!(record[TIMESTAMP_FIELD], json!("2024-05-01T12:30:45Z"));
    }

    #[test]
    fn test_overwrites_existing_timestamp() {
        let out = augment_at(
            br#"{"Timestamp":"1999-01-01T00:00:00Z","id":7}"#,
            fixed_time(),
        )
        .unwrap();
        let record = parse(&out);

        assert_eq!(record.len(), 2);
        assert_eq!(record[TIMESTAMP_FIELD], json!("2024-05-01T12:30:45Z"));
    }

    #[test]
    fn test_overwrites_non_string_timestamp() {
        let out = augment_at(br#"{"Timestamp":{"nested":true}}"#, fixed_time()).unwrap();
        assert_eq!(parse(&out)[TIMESTAMP_FIELD], json!("2024-05-01T12:30:45Z"));
    }

    #[test]
    fn test_rejects_non_objects() {
        let inputs: [&[u8]; 5] = [b"[1,2,3]", b"42", b"\"text\"", b"null", b"true"];
        for raw in inputs {
            match augment(raw) {
                Err(AugmentError::MalformedRecord(msg)) => {
                    assert!(msg.starts_with("expected a JSON object"), "{msg}")
                }
                other => panic!("expected MalformedRecord for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(matches!(
            augment(b"{\"id\":"),
            Err(AugmentError::MalformedRecord(_))
        ));
        assert!(matches!(
            augment(b"not json"),
            Err(AugmentError::MalformedRecord(_))
        ));
        assert!(matches!(augment(b""), Err(AugmentError::MalformedRecord(_))));
    }

    #[test]
    fn test_preserves_large_numbers_exactly() {
        let out = augment_at(
            br#"{"big":123456789012345678901234567890,"pi":3.14159265358979323846}"#,
            fixed_time(),
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("123456789012345678901234567890"));
        assert!(text.contains("3.14159265358979323846"));
    }

    #[test]
    fn test_output_is_single_line() {
        let out = augment_at(
            b"{\n  \"msg\": \"line one\\nline two\"\n}",
            fixed_time(),
        )
        .unwrap();

        assert!(!out.contains(&b'\n'));
        assert_eq!(parse(&out)["msg"], json!("line one\nline two"));
    }

    #[test]
    fn test_format_timestamp_is_rfc3339_utc() {
        assert_eq!(format_timestamp(fixed_time()), "2024-05-01T12:30:45Z");
        let parsed = DateTime::parse_from_rfc3339(&format_timestamp(Utc::now()));
        assert!(parsed.is_ok());
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 \\n\"]{0,16}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn prop_augment_only_touches_timestamp(
            fields in proptest::collection::btree_map("[a-zA-Z_]{1,12}", json_leaf(), 0..12)
        ) {
            let input: Map<String, Value> = fields.into_iter().collect();
            let raw = serde_json::to_vec(&input).unwrap();

            let out = parse(&augment(&raw).unwrap());

            let added = usize::from(!input.contains_key(TIMESTAMP_FIELD));
            prop_assert_eq!(out.len(), input.len() + added);
            prop_assert!(out[TIMESTAMP_FIELD].is_string());
            for (key, value) in &input {
                if key != TIMESTAMP_FIELD {
                    prop_assert_eq!(&out[key], value);
                }
            }
        }
    }
}
