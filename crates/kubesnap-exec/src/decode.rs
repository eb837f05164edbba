use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ExecError;

/// Longest slice of raw output attached to a decode error
const MAX_PAYLOAD: usize = 4096;

/// Decode command output as JSON
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ExecError> {
    serde_json::from_slice(bytes).map_err(|e| decode_error(e.to_string(), bytes))
}

/// Decode the value found at a JSON pointer (e.g. "/items") in command output
pub fn decode_at<T: DeserializeOwned>(bytes: &[u8], pointer: &str) -> Result<T, ExecError> {
    let mut root: Value = decode_json(bytes)?;
    let value = root
        .pointer_mut(pointer)
        .map(Value::take)
        .ok_or_else(|| decode_error(format!("missing field at {pointer}"), bytes))?;

    serde_json::from_value(value).map_err(|e| decode_error(format!("{pointer}: {e}"), bytes))
}

fn decode_error(message: String, bytes: &[u8]) -> ExecError {
    let mut payload = String::from_utf8_lossy(bytes).into_owned();
    if payload.len() > MAX_PAYLOAD {
        let mut end = MAX_PAYLOAD;
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        payload.truncate(end);
    }

    ExecError::Decode {
        message,
        output: (!payload.is_empty()).then_some(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
    }

    #[test]
    fn test_decode_at_items() {
        let json = br#"{"kind":"List","items":[{"name":"a"},{"name":"b"}]}"#;
        let items: Vec<Item> = decode_at(json, "/items").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name, "b");
    }

    #[test]
    fn test_decode_at_missing_pointer() {
        let err = decode_at::<Vec<Item>>(br#"{"kind":"List"}"#, "/items").unwrap_err();
        assert!(matches!(err, ExecError::Decode { .. }));
        assert!(err.message().contains("/items"));
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let err = decode_json::<Vec<Item>>(b"error: the server doesn't have a resource type")
            .unwrap_err();
        match err {
            ExecError::Decode { output, .. } => {
                assert!(output.unwrap().starts_with("error:"));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
