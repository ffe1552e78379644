use anyhow::Result;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

use crate::error::ParseError;

/// Parses a response body, reporting syntax errors with their location.
pub fn decode_document(url: &str, text: &str) -> Result<Value> {
    serde_json::from_str::<Value>(text).map_err(|err| {
        ParseError::new(
            url,
            format!("{err} (line {}, column {})", err.line(), err.column()),
        )
        .into()
    })
}

pub fn encode_with_indent(value: &Value, indent: &[u8]) -> Result<String> {
    if indent.is_empty() {
        return Ok(serde_json::to_string(value)?);
    }
    let formatter = PrettyFormatter::with_indent(indent);
    let mut buf = Vec::new();
    {
        let mut serializer = Serializer::with_formatter(&mut buf, formatter);
        value.serialize(&mut serializer)?;
    }
    Ok(String::from_utf8(buf)?)
}

/// Tab-indented source text handed to the JSON editor.
pub fn editor_source(value: &Value) -> Result<String> {
    encode_with_indent(value, b"\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn editor_source_uses_tabs() {
        let text = editor_source(&json!({ "catalog": { "uuid": "c-1" } })).unwrap();
        assert!(text.contains("\n\t\"catalog\""));
        assert!(text.contains("\n\t\t\"uuid\": \"c-1\""));
    }

    #[test]
    fn compact_when_no_indent() {
        assert_eq!(encode_with_indent(&json!({ "a": 1 }), b"").unwrap(), "{\"a\":1}");
    }

    #[test]
    fn decode_reports_location() {
        let err = decode_document("mem://broken", "{\n  \"a\": }").unwrap_err();
        let parse = err.downcast_ref::<ParseError>().unwrap();
        assert_eq!(parse.url, "mem://broken");
        assert!(parse.message.contains("line 2"));
    }
}
