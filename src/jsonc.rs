//! JSON-with-comments codec for localization files.
//!
//! Mod authors occasionally leave `//`, `#` or `/* */` comments in
//! `en_us.json`.
//! Comments are removed before structural parsing, and key order is kept
//! (serde_json is built with `preserve_order`).

use crate::error::{PipelineError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::Path;

/// Ordered key → text mapping of one locale.
pub type LocalizationMap = Map<String, Value>;

/// Indentation used for localization files written to disk and sent to the model
pub const DEFAULT_INDENT: usize = 4;

/// Strip single-line (`//`, `#`) and multi-line (`/* */`) comments outside of
/// string literals. Newlines inside comments are kept so error positions still
/// point at the right line.
pub fn strip_comments(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(ch) = chars.next() {
        if escape_next {
            result.push(ch);
            escape_next = false;
            continue;
        }

        if in_string {
            if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            }
            result.push(ch);
            continue;
        }

        if ch == '"' {
            in_string = true;
            result.push(ch);
            continue;
        }

        if ch == '#' {
            skip_line(&mut chars, &mut result);
            continue;
        }

        if ch == '/' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    skip_line(&mut chars, &mut result);
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut prev = ' ';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        if c == '\n' {
                            result.push('\n');
                        }
                        prev = c;
                    }
                    continue;
                }
                _ => {}
            }
        }

        result.push(ch);
    }

    result
}

/// Consume the rest of a line comment, keeping its newline.
fn skip_line(chars: &mut impl Iterator<Item = char>, result: &mut String) {
    for c in chars {
        if c == '\n' {
            result.push('\n');
            break;
        }
    }
}

/// Parse commented JSON text into an ordered mapping.
///
/// The top-level value must be an object.
pub fn parse(text: &str) -> Result<LocalizationMap> {
    let cleaned = strip_comments(text.trim_start_matches('\u{feff}'));

    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| PipelineError::MalformedJson(format!("Invalid JSON syntax: {}", e)))?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(PipelineError::MalformedJson(format!(
            "Expected a JSON object at the top level, found {}",
            value_kind(&other)
        ))),
    }
}

/// Serialize a mapping as canonical JSON: no comments, insertion order,
/// non-ASCII characters written literally, `indent` spaces per level.
pub fn serialize(map: &LocalizationMap, indent: usize) -> Result<String> {
    let indent_str = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent_str.as_bytes());
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);

    map.serialize(&mut serializer)
        .map_err(|e| PipelineError::MalformedJson(format!("Failed to serialize JSON: {}", e)))?;

    String::from_utf8(buf)
        .map_err(|e| PipelineError::MalformedJson(format!("Serialized JSON is not UTF-8: {}", e)))
}

/// Read and parse a localization file. Content that is not UTF-8 is
/// malformed, not a filesystem failure.
pub fn read_file(path: &Path) -> Result<LocalizationMap> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::InvalidData => PipelineError::MalformedJson(format!(
            "{} is not valid UTF-8: {}",
            path.display(),
            e
        )),
        _ => PipelineError::filesystem(path, e),
    })?;
    parse(&content)
}

/// Write a mapping to `path` using the default indentation.
pub fn write_file(path: &Path, map: &LocalizationMap) -> Result<()> {
    let text = serialize(map, DEFAULT_INDENT)?;
    fs::write(path, text).map_err(|e| PipelineError::filesystem(path, e))
}

fn value_kind(value: &Value) -> &'static str {
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
    use proptest::prelude::*;

    // ==================== Comment Stripping Tests ====================

    #[test]
    fn test_strip_line_comment() {
        let input = "{\n  // header\n  \"a\": \"b\"\n}";
        let stripped = strip_comments(input);
        assert!(!stripped.contains("header"));
        assert!(stripped.contains("\"a\": \"b\""));
    }

    #[test]
    fn test_strip_block_comment_keeps_newlines() {
        let input = "{ /* one\ntwo */ \"a\": 1 }";
        let stripped = strip_comments(input);
        assert!(!stripped.contains("one"));
        assert_eq!(stripped.matches('\n').count(), 1);
    }

    #[test]
    fn test_comment_markers_inside_strings_are_kept() {
        let input = r#"{"url": "https://example.com/a", "glob": "/* not a comment */"}"#;
        assert_eq!(strip_comments(input), input);
    }

    #[test]
    fn test_escaped_quote_does_not_end_string() {
        let input = r#"{"q": "say \"// hi\""}"#;
        assert_eq!(strip_comments(input), input);
    }

    // ==================== Parse Tests ====================

    #[test]
    fn test_parse_commented_file() {
        let text = r##"{
    // Items
    "item.mod1.sword": "Iron Sword", /* trailing */
    # Tools
    "item.mod1.axe": "Iron Axe", # trailing hash
    "item.mod1.tag": "#1 Pick"
}"##;
        let map = parse(text).expect("Should parse");
        assert_eq!(map.len(), 3);
        assert_eq!(map["item.mod1.tag"], "#1 Pick");
        assert_eq!(map["item.mod1.sword"], "Iron Sword");
    }

    #[test]
    fn test_parse_preserves_key_order() {
        let map = parse(r#"{"z": "1", "a": "2", "m": "3"}"#).expect("Should parse");
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_parse_tolerates_bom() {
        let map = parse("\u{feff}{\"a\": \"b\"}").expect("Should parse");
        assert_eq!(map["a"], "b");
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = parse("{\"a\": ").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedJson(_)));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = parse("[1, 2, 3]").unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    // ==================== Serialize Tests ====================

    #[test]
    fn test_serialize_writes_unicode_literally() {
        let map = parse(r#"{"a": "안녕"}"#).unwrap();
        let text = serialize(&map, 4).unwrap();
        assert!(text.contains("안녕"));
        assert!(!text.contains("\\u"));
    }

    #[test]
    fn test_serialize_uses_requested_indent() {
        let map = parse(r#"{"a": "b"}"#).unwrap();
        assert_eq!(serialize(&map, 4).unwrap(), "{\n    \"a\": \"b\"\n}");
        assert_eq!(serialize(&map, 2).unwrap(), "{\n  \"a\": \"b\"\n}");
    }

    #[test]
    fn test_serialize_drops_comments() {
        let map = parse("{ // note\n \"a\": \"b\" }").unwrap();
        assert!(!serialize(&map, 4).unwrap().contains("note"));
    }

    // ==================== File Tests ====================

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ko_kr.json");
        let map = parse(r#"{"item.mod1.sword": "철 검"}"#).unwrap();

        write_file(&path, &map).unwrap();
        assert_eq!(read_file(&path).unwrap(), map);
    }

    #[test]
    fn test_read_non_utf8_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en_us.json");
        fs::write(&path, b"{\"a\": \"\xff\xfe\"}").unwrap();

        let err = read_file(&path).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedJson(_)));
    }

    #[test]
    fn test_read_missing_file_is_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Filesystem { .. }));
    }

    // ==================== Property Tests ====================

    proptest! {
        #[test]
        fn prop_serialize_parse_preserves_entries(
            entries in proptest::collection::vec(("[a-z._]{1,12}", "\\PC{0,20}"), 0..16)
        ) {
            let mut map = LocalizationMap::new();
            for (k, v) in entries {
                map.insert(k, Value::String(v));
            }

            let reparsed = parse(&serialize(&map, 4).unwrap()).unwrap();
            let original: Vec<_> = map.iter().collect();
            let roundtrip: Vec<_> = reparsed.iter().collect();
            prop_assert_eq!(original, roundtrip);
        }
    }
}
