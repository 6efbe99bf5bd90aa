//! Structural path walker
//!
//! Flattens arbitrary JSON into `(path, leaf key, value)` entries. Object
//! keys are dotted (`a.b`), array indices bracketed (`a[0]`), and keys that
//! would be ambiguous in dotted form are quoted (`a["x.y"]`), so every path
//! parses back to exactly one location.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// One step from a container to a child
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// A leaf found by [`walk`]
#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry<'a> {
    /// Rendered address from the root
    pub path: String,
    pub segments: Vec<Segment>,
    pub value: &'a Value,
}

impl PathEntry<'_> {
    /// Key or index under which the leaf sits; `None` for a scalar root
    pub fn key(&self) -> Option<&Segment> {
        self.segments.last()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathParseError {
    #[error("unexpected character '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },
    #[error("unterminated {0} at end of path")]
    Unterminated(&'static str),
    #[error("invalid array index '{0}'")]
    InvalidIndex(String),
}

/// Enumerate every leaf of `value` in document order.
///
/// Scalars and empty containers are leaves. Pure: no state survives
/// between calls.
pub fn walk(value: &Value) -> Vec<PathEntry<'_>> {
    let mut entries = Vec::new();
    let mut segments = Vec::new();
    collect(value, &mut segments, &mut entries);
    entries
}

fn collect<'a>(value: &'a Value, segments: &mut Vec<Segment>, out: &mut Vec<PathEntry<'a>>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                segments.push(Segment::Key(key.clone()));
                collect(child, segments, out);
                segments.pop();
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                segments.push(Segment::Index(index));
                collect(child, segments, out);
                segments.pop();
            }
        }
        _ => out.push(PathEntry {
            path: format_path(segments),
            segments: segments.clone(),
            value,
        }),
    }
}

/// Leaves whose own key equals `key`, wherever they are nested
pub fn find_by_key<'a>(value: &'a Value, key: &str) -> Vec<PathEntry<'a>> {
    walk(value)
        .into_iter()
        .filter(|entry| matches!(entry.key(), Some(Segment::Key(k)) if k == key))
        .collect()
}

/// Follow `segments` from `value`
pub fn lookup<'a>(value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match segment {
        Segment::Key(key) => current.as_object()?.get(key),
        Segment::Index(index) => current.as_array()?.get(*index),
    })
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty() && !key.contains(['.', '[', ']', '"', '\\'])
}

/// Render segments in walker path syntax
pub fn format_path(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
            Segment::Key(key) if is_plain_key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Segment::Key(key) => {
                out.push_str("[\"");
                for c in key.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push_str("\"]");
            }
        }
    }
    out
}

/// Parse a path produced by [`format_path`]
pub fn parse_path(path: &str) -> Result<Vec<Segment>, PathParseError> {
    let chars: Vec<char> = path.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '[' if chars.get(i + 1) == Some(&'"') => {
                i += 2;
                let mut key = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(PathParseError::Unterminated("quoted key")),
                        Some('\\') => {
                            let escaped = chars.get(i + 1).ok_or(PathParseError::Unterminated("escape"))?;
                            key.push(*escaped);
                            i += 2;
                        }
                        Some('"') => break,
                        Some(c) => {
                            key.push(*c);
                            i += 1;
                        }
                    }
                }
                if chars.get(i + 1) != Some(&']') {
                    return Err(PathParseError::Unterminated("bracket"));
                }
                segments.push(Segment::Key(key));
                i += 2;
            }
            '[' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|p| start + p)
                    .ok_or(PathParseError::Unterminated("bracket"))?;
                let digits: String = chars[start..end].iter().collect();
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| PathParseError::InvalidIndex(digits.clone()))?;
                segments.push(Segment::Index(index));
                i = end + 1;
            }
            '.' if !segments.is_empty() => {
                i += 1;
                let key = read_plain(&chars, &mut i);
                if key.is_empty() {
                    return Err(match chars.get(i) {
                        Some(c) => PathParseError::Unexpected { found: *c, offset: i },
                        None => PathParseError::Unterminated("key"),
                    });
                }
                segments.push(Segment::Key(key));
            }
            c if segments.is_empty() && c != '.' && c != ']' && c != '"' => {
                let key = read_plain(&chars, &mut i);
                segments.push(Segment::Key(key));
            }
            c => return Err(PathParseError::Unexpected { found: c, offset: i }),
        }
    }

    Ok(segments)
}

fn read_plain(chars: &[char], i: &mut usize) -> String {
    let mut key = String::new();
    while let Some(c) = chars.get(*i) {
        if matches!(c, '.' | '[' | ']' | '"' | '\\') {
            break;
        }
        key.push(*c);
        *i += 1;
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_walk_nested_array_of_objects() {
        let data = json!({"a": [{"b": 1}]});
        let entries = walk(&data);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "a[0].b");
        assert_eq!(entries[0].key(), Some(&Segment::Key("b".into())));
        assert_eq!(entries[0].value, &json!(1));

        let parsed = parse_path(&entries[0].path).unwrap();
        assert_eq!(lookup(&data, &parsed), Some(&json!(1)));
    }

    #[test]
    fn test_walk_is_restartable() {
        let data = json!({"x": {"y": [true, null]}, "z": "s"});
        assert_eq!(walk(&data), walk(&data));
        let paths: Vec<String> = walk(&data).into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["x.y[0]", "x.y[1]", "z"]);
    }

    #[test]
    fn test_walk_keeps_document_order() {
        let data: Value = serde_json::from_str(r#"{"z": 1, "a": {"y": 2, "b": 3}}"#).unwrap();
        let paths: Vec<String> = walk(&data).into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["z", "a.y", "a.b"]);
    }

    #[test]
    fn test_empty_containers_and_scalar_root_are_leaves() {
        let data = json!({"empty": {}, "none": []});
        let paths: Vec<String> = walk(&data).into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["empty", "none"]);

        let scalar = json!(42);
        let entries = walk(&scalar);
        assert_eq!(entries[0].path, "");
        assert!(entries[0].key().is_none());
    }

    #[test]
    fn test_awkward_keys_are_quoted_and_round_trip() {
        let data = json!({"a.b": {"say \"hi\"": [{"": 3}]}});
        let entries = walk(&data);
        assert_eq!(entries[0].path, r#"["a.b"]["say \"hi\""][0][""]"#);
        let parsed = parse_path(&entries[0].path).unwrap();
        assert_eq!(parsed, entries[0].segments);
        assert_eq!(lookup(&data, &parsed), Some(&json!(3)));
    }

    #[test]
    fn test_array_root() {
        let data = json!([[1], {"k": 2}]);
        let paths: Vec<String> = walk(&data).into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["[0][0]", "[1].k"]);
        for path in paths {
            assert!(lookup(&data, &parse_path(&path).unwrap()).is_some());
        }
    }

    #[test]
    fn test_find_by_key() {
        let data = json!({"config": {"other": {"group": 3}, "zgw": [{"group": 1}, {"group": 2}]}});
        let found: Vec<&Value> = find_by_key(&data, "group").into_iter().map(|e| e.value).collect();
        assert_eq!(found, vec![&json!(3), &json!(1), &json!(2)]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_path("a[x]"), Err(PathParseError::InvalidIndex("x".into())));
        assert_eq!(parse_path("a[0"), Err(PathParseError::Unterminated("bracket")));
        assert!(matches!(parse_path("a..b"), Err(PathParseError::Unexpected { found: '.', .. })));
        assert!(parse_path(".a").is_err());
    }

    #[test]
    fn test_lookup_type_mismatch() {
        let data = json!({"a": [1]});
        assert_eq!(lookup(&data, &["a".into(), "b".into()]), None);
        assert_eq!(lookup(&data, &["a".into(), 0usize.into()]), Some(&json!(1)));
        assert_eq!(lookup(&data, &[]), Some(&data));
    }
}
