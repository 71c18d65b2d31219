use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value};
use url::form_urlencoded;

/// Characters escaped when a value is embedded as a single path segment.
/// Includes `/` and `%` so index names and object ids cannot break out of
/// their segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'%')
    .add(b'/')
    .add(b'\\');

/// Encodes a parameter object into a deterministic query string.
///
/// Keys are emitted in sorted order so the same parameters always produce
/// the same string. Arrays are comma-joined, nested objects are flattened
/// to their compact JSON text, and everything is percent-escaped.
pub(crate) fn encode_query(params: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for key in keys {
        serializer.append_pair(key, &flatten_value(&params[key.as_str()]));
    }
    serializer.finish()
}

/// Percent-encodes a value for use as one URL path segment.
pub(crate) fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

fn flatten_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(flatten_value)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
