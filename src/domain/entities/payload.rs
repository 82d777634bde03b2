//! Structured payloads: a route name plus named parameters packed into one
//! string, e.g. `/buy{{item===42}}{{color==="red"}}`.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload {
    pub name: String,
    pub params: BTreeMap<String, Value>,
}

impl Payload {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Pack into the storable string form. Values are written as JSON.
    pub fn encode(&self) -> String {
        let mut out = self.name.clone();
        for (key, value) in &self.params {
            out.push_str("{{");
            out.push_str(key);
            out.push_str("===");
            out.push_str(&value.to_string());
            out.push_str("}}");
        }
        out
    }

    /// Unpack a string produced by [`Payload::encode`]. Plain strings decode
    /// to a payload without parameters; values that are not valid JSON are
    /// kept as strings.
    pub fn decode(raw: &str) -> Self {
        let Some(idx) = raw.find("{{") else {
            return Self::new(raw.trim());
        };

        let mut params = BTreeMap::new();
        let mut rest = &raw[idx..];
        while let Some(body) = rest.strip_prefix("{{") {
            let Some(sep) = body.find("===") else { break };
            let key = &body[..sep];
            let after = &body[sep + 3..];

            let (value, end) = match json_value(after) {
                Some(parsed) => parsed,
                None => {
                    let Some(end) = segment_end(after) else { break };
                    let text = &after[..end];
                    (Value::String(text.to_string()), end)
                }
            };
            params.insert(key.to_string(), value);
            rest = &after[end + 2..];
        }

        Self {
            name: raw[..idx].trim().to_string(),
            params,
        }
    }
}

/// A JSON value at the start of `s` that is directly followed by the
/// segment's `}}`, with the offset of that `}}`. Braces inside JSON strings
/// never close a segment.
fn json_value(s: &str) -> Option<(Value, usize)> {
    let mut stream = serde_json::Deserializer::from_str(s).into_iter::<Value>();
    let value = stream.next()?.ok()?;
    let end = stream.byte_offset();
    closes_segment(&s[end..]).then_some((value, end))
}

/// Position of the `}}` closing a non-JSON segment: the one followed by the
/// next segment or by the end of input.
fn segment_end(s: &str) -> Option<usize> {
    (0..s.len())
        .filter(|&i| s.is_char_boundary(i))
        .find(|&i| closes_segment(&s[i..]))
}

fn closes_segment(s: &str) -> bool {
    s.strip_prefix("}}")
        .is_some_and(|tail| tail.is_empty() || tail.starts_with("{{"))
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_then_decode_keeps_params() {
        let payload = Payload::new("/buy")
            .with_param("item", 42)
            .with_param("color", "red")
            .with_param("opts", json!({"gift": true}));

        let encoded = payload.encode();
        assert!(encoded.starts_with("/buy{{"));
        assert_eq!(Payload::decode(&encoded), payload);
    }

    #[test]
    fn plain_text_has_no_params() {
        let payload = Payload::decode("  hello there ");
        assert_eq!(payload.name, "hello there");
        assert!(payload.params.is_empty());
    }

    #[test]
    fn unterminated_segment_is_ignored() {
        let payload = Payload::decode("/pick{{choice===1");
        assert_eq!(payload.name, "/pick");
        assert!(payload.params.is_empty());
    }

    #[test]
    fn braces_inside_strings_stay_in_the_value() {
        let payload = Payload::new("/x")
            .with_param("note", "a}}{{b===c")
            .with_param("raw", "}}");

        let decoded = Payload::decode(&payload.encode());

        assert_eq!(decoded, payload);
        assert_eq!(decoded.param("b"), None);
    }

    #[test]
    fn json_prefix_without_close_is_plain_text() {
        let payload = Payload::decode("/pick{{choice===true story}}{{n===3}}");
        assert_eq!(payload.param("choice"), Some(&json!("true story")));
        assert_eq!(payload.param("n"), Some(&json!(3)));
    }

    #[test]
    fn non_json_values_stay_strings() {
        let payload = Payload::decode("/pick{{choice===blue}}");
        assert_eq!(payload.name, "/pick");
        assert_eq!(payload.param("choice"), Some(&json!("blue")));
    }
}
