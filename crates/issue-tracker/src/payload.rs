use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFormat {
    Json,
    Form,
}

fn body_format(headers: &HeaderMap) -> BodyFormat {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.trim_start()
                .to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        });
    if is_form {
        BodyFormat::Form
    } else {
        BodyFormat::Json
    }
}

/// Decodes a JSON or urlencoded form body. Whatever cannot be decoded is
/// treated as an empty object, so a bad body surfaces through the normal
/// validation replies.
pub fn decode<T>(headers: &HeaderMap, body: &[u8]) -> T
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return T::default();
    }

    let decoded = match body_format(headers) {
        BodyFormat::Form => serde_urlencoded::from_bytes(body).map_err(|e| e.to_string()),
        BodyFormat::Json => serde_json::from_slice(body).map_err(|e| e.to_string()),
    };

    decoded.unwrap_or_else(|err| {
        tracing::debug!(%err, "undecodable request body, treating as empty");
        T::default()
    })
}

/// Accepts strings, numbers and booleans, the way form-style clients send
/// scalar values. `null` and other shapes count as absent.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Accepts a boolean or the strings `"true"`/`"false"`. Anything else,
/// including the empty string, counts as absent.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Query string as ordered key/value pairs; an unparsable query is empty.
pub fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    let Some(query) = query else {
        return Vec::new();
    };
    serde_urlencoded::from_str(query).unwrap_or_else(|err| {
        tracing::debug!(%err, "undecodable query string, ignoring");
        Vec::new()
    })
}
