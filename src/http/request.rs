//! Inbound request helpers.
//!
//! # Responsibilities
//! - Convert an axum `HeaderMap` into the gateway's `Headers` map
//! - Read the request id assigned by `SetRequestIdLayer`

use axum::http::HeaderMap;

use crate::integration::Headers;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Lowercased header map. Non-UTF-8 values are dropped; for repeated
/// headers the first value wins.
pub fn to_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::with_capacity(map.len());
    for (name, value) in map {
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    headers
}

pub fn request_id(map: &HeaderMap) -> &str {
    map.get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_first_value_wins() {
        let mut map = HeaderMap::new();
        map.append("X-Signature", HeaderValue::from_static("abc"));
        map.append("x-signature", HeaderValue::from_static("def"));
        map.insert("x-binary", HeaderValue::from_bytes(b"\xff\xfe").unwrap());

        let headers = to_headers(&map);
        assert_eq!(headers.get("x-signature").map(String::as_str), Some("abc"));
        assert!(!headers.contains_key("x-binary"));
        assert_eq!(request_id(&map), "unknown");
    }
}
