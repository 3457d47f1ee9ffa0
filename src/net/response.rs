//! Minimal HTTP response model.
//!
//! This struct represents a **fully buffered** HTTP response returned by the
//! network layer. It contains the final URL (after redirects, if the client
//! follows them), status code + reason, response headers, and the raw body bytes.
//!
//! ## Notes
//! - The body is stored as raw `Vec<u8>`. Use [`Response::text`] to decode it with
//!   the charset declared in `Content-Type`.
//! - `headers` is an `http::HeaderMap`, which is **case-insensitive** for
//!   header names.
//! - A status of `0` means no HTTP response was received at all (network failure or
//!   abort); `status_text` then carries the reason.
//!
use http::header::CONTENT_TYPE;
use http::HeaderMap;

/// Simple structure for HTTP responses.
///
/// All fields reflect the **received** response as-is; no additional parsing
/// or transformation is performed by this type.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL of the response (after redirects, if any).
    pub url: url::Url,

    /// Numeric HTTP status code (e.g., `200`, `404`).
    pub status: u16,

    /// Human-readable reason phrase (e.g., `"OK"`, `"Not Found"`).
    ///
    /// May be `"Unknown"` for non-standard codes.
    pub status_text: String,

    /// Response headers as a case-insensitive map.
    pub headers: HeaderMap,

    /// Raw response body bytes.
    pub body: Vec<u8>,
}

impl Response {
    /// A response that never made it over the wire.
    pub fn network_error(url: url::Url, reason: impl Into<String>) -> Self {
        Self {
            url,
            status: 0,
            status_text: reason.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Body decoded as text, see [`decode_response_body`].
    pub fn text(&self) -> String {
        decode_response_body(&self.headers, &self.body)
    }
}

/// Best-effort response body decoder:
/// - honors `Content-Type: ...; charset=...` when present
/// - falls back to UTF-8 lossless
pub fn decode_response_body(headers: &HeaderMap, body: &[u8]) -> String {
    // Try to extract charset from Content-Type
    let mut charset: Option<String> = None;
    if let Some(ct) = headers.get(CONTENT_TYPE) {
        if let Ok(ct) = ct.to_str() {
            // very small, permissive parse: look for "charset=..."
            if let Some(idx) = ct.to_ascii_lowercase().find("charset=") {
                let after = &ct[idx + "charset=".len()..];
                let end = after.find([';', ' ', '\t']).unwrap_or(after.len());
                charset = Some(after[..end].trim_matches('"').to_string());
            }
        }
    }

    match charset.as_deref() {
        Some(cs) if cs.eq_ignore_ascii_case("utf-8") || cs.eq_ignore_ascii_case("utf8") => {
            String::from_utf8_lossy(body).into_owned()
        }
        // Latin-1 maps bytes 1:1 onto code points
        Some(cs) if cs.eq_ignore_ascii_case("iso-8859-1") || cs.eq_ignore_ascii_case("latin1") => {
            body.iter().map(|&b| char::from(b)).collect()
        }
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}
