//! Incoming request representation.
//!
//! A [`Request`] keeps the raw request target together with the offset of its
//! query boundary, so routing sees only the path while handlers can still
//! reach the query string.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing a raw HTTP/1.x request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A decoded HTTP request as handed over by the transport.
///
/// # Examples
///
/// ```
/// use rroute::http::Request;
///
/// let raw = b"GET /users/42?expand=posts HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let request = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/users/42");
/// assert_eq!(request.query_string(), Some("expand=posts"));
/// assert_eq!(request.query_param("expand"), Some("posts"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    target: String,
    // Byte offset of `?` in `target`, when present.
    query_at: Option<usize>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
    query: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers accepted per request.
    const MAX_HEADERS: usize = 64;

    /// Creates a request for `method` and `target` with no headers or body.
    ///
    /// `target` is the request target as sent on the wire, query string
    /// included.
    pub fn new(method: impl Into<Method>, target: impl Into<String>) -> Self {
        let target = target.into();
        let query_at = target.find('?');
        let query = query_at
            .map(|at| parse_urlencoded(&target[at + 1..]))
            .unwrap_or_default();
        Self {
            method: method.into(),
            target,
            query_at,
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
            query,
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parses a raw HTTP/1.x request from a byte slice.
    ///
    /// The body is whatever follows the header block, cut to `Content-Length`
    /// when that header is present.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the header block is not complete yet.
    /// - [`RequestError::Parse`] — the data is malformed.
    /// - [`RequestError::MissingField`] — method, target or version is absent.
    pub fn parse(buf: &[u8]) -> Result<Self, RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = raw
            .method
            .ok_or(RequestError::MissingField { field: "method" })?;
        let target = raw
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let version = raw
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut request = Self::new(method, target);
        request.version = version;

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.append(header.name, value);
            }
        }
        request.headers = header_map;

        let rest = &buf[body_offset..];
        let body = match request.content_length() {
            Some(len) if len < rest.len() => &rest[..len],
            _ => rest,
        };
        request.body = Bytes::copy_from_slice(body);

        Ok(request)
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (the target up to the query boundary).
    pub fn path(&self) -> &str {
        match self.query_at {
            Some(at) => &self.target[..at],
            None => &self.target,
        }
    }

    /// Returns the full request target, query string included.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Byte offset of the query boundary (`?`) in [`target`](Self::target).
    pub fn query_boundary(&self) -> Option<usize> {
        self.query_at
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query_at.map(|at| &self.target[at + 1..])
    }

    /// Returns a parsed query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }
}

/// Parses `key=value&key2=value2` pairs.
///
/// `+` is decoded as a space; percent-decoding is left to the caller.
/// Empty pairs are skipped and a repeated key keeps its last value.
pub(crate) fn parse_urlencoded(input: &str) -> HashMap<String, String> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?.replace('+', " ");
            let value = parts.next().unwrap_or("").replace('+', " ");
            Some((key, value))
        })
        .collect()
}
