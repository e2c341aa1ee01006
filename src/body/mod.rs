//! Request body parsing selected per route.
//!
//! A route declares which [`BodyKind`] its handler expects; dispatch parses
//! the body before the handler runs and sends parse failures to the
//! bad-request handler instead.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use crate::http::Request;
use crate::http::request::parse_urlencoded;

/// The body representation a handler asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// The body is not looked at.
    #[default]
    None,
    /// JSON document, decoded to a [`serde_json::Value`].
    Json,
    /// UTF-8 text.
    Text,
    /// `application/x-www-form-urlencoded` pairs.
    Form,
    /// Opaque bytes tagged with the request's content type.
    Blob,
    /// Raw bytes, untouched.
    Buffer,
}

/// Errors produced while parsing a request body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("expected a {expected} body, got content type `{found}`")]
    UnsupportedContentType {
        expected: &'static str,
        found: String,
    },
}

/// A parsed request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ParsedBody {
    #[default]
    None,
    Json(serde_json::Value),
    Text(String),
    Form(HashMap<String, String>),
    Blob {
        content_type: Option<String>,
        bytes: Bytes,
    },
    Buffer(Bytes),
}

impl BodyKind {
    /// Parses the body of `request` as this kind.
    ///
    /// An empty JSON body parses as `null`. A form body declared with a
    /// content type other than `application/x-www-form-urlencoded` is
    /// rejected; a missing content type is accepted.
    pub fn parse(self, request: &Request) -> Result<ParsedBody, BodyError> {
        let body = request.body();
        Ok(match self {
            Self::None => ParsedBody::None,
            Self::Json if body.is_empty() => ParsedBody::Json(serde_json::Value::Null),
            Self::Json => ParsedBody::Json(serde_json::from_slice(body)?),
            Self::Text => ParsedBody::Text(std::str::from_utf8(body)?.to_owned()),
            Self::Form => {
                if let Some(found) = request.headers().media_type() {
                    if !found.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
                        return Err(BodyError::UnsupportedContentType {
                            expected: "form",
                            found: found.to_owned(),
                        });
                    }
                }
                ParsedBody::Form(parse_urlencoded(std::str::from_utf8(body)?))
            }
            Self::Blob => ParsedBody::Blob {
                content_type: request.headers().get("content-type").map(str::to_owned),
                bytes: body.clone(),
            },
            Self::Buffer => ParsedBody::Buffer(body.clone()),
        })
    }
}

impl ParsedBody {
    /// The JSON value, when the body was parsed as JSON.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text, when the body was parsed as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// A form field, when the body was parsed as a form.
    pub fn form_field(&self, name: &str) -> Option<&str> {
        match self {
            Self::Form(fields) => fields.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// The raw bytes, for blob and buffer bodies.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Blob { bytes, .. } | Self::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }
}
