//! Handler type erasure and reply normalization.
//!
//! Route handlers are async functions from [`Context`] to anything that
//! implements [`IntoReply`]. They are erased into [`Handler`] trait objects at
//! registration so the compiled router can hold them uniformly.

use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::context::Context;
use crate::http::{Response, StatusCode};

/// Heap-allocated, `Send` future returned by erased callbacks.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased async handler.
///
/// Stored behind `Arc` so compiled chains can share one handler between
/// several methods without copying the closure.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<Result<Reply, HandlerError>> + Send + Sync>;

/// Erases an async function into a [`Handler`].
///
/// # Examples
///
/// ```
/// use rroute::handler::{Handler, handler};
/// use rroute::{Response, StatusCode};
///
/// let h: Handler = handler(|_ctx| async { Response::new(StatusCode::Ok) });
/// ```
pub fn handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
{
    Arc::new(move |ctx: Context| -> BoxFuture<Result<Reply, HandlerError>> {
        let fut = f(ctx);
        Box::pin(async move { fut.await.into_reply() })
    })
}

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = impl IntoReply>` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl,
/// so router methods can take `impl IntoHandler` instead of repeating the
/// three-parameter bound.
pub trait IntoHandler: Send + Sync + 'static {
    fn into_handler(self) -> Handler;
}

impl<F, Fut, R> IntoHandler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
{
    fn into_handler(self) -> Handler {
        handler(self)
    }
}

/// Failure raised by a handler, guard, reject or wrap.
///
/// All of them end up at the router's server-error handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A guard, reject, handler or wrap panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// An error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wraps any other error type.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_owned())
    }
}

/// What a handler produced, before it is turned into a [`Response`].
///
/// A route's wrap callback receives the `Reply` and decides how it becomes a
/// response; without one, [`Reply::into_response`] applies.
#[derive(Debug)]
pub enum Reply {
    /// A finished response, passed through untouched.
    Response(Response),
    /// A JSON value, sent as `application/json`.
    Json(serde_json::Value),
    /// Plain text, sent as `text/plain; charset=utf-8`.
    Text(String),
    /// Nothing, sent as `204 No Content`.
    Empty,
}

impl Reply {
    /// Default normalization into a response.
    pub fn into_response(self) -> Response {
        match self {
            Self::Response(response) => response,
            Self::Json(value) => Response::new(StatusCode::Ok)
                .header("Content-Type", "application/json")
                .body(value.to_string()),
            Self::Text(text) => Response::new(StatusCode::Ok)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(text),
            Self::Empty => Response::new(StatusCode::NoContent),
        }
    }

    /// Serializes `value` into a JSON reply.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, HandlerError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }
}

/// Conversion into a handler outcome.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, HandlerError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(self)
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for StatusCode {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Response(Response::new(self)))
    }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Json(self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Text(self))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Text(self.to_owned()))
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Empty)
    }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<HandlerError>,
{
    fn into_reply(self) -> Result<Reply, HandlerError> {
        self.map_err(Into::into)?.into_reply()
    }
}
