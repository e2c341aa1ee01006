//! Per-route middleware: guard, reject and wrap.
//!
//! Hooks are attached to a routing location and apply to every route beneath
//! it; when several locations along one path carry the same kind of hook, the
//! nearest one wins. At compile time each (location, method) pair is resolved
//! into a [`Chain`] that fixes the order once:
//!
//! ```text
//! guard ──pass──▶ body parse ──ok──▶ handler ──▶ wrap ──▶ response
//!   │                  │
//!   └─reject─▶ reject (or not-found) ──▶ wrap ──▶ response
//!                      └─error─▶ bad-request
//! ```
//!
//! Any failure raised by a guard, reject, handler or wrap is answered by the
//! server-error fallback, and so is a panic unwinding out of one of them. Per request the guard runs exactly once, the reject
//! at most once, and the handler and wrap exactly once on the success path.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error};

use crate::body::{BodyError, BodyKind};
use crate::context::Context;
use crate::handler::{BoxFuture, Handler, HandlerError, IntoReply, Reply, handler};
use crate::{Response, StatusCode};

/// Type-erased async guard.
///
/// A guard takes ownership of the request context and hands it back inside a
/// [`Verdict`], so it can attach extensions for the handler on the way.
pub type Guard = Arc<dyn Fn(Context) -> BoxFuture<Result<Verdict, HandlerError>> + Send + Sync>;

/// Type-erased reply post-processor.
pub type Wrap = Arc<dyn Fn(Reply) -> Result<Reply, HandlerError> + Send + Sync>;

/// Answers a request whose body failed to parse.
pub type BadRequest = Arc<dyn Fn(&Context, &BodyError) -> Response + Send + Sync>;

/// Answers a request whose chain raised an error.
pub type ServerError = Arc<dyn Fn(&HandlerError) -> Response + Send + Sync>;

/// Outcome of a guard.
#[derive(Debug)]
pub enum Verdict {
    /// Continue to the handler.
    Pass(Context),
    /// Stop here and answer with the route's reject handler.
    Reject(Context),
}

impl Verdict {
    /// `Pass` when `pass` holds, `Reject` otherwise.
    pub fn when(pass: bool, ctx: Context) -> Self {
        if pass { Self::Pass(ctx) } else { Self::Reject(ctx) }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }
}

/// Conversion into a guard outcome.
pub trait IntoVerdict {
    fn into_verdict(self) -> Result<Verdict, HandlerError>;
}

impl IntoVerdict for Verdict {
    fn into_verdict(self) -> Result<Verdict, HandlerError> {
        Ok(self)
    }
}

impl<E: Into<HandlerError>> IntoVerdict for Result<Verdict, E> {
    fn into_verdict(self) -> Result<Verdict, HandlerError> {
        self.map_err(Into::into)
    }
}

/// Erases an async function into a [`Guard`].
///
/// # Examples
///
/// ```
/// use rroute::context::Context;
/// use rroute::middleware::{Guard, Verdict, guard};
///
/// let signed_in: Guard = guard(|ctx: Context| async move {
///     let ok = ctx.request().headers().contains("authorization");
///     Verdict::when(ok, ctx)
/// });
/// ```
pub fn guard<F, Fut, R>(f: F) -> Guard
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoVerdict,
{
    Arc::new(move |ctx: Context| -> BoxFuture<Result<Verdict, HandlerError>> {
        let fut = f(ctx);
        Box::pin(async move { fut.await.into_verdict() })
    })
}

/// Erases a reply post-processor into a [`Wrap`].
///
/// The wrap sees what the handler (or reject) produced and may return
/// anything that converts into a reply.
///
/// # Examples
///
/// ```
/// use rroute::handler::Reply;
/// use rroute::middleware::{Wrap, wrap};
/// use rroute::{Response, StatusCode};
///
/// let created: Wrap = wrap(|reply: Reply| {
///     let mut response = reply.into_response();
///     response.set_status(StatusCode::Created);
///     response
/// });
/// ```
pub fn wrap<F, R>(f: F) -> Wrap
where
    F: Fn(Reply) -> R + Send + Sync + 'static,
    R: IntoReply,
{
    Arc::new(move |reply: Reply| f(reply).into_reply())
}

/// Hooks declared at one routing location.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) guard: Option<Guard>,
    pub(crate) reject: Option<Handler>,
    pub(crate) wrap: Option<Wrap>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("guard", &self.guard.is_some())
            .field("reject", &self.reject.is_some())
            .field("wrap", &self.wrap.is_some())
            .finish()
    }
}

impl Hooks {
    /// Layers `nearer` over `self`; each slot set in `nearer` replaces the
    /// inherited one.
    pub(crate) fn overlay(&self, nearer: &Hooks) -> Hooks {
        Hooks {
            guard: nearer.guard.clone().or_else(|| self.guard.clone()),
            reject: nearer.reject.clone().or_else(|| self.reject.clone()),
            wrap: nearer.wrap.clone().or_else(|| self.wrap.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_none() && self.reject.is_none() && self.wrap.is_none()
    }
}

/// Router-wide answers for requests no route handles.
#[derive(Clone)]
pub struct Fallbacks {
    pub(crate) not_found: Handler,
    pub(crate) bad_request: BadRequest,
    pub(crate) server_error: ServerError,
}

impl Default for Fallbacks {
    fn default() -> Self {
        Self {
            not_found: handler(|_ctx| async {
                Response::new(StatusCode::NotFound).body("Not Found")
            }),
            bad_request: Arc::new(|_ctx: &Context, err: &BodyError| {
                Response::new(StatusCode::BadRequest).body(err.to_string())
            }),
            server_error: Arc::new(|_err: &HandlerError| {
                Response::new(StatusCode::InternalServerError).body("Internal Server Error")
            }),
        }
    }
}

impl std::fmt::Debug for Fallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fallbacks").finish_non_exhaustive()
    }
}

impl Fallbacks {
    /// Runs the not-found handler, absorbing its failure.
    pub(crate) async fn not_found(&self, ctx: Context) -> Response {
        let outcome = AssertUnwindSafe(async { (self.not_found)(ctx).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload.as_ref()))));
        match outcome {
            Ok(reply) => reply.into_response(),
            Err(err) => self.failed("not-found", &err),
        }
    }

    fn failed(&self, route: &str, err: &HandlerError) -> Response {
        error!(route, error = %err, "request failed");
        (self.server_error)(err)
    }
}

/// The resolved middleware chain for one method at one location.
pub struct Chain {
    pattern: Arc<str>,
    guard: Option<Guard>,
    reject: Option<Handler>,
    handler: Handler,
    body: BodyKind,
    wrap: Option<Wrap>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("pattern", &self.pattern)
            .field("guard", &self.guard.is_some())
            .field("reject", &self.reject.is_some())
            .field("body", &self.body)
            .field("wrap", &self.wrap.is_some())
            .finish()
    }
}

impl Chain {
    pub(crate) fn new(pattern: Arc<str>, handler: Handler, body: BodyKind, hooks: Hooks) -> Self {
        Self {
            pattern,
            guard: hooks.guard,
            reject: hooks.reject,
            handler,
            body,
            wrap: hooks.wrap,
        }
    }

    /// The route pattern this chain was registered under.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The body kind parsed before the handler runs.
    pub fn body_kind(&self) -> BodyKind {
        self.body
    }

    /// Runs the chain for one request. Never fails: errors and panics are
    /// answered by the server-error fallback.
    pub async fn run(&self, ctx: Context, fallbacks: &Fallbacks) -> Response {
        let outcome = AssertUnwindSafe(self.resolve(ctx, fallbacks))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload.as_ref()))));
        match outcome {
            Ok(response) => response,
            Err(err) => fallbacks.failed(&self.pattern, &err),
        }
    }

    async fn resolve(&self, mut ctx: Context, fallbacks: &Fallbacks) -> Result<Response, HandlerError> {
        if let Some(guard) = &self.guard {
            ctx = match guard(ctx).await? {
                Verdict::Pass(ctx) => ctx,
                Verdict::Reject(ctx) => {
                    debug!(route = %self.pattern, "guard rejected request");
                    let reply = match &self.reject {
                        Some(reject) => reject(ctx).await?,
                        None => (fallbacks.not_found)(ctx).await?,
                    };
                    return self.finish(reply);
                }
            };
        }

        if self.body != BodyKind::None {
            match self.body.parse(ctx.request()) {
                Ok(body) => ctx.set_body(body),
                Err(err) => {
                    debug!(route = %self.pattern, error = %err, "body rejected");
                    return Ok((fallbacks.bad_request)(&ctx, &err));
                }
            }
        }

        let reply = (self.handler)(ctx).await?;
        self.finish(reply)
    }

    fn finish(&self, reply: Reply) -> Result<Response, HandlerError> {
        let reply = match &self.wrap {
            Some(wrap) => wrap(reply)?,
            None => reply,
        };
        Ok(reply.into_response())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
