//! # rroute
//!
//! A radix-tree HTTP router that compiles its route table into a tree of
//! closures, with per-location guard / reject / wrap middleware.
//!
//! Routes are registered on a [`Router`], which is then compiled once into a
//! [`CompiledRouter`]. The compiled router is immutable and can be shared
//! across tasks; the transport layer feeds it [`Request`] values and sends the
//! [`Response`] it returns.
//!
//! ## Quick Start
//!
//! ```rust
//! use rroute::{Request, Response, Router, StatusCode};
//! use rroute::context::Context;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.get("/", |_ctx| async { "Hello, World!" })?;
//!     router.get("/id/:id", |ctx: Context| async move {
//!         format!("id = {}", ctx.param("id").unwrap_or_default())
//!     })?;
//!     router.get("/files/*", |ctx: Context| async move {
//!         ctx.params().wildcard().unwrap_or_default().to_owned()
//!     })?;
//!     let router = router.compile();
//!
//!     let response = router.handle(Request::new("GET", "/id/42")).await;
//!     assert_eq!(response.text(), Some("id = 42"));
//!
//!     let response = router.handle(Request::new("GET", "/files/a/b")).await;
//!     assert_eq!(response.text(), Some("a/b"));
//!
//!     let response = router.handle(Request::new("GET", "/missing")).await;
//!     assert_eq!(response.status(), StatusCode::NotFound);
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod compiler;
pub mod config;
pub mod context;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod router;
pub mod trie;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use body::BodyKind;
pub use config::RouterOptions;
pub use context::Context;
pub use handler::{HandlerError, IntoReply, Reply};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::Verdict;
pub use router::{AllowedMethods, CompiledRouter, Endpoint, Lookup, RouteMatch, Router};
pub use trie::RouteError;
