//! Per-request context handed to guards, handlers and rejects.
//!
//! Everything a handler may read about its request travels in [`Context`]:
//! the request itself (path, query boundary, headers, raw body), the path
//! parameters captured by the matcher, the parsed body and a typed extension
//! map guards can use to pass state down to the handler. A context is built
//! fresh for every request and never shared.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;
use crate::body::ParsedBody;
use crate::compiler::WILDCARD;

/// Type-erased request extensions map.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Get a value by type
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get a mutable reference to a value by type
    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove a value by type
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Path parameters extracted from the matched route.
///
/// A trailing wildcard is stored under the name `*`.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    /// Create a new empty parameters map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value into the parameters map
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Get a value from the parameters map
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// The wildcard capture, if the route ended with `*`.
    pub fn wildcard(&self) -> Option<&str> {
        self.get(WILDCARD)
    }

    /// Number of captured parameters.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over `(name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Request-scoped state passed through the route's middleware chain.
#[derive(Debug)]
pub struct Context {
    request: Request,
    params: Parameters,
    body: ParsedBody,
    extensions: Extensions,
}

impl Context {
    /// Create a context with no path parameters.
    pub fn new(request: Request) -> Self {
        Self::with_params(request, Parameters::new())
    }

    /// Create a context carrying the parameters captured for `request`.
    pub fn with_params(request: Request, params: Parameters) -> Self {
        Self {
            request,
            params,
            body: ParsedBody::None,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The request path, query string excluded.
    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Shorthand for `self.params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// The body as parsed for this route; [`ParsedBody::None`] when the route
    /// did not ask for one.
    pub fn body(&self) -> &ParsedBody {
        &self.body
    }

    pub(crate) fn set_body(&mut self, body: ParsedBody) {
        self.body = body;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Deserializes the body into `T`.
    ///
    /// Uses the parsed JSON value when the route declared a JSON body and
    /// falls back to decoding the raw bytes otherwise.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        match &self.body {
            ParsedBody::Json(value) => T::deserialize(value),
            _ => serde_json::from_slice(self.request.body()),
        }
    }

    /// Gives back the request, dropping the rest of the context.
    pub fn into_request(self) -> Request {
        self.request
    }
}
