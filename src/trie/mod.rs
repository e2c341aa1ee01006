//! Radix tree of route patterns.
//!
//! Nodes live in an arena and refer to each other by index, which keeps node
//! splits a matter of moving fields between two slots. Each node holds a run
//! of static bytes plus up to four kinds of continuation:
//!
//! - static children keyed by their first byte,
//! - one named parameter edge (itself holding a terminal store and/or a
//!   nested subtree that resumes at the next `/`),
//! - a terminal store for routes ending exactly here,
//! - a wildcard store for routes ending here with a trailing `*`.
//!
//! The trie is generic over the store payload `S`; the router uses it with
//! its per-location endpoint table but nothing here knows about handlers.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::trace;

mod pattern;

pub(crate) use pattern::{Pattern, normalize};

/// Errors raised while registering a route pattern.
///
/// A failed registration leaves the trie exactly as it was.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// Two patterns name the parameter at the same position differently.
    #[error("route `{path}` names parameter `:{incoming}` where `:{existing}` is already registered")]
    Conflict {
        path: String,
        existing: String,
        incoming: String,
    },

    /// A `*` appears somewhere other than the end of the pattern.
    #[error("wildcard in route `{path}` must be its final character")]
    MisplacedWildcard { path: String },

    /// The pattern is syntactically malformed.
    #[error("invalid route `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

/// Handle to a terminal store inside a [`Trie`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(usize);

impl StoreId {
    /// Position of the store in registration order.
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) part: Vec<u8>,
    pub(crate) store: Option<StoreId>,
    pub(crate) children: BTreeMap<u8, NodeId>,
    pub(crate) param: Option<ParamEdge>,
    pub(crate) wildcard: Option<StoreId>,
}

impl Node {
    fn new(part: &[u8]) -> Self {
        Self {
            part: part.to_vec(),
            store: None,
            children: BTreeMap::new(),
            param: None,
            wildcard: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ParamEdge {
    pub(crate) name: String,
    pub(crate) store: Option<StoreId>,
    pub(crate) inert: Option<NodeId>,
}

/// Compressed prefix tree mapping route patterns to stores of type `S`.
///
/// # Examples
///
/// ```
/// use rroute::trie::Trie;
///
/// let mut trie: Trie<Vec<&str>> = Trie::new();
/// let users = trie.insert("/users/:id").unwrap();
/// trie.store_mut(users).push("GET");
///
/// // The same location hands back the same store.
/// assert_eq!(trie.insert("users/:id").unwrap(), users);
/// assert_eq!(trie.store(users), &vec!["GET"]);
///
/// // A different parameter name at that position is rejected.
/// assert!(trie.insert("/users/:name").is_err());
/// ```
#[derive(Debug)]
pub struct Trie<S> {
    nodes: Vec<Node>,
    stores: Vec<S>,
}

impl<S: Default> Default for Trie<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Default> Trie<S> {
    /// Creates a trie holding only the root `/` node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(b"/")],
            stores: Vec::new(),
        }
    }

    /// Inserts `path` and returns the store for the location it ends at.
    ///
    /// The store is created empty the first time a location is reached; later
    /// insertions of an equivalent pattern return the same handle.
    ///
    /// # Errors
    ///
    /// - [`RouteError::Conflict`] — a parameter name disagrees with one already
    ///   registered at the same position.
    /// - [`RouteError::MisplacedWildcard`] / [`RouteError::InvalidPath`] — the
    ///   pattern is malformed.
    pub fn insert(&mut self, path: &str) -> Result<StoreId, RouteError> {
        let pattern = Pattern::parse(path)?;
        self.check(&pattern)?;

        let mut node = ROOT;
        for (i, segment) in pattern.inert.iter().enumerate() {
            if i > 0 {
                let name = &pattern.params[i - 1];
                let edge = self.param_edge(node, name);
                match edge.inert {
                    Some(next) => node = next,
                    None => {
                        let next = self.push(Node::new(segment.as_bytes()));
                        if let Some(edge) = self.nodes[node.0].param.as_mut() {
                            edge.inert = Some(next);
                        }
                        node = next;
                        continue;
                    }
                }
            }
            node = self.descend(node, segment.as_bytes());
        }

        let id = if pattern.ends_with_param() {
            let name = &pattern.params[pattern.params.len() - 1];
            let existing = self.param_edge(node, name).store;
            match existing {
                Some(id) => id,
                None => {
                    let id = self.new_store();
                    if let Some(edge) = self.nodes[node.0].param.as_mut() {
                        edge.store = Some(id);
                    }
                    id
                }
            }
        } else if pattern.wildcard {
            match self.nodes[node.0].wildcard {
                Some(id) => id,
                None => {
                    let id = self.new_store();
                    self.nodes[node.0].wildcard = Some(id);
                    id
                }
            }
        } else {
            match self.nodes[node.0].store {
                Some(id) => id,
                None => {
                    let id = self.new_store();
                    self.nodes[node.0].store = Some(id);
                    id
                }
            }
        };

        trace!(path = %pattern.normalized, store = id.0, nodes = self.nodes.len(), "pattern inserted");
        Ok(id)
    }

    fn new_store(&mut self) -> StoreId {
        self.stores.push(S::default());
        StoreId(self.stores.len() - 1)
    }

    // Returns the parameter edge at `node`, creating it with `name` if absent.
    // Name agreement was already verified by `check`.
    fn param_edge(&mut self, node: NodeId, name: &str) -> &mut ParamEdge {
        self.nodes[node.0].param.get_or_insert_with(|| ParamEdge {
            name: name.to_owned(),
            store: None,
            inert: None,
        })
    }
}

impl<S> Trie<S> {
    /// Returns the store behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this trie.
    pub fn store(&self, id: StoreId) -> &S {
        &self.stores[id.0]
    }

    /// Returns the store behind `id` for modification.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this trie.
    pub fn store_mut(&mut self, id: StoreId) -> &mut S {
        &mut self.stores[id.0]
    }

    /// Iterates over all stores in creation order.
    pub fn stores(&self) -> impl Iterator<Item = (StoreId, &S)> {
        self.stores.iter().enumerate().map(|(i, s)| (StoreId(i), s))
    }

    /// Number of distinct route locations.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// `true` while nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Number of static nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn root(&self) -> &Node {
        &self.nodes[ROOT.0]
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    // Moves everything from byte `at` on into a new child, leaving `node`
    // with the prefix and that child as its only continuation.
    fn split(&mut self, node: NodeId, at: usize) {
        let head = &mut self.nodes[node.0];
        let tail = Node {
            part: head.part.split_off(at),
            store: head.store.take(),
            children: std::mem::take(&mut head.children),
            param: head.param.take(),
            wildcard: head.wildcard.take(),
        };
        let key = tail.part[0];
        let tail = self.push(tail);
        self.nodes[node.0].children.insert(key, tail);
    }

    // Walks `segment` down from `node`, splitting or growing nodes as needed,
    // and returns the node whose text ends exactly where the segment ends.
    fn descend(&mut self, mut node: NodeId, mut segment: &[u8]) -> NodeId {
        let mut j = 0;
        loop {
            let part_len = self.nodes[node.0].part.len();

            if j == segment.len() {
                if j < part_len {
                    self.split(node, j);
                }
                return node;
            }

            if j == part_len {
                let key = segment[j];
                if let Some(&child) = self.nodes[node.0].children.get(&key) {
                    node = child;
                    segment = &segment[j..];
                    j = 0;
                    continue;
                }
                let child = self.push(Node::new(&segment[j..]));
                self.nodes[node.0].children.insert(key, child);
                return child;
            }

            if segment[j] != self.nodes[node.0].part[j] {
                self.split(node, j);
                let child = self.push(Node::new(&segment[j..]));
                self.nodes[node.0].children.insert(segment[j], child);
                return child;
            }

            j += 1;
        }
    }

    // Follows `segment` without modifying anything. Returns the node the
    // segment ends on when it ends exactly on an existing node boundary, and
    // `None` when insertion would have to create or split a node (everything
    // beyond that point is fresh and cannot conflict).
    fn probe(&self, mut node: NodeId, mut segment: &[u8]) -> Option<NodeId> {
        loop {
            let part = &self.nodes[node.0].part;
            let common = part
                .iter()
                .zip(segment)
                .take_while(|(a, b)| a == b)
                .count();

            if common < part.len() {
                return None;
            }
            if common == segment.len() {
                return Some(node);
            }
            node = *self.nodes[node.0].children.get(&segment[common])?;
            segment = &segment[common..];
        }
    }

    // Dry run of `insert`: reports a parameter-name conflict before any node
    // is touched, so a rejected insertion leaves the tree intact.
    fn check(&self, pattern: &Pattern) -> Result<(), RouteError> {
        let conflict = |existing: &str, incoming: &str| RouteError::Conflict {
            path: pattern.normalized.clone(),
            existing: existing.to_owned(),
            incoming: incoming.to_owned(),
        };

        let mut node = ROOT;
        for (i, segment) in pattern.inert.iter().enumerate() {
            if i > 0 {
                let name = &pattern.params[i - 1];
                let Some(edge) = &self.nodes[node.0].param else {
                    return Ok(());
                };
                if &edge.name != name {
                    return Err(conflict(&edge.name, name));
                }
                let Some(next) = edge.inert else {
                    return Ok(());
                };
                node = next;
            }
            match self.probe(node, segment.as_bytes()) {
                Some(next) => node = next,
                None => return Ok(()),
            }
        }

        if pattern.ends_with_param() {
            let name = &pattern.params[pattern.params.len() - 1];
            if let Some(edge) = &self.nodes[node.0].param {
                if &edge.name != name {
                    return Err(conflict(&edge.name, name));
                }
            }
        }
        Ok(())
    }

    /// For every store, the stores whose scope encloses it, outermost first.
    ///
    /// The store registered at `P` scopes every route under `P/` (for a `P`
    /// that already ends in `/`, every route starting with `P`); the wildcard
    /// store of `P*` scopes every route beneath `P`, including `P` itself; a
    /// parameter's terminal store scopes the routes that continue after that
    /// parameter. The result is indexed by [`StoreId::index`].
    pub fn scopes(&self) -> Vec<Vec<StoreId>> {
        let mut out = vec![Vec::new(); self.stores.len()];
        self.collect_scopes(ROOT, &[], &mut out);
        out
    }

    fn collect_scopes(&self, id: NodeId, enclosing: &[StoreId], out: &mut [Vec<StoreId>]) {
        let node = &self.nodes[id.0];

        let mut below = enclosing.to_vec();
        if let Some(wildcard) = node.wildcard {
            out[wildcard.0] = below.clone();
            below.push(wildcard);
        }
        if let Some(store) = node.store {
            out[store.0] = below.clone();
        }

        // A store on a node ending in `/` already sits on a segment boundary,
        // so it encloses everything hanging off that node.
        let ends_segment = node.part.last() == Some(&b'/');
        let inside = match node.store {
            Some(store) => {
                let mut scope = below.clone();
                scope.push(store);
                scope
            }
            None => below.clone(),
        };

        for &child in node.children.values() {
            let starts_segment = self.nodes[child.0].part.first() == Some(&b'/');
            if ends_segment || starts_segment {
                self.collect_scopes(child, &inside, out);
            } else {
                self.collect_scopes(child, &below, out);
            }
        }

        if let Some(edge) = &node.param {
            let mut scope = if ends_segment { inside } else { below };
            if let Some(store) = edge.store {
                out[store.0] = scope.clone();
                scope.push(store);
            }
            if let Some(inert) = edge.inert {
                self.collect_scopes(inert, &scope, out);
            }
        }
    }
}
