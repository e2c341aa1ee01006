//! Compiles a route [`Trie`] into a closure tree.
//!
//! Each live node becomes one boxed closure that already knows its literal,
//! which slots it owns and how to branch to its children. Matching a path is
//! then a chain of direct calls; nothing walks the trie's maps at request time.
//!
//! A node is "live" when its subtree holds at least one store accepted by the
//! filter passed to [`PathMatcher::compile`]. Dead subtrees are dropped, which
//! is how the router builds one matcher per method from a single trie.
//! Compilation walks the trie once per view: once for every distinct set of
//! live stores, plus the catch-all and method-not-allowed views. Methods whose
//! live sets coincide reuse one matcher instead of walking again.
//!
//! Search order at every node, after its literal matched:
//!
//! 1. path ends here → terminal store, else wildcard store with an empty capture;
//! 2. static child selected by the next byte;
//! 3. parameter: up to the next `/` (never empty); terminal store when no `/`
//!    follows, otherwise the nested subtree starting at that `/`;
//! 4. wildcard store capturing the rest of the path.
//!
//! A failed branch returns `None` and the next alternative is tried.

use std::ops::Range;
use std::sync::Arc;

use crate::config::MatcherOptions;
use crate::trie::{Node, NodeId, ParamEdge, StoreId, Trie};

/// Name under which a wildcard capture is reported.
pub const WILDCARD: &str = "*";

/// Byte ranges captured while matching, innermost capture first.
pub type Captures = Vec<(Arc<str>, Range<usize>)>;

type Step = Box<dyn Fn(&str, usize, &mut Captures) -> Option<StoreId> + Send + Sync>;

/// Result of a successful match: the store and the raw captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub store: StoreId,
    pub captures: Captures,
}

impl Hit {
    /// Resolves the captures against the path they were taken from.
    pub fn values<'p>(&self, path: &'p str) -> impl Iterator<Item = (&str, &'p str)> {
        self.captures
            .iter()
            .filter_map(move |(name, range)| Some((name.as_ref(), path.get(range.clone())?)))
    }
}

/// A compiled decision procedure over one view of the route tree.
pub struct PathMatcher {
    root: Option<Step>,
    stores: usize,
}

impl std::fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathMatcher")
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}

impl PathMatcher {
    /// Compiles the part of `trie` whose stores satisfy `live`.
    pub fn compile<S>(trie: &Trie<S>, live: impl Fn(&S) -> bool, options: &MatcherOptions) -> Self {
        let mut compiler = Compiler {
            trie,
            live: &live,
            options,
            wildcard: Arc::from(WILDCARD),
            stores: 0,
        };
        let root = compiler.node(trie.root());
        Self {
            root,
            stores: compiler.stores,
        }
    }

    /// Number of stores reachable through this matcher.
    pub fn store_count(&self) -> usize {
        self.stores
    }

    /// Matches `path`, which must start with `/`.
    pub fn find(&self, path: &str) -> Option<Hit> {
        let root = self.root.as_ref()?;
        if !path.starts_with('/') {
            return None;
        }
        let mut captures = Captures::new();
        let store = root(path, 0, &mut captures)?;
        Some(Hit { store, captures })
    }
}

// How a node checks its own static text. The first byte has always been
// checked by whoever selected the node (parent branch, parameter slash, or
// the root `/` test), so only the rest is compared.
enum Literal {
    Single,
    Short(Box<[u8]>),
    Long(Box<[u8]>),
}

impl Literal {
    fn new(part: &[u8], options: &MatcherOptions) -> Self {
        match part.len() {
            1 => Self::Single,
            n if n <= options.inline_compare_max => Self::Short(part.into()),
            _ => Self::Long(part.into()),
        }
    }

    // Offset just past the literal, if the path carries it at `start`.
    #[inline]
    fn end(&self, path: &[u8], start: usize) -> Option<usize> {
        match self {
            Self::Single => Some(start + 1),
            Self::Short(part) => {
                let end = start + part.len();
                if end > path.len() {
                    return None;
                }
                for i in 1..part.len() {
                    if part[i] != path[start + i] {
                        return None;
                    }
                }
                Some(end)
            }
            Self::Long(part) => {
                let end = start + part.len();
                (path.get(start..end)? == &part[..]).then_some(end)
            }
        }
    }
}

struct Compiler<'t, S> {
    trie: &'t Trie<S>,
    live: &'t dyn Fn(&S) -> bool,
    options: &'t MatcherOptions,
    wildcard: Arc<str>,
    stores: usize,
}

impl<S> Compiler<'_, S> {
    fn keep(&mut self, slot: Option<StoreId>) -> Option<StoreId> {
        let id = slot.filter(|id| (self.live)(self.trie.store(*id)))?;
        self.stores += 1;
        Some(id)
    }

    fn node(&mut self, node: &Node) -> Option<Step> {
        let store = self.keep(node.store);
        let wildcard = self.keep(node.wildcard);

        let mut children = Vec::with_capacity(node.children.len());
        for (&key, &child) in &node.children {
            if let Some(step) = self.child(child) {
                children.push((key, step));
            }
        }
        let branch = self.branch(children);
        let param = node.param.as_ref().and_then(|edge| self.param(edge));

        if store.is_none() && wildcard.is_none() && branch.is_none() && param.is_none() {
            return None;
        }

        let literal = Literal::new(&node.part, self.options);
        let name = self.wildcard.clone();

        Some(Box::new(move |path: &str, start: usize, caps: &mut Captures| {
            let end = literal.end(path.as_bytes(), start)?;

            if end == path.len() {
                if store.is_some() {
                    return store;
                }
                let hit = wildcard?;
                caps.push((name.clone(), end..end));
                return Some(hit);
            }

            if let Some(branch) = &branch {
                if let Some(hit) = branch(path, end, caps) {
                    return Some(hit);
                }
            }

            if let Some(param) = &param {
                if let Some(hit) = param(path, end, caps) {
                    return Some(hit);
                }
            }

            let hit = wildcard?;
            caps.push((name.clone(), end..path.len()));
            Some(hit)
        }))
    }

    fn child(&mut self, id: NodeId) -> Option<Step> {
        let trie = self.trie;
        self.node(trie.node(id))
    }

    // Multi-way branch on the byte at the current offset.
    fn branch(&self, mut children: Vec<(u8, Step)>) -> Option<Step> {
        match children.len() {
            0 => None,
            1 => {
                let (key, step) = children.pop()?;
                Some(Box::new(move |path: &str, at: usize, caps: &mut Captures| {
                    if path.as_bytes().get(at) == Some(&key) {
                        step(path, at, caps)
                    } else {
                        None
                    }
                }))
            }
            n if n >= self.options.jump_table_min => {
                let mut table = Box::new([u16::MAX; 256]);
                let mut steps = Vec::with_capacity(n);
                for (slot, (key, step)) in children.into_iter().enumerate() {
                    table[usize::from(key)] = slot as u16;
                    steps.push(step);
                }
                Some(Box::new(move |path: &str, at: usize, caps: &mut Captures| {
                    let byte = *path.as_bytes().get(at)?;
                    let step = steps.get(usize::from(table[usize::from(byte)]))?;
                    step(path, at, caps)
                }))
            }
            _ => {
                // `children` arrive sorted by key.
                let (keys, steps): (Vec<u8>, Vec<Step>) = children.into_iter().unzip();
                Some(Box::new(move |path: &str, at: usize, caps: &mut Captures| {
                    let byte = path.as_bytes().get(at)?;
                    let slot = keys.binary_search(byte).ok()?;
                    steps[slot](path, at, caps)
                }))
            }
        }
    }

    fn param(&mut self, edge: &ParamEdge) -> Option<Step> {
        let store = self.keep(edge.store);
        let inert = edge.inert.and_then(|id| self.child(id));
        if store.is_none() && inert.is_none() {
            return None;
        }
        let name: Arc<str> = Arc::from(edge.name.as_str());

        Some(Box::new(move |path: &str, start: usize, caps: &mut Captures| {
            let bytes = path.as_bytes();
            match bytes[start..].iter().position(|&b| b == b'/') {
                Some(0) => None,
                None => {
                    let hit = store?;
                    caps.push((name.clone(), start..bytes.len()));
                    Some(hit)
                }
                Some(offset) => {
                    let slash = start + offset;
                    let inert = inert.as_ref()?;
                    let hit = inert(path, slash, caps)?;
                    caps.push((name.clone(), start..slash));
                    Some(hit)
                }
            }
        }))
    }
}
