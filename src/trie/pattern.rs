//! Route pattern normalization and segmentation.

use super::RouteError;

/// A route pattern broken into the pieces the trie consumes.
///
/// `"/users/:id/posts/:post"` becomes the inert (static) segments
/// `["/users/", "/posts/"]` and the parameter names `["id", "post"]`. Every
/// inert segment after the first starts with `/`, because a parameter always
/// runs to the next slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pattern {
    /// The normalized pattern, trailing `*` included.
    pub(crate) normalized: String,
    pub(crate) inert: Vec<String>,
    pub(crate) params: Vec<String>,
    pub(crate) wildcard: bool,
}

impl Pattern {
    /// Normalizes and splits `raw`.
    ///
    /// An empty pattern means `/` and a missing leading slash is added. A `*`
    /// is only accepted as the final character.
    pub(crate) fn parse(raw: &str) -> Result<Self, RouteError> {
        let normalized = normalize(raw);
        let mut path = normalized.as_str();

        let wildcard = path.ends_with('*');
        if wildcard {
            path = &path[..path.len() - 1];
        }
        if path.contains('*') {
            return Err(RouteError::MisplacedWildcard { path: normalized });
        }

        let invalid = |reason| RouteError::InvalidPath {
            path: normalized.clone(),
            reason,
        };

        let mut inert = Vec::new();
        let mut params: Vec<String> = Vec::new();
        let mut rest = path;
        loop {
            let Some(at) = rest.find(':') else {
                inert.push(rest.to_owned());
                break;
            };
            inert.push(rest[..at].to_owned());

            let after = &rest[at + 1..];
            let end = after.find('/').unwrap_or(after.len());
            let name = &after[..end];
            if name.is_empty() {
                return Err(invalid("parameter name is empty"));
            }
            if params.iter().any(|p| p == name) {
                return Err(invalid("parameter name is used twice"));
            }
            params.push(name.to_owned());

            rest = &after[end..];
            if rest.is_empty() {
                break;
            }
        }

        if wildcard && inert.len() == params.len() {
            return Err(invalid("wildcard cannot directly follow a parameter"));
        }

        Ok(Self {
            normalized,
            inert,
            params,
            wildcard,
        })
    }

    /// `true` when the pattern ends with a parameter rather than static text.
    pub(crate) fn ends_with_param(&self) -> bool {
        self.inert.len() == self.params.len()
    }
}

/// Applies the pattern normalization rules without validating.
pub(crate) fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        "/".to_owned()
    } else if raw.starts_with('/') {
        raw.to_owned()
    } else {
        format!("/{raw}")
    }
}
