//! Header map with case-insensitive name lookup.

/// An insertion-ordered, multi-value header map.
///
/// Names compare case-insensitively; values are kept verbatim. Requests carry
/// a handful of headers, so lookups scan a flat list rather than hashing.
///
/// # Examples
///
/// ```
/// use rroute::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Content-Type", "application/json; charset=utf-8");
/// headers.append("Vary", "Origin");
/// headers.append("Vary", "Accept");
///
/// assert_eq!(headers.media_type(), Some("application/json"));
/// assert_eq!(headers.get_all("vary").collect::<Vec<_>>(), ["Origin", "Accept"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    value: String,
}

impl Entry {
    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Adds a value for `name`, keeping the ones already there.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Entry {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Leaves `value` as the only value of `name`.
    ///
    /// The first existing entry is overwritten in place, so the header keeps
    /// its position; any further duplicates are dropped.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.entries.iter().position(|entry| entry.is(&name)) {
            Some(first) => {
                self.entries[first].value = value.into();
                let mut index = 0;
                self.entries.retain(|entry| {
                    let keep = index <= first || !entry.is(&name);
                    index += 1;
                    keep
                });
            }
            None => self.append(name, value),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Every value of `name`, in the order they were added.
    pub fn get_all<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.entries
            .iter()
            .filter(move |entry| entry.is(name))
            .map(|entry| entry.value.as_str())
    }

    /// Drops every value of `name`; `true` if there was one.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| !entry.is(name));
        self.entries.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The `Content-Type` essence: everything before the first `;`, trimmed.
    pub fn media_type(&self) -> Option<&str> {
        let value = self.get("content-type")?;
        let essence = value.split_once(';').map_or(value, |(essence, _)| essence);
        Some(essence.trim())
    }

    /// Number of entries, counting repeated names separately.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.append("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(h.contains("Content-type"));
        assert!(!h.contains("accept"));
    }

    #[test]
    fn set_replaces_all_values_in_place() {
        let mut h = Headers::new();
        h.append("Allow", "GET");
        h.append("X-Id", "1");
        h.append("allow", "POST");
        h.set("Allow", "GET, POST");
        assert_eq!(h.get_all("allow").collect::<Vec<_>>(), vec!["GET, POST"]);
        assert_eq!(h.len(), 2);

        h.set("Cache-Control", "no-store");
        assert_eq!(h.get("cache-control"), Some("no-store"));
    }

    #[test]
    fn media_type_strips_parameters() {
        let mut h = Headers::new();
        h.append("content-type", " application/x-www-form-urlencoded ; charset=utf-8");
        assert_eq!(h.media_type(), Some("application/x-www-form-urlencoded"));
        assert_eq!(Headers::new().media_type(), None);
    }

    #[test]
    fn remove_reports_whether_anything_went() {
        let mut h = Headers::new();
        h.append("X-Foo", "bar");
        assert!(h.remove("x-foo"));
        assert!(h.is_empty());
        assert!(!h.remove("x-foo"));
    }
}
