//! Header storage for requests.

/// Insertion-ordered header collection with case-insensitive lookup.
///
/// Duplicate names are coalesced into a single logical value, the individual
/// values joined with `", "` in arrival order. Folded continuation lines are
/// merged the same way by the parser before they reach this map.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a header by name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Adds a header value, coalescing with any existing value under the
    /// same name. The name keeps the casing of its first occurrence.
    pub fn append(&mut self, name: String, value: String) {
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (n, v) in pairs {
            headers.append((*n).to_owned(), (*v).to_owned());
        }
        headers
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let headers = map(&[("Content-Type", "text/plain")]);
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.get("content-length"), None);
    }

    #[test]
    fn duplicates_coalesce_in_order() {
        let headers = map(&[("Accept", "text/html"), ("accept", "application/json")]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Accept"), Some("text/html, application/json"));
    }

    #[test]
    fn first_casing_wins() {
        let headers = map(&[("X-Thing", "a"), ("x-thing", "b")]);
        let (name, value) = headers.iter().next().unwrap();
        assert_eq!(name, "X-Thing");
        assert_eq!(value, "a, b");
    }
}
