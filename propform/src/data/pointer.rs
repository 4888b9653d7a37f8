//! Model paths are JSON-Pointer-like strings rooted at the schema name,
//! e.g. `Book/authors/0/name`. Property names are escaped per RFC 6901.

/// Escape a single path segment (`~` → `~0`, `/` → `~1`).
pub fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Reverse of [`escape`].
pub fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Append a property name to a path.
pub fn join(base: &str, name: &str) -> String {
    format!("{base}/{}", escape(name))
}

/// Append an array index to a path.
pub fn join_index(base: &str, index: usize) -> String {
    format!("{base}/{index}")
}

/// Split a path into unescaped segments.
pub fn segments(path: &str) -> Vec<String> {
    path.split('/').map(unescape).collect()
}

/// Path of the enclosing slot, if any.
pub fn parent(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

/// Schema name a path is rooted at.
pub fn root(path: &str) -> &str {
    path.split('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_roundtrip() {
        assert_eq!(escape("a/b~c"), "a~1b~0c");
        assert_eq!(unescape("a~1b~0c"), "a/b~c");
        assert_eq!(unescape(&escape("~1")), "~1");
    }

    #[test]
    fn test_join_and_parent() {
        let p = join(&join_index(&join("Book", "authors"), 2), "first/last");
        assert_eq!(p, "Book/authors/2/first~1last");
        assert_eq!(parent(&p), Some("Book/authors/2"));
        assert_eq!(root(&p), "Book");
        assert_eq!(
            segments(&p),
            vec!["Book", "authors", "2", "first/last"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(parent("Book"), None);
    }
}
