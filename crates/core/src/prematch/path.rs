//! Path canonicalization for pre-match lookups.
//!
//! Purely lexical: nothing here touches the filesystem, so paths on
//! unmounted or remote volumes normalize the same way as local ones.

/// Canonical form of a destination or file path.
///
/// Backslashes become `/`, repeated separators collapse, `.` segments drop,
/// `..` pops the previous segment, the trailing separator goes and the result
/// is lowercased. A leading `/` is kept; `..` never climbs above the root.
pub fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    let normalized = if absolute {
        format!("/{}", joined)
    } else {
        joined
    };
    normalized.to_lowercase()
}

/// Whether `prefix` names `path` itself or one of its ancestors.
///
/// Both arguments must already be normalized. Comparison is by whole segment,
/// so `/library/foo` is not a prefix of `/library/foo2`.
pub fn is_path_prefix(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    if prefix == "/" {
        return path.starts_with('/');
    }

    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Pick the most specific destination that is a prefix of `path`.
///
/// `path` must be normalized; candidates are normalized by the caller too.
pub fn longest_prefix_match<'a, T>(
    path: &str,
    candidates: impl IntoIterator<Item = (&'a str, T)>,
) -> Option<T> {
    candidates
        .into_iter()
        .filter(|(destination, _)| is_path_prefix(destination, path))
        .max_by_key(|(destination, _)| destination.len())
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_separators_and_case() {
        assert_eq!(normalize_path("/Library/Show/"), "/library/show");
        assert_eq!(normalize_path("C:\\Media\\Show"), "c:/media/show");
        assert_eq!(normalize_path("/library//Show///Season 1"), "/library/show/season 1");
    }

    #[test]
    fn test_normalize_dot_segments() {
        assert_eq!(normalize_path("/library/./Show"), "/library/show");
        assert_eq!(normalize_path("/library/Other/../Show"), "/library/show");
        assert_eq!(normalize_path("/../library"), "/library");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_prefix_is_segment_aware() {
        assert!(is_path_prefix("/library/foo", "/library/foo"));
        assert!(is_path_prefix("/library/foo", "/library/foo/ep01.mkv"));
        assert!(!is_path_prefix("/library/foo", "/library/foo2"));
        assert!(!is_path_prefix("/library/foo", "/library/fo"));
        assert!(!is_path_prefix("", "/library/foo"));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let candidates = vec![("/library", 1), ("/library/show", 2), ("/library/show2", 3)];

        assert_eq!(
            longest_prefix_match("/library/show/ep01.mkv", candidates.clone()),
            Some(2)
        );
        assert_eq!(longest_prefix_match("/library/movie.mkv", candidates.clone()), Some(1));
        assert_eq!(longest_prefix_match("/other/show", candidates), None);
    }
}
