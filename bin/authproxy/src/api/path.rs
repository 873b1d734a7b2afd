//! Request path checks applied before authorisation and forwarding.
//!
//! Roles are authorised against the raw request path and that same path is sent to the backend.
//! Paths the backend, or the URL parser used to reach it, could resolve to a different
//! location are rejected instead: dot segments (`.` and `..`, percent-encoded or not),
//! encoded path separators and backslashes.

/// The request path is not in a form that can be safely authorised and forwarded.
#[derive(Debug, thiserror::Error)]
#[error("request path '{0}' contains relative or encoded separator segments")]
pub struct InvalidPath(pub String);

/// Check that the request path resolves to itself.
pub fn check(path: &str) -> Result<(), InvalidPath> {
    if !path.starts_with('/') || path.contains('\\') {
        return Err(InvalidPath(path.to_string()));
    }
    for segment in path.split('/') {
        let segment = segment.to_ascii_lowercase();
        if segment.contains("%2f") || segment.contains("%5c") {
            return Err(InvalidPath(path.to_string()));
        }
        let decoded = segment.replace("%2e", ".");
        if decoded == "." || decoded == ".." {
            return Err(InvalidPath(path.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::check;

    #[test]
    fn plain_paths_are_accepted() {
        for path in [
            "/",
            "/protected",
            "/ops/status",
            "/files/report.v2.json",
            "/files/..hidden",
            "/items/%20spaced",
        ] {
            assert!(check(path).is_ok(), "path {} should be accepted", path);
        }
    }

    #[test]
    fn dot_segments_are_rejected() {
        for path in [
            "/ops/../protected",
            "/ops/./status",
            "/ops/..",
            "/ops/%2e%2e/protected",
            "/ops/%2E%2e/protected",
            "/ops/.%2E/protected",
            "/ops/%2e/status",
        ] {
            assert!(check(path).is_err(), "path {} should be rejected", path);
        }
    }

    #[test]
    fn encoded_separators_are_rejected() {
        for path in [
            "/ops/x%2f..%2fprotected",
            "/ops/x%2F..",
            "/ops/x%5c..%5cprotected",
            "/ops\\..\\protected",
            "relative/path",
        ] {
            assert!(check(path).is_err(), "path {} should be rejected", path);
        }
    }
}
