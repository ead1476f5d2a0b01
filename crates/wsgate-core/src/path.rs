//! Session identifier derivation from the upgrade request path.

/// Derive the session identifier from a request path.
///
/// Drops any query string, strips one leading `/` and returns the first
/// `/`-separated segment: `/stream/ws` yields `stream`. Returns an empty
/// string when there is no segment (`/`, `""`, `//ws`).
pub fn session_id_from_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.strip_prefix('/').unwrap_or(path);
    path.split('/').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_segment() {
        assert_eq!(session_id_from_path("/stream/ws"), "stream");
        assert_eq!(session_id_from_path("/cam1"), "cam1");
        assert_eq!(session_id_from_path("cam1/ws"), "cam1");
    }

    #[test]
    fn query_is_ignored() {
        assert_eq!(session_id_from_path("/stream/ws?token=x"), "stream");
        assert_eq!(session_id_from_path("/stream?x=1"), "stream");
    }

    #[test]
    fn empty_paths() {
        assert_eq!(session_id_from_path("/"), "");
        assert_eq!(session_id_from_path(""), "");
        assert_eq!(session_id_from_path("//ws"), "");
        assert_eq!(session_id_from_path("/?a=b"), "");
    }
}
