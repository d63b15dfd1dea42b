//! Destination key resolution

use uuid::Uuid;

/// Fresh random identifier (UUID v4, 122 random bits)
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Resolve the destination key for an upload.
///
/// The caller's path is trimmed; when nothing is left a random identifier
/// is generated, placed under `namespace` if one is configured.
pub fn resolve_path(path: &str, namespace: Option<&str>) -> String {
    let path = path.trim();
    if !path.is_empty() {
        return path.to_string();
    }

    let id = new_request_id();
    match namespace.map(|ns| ns.trim_matches('/')).filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("{}/{}", ns, id),
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_path_is_trimmed() {
        assert_eq!(resolve_path("  a/b.txt \n", None), "a/b.txt");
        assert_eq!(resolve_path("a/b.txt", Some("ns")), "a/b.txt");
    }

    #[test]
    fn test_blank_path_generates_identifier() {
        let first = resolve_path("  ", None);
        let second = resolve_path("  ", None);

        assert!(Uuid::parse_str(&first).is_ok());
        assert_ne!(first, second);
    }

    #[test]
    fn test_generated_identifier_uses_namespace() {
        let key = resolve_path("", Some("/common-io/"));
        let (ns, id) = key.split_once('/').unwrap();
        assert_eq!(ns, "common-io");
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_empty_namespace_is_ignored() {
        let key = resolve_path("", Some(""));
        assert!(Uuid::parse_str(&key).is_ok());
    }
}
