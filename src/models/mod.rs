//! Core data models for the static file service.
//!
//! A [`folder::StaticFolder`] carries the storage configuration shared by its
//! files; a [`static_file::StaticFile`] names one file and selects which
//! backend serves it. Both map to SQLite rows via `sqlx::FromRow` and
//! serialize as JSON via `serde`.

pub mod folder;
pub mod static_file;
pub mod upload;

const MAX_PATH_LEN: usize = 1024;

/// Basic path validation to avoid trivial traversal vectors.
///
/// Rejects empty names, names that begin with `/` or have a `..` segment, and
/// names holding backslashes or control characters. Dots inside a segment, as
/// in `v1..2.png`, are fine.
pub(crate) fn is_safe_path(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_PATH_LEN {
        return false;
    }
    if value.starts_with('/') || value.split('/').any(|segment| segment == "..") {
        return false;
    }
    !value
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
}

#[cfg(test)]
mod tests {
    use super::is_safe_path;

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(is_safe_path("logo.png"));
        assert!(is_safe_path("img/2025/logo.png"));
        assert!(!is_safe_path(""));
        assert!(!is_safe_path("/etc/passwd"));
        assert!(!is_safe_path("../secret"));
        assert!(!is_safe_path("a\\b"));
        assert!(!is_safe_path("tab\there"));
    }

    #[test]
    fn only_whole_dot_dot_segments_are_traversal() {
        assert!(is_safe_path("v1..2.png"));
        assert!(is_safe_path("archive/..hidden"));
        assert!(!is_safe_path("img/../../etc/passwd"));
        assert!(!is_safe_path("img/.."));
        assert!(!is_safe_path(".."));
    }
}
