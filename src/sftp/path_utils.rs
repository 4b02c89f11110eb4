//! Remote SFTP path helpers
//!
//! Remote paths always use `/` regardless of the local or remote OS.

/// Whether `path` ends with one or more separators beyond a bare root
pub fn has_trailing_separator(path: &str) -> bool {
    path.len() > 1 && path.ends_with('/')
}

/// Strip trailing separators, keeping at least one character.
///
/// `"/srv/data//"` becomes `"/srv/data"`; `"/"` and `"//"` stay rooted.
pub fn trim_trailing_separators(path: &str) -> &str {
    let mut trimmed = path;
    while trimmed.len() > 1 && trimmed.ends_with('/') {
        trimmed = &trimmed[..trimmed.len() - 1];
    }
    trimmed
}

/// Whether a directory entry name is the `.` or `..` pseudo-entry
pub fn is_pseudo_entry(name: &str) -> bool {
    name == "." || name == ".."
}
