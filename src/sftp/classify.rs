//! Entry Classifier
//!
//! Servers expose directory type inconsistently. Precedence:
//! 1. permission bits, when the attribute flags say they are present
//! 2. a long listing starting with `d`/`D` (POSIX `ls -l`)
//! 3. a `<DIR>` or `[DIR]` marker anywhere in the listing (case-insensitive)

use super::types::{ATTR_PERMISSIONS, MODE_DIRECTORY, MODE_TYPE_MASK};

/// Whether an entry is a directory, from its attributes and listing line
pub fn classify_directory_entry(flags: u64, permissions: u64, long_entry: &str) -> bool {
    if flags & ATTR_PERMISSIONS != 0 && permissions & MODE_TYPE_MASK == MODE_DIRECTORY {
        return true;
    }

    let bytes = long_entry.as_bytes();
    if matches!(bytes.first(), Some(b'd' | b'D')) {
        return true;
    }

    has_dir_marker(bytes)
}

fn has_dir_marker(bytes: &[u8]) -> bool {
    bytes.windows(5).any(|w| {
        let close = match w[0] {
            b'<' => b'>',
            b'[' => b']',
            _ => return false,
        };
        w[1..4].eq_ignore_ascii_case(b"dir") && w[4] == close
    })
}
