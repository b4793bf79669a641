//! Reversible mapping between filter names and snapshot file names.
//!
//! Names made only of `[A-Za-z0-9_.-]` that do not start with `.` are used
//! verbatim. Any other byte (and a leading `.`) is written as `%XX` with
//! uppercase hex digits. The empty name is stored as `%`.
//!
//! Encoded names never start with `.`, which leaves dot-files free for
//! temporary files.

use cuckoo_tonic_core::Error;

const EMPTY: &str = "%";
const HEX: &[u8; 16] = b"0123456789ABCDEF";
const TEMP_SUFFIX: &str = ".tmp";

const fn is_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-')
}

/// Encodes a filter name into a file name.
pub fn to_file_name(name: &str) -> String {
    if name.is_empty() {
        return EMPTY.to_owned();
    }

    let mut out = String::with_capacity(name.len());
    for (i, &byte) in name.as_bytes().iter().enumerate() {
        if is_safe(byte) && !(i == 0 && byte == b'.') {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX[usize::from(byte >> 4)] as char);
            out.push(HEX[usize::from(byte & 0x0F)] as char);
        }
    }
    out
}

/// Decodes a file name produced by [`to_file_name`].
///
/// # Errors
///
/// Returns [`Error::InvalidSnapshotName`] for truncated or non-hex escapes,
/// unescaped unsafe bytes, escapes that do not decode to UTF-8, and any
/// spelling other than the one [`to_file_name`] produces.
pub fn from_file_name(file_name: &str) -> Result<String, Error> {
    if file_name == EMPTY {
        return Ok(String::new());
    }

    let invalid = || Error::InvalidSnapshotName {
        file_name: file_name.to_owned(),
    };

    let mut bytes = Vec::with_capacity(file_name.len());
    let mut iter = file_name.bytes();
    while let Some(byte) = iter.next() {
        match byte {
            b'%' => {
                let hi = iter.next().and_then(hex_value).ok_or_else(invalid)?;
                let lo = iter.next().and_then(hex_value).ok_or_else(invalid)?;
                bytes.push((hi << 4) | lo);
            }
            b'.' if bytes.is_empty() => return Err(invalid()),
            b if is_safe(b) => bytes.push(b),
            _ => return Err(invalid()),
        }
    }

    let name = String::from_utf8(bytes).map_err(|_| invalid())?;

    // Only the canonical spelling is accepted, so two files never alias one
    // filter.
    if to_file_name(&name) != file_name {
        return Err(invalid());
    }
    Ok(name)
}

/// Name of the temporary file a snapshot is staged in before the rename.
pub fn temp_file_name(file_name: &str) -> String {
    format!(".{file_name}{TEMP_SUFFIX}")
}

/// Whether a directory entry is a leftover staging file.
pub fn is_temp_file(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(TEMP_SUFFIX)
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_verbatim() {
        for name in ["f1", "users_2024", "a.b-c", "A9"] {
            assert_eq!(to_file_name(name), name);
        }
    }

    #[test]
    fn unsafe_bytes_are_escaped() {
        assert_eq!(to_file_name("a/b"), "a%2Fb");
        assert_eq!(to_file_name("../etc"), "%2E.%2Fetc");
        assert_eq!(to_file_name("50%"), "50%25");
        assert_eq!(to_file_name("é"), "%C3%A9");
        assert_eq!(to_file_name(""), "%");
    }

    #[test]
    fn encoding_is_reversible() {
        for name in ["", "f1", "a/b", ".hidden", "..", "50%", "é ü", "x.tmp", "%"] {
            let file = to_file_name(name);
            assert!(!file.starts_with('.'), "{file}");
            assert_eq!(from_file_name(&file).unwrap(), name);
        }
    }

    #[test]
    fn non_canonical_spellings_are_rejected() {
        for file in ["a%2fb", "%66%31", "f%31", "%2Ehidden%2e"] {
            assert!(
                matches!(from_file_name(file), Err(Error::InvalidSnapshotName { .. })),
                "{file}"
            );
        }
        assert_eq!(from_file_name("a%2Fb").unwrap(), "a/b");
        assert_eq!(from_file_name("%2Ehidden").unwrap(), ".hidden");
    }

    #[test]
    fn malformed_names_are_rejected() {
        for file in ["%2", "%ZZ", "a b", ".hidden", "%FF", "a%"] {
            assert!(
                matches!(from_file_name(file), Err(Error::InvalidSnapshotName { .. })),
                "{file}"
            );
        }
    }

    #[test]
    fn temp_files_are_dot_files() {
        let temp = temp_file_name(&to_file_name("f1"));
        assert_eq!(temp, ".f1.tmp");
        assert!(is_temp_file(&temp));
        assert!(!is_temp_file("f1.tmp"));
    }
}
