//! Built-in key table and key-file search path.
//!
//! The historical tool ships with a table of TI's own signing keys
//! compiled in, consulted before falling back to key files on disk.
//! Shipping real TI key material would make this an attractive target
//! for misuse, so the built-in table here holds only clearly-labeled
//! sample keys generated for this project -- sufficient to exercise
//! the search-path and self-check logic in tests, useless for
//! producing anything a real calculator would accept.

use std::env;
use std::fs;
use std::path::PathBuf;

use num_bigint::BigInt;

use crate::error::{FatalError, Result};
use crate::key::Key;
use crate::keyfile;

struct BuiltinEntry {
    id: u32,
    n: &'static str,
    p: Option<&'static str>,
    q: Option<&'static str>,
    d: Option<&'static str>,
}

/// Sample keys only -- see module docs. `n`/`p`/`q`/`d` are encoded in
/// the key-file hex-value format (length prefix + little-endian hex
/// bytes) so they can go through the same parser as a key file.
const BUILTIN_KEYS: &[BuiltinEntry] = &[
    BuiltinEntry {
        id: 0x01,
        n: "01FD", // 11 * 23 = 253, a toy Rabin pair for tests only
        p: Some("010B"),
        q: Some("0117"),
        d: None,
    },
];

fn parse_builtin_value(s: &str) -> Result<BigInt> {
    keyfile::parse_key_value(s).ok_or_else(|| FatalError::KeySyntax.into())
}

/// Look up a builtin key by ID. `public_only` additionally searches a
/// (currently empty) public-only table once the private table misses.
fn find_builtin(id: u32) -> Option<Result<Key>> {
    for entry in BUILTIN_KEYS {
        if entry.id == id {
            return Some((|| {
                let mut key = Key::new();
                key.id = id;
                key.n = parse_builtin_value(entry.n)?;
                if let Some(p) = entry.p {
                    key.p = parse_builtin_value(p)?;
                }
                if let Some(q) = entry.q {
                    key.q = parse_builtin_value(q)?;
                }
                if let Some(d) = entry.d {
                    key.d = Some(parse_builtin_value(d)?);
                }
                Ok(key)
            })());
        }
    }
    None
}

fn try_key_file(path: &PathBuf) -> Option<Result<Key>> {
    let text = fs::read_to_string(path).ok()?;
    Some(
        keyfile::read_key_file(&text, path.to_str())
            .and_then(|k| k.verify_consistency().map(|_| k)),
    )
}

/// Search order: bare filename in the current directory, then
/// `$TISIGN_KEY_DIR/filename`.
fn find_key_file(filename: &str) -> Option<Result<Key>> {
    if let Some(result) = try_key_file(&PathBuf::from(filename)) {
        return Some(result);
    }
    if let Ok(dir) = env::var("TISIGN_KEY_DIR") {
        let mut path = PathBuf::from(dir);
        path.push(filename);
        if let Some(result) = try_key_file(&path) {
            return Some(result);
        }
    }
    None
}

/// Find a key for `id`, trying the built-in table first, then
/// `<id>.key`/`<id>.pub` in 2- or 4-digit, upper- or lower-case hex
/// along the search path. `public_only` permits the `.pub`-suffixed
/// (public-only) forms as a final resort.
pub fn find_for_id(id: u32, public_only: bool) -> Result<Key> {
    if let Some(result) = find_builtin(id) {
        return result;
    }

    let mut names = Vec::new();
    for ext in ["key", "pub"] {
        if ext == "pub" && !public_only {
            continue;
        }
        if id > 0xff {
            names.push(format!("{:04x}.{}", id, ext));
            names.push(format!("{:04X}.{}", id, ext));
        } else {
            names.push(format!("{:02x}.{}", id, ext));
            names.push(format!("{:02X}.{}", id, ext));
        }
    }

    for name in &names {
        if let Some(result) = find_key_file(name) {
            return result.map(|mut k| {
                if k.id == 0 {
                    k.id = id;
                }
                k
            });
        }
    }

    Err(FatalError::KeyNotFound(id).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sample_key_loads() {
        let key = find_for_id(0x01, false).unwrap();
        assert_eq!(key.id, 0x01);
        assert!(key.has_public());
    }

    #[test]
    fn unknown_id_without_file_is_not_found() {
        let res = find_for_id(0xBEEF, true);
        assert!(res.is_err());
    }
}
