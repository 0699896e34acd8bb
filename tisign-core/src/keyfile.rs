//! Text key-file codec.
//!
//! A numeric value is written as a hex length prefix followed by that
//! many hex-pair bytes, **least significant byte first**. Values up
//! to 0xff bytes use a 2-digit length prefix; longer values use a
//! 4-digit prefix.
//!
//! "RSA" style files are 2-3 lines: key ID, `n`, optional `d`. They
//! are recognised by a first line shorter than 11 characters (a bare
//! hex key ID, as opposed to a length-prefixed numeric value).
//! "Rabin" style files are 1-4 lines: `n`, optional `e`, optional
//! `p`/`q` pair.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::bigint::from_be_bytes;
use crate::error::{FatalError, Result};
use crate::key::Key;

fn parse_value(line: &str) -> Option<BigInt> {
    let line = line.trim_end();
    let (prefix_len, count) = if line.len() >= 2 {
        u32::from_str_radix(&line[0..2], 16)
            .ok()
            .map(|c| (2usize, c as usize))
            .filter(|&(_, c)| c * 2 + 3 >= line.len())
    } else {
        None
    }
    .or_else(|| {
        if line.len() >= 4 {
            u32::from_str_radix(&line[0..4], 16)
                .ok()
                .map(|c| (4usize, c as usize))
                .filter(|&(_, c)| c * 2 + 5 >= line.len())
        } else {
            None
        }
    })?;

    let hex_body = &line[prefix_len..];
    if hex_body.len() < count * 2 {
        return None;
    }
    let mut bytes = vec![0u8; count];
    for i in 0..count {
        let byte_str = &hex_body[2 * i..2 * i + 2];
        bytes[count - 1 - i] = u8::from_str_radix(byte_str, 16).ok()?;
    }
    Some(from_be_bytes(&bytes))
}

fn value_to_line(value: &BigInt) -> String {
    let (_, mut bytes) = value.to_bytes_be();
    bytes.reverse(); // little-endian order, least significant byte first
    let count = bytes.len();
    let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
    if count <= 0xff {
        format!("{:02X}{}", count, hex)
    } else {
        format!("{:04X}{}", count, hex)
    }
}

/// Parse a single value written in the key-file hex format, outside
/// the context of a whole file (used for built-in table entries).
pub fn parse_key_value(s: &str) -> Option<BigInt> {
    parse_value(s)
}

/// Parse a key file's text contents into a `Key`.
pub fn read_key_file(text: &str, filename: Option<&str>) -> Result<Key> {
    let mut lines = text.lines();
    let first = lines.next().ok_or(FatalError::KeySyntax)?;
    let mut key = Key::new();
    key.filename = filename.map(|s| s.to_string());

    if first.trim_end().len() < 11 {
        key.id = u32::from_str_radix(first.trim(), 16).map_err(|_| FatalError::KeySyntax)?;

        let n_line = lines.next().ok_or(FatalError::KeySyntax)?;
        key.n = parse_value(n_line).ok_or(FatalError::KeySyntax)?;

        if let Some(d_line) = lines.next() {
            key.d = parse_value(d_line);
        }
        key.p = BigInt::zero();
        key.q = BigInt::zero();
        key.qinv = None;
    } else {
        key.n = parse_value(first).ok_or(FatalError::KeySyntax)?;

        let mut next_line = lines.next();
        if let Some(line) = next_line {
            if line.trim_end().len() < 11 {
                if let Some(e) = parse_value(line) {
                    key.e = e;
                }
                next_line = lines.next();
            }
        }

        match (next_line, next_line.and(lines.next())) {
            (Some(p_line), Some(q_line)) => {
                if let (Some(p), Some(q)) = (parse_value(p_line), parse_value(q_line)) {
                    key.p = p;
                    key.q = q;
                }
            }
            _ => {}
        }
        key.qinv = None;
        key.d = None;
        key.id = 0;
    }

    Ok(key)
}

/// Serialize a key back to text, writing as many lines as the key
/// actually has data for (public-only, Rabin private, or RSA
/// private).
pub fn write_key_file(key: &Key) -> String {
    let mut out = String::new();
    if key.has_rsa_private() || (!key.has_rabin_private() && key.id != 0) {
        out.push_str(&format!("{:X}\n", key.id));
        out.push_str(&value_to_line(&key.n));
        out.push('\n');
        if let Some(d) = &key.d {
            out.push_str(&value_to_line(d));
            out.push('\n');
        }
    } else {
        out.push_str(&value_to_line(&key.n));
        out.push('\n');
        out.push_str(&value_to_line(&key.e));
        out.push('\n');
        if key.has_rabin_private() {
            out.push_str(&value_to_line(&key.p));
            out.push('\n');
            out.push_str(&value_to_line(&key.q));
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hex_value_roundtrips() {
        let v = BigInt::from(0x1234);
        let line = value_to_line(&v);
        assert_eq!(parse_value(&line).unwrap(), v);
    }

    #[test]
    fn rabin_style_file_parses() {
        let n = BigInt::from(11u32) * BigInt::from(23u32);
        let p = BigInt::from(11u32);
        let q = BigInt::from(23u32);
        let text = format!(
            "{}\n{}\n{}\n{}\n",
            value_to_line(&n),
            value_to_line(&BigInt::from(2u32)), // unused custom e in this toy test
            value_to_line(&p),
            value_to_line(&q)
        );
        let key = read_key_file(&text, None).unwrap();
        assert_eq!(key.n, n);
        assert_eq!(key.p, p);
        assert_eq!(key.q, q);
    }

    #[test]
    fn rsa_style_file_parses_key_id() {
        let n = BigInt::from(91u32);
        let text = format!("1A2B\n{}\n", value_to_line(&n));
        let key = read_key_file(&text, None).unwrap();
        assert_eq!(key.id, 0x1A2B);
        assert_eq!(key.n, n);
        assert!(key.p.is_zero());
    }
}
