//! Hashing, Rabin/RSA signature generation and validation, and the
//! top-level sign/validate dispatch by calculator and data type.

use md5::{Digest, Md5};
use num_bigint::BigInt;
use sha2::Sha256;

// The `md-5` crate's package name uses a hyphen but its library name
// is `md5`, matching the RustCrypto `Digest` trait convention shared
// with `sha2`.

use crate::bigint;
use crate::context;
use crate::error::{FatalError, Result};
use crate::image::Image;
use crate::key::Key;
use crate::tlv;
use crate::types::HashType;

/// Table of `f` choices indexed by `(p mod 8, q mod 8)` (each in
/// `{3,5,7}`, mapped to rows/columns 0-2) and by the Legendre symbols
/// of the transformed hash mod `p` and mod `q`. A value of `99` marks
/// a `(p,q)` combination with no valid `f` -- such keys cannot sign.
const FTAB: [i32; 36] = [
    2, 99, 99, 1, //
    2, 1, 0, 3, //
    2, 3, 0, 1, //
    2, 0, 1, 3, //
    2, 99, 99, 3, //
    2, 3, 1, 0, //
    2, 0, 3, 1, //
    2, 1, 3, 0, //
    2, 99, 99, 1,
];

fn hash_bytes(data: &[u8], hash_type: HashType) -> Vec<u8> {
    match hash_type {
        HashType::Md5 => Md5::digest(data).to_vec(),
        HashType::Sha256 => Sha256::digest(data).to_vec(),
    }
}

/// Apply the `T_f` transform: `m' = 256*hash + 1`, then multiply by
/// `-2, -1, 1, 2` according to `f`.
fn apply_f(hash: &BigInt, n: &BigInt, f: i32) -> BigInt {
    let m = hash * 256 + 1;
    let v = match f {
        0 => bigint::mod_euclid(&(n - (&m + &m)), n),
        1 => bigint::mod_euclid(&(n - &m), n),
        2 => bigint::mod_euclid(&m, n),
        3 => bigint::mod_euclid(&(&m + &m), n),
        _ => unreachable!("f must be 0..=3"),
    };
    v
}

fn rabsigf(hash: &BigInt, key: &Key, qinv: &BigInt, f: i32, rootnum: u8) -> BigInt {
    let mm = apply_f(hash, &key.n, f);
    let mut r = bigint::sqrtm(&mm, &key.p);
    let mut s = bigint::sqrtm(&mm, &key.q);

    if rootnum & 1 != 0 {
        r = &key.p - &r;
    }
    if rootnum & 2 != 0 {
        s = &key.q - &s;
    }

    bigint::crt(&r, &s, &key.p, &key.q, qinv)
}

/// Compute a Rabin signature over `hash`, returning the signature
/// integer and the `f` value chosen.
pub fn sign_rabin(hash: &BigInt, rootnum: u8, key: &mut Key) -> Result<(BigInt, i32)> {
    if !key.has_public() {
        return Err(FatalError::MissingPublicKey.into());
    }
    if !key.has_rabin_private() {
        return Err(FatalError::MissingPrivateKey.into());
    }

    let qinv = key.qinv()?.clone();

    let mm = apply_f(hash, &key.n, 2);
    let m_lp = bigint::legendre(&mm, &key.p);
    let m_lq = bigint::legendre(&mm, &key.q);

    let pm8 = bigint::to_i64(&(&key.p % 8u32)).unwrap_or(0);
    let qm8 = bigint::to_i64(&(&key.q % 8u32)).unwrap_or(0);

    if pm8 == 1 || qm8 == 1 || pm8 % 2 == 0 || qm8 % 2 == 0 {
        return Err(FatalError::UnsuitableRabinKey.into());
    }

    let idx = (if m_lp == 1 { 0 } else { 1 })
        + (if m_lq == 1 { 0 } else { 2 })
        + (((qm8 - 3) / 2) * 4)
        + (((pm8 - 3) / 2) * 12);
    let f = FTAB[idx as usize];
    if f == 99 {
        return Err(FatalError::UnsuitableRabinKey.into());
    }

    let sig = rabsigf(hash, key, &qinv, f, rootnum);
    Ok((sig, f))
}

/// Check that `sig` is a valid Rabin signature of `hash` under `f`.
pub fn validate_rabin(sig: &BigInt, f: i32, hash: &BigInt, key: &Key) -> Result<()> {
    if !key.has_public() {
        return Err(FatalError::MissingPublicKey.into());
    }
    if !(0..=3).contains(&f) {
        return Err(FatalError::SignatureIncorrect.into());
    }

    let a = bigint::mod_euclid(&(sig * sig), &key.n);
    let b = apply_f(hash, &key.n, f);

    if a == b {
        Ok(())
    } else {
        Err(FatalError::SignatureIncorrect.into())
    }
}

/// Compute an RSA signature: `hash^d mod n`.
pub fn sign_rsa(hash: &BigInt, key: &mut Key) -> Result<BigInt> {
    if !key.has_public() {
        return Err(FatalError::MissingPublicKey.into());
    }
    let d = key.rsa_exponent()?.clone();
    Ok(hash.modpow(&d, &key.n))
}

/// Check that `sig^e mod n == hash`.
pub fn validate_rsa(sig: &BigInt, hash: &BigInt, key: &Key) -> Result<()> {
    if !key.has_public() {
        return Err(FatalError::MissingPublicKey.into());
    }
    let m = sig.modpow(&key.e, &key.n);
    if &m == hash {
        Ok(())
    } else {
        Err(FatalError::SignatureIncorrect.into())
    }
}

/// Encode a TLV signature field: tag `0x02 0x3E`, 16-bit length, the
/// signature bytes in little-endian order.
fn encode_signature_field(sig: &BigInt) -> Vec<u8> {
    let mut be = bigint::to_be_bytes_padded(sig, 0);
    be.reverse(); // little-endian export, matching mpz_export order=-1
    let mut out = vec![0x02, 0x3e];
    let len = be.len();
    out.push(((len >> 8) & 0xff) as u8);
    out.push((len & 0xff) as u8);
    out.extend_from_slice(&be);
    out
}

fn decode_signature_field(data: &[u8]) -> Option<(BigInt, usize)> {
    if data.len() < 2 || data[0] != 0x02 {
        return None;
    }
    let high_nibble_ok = (data[1] & 0xf0) == 0x20 || (data[1] & 0xf0) == 0x30;
    if !high_nibble_ok {
        return None;
    }
    let (start, size) = tlv::decode_length(data);
    if start + size > data.len() {
        return None;
    }
    let mut le = data[start..start + size].to_vec();
    le.reverse();
    Some((bigint::from_be_bytes(&le), start + size))
}

/// Sign a TI-8x Flash app in place: appends `0x02 0x3E LL LL <sig> <f
/// marker>` to `app.data`. The app must already be repaired.
pub fn sign_ti8x_app(app: &mut Image, key: &mut Key, rootnum: u8) -> Result<()> {
    if app.data.len() % 64 == 55 {
        context::warning(None, None, "application has length 55 mod 64");
    }

    let hash = bigint::from_be_bytes(&hash_bytes(&app.data, HashType::Md5));
    let (sig, f) = sign_rabin(&hash, rootnum, key)?;

    let mut field = encode_signature_field(&sig);
    if f == 0 {
        field.push(0);
    } else {
        field.push(1);
        field.push(f as u8);
    }
    app.append(&field);
    Ok(())
}

/// Validate a TI-8x Flash app's Rabin signature.
pub fn validate_ti8x_app(app: &Image, key: &Key) -> Result<()> {
    if app.data.len() < 6 {
        return Err(FatalError::MissingHeader.into());
    }
    let (hdrstart, hdrsize) = tlv::decode_length(&app.data);
    let length = hdrstart + hdrsize;
    if length >= app.data.len() {
        return Err(FatalError::IncorrectProgramSize.into());
    }

    let hash = bigint::from_be_bytes(&hash_bytes(&app.data[..length], HashType::Md5));

    let sig_slice = &app.data[length..];
    if sig_slice.len() < 2 {
        return Err(FatalError::MissingRabinSignature.into());
    }
    let (sig, consumed) = decode_signature_field(sig_slice).ok_or(FatalError::MissingRabinSignature)?;

    let f = if sig_slice.get(consumed) == Some(&0) {
        0
    } else {
        *sig_slice.get(consumed + 1).unwrap_or(&0) as i32
    };

    validate_rabin(&sig, f, &hash, key)
}

/// Sign a TI-8x OS in place, writing the RSA signature field to
/// `os.signature`. Hashes `os.header` followed by `os.data`.
pub fn sign_ti8x_os(os: &mut Image, key: &mut Key) -> Result<()> {
    let mut buf = os.header.clone();
    buf.extend_from_slice(&os.data);
    let hash = bigint::from_be_bytes(&hash_bytes(&buf, HashType::Md5));

    let sig = sign_rsa(&hash, key)?;
    os.signature = encode_signature_field(&sig);
    Ok(())
}

/// Validate a TI-8x OS's RSA signature.
pub fn validate_ti8x_os(os: &Image, key: &Key) -> Result<()> {
    if os.signature.len() < 3 {
        return Err(FatalError::MissingRsaSignature.into());
    }
    let (sig, _) = decode_signature_field(&os.signature).ok_or(FatalError::MissingRsaSignature)?;

    let mut buf = os.header.clone();
    buf.extend_from_slice(&os.data);
    let hash = bigint::from_be_bytes(&hash_bytes(&buf, HashType::Md5));

    validate_rsa(&sig, &hash, key)
}

/// Sign a TI-9x app/OS in place, using MD5 or SHA-256 depending on
/// `app.hash_type`. The hash covers the range described by the outer
/// TLV length field, consistently for both signing and validation
/// (see the module-level note on the historical hash-range ambiguity
/// in the design ledger).
pub fn sign_ti9x_app(app: &mut Image, key: &mut Key) -> Result<()> {
    let (hdrstart, hdrsize) = tlv::decode_length(&app.data);
    let length = (hdrstart + hdrsize).min(app.data.len());
    let hash = bigint::from_be_bytes(&hash_bytes(&app.data[..length], app.hash_type));

    let sig = sign_rsa(&hash, key)?;
    let field = encode_signature_field(&sig);
    app.append(&field);
    Ok(())
}

/// Validate a TI-9x app/OS's RSA signature.
pub fn validate_ti9x_app(app: &Image, key: &Key) -> Result<()> {
    if app.data.len() < 6 {
        return Err(FatalError::MissingHeader.into());
    }
    let (hdrstart, hdrsize) = tlv::decode_length(&app.data);
    let length = hdrstart + hdrsize;
    if length + 4 > app.data.len() {
        return Err(FatalError::IncorrectProgramSize.into());
    }

    let hash = bigint::from_be_bytes(&hash_bytes(&app.data[..length.min(app.data.len())], app.hash_type));

    let sig_slice = &app.data[length..];
    let (sig, _) = decode_signature_field(sig_slice).ok_or(FatalError::MissingRsaSignature)?;

    validate_rsa(&sig, &hash, key)
}

/// Top-level dispatch: sign a program image according to its
/// calculator/data type.
pub fn sign_program(app: &mut Image, key: &mut Key, rootnum: u8) -> Result<()> {
    use crate::types::DataType::*;
    if app.calc_type.is_ti8x() {
        match app.data_type {
            App => sign_ti8x_app(app, key, rootnum),
            Os => sign_ti8x_os(app, key),
            _ => Err(FatalError::UnknownProgramType.into()),
        }
    } else if app.calc_type.is_ti9x() {
        match app.data_type {
            App | Os => sign_ti9x_app(app, key),
            _ => Err(FatalError::UnknownProgramType.into()),
        }
    } else {
        Err(FatalError::UnknownProgramType.into())
    }
}

/// Top-level dispatch: validate a program image according to its
/// calculator/data type.
pub fn validate_program(app: &Image, key: &Key) -> Result<()> {
    use crate::types::DataType::*;
    if app.calc_type.is_ti8x() {
        match app.data_type {
            App => validate_ti8x_app(app, key),
            Os => validate_ti8x_os(app, key),
            _ => Err(FatalError::UnknownProgramType.into()),
        }
    } else if app.calc_type.is_ti9x() {
        match app.data_type {
            App | Os => validate_ti9x_app(app, key),
            _ => Err(FatalError::UnknownProgramType.into()),
        }
    } else {
        Err(FatalError::UnknownProgramType.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CalcType, DataType};

    fn toy_key() -> Key {
        // p === 3 mod 8, q === 7 mod 8: a valid Rabin pair.
        let p = BigInt::from(11u32);
        let q = BigInt::from(23u32);
        let mut k = Key::new();
        k.n = &p * &q;
        k.p = p;
        k.q = q;
        k
    }

    #[test]
    fn rabin_sign_and_validate_round_trip() {
        let mut key = toy_key();
        let hash = BigInt::from(9u32);
        let (sig, f) = sign_rabin(&hash, 0, &mut key).unwrap();
        assert!(validate_rabin(&sig, f, &hash, &key).is_ok());
    }

    #[test]
    fn rabin_validate_rejects_wrong_hash() {
        let mut key = toy_key();
        let hash = BigInt::from(9u32);
        let (sig, f) = sign_rabin(&hash, 0, &mut key).unwrap();
        let other_hash = BigInt::from(10u32);
        assert!(validate_rabin(&sig, f, &other_hash, &key).is_err());
    }

    #[test]
    fn rsa_sign_and_validate_round_trip() {
        let p = BigInt::from(61u32);
        let q = BigInt::from(53u32);
        let mut key = Key::new();
        key.n = &p * &q;
        key.p = p;
        key.q = q;
        let hash = BigInt::from(65u32);
        let sig = sign_rsa(&hash, &mut key).unwrap();
        assert!(validate_rsa(&sig, &hash, &key).is_ok());
    }

    #[test]
    fn signature_field_round_trips() {
        let sig = BigInt::from(0x1234u32);
        let field = encode_signature_field(&sig);
        let (decoded, _) = decode_signature_field(&field).unwrap();
        assert_eq!(decoded, sig);
    }

    #[test]
    fn dispatch_rejects_unknown_calc_type() {
        let mut img = Image::new(CalcType::Unknown, DataType::App, HashType::Md5);
        img.data = vec![0x80, 0x0f, 0, 0, 0, 6];
        let mut key = toy_key();
        assert!(sign_program(&mut img, &mut key, 0).is_err());
    }
}
