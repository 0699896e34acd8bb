//! Arbitrary-precision helpers layered on `num-bigint`.
//!
//! These are free functions rather than an extension trait because
//! most of them (CRT, the two square-root variants) take several
//! related operands and read more clearly as standalone routines.

use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, Zero};

/// Decode a big-endian byte string into a non-negative integer.
pub fn from_be_bytes(bytes: &[u8]) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, bytes)
}

/// Encode a non-negative integer as a big-endian byte string, padded
/// with leading zero bytes to at least `min_len` bytes.
pub fn to_be_bytes_padded(value: &BigInt, min_len: usize) -> Vec<u8> {
    let (_, mut bytes) = value.to_bytes_be();
    if bytes.len() < min_len {
        let mut padded = vec![0u8; min_len - bytes.len()];
        padded.append(&mut bytes);
        return padded;
    }
    bytes
}

/// Euclidean remainder: always in `[0, modulus)`, unlike `%`.
pub fn mod_euclid(value: &BigInt, modulus: &BigInt) -> BigInt {
    let m = value % modulus;
    if m.is_negative() {
        m + modulus
    } else {
        m
    }
}

/// Extended Euclidean algorithm: returns `(g, x, y)` with
/// `a*x + b*y == g == gcd(a, b)`.
pub fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    let (mut old_r, mut r) = (a.clone(), b.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());
    let (mut old_t, mut t) = (BigInt::zero(), BigInt::one());

    while !r.is_zero() {
        let quotient = &old_r / &r;
        let new_r = &old_r - &quotient * &r;
        old_r = r;
        r = new_r;
        let new_s = &old_s - &quotient * &s;
        old_s = s;
        s = new_s;
        let new_t = &old_t - &quotient * &t;
        old_t = t;
        t = new_t;
    }
    (old_r, old_s, old_t)
}

/// Modular inverse of `a` mod `m`, or `None` if `gcd(a, m) != 1`.
pub fn mod_inverse(a: &BigInt, m: &BigInt) -> Option<BigInt> {
    let (g, x, _) = extended_gcd(a, m);
    if g == BigInt::one() {
        Some(mod_euclid(&x, m))
    } else if g == -BigInt::one() {
        Some(mod_euclid(&-x, m))
    } else {
        None
    }
}

/// Legendre symbol `(a|p)` for an odd prime `p`: -1, 0, or 1.
pub fn legendre(a: &BigInt, p: &BigInt) -> i32 {
    let a = mod_euclid(a, p);
    if a.is_zero() {
        return 0;
    }
    let exp = (p - BigInt::one()) / BigInt::from(2);
    let r = a.modpow(&exp, p);
    if r == BigInt::one() {
        1
    } else {
        -1
    }
}

/// Square root of `x` mod a prime `p === 3 (mod 4)`. Caller must
/// ensure `(x|p) == 1`.
pub fn sqrtm_3(x: &BigInt, p: &BigInt) -> BigInt {
    let exp = (p + BigInt::one()) >> 2;
    x.modpow(&exp, p)
}

/// Square root of `x` mod a prime `p === 5 (mod 8)`. Caller must
/// ensure `(x|p) == 1`.
pub fn sqrtm_5(x: &BigInt, p: &BigInt) -> BigInt {
    let exp = (p + BigInt::from(3)) >> 3;
    let mut res = x.modpow(&exp, p);

    if mod_euclid(&(&res * &res - x), p) != BigInt::zero() {
        let exp2 = (p - BigInt::one()) >> 2;
        let two = BigInt::from(2);
        let adjust = two.modpow(&exp2, p);
        res = mod_euclid(&(&res * &adjust), p);
    }
    res
}

/// Square root of `x` modulo a prime `p === 3, 5, or 7 (mod 8)`.
pub fn sqrtm(x: &BigInt, p: &BigInt) -> BigInt {
    let pm8 = to_i64(&(p % BigInt::from(8))).unwrap_or(0);
    if pm8 == 5 {
        sqrtm_5(x, p)
    } else {
        sqrtm_3(x, p)
    }
}

/// Chinese remainder: the unique `x (mod p*q)` with `x === r (mod p)`
/// and `x === s (mod q)`, given `qinv = q^-1 mod p`.
pub fn crt(r: &BigInt, s: &BigInt, p: &BigInt, q: &BigInt, qinv: &BigInt) -> BigInt {
    let diff = mod_euclid(&(r - s), p);
    let t = mod_euclid(&(diff * qinv), p);
    t * q + s
}

/// Convert a small `BigInt` (one known to fit) to an `i64`.
pub fn to_i64(value: &BigInt) -> Option<i64> {
    use num_traits::ToPrimitive;
    value.to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_gcd_satisfies_bezout() {
        let a = BigInt::from(240);
        let b = BigInt::from(46);
        let (g, x, y) = extended_gcd(&a, &b);
        assert_eq!(g, BigInt::from(2));
        assert_eq!(&a * &x + &b * &y, g);
    }

    #[test]
    fn mod_inverse_round_trips() {
        let a = BigInt::from(17);
        let m = BigInt::from(3120);
        let inv = mod_inverse(&a, &m).unwrap();
        assert_eq!(mod_euclid(&(&a * &inv), &m), BigInt::one());
    }

    #[test]
    fn legendre_of_quadratic_residue() {
        // 4 is a QR mod 7 (2^2 = 4)
        assert_eq!(legendre(&BigInt::from(4), &BigInt::from(7)), 1);
        // 5 is not a QR mod 7
        assert_eq!(legendre(&BigInt::from(5), &BigInt::from(7)), -1);
    }

    #[test]
    fn sqrtm_3_recovers_root() {
        let p = BigInt::from(11); // 11 = 3 mod 4
        let x = BigInt::from(9);
        let root = sqrtm_3(&x, &p);
        assert_eq!(mod_euclid(&(&root * &root), &p), x);
    }

    #[test]
    fn sqrtm_5_recovers_root() {
        let p = BigInt::from(13); // 13 = 5 mod 8
        let x = BigInt::from(4);
        let root = sqrtm_5(&x, &p);
        assert_eq!(mod_euclid(&(&root * &root), &p), x);
    }

    #[test]
    fn crt_combines_residues() {
        let p = BigInt::from(11);
        let q = BigInt::from(13);
        let qinv = mod_inverse(&q, &p).unwrap();
        let r = BigInt::from(5);
        let s = BigInt::from(7);
        let x = crt(&r, &s, &p, &q, &qinv);
        assert_eq!(mod_euclid(&x, &p), r);
        assert_eq!(mod_euclid(&x, &q), s);
    }

    #[test]
    fn be_bytes_roundtrip_with_padding() {
        let v = BigInt::from(0x1234);
        let bytes = to_be_bytes_padded(&v, 4);
        assert_eq!(bytes, vec![0, 0, 0x12, 0x34]);
        assert_eq!(from_be_bytes(&bytes), v);
    }
}
