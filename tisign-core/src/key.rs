//! In-memory representation of a Rabin/RSA signing or validation key.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::bigint;
use crate::error::{FatalError, Result};

/// Fixed RSA validation exponent used by every TI-9x key.
pub const RSA_VALIDATION_EXPONENT: u32 = 17;

/// A Rabin or RSA key, loaded from a key file or a built-in table
/// entry. Which operations are available depends on which fields are
/// populated: `n` alone supports validation; `p`/`q` (Rabin) or `d`
/// (RSA) additionally support signing.
#[derive(Debug, Clone)]
pub struct Key {
    pub filename: Option<String>,
    pub id: u32,
    pub n: BigInt,
    pub e: BigInt,
    pub p: BigInt,
    pub q: BigInt,
    pub qinv: Option<BigInt>,
    pub d: Option<BigInt>,
}

impl Key {
    pub fn new() -> Key {
        Key {
            filename: None,
            id: 0,
            n: BigInt::zero(),
            e: BigInt::from(RSA_VALIDATION_EXPONENT),
            p: BigInt::zero(),
            q: BigInt::zero(),
            qinv: None,
            d: None,
        }
    }

    pub fn has_public(&self) -> bool {
        !self.n.is_zero()
    }

    pub fn has_rabin_private(&self) -> bool {
        !self.p.is_zero() && !self.q.is_zero()
    }

    pub fn has_rsa_private(&self) -> bool {
        self.d.as_ref().map_or(false, |d| !d.is_zero())
    }

    /// `q^-1 mod p`, computed and cached on first use.
    pub fn qinv(&mut self) -> Result<&BigInt> {
        if self.qinv.is_none() {
            if self.p.is_zero() || self.q.is_zero() {
                return Err(FatalError::MissingPrivateKey.into());
            }
            let inv = bigint::mod_inverse(&self.q, &self.p)
                .ok_or(FatalError::UnsuitableRabinKey)?;
            self.qinv = Some(inv);
        }
        Ok(self.qinv.as_ref().unwrap())
    }

    /// RSA signing exponent `d`, computed from `p`/`q` and cached on
    /// first use.
    pub fn rsa_exponent(&mut self) -> Result<&BigInt> {
        if self.d.is_none() || self.d.as_ref().unwrap().is_zero() {
            if self.p.is_zero() || self.q.is_zero() {
                return Err(FatalError::MissingPrivateKey.into());
            }
            let phi = (&self.p - 1) * (&self.q - 1);
            let d = bigint::mod_inverse(&self.e, &phi).ok_or(FatalError::UnsuitableRsaKey)?;
            self.d = Some(d);
        }
        Ok(self.d.as_ref().unwrap())
    }

    /// Self-check: verifies `p*q == n` (Rabin) or that `d` is a true
    /// inverse of `e` mod `(p-1)(q-1)` when only `d` is known (RSA
    /// style files with no factors).
    pub fn verify_consistency(&self) -> Result<()> {
        if self.has_rabin_private() {
            if &self.p * &self.q != self.n {
                return Err(FatalError::InvalidKey.into());
            }
        } else if self.has_rsa_private() {
            let d = self.d.as_ref().unwrap();
            let probe = BigInt::from(RSA_VALIDATION_EXPONENT);
            let enc = probe.modpow(&self.e, &self.n);
            let dec = enc.modpow(d, &self.n);
            if dec != probe {
                return Err(FatalError::InvalidKey.into());
            }
        }
        Ok(())
    }
}

impl Default for Key {
    fn default() -> Self {
        Key::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> Key {
        // small toy factors, p === 3 mod 8, q === 7 mod 8
        let p = BigInt::from(11u32);
        let q = BigInt::from(23u32);
        let mut k = Key::new();
        k.n = &p * &q;
        k.p = p;
        k.q = q;
        k
    }

    #[test]
    fn qinv_is_cached_and_correct() {
        let mut k = sample_key();
        let qinv = k.qinv().unwrap().clone();
        assert_eq!(bigint::mod_euclid(&(&k.q * &qinv), &k.p), BigInt::from(1));
    }

    #[test]
    fn rsa_exponent_inverts_e() {
        let mut k = sample_key();
        let d = k.rsa_exponent().unwrap().clone();
        let phi = (&k.p - 1) * (&k.q - 1);
        assert_eq!(bigint::mod_euclid(&(&d * &k.e), &phi), BigInt::from(1));
    }

    #[test]
    fn consistency_check_rejects_mismatched_factors() {
        let mut k = sample_key();
        k.q = BigInt::from(29u32); // no longer matches n
        assert!(k.verify_consistency().is_err());
    }
}
