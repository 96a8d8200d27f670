//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::fmt::Error;
use std::fmt::Formatter;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::prelude::CompressedRistretto;
use crate::prelude::RistrettoPoint;
use crate::prelude::Scalar;

/// Length of a compressed Ristretto255 point and of a canonical scalar
pub const ENCODED_LEN: usize = 32;

/// Name of the PAIR mode written to key configuration files
pub const PAIR_MODE: &str = "SHA512Ristretto255";

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("invalid hash salt: {0}")]
    InvalidSalt(String),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),
}

/// The three single-record operations of the PAIR protocol
///
/// Every operation takes and returns the textual form of a record, which is
/// the standard base64 encoding of a compressed Ristretto255 point for any
/// ciphertext. Encryption is commutative: re-encrypting a ciphertext with a
/// second key yields the same value regardless of which key went first.
pub trait PairCipher: Send + Sync {
    /// Hashes a raw identifier with the shared salt onto the curve and
    /// exponentiates it with the private key
    fn encrypt(&self, id: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Exponentiates an existing ciphertext with the private key
    fn re_encrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Removes this key's layer from a ciphertext
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// PAIR private key bound to a hash salt
///
/// The salt only matters to `encrypt`; `re_encrypt` and `decrypt` work on
/// curve points directly.
///
/// # Example
///
/// ```
/// use crypto::pair::{gen_private_key, PairCipher, PairPrivateKey};
///
/// let salt = "c2FsdHNhbHRzYWx0c2FsdHNhbHRzYWx0c2FsdHNhbHQ=";
/// let publisher = PairPrivateKey::new(salt, &gen_private_key()).unwrap();
/// let advertiser = PairPrivateKey::new(salt, &gen_private_key()).unwrap();
///
/// let once = publisher.encrypt(b"someone@example.com").unwrap();
/// let twice = advertiser.re_encrypt(&once).unwrap();
/// assert_eq!(advertiser.decrypt(&twice).unwrap(), once);
/// ```
pub struct PairPrivateKey {
    salt: Zeroizing<Vec<u8>>,
    key: Zeroizing<Scalar>,
    inverse: Zeroizing<Scalar>,
}

impl PairPrivateKey {
    /// Builds a key from a base64 hash salt and a base64 private key
    pub fn new(hash_salt: &str, private_key: &str) -> Result<PairPrivateKey, CipherError> {
        let salt = STANDARD
            .decode(hash_salt.trim())
            .map_err(|e| CipherError::InvalidSalt(e.to_string()))?;
        let key = scalar_from_str(private_key)?;

        Ok(PairPrivateKey {
            salt: Zeroizing::new(salt),
            inverse: Zeroizing::new(key.invert()),
            key: Zeroizing::new(key),
        })
    }

    fn hash_to_point(&self, id: &[u8]) -> RistrettoPoint {
        let mut hasher = Sha512::new();
        hasher.update(self.salt.as_slice());
        hasher.update(id);
        RistrettoPoint::from_hash(hasher)
    }
}

impl PairCipher for PairPrivateKey {
    fn encrypt(&self, id: &[u8]) -> Result<Vec<u8>, CipherError> {
        let p = self.hash_to_point(id) * *self.key;
        Ok(encode_point(&p))
    }

    fn re_encrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let p = decode_point(ciphertext)? * *self.key;
        Ok(encode_point(&p))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let p = decode_point(ciphertext)? * *self.inverse;
        Ok(encode_point(&p))
    }
}

impl Debug for PairPrivateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "PAIR private key ({})", PAIR_MODE)
    }
}

fn encode_point(p: &RistrettoPoint) -> Vec<u8> {
    STANDARD.encode(p.compress().as_bytes()).into_bytes()
}

fn decode_point(ciphertext: &[u8]) -> Result<RistrettoPoint, CipherError> {
    let bytes = STANDARD
        .decode(ciphertext)
        .map_err(|e| CipherError::MalformedCiphertext(e.to_string()))?;
    CompressedRistretto::from_slice(&bytes)
        .map_err(|_| {
            CipherError::MalformedCiphertext(format!(
                "expected {} bytes, got {}",
                ENCODED_LEN,
                bytes.len()
            ))
        })?
        .decompress()
        .ok_or_else(|| CipherError::MalformedCiphertext("not a Ristretto255 point".to_string()))
}

/// Parses a base64 canonical scalar, rejecting zero
pub fn scalar_from_str(private_key: &str) -> Result<Scalar, CipherError> {
    let bytes = Zeroizing::new(
        STANDARD
            .decode(private_key.trim())
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?,
    );
    let raw: [u8; ENCODED_LEN] = bytes.as_slice().try_into().map_err(|_| {
        CipherError::InvalidKey(format!(
            "expected {} bytes, got {}",
            ENCODED_LEN,
            bytes.len()
        ))
    })?;
    let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(raw))
        .ok_or_else(|| CipherError::InvalidKey("scalar is not canonical".to_string()))?;
    if scalar == Scalar::ZERO {
        return Err(CipherError::InvalidKey("scalar is zero".to_string()));
    }
    Ok(scalar)
}

/// Generates random Scalar
///
/// the method uses
/// [CSPRNG](https://rust-num.github.io/num/rand/index.html#cryptographic-security)
/// random generator.
pub fn gen_scalar() -> Scalar {
    let mut rng = OsRng;
    let mut scalar_bytes = Zeroizing::new([0u8; 64]);
    rng.fill_bytes(scalar_bytes.as_mut());
    Scalar::from_bytes_mod_order_wide(&scalar_bytes)
}

/// Generates a fresh private key in its base64 text form
pub fn gen_private_key() -> String {
    STANDARD.encode(gen_scalar().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salt() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        STANDARD.encode(bytes)
    }

    #[test]
    fn encryption_commutes() {
        let salt = salt();
        let a = PairPrivateKey::new(&salt, &gen_private_key()).unwrap();
        let b = PairPrivateKey::new(&salt, &gen_private_key()).unwrap();

        for id in ["a@example.com", "b@example.com", "c@example.com"] {
            let ab = b.re_encrypt(&a.encrypt(id.as_bytes()).unwrap()).unwrap();
            let ba = a.re_encrypt(&b.encrypt(id.as_bytes()).unwrap()).unwrap();
            assert_eq!(ab, ba);
        }
    }

    #[test]
    fn decrypt_removes_own_layer() {
        let salt = salt();
        let publisher = PairPrivateKey::new(&salt, &gen_private_key()).unwrap();
        let advertiser = PairPrivateKey::new(&salt, &gen_private_key()).unwrap();

        let once = publisher.encrypt(b"someone@example.com").unwrap();
        let twice = advertiser.re_encrypt(&once).unwrap();
        let triple = publisher.re_encrypt(&advertiser.encrypt(b"x").unwrap()).unwrap();

        assert_eq!(advertiser.decrypt(&twice).unwrap(), once);
        assert_eq!(
            advertiser.decrypt(&triple).unwrap(),
            publisher.encrypt(b"x").unwrap()
        );
    }

    #[test]
    fn encrypt_is_deterministic_per_salt() {
        let key = gen_private_key();
        let k1 = PairPrivateKey::new(&salt(), &key).unwrap();
        let k2 = PairPrivateKey::new(&salt(), &key).unwrap();

        assert_eq!(k1.encrypt(b"id").unwrap(), k1.encrypt(b"id").unwrap());
        assert_ne!(k1.encrypt(b"id").unwrap(), k2.encrypt(b"id").unwrap());
        assert_eq!(k1.encrypt(b"id").unwrap().len(), 44);
    }

    #[test]
    fn malformed_ciphertext_is_rejected() {
        let k = PairPrivateKey::new(&salt(), &gen_private_key()).unwrap();
        assert!(matches!(
            k.re_encrypt(b"not base64!"),
            Err(CipherError::MalformedCiphertext(_))
        ));
        assert!(matches!(
            k.decrypt(STANDARD.encode([1u8; 16]).as_bytes()),
            Err(CipherError::MalformedCiphertext(_))
        ));
        // 32 bytes that do not decode to a point
        assert!(matches!(
            k.decrypt(STANDARD.encode([0xffu8; 32]).as_bytes()),
            Err(CipherError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let salt = salt();
        assert!(matches!(
            PairPrivateKey::new(&salt, "???"),
            Err(CipherError::InvalidKey(_))
        ));
        assert!(matches!(
            PairPrivateKey::new(&salt, &STANDARD.encode([0u8; 32])),
            Err(CipherError::InvalidKey(_))
        ));
        assert!(matches!(
            PairPrivateKey::new(&salt, &STANDARD.encode([0xffu8; 32])),
            Err(CipherError::InvalidKey(_))
        ));
        assert!(matches!(
            PairPrivateKey::new("not base64!", &gen_private_key()),
            Err(CipherError::InvalidSalt(_))
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let k = PairPrivateKey::new(&salt(), &gen_private_key()).unwrap();
        assert_eq!(format!("{:?}", k), "PAIR private key (SHA512Ristretto255)");
    }
}
