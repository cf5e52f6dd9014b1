//! Key pair generation for requests which do not supply their own key.

use core::{fmt, str::FromStr};

use pkcs8::{spki, Document, EncodePublicKey};
use rand_core::CryptoRngCore;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::errors::{Error, Result};

/// Modulus size used when no bit length is requested.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Public key algorithms the key generator knows how to produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyAlgorithm {
    /// RSA (`rsaEncryption`).
    #[default]
    Rsa,
}

impl FromStr for KeyAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("RSA") {
            Ok(KeyAlgorithm::Rsa)
        } else {
            Err(Error::UnsupportedAlgorithm(s.into()))
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa => f.write_str("RSA"),
        }
    }
}

/// Parameters for generating a fresh key pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyGenParameters {
    /// Key algorithm.
    pub algorithm: KeyAlgorithm,
    /// Key size in bits.
    pub bits: usize,
}

impl KeyGenParameters {
    /// Parse `algorithm` by name and pair it with `bits`.
    pub fn new(algorithm: &str, bits: usize) -> Result<Self> {
        Ok(Self {
            algorithm: algorithm.parse()?,
            bits,
        })
    }
}

impl Default for KeyGenParameters {
    fn default() -> Self {
        Self {
            algorithm: KeyAlgorithm::Rsa,
            bits: DEFAULT_KEY_BITS,
        }
    }
}

/// A generated key pair.
///
/// The private half never leaves this value unless the caller asks for it;
/// the certificate request only ever sees the public key.
#[derive(Clone, Debug)]
pub enum KeyPair {
    /// RSA key pair.
    Rsa(RsaPrivateKey),
}

impl KeyPair {
    /// Generate a key pair with the given parameters using `rng`.
    pub fn generate<R: CryptoRngCore + ?Sized>(
        rng: &mut R,
        params: &KeyGenParameters,
    ) -> Result<Self> {
        tracing::debug!(algorithm = %params.algorithm, bits = params.bits, "generating key pair");

        match params.algorithm {
            KeyAlgorithm::Rsa => RsaPrivateKey::new(rng, params.bits)
                .map(KeyPair::Rsa)
                .map_err(|e| Error::KeyGeneration(e.to_string())),
        }
    }

    /// Algorithm of this key pair.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa(_) => KeyAlgorithm::Rsa,
        }
    }

    /// Borrow the RSA private key, if this is an RSA key pair.
    pub fn as_rsa(&self) -> Option<&RsaPrivateKey> {
        match self {
            KeyPair::Rsa(key) => Some(key),
        }
    }
}

impl From<RsaPrivateKey> for KeyPair {
    fn from(key: RsaPrivateKey) -> Self {
        KeyPair::Rsa(key)
    }
}

impl EncodePublicKey for KeyPair {
    fn to_public_key_der(&self) -> spki::Result<Document> {
        match self {
            KeyPair::Rsa(key) => RsaPublicKey::from(key).to_public_key_der(),
        }
    }
}
