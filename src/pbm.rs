//! Password-based MAC protection as described in [RFC4210 § 5.1.3.1].
//!
//! The MAC key is derived from a shared secret and a random salt by applying
//! a one-way function `iterationCount` times:
//!
//! ```text
//! BASEKEY = OWF^iterationCount(secret || salt)
//! protection = MAC(BASEKEY, DER(ProtectedPart))
//! ```
//!
//! The salt, iteration count and both algorithms travel in the header's
//! `protectionAlg` as a `PBMParameter`, so the responder can derive the same
//! key from its copy of the secret.
//!
//! [RFC4210 § 5.1.3.1]: https://datatracker.ietf.org/doc/html/rfc4210#section-5.1.3.1

use alloc::vec::Vec;
use core::fmt;

use cmpv2::parameter::PbmParameter;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, Null, OctetString};
use digest::Digest;
use hmac::{Hmac, Mac};
use rand_core::CryptoRngCore;
use sha1::Sha1;
use spki::AlgorithmIdentifierOwned;
use zeroize::Zeroizing;

use crate::errors::{Error, Phase, Result};
use crate::traits::ProtectionScheme;

/// ObjectID for `id-PasswordBasedMac`
pub const ID_PASSWORD_BASED_MAC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113533.7.66.13");

/// ObjectID for SHA-1
pub const ID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");

/// ObjectID for SHA-256
pub const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// ObjectID for `hmac-sha1` as listed in RFC4210 Appendix D.2
pub const ID_HMAC_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.8.1.2");

/// ObjectID for PKCS#5 `id-hmacWithSHA1`
pub const ID_HMAC_WITH_SHA1: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.2.7");

/// ObjectID for PKCS#5 `id-hmacWithSHA256`
pub const ID_HMAC_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.2.9");

/// Salt length used when none is configured.
pub const DEFAULT_SALT_LEN: usize = 20;

/// Iteration count used when none is configured.
pub const DEFAULT_ITERATION_COUNT: u32 = 1000;

/// Largest iteration count accepted, for our own messages and received ones.
pub const MAX_ITERATION_COUNT: u32 = 100_000;

/// One-way function used to derive the MAC key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OneWayFunction {
    /// SHA-1
    #[default]
    Sha1,
    /// SHA-256
    #[cfg(feature = "sha2")]
    Sha256,
}

impl OneWayFunction {
    /// Algorithm OID.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            OneWayFunction::Sha1 => ID_SHA1,
            #[cfg(feature = "sha2")]
            OneWayFunction::Sha256 => ID_SHA256,
        }
    }

    /// Look up a one-way function by OID.
    pub fn from_oid(oid: ObjectIdentifier) -> Option<Self> {
        match oid {
            ID_SHA1 => Some(OneWayFunction::Sha1),
            #[cfg(feature = "sha2")]
            ID_SHA256 => Some(OneWayFunction::Sha256),
            _ => None,
        }
    }

    /// `AlgorithmIdentifier` with absent parameters.
    pub fn algorithm_identifier(&self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: None,
        }
    }

    fn derive_key(&self, secret: &[u8], salt: &[u8], iteration_count: u32) -> Zeroizing<Vec<u8>> {
        match self {
            OneWayFunction::Sha1 => iterate::<Sha1>(secret, salt, iteration_count),
            #[cfg(feature = "sha2")]
            OneWayFunction::Sha256 => iterate::<sha2::Sha256>(secret, salt, iteration_count),
        }
    }
}

/// MAC algorithm keyed with the derived key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MacAlgorithm {
    /// HMAC-SHA1
    #[default]
    HmacSha1,
    /// HMAC-SHA256
    #[cfg(feature = "sha2")]
    HmacSha256,
}

impl MacAlgorithm {
    /// Algorithm OID written into new messages.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            MacAlgorithm::HmacSha1 => ID_HMAC_SHA1,
            #[cfg(feature = "sha2")]
            MacAlgorithm::HmacSha256 => ID_HMAC_WITH_SHA256,
        }
    }

    /// Look up a MAC algorithm by OID.
    ///
    /// Both the RFC4210 and the PKCS#5 identifiers of HMAC-SHA1 are accepted.
    pub fn from_oid(oid: ObjectIdentifier) -> Option<Self> {
        match oid {
            ID_HMAC_SHA1 | ID_HMAC_WITH_SHA1 => Some(MacAlgorithm::HmacSha1),
            #[cfg(feature = "sha2")]
            ID_HMAC_WITH_SHA256 => Some(MacAlgorithm::HmacSha256),
            _ => None,
        }
    }

    /// `AlgorithmIdentifier` with NULL parameters.
    pub fn algorithm_identifier(&self) -> Result<AlgorithmIdentifierOwned> {
        Ok(AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: Some(Any::encode_from(&Null).map_err(setup_error)?),
        })
    }

    fn compute(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self {
            MacAlgorithm::HmacSha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(setup_error)?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            #[cfg(feature = "sha2")]
            MacAlgorithm::HmacSha256 => {
                let mut mac = Hmac::<sha2::Sha256>::new_from_slice(key).map_err(setup_error)?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }
}

/// Password-based MAC configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PbmConfig {
    /// Length of the random salt.
    pub salt_len: usize,
    /// Number of one-way function applications.
    pub iteration_count: u32,
    /// One-way function.
    pub owf: OneWayFunction,
    /// MAC algorithm.
    pub mac: MacAlgorithm,
}

impl Default for PbmConfig {
    fn default() -> Self {
        Self {
            salt_len: DEFAULT_SALT_LEN,
            iteration_count: DEFAULT_ITERATION_COUNT,
            owf: OneWayFunction::default(),
            mac: MacAlgorithm::default(),
        }
    }
}

/// Shared-secret MAC protection.
///
/// Holds the derived MAC key, never the secret itself. The key is wiped on
/// drop.
#[derive(Clone)]
pub struct PasswordBasedMac {
    key: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    iteration_count: u32,
    owf: OneWayFunction,
    mac: MacAlgorithm,
}

impl PasswordBasedMac {
    /// Derive a MAC key from `secret` and a fresh random salt.
    pub fn new<R: CryptoRngCore + ?Sized>(
        rng: &mut R,
        secret: &[u8],
        config: &PbmConfig,
    ) -> Result<Self> {
        if config.salt_len == 0 {
            return Err(Error::ProtectionSetup("salt length must be non-zero".into()));
        }

        let mut salt = vec![0u8; config.salt_len];
        rng.try_fill_bytes(&mut salt).map_err(setup_error)?;
        Self::with_salt(secret, &salt, config)
    }

    /// Derive a MAC key from `secret` and a caller supplied `salt`.
    ///
    /// `config.salt_len` is ignored.
    pub fn with_salt(secret: &[u8], salt: &[u8], config: &PbmConfig) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::ProtectionSetup("shared secret must be non-empty".into()));
        }
        if salt.is_empty() {
            return Err(Error::ProtectionSetup("salt must be non-empty".into()));
        }
        if !(1..=MAX_ITERATION_COUNT).contains(&config.iteration_count) {
            return Err(Error::ProtectionSetup(format!(
                "iteration count {} outside 1..={}",
                config.iteration_count, MAX_ITERATION_COUNT
            )));
        }

        Ok(Self {
            key: config.owf.derive_key(secret, salt, config.iteration_count),
            salt: salt.to_vec(),
            iteration_count: config.iteration_count,
            owf: config.owf,
            mac: config.mac,
        })
    }

    /// Rebuild the MAC from a received `protectionAlg`.
    pub fn from_algorithm_identifier(
        secret: &[u8],
        algorithm: &AlgorithmIdentifierOwned,
    ) -> Result<Self> {
        if algorithm.oid != ID_PASSWORD_BASED_MAC {
            return Err(Error::ProtectionSetup(format!(
                "unexpected protection algorithm {}",
                algorithm.oid
            )));
        }

        let params = algorithm
            .parameters
            .as_ref()
            .ok_or_else(|| Error::ProtectionSetup("missing PBMParameter".into()))?
            .decode_as::<PbmParameter>()
            .map_err(setup_error)?;

        let owf = OneWayFunction::from_oid(params.owf.oid).ok_or_else(|| {
            Error::ProtectionSetup(format!("unsupported one-way function {}", params.owf.oid))
        })?;
        let mac = MacAlgorithm::from_oid(params.mac.oid).ok_or_else(|| {
            Error::ProtectionSetup(format!("unsupported MAC algorithm {}", params.mac.oid))
        })?;
        let iteration_count = u32::try_from(params.iteration_count).map_err(|_| {
            Error::ProtectionSetup(format!(
                "iteration count {} out of range",
                params.iteration_count
            ))
        })?;

        let config = PbmConfig {
            salt_len: params.salt.as_bytes().len(),
            iteration_count,
            owf,
            mac,
        };
        Self::with_salt(secret, params.salt.as_bytes(), &config)
    }

    /// Salt mixed into the derived key.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Number of one-way function applications.
    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    /// One-way function.
    pub fn owf(&self) -> OneWayFunction {
        self.owf
    }

    /// MAC algorithm.
    pub fn mac(&self) -> MacAlgorithm {
        self.mac
    }

    /// The `PBMParameter` describing this MAC.
    pub fn parameter(&self) -> Result<PbmParameter> {
        Ok(PbmParameter {
            salt: OctetString::new(self.salt.clone()).map_err(setup_error)?,
            owf: self.owf.algorithm_identifier(),
            iteration_count: u64::from(self.iteration_count),
            mac: self.mac.algorithm_identifier()?,
        })
    }
}

impl ProtectionScheme for PasswordBasedMac {
    fn algorithm_identifier(&self) -> Result<AlgorithmIdentifierOwned> {
        let parameter = self.parameter()?;
        Ok(AlgorithmIdentifierOwned {
            oid: ID_PASSWORD_BASED_MAC,
            parameters: Some(
                Any::encode_from(&parameter).map_err(|e| Error::encoding(Phase::Protect, e))?,
            ),
        })
    }

    fn protection_value(&self, protected_part: &[u8]) -> Result<Vec<u8>> {
        self.mac.compute(&self.key, protected_part)
    }
}

impl fmt::Debug for PasswordBasedMac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordBasedMac")
            .field("salt", &self.salt)
            .field("iteration_count", &self.iteration_count)
            .field("owf", &self.owf)
            .field("mac", &self.mac)
            .finish_non_exhaustive()
    }
}

fn iterate<D: Digest>(secret: &[u8], salt: &[u8], iteration_count: u32) -> Zeroizing<Vec<u8>> {
    let mut hasher = D::new();
    hasher.update(secret);
    hasher.update(salt);
    let mut key = Zeroizing::new(hasher.finalize().to_vec());

    for _ in 1..iteration_count {
        key = Zeroizing::new(D::digest(key.as_slice()).to_vec());
    }

    key
}

fn setup_error(err: impl fmt::Display) -> Error {
    Error::ProtectionSetup(err.to_string())
}
