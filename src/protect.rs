//! Message protection.
//!
//! The [`Protector`] wraps a [`CertificateRequest`] in a `PKIBody`, builds
//! the `PKIHeader` from [`ProtectionParameters`] and computes the protection
//! value over the DER encoding of the RFC4210 `ProtectedPart`:
//!
//! ```text
//! ProtectedPart ::= SEQUENCE {
//!     header    PKIHeader,
//!     body      PKIBody }
//! ```
//!
//! The scheme computing the protection is pluggable through
//! [`ProtectionScheme`]; [`PasswordBasedMac`] is the scheme used for
//! bootstrap enrollment, where the requester holds no certificate yet.

use alloc::vec::Vec;
use core::fmt;
use std::time::SystemTime;

use cmpv2::body::PkiBody;
use cmpv2::header::{PkiHeader, Pvno};
use cmpv2::message::{PkiMessage, ProtectedPart};
use crmf::request::CertReqMsg;
use der::asn1::{BitString, GeneralizedTime, OctetString};
use der::{Decode, Encode};
use rand_core::CryptoRngCore;
use x509_cert::ext::pkix::name::GeneralName;
use zeroize::Zeroizing;

use crate::errors::{Error, Phase, Result};
use crate::pbm::{PasswordBasedMac, PbmConfig};
use crate::request::CertificateRequest;
use crate::traits::ProtectionScheme;

/// Length of nonces and transaction identifiers drawn by
/// [`ProtectionParameters::generate`]: 128 bits, as RFC4210 recommends.
pub const NONCE_LEN: usize = 16;

/// Inputs to message protection.
///
/// Freshness of the nonce and transaction ID is the caller's responsibility;
/// use [`ProtectionParameters::generate`] to draw new ones per transaction.
#[derive(Clone)]
pub struct ProtectionParameters {
    shared_secret: Zeroizing<String>,
    nonce: Vec<u8>,
    transaction_id: Vec<u8>,
    key_id: String,
}

impl ProtectionParameters {
    /// Create protection parameters.
    ///
    /// `key_id` may be empty; `shared_secret` may not.
    pub fn new(
        shared_secret: impl Into<String>,
        nonce: impl Into<Vec<u8>>,
        transaction_id: impl Into<Vec<u8>>,
        key_id: impl Into<String>,
    ) -> Result<Self> {
        let shared_secret = Zeroizing::new(shared_secret.into());
        if shared_secret.is_empty() {
            return Err(Error::ProtectionSetup("shared secret must be non-empty".into()));
        }

        Ok(Self {
            shared_secret,
            nonce: nonce.into(),
            transaction_id: transaction_id.into(),
            key_id: key_id.into(),
        })
    }

    /// Create protection parameters with a random nonce and transaction ID.
    pub fn generate<R: CryptoRngCore + ?Sized>(
        rng: &mut R,
        shared_secret: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Result<Self> {
        let mut nonce = vec![0u8; NONCE_LEN];
        let mut transaction_id = vec![0u8; NONCE_LEN];
        rng.try_fill_bytes(&mut nonce)
            .and_then(|()| rng.try_fill_bytes(&mut transaction_id))
            .map_err(|e| Error::ProtectionSetup(e.to_string()))?;
        Self::new(shared_secret, nonce, transaction_id, key_id)
    }

    /// Shared secret the MAC key is derived from.
    pub fn shared_secret(&self) -> &str {
        &self.shared_secret
    }

    /// Sender nonce.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Transaction ID.
    pub fn transaction_id(&self) -> &[u8] {
        &self.transaction_id
    }

    /// Sender key ID the responder uses to find the shared secret.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

impl fmt::Debug for ProtectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectionParameters")
            .field("nonce", &self.nonce)
            .field("transaction_id", &self.transaction_id)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Which request operation the body carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyKind {
    /// Certification request (`cr`).
    #[default]
    Certification,
    /// Initialization request (`ir`).
    Initialization,
    /// Key update request (`kur`).
    KeyUpdate,
}

impl BodyKind {
    fn wrap(self, msg: CertReqMsg) -> PkiBody<'static> {
        let messages = vec![msg];
        match self {
            BodyKind::Certification => PkiBody::Cr(messages),
            BodyKind::Initialization => PkiBody::Ir(messages),
            BodyKind::KeyUpdate => PkiBody::KUr(messages),
        }
    }
}

impl fmt::Display for BodyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BodyKind::Certification => "cr",
            BodyKind::Initialization => "ir",
            BodyKind::KeyUpdate => "kur",
        })
    }
}

/// Builds protected `PKIMessage`s with a given [`ProtectionScheme`].
#[derive(Clone, Debug)]
pub struct Protector<S> {
    scheme: S,
    message_time: Option<SystemTime>,
    body_kind: BodyKind,
}

impl Protector<PasswordBasedMac> {
    /// Password-based MAC protection keyed from `params`' shared secret with
    /// the default [`PbmConfig`].
    pub fn password_based<R: CryptoRngCore + ?Sized>(
        rng: &mut R,
        params: &ProtectionParameters,
    ) -> Result<Self> {
        Self::password_based_with_config(rng, params, &PbmConfig::default())
    }

    /// Password-based MAC protection keyed from `params`' shared secret.
    pub fn password_based_with_config<R: CryptoRngCore + ?Sized>(
        rng: &mut R,
        params: &ProtectionParameters,
        config: &PbmConfig,
    ) -> Result<Self> {
        let scheme = PasswordBasedMac::new(rng, params.shared_secret().as_bytes(), config)?;
        Ok(Self::new(scheme))
    }
}

impl<S: ProtectionScheme> Protector<S> {
    /// Create a protector using `scheme`.
    pub fn new(scheme: S) -> Self {
        Self {
            scheme,
            message_time: None,
            body_kind: BodyKind::default(),
        }
    }

    /// Stamp messages with `time` instead of the current time.
    pub fn with_message_time(mut self, time: SystemTime) -> Self {
        self.message_time = Some(time);
        self
    }

    /// Select the request operation carried by the body.
    pub fn with_body_kind(mut self, body_kind: BodyKind) -> Self {
        self.body_kind = body_kind;
        self
    }

    /// Protection scheme in use.
    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    /// Wrap `request` in a protected `PKIMessage`.
    ///
    /// `params` supplies the header fields only. The protection is computed
    /// with the key the scheme already holds, so `params.shared_secret()` is
    /// not consulted, and a password-based scheme reuses its salt for every
    /// message it protects. Use the free [`protect()`] function, or build a new
    /// protector, to key each message from its own parameters.
    pub fn protect(
        &self,
        request: CertificateRequest,
        params: &ProtectionParameters,
    ) -> Result<ProtectedMessage<'static>> {
        let message_time = GeneralizedTime::from_system_time(
            self.message_time.unwrap_or_else(SystemTime::now),
        )
        .map_err(encoding_error)?;

        let header = PkiHeader {
            pvno: Pvno::Cmp2000,
            sender: GeneralName::DirectoryName(request.subject().clone()),
            recipient: GeneralName::DirectoryName(request.issuer().clone()),
            message_time: Some(message_time),
            protection_alg: Some(self.scheme.algorithm_identifier()?),
            sender_kid: Some(octet_string(params.key_id().as_bytes())?),
            recip_kid: None,
            trans_id: Some(octet_string(params.transaction_id())?),
            sender_nonce: Some(octet_string(params.nonce())?),
            recip_nonce: None,
            free_text: None,
            general_info: None,
        };
        let cert_req_id = request.cert_req_id();
        let body = self.body_kind.wrap(request.into_cert_req_msg());

        let protected_part = ProtectedPart { header, body };
        let protection = self
            .scheme
            .protection_value(&protected_part.to_der().map_err(encoding_error)?)?;
        let ProtectedPart { header, body } = protected_part;

        tracing::debug!(
            body = %self.body_kind,
            cert_req_id,
            transaction_id_len = params.transaction_id().len(),
            protection_len = protection.len(),
            "protected certificate request"
        );

        let message = PkiMessage {
            header,
            body,
            protection: Some(BitString::from_bytes(&protection).map_err(encoding_error)?),
            extra_certs: None,
        };

        Ok(ProtectedMessage {
            message,
            protection,
        })
    }
}

/// Protect `request` with a password-based MAC derived from `params`.
///
/// Uses the default [`PbmConfig`] and the current time. A fresh salt is drawn
/// from `rng` on every call.
pub fn protect<R: CryptoRngCore + ?Sized>(
    rng: &mut R,
    request: CertificateRequest,
    params: &ProtectionParameters,
) -> Result<ProtectedMessage<'static>> {
    Protector::password_based(rng, params)?.protect(request, params)
}

/// A `PKIMessage` carrying a protection value.
///
/// Messages built by a [`Protector`] own all of their data and are
/// `ProtectedMessage<'static>`; decoded messages may borrow from their input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectedMessage<'a> {
    message: PkiMessage<'a>,
    protection: Vec<u8>,
}

impl<'a> ProtectedMessage<'a> {
    /// Decode a protected `PKIMessage`.
    pub fn from_der(bytes: &'a [u8]) -> Result<Self> {
        let message = PkiMessage::from_der(bytes).map_err(|e| Error::encoding(Phase::Send, e))?;
        Self::try_from(message)
    }

    /// Message header.
    pub fn header(&self) -> &PkiHeader<'a> {
        &self.message.header
    }

    /// Message body.
    pub fn body(&self) -> &PkiBody<'a> {
        &self.message.body
    }

    /// Protection value.
    pub fn protection_value(&self) -> &[u8] {
        &self.protection
    }

    /// The underlying `PKIMessage`.
    pub fn pki_message(&self) -> &PkiMessage<'a> {
        &self.message
    }

    /// DER encoding of the `ProtectedPart` the protection value covers.
    pub fn protected_part_der(&self) -> Result<Vec<u8>> {
        ProtectedPart {
            header: self.message.header.clone(),
            body: self.message.body.clone(),
        }
        .to_der()
        .map_err(encoding_error)
    }

    /// DER encoding of the whole `PKIMessage`.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.message.to_der().map_err(|e| Error::encoding(Phase::Send, e))
    }

    /// Verify the protection value with `scheme`.
    pub fn verify<S: ProtectionScheme + ?Sized>(&self, scheme: &S) -> Result<()> {
        scheme.verify(&self.protected_part_der()?, &self.protection)
    }

    /// Verify a password-based MAC using the parameters in the header.
    pub fn verify_with_secret(&self, shared_secret: &[u8]) -> Result<()> {
        let algorithm = self
            .message
            .header
            .protection_alg
            .as_ref()
            .ok_or_else(|| Error::ProtectionSetup("header carries no protectionAlg".into()))?;
        let scheme = PasswordBasedMac::from_algorithm_identifier(shared_secret, algorithm)?;
        self.verify(&scheme)
    }
}

impl<'a> TryFrom<PkiMessage<'a>> for ProtectedMessage<'a> {
    type Error = Error;

    fn try_from(message: PkiMessage<'a>) -> Result<Self> {
        let protection = message
            .protection
            .as_ref()
            .and_then(|bits| bits.as_bytes())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                Error::encoding(Phase::Send, "message carries no protection value")
            })?;

        Ok(Self {
            message,
            protection,
        })
    }
}

fn octet_string(bytes: &[u8]) -> Result<OctetString> {
    OctetString::new(bytes).map_err(encoding_error)
}

fn encoding_error(err: der::Error) -> Error {
    Error::encoding(Phase::Protect, err)
}
