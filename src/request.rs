//! Certificate request messages as described in [RFC4211 § 3].
//!
//! A [`CertificateRequest`] is a single CRMF `CertReqMsg` carrying the
//! subject, the issuer, the subject public key and a `raVerified`
//! proof-of-possession. Protection of the enclosing message is shared-secret
//! based, so no client signature is computed over the request.
//!
//! [RFC4211 § 3]: https://datatracker.ietf.org/doc/html/rfc4211#section-3

use core::str::FromStr;

use crmf::pop::ProofOfPossession;
use crmf::request::{CertReqMsg, CertRequest, CertTemplate};
use der::asn1::{Int, Null};
use der::{Decode, Encode};
use pkcs8::EncodePublicKey;
use rand_core::CryptoRngCore;
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::name::Name;

use crate::errors::{Error, Phase, Result};
use crate::keygen::{KeyGenParameters, KeyPair};

/// An immutable CRMF certificate request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateRequest {
    cert_req_id: i64,
    subject: Name,
    issuer: Name,
    public_key_info: SubjectPublicKeyInfoOwned,
    msg: CertReqMsg,
}

impl CertificateRequest {
    /// Request identifier, unique within one transaction.
    pub fn cert_req_id(&self) -> i64 {
        self.cert_req_id
    }

    /// Subject the certificate is requested for.
    pub fn subject(&self) -> &Name {
        &self.subject
    }

    /// Issuer the certificate is requested from.
    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    /// Subject public key, as placed in the certificate template.
    pub fn public_key_info(&self) -> &SubjectPublicKeyInfoOwned {
        &self.public_key_info
    }

    /// The underlying CRMF structure.
    pub fn cert_req_msg(&self) -> &CertReqMsg {
        &self.msg
    }

    /// Consume the request, returning the underlying CRMF structure.
    pub fn into_cert_req_msg(self) -> CertReqMsg {
        self.msg
    }

    /// DER encoding of the `CertReqMsg`.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.msg.to_der().map_err(|e| Error::encoding(Phase::Build, e))
    }
}

/// Builder for [`CertificateRequest`].
///
/// Both names are given in [RFC4514] string form, e.g. `"CN=test,O=Org"`.
///
/// [RFC4514]: https://datatracker.ietf.org/doc/html/rfc4514
#[derive(Clone, Copy, Debug)]
pub struct RequestBuilder<'a> {
    subject: &'a str,
    issuer: &'a str,
    cert_req_id: i64,
}

impl<'a> RequestBuilder<'a> {
    /// Create a builder for a request from `subject` to `issuer`.
    pub fn new(subject: &'a str, issuer: &'a str, cert_req_id: i64) -> Self {
        Self {
            subject,
            issuer,
            cert_req_id,
        }
    }

    /// Build a request for the public half of `key`.
    pub fn build<K: EncodePublicKey + ?Sized>(&self, key: &K) -> Result<CertificateRequest> {
        let (subject, issuer) = self.names()?;
        let document = key
            .to_public_key_der()
            .map_err(|e| Error::encoding(Phase::Build, e))?;
        self.assemble(subject, issuer, document.as_bytes())
    }

    /// Generate a key pair with `params` and build a request for it.
    ///
    /// Names are validated before any key material is generated.
    pub fn build_with_generated_key<R: CryptoRngCore + ?Sized>(
        &self,
        rng: &mut R,
        params: &KeyGenParameters,
    ) -> Result<(CertificateRequest, KeyPair)> {
        let (subject, issuer) = self.names()?;
        let key_pair = KeyPair::generate(rng, params)?;
        let document = key_pair
            .to_public_key_der()
            .map_err(|e| Error::encoding(Phase::Build, e))?;
        let request = self.assemble(subject, issuer, document.as_bytes())?;
        Ok((request, key_pair))
    }

    fn names(&self) -> Result<(Name, Name)> {
        Ok((parse_name(self.subject)?, parse_name(self.issuer)?))
    }

    fn assemble(&self, subject: Name, issuer: Name, spki_der: &[u8]) -> Result<CertificateRequest> {
        // round-trip through DER to validate the engine's encoding
        let public_key_info = SubjectPublicKeyInfoOwned::from_der(spki_der)
            .map_err(|e| Error::encoding(Phase::Build, e))?;
        let cert_req_id = self
            .cert_req_id
            .to_der()
            .and_then(|der| Int::from_der(&der))
            .map_err(|e| Error::encoding(Phase::Build, e))?;

        let cert_template = CertTemplate {
            version: None,
            serial_number: None,
            signature: None,
            issuer: Some(issuer.clone()),
            validity: None,
            subject: Some(subject.clone()),
            subject_public_key_info: Some(public_key_info.clone()),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: None,
        };

        let msg = CertReqMsg {
            cert_req: CertRequest {
                cert_req_id,
                cert_template,
                controls: None,
            },
            popo: Some(ProofOfPossession::RaVerified(Null)),
            reg_info: None,
        };

        tracing::debug!(
            subject = %subject,
            issuer = %issuer,
            cert_req_id = self.cert_req_id,
            "built certificate request"
        );

        Ok(CertificateRequest {
            cert_req_id: self.cert_req_id,
            subject,
            issuer,
            public_key_info,
            msg,
        })
    }
}

/// Parse an [RFC4514] distinguished name.
///
/// Whitespace after an unescaped `,` or `+` separator is ignored, so
/// `"CN=new, O=HYS"` and `"CN=new,O=HYS"` name the same entity.
///
/// The string lists RDNs most significant last, so `"CN=test,O=Org"`
/// encodes as `SEQUENCE { O=Org, CN=test }`. Encoders that keep string
/// order (such as BouncyCastle's `X500Name`) put `CN` first instead, and the
/// two encodings do not compare equal.
///
/// [RFC4514]: https://datatracker.ietf.org/doc/html/rfc4514
pub fn parse_name(dn: &str) -> Result<Name> {
    let normalized = normalize_separators(dn);
    if normalized.is_empty() {
        return Err(Error::MalformedName {
            name: dn.into(),
            reason: "empty name".into(),
        });
    }

    Name::from_str(&normalized).map_err(|e| Error::MalformedName {
        name: dn.into(),
        reason: e.to_string(),
    })
}

fn normalize_separators(dn: &str) -> String {
    let mut out = String::with_capacity(dn.len());
    let mut escaped = false;
    let mut skip_space = true;

    for c in dn.trim().chars() {
        if skip_space && c.is_whitespace() {
            continue;
        }
        skip_space = false;
        out.push(c);

        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' || c == '+' {
            skip_space = true;
        }
    }

    out
}
