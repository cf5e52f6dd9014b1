#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc = include_str!("../README.md")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/RustCrypto/meta/master/logo_small.png")]
#![warn(missing_docs)]

//! # Enrollment flow
//!
//! An enrollment is four steps, each a plain function call on the calling
//! thread:
//!
//! 1. [`RequestBuilder`] assembles a CRMF [`CertificateRequest`].
//! 2. [`Protector`] wraps it in a `PKIMessage` and computes the
//!    [RFC4210 § 5.1.3.1] password-based MAC.
//! 3. [`HttpTransport`] POSTs the DER encoding to the responder.
//! 4. [`pem::format_pem`] renders the response for storage.
//!
//! Randomness is always passed in explicitly. Any
//! [`CryptoRngCore`](rand_core::CryptoRngCore) works; seeded RNGs make the
//! whole flow reproducible in tests.
//!
//! ## Building and protecting a request
//!
//! ```
//! use cmp_client::{protect, ProtectionParameters, RequestBuilder};
//! use cmp_client::cmpv2::body::PkiBody;
//! use rsa::{RsaPrivateKey, RsaPublicKey};
//!
//! let mut rng = rand::thread_rng(); // rand@0.8
//!
//! let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate a key");
//! let public_key = RsaPublicKey::from(&private_key);
//!
//! let request = RequestBuilder::new("CN=test,O=Org", "CN=CA,O=Org", 1)
//!     .build(&public_key)
//!     .expect("failed to build request");
//!
//! let params = ProtectionParameters::generate(&mut rng, "password", "1")
//!     .expect("failed to draw nonce");
//! let message = protect(&mut rng, request, &params).expect("failed to protect");
//!
//! assert!(matches!(message.body(), PkiBody::Cr(requests) if requests.len() == 1));
//! message.verify_with_secret(b"password").expect("MAC must verify");
//! ```
//!
//! ## Sending it
//!
#![cfg_attr(all(feature = "http", feature = "pem"), doc = "```no_run")]
#![cfg_attr(not(all(feature = "http", feature = "pem")), doc = "```ignore")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//! use cmp_client::{
//!     pem::CERTIFICATE_LABEL, protect, HttpTransport, KeyGenParameters, ProtectionParameters,
//!     RequestBuilder, ServerEndpoint,
//! };
//!
//! let mut rng = rand::thread_rng(); // rand@0.8
//!
//! let (request, _key_pair) = RequestBuilder::new("CN=new,O=HYS", "CN=ManagementCA", 2)
//!     .build_with_generated_key(&mut rng, &KeyGenParameters::default())?;
//! let params = ProtectionParameters::generate(&mut rng, "secret", "endentity")?;
//! let message = protect(&mut rng, request, &params)?;
//!
//! let endpoint = ServerEndpoint::new("localhost", 80, "/ejbca/publicweb/cmp/ra");
//! let response = HttpTransport::new().send(&message, &endpoint, Some(Duration::from_secs(30)))?;
//!
//! println!("{}", response.to_pem(CERTIFICATE_LABEL)?);
//! # Ok(())
//! # }
//! ```
//!
//! [RFC4210 § 5.1.3.1]: https://datatracker.ietf.org/doc/html/rfc4210#section-5.1.3.1

extern crate alloc;

pub use cmpv2;
pub use crmf;
pub use der;
pub use pkcs8;
pub use rand_core;
pub use spki;
pub use x509_cert;

pub mod errors;
pub mod keygen;
pub mod pbm;
#[cfg(feature = "pem")]
pub mod pem;
pub mod protect;
pub mod request;
pub mod traits;
pub mod transport;

pub use crate::{
    errors::{Error, ErrorKind, Phase, Result},
    keygen::{KeyAlgorithm, KeyGenParameters, KeyPair},
    pbm::{MacAlgorithm, OneWayFunction, PasswordBasedMac, PbmConfig},
    protect::{protect, BodyKind, ProtectedMessage, ProtectionParameters, Protector},
    request::{CertificateRequest, RequestBuilder},
    traits::ProtectionScheme,
    transport::{Response, ServerEndpoint},
};

#[cfg(feature = "http")]
pub use crate::transport::HttpTransport;
