//! HTTP transfer of CMP messages.
//!
//! Each exchange is a single blocking `POST` of the DER encoded `PKIMessage`
//! with content type `application/pkixcmp`, as described in [RFC6712]. There
//! are no retries; a caller supplied deadline bounds the whole exchange.
//!
//! [RFC6712]: https://datatracker.ietf.org/doc/html/rfc6712

use alloc::vec::Vec;
use core::fmt;

use cmpv2::message::PkiMessage;
use der::Decode;

use crate::errors::{Error, Phase, Result};

#[cfg(feature = "http")]
use {
    crate::protect::ProtectedMessage,
    base64ct::{Base64, Encoding},
    std::io::{self, Read},
    std::time::Duration,
};

/// Media type of CMP messages.
pub const CONTENT_TYPE: &str = "application/pkixcmp";

/// Largest advertised body length preallocated before reading.
#[cfg(feature = "http")]
const MAX_PREALLOC: u64 = 64 * 1024;

/// HTTP location of a CMP responder.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerEndpoint {
    /// Host name or address.
    pub hostname: String,
    /// TCP port.
    pub port: u16,
    /// Request path, e.g. `/ejbca/publicweb/cmp/ra`.
    pub path: String,
}

impl ServerEndpoint {
    /// Create an endpoint.
    pub fn new(hostname: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            path: path.into(),
        }
    }

    /// `http://{hostname}:{port}{path}`
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.path.starts_with('/') { "" } else { "/" };
        write!(
            f,
            "http://{}:{}{}{}",
            self.hostname, self.port, separator, self.path
        )
    }
}

/// Raw response from a CMP responder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    raw: Vec<u8>,
    status: u16,
}

impl Response {
    /// Create a response from its parts.
    pub fn new(raw: Vec<u8>, status: u16) -> Self {
        Self { raw, status }
    }

    /// Response payload, normally a DER encoded `PKIMessage`.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Consume the response, returning the payload.
    pub fn into_raw_bytes(self) -> Vec<u8> {
        self.raw
    }

    /// Decode the payload as a `PKIMessage`.
    pub fn decode(&self) -> Result<PkiMessage<'_>> {
        PkiMessage::from_der(&self.raw).map_err(|e| Error::encoding(Phase::Send, e))
    }

    /// Render the payload as a PEM block with the given label.
    #[cfg(feature = "pem")]
    pub fn to_pem(&self, label: &str) -> Result<String> {
        crate::pem::format_pem(label, &self.raw)
    }
}

/// Blocking HTTP transport.
///
/// Cloning is cheap and clones share the underlying connection pool, so one
/// transport may serve concurrent transactions.
#[cfg(feature = "http")]
#[derive(Clone, Debug)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Create a transport which does not follow redirects.
    pub fn new() -> Self {
        Self::with_agent(ureq::AgentBuilder::new().redirects(0).build())
    }

    /// Create a transport around a preconfigured agent.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }

    /// POST `message` to `endpoint` and read the response.
    ///
    /// `deadline` bounds the whole exchange, from connecting to reading the
    /// last byte of the body. A deadline hit before the response head arrives
    /// is reported as [`Error::Connection`], one hit while reading the body as
    /// [`Error::ResponseBody`].
    pub fn send(
        &self,
        message: &ProtectedMessage<'_>,
        endpoint: &ServerEndpoint,
        deadline: Option<Duration>,
    ) -> Result<Response> {
        let der = message.to_der()?;
        let url = endpoint.url();

        tracing::debug!(%url, bytes = der.len(), "sending CMP request");
        tracing::trace!(request = %Base64::encode_string(&der), "CMP request");

        let mut request = self.agent.post(&url).set("Content-Type", CONTENT_TYPE);
        if let Some(deadline) = deadline {
            request = request.timeout(deadline);
        }

        let response = match request.send_bytes(&der) {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                tracing::debug!(%url, status, "CMP responder rejected request");
                return Err(Error::UnexpectedStatus(status));
            }
            Err(err) => {
                return Err(Error::Connection {
                    url,
                    reason: err.to_string(),
                })
            }
        };

        let status = response.status();
        if status != 200 {
            tracing::debug!(%url, status, "CMP responder rejected request");
            return Err(Error::UnexpectedStatus(status));
        }

        let expected = response
            .header("Content-Length")
            .and_then(|value| value.trim().parse::<u64>().ok());
        let raw = read_body(response.into_reader(), expected)?;

        tracing::debug!(%url, status, bytes = raw.len(), "received CMP response");
        tracing::trace!(response = %Base64::encode_string(&raw), "CMP response");

        Ok(Response { raw, status })
    }
}

#[cfg(feature = "http")]
impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a response body, enforcing the advertised length if there is one.
#[cfg(feature = "http")]
fn read_body<R: Read>(mut reader: R, expected: Option<u64>) -> Result<Vec<u8>> {
    let mut raw = match expected {
        Some(len) => Vec::with_capacity(len.min(MAX_PREALLOC) as usize),
        None => Vec::new(),
    };

    if let Err(err) = reader.read_to_end(&mut raw) {
        return match (err.kind(), expected) {
            (io::ErrorKind::UnexpectedEof, Some(expected)) => Err(Error::ContentLengthMismatch {
                expected,
                received: raw.len() as u64,
            }),
            _ => Err(Error::ResponseBody(err.to_string())),
        };
    }

    match expected {
        Some(expected) if (raw.len() as u64) < expected => Err(Error::ContentLengthMismatch {
            expected,
            received: raw.len() as u64,
        }),
        _ => Ok(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url() {
        let endpoint = ServerEndpoint::new("localhost", 80, "/ejbca/publicweb/cmp/ra");
        assert_eq!(endpoint.url(), "http://localhost:80/ejbca/publicweb/cmp/ra");

        let endpoint = ServerEndpoint::new("127.0.0.1", 8080, "pkix/");
        assert_eq!(endpoint.url(), "http://127.0.0.1:8080/pkix/");

        let endpoint = ServerEndpoint::new("ca.example.com", 8080, "");
        assert_eq!(endpoint.to_string(), "http://ca.example.com:8080/");
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_serde() {
        use serde_test::{assert_tokens, Token};

        let endpoint = ServerEndpoint::new("localhost", 8080, "/pkix/");
        let tokens = [
            Token::Struct {
                name: "ServerEndpoint",
                len: 3,
            },
            Token::Str("hostname"),
            Token::Str("localhost"),
            Token::Str("port"),
            Token::U16(8080),
            Token::Str("path"),
            Token::Str("/pkix/"),
            Token::StructEnd,
        ];
        assert_tokens(&endpoint, &tokens);
    }

    #[test]
    fn test_decode_garbage() {
        let response = Response::new(b"not a pki message".to_vec(), 200);
        let err = response.decode().unwrap_err();
        assert_eq!(err.phase(), Phase::Send);
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.into_raw_bytes(), b"not a pki message");
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_read_body_exact_length() {
        let body = read_body(&b"abcdef"[..], Some(6)).unwrap();
        assert_eq!(body, b"abcdef");
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_read_body_short() {
        match read_body(&b"abcd"[..], Some(10)) {
            Err(Error::ContentLengthMismatch { expected, received }) => {
                assert_eq!(expected, 10);
                assert_eq!(received, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_read_body_without_length() {
        let data = vec![0x5a; 200_000];
        let body = read_body(&data[..], None).unwrap();
        assert_eq!(body, data);
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_read_body_truncated_stream() {
        struct Truncated(usize);

        impl Read for Truncated {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0 == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "response body closed before all bytes were read",
                    ));
                }
                let n = self.0.min(buf.len());
                buf[..n].fill(1);
                self.0 -= n;
                Ok(n)
            }
        }

        match read_body(Truncated(3), Some(8)) {
            Err(Error::ContentLengthMismatch { expected, received }) => {
                assert_eq!(expected, 8);
                assert_eq!(received, 3);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            read_body(Truncated(3), None),
            Err(Error::ResponseBody(_))
        ));
    }
}
