//! PEM output as described in [RFC7468].
//!
//! [RFC7468]: https://datatracker.ietf.org/doc/html/rfc7468

use std::io;

use pem_rfc7468::LineEnding;

use crate::errors::{Error, Phase, Result};

/// Label for certificate payloads.
pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Encode `bytes` as a PEM block labelled `label`, wrapping the Base64 body
/// at 64 columns.
pub fn format_pem(label: &str, bytes: &[u8]) -> Result<String> {
    tracing::debug!(label, bytes = bytes.len(), "formatting PEM");
    pem_rfc7468::encode_string(label, LineEnding::LF, bytes)
        .map_err(|e| Error::encoding(Phase::Format, e))
}

/// Write `bytes` to `writer` as a PEM block labelled `label`.
pub fn write_pem<W: io::Write + ?Sized>(writer: &mut W, label: &str, bytes: &[u8]) -> io::Result<()> {
    let pem = format_pem(label, bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    writer.write_all(pem.as_bytes())
}
