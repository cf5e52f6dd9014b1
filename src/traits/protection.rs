//! Message protection schemes.

use alloc::vec::Vec;

use spki::AlgorithmIdentifierOwned;
use subtle::ConstantTimeEq;

use crate::errors::{Error, Result};

/// Scheme used to compute the `protection` bits of a `PKIMessage`.
///
/// Implementations see only the DER encoding of the `ProtectedPart`
/// (header and body); they never see the transport.
pub trait ProtectionScheme {
    /// `protectionAlg` to place in the message header.
    fn algorithm_identifier(&self) -> Result<AlgorithmIdentifierOwned>;

    /// Compute the protection value over the DER encoded `ProtectedPart`.
    fn protection_value(&self, protected_part: &[u8]) -> Result<Vec<u8>>;

    /// Verify `protection` over the DER encoded `ProtectedPart`.
    ///
    /// If the protection is valid `Ok(())` is returned, otherwise an `Err`
    /// indicating failure.
    fn verify(&self, protected_part: &[u8], protection: &[u8]) -> Result<()> {
        let expected = self.protection_value(protected_part)?;
        if bool::from(expected.as_slice().ct_eq(protection)) {
            Ok(())
        } else {
            Err(Error::VerificationFailed)
        }
    }
}

impl<T: ProtectionScheme + ?Sized> ProtectionScheme for &T {
    fn algorithm_identifier(&self) -> Result<AlgorithmIdentifierOwned> {
        (**self).algorithm_identifier()
    }

    fn protection_value(&self, protected_part: &[u8]) -> Result<Vec<u8>> {
        (**self).protection_value(protected_part)
    }

    fn verify(&self, protected_part: &[u8], protection: &[u8]) -> Result<()> {
        (**self).verify(protected_part, protection)
    }
}
