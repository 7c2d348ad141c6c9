//! Cryptography: checksums, key detection, and detached signatures.
//!
//! Three concerns live here:
//!
//! - [`checksum`] - SHA-256 over file bytes, single and batch
//!   (`sha256sum`-compatible output), plus verification
//! - [`detect`] - classify raw key material into a [`KeyInfo`] that routes
//!   signing and verification to the PGP or ECDSA path
//! - [`pgp`] / [`ecdsa`] - detached signature creation and verification
//!
//! Signature files carry either an ASCII-armored OpenPGP signature or the
//! ECDSA armor format:
//!
//! ```text
//! -----BEGIN ECDSA DETACHED SIGNATURE-----
//! Hash: SHA-256
//!
//! <base64, wrapped at 64 columns>
//! -----END ECDSA DETACHED SIGNATURE-----
//! ```
//!
//! Callers never branch on file extensions; [`detect::detect_key_info`]
//! inspects the armor itself.

pub mod checksum;
pub mod detect;
pub mod ecdsa;
pub mod pgp;

#[cfg(test)]
mod tests;

pub use checksum::{sha256_batch, sha256_file, sha256_verify, value_checksum};
pub use detect::{detect_key_info, KeyFormat, KeyInfo, KeyKind};

/// The signature algorithm family stamped on a release asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// ASCII-armored OpenPGP detached signature.
    Pgp,
    /// ECDSA (P-256) detached signature in the crate's armor format.
    X509,
}

impl SignatureKind {
    /// The manifest spelling of this signature kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pgp => "PGP",
            Self::X509 => "X509",
        }
    }
}

impl std::str::FromStr for SignatureKind {
    type Err = crate::UpdraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PGP" => Ok(Self::Pgp),
            "X509" => Ok(Self::X509),
            other => Err(crate::UpdraftError::KeyError {
                reason: format!("unknown signature type: {other}"),
            }),
        }
    }
}

impl std::fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
