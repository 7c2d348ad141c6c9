//! OpenPGP detached signatures over armored keyrings.
//!
//! Wraps the `pgp` crate behind the small surface the releaser and updater
//! need: load a keyring from armored or binary bytes, sign a file with the
//! first usable secret key, and verify a detached armored signature against
//! any key (or signing subkey) in the ring.

use std::fs;
use std::path::Path;

pub use pgp::composed::{SignedPublicKey, SignedSecretKey};

use pgp::composed::{Deserializable, StandaloneSignature};
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::{SignatureConfig, SignatureType, SignatureVersion, Subpacket, SubpacketData};
use pgp::types::KeyTrait;

use crate::core::{Result, UpdraftError};

fn key_err(reason: String) -> UpdraftError {
    UpdraftError::KeyError { reason }
}

/// True when the bytes look like ASCII armor rather than binary packets.
fn is_armored(data: &[u8]) -> bool {
    data.trim_ascii_start().starts_with(b"-----BEGIN PGP")
}

/// Load public keys from armored or binary keyring bytes.
pub fn load_public_keys(data: &[u8]) -> Result<Vec<SignedPublicKey>> {
    let keys: Vec<SignedPublicKey> = if is_armored(data) {
        let (iter, _headers) = SignedPublicKey::from_armor_many(data)
            .map_err(|e| key_err(format!("failed to read armored keyring: {e}")))?;
        iter.collect::<std::result::Result<_, _>>()
            .map_err(|e| key_err(format!("failed to parse public key: {e}")))?
    } else {
        SignedPublicKey::from_bytes_many(data)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| key_err(format!("failed to read binary keyring: {e}")))?
    };

    if keys.is_empty() {
        return Err(key_err("no usable keys found in keyring".to_string()));
    }
    Ok(keys)
}

/// Load secret keys from armored or binary keyring bytes.
pub fn load_secret_keys(data: &[u8]) -> Result<Vec<SignedSecretKey>> {
    let keys: Vec<SignedSecretKey> = if is_armored(data) {
        let (iter, _headers) = SignedSecretKey::from_armor_many(data)
            .map_err(|e| key_err(format!("failed to read armored keyring: {e}")))?;
        iter.collect::<std::result::Result<_, _>>()
            .map_err(|e| key_err(format!("failed to parse secret key: {e}")))?
    } else {
        SignedSecretKey::from_bytes_many(data)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| key_err(format!("failed to read binary keyring: {e}")))?
    };

    if keys.is_empty() {
        return Err(key_err("no usable keys found in private key material".to_string()));
    }
    Ok(keys)
}

/// Create an armored detached signature over the file at `path` using the
/// first entity of the keyring. The key must not require a passphrase.
pub fn sign_file_detached(keys: &[SignedSecretKey], path: &Path) -> Result<String> {
    let key = keys.first().ok_or_else(|| key_err("empty secret keyring".to_string()))?;

    let data = fs::read(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;

    let mut config = SignatureConfig::new_v4(
        SignatureVersion::V4,
        SignatureType::Binary,
        key.algorithm(),
        HashAlgorithm::SHA2_256,
        Vec::new(),
        Vec::new(),
    );
    config.hashed_subpackets = vec![
        Subpacket::regular(SubpacketData::SignatureCreationTime(chrono::Utc::now())),
        Subpacket::regular(SubpacketData::Issuer(key.key_id())),
    ];

    let signature = config
        .sign(key, String::new, &data[..])
        .map_err(|e| key_err(format!("failed to sign file: {e}")))?;

    StandaloneSignature::new(signature)
        .to_armored_string(Default::default())
        .map_err(|e| key_err(format!("failed to armor signature: {e}")))
}

/// Verify an armored detached signature against the file at `path` using any
/// primary key or signing subkey in the ring.
pub fn verify_file_detached(
    keys: &[SignedPublicKey],
    path: &Path,
    armored_signature: &str,
) -> Result<()> {
    let (signature, _headers) = StandaloneSignature::from_string(armored_signature)
        .map_err(|e| key_err(format!("failed to parse armored signature: {e}")))?;

    let data = fs::read(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;

    for key in keys {
        if signature.verify(key, &data).is_ok() {
            return Ok(());
        }
        for subkey in &key.public_subkeys {
            if signature.verify(subkey, &data).is_ok() {
                return Ok(());
            }
        }
    }

    Err(UpdraftError::SignatureMismatch {
        path: path.display().to_string(),
        reason: "no key in the ring verifies this signature".to_string(),
    })
}
