//! ECDSA (P-256) detached signatures and key handling.
//!
//! Signatures are SHA-256 digests of the file bytes signed with ECDSA and
//! serialized as the ASN.1 `{r, s}` sequence (DER). The DER bytes are wrapped
//! in a simple PEM-like armor carrying a `Hash: SHA-256` header so the
//! verifier can refuse mismatched parameters up front.
//!
//! Keys interoperate with common tooling: private keys are SEC1
//! `EC PRIVATE KEY` PEM, public keys are SPKI `PUBLIC KEY` PEM, both as
//! OpenSSL emits them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};

use crate::core::{Result, UpdraftError};

/// Armor block type for detached ECDSA signatures.
pub const SIGNATURE_BLOCK_TYPE: &str = "ECDSA DETACHED SIGNATURE";

/// Create a detached armored signature for the file at `path`.
///
/// The signer hashes the file with SHA-256 and signs the digest; the armor
/// records that choice in its `Hash` header.
pub fn sign_file(key: &SigningKey, path: &Path) -> Result<String> {
    let data = fs::read(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;

    let signature: Signature = key.sign(&data);
    let der = signature.to_der();

    let mut headers = BTreeMap::new();
    headers.insert("Hash".to_string(), "SHA-256".to_string());
    Ok(encode_armor(SIGNATURE_BLOCK_TYPE, &headers, der.as_bytes()))
}

/// Verify a detached armored signature against the file at `path`.
pub fn verify_file(key: &VerifyingKey, path: &Path, armored: &str) -> Result<()> {
    let (block_type, headers, der) = decode_armor(armored)?;

    if block_type != SIGNATURE_BLOCK_TYPE {
        return Err(UpdraftError::SignatureMismatch {
            path: path.display().to_string(),
            reason: format!("unexpected signature block: {block_type}"),
        });
    }
    match headers.get("Hash").map(String::as_str) {
        Some("SHA-256") => {}
        other => {
            return Err(UpdraftError::SignatureMismatch {
                path: path.display().to_string(),
                reason: format!("unsupported or mismatched hash: {}", other.unwrap_or("")),
            });
        }
    }

    let signature = Signature::from_der(&der).map_err(|e| UpdraftError::SignatureMismatch {
        path: path.display().to_string(),
        reason: format!("invalid DER signature: {e}"),
    })?;

    let data = fs::read(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;
    key.verify(&data, &signature).map_err(|_| UpdraftError::SignatureMismatch {
        path: path.display().to_string(),
        reason: "signature verification failed".to_string(),
    })
}

/// Generate a fresh P-256 keypair.
///
/// Returns `(private_pem, public_pem)`: SEC1 `EC PRIVATE KEY` and SPKI
/// `PUBLIC KEY`, both LF-terminated.
pub fn generate_keypair() -> Result<(String, String)> {
    let secret = p256::SecretKey::random(&mut rand_core::OsRng);

    let private_pem = secret
        .to_sec1_pem(LineEnding::LF)
        .map_err(|e| UpdraftError::KeyError { reason: format!("encode private key: {e}") })?
        .to_string();
    let public_pem = secret
        .public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| UpdraftError::KeyError { reason: format!("encode public key: {e}") })?;

    Ok((private_pem, public_pem))
}

/// Parse a PEM private key: SEC1 `EC PRIVATE KEY` first, PKCS#8 as fallback.
pub fn private_key_from_pem(pem: &str) -> Result<SigningKey> {
    if let Ok(secret) = p256::SecretKey::from_sec1_pem(pem) {
        return Ok(SigningKey::from(&secret));
    }
    p256::SecretKey::from_pkcs8_pem(pem)
        .map(|secret| SigningKey::from(&secret))
        .map_err(|e| UpdraftError::KeyError { reason: format!("invalid EC private key PEM: {e}") })
}

/// Parse an SPKI `PUBLIC KEY` PEM into a verifying key.
pub fn public_key_from_pem(pem: &str) -> Result<VerifyingKey> {
    let public = p256::PublicKey::from_public_key_pem(pem)
        .map_err(|e| UpdraftError::KeyError { reason: format!("invalid public key PEM: {e}") })?;
    Ok(VerifyingKey::from(&public))
}

/// PEM-like armor: BEGIN line, `Key: Value` headers, blank line, base64 body
/// wrapped at 64 columns, END line.
pub(crate) fn encode_armor(
    block_type: &str,
    headers: &BTreeMap<String, String>,
    der: &[u8],
) -> String {
    let mut out = format!("-----BEGIN {block_type}-----\n");
    for (k, v) in headers {
        out.push_str(&format!("{k}: {v}\n"));
    }
    out.push('\n');

    let encoded = BASE64.encode(der);
    for chunk in encoded.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(&format!("-----END {block_type}-----\n"));
    out
}

/// Parse the armor produced by [`encode_armor`]. Returns the block type, the
/// header map, and the decoded DER bytes.
pub(crate) fn decode_armor(
    armored: &str,
) -> Result<(String, BTreeMap<String, String>, Vec<u8>)> {
    let mut lines = armored.lines();

    let first = lines.next().ok_or_else(|| invalid("empty armor"))?;
    let block_type = first
        .strip_prefix("-----BEGIN ")
        .and_then(|rest| rest.strip_suffix("-----"))
        .ok_or_else(|| invalid("invalid armor header"))?
        .to_string();

    let mut headers = BTreeMap::new();
    let mut body = String::new();
    let mut in_body = false;

    for line in lines {
        if line.starts_with("-----END ") {
            break;
        }
        if !in_body {
            if line.is_empty() {
                in_body = true;
                continue;
            }
            let (k, v) = line.split_once(':').ok_or_else(|| invalid("invalid header line"))?;
            headers.insert(k.trim().to_string(), v.trim().to_string());
            continue;
        }
        body.push_str(line.trim());
    }

    let der = BASE64
        .decode(body.as_bytes())
        .map_err(|e| invalid(&format!("base64 decode failed: {e}")))?;

    Ok((block_type, headers, der))
}

fn invalid(reason: &str) -> UpdraftError {
    UpdraftError::KeyError { reason: reason.to_string() }
}
