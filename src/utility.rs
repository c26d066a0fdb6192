//! Stateless helpers that need neither an account nor a session.

use crate::Error;
use crate::types::{Ed25519PublicKey, Ed25519Signature, base64_encode};
use sha2::{Digest, Sha256};

/// SHA-256 digest of `input`, as unpadded base64.
pub fn sha256(input: impl AsRef<[u8]>) -> String {
    base64_encode(Sha256::digest(input.as_ref()))
}

/// Verifies an Ed25519 signature made by [`crate::Account::sign`].
///
/// Returns `Ok(false)` for a well-formed signature that doesn't match.
/// Fails with [`Error::InvalidKeyEncoding`] if the key or signature can't
/// be decoded.
pub fn ed25519_verify(
    message: impl AsRef<[u8]>,
    public_key: &str,
    signature: &str,
) -> Result<bool, Error> {
    let public_key = Ed25519PublicKey::from_base64(public_key)?;
    let signature = Ed25519Signature::from_base64(signature)?;

    Ok(public_key.verify(message.as_ref(), &signature).is_ok())
}

/// Library version as `(major, minor, patch)`.
pub fn version() -> (u8, u8, u8) {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|part| part.parse::<u8>().unwrap_or(0));

    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}
