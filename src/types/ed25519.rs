use crate::Error;
use crate::types::{base64_decode, base64_encode, random_seed};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::TryCryptoRng;
use std::fmt;
use zeroize::Zeroizing;

/// Public half of an Ed25519 signing key pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519PublicKey(VerifyingKey);

impl Ed25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Encodes the key as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.as_bytes())
    }

    /// Decodes a base64 public key, rejecting anything that isn't a valid
    /// compressed Edwards point.
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        let bytes = base64_decode(input)
            .map_err(|err| Error::InvalidKeyEncoding(format!("Ed25519 key: {err}")))?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidKeyEncoding(format!(
                "Ed25519 key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;

        VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|err| Error::InvalidKeyEncoding(err.to_string()))
    }

    /// Checks `signature` over `message`.
    ///
    /// A signature that doesn't verify is reported as [`Error::BadMessageMac`].
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), Error> {
        self.0
            .verify_strict(message, &signature.0)
            .map_err(|_| Error::BadMessageMac)
    }
}

impl fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// A detached Ed25519 signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519Signature(Signature);

impl Ed25519Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    pub fn to_base64(&self) -> String {
        base64_encode(self.to_bytes())
    }

    pub fn from_base64(input: &str) -> Result<Self, Error> {
        let bytes = base64_decode(input)
            .map_err(|err| Error::InvalidKeyEncoding(format!("Ed25519 signature: {err}")))?;
        let bytes: [u8; 64] = bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidKeyEncoding(format!(
                "Ed25519 signature must be 64 bytes, got {}",
                bytes.len()
            ))
        })?;

        Ok(Self(Signature::from_bytes(&bytes)))
    }
}

impl fmt::Display for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Ed25519 signing key. `SigningKey` scrubs itself on drop.
#[derive(Clone)]
pub(crate) struct Ed25519Keypair(SigningKey);

impl Ed25519Keypair {
    pub(crate) fn new<R: TryCryptoRng>(rng: &mut R) -> Result<Self, Error> {
        Ok(Self::from(random_seed(rng)?))
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.0.sign(message))
    }

    pub(crate) fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.0.verifying_key())
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<Zeroizing<[u8; 32]>> for Ed25519Keypair {
    fn from(seed: Zeroizing<[u8; 32]>) -> Self {
        Self(SigningKey::from_bytes(&seed))
    }
}
