use crate::Error;
use crate::types::{
    Curve25519PublicKey, Curve25519Secret, Ed25519Keypair, Ed25519PublicKey, Ed25519Signature,
};
use rand::TryCryptoRng;
use x25519_dalek::SharedSecret;
use zeroize::Zeroizing;

/// Long-term identity of a device.
///
/// An `IdentityKey` holds an Ed25519 signing key for authentication and a
/// Curve25519 key for Diffie-Hellman key agreement. The two are generated
/// from independent seeds.
#[derive(Clone)]
pub(crate) struct IdentityKey {
    signing_key: Ed25519Keypair,
    dh_key: Curve25519Secret,
}

impl IdentityKey {
    /// Creates a new identity key with randomly generated components.
    pub(crate) fn new<R: TryCryptoRng>(rng: &mut R) -> Result<Self, Error> {
        let signing_key = Ed25519Keypair::new(rng)?;
        let dh_key = Curve25519Secret::new(rng)?;

        Ok(Self {
            signing_key,
            dh_key,
        })
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.signing_key.sign(message)
    }

    pub(crate) fn signing_key_public(&self) -> Ed25519PublicKey {
        self.signing_key.public_key()
    }

    pub(crate) fn dh_key_public(&self) -> Curve25519PublicKey {
        self.dh_key.public_key()
    }

    pub(crate) fn dh(&self, public_key: &Curve25519PublicKey) -> Result<SharedSecret, Error> {
        self.dh_key.dh(public_key)
    }

    /// Serializes the identity key to 64 bytes.
    ///
    /// The first 32 bytes hold the Ed25519 seed, the last 32 bytes the
    /// Curve25519 private key.
    pub(crate) fn to_bytes(&self) -> Zeroizing<[u8; 64]> {
        let mut bytes = Zeroizing::new([0u8; 64]);
        bytes[0..32].copy_from_slice(self.signing_key.as_bytes());
        bytes[32..64].copy_from_slice(self.dh_key.as_bytes());

        bytes
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 64 {
            return Err(Error::BadMessageFormat(format!(
                "identity key must be 64 bytes, got {}",
                bytes.len()
            )));
        }

        let mut signing_seed = Zeroizing::new([0u8; 32]);
        signing_seed.copy_from_slice(&bytes[0..32]);
        let mut dh_seed = Zeroizing::new([0u8; 32]);
        dh_seed.copy_from_slice(&bytes[32..64]);

        Ok(Self {
            signing_key: Ed25519Keypair::from(signing_seed),
            dh_key: Curve25519Secret::from(dh_seed),
        })
    }
}
