use crate::Error;
use crate::types::{base64_decode, base64_encode, random_seed};
use rand::TryCryptoRng;
use std::fmt;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Public half of a Curve25519 key pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Curve25519PublicKey(PublicKey);

impl Curve25519PublicKey {
    /// Length of an encoded public key in bytes.
    pub const LENGTH: usize = 32;

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Encodes the key as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.as_bytes())
    }

    /// Decodes a base64 public key, as exported by [`crate::Account::identity_keys`]
    /// or [`crate::Account::one_time_keys`].
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        let bytes = base64_decode(input)
            .map_err(|err| Error::InvalidKeyEncoding(format!("Curve25519 key: {err}")))?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::InvalidKeyEncoding(format!(
                "Curve25519 key must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            ))
        })?;

        Ok(Self::from(bytes))
    }
}

impl fmt::Display for Curve25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl From<[u8; 32]> for Curve25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(PublicKey::from(bytes))
    }
}

impl From<PublicKey> for Curve25519PublicKey {
    fn from(value: PublicKey) -> Self {
        Self(value)
    }
}

impl AsRef<PublicKey> for Curve25519PublicKey {
    fn as_ref(&self) -> &PublicKey {
        &self.0
    }
}

/// Private half of a Curve25519 key pair. Scrubbed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct Curve25519Secret(StaticSecret);

impl Curve25519Secret {
    pub(crate) fn new<R: TryCryptoRng>(rng: &mut R) -> Result<Self, Error> {
        Ok(Self::from(random_seed(rng)?))
    }

    /// Diffie-Hellman with a peer key.
    ///
    /// Fails with [`Error::InvalidKeyEncoding`] for low-order peer keys, whose
    /// output doesn't depend on our secret.
    pub(crate) fn dh(&self, public_key: &Curve25519PublicKey) -> Result<SharedSecret, Error> {
        let shared_secret = self.0.diffie_hellman(public_key.as_ref());

        if !shared_secret.was_contributory() {
            return Err(Error::InvalidKeyEncoding(
                "Curve25519 key is a low-order point".to_string(),
            ));
        }

        Ok(shared_secret)
    }

    pub(crate) fn public_key(&self) -> Curve25519PublicKey {
        PublicKey::from(&self.0).into()
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<Zeroizing<[u8; 32]>> for Curve25519Secret {
    fn from(bytes: Zeroizing<[u8; 32]>) -> Self {
        Self(StaticSecret::from(*bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_diffie_hellman_agrees() {
        let alice = Curve25519Secret::new(&mut OsRng).unwrap();
        let bob = Curve25519Secret::new(&mut OsRng).unwrap();

        let alice_shared = alice.dh(&bob.public_key()).unwrap();
        let bob_shared = bob.dh(&alice.public_key()).unwrap();

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_low_order_keys_are_rejected() {
        let secret = Curve25519Secret::new(&mut OsRng).unwrap();

        assert!(matches!(
            secret.dh(&Curve25519PublicKey::from([0u8; 32])),
            Err(Error::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn test_public_key_base64() {
        let secret = Curve25519Secret::new(&mut OsRng).unwrap();
        let public_key = secret.public_key();

        let encoded = public_key.to_base64();
        assert_eq!(encoded.len(), 43);
        assert_eq!(encoded, public_key.to_string());
        assert_eq!(Curve25519PublicKey::from_base64(&encoded).unwrap(), public_key);
    }

    #[test]
    fn test_public_key_rejects_bad_input() {
        assert!(matches!(
            Curve25519PublicKey::from_base64("AAAA"),
            Err(Error::InvalidKeyEncoding(_))
        ));
        assert!(matches!(
            Curve25519PublicKey::from_base64("%%%"),
            Err(Error::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn test_secret_roundtrip_through_bytes() {
        let secret = Curve25519Secret::new(&mut OsRng).unwrap();
        let restored = Curve25519Secret::from(Zeroizing::new(*secret.as_bytes()));

        assert_eq!(secret.public_key(), restored.public_key());
    }
}
