//! Encrypted at-rest serialization of accounts and sessions.
//!
//! A pickle is `base64([format version] || AES-256-GCM-SIV(protobuf state))`.
//! The cipher key and nonce are derived from the caller's passphrase with
//! HKDF-SHA256, and the version byte plus the kind of object are
//! authenticated, so an account pickle never opens as a session.

mod account;
mod session;

use crate::AccountConfig;
use crate::Error;
use crate::types::{Curve25519PublicKey, base64_decode, base64_encode};
use aes_gcm_siv::aead::{Aead, Payload};
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

const PICKLE_FORMAT_VERSION: u8 = 1;
const PICKLE_INFO: &[u8] = b"Pickle";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PickleKind {
    Account,
    Session,
}

impl PickleKind {
    fn associated_data(self) -> Vec<u8> {
        let label: &[u8] = match self {
            Self::Account => b"account",
            Self::Session => b"session",
        };

        let mut ad = Vec::with_capacity(1 + label.len());
        ad.push(PICKLE_FORMAT_VERSION);
        ad.extend_from_slice(label);
        ad
    }

    fn bad_key(self) -> Error {
        match self {
            Self::Account => Error::BadAccountKey,
            Self::Session => Error::BadSessionKey,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
struct ConfigPickle {
    #[prost(uint64, tag = "1")]
    max_skipped_message_keys: u64,
    #[prost(uint32, tag = "2")]
    max_message_gap: u32,
    #[prost(uint64, tag = "3")]
    max_receiver_chains: u64,
}

impl From<&AccountConfig> for ConfigPickle {
    fn from(config: &AccountConfig) -> Self {
        Self {
            max_skipped_message_keys: config.max_skipped_message_keys as u64,
            max_message_gap: config.max_message_gap,
            max_receiver_chains: config.max_receiver_chains as u64,
        }
    }
}

impl TryFrom<&ConfigPickle> for AccountConfig {
    type Error = Error;

    fn try_from(pickle: &ConfigPickle) -> Result<Self, Self::Error> {
        let limit = |value: u64| {
            usize::try_from(value)
                .map_err(|_| Error::BadMessageFormat("config limit out of range".to_string()))
        };

        Ok(Self {
            max_skipped_message_keys: limit(pickle.max_skipped_message_keys)?,
            max_message_gap: pickle.max_message_gap,
            max_receiver_chains: limit(pickle.max_receiver_chains)?,
        })
    }
}

fn config_from_pickle(config: Option<&ConfigPickle>) -> Result<AccountConfig, Error> {
    config
        .ok_or_else(|| Error::BadMessageFormat("Missing config".to_string()))
        .and_then(AccountConfig::try_from)
}

/// Derives the pickle cipher and its nonce from the passphrase.
fn pickle_cipher(key: &[u8]) -> Result<(Aes256GcmSiv, [u8; 12]), Error> {
    let hkdf = Hkdf::<Sha256>::new(None, key);

    let mut derived_material = Zeroizing::new([0u8; 44]);
    hkdf.expand(PICKLE_INFO, derived_material.as_mut_slice())?;

    let aes_key = aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(&derived_material[0..32]);
    let cipher = Aes256GcmSiv::new(aes_key);

    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&derived_material[32..44]);

    Ok((cipher, nonce))
}

fn encrypt(kind: PickleKind, plaintext: &[u8], key: &[u8]) -> Result<String, Error> {
    let (cipher, nonce) = pickle_cipher(key)?;
    let ad = kind.associated_data();

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &ad,
            },
        )
        .map_err(|_| Error::Crypto("Pickle encryption failed".to_string()))?;

    let mut result = Vec::with_capacity(1 + ciphertext.len());
    result.push(PICKLE_FORMAT_VERSION);
    result.extend_from_slice(&ciphertext);

    Ok(base64_encode(result))
}

fn decrypt(kind: PickleKind, pickle: &str, key: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    let bytes = base64_decode(pickle)?;

    let (version, ciphertext) = bytes
        .split_first()
        .ok_or_else(|| Error::BadMessageFormat("Empty pickle".to_string()))?;
    if *version != PICKLE_FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(u32::from(*version)));
    }

    let (cipher, nonce) = pickle_cipher(key)?;
    let ad = kind.associated_data();

    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: ciphertext,
                aad: &ad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| {
            tracing::warn!(kind = ?kind, "pickle failed to authenticate");
            kind.bad_key()
        })
}

fn secret_from_slice(bytes: &[u8], what: &str) -> Result<Zeroizing<[u8; 32]>, Error> {
    if bytes.len() != 32 {
        return Err(Error::BadMessageFormat(format!(
            "Invalid {what} length: {}",
            bytes.len()
        )));
    }

    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(bytes);
    Ok(secret)
}

fn public_key_from_slice(bytes: &[u8], what: &str) -> Result<Curve25519PublicKey, Error> {
    Curve25519PublicKey::from_slice(bytes)
        .map_err(|_| Error::BadMessageFormat(format!("Invalid {what} length: {}", bytes.len())))
}
