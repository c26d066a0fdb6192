use super::{ConfigPickle, PickleKind, config_from_pickle, decrypt, encrypt, secret_from_slice};
use crate::types::Curve25519Secret;
use crate::x3dh::{IdentityKey, OneTimeKey, OneTimeKeyStore};
use crate::{Account, Error, MAX_ONE_TIME_KEYS};
use prost::Message;
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const ACCOUNT_PICKLE_VERSION: u32 = 1;

#[derive(Clone, PartialEq, prost::Message, Zeroize, ZeroizeOnDrop)]
struct OneTimeKeyPickle {
    #[prost(uint32, tag = "1")]
    id: u32,
    #[prost(bytes = "vec", tag = "2")]
    key: Vec<u8>,
    #[prost(bool, tag = "3")]
    published: bool,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize, ZeroizeOnDrop)]
struct AccountPickle {
    #[prost(uint32, tag = "1")]
    version: u32,
    #[prost(bytes = "vec", tag = "2")]
    identity_key: Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    one_time_keys: Vec<OneTimeKeyPickle>,
    #[prost(uint32, tag = "4")]
    next_one_time_key_id: u32,
    #[prost(message, optional, tag = "5")]
    config: Option<ConfigPickle>,
}

impl Account {
    /// Serializes and encrypts the account under `key`.
    ///
    /// The same account and key always produce the same pickle.
    pub fn pickle(&self, key: &[u8]) -> Result<String, Error> {
        let one_time_keys = self
            .one_time_keys
            .keys
            .values()
            .map(|key| OneTimeKeyPickle {
                id: key.id,
                key: key.key.as_bytes().to_vec(),
                published: key.published,
            })
            .collect();

        let account_pickle = AccountPickle {
            version: ACCOUNT_PICKLE_VERSION,
            identity_key: self.identity_key.to_bytes().to_vec(),
            one_time_keys,
            next_one_time_key_id: self.one_time_keys.next_id,
            config: Some(ConfigPickle::from(&self.config)),
        };

        let plaintext = Zeroizing::new(account_pickle.encode_to_vec());
        let pickle = encrypt(PickleKind::Account, &plaintext, key)?;

        tracing::debug!(one_time_keys = self.one_time_keys.count(), "pickled account");

        Ok(pickle)
    }

    /// Restores an account from [`Account::pickle`] output.
    ///
    /// Fails with [`Error::BadAccountKey`] if `key` isn't the one the pickle
    /// was made with.
    pub fn from_pickle(pickle: &str, key: &[u8]) -> Result<Self, Error> {
        let plaintext = decrypt(PickleKind::Account, pickle, key)?;
        let account_pickle = AccountPickle::decode(plaintext.as_slice())
            .map_err(|err| Error::BadMessageFormat(format!("Failed to decode account: {err}")))?;

        if account_pickle.version != ACCOUNT_PICKLE_VERSION {
            return Err(Error::UnsupportedVersion(account_pickle.version));
        }

        let identity_key = IdentityKey::from_bytes(&account_pickle.identity_key)?;
        let config = config_from_pickle(account_pickle.config.as_ref())?;

        let mut keys = BTreeMap::new();
        for key in &account_pickle.one_time_keys {
            if key.id >= account_pickle.next_one_time_key_id {
                return Err(Error::BadMessageFormat(format!(
                    "One-time key id {} was never handed out",
                    key.id
                )));
            }

            let secret = secret_from_slice(&key.key, "one-time key")?;
            keys.insert(
                key.id,
                OneTimeKey {
                    key: Curve25519Secret::from(secret),
                    id: key.id,
                    published: key.published,
                },
            );
        }

        let one_time_keys = OneTimeKeyStore {
            keys,
            next_id: account_pickle.next_one_time_key_id,
            max_keys: MAX_ONE_TIME_KEYS,
        };

        tracing::debug!(one_time_keys = one_time_keys.count(), "unpickled account");

        Ok(Self {
            identity_key,
            one_time_keys,
            config,
        })
    }
}
