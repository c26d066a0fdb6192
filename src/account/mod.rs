mod config;
pub use config::*;
mod session;
pub use session::*;

use crate::ratchet::DoubleRatchet;
use crate::types::{Curve25519PublicKey, Curve25519Secret, Ed25519PublicKey, base64_encode};
use crate::x3dh::{
    self, IdentityKey, OneTimeKeyGenerationResult, OneTimeKeyStore, PreKeyMessage, SessionKeys,
};
use crate::Error;
use rand::TryCryptoRng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on the one-time keys an account holds at once.
pub const MAX_ONE_TIME_KEYS: usize = 100;

/// Public identity keys of an account, base64 encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityKeys {
    /// Curve25519 key used for key agreement.
    pub curve25519: String,
    /// Ed25519 key used to verify [`Account::sign`] signatures.
    pub ed25519: String,
}

/// Unpublished one-time keys of an account, keyed by their base64 id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeKeys {
    pub curve25519: BTreeMap<String, String>,
}

/// A device's long-term identity plus its pool of one-time keys.
///
/// Manages identity keys and one-time keys, and creates sessions with other
/// devices from either side of the handshake.
pub struct Account {
    pub(crate) identity_key: IdentityKey,
    pub(crate) one_time_keys: OneTimeKeyStore,
    pub(crate) config: AccountConfig,
}

impl Account {
    /// Creates a new account with the default configuration.
    pub fn new() -> Result<Self, Error> {
        Self::new_with_rng(&mut OsRng)
    }

    pub fn new_with_rng<R: TryCryptoRng>(rng: &mut R) -> Result<Self, Error> {
        Self::with_config_and_rng(AccountConfig::default(), rng)
    }

    /// Creates a new account whose sessions use the given limits.
    pub fn with_config(config: AccountConfig) -> Result<Self, Error> {
        Self::with_config_and_rng(config, &mut OsRng)
    }

    pub fn with_config_and_rng<R: TryCryptoRng>(
        config: AccountConfig,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let identity_key = IdentityKey::new(rng)?;

        let account = Self {
            identity_key,
            one_time_keys: OneTimeKeyStore::new(MAX_ONE_TIME_KEYS),
            config,
        };

        tracing::debug!(curve25519 = %account.curve25519_key(), "created account");

        Ok(account)
    }

    /// Returns the configuration for this account.
    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    pub fn identity_keys(&self) -> IdentityKeys {
        IdentityKeys {
            curve25519: self.curve25519_key().to_base64(),
            ed25519: self.ed25519_key().to_base64(),
        }
    }

    #[inline]
    pub fn curve25519_key(&self) -> Curve25519PublicKey {
        self.identity_key.dh_key_public()
    }

    #[inline]
    pub fn ed25519_key(&self) -> Ed25519PublicKey {
        self.identity_key.signing_key_public()
    }

    /// Signs `message` with the account's Ed25519 key, returning the base64
    /// signature.
    pub fn sign(&self, message: impl AsRef<[u8]>) -> String {
        self.identity_key.sign(message.as_ref()).to_base64()
    }

    pub fn max_one_time_keys(&self) -> usize {
        MAX_ONE_TIME_KEYS
    }

    /// Generates `count` one-time keys.
    ///
    /// Once the pool exceeds [`MAX_ONE_TIME_KEYS`], the oldest keys are
    /// dropped, published or not.
    pub fn generate_one_time_keys(
        &mut self,
        count: usize,
    ) -> Result<OneTimeKeyGenerationResult, Error> {
        self.generate_one_time_keys_with_rng(count, &mut OsRng)
    }

    pub fn generate_one_time_keys_with_rng<R: TryCryptoRng>(
        &mut self,
        count: usize,
        rng: &mut R,
    ) -> Result<OneTimeKeyGenerationResult, Error> {
        let result = self.one_time_keys.generate(count, rng)?;

        tracing::debug!(
            created = result.created.len(),
            removed = result.removed.len(),
            "generated one-time keys"
        );

        Ok(result)
    }

    /// One-time keys that haven't been marked as published yet.
    ///
    /// Ids are the base64 encoding of the big-endian key id.
    pub fn one_time_keys(&self) -> OneTimeKeys {
        let curve25519 = self
            .one_time_keys
            .unpublished()
            .map(|(id, key)| (base64_encode(id.to_be_bytes()), key.to_base64()))
            .collect();

        OneTimeKeys { curve25519 }
    }

    /// Hides every current one-time key from [`Account::one_time_keys`].
    ///
    /// The keys stay usable for inbound sessions.
    pub fn mark_keys_as_published(&mut self) {
        self.one_time_keys.mark_as_published();
    }

    /// Deletes the one-time key that `session` was established with.
    pub fn remove_one_time_keys(&mut self, session: &Session) -> Result<(), Error> {
        let id = self
            .one_time_keys
            .remove(&session.one_time_key())
            .ok_or(Error::UnknownKeyId)?;

        tracing::debug!(key_id = id, "removed one-time key");

        Ok(())
    }

    /// Initiates a new session with another device.
    ///
    /// Implements the initiator's (Alice's) side of the handshake using the
    /// peer's base64 Curve25519 identity key and one of its one-time keys.
    pub fn create_outbound_session(
        &self,
        identity_key: &str,
        one_time_key: &str,
    ) -> Result<Session, Error> {
        self.create_outbound_session_with_rng(identity_key, one_time_key, &mut OsRng)
    }

    pub fn create_outbound_session_with_rng<R: TryCryptoRng>(
        &self,
        identity_key: &str,
        one_time_key: &str,
        rng: &mut R,
    ) -> Result<Session, Error> {
        let bob_identity_key = Curve25519PublicKey::from_base64(identity_key)?;
        let bob_one_time_key = Curve25519PublicKey::from_base64(one_time_key)?;

        let base_key = Curve25519Secret::new(rng)?;
        let shared_secret = x3dh::initiate_for_alice(
            &self.identity_key,
            &base_key,
            &bob_identity_key,
            &bob_one_time_key,
        )?;

        let ratchet = DoubleRatchet::initialize_for_alice(shared_secret, self.config, rng)?;
        let session_keys = SessionKeys {
            identity_key: self.curve25519_key(),
            base_key: base_key.public_key(),
            one_time_key: bob_one_time_key,
        };
        let session = Session::new(session_keys, ratchet, true);

        tracing::debug!(session_id = %session.session_id(), "created outbound session");

        Ok(session)
    }

    /// Processes an incoming pre-key message body.
    ///
    /// Implements the responder's (Bob's) side of the handshake. The one-time
    /// key the message refers to must still be held; it is not removed here.
    /// Call [`Account::remove_one_time_keys`] once the session is known good.
    pub fn create_inbound_session(&self, message: &str) -> Result<Session, Error> {
        self.inbound_session(None, message)
    }

    /// Like [`Account::create_inbound_session`], additionally requiring the
    /// message to come from `identity_key`.
    pub fn create_inbound_session_from(
        &self,
        identity_key: &str,
        message: &str,
    ) -> Result<Session, Error> {
        let identity_key = Curve25519PublicKey::from_base64(identity_key)?;
        self.inbound_session(Some(identity_key), message)
    }

    fn inbound_session(
        &self,
        alice_identity_key: Option<Curve25519PublicKey>,
        message: &str,
    ) -> Result<Session, Error> {
        let pre_key_message = PreKeyMessage::from_base64(message)?;
        let session_keys = pre_key_message.session_keys;

        if let Some(expected) = alice_identity_key {
            if expected != session_keys.identity_key {
                tracing::warn!("pre-key message from an unexpected identity key");
                return Err(Error::UnknownKeyId);
            }
        }

        let one_time_key = self
            .one_time_keys
            .find(&session_keys.one_time_key)
            .ok_or_else(|| {
                tracing::warn!("pre-key message refers to an unknown one-time key");
                Error::UnknownKeyId
            })?;

        let shared_secret = x3dh::initiate_for_bob(
            &self.identity_key,
            one_time_key,
            &session_keys.identity_key,
            &session_keys.base_key,
        )?;

        let ratchet = DoubleRatchet::initialize_for_bob(
            shared_secret,
            pre_key_message.message.ratchet_key,
            self.config,
        );
        let session = Session::new(session_keys, ratchet, false);

        tracing::debug!(
            session_id = %session.session_id(),
            one_time_key_id = one_time_key.id,
            "created inbound session"
        );

        Ok(session)
    }

    /// Destroys the account. Key material is scrubbed as it is dropped.
    pub fn clear(self) {
        tracing::debug!(curve25519 = %self.curve25519_key(), "clearing account");
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("identity_keys", &self.identity_keys())
            .field("one_time_keys", &self.one_time_keys.count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailingRng;
    use crate::utility::ed25519_verify;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_identity_keys_export() {
        let account = Account::new().unwrap();
        let keys = account.identity_keys();

        assert_eq!(keys.curve25519.len(), 43);
        assert_eq!(keys.ed25519.len(), 43);
        assert_ne!(keys.curve25519, keys.ed25519);

        let json = serde_json::to_value(&keys).unwrap();
        assert_eq!(json["curve25519"], keys.curve25519.as_str());
        assert_eq!(json["ed25519"], keys.ed25519.as_str());
    }

    #[test]
    fn test_signatures_verify() {
        let account = Account::new().unwrap();
        let signature = account.sign("HELLO WORLD");

        assert!(ed25519_verify("HELLO WORLD", &account.identity_keys().ed25519, &signature).unwrap());
        assert_eq!(account.sign("HELLO WORLD"), signature);
    }

    #[test]
    fn test_one_time_key_export() {
        let mut account = Account::new().unwrap();
        assert!(account.one_time_keys().curve25519.is_empty());

        account.generate_one_time_keys(2).unwrap();
        let keys = account.one_time_keys();
        let ids: Vec<&str> = keys.curve25519.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["AAAAAQ", "AAAAAg"]);

        account.mark_keys_as_published();
        assert!(account.one_time_keys().curve25519.is_empty());
        account.mark_keys_as_published();

        account.generate_one_time_keys(1).unwrap();
        let keys = account.one_time_keys();
        assert_eq!(keys.curve25519.len(), 1);
        assert!(keys.curve25519.contains_key("AAAAAw"));
    }

    #[test]
    fn test_one_time_keys_are_capped() {
        let mut account = Account::new().unwrap();
        assert_eq!(account.max_one_time_keys(), MAX_ONE_TIME_KEYS);

        account.generate_one_time_keys(MAX_ONE_TIME_KEYS).unwrap();
        let result = account.generate_one_time_keys(5).unwrap();

        assert_eq!(result.removed, vec![1, 2, 3, 4, 5]);
        assert_eq!(account.one_time_keys().curve25519.len(), MAX_ONE_TIME_KEYS);
    }

    #[test]
    fn test_seeded_accounts_are_reproducible() {
        let first = Account::new_with_rng(&mut StdRng::seed_from_u64(1)).unwrap();
        let second = Account::new_with_rng(&mut StdRng::seed_from_u64(1)).unwrap();
        let third = Account::new_with_rng(&mut StdRng::seed_from_u64(2)).unwrap();

        assert_eq!(first.identity_keys(), second.identity_keys());
        assert_ne!(first.identity_keys(), third.identity_keys());
    }

    #[test]
    fn test_outbound_session_rejects_bad_keys() {
        let account = Account::new().unwrap();
        let identity_key = account.identity_keys().curve25519;

        assert!(matches!(
            account.create_outbound_session(&identity_key, "not a key"),
            Err(Error::InvalidKeyEncoding(_))
        ));
        assert!(matches!(
            account.create_outbound_session("AAAA", &identity_key),
            Err(Error::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn test_inbound_session_from_wrong_identity() {
        let alice = Account::new().unwrap();
        let mut bob = Account::new().unwrap();
        bob.generate_one_time_keys(1).unwrap();
        let one_time_key = bob.one_time_keys().curve25519.into_values().next().unwrap();

        let mut session = alice
            .create_outbound_session(&bob.identity_keys().curve25519, &one_time_key)
            .unwrap();
        let message = session.encrypt("hi").unwrap();

        let mallory = Account::new().unwrap();
        assert!(matches!(
            bob.create_inbound_session_from(&mallory.identity_keys().curve25519, &message.ciphertext),
            Err(Error::UnknownKeyId)
        ));
        assert!(bob
            .create_inbound_session_from(&alice.identity_keys().curve25519, &message.ciphertext)
            .is_ok());
    }

    #[test]
    fn test_remove_one_time_keys_requires_held_key() {
        let mut alice = Account::new().unwrap();
        let mut bob = Account::new().unwrap();
        bob.generate_one_time_keys(1).unwrap();
        let one_time_key = bob.one_time_keys().curve25519.into_values().next().unwrap();

        let session = alice
            .create_outbound_session(&bob.identity_keys().curve25519, &one_time_key)
            .unwrap();

        // The outbound session references Bob's key, not one of Alice's
        assert_eq!(alice.remove_one_time_keys(&session), Err(Error::UnknownKeyId));
    }

    #[test]
    fn test_low_order_keys_are_rejected() {
        let alice = Account::new().unwrap();
        let mut bob = Account::new().unwrap();
        bob.generate_one_time_keys(1).unwrap();
        let bob_identity_key = bob.identity_keys().curve25519;
        let one_time_key = bob.one_time_keys().curve25519.into_values().next().unwrap();
        let zero = base64_encode([0u8; 32]);

        assert!(matches!(
            alice.create_outbound_session(&zero, &zero),
            Err(Error::InvalidKeyEncoding(_))
        ));
        assert!(matches!(
            alice.create_outbound_session(&bob_identity_key, &zero),
            Err(Error::InvalidKeyEncoding(_))
        ));

        // An inbound message with a low-order base key
        let mut session = alice
            .create_outbound_session(&bob_identity_key, &one_time_key)
            .unwrap();
        let message = session.encrypt("hi").unwrap();
        let mut pre_key_message = PreKeyMessage::from_base64(&message.ciphertext).unwrap();
        pre_key_message.session_keys.base_key = Curve25519PublicKey::from([0u8; 32]);

        assert!(matches!(
            bob.create_inbound_session(&pre_key_message.to_base64()),
            Err(Error::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn test_randomness_failures_are_reported() {
        assert!(matches!(
            Account::new_with_rng(&mut FailingRng),
            Err(Error::InsufficientRandomness)
        ));

        let mut account = Account::new().unwrap();
        account.generate_one_time_keys(2).unwrap();
        let before = account.one_time_keys();

        assert_eq!(
            account.generate_one_time_keys_with_rng(3, &mut FailingRng),
            Err(Error::InsufficientRandomness)
        );
        assert_eq!(account.one_time_keys(), before);
        assert_eq!(account.one_time_keys.count(), 2);

        // The failed call didn't consume any ids
        assert_eq!(account.generate_one_time_keys(1).unwrap().created, vec![3]);

        let mut peer = Account::new().unwrap();
        peer.generate_one_time_keys(1).unwrap();
        let one_time_key = peer.one_time_keys().curve25519.into_values().next().unwrap();

        assert!(matches!(
            account.create_outbound_session_with_rng(
                &peer.identity_keys().curve25519,
                &one_time_key,
                &mut FailingRng
            ),
            Err(Error::InsufficientRandomness)
        ));
    }
}
