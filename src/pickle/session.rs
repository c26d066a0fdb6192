use super::{
    ConfigPickle, PickleKind, config_from_pickle, decrypt, encrypt, public_key_from_slice,
    secret_from_slice,
};
use crate::ratchet::{
    Chain, DoubleRatchet, MessageKey, ReceiverChain, RootKey, SenderChain, SkippedKey,
};
use crate::types::Curve25519Secret;
use crate::x3dh::SessionKeys;
use crate::{Error, Session};
use prost::Message;
use std::collections::VecDeque;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const SESSION_PICKLE_VERSION: u32 = 1;

#[derive(Clone, PartialEq, prost::Message, Zeroize, ZeroizeOnDrop)]
struct ChainPickle {
    /// Private ratchet key for the sender chain, public for receiver chains.
    #[prost(bytes = "vec", tag = "1")]
    ratchet_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    chain_key: Vec<u8>,
    #[prost(uint32, tag = "3")]
    index: u32,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize, ZeroizeOnDrop)]
struct SkippedKeyPickle {
    #[prost(bytes = "vec", tag = "1")]
    ratchet_key: Vec<u8>,
    #[prost(uint32, tag = "2")]
    index: u32,
    #[prost(bytes = "vec", tag = "3")]
    message_key: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize, ZeroizeOnDrop)]
struct SessionPickle {
    #[prost(uint32, tag = "1")]
    version: u32,
    #[prost(bytes = "vec", tag = "2")]
    identity_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    base_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    one_time_key: Vec<u8>,
    #[prost(bool, tag = "5")]
    initiator: bool,
    #[prost(bool, tag = "6")]
    received_message: bool,
    #[prost(bytes = "vec", tag = "7")]
    root_key: Vec<u8>,
    #[prost(message, optional, tag = "8")]
    sender_chain: Option<ChainPickle>,
    #[prost(message, repeated, tag = "9")]
    receiver_chains: Vec<ChainPickle>,
    #[prost(message, repeated, tag = "10")]
    skipped_keys: Vec<SkippedKeyPickle>,
    #[prost(message, optional, tag = "11")]
    config: Option<ConfigPickle>,
}

fn chain_from_pickle(pickle: &ChainPickle) -> Result<Chain, Error> {
    let chain_key = secret_from_slice(&pickle.chain_key, "chain key")?;

    Ok(Chain {
        chain_key: *chain_key,
        index: pickle.index,
    })
}

impl Session {
    /// Serializes and encrypts the session under `key`.
    pub fn pickle(&self, key: &[u8]) -> Result<String, Error> {
        let ratchet = &self.ratchet;

        let sender_chain = ratchet.sender_chain.as_ref().map(|sender| ChainPickle {
            ratchet_key: sender.ratchet_key.as_bytes().to_vec(),
            chain_key: sender.chain.chain_key.to_vec(),
            index: sender.chain.index,
        });

        let receiver_chains = ratchet
            .receiver_chains
            .iter()
            .map(|receiver| ChainPickle {
                ratchet_key: receiver.ratchet_key.to_bytes().to_vec(),
                chain_key: receiver.chain.chain_key.to_vec(),
                index: receiver.chain.index,
            })
            .collect();

        let skipped_keys = ratchet
            .skipped_keys
            .iter()
            .map(|skipped| SkippedKeyPickle {
                ratchet_key: skipped.ratchet_key.to_bytes().to_vec(),
                index: skipped.message_key.index,
                message_key: skipped.message_key.key.to_vec(),
            })
            .collect();

        let session_pickle = SessionPickle {
            version: SESSION_PICKLE_VERSION,
            identity_key: self.session_keys.identity_key.to_bytes().to_vec(),
            base_key: self.session_keys.base_key.to_bytes().to_vec(),
            one_time_key: self.session_keys.one_time_key.to_bytes().to_vec(),
            initiator: self.initiator,
            received_message: self.received_message,
            root_key: ratchet.root_key.0.to_vec(),
            sender_chain,
            receiver_chains,
            skipped_keys,
            config: Some(ConfigPickle::from(&ratchet.config)),
        };

        let plaintext = Zeroizing::new(session_pickle.encode_to_vec());
        let pickle = encrypt(PickleKind::Session, &plaintext, key)?;

        tracing::debug!(session_id = %self.session_id(), "pickled session");

        Ok(pickle)
    }

    /// Restores a session from [`Session::pickle`] output.
    ///
    /// Fails with [`Error::BadSessionKey`] if `key` isn't the one the pickle
    /// was made with.
    pub fn from_pickle(pickle: &str, key: &[u8]) -> Result<Self, Error> {
        let plaintext = decrypt(PickleKind::Session, pickle, key)?;
        let session_pickle = SessionPickle::decode(plaintext.as_slice())
            .map_err(|err| Error::BadMessageFormat(format!("Failed to decode session: {err}")))?;

        if session_pickle.version != SESSION_PICKLE_VERSION {
            return Err(Error::UnsupportedVersion(session_pickle.version));
        }

        let session_keys = SessionKeys {
            identity_key: public_key_from_slice(&session_pickle.identity_key, "identity key")?,
            base_key: public_key_from_slice(&session_pickle.base_key, "base key")?,
            one_time_key: public_key_from_slice(&session_pickle.one_time_key, "one-time key")?,
        };

        let sender_chain = match session_pickle.sender_chain.as_ref() {
            Some(sender) => Some(SenderChain {
                ratchet_key: Curve25519Secret::from(secret_from_slice(
                    &sender.ratchet_key,
                    "ratchet key",
                )?),
                chain: chain_from_pickle(sender)?,
            }),
            None => None,
        };

        let receiver_chains = session_pickle
            .receiver_chains
            .iter()
            .map(|receiver| {
                Ok(ReceiverChain {
                    ratchet_key: public_key_from_slice(&receiver.ratchet_key, "ratchet key")?,
                    chain: chain_from_pickle(receiver)?,
                })
            })
            .collect::<Result<VecDeque<_>, Error>>()?;

        if sender_chain.is_none() && receiver_chains.is_empty() {
            return Err(Error::BadMessageFormat(
                "Session has neither a sending nor a receiving chain".to_string(),
            ));
        }

        let skipped_keys = session_pickle
            .skipped_keys
            .iter()
            .map(|skipped| {
                Ok(SkippedKey {
                    ratchet_key: public_key_from_slice(&skipped.ratchet_key, "ratchet key")?,
                    message_key: MessageKey {
                        key: *secret_from_slice(&skipped.message_key, "message key")?,
                        index: skipped.index,
                    },
                })
            })
            .collect::<Result<VecDeque<_>, Error>>()?;

        let root_key = secret_from_slice(&session_pickle.root_key, "root key")?;

        let ratchet = DoubleRatchet {
            root_key: RootKey(*root_key),
            sender_chain,
            receiver_chains,
            skipped_keys,
            config: config_from_pickle(session_pickle.config.as_ref())?,
        };

        let session = Session {
            session_keys,
            ratchet,
            initiator: session_pickle.initiator,
            received_message: session_pickle.received_message,
        };

        tracing::debug!(session_id = %session.session_id(), "unpickled session");

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Account, AccountConfig, SessionState};

    const PICKLE_KEY: &[u8] = b"It's a secret to everybody";

    fn session_pair() -> (Session, Session) {
        let alice = Account::new().unwrap();
        let mut bob = Account::with_config(AccountConfig {
            max_skipped_message_keys: 10,
            ..AccountConfig::default()
        })
        .unwrap();
        bob.generate_one_time_keys(1).unwrap();
        let one_time_key = bob.one_time_keys().curve25519.into_values().next().unwrap();

        let mut alice_session = alice
            .create_outbound_session(&bob.identity_keys().curve25519, &one_time_key)
            .unwrap();
        let message = alice_session.encrypt("hello").unwrap();
        let mut bob_session = bob.create_inbound_session(&message.ciphertext).unwrap();
        bob_session.decrypt(&message).unwrap();

        (alice_session, bob_session)
    }

    #[test]
    fn test_session_pickle_round_trip() {
        let (mut alice_session, mut bob_session) = session_pair();

        // Leave a skipped key behind on Alice's side
        let skipped = bob_session.encrypt("skipped").unwrap();
        let delivered = bob_session.encrypt("delivered").unwrap();
        alice_session.decrypt(&delivered).unwrap();

        let alice_pickle = alice_session.pickle(PICKLE_KEY).unwrap();
        let bob_pickle = bob_session.pickle(PICKLE_KEY).unwrap();

        let mut alice_session = Session::from_pickle(&alice_pickle, PICKLE_KEY).unwrap();
        let mut bob_session = Session::from_pickle(&bob_pickle, PICKLE_KEY).unwrap();

        assert_eq!(alice_session.pickle(PICKLE_KEY).unwrap(), alice_pickle);
        assert_eq!(alice_session.session_id(), bob_session.session_id());
        assert!(alice_session.has_received_message());
        assert_eq!(alice_session.state(), SessionState::Established);
        assert_eq!(bob_session.ratchet.config.max_skipped_message_keys, 10);

        assert_eq!(alice_session.decrypt(&skipped).unwrap(), b"skipped");

        let message = alice_session.encrypt("after restore").unwrap();
        assert_eq!(bob_session.decrypt(&message).unwrap(), b"after restore");
    }

    #[test]
    fn test_pending_session_survives_pickling() {
        let (alice_session, _) = session_pair();

        let pickle = alice_session.pickle(PICKLE_KEY).unwrap();
        let restored = Session::from_pickle(&pickle, PICKLE_KEY).unwrap();

        assert_eq!(restored.state(), SessionState::OutboundPending);
        assert!(!restored.has_received_message());
    }

    #[test]
    fn test_session_pickle_wrong_key() {
        let (alice_session, _) = session_pair();
        let pickle = alice_session.pickle(PICKLE_KEY).unwrap();

        assert!(matches!(
            Session::from_pickle(&pickle, b"wrong key"),
            Err(Error::BadSessionKey)
        ));
    }

    #[test]
    fn test_account_pickle_is_not_a_session() {
        let account = Account::new().unwrap();
        let pickle = account.pickle(PICKLE_KEY).unwrap();

        assert!(matches!(
            Session::from_pickle(&pickle, PICKLE_KEY),
            Err(Error::BadSessionKey)
        ));
    }

    #[test]
    fn test_session_without_chains_is_rejected() {
        let session_pickle = SessionPickle {
            version: SESSION_PICKLE_VERSION,
            identity_key: vec![1; 32],
            base_key: vec![2; 32],
            one_time_key: vec![3; 32],
            initiator: false,
            received_message: false,
            root_key: vec![4; 32],
            sender_chain: None,
            receiver_chains: Vec::new(),
            skipped_keys: Vec::new(),
            config: Some(ConfigPickle::from(&AccountConfig::default())),
        };
        let plaintext = session_pickle.encode_to_vec();
        let pickle = encrypt(PickleKind::Session, &plaintext, PICKLE_KEY).unwrap();

        assert!(matches!(
            Session::from_pickle(&pickle, PICKLE_KEY),
            Err(Error::BadMessageFormat(_))
        ));
    }
}
