use crate::Error;
use crate::ratchet::{DoubleRatchet, MessageType, NormalMessage, OlmMessage};
use crate::types::{Curve25519PublicKey, base64_encode};
use crate::x3dh::{PreKeyMessage, SessionKeys};
use rand::TryCryptoRng;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;

/// Where a session stands in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Outbound session that hasn't heard back from the peer yet. Every
    /// message it sends is a pre-key message.
    OutboundPending,
    /// The peer is known to hold the session: it's inbound, or it has
    /// decrypted at least one reply.
    Established,
}

/// An encrypted conversation with one peer device.
///
/// Sessions are created by an [`crate::Account`], either outbound from the
/// peer's published keys or inbound from a received pre-key message. Both
/// ends of a conversation derive the same [`Session::session_id`].
pub struct Session {
    pub(crate) session_keys: SessionKeys,
    pub(crate) ratchet: DoubleRatchet,
    pub(crate) initiator: bool,
    pub(crate) received_message: bool,
}

impl Session {
    pub(crate) fn new(session_keys: SessionKeys, ratchet: DoubleRatchet, initiator: bool) -> Self {
        Self {
            session_keys,
            ratchet,
            initiator,
            received_message: false,
        }
    }

    /// Identifier shared by both ends of the conversation.
    ///
    /// Base64 of SHA-256 over the initiator's identity key, the base key and
    /// the one-time key used in the handshake.
    pub fn session_id(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.session_keys.identity_key.as_bytes());
        hasher.update(self.session_keys.base_key.as_bytes());
        hasher.update(self.session_keys.one_time_key.as_bytes());

        base64_encode(hasher.finalize())
    }

    pub fn state(&self) -> SessionState {
        if self.initiator && !self.received_message {
            SessionState::OutboundPending
        } else {
            SessionState::Established
        }
    }

    /// Whether at least one message was successfully decrypted. Never resets.
    pub fn has_received_message(&self) -> bool {
        self.received_message
    }

    /// The type of message the next call to [`Session::encrypt`] produces.
    pub fn encrypt_message_type(&self) -> MessageType {
        match self.state() {
            SessionState::OutboundPending => MessageType::PreKey,
            SessionState::Established => MessageType::Normal,
        }
    }

    /// The one-time key this session was established with.
    pub(crate) fn one_time_key(&self) -> Curve25519PublicKey {
        self.session_keys.one_time_key
    }

    /// Encrypts a message for the peer.
    pub fn encrypt(&mut self, plaintext: impl AsRef<[u8]>) -> Result<OlmMessage, Error> {
        self.encrypt_with_rng(plaintext, &mut OsRng)
    }

    /// Same as [`Session::encrypt`], drawing ratchet keys from `rng`.
    pub fn encrypt_with_rng<R: TryCryptoRng>(
        &mut self,
        plaintext: impl AsRef<[u8]>,
        rng: &mut R,
    ) -> Result<OlmMessage, Error> {
        let message = self.ratchet.encrypt(plaintext.as_ref(), rng)?;

        let olm_message = match self.encrypt_message_type() {
            MessageType::PreKey => {
                let pre_key_message = PreKeyMessage {
                    session_keys: self.session_keys,
                    message,
                };
                OlmMessage::new(MessageType::PreKey, pre_key_message.to_base64())
            }
            MessageType::Normal => OlmMessage::new(MessageType::Normal, message.to_base64()),
        };

        Ok(olm_message)
    }

    /// Decrypts a message from the peer.
    ///
    /// A pre-key message has to carry this session's handshake keys. On
    /// failure the session is left exactly as it was.
    pub fn decrypt(&mut self, message: &OlmMessage) -> Result<Vec<u8>, Error> {
        let normal_message = match message.message_type {
            MessageType::PreKey => {
                let pre_key_message = PreKeyMessage::from_base64(&message.ciphertext)?;
                if pre_key_message.session_keys != self.session_keys {
                    tracing::warn!("pre-key message doesn't belong to this session");
                    return Err(Error::BadMessageFormat(
                        "Pre-key message doesn't match the session".to_string(),
                    ));
                }
                pre_key_message.message
            }
            MessageType::Normal => NormalMessage::from_base64(&message.ciphertext)?,
        };

        let plaintext = self.ratchet.decrypt(&normal_message).inspect_err(|err| {
            tracing::warn!(error = %err, message_type = %message.message_type, "failed to decrypt message");
        })?;

        if !self.received_message {
            tracing::debug!(session_id = %self.session_id(), "first message received on session");
            self.received_message = true;
        }

        Ok(plaintext)
    }

    /// Checks whether a pre-key message body was produced for this session.
    pub fn matches_inbound(&self, message: &str) -> Result<bool, Error> {
        let pre_key_message = PreKeyMessage::from_base64(message)?;

        Ok(pre_key_message.session_keys == self.session_keys)
    }

    /// Like [`Session::matches_inbound`], also requiring the message to come
    /// from `identity_key`.
    pub fn matches_inbound_from(&self, identity_key: &str, message: &str) -> Result<bool, Error> {
        let identity_key = Curve25519PublicKey::from_base64(identity_key)?;
        let pre_key_message = PreKeyMessage::from_base64(message)?;

        Ok(pre_key_message.session_keys.identity_key == identity_key
            && pre_key_message.session_keys == self.session_keys)
    }

    /// Destroys the session. Key material is scrubbed as it is dropped.
    pub fn clear(self) {
        tracing::debug!(session_id = %self.session_id(), "clearing session");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id())
            .field("state", &self.state())
            .field("ratchet_key", &self.ratchet.ratchet_key())
            .field("received_message", &self.received_message)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::types::FailingRng;
    use crate::{Account, Error, MessageType, OlmMessage, SessionState};

    fn session_pair() -> (crate::Session, crate::Session) {
        let alice = Account::new().unwrap();
        let mut bob = Account::new().unwrap();
        bob.generate_one_time_keys(1).unwrap();

        let one_time_key = bob
            .one_time_keys()
            .curve25519
            .into_values()
            .next()
            .unwrap();
        let mut alice_session = alice
            .create_outbound_session(&bob.identity_keys().curve25519, &one_time_key)
            .unwrap();

        let first = alice_session.encrypt("first").unwrap();
        let mut bob_session = bob.create_inbound_session(&first.ciphertext).unwrap();
        assert_eq!(bob_session.decrypt(&first).unwrap(), b"first");

        (alice_session, bob_session)
    }

    #[test]
    fn test_session() {
        let (mut alice_session, mut bob_session) = session_pair();

        assert_eq!(alice_session.session_id(), bob_session.session_id());
        assert_eq!(alice_session.state(), SessionState::OutboundPending);
        assert_eq!(bob_session.state(), SessionState::Established);

        let message = "Hello Alice, I received your message!";
        let encrypted = bob_session.encrypt(message).unwrap();
        assert_eq!(encrypted.message_type, MessageType::Normal);

        let decrypted = alice_session.decrypt(&encrypted).unwrap();
        assert_eq!(String::from_utf8(decrypted).unwrap(), message);
        assert_eq!(alice_session.state(), SessionState::Established);
        assert_eq!(alice_session.encrypt_message_type(), MessageType::Normal);
    }

    #[test]
    fn test_outbound_session_sends_pre_key_messages_until_reply() {
        let (mut alice_session, mut bob_session) = session_pair();

        let second = alice_session.encrypt("second").unwrap();
        assert_eq!(second.message_type, MessageType::PreKey);
        assert_eq!(bob_session.decrypt(&second).unwrap(), b"second");

        let reply = bob_session.encrypt("reply").unwrap();
        alice_session.decrypt(&reply).unwrap();

        let third = alice_session.encrypt("third").unwrap();
        assert_eq!(third.message_type, MessageType::Normal);
        assert_eq!(bob_session.decrypt(&third).unwrap(), b"third");
    }

    #[test]
    fn test_pre_key_message_for_another_session() {
        let (_, mut bob_session) = session_pair();
        let (mut other_alice_session, _) = session_pair();

        let foreign = other_alice_session.encrypt("hello").unwrap();
        assert!(!bob_session.matches_inbound(&foreign.ciphertext).unwrap());
        assert!(matches!(
            bob_session.decrypt(&foreign),
            Err(Error::BadMessageFormat(_))
        ));
    }

    #[test]
    fn test_malformed_messages_are_rejected() {
        let (_, mut bob_session) = session_pair();

        let garbage = OlmMessage::new(MessageType::Normal, "AwAA");
        assert!(matches!(
            bob_session.decrypt(&garbage),
            Err(Error::BadMessageFormat(_))
        ));

        let truncated = OlmMessage::new(MessageType::Normal, "%%%");
        assert!(matches!(
            bob_session.decrypt(&truncated),
            Err(Error::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_matches_inbound_from_checks_identity() {
        let alice = Account::new().unwrap();
        let mut bob = Account::new().unwrap();
        bob.generate_one_time_keys(1).unwrap();
        let one_time_key = bob.one_time_keys().curve25519.into_values().next().unwrap();

        let mut alice_session = alice
            .create_outbound_session(&bob.identity_keys().curve25519, &one_time_key)
            .unwrap();
        let message = alice_session.encrypt("hi").unwrap();
        let bob_session = bob.create_inbound_session(&message.ciphertext).unwrap();

        let alice_key = alice.identity_keys().curve25519;
        let bob_key = bob.identity_keys().curve25519;
        assert!(bob_session
            .matches_inbound_from(&alice_key, &message.ciphertext)
            .unwrap());
        assert!(!bob_session
            .matches_inbound_from(&bob_key, &message.ciphertext)
            .unwrap());
        assert!(matches!(
            bob_session.matches_inbound_from("short", &message.ciphertext),
            Err(Error::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn test_encrypt_reports_randomness_failure() {
        let (mut alice_session, mut bob_session) = session_pair();

        // Alice still owns her first sending chain, so no randomness is needed
        let again = alice_session
            .encrypt_with_rng("again", &mut FailingRng)
            .unwrap();
        assert_eq!(bob_session.decrypt(&again).unwrap(), b"again");

        // Bob's first reply needs a fresh ratchet key
        let before = bob_session.pickle(b"pickle key").unwrap();
        assert_eq!(
            bob_session.encrypt_with_rng("reply", &mut FailingRng),
            Err(Error::InsufficientRandomness)
        );
        assert_eq!(bob_session.pickle(b"pickle key").unwrap(), before);

        let reply = bob_session.encrypt("reply").unwrap();
        assert_eq!(alice_session.decrypt(&reply).unwrap(), b"reply");
    }
}
