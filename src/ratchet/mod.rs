mod chain;
mod message;
mod state;

pub(crate) use crate::ratchet::chain::{Chain, MessageKey};
pub use crate::ratchet::message::{MessageType, OlmMessage};
pub(crate) use crate::ratchet::message::{MESSAGE_VERSION, NormalMessage, check_version};
pub(crate) use crate::ratchet::state::{ReceiverChain, RootKey, SenderChain, SkippedKey};

use crate::types::{Curve25519PublicKey, Curve25519Secret};
use crate::x3dh::X3DHSharedSecret;
use crate::{AccountConfig, Error};
use aes_gcm_siv::aead::{Aead, Payload};
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::TryCryptoRng;
use sha2::Sha256;
use std::collections::VecDeque;
use x25519_dalek::SharedSecret;
use zeroize::Zeroizing;

const NONCE_SIZE: usize = 12; // AES-GCM-SIV uses 12-byte (96-bit) nonces

const RATCHET_INFO: &[u8] = b"OLM_RATCHET";
const MESSAGE_KEYS_INFO: &[u8] = b"OLM_KEYS";

/// Double ratchet state of one session.
///
/// The ratchet manages:
/// - A root key that evolves with each Diffie-Hellman ratchet step
/// - At most one sender chain, owned by our current ratchet key
/// - A bounded list of receiver chains, newest first, one per peer ratchet key
/// - A bounded FIFO cache of skipped message keys for out-of-order delivery
///
/// The sender chain is dropped whenever a new peer ratchet key arrives, and
/// a fresh ratchet key is generated on the next encryption.
#[derive(Clone)]
pub(crate) struct DoubleRatchet {
    pub(crate) root_key: RootKey,
    pub(crate) sender_chain: Option<SenderChain>,
    pub(crate) receiver_chains: VecDeque<ReceiverChain>,
    pub(crate) skipped_keys: VecDeque<SkippedKey>,
    pub(crate) config: AccountConfig,
}

impl DoubleRatchet {
    /// Initializes the ratchet for the initiator (Alice).
    ///
    /// The handshake chain becomes the sending chain, owned by a freshly
    /// generated ratchet key.
    pub(crate) fn initialize_for_alice<R: TryCryptoRng>(
        shared_secret: X3DHSharedSecret,
        config: AccountConfig,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let ratchet_key = Curve25519Secret::new(rng)?;

        Ok(Self {
            root_key: RootKey(shared_secret.root_key),
            sender_chain: Some(SenderChain {
                ratchet_key,
                chain: Chain::new(shared_secret.chain_key),
            }),
            receiver_chains: VecDeque::new(),
            skipped_keys: VecDeque::new(),
            config,
        })
    }

    /// Initializes the ratchet for the responder (Bob).
    ///
    /// The handshake chain becomes the first receiving chain, keyed by the
    /// ratchet key Alice sent along with her first message.
    pub(crate) fn initialize_for_bob(
        shared_secret: X3DHSharedSecret,
        alice_ratchet_key: Curve25519PublicKey,
        config: AccountConfig,
    ) -> Self {
        let mut receiver_chains = VecDeque::with_capacity(config.max_receiver_chains);
        receiver_chains.push_front(ReceiverChain {
            ratchet_key: alice_ratchet_key,
            chain: Chain::new(shared_secret.chain_key),
        });

        Self {
            root_key: RootKey(shared_secret.root_key),
            sender_chain: None,
            receiver_chains,
            skipped_keys: VecDeque::new(),
            config,
        }
    }

    /// Public half of our current ratchet key, if a sender chain exists.
    pub(crate) fn ratchet_key(&self) -> Option<Curve25519PublicKey> {
        self.sender_chain
            .as_ref()
            .map(|sender| sender.ratchet_key.public_key())
    }

    /// Key derivation function for the root key ratchet.
    ///
    /// Returns the new root key and the key of the new chain.
    fn kdf_root(root_key: &RootKey, dh_output: SharedSecret) -> Result<(RootKey, [u8; 32]), Error> {
        let hkdf = Hkdf::<Sha256>::new(Some(root_key.0.as_slice()), dh_output.as_bytes());

        let mut output = Zeroizing::new([0u8; 64]);
        hkdf.expand(RATCHET_INFO, output.as_mut_slice())?;

        let mut new_root_key = RootKey([0u8; 32]);
        new_root_key.0.copy_from_slice(&output[0..32]);
        let mut chain_key = [0u8; 32];
        chain_key.copy_from_slice(&output[32..64]);

        Ok((new_root_key, chain_key))
    }

    /// Encrypts a message with the next key of the sending chain.
    ///
    /// If there is no sending chain, a new ratchet key is generated and a
    /// Diffie-Hellman ratchet step against the newest receiving chain
    /// creates one.
    pub(crate) fn encrypt<R: TryCryptoRng>(
        &mut self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<NormalMessage, Error> {
        if self.sender_chain.is_none() {
            self.advance_sender_chain(rng)?;
        }

        let sender = self
            .sender_chain
            .as_mut()
            .ok_or_else(|| Error::Crypto("No sending chain available".to_string()))?;

        let ratchet_key = sender.ratchet_key.public_key();
        let message_key = sender.chain.next()?;
        let ciphertext = Self::encrypt_message(&message_key, &ratchet_key, plaintext)?;

        Ok(NormalMessage {
            ratchet_key,
            chain_index: message_key.index,
            ciphertext,
        })
    }

    fn advance_sender_chain<R: TryCryptoRng>(&mut self, rng: &mut R) -> Result<(), Error> {
        let their_ratchet_key = self
            .receiver_chains
            .front()
            .map(|chain| chain.ratchet_key)
            .ok_or_else(|| Error::Crypto("No receiving chain to ratchet against".to_string()))?;

        let ratchet_key = Curve25519Secret::new(rng)?;
        let dh_output = ratchet_key.dh(&their_ratchet_key)?;
        let (root_key, chain_key) = Self::kdf_root(&self.root_key, dh_output)?;

        self.root_key = root_key;
        self.sender_chain = Some(SenderChain {
            ratchet_key,
            chain: Chain::new(chain_key),
        });

        tracing::trace!("ratchet step: new sending chain");

        Ok(())
    }

    /// Decrypts a message.
    ///
    /// The ratchet is only updated if decryption succeeds, so a forged or
    /// corrupted message never desynchronizes the session.
    pub(crate) fn decrypt(&mut self, message: &NormalMessage) -> Result<Vec<u8>, Error> {
        let mut ratchet = self.clone();
        let plaintext = ratchet.decrypt_in_place(message)?;
        *self = ratchet;

        Ok(plaintext)
    }

    fn decrypt_in_place(&mut self, message: &NormalMessage) -> Result<Vec<u8>, Error> {
        let position = self
            .receiver_chains
            .iter()
            .position(|chain| chain.ratchet_key == message.ratchet_key);

        match position {
            Some(position) => self.decrypt_with_receiver_chain(position, message),
            None => self.decrypt_with_new_ratchet_key(message),
        }
    }

    fn decrypt_with_receiver_chain(
        &mut self,
        position: usize,
        message: &NormalMessage,
    ) -> Result<Vec<u8>, Error> {
        let max_gap = self.config.max_message_gap;
        let chain = &mut self
            .receiver_chains
            .get_mut(position)
            .ok_or_else(|| Error::Crypto("Receiving chain vanished".to_string()))?
            .chain;

        if message.chain_index < chain.index {
            return self.decrypt_with_skipped_key(message);
        }

        let (skipped, message_key) = Self::fast_forward(chain, message.chain_index, max_gap)?;
        let plaintext = Self::decrypt_message(&message_key, message)?;
        self.store_skipped_keys(message.ratchet_key, skipped);

        Ok(plaintext)
    }

    /// Performs a Diffie-Hellman ratchet step for a ratchet key we haven't
    /// seen before.
    fn decrypt_with_new_ratchet_key(&mut self, message: &NormalMessage) -> Result<Vec<u8>, Error> {
        let sender = self.sender_chain.take().ok_or_else(|| {
            Error::BadMessageFormat("Unknown ratchet key before any message was sent".to_string())
        })?;

        let dh_output = sender.ratchet_key.dh(&message.ratchet_key)?;
        let (root_key, chain_key) = Self::kdf_root(&self.root_key, dh_output)?;

        let mut chain = Chain::new(chain_key);
        let (skipped, message_key) =
            Self::fast_forward(&mut chain, message.chain_index, self.config.max_message_gap)?;
        let plaintext = Self::decrypt_message(&message_key, message)?;

        self.root_key = root_key;
        self.receiver_chains.push_front(ReceiverChain {
            ratchet_key: message.ratchet_key,
            chain,
        });
        self.receiver_chains
            .truncate(self.config.max_receiver_chains.max(1));
        self.store_skipped_keys(message.ratchet_key, skipped);

        tracing::trace!(
            receiver_chains = self.receiver_chains.len(),
            "ratchet step: new receiving chain"
        );

        Ok(plaintext)
    }

    /// Decrypts a message that arrived after a later one from the same chain.
    ///
    /// Each skipped key is used once. A key that was already used or evicted
    /// makes the message undecryptable.
    fn decrypt_with_skipped_key(&mut self, message: &NormalMessage) -> Result<Vec<u8>, Error> {
        let position = self
            .skipped_keys
            .iter()
            .position(|skipped| {
                skipped.ratchet_key == message.ratchet_key
                    && skipped.message_key.index == message.chain_index
            })
            .ok_or(Error::UnknownKeyId)?;

        let skipped = self.skipped_keys.remove(position).ok_or(Error::UnknownKeyId)?;

        Self::decrypt_message(&skipped.message_key, message)
    }

    /// Advances `chain` up to `index`, returning the keys passed over and the
    /// key for `index` itself.
    fn fast_forward(
        chain: &mut Chain,
        index: u32,
        max_gap: u32,
    ) -> Result<(Vec<MessageKey>, MessageKey), Error> {
        let gap = index - chain.index;
        if gap > max_gap {
            return Err(Error::BadMessageFormat(format!(
                "Message gap of {gap} exceeds the limit of {max_gap}"
            )));
        }

        let mut skipped = Vec::new();
        while chain.index < index {
            skipped.push(chain.next()?);
        }

        Ok((skipped, chain.next()?))
    }

    fn store_skipped_keys(&mut self, ratchet_key: Curve25519PublicKey, keys: Vec<MessageKey>) {
        if keys.is_empty() {
            return;
        }

        tracing::trace!(count = keys.len(), "caching skipped message keys");

        for message_key in keys {
            self.skipped_keys.push_back(SkippedKey {
                ratchet_key,
                message_key,
            });
        }

        while self.skipped_keys.len() > self.config.max_skipped_message_keys {
            self.skipped_keys.pop_front();
        }
    }

    /// Derives the AEAD key and nonce for a message key.
    fn message_cipher(message_key: &MessageKey) -> Result<(Aes256GcmSiv, [u8; NONCE_SIZE]), Error> {
        let hkdf = Hkdf::<Sha256>::new(None, message_key.key.as_slice());

        let mut derived_material = Zeroizing::new([0u8; 44]);
        hkdf.expand(MESSAGE_KEYS_INFO, derived_material.as_mut_slice())?;

        let key = aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(&derived_material[0..32]);
        let cipher = Aes256GcmSiv::new(key);

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&derived_material[32..44]);

        Ok((cipher, nonce))
    }

    fn encrypt_message(
        message_key: &MessageKey,
        ratchet_key: &Curve25519PublicKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let (cipher, nonce) = Self::message_cipher(message_key)?;
        let ad = NormalMessage::associated_data(ratchet_key, message_key.index);

        cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &ad,
                },
            )
            .map_err(|_| Error::Crypto("Message encryption failed".to_string()))
    }

    fn decrypt_message(message_key: &MessageKey, message: &NormalMessage) -> Result<Vec<u8>, Error> {
        let (cipher, nonce) = Self::message_cipher(message_key)?;
        let ad = NormalMessage::associated_data(&message.ratchet_key, message.chain_index);

        cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &message.ciphertext,
                    aad: &ad,
                },
            )
            .map_err(|_| Error::BadMessageMac)
    }
}
