use crate::ratchet::chain::{Chain, MessageKey};
use crate::types::{Curve25519PublicKey, Curve25519Secret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Our current ratchet key pair and the chain it owns.
#[derive(Clone)]
pub(crate) struct SenderChain {
    pub(crate) ratchet_key: Curve25519Secret,
    pub(crate) chain: Chain,
}

/// A chain keyed by one of the peer's ratchet keys.
#[derive(Clone)]
pub(crate) struct ReceiverChain {
    pub(crate) ratchet_key: Curve25519PublicKey,
    pub(crate) chain: Chain,
}

/// A message key derived while skipping ahead, kept until used or evicted.
#[derive(Clone)]
pub(crate) struct SkippedKey {
    pub(crate) ratchet_key: Curve25519PublicKey,
    pub(crate) message_key: MessageKey,
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct RootKey(pub(crate) [u8; 32]);
