use crate::Error;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

const CHAIN_KEY_SEED: &[u8] = &[0x01];
const MESSAGE_KEY_SEED: &[u8] = &[0x02];

/// A single-use key for one message at a fixed chain index.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct MessageKey {
    pub(crate) key: [u8; 32],
    pub(crate) index: u32,
}

/// Symmetric ratchet chain for deriving message keys
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct Chain {
    pub(crate) chain_key: [u8; 32],
    pub(crate) index: u32,
}

impl Chain {
    pub(crate) fn new(chain_key: [u8; 32]) -> Self {
        Self {
            chain_key,
            index: 0,
        }
    }

    /// Advances the chain and returns the message key for the index it was at.
    pub(crate) fn next(&mut self) -> Result<MessageKey, Error> {
        let message_key = hmac(&self.chain_key, MESSAGE_KEY_SEED)?;
        let next_chain_key = hmac(&self.chain_key, CHAIN_KEY_SEED)?;

        let key = MessageKey {
            key: message_key,
            index: self.index,
        };

        self.chain_key = next_chain_key;
        self.index = self.index.wrapping_add(1);

        Ok(key)
    }
}

fn hmac(key: &[u8; 32], seed: &[u8]) -> Result<[u8; 32], Error> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_slice())?;
    mac.update(seed);

    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    Ok(output)
}
