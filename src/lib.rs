//! Olm-style end-to-end encrypted sessions between two devices.
//!
//! An [`Account`] holds a device's identity keys and a pool of one-time
//! keys. Sessions are established with a triple Diffie-Hellman handshake
//! over a published one-time key, after which a double ratchet derives a
//! fresh key for every message. Accounts and sessions can be pickled to
//! encrypted text for storage.

mod types;
pub use types::{Curve25519PublicKey, Ed25519PublicKey, Ed25519Signature};

mod x3dh;
pub use x3dh::OneTimeKeyGenerationResult;

mod ratchet;
pub use ratchet::{MessageType, OlmMessage};

mod error;
pub use error::Error;

mod account;
pub use account::*;

mod pickle;

pub mod utility;
