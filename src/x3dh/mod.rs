mod identity_key;
pub(crate) use identity_key::*;
mod one_time_key;
pub use one_time_key::OneTimeKeyGenerationResult;
pub(crate) use one_time_key::{OneTimeKey, OneTimeKeyStore};
mod pre_key_message;
pub(crate) use pre_key_message::*;

use crate::Error;
use crate::types::{Curve25519PublicKey, Curve25519Secret};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::SharedSecret;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const ROOT_INFO: &[u8] = b"OLM_ROOT";

/// Output of the triple Diffie-Hellman handshake: the initial root key and
/// the key of the first chain.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct X3DHSharedSecret {
    pub(crate) root_key: [u8; 32],
    pub(crate) chain_key: [u8; 32],
}

/// Alice's side of the handshake.
///
/// `a_base_key` is Alice's fresh ephemeral key, `b_one_time_key` the
/// one-time key Bob published.
pub(crate) fn initiate_for_alice(
    a_identity: &IdentityKey,
    a_base_key: &Curve25519Secret,
    b_identity_public: &Curve25519PublicKey,
    b_one_time_key: &Curve25519PublicKey,
) -> Result<X3DHSharedSecret, Error> {
    // DH1 = DH(IKa, OTKb)
    let dh1 = a_identity.dh(b_one_time_key)?;
    // DH2 = DH(EKa, IKb)
    let dh2 = a_base_key.dh(b_identity_public)?;
    // DH3 = DH(EKa, OTKb)
    let dh3 = a_base_key.dh(b_one_time_key)?;

    calculate_shared_secret(dh1, dh2, dh3)
}

/// Bob's side of the handshake, mirroring [`initiate_for_alice`].
pub(crate) fn initiate_for_bob(
    b_identity: &IdentityKey,
    b_one_time_key: &OneTimeKey,
    a_identity_public: &Curve25519PublicKey,
    a_base_key_public: &Curve25519PublicKey,
) -> Result<X3DHSharedSecret, Error> {
    // DH1 = DH(OTKb, IKa)
    let dh1 = b_one_time_key.dh(a_identity_public)?;
    // DH2 = DH(IKb, EKa)
    let dh2 = b_identity.dh(a_base_key_public)?;
    // DH3 = DH(OTKb, EKa)
    let dh3 = b_one_time_key.dh(a_base_key_public)?;

    calculate_shared_secret(dh1, dh2, dh3)
}

fn calculate_shared_secret(
    dh1: SharedSecret,
    dh2: SharedSecret,
    dh3: SharedSecret,
) -> Result<X3DHSharedSecret, Error> {
    // IKM = DH1 || DH2 || DH3
    let mut key_material = Zeroizing::new([0u8; 96]);
    key_material[0..32].copy_from_slice(dh1.as_bytes());
    key_material[32..64].copy_from_slice(dh2.as_bytes());
    key_material[64..96].copy_from_slice(dh3.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(None, key_material.as_slice());

    let mut output = Zeroizing::new([0u8; 64]);
    hkdf.expand(ROOT_INFO, output.as_mut_slice())?;

    let mut shared_secret = X3DHSharedSecret {
        root_key: [0u8; 32],
        chain_key: [0u8; 32],
    };
    shared_secret.root_key.copy_from_slice(&output[0..32]);
    shared_secret.chain_key.copy_from_slice(&output[32..64]);

    Ok(shared_secret)
}
