mod curve25519;
pub use curve25519::*;
mod ed25519;
pub use ed25519::*;

use crate::Error;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use rand::TryCryptoRng;
use zeroize::Zeroizing;

/// Standard alphabet, unpadded on output, padding tolerated on input.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub(crate) fn base64_encode(bytes: impl AsRef<[u8]>) -> String {
    BASE64.encode(bytes)
}

pub(crate) fn base64_decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
    Ok(BASE64.decode(input)?)
}

/// Fills a 32-byte seed from the given cryptographically secure source.
pub(crate) fn random_seed<R: TryCryptoRng>(rng: &mut R) -> Result<Zeroizing<[u8; 32]>, Error> {
    let mut seed = Zeroizing::new([0u8; 32]);
    rng.try_fill_bytes(seed.as_mut_slice())
        .map_err(|_| Error::InsufficientRandomness)?;
    Ok(seed)
}

/// Randomness source that always fails.
#[cfg(test)]
pub(crate) struct FailingRng;

#[cfg(test)]
impl rand::TryRngCore for FailingRng {
    type Error = std::fmt::Error;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        Err(std::fmt::Error)
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        Err(std::fmt::Error)
    }

    fn try_fill_bytes(&mut self, _dst: &mut [u8]) -> Result<(), Self::Error> {
        Err(std::fmt::Error)
    }
}

#[cfg(test)]
impl TryCryptoRng for FailingRng {}
