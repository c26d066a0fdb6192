/// Errors that can occur during account, session and pickle operations.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// The input was not valid base64.
    #[error("Invalid base64 encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    /// A message or pickle was produced by a protocol version this library can't read.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u32),

    /// The decoded bytes are not a well-formed message or pickle.
    #[error("Bad message format: {0}")]
    BadMessageFormat(String),

    /// The message failed authentication.
    #[error("Bad message MAC")]
    BadMessageMac,

    /// The referenced one-time key or message key is not held.
    #[error("Unknown key id")]
    UnknownKeyId,

    /// The account pickle could not be decrypted with the supplied key.
    #[error("Bad account pickle key")]
    BadAccountKey,

    /// The session pickle could not be decrypted with the supplied key.
    #[error("Bad session pickle key")]
    BadSessionKey,

    /// The random number generator failed. Not recoverable.
    #[error("Insufficient randomness")]
    InsufficientRandomness,

    /// A public key or signature could not be decoded.
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// A cryptographic primitive rejected its input.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

impl From<hkdf::InvalidLength> for Error {
    fn from(value: hkdf::InvalidLength) -> Self {
        Self::Crypto(value.to_string())
    }
}

impl From<hmac::digest::InvalidLength> for Error {
    fn from(value: hmac::digest::InvalidLength) -> Self {
        Self::Crypto(value.to_string())
    }
}
