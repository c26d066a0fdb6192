use crate::Error;
use crate::ratchet::{MESSAGE_VERSION, NormalMessage, check_version};
use crate::types::{Curve25519PublicKey, base64_decode, base64_encode};
use prost::Message;

#[derive(Clone, PartialEq, prost::Message)]
struct PreKeyMessageProto {
    #[prost(bytes = "vec", tag = "1")]
    one_time_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    base_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    identity_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    message: Vec<u8>,
}

/// The public keys that pin a session to one handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SessionKeys {
    /// Curve25519 identity key of the initiator.
    pub(crate) identity_key: Curve25519PublicKey,
    /// Ephemeral key the initiator generated for the handshake.
    pub(crate) base_key: Curve25519PublicKey,
    /// Responder's one-time key consumed by the handshake.
    pub(crate) one_time_key: Curve25519PublicKey,
}

/// First message of a session: the handshake keys plus an embedded
/// [`NormalMessage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PreKeyMessage {
    pub(crate) session_keys: SessionKeys,
    pub(crate) message: NormalMessage,
}

impl PreKeyMessage {
    /// Serializes the message. Format: [version][protobuf body]
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let proto = PreKeyMessageProto {
            one_time_key: self.session_keys.one_time_key.to_bytes().to_vec(),
            base_key: self.session_keys.base_key.to_bytes().to_vec(),
            identity_key: self.session_keys.identity_key.to_bytes().to_vec(),
            message: self.message.to_bytes(),
        };

        let mut result = Vec::with_capacity(1 + proto.encoded_len());
        result.push(MESSAGE_VERSION);
        result.extend_from_slice(&proto.encode_to_vec());

        result
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let body = check_version(bytes)?;
        let proto = PreKeyMessageProto::decode(body)
            .map_err(|err| Error::BadMessageFormat(format!("pre-key message: {err}")))?;

        let key = |bytes: &[u8], name: &str| {
            Curve25519PublicKey::from_slice(bytes).map_err(|_| {
                Error::InvalidKeyEncoding(format!(
                    "{name} in pre-key message must be 32 bytes, got {}",
                    bytes.len()
                ))
            })
        };

        let session_keys = SessionKeys {
            one_time_key: key(&proto.one_time_key, "one-time key")?,
            base_key: key(&proto.base_key, "base key")?,
            identity_key: key(&proto.identity_key, "identity key")?,
        };

        Ok(Self {
            session_keys,
            message: NormalMessage::from_bytes(&proto.message)?,
        })
    }

    pub(crate) fn to_base64(&self) -> String {
        base64_encode(self.to_bytes())
    }

    pub(crate) fn from_base64(input: &str) -> Result<Self, Error> {
        Self::from_bytes(&base64_decode(input)?)
    }
}
