use crate::Error;
use crate::types::{Curve25519PublicKey, base64_decode, base64_encode};
use prost::Message;
use std::fmt;

/// Version byte leading every encoded message.
pub(crate) const MESSAGE_VERSION: u8 = 3;

/// Discriminates the two kinds of message a session produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// First message(s) of an outbound session, carrying handshake data.
    PreKey = 0,
    /// Every other message.
    Normal = 1,
}

impl TryFrom<u32> for MessageType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::PreKey),
            1 => Ok(Self::Normal),
            other => Err(Error::BadMessageFormat(format!(
                "unknown message type {other}"
            ))),
        }
    }
}

impl From<MessageType> for u32 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::PreKey => 0,
            MessageType::Normal => 1,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreKey => f.write_str("pre-key"),
            Self::Normal => f.write_str("normal"),
        }
    }
}

/// An encrypted message as handed to the transport: its type plus the
/// base64 body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OlmMessage {
    pub message_type: MessageType,
    pub ciphertext: String,
}

impl OlmMessage {
    pub fn new(message_type: MessageType, ciphertext: impl Into<String>) -> Self {
        Self {
            message_type,
            ciphertext: ciphertext.into(),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
struct NormalMessageProto {
    #[prost(bytes = "vec", tag = "1")]
    ratchet_key: Vec<u8>,
    #[prost(uint32, tag = "2")]
    chain_index: u32,
    #[prost(bytes = "vec", tag = "3")]
    ciphertext: Vec<u8>,
}

/// A message encrypted with a ratchet chain key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct NormalMessage {
    pub(crate) ratchet_key: Curve25519PublicKey,
    pub(crate) chain_index: u32,
    pub(crate) ciphertext: Vec<u8>,
}

impl NormalMessage {
    /// Additional authenticated data binding the ciphertext to its header.
    pub(crate) fn associated_data(ratchet_key: &Curve25519PublicKey, chain_index: u32) -> [u8; 37] {
        let mut ad = [0u8; 37];
        ad[0] = MESSAGE_VERSION;
        ad[1..33].copy_from_slice(ratchet_key.as_bytes());
        ad[33..37].copy_from_slice(&chain_index.to_be_bytes());

        ad
    }

    /// Serializes the message. Format: [version][protobuf body]
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let proto = NormalMessageProto {
            ratchet_key: self.ratchet_key.to_bytes().to_vec(),
            chain_index: self.chain_index,
            ciphertext: self.ciphertext.clone(),
        };

        let mut result = Vec::with_capacity(1 + proto.encoded_len());
        result.push(MESSAGE_VERSION);
        result.extend_from_slice(&proto.encode_to_vec());

        result
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let body = check_version(bytes)?;
        let proto = NormalMessageProto::decode(body)
            .map_err(|err| Error::BadMessageFormat(format!("normal message: {err}")))?;

        if proto.ciphertext.is_empty() {
            return Err(Error::BadMessageFormat(
                "normal message has no ciphertext".to_string(),
            ));
        }

        Ok(Self {
            ratchet_key: Curve25519PublicKey::from_slice(&proto.ratchet_key).map_err(|_| {
                Error::InvalidKeyEncoding(format!(
                    "ratchet key must be 32 bytes, got {}",
                    proto.ratchet_key.len()
                ))
            })?,
            chain_index: proto.chain_index,
            ciphertext: proto.ciphertext,
        })
    }

    pub(crate) fn to_base64(&self) -> String {
        base64_encode(self.to_bytes())
    }

    pub(crate) fn from_base64(input: &str) -> Result<Self, Error> {
        Self::from_bytes(&base64_decode(input)?)
    }
}

/// Strips and checks the version byte, returning the body.
pub(crate) fn check_version(bytes: &[u8]) -> Result<&[u8], Error> {
    match bytes.split_first() {
        None => Err(Error::BadMessageFormat("empty message".to_string())),
        Some((&MESSAGE_VERSION, body)) => Ok(body),
        Some((&version, _)) => Err(Error::UnsupportedVersion(u32::from(version))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> NormalMessage {
        NormalMessage {
            ratchet_key: Curve25519PublicKey::from([7u8; 32]),
            chain_index: 42,
            ciphertext: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn test_message_serialization() {
        let original = message();
        let bytes = original.to_bytes();

        assert_eq!(bytes[0], MESSAGE_VERSION);
        assert_eq!(NormalMessage::from_bytes(&bytes).unwrap(), original);
        assert_eq!(
            NormalMessage::from_base64(&original.to_base64()).unwrap(),
            original
        );
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = message().to_bytes();
        bytes[0] = 2;

        assert_eq!(
            NormalMessage::from_bytes(&bytes),
            Err(Error::UnsupportedVersion(2))
        );
    }

    #[test]
    fn test_malformed_messages() {
        assert!(matches!(
            NormalMessage::from_bytes(&[]),
            Err(Error::BadMessageFormat(_))
        ));
        assert!(matches!(
            NormalMessage::from_bytes(&[MESSAGE_VERSION, 0xff, 0xff]),
            Err(Error::BadMessageFormat(_))
        ));

        let truncated_key = NormalMessageProto {
            ratchet_key: vec![1; 16],
            chain_index: 0,
            ciphertext: vec![1],
        };
        let mut bytes = vec![MESSAGE_VERSION];
        bytes.extend_from_slice(&truncated_key.encode_to_vec());
        assert!(matches!(
            NormalMessage::from_bytes(&bytes),
            Err(Error::InvalidKeyEncoding(_))
        ));

        assert!(matches!(
            NormalMessage::from_base64("not base64!"),
            Err(Error::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::try_from(0).unwrap(), MessageType::PreKey);
        assert_eq!(MessageType::try_from(1).unwrap(), MessageType::Normal);
        assert!(MessageType::try_from(2).is_err());
        assert_eq!(u32::from(MessageType::Normal), 1);
    }

    #[test]
    fn test_associated_data_layout() {
        let ad = NormalMessage::associated_data(&Curve25519PublicKey::from([9u8; 32]), 1);

        assert_eq!(ad[0], MESSAGE_VERSION);
        assert_eq!(&ad[1..33], &[9u8; 32]);
        assert_eq!(&ad[33..37], &[0, 0, 0, 1]);
    }
}
