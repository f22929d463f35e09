//! Binary codec for wire records.
//!
//! Every message crosses the transport as a [`WireRecord`]: four `i32`s
//! encoded with bincode's fixed-width integer encoding, so each record is
//! exactly [`WireRecord::ENCODED_LEN`] bytes. The bincode configuration lives
//! here and nowhere else.
//!
//! # Examples
//!
//! ```
//! use hot_potato::network::codec::{decode_message, encode_message};
//! use hot_potato::{Flag, GameMessage, PeerId, WireRecord};
//!
//! let msg = GameMessage::new(PeerId::new(1), 6, PeerId::new(2), Flag::Continue);
//! let bytes = encode_message(&msg)?;
//! assert_eq!(bytes.len(), WireRecord::ENCODED_LEN);
//! assert_eq!(decode_message(&bytes)?, msg);
//! # Ok::<(), hot_potato::network::codec::CodecError>(())
//! ```

use std::fmt;

use crate::network::messages::{GameMessage, WireRecord};

// Fixed-size integers keep every record the same length.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Represents what operation was being performed when a codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding a game message.
    EncodeMessage,
    /// Decoding a game message.
    DecodeMessage,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeMessage => write!(f, "encoding game message"),
            Self::DecodeMessage => write!(f, "decoding game message"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// Messages are kept as `String` because bincode's errors only expose a
/// human-readable `Display`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The provided buffer was too small for encoding.
    BufferTooSmall {
        /// The required buffer size (0 if unknown).
        required: usize,
        /// The actual buffer size provided.
        provided: usize,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            }
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            }
            Self::BufferTooSmall { required, provided } => {
                if *required > 0 {
                    write!(
                        f,
                        "buffer too small: needed {required} bytes, but only {provided} provided"
                    )
                } else {
                    write!(f, "buffer too small: only {provided} bytes provided")
                }
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a message as its fixed-size wire record.
pub fn encode_message(msg: &GameMessage) -> CodecResult<[u8; WireRecord::ENCODED_LEN]> {
    encode_record(&WireRecord::from(msg))
}

fn encode_record(record: &WireRecord) -> CodecResult<[u8; WireRecord::ENCODED_LEN]> {
    let mut buffer = [0u8; WireRecord::ENCODED_LEN];
    let written =
        bincode::serde::encode_into_slice(record, &mut buffer, config()).map_err(|e| match e {
            bincode::error::EncodeError::UnexpectedEnd => CodecError::BufferTooSmall {
                required: WireRecord::ENCODED_LEN,
                provided: WireRecord::ENCODED_LEN,
            },
            other => CodecError::encode(other.to_string(), CodecOperation::EncodeMessage),
        })?;
    if written != WireRecord::ENCODED_LEN {
        return Err(CodecError::encode(
            format!(
                "wire record encoded to {} bytes, expected {}",
                written,
                WireRecord::ENCODED_LEN
            ),
            CodecOperation::EncodeMessage,
        ));
    }
    Ok(buffer)
}

/// Decodes exactly one wire record and validates it into a message.
///
/// # Errors
///
/// Fails on short input, trailing bytes, unknown flag codes and negative peer ids.
pub fn decode_message(bytes: &[u8]) -> CodecResult<GameMessage> {
    if bytes.len() != WireRecord::ENCODED_LEN {
        return Err(CodecError::decode(
            format!(
                "expected {} bytes, got {}",
                WireRecord::ENCODED_LEN,
                bytes.len()
            ),
            CodecOperation::DecodeMessage,
        ));
    }
    let (record, _): (WireRecord, _) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::DecodeMessage))?;
    GameMessage::try_from(record)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::messages::Flag;
    use crate::PeerId;

    fn sample() -> GameMessage {
        GameMessage::new(PeerId::new(3), -2, PeerId::new(0), Flag::ContinueSilent)
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = sample();
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_wire_layout_is_four_little_endian_i32s() {
        let bytes = encode_message(&sample()).unwrap();
        assert_eq!(&bytes[0..4], &3i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-2i32).to_le_bytes());
        assert_eq!(&bytes[8..12], &0i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &(-1i32).to_le_bytes());
    }

    #[test]
    fn test_record_encoding_matches_message_encoding() {
        let msg = sample();
        let record = encode_record(&WireRecord::from(msg)).unwrap();
        assert_eq!(record, encode_message(&msg).unwrap());
    }

    #[test]
    fn test_decode_rejects_short_input() {
        let bytes = encode_message(&sample()).unwrap();
        let err = decode_message(&bytes[..10]).unwrap_err();
        assert!(matches!(err, CodecError::DecodeError { .. }));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode_message(&sample()).unwrap().to_vec();
        bytes.push(0);
        assert!(decode_message(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_flag() {
        let record = WireRecord {
            sender: 1,
            token: 1,
            next: 2,
            flag: 9,
        };
        let bytes = encode_record(&record).unwrap();
        let err = decode_message(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown flag code 9"));
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        let err = decode_message(&[]).unwrap_err();
        assert!(err.to_string().contains("expected 16 bytes, got 0"));
    }

    #[test]
    fn test_decode_rejects_negative_peer_id() {
        let record = WireRecord {
            sender: -4,
            token: 1,
            next: 2,
            flag: Flag::CONTINUE,
        };
        let bytes = encode_record(&record).unwrap();
        assert!(decode_message(&bytes).is_err());
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::encode("test error", CodecOperation::EncodeMessage);
        assert!(err.to_string().contains("encoding failed"));
        assert!(err.to_string().contains("game message"));

        let err = CodecError::BufferTooSmall {
            required: 16,
            provided: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("16"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let bytes1 = encode_message(&sample()).unwrap();
        let bytes2 = encode_message(&sample()).unwrap();
        assert_eq!(bytes1, bytes2);
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Arbitrary bytes never panic the decoder.
        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..40)) {
            let _ = decode_message(&bytes);
        }

        /// Any record with a known flag and non-negative ids decodes to the same values.
        #[test]
        fn prop_valid_records_decode(
            sender in 0i32..=i32::MAX,
            token in any::<i32>(),
            next in 0i32..=i32::MAX,
            flag in prop_oneof![Just(-1i32), Just(0), Just(1), Just(2)],
        ) {
            let record = WireRecord { sender, token, next, flag };
            let bytes = encode_record(&record).unwrap();
            let msg = decode_message(&bytes).unwrap();
            prop_assert_eq!(WireRecord::from(msg), record);
        }
    }
}
