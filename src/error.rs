//! Error types returned by the game API.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::network::codec::CodecError;
use crate::PeerId;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), PotatoError>`].
///
/// [`Result<(), PotatoError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PotatoError {
    /// The game configuration was rejected before any peer started.
    InvalidConfig {
        /// Further specifies why the configuration was invalid.
        kind: InvalidConfigKind,
    },
    /// A peer id outside `0..num_peers` was used.
    InvalidPeer {
        /// The offending peer id.
        peer: PeerId,
        /// The number of peers in the game.
        num_peers: usize,
    },
    /// The messaging substrate failed. The game cannot continue.
    Transport {
        /// The peer whose send or receive failed.
        peer: PeerId,
        /// A description of the failure.
        context: String,
    },
    /// A message could not be encoded or decoded.
    Codec(CodecError),
    /// An internal error occurred that should not happen under normal operation.
    /// If you encounter this error, please report it as a bug.
    Internal {
        /// A description of the internal error.
        context: String,
    },
}

/// Structured reasons for [`PotatoError::InvalidConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum InvalidConfigKind {
    /// A game needs at least one peer.
    ZeroPeers,
    /// Peer ids travel as `i32` on the wire, which bounds the ring size.
    TooManyPeers {
        /// The requested number of peers.
        num_peers: usize,
        /// The largest supported number of peers.
        max: usize,
    },
    /// The initial token must be non-negative.
    NegativeInitialToken {
        /// The rejected value.
        value: i64,
    },
    /// The initial token does not fit the wire record.
    InitialTokenOutOfRange {
        /// The rejected value.
        value: i64,
    },
    /// The decrement bound must be at least 1.
    NonPositiveMaxDecrement {
        /// The rejected value.
        value: i64,
    },
    /// The decrement bound does not fit the wire record.
    MaxDecrementOutOfRange {
        /// The rejected value.
        value: i64,
    },
}

impl Display for InvalidConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroPeers => write!(f, "the game needs at least one peer"),
            Self::TooManyPeers { num_peers, max } => {
                write!(f, "{} peers requested, at most {} supported", num_peers, max)
            }
            Self::NegativeInitialToken { value } => {
                write!(f, "initial token must be non-negative, got {}", value)
            }
            Self::InitialTokenOutOfRange { value } => {
                write!(
                    f,
                    "initial token {} is larger than the maximum {}",
                    value,
                    i32::MAX
                )
            }
            Self::NonPositiveMaxDecrement { value } => {
                write!(f, "maximum decrement must be positive, got {}", value)
            }
            Self::MaxDecrementOutOfRange { value } => {
                write!(
                    f,
                    "maximum decrement {} is larger than the maximum {}",
                    value,
                    i32::MAX
                )
            }
        }
    }
}

impl From<InvalidConfigKind> for PotatoError {
    fn from(kind: InvalidConfigKind) -> Self {
        Self::InvalidConfig { kind }
    }
}

impl From<CodecError> for PotatoError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

impl Display for PotatoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PotatoError::InvalidConfig { kind } => {
                write!(f, "Invalid configuration: {}", kind)
            }
            PotatoError::InvalidPeer { peer, num_peers } => {
                write!(
                    f,
                    "Invalid peer {}: must be less than {}",
                    peer, num_peers
                )
            }
            PotatoError::Transport { peer, context } => {
                write!(f, "Transport error at peer {}: {}", peer, context)
            }
            PotatoError::Codec(err) => write!(f, "Codec error: {}", err),
            PotatoError::Internal { context } => {
                write!(f, "Internal error (please report as bug): {}", context)
            }
        }
    }
}

impl Error for PotatoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PotatoError::Codec(err) => Some(err),
            _ => None,
        }
    }
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
    use crate::network::codec::CodecOperation;

    #[test]
    fn config_kind_converts_into_error() {
        let err: PotatoError = InvalidConfigKind::ZeroPeers.into();
        assert_eq!(
            err,
            PotatoError::InvalidConfig {
                kind: InvalidConfigKind::ZeroPeers
            }
        );
    }

    #[test]
    fn display_mentions_rejected_values() {
        let err: PotatoError = InvalidConfigKind::NegativeInitialToken { value: -3 }.into();
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("-3"));

        let err: PotatoError = InvalidConfigKind::NonPositiveMaxDecrement { value: 0 }.into();
        assert!(err.to_string().contains("must be positive"));

        let err = PotatoError::InvalidPeer {
            peer: PeerId::new(7),
            num_peers: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn codec_error_is_the_source() {
        let err: PotatoError = CodecError::decode("bad flag", CodecOperation::DecodeMessage).into();
        assert!(err.source().is_some());
        assert!(err.to_string().contains("bad flag"));

        let err = PotatoError::Internal {
            context: "boom".to_owned(),
        };
        assert!(err.source().is_none());
        assert!(err.to_string().contains("report as bug"));
    }

    #[test]
    fn transport_display_names_peer() {
        let err = PotatoError::Transport {
            peer: PeerId::new(2),
            context: "mailbox closed".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "Transport error at peer 2: mailbox closed"
        );
    }
}
