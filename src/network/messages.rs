//! Messages exchanged between peers.
//!
//! [`GameMessage`] is what the protocol works with. [`WireRecord`] is the
//! fixed four-integer record that actually crosses the transport, so every
//! message costs the same number of bytes regardless of its content.

use serde::{Deserialize, Serialize};

use crate::network::codec::{CodecError, CodecOperation};
use crate::{PeerId, Token};

/// What a [`GameMessage`] means to its recipient.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// An ordinary handoff or status report. The coordinator prints it.
    Continue,
    /// A handoff the coordinator must not print, sent right after the sender dropped out.
    ContinueSilent,
    /// The sender dropped out of the game.
    Eliminated,
    /// The sender is the last peer standing.
    GameOver,
}

impl Flag {
    /// Wire code for [`Flag::Continue`].
    pub const CONTINUE: i32 = 0;
    /// Wire code for [`Flag::Eliminated`].
    pub const IS_OUT: i32 = 1;
    /// Wire code for [`Flag::GameOver`].
    pub const END_GAME: i32 = 2;
    /// Wire code for [`Flag::ContinueSilent`].
    pub const CONTINUE_SILENT: i32 = -1;

    /// Returns the integer code this flag travels as.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Continue => Self::CONTINUE,
            Self::ContinueSilent => Self::CONTINUE_SILENT,
            Self::Eliminated => Self::IS_OUT,
            Self::GameOver => Self::END_GAME,
        }
    }

    /// Parses a wire code, returning `None` for anything unknown.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            Self::CONTINUE => Some(Self::Continue),
            Self::CONTINUE_SILENT => Some(Self::ContinueSilent),
            Self::IS_OUT => Some(Self::Eliminated),
            Self::END_GAME => Some(Self::GameOver),
            _ => None,
        }
    }
}

/// A protocol message.
///
/// `token` and `next` are meaningful for handoffs. For [`Flag::Eliminated`]
/// they carry the sender's final token and the peer it handed off to, which
/// the coordinator prints. For [`Flag::GameOver`] they are informational.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameMessage {
    /// The peer that sent this message.
    pub sender: PeerId,
    /// The token value at the time of sending.
    pub token: Token,
    /// The peer the token is handed to.
    pub next: PeerId,
    /// What this message means.
    pub flag: Flag,
}

impl GameMessage {
    /// Creates a new message.
    #[must_use]
    pub const fn new(sender: PeerId, token: Token, next: PeerId, flag: Flag) -> Self {
        Self {
            sender,
            token,
            next,
            flag,
        }
    }
}

/// The on-the-wire form of a [`GameMessage`]: four signed 32 bit integers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WireRecord {
    /// Sender id.
    pub sender: i32,
    /// Token value.
    pub token: i32,
    /// Next holder id.
    pub next: i32,
    /// Flag code, see the constants on [`Flag`].
    pub flag: i32,
}

impl WireRecord {
    /// Encoded size of a record in bytes.
    pub const ENCODED_LEN: usize = 4 * std::mem::size_of::<i32>();
}

impl From<&GameMessage> for WireRecord {
    fn from(msg: &GameMessage) -> Self {
        Self {
            sender: msg.sender.as_usize() as i32,
            token: msg.token,
            next: msg.next.as_usize() as i32,
            flag: msg.flag.code(),
        }
    }
}

impl From<GameMessage> for WireRecord {
    fn from(msg: GameMessage) -> Self {
        Self::from(&msg)
    }
}

impl TryFrom<WireRecord> for GameMessage {
    type Error = CodecError;

    fn try_from(record: WireRecord) -> Result<Self, Self::Error> {
        let flag = Flag::from_code(record.flag).ok_or_else(|| {
            CodecError::decode(
                format!("unknown flag code {}", record.flag),
                CodecOperation::DecodeMessage,
            )
        })?;
        let sender = peer_from_wire(record.sender, "sender")?;
        let next = peer_from_wire(record.next, "next")?;
        Ok(Self {
            sender,
            token: record.token,
            next,
            flag,
        })
    }
}

fn peer_from_wire(raw: i32, field: &str) -> Result<PeerId, CodecError> {
    usize::try_from(raw).map(PeerId::new).map_err(|_| {
        CodecError::decode(
            format!("negative {} id {}", field, raw),
            CodecOperation::DecodeMessage,
        )
    })
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

    #[test]
    fn flag_codes_match_wire_constants() {
        assert_eq!(Flag::Continue.code(), 0);
        assert_eq!(Flag::Eliminated.code(), 1);
        assert_eq!(Flag::GameOver.code(), 2);
        assert_eq!(Flag::ContinueSilent.code(), -1);
    }

    #[test]
    fn flag_from_code_inverts_code() {
        for flag in [
            Flag::Continue,
            Flag::ContinueSilent,
            Flag::Eliminated,
            Flag::GameOver,
        ] {
            assert_eq!(Flag::from_code(flag.code()), Some(flag));
        }
        assert_eq!(Flag::from_code(3), None);
        assert_eq!(Flag::from_code(-2), None);
    }

    #[test]
    fn wire_record_keeps_negative_tokens() {
        let msg = GameMessage::new(PeerId::new(1), -4, PeerId::new(2), Flag::Eliminated);
        let record = WireRecord::from(msg);
        assert_eq!(
            record,
            WireRecord {
                sender: 1,
                token: -4,
                next: 2,
                flag: 1
            }
        );
        assert_eq!(GameMessage::try_from(record).unwrap(), msg);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let record = WireRecord {
            sender: 0,
            token: 5,
            next: 1,
            flag: 42,
        };
        let err = GameMessage::try_from(record).unwrap_err();
        assert!(err.to_string().contains("unknown flag code 42"));
    }

    #[test]
    fn negative_ids_are_rejected() {
        let record = WireRecord {
            sender: -1,
            token: 5,
            next: 1,
            flag: 0,
        };
        assert!(GameMessage::try_from(record)
            .unwrap_err()
            .to_string()
            .contains("negative sender id"));

        let record = WireRecord {
            sender: 1,
            token: 5,
            next: -7,
            flag: 0,
        };
        assert!(GameMessage::try_from(record)
            .unwrap_err()
            .to_string()
            .contains("negative next id"));
    }
}
