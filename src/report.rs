//! Status lines emitted by the coordinator.
//!
//! Only the coordinator reports. It hands every [`StatusLine`] to a
//! [`StatusSink`], in the order it learns about the events.

use std::io::Write;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{PeerId, Token};

/// One line of game status.
///
/// The `Display` form is the console text:
///
/// ```
/// use hot_potato::{PeerId, StatusLine};
///
/// let line = StatusLine::DropsOut { peer: PeerId::new(1), token: -1 };
/// assert_eq!(line.to_string(), "Peer 1 holds token -1 (peer 1 drops out)");
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusLine {
    /// `peer` took a turn and still holds a non-negative `token`.
    Holds {
        /// The peer that took the turn.
        peer: PeerId,
        /// The token after the decrement.
        token: Token,
    },
    /// `peer` took a turn, the token went negative and `peer` is out.
    DropsOut {
        /// The eliminated peer.
        peer: PeerId,
        /// The negative token that eliminated it.
        token: Token,
    },
    /// `peer` is the last one standing.
    Wins {
        /// The winner.
        peer: PeerId,
    },
}

impl StatusLine {
    /// The peer this line is about.
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        match *self {
            Self::Holds { peer, .. } | Self::DropsOut { peer, .. } | Self::Wins { peer } => peer,
        }
    }

    /// The token value reported, if any.
    #[must_use]
    pub const fn token(&self) -> Option<Token> {
        match *self {
            Self::Holds { token, .. } | Self::DropsOut { token, .. } => Some(token),
            Self::Wins { .. } => None,
        }
    }
}

impl std::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Holds { peer, token } => write!(f, "Peer {} holds token {}", peer, token),
            Self::DropsOut { peer, token } => write!(
                f,
                "Peer {} holds token {} (peer {} drops out)",
                peer, token, peer
            ),
            Self::Wins { peer } => write!(f, "Peer {} wins", peer),
        }
    }
}

/// Receives the coordinator's status lines.
///
/// Sinks are shared with the coordinator's thread, so they must be `Send + Sync`.
pub trait StatusSink: Send + Sync {
    /// Called once per status event, in causal order.
    fn emit(&self, line: &StatusLine);
}

/// Writes each line to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn emit(&self, line: &StatusLine) {
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{}", line).and_then(|()| stdout.flush()) {
            tracing::warn!(error = %err, "failed to write status line to stdout");
        }
    }
}

/// Emits each line as a structured `tracing` event at INFO level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn emit(&self, line: &StatusLine) {
        let peer = line.peer().as_usize();
        match *line {
            StatusLine::Holds { token, .. } => {
                tracing::info!(peer, token, event = "holds", "{}", line);
            }
            StatusLine::DropsOut { token, .. } => {
                tracing::info!(peer, token, event = "drops_out", "{}", line);
            }
            StatusLine::Wins { .. } => {
                tracing::info!(peer, event = "wins", "{}", line);
            }
        }
    }
}

/// Keeps every line in memory.
///
/// ```
/// use hot_potato::report::{CollectingSink, StatusSink};
/// use hot_potato::{PeerId, StatusLine};
///
/// let sink = CollectingSink::new();
/// sink.emit(&StatusLine::Wins { peer: PeerId::new(0) });
/// assert_eq!(sink.rendered(), vec!["Peer 0 wins".to_owned()]);
/// ```
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<StatusLine>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
        }
    }

    /// A copy of every line received so far.
    #[must_use]
    pub fn lines(&self) -> Vec<StatusLine> {
        self.lines.lock().clone()
    }

    /// Every line received so far, rendered as console text.
    #[must_use]
    pub fn rendered(&self) -> Vec<String> {
        self.lines.lock().iter().map(ToString::to_string).collect()
    }

    /// Number of lines received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Returns `true` if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl StatusSink for CollectingSink {
    fn emit(&self, line: &StatusLine) {
        self.lines.lock().push(*line);
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

    #[test]
    fn console_text_matches_report_format() {
        let p = PeerId::new;
        assert_eq!(
            StatusLine::Holds { peer: p(0), token: 6 }.to_string(),
            "Peer 0 holds token 6"
        );
        assert_eq!(
            StatusLine::DropsOut { peer: p(2), token: -3 }.to_string(),
            "Peer 2 holds token -3 (peer 2 drops out)"
        );
        assert_eq!(StatusLine::Wins { peer: p(4) }.to_string(), "Peer 4 wins");
    }

    #[test]
    fn accessors() {
        let line = StatusLine::DropsOut {
            peer: PeerId::new(3),
            token: -1,
        };
        assert_eq!(line.peer(), PeerId::new(3));
        assert_eq!(line.token(), Some(-1));
        assert_eq!(StatusLine::Wins { peer: PeerId::new(1) }.token(), None);
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        assert!(sink.is_empty());
        sink.emit(&StatusLine::Holds {
            peer: PeerId::new(0),
            token: 3,
        });
        sink.emit(&StatusLine::Wins { peer: PeerId::new(0) });
        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.rendered(),
            vec!["Peer 0 holds token 3".to_owned(), "Peer 0 wins".to_owned()]
        );
    }

    #[test]
    fn status_line_serializes_with_event_tag() {
        let json = serde_json::to_string(&StatusLine::Holds {
            peer: PeerId::new(1),
            token: 9,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"holds","peer":1,"token":9}"#);
    }
}
