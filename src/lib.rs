//! # Hot Potato
//!
//! A hot potato elimination game played by independent peers that share no
//! memory and talk only through point-to-point messages.
//!
//! Peer 0 starts with a numeric token. Whoever holds the token subtracts a
//! random amount in `[0, M)` from it and passes it to the next peer still in
//! the game. A peer whose token goes negative drops out. The last peer standing
//! wins. Peer 0 doubles as the coordinator: every status-relevant event is
//! forwarded to it, and it alone reports game status.
//!
//! The interesting part is the protocol: every peer keeps its own replica of
//! the "still playing" set, and the replicas are kept consistent using only
//! acknowledged sends (see [`Transport::send_sync`]). No peer ever reads
//! another peer's state.
//!
//! # Quick Start
//!
//! ```
//! use hot_potato::{report::CollectingSink, GameBuilder};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(CollectingSink::new());
//! let outcome = GameBuilder::new()
//!     .with_num_peers(4)?
//!     .with_initial_token(20)?
//!     .with_max_decrement(8)?
//!     .with_seed(7)
//!     .with_status_sink(sink.clone())
//!     .start_game()?;
//!
//! assert_eq!(sink.lines().last().map(|line| line.peer()), Some(outcome.winner));
//! # Ok::<(), hot_potato::PotatoError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use error::{InvalidConfigKind, PotatoError};
pub use game::{GameBuilder, GameConfig, GameOutcome};
pub use network::chaos::{ChaosConfig, ChaosConfigBuilder, ChaosTransport};
pub use network::channel::{AbortHandle, ChannelNetwork, ChannelTransport};
pub use network::messages::{Flag, GameMessage, WireRecord};
pub use peer::{next_player, Peer, PeerStats, PeerSummary, TurnState};
pub use playing_set::PlayingSet;
pub use report::{StatusLine, StatusSink};

pub mod error;
/// The launcher that wires peers to a transport and runs a complete game.
pub mod game;
pub mod peer;
pub mod playing_set;
pub mod report;
/// Internal random number generator module based on PCG32.
///
/// Provides the per-peer decrement draws. See the module documentation for
/// usage details.
pub mod rng;
pub mod telemetry;
/// Message types, wire codec and transports.
pub mod network {
    pub mod chaos;
    pub mod channel;
    /// Binary codec for the fixed four-integer wire record.
    pub mod codec;
    pub mod messages;
}

/// The value carried by the hot potato.
///
/// Signed and 32 bits wide to match the wire record. It only ever decreases
/// while held, and going below zero eliminates the holder.
pub type Token = i32;

/// Identifies one peer in the ring.
///
/// Peer ids are dense: a game of `n` peers uses ids `0..n`. Id 0 is always
/// the [`COORDINATOR`](Self::COORDINATOR).
///
/// # Examples
///
/// ```
/// use hot_potato::PeerId;
///
/// let peer = PeerId::new(2);
/// assert_eq!(peer.as_usize(), 2);
/// assert!(peer.is_valid_for(3));
/// assert!(!peer.is_coordinator());
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PeerId(usize);

impl PeerId {
    /// The peer that aggregates and reports game status.
    pub const COORDINATOR: Self = Self(0);

    /// Creates a new `PeerId` from a `usize` value.
    ///
    /// Note: This does not validate the id against a specific game.
    /// Use [`is_valid_for()`](Self::is_valid_for) to check validity.
    #[inline]
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the underlying `usize` value.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns `true` if this id names a peer in a game of `num_peers` peers.
    #[inline]
    #[must_use]
    pub const fn is_valid_for(self, num_peers: usize) -> bool {
        self.0 < num_peers
    }

    /// Returns `true` if this is the coordinator.
    #[inline]
    #[must_use]
    pub const fn is_coordinator(self) -> bool {
        self.0 == Self::COORDINATOR.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for PeerId {
    #[inline]
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<PeerId> for usize {
    #[inline]
    fn from(peer: PeerId) -> Self {
        peer.0
    }
}

/// The point-to-point messaging substrate a [`Peer`] plays through.
///
/// Implementations must deliver messages between any two peers in the order
/// they were sent, exactly once per send. Beyond that the protocol relies on
/// a single extra guarantee: [`send_sync`](Self::send_sync) does not return
/// until the recipient has taken the message out of its inbox.
///
/// There are no timeouts. A recipient that never receives again blocks a
/// synchronous sender forever; a recipient that is gone entirely should make
/// sends fail with [`PotatoError::Transport`].
pub trait Transport: Send {
    /// The id of the peer that owns this endpoint.
    fn local_id(&self) -> PeerId;

    /// The number of peers reachable through this transport.
    fn num_peers(&self) -> usize;

    /// Queues `msg` for `to` and returns without waiting for it to be received.
    fn send(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError>;

    /// Delivers `msg` to `to` and returns only after `to` has received it.
    fn send_sync(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError>;

    /// Blocks until a message from any peer arrives.
    fn recv(&mut self) -> Result<GameMessage, PotatoError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn local_id(&self) -> PeerId {
        (**self).local_id()
    }

    fn num_peers(&self) -> usize {
        (**self).num_peers()
    }

    fn send(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
        (**self).send(to, msg)
    }

    fn send_sync(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
        (**self).send_sync(to, msg)
    }

    fn recv(&mut self) -> Result<GameMessage, PotatoError> {
        (**self).recv()
    }
}

// ###################
// # UNIT TESTS      #
// ###################

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
    fn peer_id_coordinator_is_zero() {
        assert_eq!(PeerId::COORDINATOR, PeerId::new(0));
        assert!(PeerId::COORDINATOR.is_coordinator());
        assert!(!PeerId::new(1).is_coordinator());
    }

    #[test]
    fn peer_id_validity() {
        assert!(PeerId::new(0).is_valid_for(1));
        assert!(!PeerId::new(1).is_valid_for(1));
        assert!(!PeerId::new(0).is_valid_for(0));
    }

    #[test]
    fn peer_id_conversions() {
        let peer: PeerId = 5usize.into();
        assert_eq!(peer.as_usize(), 5);
        let raw: usize = peer.into();
        assert_eq!(raw, 5);
        assert_eq!(peer.to_string(), "5");
    }

    #[test]
    fn peer_id_ordering() {
        assert!(PeerId::new(1) < PeerId::new(2));
        assert_eq!(PeerId::default(), PeerId::COORDINATOR);
    }

    #[test]
    fn boxed_transport_forwards() {
        let mut endpoints = ChannelNetwork::new(2).into_endpoints();
        let second = endpoints.pop().unwrap();
        let first = endpoints.pop().unwrap();
        let mut first: Box<dyn Transport> = Box::new(first);
        let mut second: Box<dyn Transport> = Box::new(second);

        assert_eq!(first.local_id(), PeerId::new(0));
        assert_eq!(first.num_peers(), 2);

        let msg = GameMessage::new(PeerId::new(0), 9, PeerId::new(1), Flag::Continue);
        first.send(PeerId::new(1), &msg).unwrap();
        assert_eq!(second.recv().unwrap(), msg);
    }
}
