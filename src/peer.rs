//! One participant in the game and its turn state machine.
//!
//! A [`Peer`] alternates between waiting for a message and holding the
//! token. Everything it knows about the rest of the game comes from messages;
//! in particular its [`PlayingSet`] is a private replica that is only updated
//! by elimination notices.
//!
//! Two ordering rules keep the coordinator's output causal:
//!
//! - A holder that reports to the coordinator does so with a synchronous send
//!   *before* handing the token on, so the report is consumed before the next
//!   holder can produce its own.
//! - An eliminated holder delivers its elimination notice synchronously to
//!   every peer that could still be involved *before* the silent handoff, so
//!   whoever receives the token already knows who left.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::game::GameConfig;
use crate::network::messages::{Flag, GameMessage};
use crate::playing_set::PlayingSet;
use crate::report::{StatusLine, StatusSink};
use crate::report_violation_to;
use crate::rng::DecrementSource;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{PeerId, PotatoError, Token, Transport};

/// Where a peer is in its turn cycle.
///
/// Peer 0 starts in `Holding`, everybody else in `Waiting`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnState {
    /// Blocked on the transport until the next message arrives.
    Waiting,
    /// Owns the token and takes a turn next.
    Holding,
    /// Dropped out of the game. Terminal.
    ///
    /// The coordinator keeps routing after dropping out and only reaches
    /// this state once the game is over.
    Eliminated,
    /// Won the game. Terminal.
    GameOver,
}

impl TurnState {
    /// Returns `true` for states that end [`Peer::run`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Eliminated | Self::GameOver)
    }
}

/// Message counters kept by each peer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerStats {
    /// Turns taken, counting only turns that drew a decrement.
    pub turns_taken: u64,
    /// Messages sent, synchronous or not.
    pub messages_sent: u64,
    /// Of those, synchronous sends.
    pub sync_sends: u64,
    /// Messages received.
    pub messages_received: u64,
    /// Elimination notices that changed the local [`PlayingSet`].
    pub eliminations_seen: u64,
}

/// A peer's final state after [`Peer::run`] returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummary {
    /// The peer.
    pub peer: PeerId,
    /// `GameOver` for the winner, `Eliminated` for everybody else.
    pub final_state: TurnState,
    /// The last token value this peer held.
    pub final_token: Token,
    /// This peer's replica of the playing set at the end of its run.
    pub playing: PlayingSet,
    /// Message counters.
    pub stats: PeerStats,
}

/// Selects the next holder: the first playing peer after `holder` in ring order.
///
/// Returns `holder` itself when no other peer is playing.
///
/// ```
/// use hot_potato::{next_player, PeerId, PlayingSet};
///
/// let mut playing = PlayingSet::new(4);
/// playing.eliminate(PeerId::new(0));
/// assert_eq!(next_player(PeerId::new(3), &playing), PeerId::new(1));
/// ```
#[must_use]
pub fn next_player(holder: PeerId, playing: &PlayingSet) -> PeerId {
    playing.next_after(holder)
}

/// The peers an elimination notice from `sender` goes to: every peer still
/// playing according to `playing`, plus the coordinator, minus `sender`.
#[must_use]
pub fn broadcast_recipients(sender: PeerId, playing: &PlayingSet) -> Vec<PeerId> {
    (0..playing.num_peers())
        .map(PeerId::new)
        .filter(|&peer| peer != sender && (peer.is_coordinator() || playing.is_playing(peer)))
        .collect()
}

/// One participant in the game.
///
/// `T` is the messaging substrate and `D` the source of decrements. A peer
/// is driven either to completion with [`run`](Self::run) or one event at a
/// time with [`step`](Self::step).
pub struct Peer<T: Transport, D: DecrementSource> {
    id: PeerId,
    config: GameConfig,
    transport: T,
    draws: D,
    playing: PlayingSet,
    token: Token,
    state: TurnState,
    stats: PeerStats,
    status_sink: Option<Arc<dyn StatusSink>>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<T: Transport, D: DecrementSource> Peer<T, D> {
    /// Creates the peer that owns `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`PotatoError::InvalidPeer`] if the transport's id or size does
    /// not fit `config`.
    pub fn new(transport: T, draws: D, config: GameConfig) -> Result<Self, PotatoError> {
        let id = transport.local_id();
        if transport.num_peers() != config.num_peers || !id.is_valid_for(config.num_peers) {
            return Err(PotatoError::InvalidPeer {
                peer: id,
                num_peers: config.num_peers,
            });
        }
        let state = if id.is_coordinator() {
            TurnState::Holding
        } else {
            TurnState::Waiting
        };
        Ok(Self {
            id,
            playing: PlayingSet::new(config.num_peers),
            token: config.initial_token,
            config,
            transport,
            draws,
            state,
            stats: PeerStats::default(),
            status_sink: None,
            violation_observer: None,
        })
    }

    /// Sets where status lines go. Only used by the coordinator.
    #[must_use]
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    /// Sets the observer for protocol violations. Defaults to logging via `tracing`.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// This peer's id.
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// The current turn state.
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The last token value this peer held.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// This peer's replica of the playing set.
    #[must_use]
    pub fn playing(&self) -> &PlayingSet {
        &self.playing
    }

    /// Message counters so far.
    #[must_use]
    pub fn stats(&self) -> PeerStats {
        self.stats
    }

    /// Plays until this peer reaches a terminal state.
    ///
    /// Consumes the peer. Dropping its transport afterwards tells the
    /// remaining peers this one is gone.
    pub fn run(mut self) -> Result<PeerSummary, PotatoError> {
        let span = tracing::debug_span!("peer", id = self.id.as_usize());
        let _enter = span.enter();
        tracing::debug!(state = ?self.state, token = self.token, "peer started");

        while !self.state.is_terminal() {
            self.step()?;
        }

        tracing::debug!(state = ?self.state, stats = ?self.stats, "peer finished");
        Ok(self.summary())
    }

    /// Handles exactly one event: a turn if holding, one message if waiting.
    ///
    /// Returns the state afterwards. Terminal states are left unchanged.
    pub fn step(&mut self) -> Result<TurnState, PotatoError> {
        match self.state {
            TurnState::Holding => self.take_turn()?,
            TurnState::Waiting => self.receive()?,
            TurnState::Eliminated | TurnState::GameOver => {}
        }
        Ok(self.state)
    }

    /// The summary [`run`](Self::run) would return right now.
    #[must_use]
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            peer: self.id,
            final_state: self.state,
            final_token: self.token,
            playing: self.playing.clone(),
            stats: self.stats,
        }
    }

    fn take_turn(&mut self) -> Result<(), PotatoError> {
        let next = next_player(self.id, &self.playing);

        if next == self.id {
            tracing::info!(peer = self.id.as_usize(), "last peer standing");
            self.state = TurnState::GameOver;
            if self.id.is_coordinator() {
                self.emit(StatusLine::Wins { peer: self.id });
            } else {
                let notice = GameMessage::new(self.id, self.token, self.id, Flag::GameOver);
                self.send(PeerId::COORDINATOR, &notice)?;
            }
            return Ok(());
        }

        self.stats.turns_taken += 1;
        let draw = self.draws.draw(self.config.max_decrement);
        self.token = self.token.saturating_sub(draw);
        tracing::debug!(draw, token = self.token, next = next.as_usize(), "took turn");

        if self.token < 0 {
            tracing::info!(
                peer = self.id.as_usize(),
                token = self.token,
                "token went negative, dropping out"
            );
            self.playing.eliminate(self.id);
            if self.id.is_coordinator() {
                self.emit(StatusLine::DropsOut {
                    peer: self.id,
                    token: self.token,
                });
            }
            let notice = GameMessage::new(self.id, self.token, next, Flag::Eliminated);
            self.broadcast_elimination(&notice)?;
            let handoff = GameMessage::new(self.id, self.token, next, Flag::ContinueSilent);
            self.send(next, &handoff)?;
            self.state = if self.id.is_coordinator() {
                TurnState::Waiting
            } else {
                TurnState::Eliminated
            };
        } else {
            let handoff = GameMessage::new(self.id, self.token, next, Flag::Continue);
            if self.id.is_coordinator() {
                self.emit(StatusLine::Holds {
                    peer: self.id,
                    token: self.token,
                });
            } else if !next.is_coordinator() {
                self.send_sync(PeerId::COORDINATOR, &handoff)?;
            }
            self.send(next, &handoff)?;
            self.state = TurnState::Waiting;
        }
        Ok(())
    }

    /// Delivers an elimination notice to every recipient, one synchronous
    /// send at a time. Returns the number of recipients.
    fn broadcast_elimination(&mut self, notice: &GameMessage) -> Result<usize, PotatoError> {
        let recipients = broadcast_recipients(notice.sender, &self.playing);
        for &to in &recipients {
            self.send_sync(to, notice)?;
        }
        Ok(recipients.len())
    }

    fn receive(&mut self) -> Result<(), PotatoError> {
        let msg = self.transport.recv()?;
        self.stats.messages_received += 1;
        tracing::trace!(?msg, "received");

        if !msg.sender.is_valid_for(self.config.num_peers) {
            report_violation_to!(
                self.violation_observer,
                peer = self.id,
                context = [("sender", msg.sender), ("token", msg.token)],
                ViolationSeverity::Error,
                ViolationKind::Transport,
                "message from unknown sender {} ignored ({} peers)",
                msg.sender,
                self.config.num_peers
            );
            return Ok(());
        }

        match msg.flag {
            Flag::Eliminated => {
                if self.playing.eliminate(msg.sender) {
                    self.stats.eliminations_seen += 1;
                }
                if self.id.is_coordinator() {
                    self.emit(StatusLine::DropsOut {
                        peer: msg.sender,
                        token: msg.token,
                    });
                }
            }
            Flag::GameOver => {
                if self.id.is_coordinator() {
                    self.emit(StatusLine::Wins { peer: msg.sender });
                    if self.playing.is_playing(self.id) {
                        report_violation_to!(
                            self.violation_observer,
                            peer = self.id,
                            context = [("sender", msg.sender)],
                            ViolationSeverity::Critical,
                            ViolationKind::Invariant,
                            "peer {} claims the win while the coordinator is still playing",
                            msg.sender
                        );
                    }
                    self.state = TurnState::Eliminated;
                } else {
                    report_violation_to!(
                        self.violation_observer,
                        peer = self.id,
                        context = [("sender", msg.sender), ("token", msg.token)],
                        ViolationSeverity::Warning,
                        ViolationKind::Protocol,
                        "game-over notice from peer {} reached a non-coordinator",
                        msg.sender
                    );
                    self.state = TurnState::Eliminated;
                }
            }
            Flag::Continue | Flag::ContinueSilent => {
                if self.id.is_coordinator() && msg.flag == Flag::Continue {
                    self.emit(StatusLine::Holds {
                        peer: msg.sender,
                        token: msg.token,
                    });
                }
                if msg.next == self.id {
                    self.adopt(msg);
                } else if !self.id.is_coordinator() {
                    report_violation_to!(
                        self.violation_observer,
                        peer = self.id,
                        context = [("sender", msg.sender), ("next", msg.next)],
                        ViolationSeverity::Warning,
                        ViolationKind::Protocol,
                        "handoff from peer {} addressed to peer {} ignored",
                        msg.sender,
                        msg.next
                    );
                }
            }
        }
        Ok(())
    }

    /// Takes the token from a handoff. A negative token is replaced by the
    /// initial value; after an elimination that is expected, otherwise it is
    /// reported.
    fn adopt(&mut self, msg: GameMessage) {
        self.token = if msg.token < 0 {
            if msg.flag == Flag::Continue {
                report_violation_to!(
                    self.violation_observer,
                    peer = self.id,
                    context = [("sender", msg.sender), ("token", msg.token)],
                    ViolationSeverity::Warning,
                    ViolationKind::Protocol,
                    "handoff from peer {} carried negative token {}",
                    msg.sender,
                    msg.token
                );
            }
            self.config.initial_token
        } else {
            msg.token
        };
        self.state = TurnState::Holding;
    }

    fn emit(&self, line: StatusLine) {
        if !self.id.is_coordinator() {
            return;
        }
        tracing::debug!(%line, "status");
        if let Some(sink) = &self.status_sink {
            sink.emit(&line);
        }
    }

    fn send(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
        self.transport.send(to, msg)?;
        self.stats.messages_sent += 1;
        Ok(())
    }

    fn send_sync(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
        self.transport.send_sync(to, msg)?;
        self.stats.messages_sent += 1;
        self.stats.sync_sends += 1;
        Ok(())
    }
}

impl<T: Transport, D: DecrementSource> std::fmt::Debug for Peer<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are considered when new fields are added.
        let Self {
            id,
            config,
            transport: _,
            draws: _,
            playing,
            token,
            state,
            stats,
            status_sink,
            violation_observer,
        } = self;

        f.debug_struct("Peer")
            .field("id", id)
            .field("config", config)
            .field("playing", playing)
            .field("token", token)
            .field("state", state)
            .field("stats", stats)
            .field("has_status_sink", &status_sink.is_some())
            .field("has_violation_observer", &violation_observer.is_some())
            .finish_non_exhaustive()
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
    use crate::report::CollectingSink;
    use crate::rng::ScriptedDraws;
    use crate::telemetry::CollectingObserver;
    use std::collections::VecDeque;

    /// A transport that records outgoing messages and replays a fixed inbox.
    #[derive(Debug)]
    struct ScriptedTransport {
        id: PeerId,
        num_peers: usize,
        inbox: VecDeque<GameMessage>,
        sent: Vec<(PeerId, GameMessage, bool)>,
    }

    impl ScriptedTransport {
        fn new(id: usize, num_peers: usize, inbox: impl IntoIterator<Item = GameMessage>) -> Self {
            Self {
                id: PeerId::new(id),
                num_peers,
                inbox: inbox.into_iter().collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn local_id(&self) -> PeerId {
            self.id
        }

        fn num_peers(&self) -> usize {
            self.num_peers
        }

        fn send(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
            self.sent.push((to, *msg, false));
            Ok(())
        }

        fn send_sync(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
            self.sent.push((to, *msg, true));
            Ok(())
        }

        fn recv(&mut self) -> Result<GameMessage, PotatoError> {
            self.inbox.pop_front().ok_or(PotatoError::Transport {
                peer: self.id,
                context: "script exhausted".to_owned(),
            })
        }
    }

    fn p(id: usize) -> PeerId {
        PeerId::new(id)
    }

    fn config(num_peers: usize) -> GameConfig {
        GameConfig {
            num_peers,
            initial_token: 10,
            max_decrement: 8,
        }
    }

    fn peer(
        transport: ScriptedTransport,
        draws: impl IntoIterator<Item = Token>,
    ) -> (
        Peer<ScriptedTransport, ScriptedDraws>,
        Arc<CollectingSink>,
        Arc<CollectingObserver>,
    ) {
        let n = transport.num_peers;
        let sink = Arc::new(CollectingSink::new());
        let observer = Arc::new(CollectingObserver::new());
        let peer = Peer::new(transport, ScriptedDraws::new(draws), config(n))
            .unwrap()
            .with_status_sink(sink.clone())
            .with_violation_observer(observer.clone());
        (peer, sink, observer)
    }

    fn msg(sender: usize, token: Token, next: usize, flag: Flag) -> GameMessage {
        GameMessage::new(p(sender), token, p(next), flag)
    }

    #[test]
    fn initial_states() {
        let (coordinator, _, _) = peer(ScriptedTransport::new(0, 3, []), []);
        let (other, _, _) = peer(ScriptedTransport::new(2, 3, []), []);
        assert_eq!(coordinator.state(), TurnState::Holding);
        assert_eq!(other.state(), TurnState::Waiting);
        assert_eq!(coordinator.token(), 10);
        assert_eq!(other.playing().remaining(), 3);
    }

    #[test]
    fn mismatched_transport_is_rejected() {
        let err = Peer::new(ScriptedTransport::new(0, 2, []), ScriptedDraws::new([]), config(3))
            .unwrap_err();
        assert!(matches!(err, PotatoError::InvalidPeer { .. }));
    }

    #[test]
    fn broadcast_recipients_include_coordinator_and_playing_only() {
        let mut playing = PlayingSet::new(5);
        playing.eliminate(p(0));
        playing.eliminate(p(2));
        playing.eliminate(p(3));
        assert_eq!(broadcast_recipients(p(3), &playing), vec![p(0), p(1), p(4)]);
        assert_eq!(broadcast_recipients(p(0), &playing), vec![p(1), p(4)]);
    }

    #[test]
    fn coordinator_turn_reports_and_hands_off() {
        let (mut peer, sink, observer) = peer(ScriptedTransport::new(0, 3, []), [4]);
        assert_eq!(peer.step().unwrap(), TurnState::Waiting);

        assert_eq!(sink.rendered(), vec!["Peer 0 holds token 6"]);
        assert_eq!(
            peer.transport.sent,
            vec![(p(1), msg(0, 6, 1, Flag::Continue), false)]
        );
        assert_eq!(peer.stats().turns_taken, 1);
        assert!(observer.is_empty());
    }

    #[test]
    fn non_coordinator_reports_synchronously_before_handoff() {
        let inbox = [msg(0, 6, 1, Flag::Continue)];
        let (mut peer, sink, _) = peer(ScriptedTransport::new(1, 3, inbox), [2]);
        assert_eq!(peer.step().unwrap(), TurnState::Holding);
        assert_eq!(peer.token(), 6);
        assert_eq!(peer.step().unwrap(), TurnState::Waiting);

        assert!(sink.is_empty());
        assert_eq!(
            peer.transport.sent,
            vec![
                (p(0), msg(1, 4, 2, Flag::Continue), true),
                (p(2), msg(1, 4, 2, Flag::Continue), false),
            ]
        );
        assert_eq!(peer.stats().sync_sends, 1);
        assert_eq!(peer.stats().messages_sent, 2);
    }

    #[test]
    fn handoff_to_coordinator_skips_separate_report() {
        let inbox = [msg(1, 5, 2, Flag::Continue)];
        let (mut peer, _, _) = peer(ScriptedTransport::new(2, 3, inbox), [1]);
        peer.step().unwrap();
        peer.step().unwrap();
        assert_eq!(
            peer.transport.sent,
            vec![(p(0), msg(2, 4, 0, Flag::Continue), false)]
        );
    }

    #[test]
    fn elimination_broadcasts_then_hands_off_silently() {
        let inbox = [msg(0, 6, 1, Flag::Continue)];
        let (mut peer, _, observer) = peer(ScriptedTransport::new(1, 3, inbox), [7]);
        peer.step().unwrap();
        assert_eq!(peer.step().unwrap(), TurnState::Eliminated);

        assert_eq!(
            peer.transport.sent,
            vec![
                (p(0), msg(1, -1, 2, Flag::Eliminated), true),
                (p(2), msg(1, -1, 2, Flag::Eliminated), true),
                (p(2), msg(1, -1, 2, Flag::ContinueSilent), false),
            ]
        );
        assert!(!peer.playing().is_playing(p(1)));
        assert!(observer.is_empty());
    }

    #[test]
    fn coordinator_elimination_reports_itself_and_keeps_waiting() {
        let (mut peer, sink, _) = peer(ScriptedTransport::new(0, 3, []), [7]);
        peer.token = 3;
        assert_eq!(peer.step().unwrap(), TurnState::Waiting);

        assert_eq!(sink.rendered(), vec!["Peer 0 holds token -4 (peer 0 drops out)"]);
        assert_eq!(
            peer.transport.sent,
            vec![
                (p(1), msg(0, -4, 1, Flag::Eliminated), true),
                (p(2), msg(0, -4, 1, Flag::Eliminated), true),
                (p(1), msg(0, -4, 1, Flag::ContinueSilent), false),
            ]
        );
    }

    #[test]
    fn silent_handoff_resets_negative_token_without_violation() {
        let inbox = [
            msg(1, -1, 2, Flag::Eliminated),
            msg(1, -1, 2, Flag::ContinueSilent),
        ];
        let (mut peer, _, observer) = peer(ScriptedTransport::new(2, 3, inbox), []);
        peer.step().unwrap();
        assert!(!peer.playing().is_playing(p(1)));
        assert_eq!(peer.step().unwrap(), TurnState::Holding);
        assert_eq!(peer.token(), 10);
        assert_eq!(peer.stats().eliminations_seen, 1);
        assert!(observer.is_empty());
    }

    #[test]
    fn negative_token_on_ordinary_handoff_is_reported_and_reset() {
        let inbox = [msg(0, -3, 1, Flag::Continue)];
        let (mut peer, _, observer) = peer(ScriptedTransport::new(1, 2, inbox), []);
        peer.step().unwrap();
        assert_eq!(peer.token(), 10);
        assert!(observer.has_violation(ViolationKind::Protocol));
    }

    #[test]
    fn coordinator_prints_continue_but_not_silent() {
        let inbox = [
            msg(1, 4, 2, Flag::Continue),
            msg(2, -2, 3, Flag::Eliminated),
            msg(2, -2, 3, Flag::ContinueSilent),
        ];
        let (mut peer, sink, observer) = peer(ScriptedTransport::new(0, 4, inbox), []);
        peer.state = TurnState::Waiting;
        for _ in 0..3 {
            assert_eq!(peer.step().unwrap(), TurnState::Waiting);
        }
        assert_eq!(
            sink.rendered(),
            vec!["Peer 1 holds token 4", "Peer 2 holds token -2 (peer 2 drops out)"]
        );
        assert!(observer.is_empty(), "reports for others are expected");
    }

    #[test]
    fn misaddressed_handoff_is_reported() {
        let inbox = [msg(0, 4, 2, Flag::Continue)];
        let (mut peer, _, observer) = peer(ScriptedTransport::new(1, 3, inbox), []);
        assert_eq!(peer.step().unwrap(), TurnState::Waiting);
        let reports = observer.violations_of_kind(ViolationKind::Protocol);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].context.get("sender"), Some(&"0".to_owned()));
        assert_eq!(reports[0].context.get("next"), Some(&"2".to_owned()));
    }

    #[test]
    fn unknown_sender_is_ignored() {
        let inbox = [msg(9, 4, 1, Flag::Continue)];
        let (mut peer, _, observer) = peer(ScriptedTransport::new(1, 3, inbox), []);
        assert_eq!(peer.step().unwrap(), TurnState::Waiting);
        assert!(observer.has_violation(ViolationKind::Transport));
        assert_eq!(peer.token(), 10);
    }

    #[test]
    fn game_over_at_non_coordinator_is_reported() {
        let inbox = [msg(2, 3, 2, Flag::GameOver)];
        let (mut peer, _, observer) = peer(ScriptedTransport::new(1, 3, inbox), []);
        let state = peer.step().unwrap();
        assert_eq!(state, TurnState::Eliminated);
        assert!(state.is_terminal());
        assert!(observer.has_violation(ViolationKind::Protocol));
    }

    #[test]
    fn non_coordinator_winner_notifies_coordinator() {
        let inbox = [
            msg(0, -1, 1, Flag::Eliminated),
            msg(0, -1, 1, Flag::ContinueSilent),
        ];
        let (peer, _, _) = peer(ScriptedTransport::new(1, 2, inbox), []);
        let summary = peer.run().unwrap();
        assert_eq!(summary.final_state, TurnState::GameOver);
        assert_eq!(summary.final_token, 10);
        assert_eq!(summary.stats.messages_sent, 1);
        assert_eq!(summary.stats.turns_taken, 0);
    }

    #[test]
    fn eliminated_coordinator_ends_on_game_over() {
        let inbox = [msg(1, 4, 1, Flag::GameOver)];
        let (mut peer, sink, observer) = peer(ScriptedTransport::new(0, 2, inbox), []);
        peer.playing.eliminate(p(0));
        peer.state = TurnState::Waiting;
        assert_eq!(peer.step().unwrap(), TurnState::Eliminated);
        assert_eq!(sink.rendered(), vec!["Peer 1 wins"]);
        assert!(observer.is_empty());
    }

    #[test]
    fn single_peer_wins_without_messages() {
        let (peer, sink, _) = peer(ScriptedTransport::new(0, 1, []), []);
        let summary = peer.run().unwrap();
        assert_eq!(summary.final_state, TurnState::GameOver);
        assert_eq!(summary.stats, PeerStats::default());
        assert_eq!(sink.rendered(), vec!["Peer 0 wins"]);
    }

    #[test]
    fn terminal_step_is_a_no_op() {
        let (mut peer, _, _) = peer(ScriptedTransport::new(0, 1, []), []);
        assert_eq!(peer.step().unwrap(), TurnState::GameOver);
        assert_eq!(peer.step().unwrap(), TurnState::GameOver);
        assert!(format!("{:?}", peer).contains("GameOver"));
    }

    #[test]
    fn transport_failure_propagates() {
        let (mut peer, _, _) = peer(ScriptedTransport::new(1, 2, []), []);
        assert!(matches!(peer.step(), Err(PotatoError::Transport { .. })));
    }
}
