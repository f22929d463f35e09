use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use web_time::{Duration, Instant};

use crate::error::InvalidConfigKind;
use crate::network::chaos::{ChaosConfig, ChaosTransport};
use crate::network::channel::{AbortHandle, ChannelNetwork};
use crate::peer::{Peer, PeerSummary, TurnState};
use crate::report::{StatusSink, TracingSink};
use crate::report_violation_to;
use crate::rng::{entropy_seed, peer_seed, DecrementSource, Pcg32, SeedableRng};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{PeerId, PotatoError, Token, Transport};

const DEFAULT_PEERS: usize = 4;
const DEFAULT_INITIAL_TOKEN: Token = 100;
const DEFAULT_MAX_DECREMENT: Token = 20;
/// Peer ids travel as `i32`.
const MAX_PEERS: usize = i32::MAX as usize;

/// The parameters every peer agrees on before the game starts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameConfig {
    /// Number of peers, `N >= 1`.
    pub num_peers: usize,
    /// Token peer 0 starts with, and the value a negative handoff is reset to.
    pub initial_token: Token,
    /// Exclusive upper bound `M` of each decrement.
    pub max_decrement: Token,
}

impl GameConfig {
    /// Returns `false` when the game can never end: with `M == 1` every
    /// decrement is 0, so the token never goes negative.
    #[must_use]
    pub fn can_terminate(&self) -> bool {
        self.num_peers <= 1 || self.max_decrement >= 2
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            num_peers: DEFAULT_PEERS,
            initial_token: DEFAULT_INITIAL_TOKEN,
            max_decrement: DEFAULT_MAX_DECREMENT,
        }
    }
}

/// The result of a finished game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    /// The last peer standing.
    pub winner: PeerId,
    /// The configuration the game ran with.
    pub config: GameConfig,
    /// The base seed the per-peer generators were derived from.
    pub seed: u64,
    /// One summary per peer, ordered by id.
    pub peers: Vec<PeerSummary>,
    /// Wall-clock duration of the game.
    pub elapsed: Duration,
}

impl GameOutcome {
    /// Total messages sent by all peers.
    #[must_use]
    pub fn total_messages(&self) -> u64 {
        self.peers.iter().map(|p| p.stats.messages_sent).sum()
    }

    /// Total turns that drew a decrement.
    #[must_use]
    pub fn total_turns(&self) -> u64 {
        self.peers.iter().map(|p| p.stats.turns_taken).sum()
    }

    /// Serializes the outcome to a JSON string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Serializes the outcome to a pretty-printed JSON string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json_pretty(&self) -> Option<String> {
        serde_json::to_string_pretty(self).ok()
    }
}

/// Configures and runs a game.
///
/// Peers run on their own threads, named `peer-<id>`, connected by an
/// in-process [`ChannelNetwork`]. `start_game` blocks until every peer is
/// done.
///
/// ```
/// use hot_potato::GameBuilder;
///
/// let outcome = GameBuilder::new()
///     .with_num_peers(3)?
///     .with_initial_token(10)?
///     .with_max_decrement(8)?
///     .with_seed(1)
///     .start_game()?;
/// assert!(outcome.winner.is_valid_for(3));
/// # Ok::<(), hot_potato::PotatoError>(())
/// ```
#[must_use = "GameBuilder must be consumed by calling start_game"]
pub struct GameBuilder {
    num_peers: usize,
    initial_token: Token,
    max_decrement: Token,
    seed: Option<u64>,
    chaos: Option<ChaosConfig>,
    status_sink: Option<Arc<dyn StatusSink>>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    decrement_sources: BTreeMap<PeerId, Box<dyn DecrementSource>>,
}

impl std::fmt::Debug for GameBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            num_peers,
            initial_token,
            max_decrement,
            seed,
            chaos,
            status_sink,
            violation_observer,
            decrement_sources,
        } = self;

        f.debug_struct("GameBuilder")
            .field("num_peers", num_peers)
            .field("initial_token", initial_token)
            .field("max_decrement", max_decrement)
            .field("seed", seed)
            .field("chaos", chaos)
            .field("has_status_sink", &status_sink.is_some())
            .field("has_violation_observer", &violation_observer.is_some())
            .field(
                "scripted_peers",
                &decrement_sources.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for GameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GameBuilder {
    /// Construct a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            num_peers: DEFAULT_PEERS,
            initial_token: DEFAULT_INITIAL_TOKEN,
            max_decrement: DEFAULT_MAX_DECREMENT,
            seed: None,
            chaos: None,
            status_sink: None,
            violation_observer: None,
            decrement_sources: BTreeMap::new(),
        }
    }

    /// Change the number of peers. Default is 4.
    ///
    /// # Errors
    ///
    /// Returns [`PotatoError::InvalidConfig`] if `num_peers` is 0 or does
    /// not fit a wire record.
    pub fn with_num_peers(mut self, num_peers: usize) -> Result<Self, PotatoError> {
        if num_peers == 0 {
            return Err(InvalidConfigKind::ZeroPeers.into());
        }
        if num_peers > MAX_PEERS {
            return Err(InvalidConfigKind::TooManyPeers {
                num_peers,
                max: MAX_PEERS,
            }
            .into());
        }
        self.num_peers = num_peers;
        Ok(self)
    }

    /// Change the initial token. Default is 100.
    ///
    /// # Errors
    ///
    /// Returns [`PotatoError::InvalidConfig`] if `token` is negative or
    /// larger than `i32::MAX`.
    pub fn with_initial_token(mut self, token: i64) -> Result<Self, PotatoError> {
        if token < 0 {
            return Err(InvalidConfigKind::NegativeInitialToken { value: token }.into());
        }
        self.initial_token = Token::try_from(token)
            .map_err(|_| InvalidConfigKind::InitialTokenOutOfRange { value: token })?;
        Ok(self)
    }

    /// Change the exclusive upper bound `M` of each decrement. Default is 20.
    ///
    /// `M == 1` is accepted, but then no decrement ever lowers the token and
    /// a game with more than one peer never ends.
    ///
    /// # Errors
    ///
    /// Returns [`PotatoError::InvalidConfig`] if `max_decrement` is not
    /// positive or larger than `i32::MAX`.
    pub fn with_max_decrement(mut self, max_decrement: i64) -> Result<Self, PotatoError> {
        if max_decrement <= 0 {
            return Err(InvalidConfigKind::NonPositiveMaxDecrement {
                value: max_decrement,
            }
            .into());
        }
        self.max_decrement = Token::try_from(max_decrement).map_err(|_| {
            InvalidConfigKind::MaxDecrementOutOfRange {
                value: max_decrement,
            }
        })?;
        Ok(self)
    }

    /// Fixes the base seed. Without one the seed comes from the clock.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Wraps every peer's transport in a [`ChaosTransport`].
    ///
    /// If `config` has no seed, one is derived from the game's base seed.
    pub fn with_chaos(mut self, config: ChaosConfig) -> Self {
        self.chaos = Some(config);
        self
    }

    /// Sets where the coordinator's status lines go. Default is [`TracingSink`].
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    /// Sets the observer for protocol violations. Default logs through `tracing`.
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Replaces the seeded generator of `peer` with `source`.
    ///
    /// `peer` is checked against the peer count when the game starts.
    pub fn with_decrement_source(
        mut self,
        peer: PeerId,
        source: impl DecrementSource + 'static,
    ) -> Self {
        self.decrement_sources.insert(peer, Box::new(source));
        self
    }

    /// The configuration the game will run with.
    pub fn config(&self) -> GameConfig {
        GameConfig {
            num_peers: self.num_peers,
            initial_token: self.initial_token,
            max_decrement: self.max_decrement,
        }
    }

    /// Consumes the builder, runs a game to completion and returns its outcome.
    ///
    /// # Errors
    ///
    /// - [`PotatoError::InvalidPeer`] if a decrement source was registered for
    ///   a peer outside the game. Nothing runs in that case.
    /// - [`PotatoError::Transport`] or [`PotatoError::Codec`] if a peer failed.
    /// - [`PotatoError::Internal`] if a peer thread could not be spawned or panicked.
    pub fn start_game(self) -> Result<GameOutcome, PotatoError> {
        let config = self.config();
        let Self {
            seed,
            chaos,
            status_sink,
            violation_observer,
            mut decrement_sources,
            ..
        } = self;

        if let Some(&peer) = decrement_sources
            .keys()
            .find(|peer| !peer.is_valid_for(config.num_peers))
        {
            return Err(PotatoError::InvalidPeer {
                peer,
                num_peers: config.num_peers,
            });
        }

        warn_if_endless(&config, &violation_observer);

        let seed = seed.unwrap_or_else(entropy_seed);
        let chaos = chaos.map(|mut chaos| {
            chaos.seed.get_or_insert(seed.rotate_left(32));
            chaos
        });
        let status_sink = status_sink.unwrap_or_else(|| Arc::new(TracingSink));

        let span = tracing::info_span!(
            "game",
            num_peers = config.num_peers,
            initial_token = config.initial_token,
            max_decrement = config.max_decrement,
            seed
        );
        let _enter = span.enter();
        tracing::info!("starting game");

        let network = ChannelNetwork::new(config.num_peers);
        let abort = network.abort_handle();
        let mut peers = Vec::with_capacity(config.num_peers);
        for endpoint in network.into_endpoints() {
            let id = endpoint.local_id();
            let transport: Box<dyn Transport> = match &chaos {
                Some(chaos) => Box::new(ChaosTransport::new(endpoint, chaos.clone())),
                None => Box::new(endpoint),
            };
            let draws = decrement_sources.remove(&id).unwrap_or_else(|| {
                Box::new(Pcg32::seed_from_u64(peer_seed(seed, id))) as Box<dyn DecrementSource>
            });
            let mut peer = Peer::new(transport, draws, config)?;
            if id.is_coordinator() {
                peer = peer.with_status_sink(Arc::clone(&status_sink));
            }
            if let Some(observer) = &violation_observer {
                peer = peer.with_violation_observer(Arc::clone(observer));
            }
            peers.push(peer);
        }

        let started = Instant::now();
        let mut handles = Vec::with_capacity(peers.len());
        let mut spawn_error = None;
        for peer in peers {
            let id = peer.id();
            let parent = span.clone();
            let guard = AbortOnFailure::new(abort.clone());
            let spawned = thread::Builder::new()
                .name(format!("peer-{}", id))
                .spawn(move || {
                    let _enter = parent.enter();
                    let result = peer.run();
                    if result.is_ok() {
                        guard.disarm();
                    }
                    result
                });
            match spawned {
                Ok(handle) => handles.push((id, handle)),
                Err(err) => {
                    abort.abort();
                    spawn_error = Some(PotatoError::Internal {
                        context: format!("failed to spawn thread for peer {}: {}", id, err),
                    });
                    break;
                }
            }
        }

        let results: Vec<Result<PeerSummary, PotatoError>> = handles
            .into_iter()
            .map(|(id, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(PotatoError::Internal {
                        context: format!("peer {} panicked", id),
                    })
                })
            })
            .collect();
        let elapsed = started.elapsed();

        if let Some(err) = spawn_error {
            return Err(err);
        }
        let peers = collect_summaries(results)?;
        let winner = find_winner(&peers)?;
        tracing::info!(
            winner = winner.as_usize(),
            elapsed_ms = elapsed.as_millis() as u64,
            "game over"
        );

        Ok(GameOutcome {
            winner,
            config,
            seed,
            peers,
            elapsed,
        })
    }
}

fn warn_if_endless(config: &GameConfig, observer: &Option<Arc<dyn ViolationObserver>>) {
    if !config.can_terminate() {
        report_violation_to!(
            observer,
            ViolationSeverity::Warning,
            ViolationKind::Configuration,
            "max decrement {} never lowers the token, the game with {} peers cannot end",
            config.max_decrement,
            config.num_peers
        );
    }
}

/// Aborts the network when dropped while armed, so a peer that fails or
/// panics does not leave the others blocked in `recv`.
struct AbortOnFailure {
    handle: AbortHandle,
    armed: bool,
}

impl AbortOnFailure {
    fn new(handle: AbortHandle) -> Self {
        Self {
            handle,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnFailure {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("peer failed, aborting the game");
            self.handle.abort();
        }
    }
}

/// Keeps all summaries, or picks the most telling error. A failing peer
/// usually makes others fail with transport errors, so anything that is not
/// a transport error wins.
fn collect_summaries(
    results: Vec<Result<PeerSummary, PotatoError>>,
) -> Result<Vec<PeerSummary>, PotatoError> {
    let mut summaries = Vec::with_capacity(results.len());
    let mut first_error: Option<PotatoError> = None;
    for result in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(err) => {
                let replace = match &first_error {
                    None => true,
                    Some(PotatoError::Transport { .. }) => {
                        !matches!(err, PotatoError::Transport { .. })
                    }
                    Some(_) => false,
                };
                if replace {
                    first_error = Some(err);
                }
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(summaries),
    }
}

fn find_winner(peers: &[PeerSummary]) -> Result<PeerId, PotatoError> {
    let mut winners = peers
        .iter()
        .filter(|summary| summary.final_state == TurnState::GameOver)
        .map(|summary| summary.peer);
    match (winners.next(), winners.next()) {
        (Some(winner), None) => Ok(winner),
        (None, _) => Err(PotatoError::Internal {
            context: "game ended without a winner".to_owned(),
        }),
        (Some(first), Some(second)) => Err(PotatoError::Internal {
            context: format!("peers {} and {} both claim the win", first, second),
        }),
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
    use crate::peer::PeerStats;
    use crate::playing_set::PlayingSet;
    use crate::report::CollectingSink;
    use crate::telemetry::CollectingObserver;

    fn summary(peer: usize, final_state: TurnState) -> PeerSummary {
        PeerSummary {
            peer: PeerId::new(peer),
            final_state,
            final_token: 0,
            playing: PlayingSet::new(2),
            stats: PeerStats::default(),
        }
    }

    #[test]
    fn builder_defaults() {
        let config = GameBuilder::new().config();
        assert_eq!(config, GameConfig::default());
        assert_eq!(config.num_peers, 4);
    }

    #[test]
    fn rejects_zero_peers() {
        let err = GameBuilder::new().with_num_peers(0).unwrap_err();
        assert_eq!(
            err,
            PotatoError::InvalidConfig {
                kind: InvalidConfigKind::ZeroPeers
            }
        );
    }

    #[test]
    fn rejects_negative_token() {
        let err = GameBuilder::new().with_initial_token(-1).unwrap_err();
        assert_eq!(
            err,
            PotatoError::InvalidConfig {
                kind: InvalidConfigKind::NegativeInitialToken { value: -1 }
            }
        );
    }

    #[test]
    fn rejects_oversized_values() {
        let too_big = i64::from(i32::MAX) + 1;
        assert!(matches!(
            GameBuilder::new().with_initial_token(too_big),
            Err(PotatoError::InvalidConfig {
                kind: InvalidConfigKind::InitialTokenOutOfRange { .. }
            })
        ));
        assert!(matches!(
            GameBuilder::new().with_max_decrement(too_big),
            Err(PotatoError::InvalidConfig {
                kind: InvalidConfigKind::MaxDecrementOutOfRange { .. }
            })
        ));
    }

    #[test]
    fn rejects_non_positive_max_decrement() {
        for bad in [0, -5] {
            assert!(matches!(
                GameBuilder::new().with_max_decrement(bad),
                Err(PotatoError::InvalidConfig {
                    kind: InvalidConfigKind::NonPositiveMaxDecrement { .. }
                })
            ));
        }
    }

    #[test]
    fn zero_initial_token_is_valid() {
        let builder = GameBuilder::new().with_initial_token(0).unwrap();
        assert_eq!(builder.config().initial_token, 0);
    }

    #[test]
    fn can_terminate() {
        let mut config = GameConfig::default();
        assert!(config.can_terminate());
        config.max_decrement = 1;
        assert!(!config.can_terminate());
        config.num_peers = 1;
        assert!(config.can_terminate());
    }

    #[test]
    fn endless_configuration_is_reported() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());

        warn_if_endless(&GameConfig::default(), &observer);
        assert!(collector.is_empty());

        let endless = GameConfig {
            max_decrement: 1,
            ..GameConfig::default()
        };
        warn_if_endless(&endless, &observer);
        crate::assert_violation!(collector, ViolationKind::Configuration);
        assert_eq!(
            collector.violations()[0].severity,
            ViolationSeverity::Warning
        );
    }

    #[test]
    fn scripted_peer_out_of_range_fails_before_start() {
        let sink = Arc::new(CollectingSink::new());
        let err = GameBuilder::new()
            .with_num_peers(2)
            .unwrap()
            .with_status_sink(sink.clone())
            .with_decrement_source(PeerId::new(2), crate::rng::ScriptedDraws::new([1]))
            .start_game()
            .unwrap_err();
        assert!(matches!(err, PotatoError::InvalidPeer { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn single_peer_game() {
        let sink = Arc::new(CollectingSink::new());
        let observer = Arc::new(CollectingObserver::new());
        let outcome = GameBuilder::new()
            .with_num_peers(1)
            .unwrap()
            .with_max_decrement(1)
            .unwrap()
            .with_status_sink(sink.clone())
            .with_violation_observer(observer.clone())
            .start_game()
            .unwrap();
        assert_eq!(outcome.winner, PeerId::COORDINATOR);
        assert_eq!(outcome.total_messages(), 0);
        assert_eq!(sink.rendered(), vec!["Peer 0 wins"]);
        assert!(observer.is_empty());
    }

    #[test]
    fn seeded_games_are_reproducible() {
        let run = || {
            let sink = Arc::new(CollectingSink::new());
            let outcome = GameBuilder::new()
                .with_num_peers(5)
                .unwrap()
                .with_initial_token(30)
                .unwrap()
                .with_max_decrement(12)
                .unwrap()
                .with_seed(99)
                .with_status_sink(sink.clone())
                .start_game()
                .unwrap();
            (outcome.winner, sink.lines())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn builder_debug_lists_scripted_peers() {
        let builder =
            GameBuilder::new().with_decrement_source(PeerId::new(1), crate::rng::ScriptedDraws::new([]));
        let debug = format!("{:?}", builder);
        assert!(debug.contains("scripted_peers"));
        assert!(debug.contains("has_status_sink: false"));
    }

    #[test]
    fn winner_must_be_unique() {
        let one = vec![
            summary(0, TurnState::Eliminated),
            summary(1, TurnState::GameOver),
        ];
        assert_eq!(find_winner(&one).unwrap(), PeerId::new(1));

        let none = vec![summary(0, TurnState::Eliminated)];
        assert!(matches!(find_winner(&none), Err(PotatoError::Internal { .. })));

        let two = vec![
            summary(0, TurnState::GameOver),
            summary(1, TurnState::GameOver),
        ];
        assert!(find_winner(&two)
            .unwrap_err()
            .to_string()
            .contains("both claim"));
    }

    #[test]
    fn non_transport_errors_take_precedence() {
        let transport = PotatoError::Transport {
            peer: PeerId::new(0),
            context: "gone".to_owned(),
        };
        let internal = PotatoError::Internal {
            context: "peer 1 panicked".to_owned(),
        };
        let err =
            collect_summaries(vec![Err(transport.clone()), Err(internal.clone()), Err(transport)])
                .unwrap_err();
        assert_eq!(err, internal);

        let ok = collect_summaries(vec![Ok(summary(0, TurnState::GameOver))]).unwrap();
        assert_eq!(ok.len(), 1);
    }
}
