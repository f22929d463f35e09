//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `scripted_game`: runs a game where every peer replays fixed draws
//! - `seeded_game`: runs a game from a base seed, optionally with chaos
//! - `check_transcript`: asserts the invariants every finished game satisfies

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::collections::BTreeSet;
use std::sync::Arc;

use hot_potato::report::CollectingSink;
use hot_potato::rng::ScriptedDraws;
use hot_potato::telemetry::CollectingObserver;
use hot_potato::{
    ChaosConfig, GameBuilder, GameOutcome, PeerId, PotatoError, StatusLine, Token, TurnState,
};

/// Everything a finished game left behind.
pub struct GameRun {
    pub result: Result<GameOutcome, PotatoError>,
    pub sink: Arc<CollectingSink>,
    pub observer: Arc<CollectingObserver>,
}

impl GameRun {
    pub fn outcome(&self) -> &GameOutcome {
        self.result.as_ref().expect("game should finish")
    }

    pub fn rendered(&self) -> Vec<String> {
        self.sink.rendered()
    }
}

fn run(builder: GameBuilder) -> GameRun {
    let sink = Arc::new(CollectingSink::new());
    let observer = Arc::new(CollectingObserver::new());
    let result = builder
        .with_status_sink(sink.clone())
        .with_violation_observer(observer.clone())
        .start_game();
    GameRun {
        result,
        sink,
        observer,
    }
}

/// Runs a game where peer `i` replays `scripts[i]`.
pub fn scripted_game(
    initial_token: i64,
    max_decrement: i64,
    scripts: &[&[Token]],
) -> GameRun {
    let mut builder = GameBuilder::new()
        .with_num_peers(scripts.len())
        .unwrap()
        .with_initial_token(initial_token)
        .unwrap()
        .with_max_decrement(max_decrement)
        .unwrap()
        .with_seed(0);
    for (id, script) in scripts.iter().enumerate() {
        builder = builder.with_decrement_source(PeerId::new(id), ScriptedDraws::new(script.iter().copied()));
    }
    run(builder)
}

/// Runs a seeded game, with delays when `chaos` is given.
pub fn seeded_game(
    num_peers: usize,
    initial_token: i64,
    max_decrement: i64,
    seed: u64,
    chaos: Option<ChaosConfig>,
) -> GameRun {
    let mut builder = GameBuilder::new()
        .with_num_peers(num_peers)
        .unwrap()
        .with_initial_token(initial_token)
        .unwrap()
        .with_max_decrement(max_decrement)
        .unwrap()
        .with_seed(seed);
    if let Some(chaos) = chaos {
        builder = builder.with_chaos(chaos);
    }
    run(builder)
}

/// Asserts the invariants every finished game satisfies:
///
/// - exactly one peer ends in `GameOver`, every other one in `Eliminated`
/// - the transcript ends with the only victory line, naming the winner
/// - every other peer drops out exactly once, the winner never does
/// - every drawn turn produces exactly one line
/// - the token only grows through the reset after an elimination
pub fn check_transcript(run: &GameRun) {
    let outcome = run.outcome();
    let lines = run.sink.lines();
    let n = outcome.config.num_peers;

    assert_eq!(outcome.peers.len(), n);
    for summary in &outcome.peers {
        let expected = if summary.peer == outcome.winner {
            TurnState::GameOver
        } else {
            TurnState::Eliminated
        };
        assert_eq!(summary.final_state, expected, "peer {}", summary.peer);
    }

    let (last, rest) = lines.split_last().expect("transcript is never empty");
    assert_eq!(*last, StatusLine::Wins { peer: outcome.winner });
    assert!(rest.iter().all(|line| !matches!(line, StatusLine::Wins { .. })));

    let dropped: Vec<PeerId> = rest
        .iter()
        .filter(|line| matches!(line, StatusLine::DropsOut { .. }))
        .map(StatusLine::peer)
        .collect();
    let unique: BTreeSet<PeerId> = dropped.iter().copied().collect();
    assert_eq!(dropped.len(), n - 1, "one drop-out per loser");
    assert_eq!(unique.len(), n - 1, "nobody drops out twice");
    assert!(!unique.contains(&outcome.winner));

    assert_eq!(lines.len() as u64, outcome.total_turns() + 1);

    let mut ceiling = outcome.config.initial_token;
    for line in rest {
        match *line {
            StatusLine::Holds { token, .. } => {
                assert!(token >= 0);
                assert!(token <= ceiling, "token rose from {} to {}", ceiling, token);
                ceiling = token;
            }
            StatusLine::DropsOut { token, .. } => {
                assert!(token < 0);
                assert!(token <= ceiling);
                ceiling = outcome.config.initial_token;
            }
            StatusLine::Wins { .. } => unreachable!(),
        }
    }
}
