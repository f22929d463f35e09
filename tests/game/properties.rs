//! Property tests over seeds and configurations.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{check_transcript, seeded_game};
use hot_potato::{PeerId, StatusLine};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every finished game has one winner, one drop-out per loser and a
    /// transcript that follows the token.
    #[test]
    fn prop_games_finish_consistently(
        num_peers in 1usize..=6,
        initial_token in 0i64..=60,
        max_decrement in 2i64..=16,
        seed in any::<u64>(),
    ) {
        let run = seeded_game(num_peers, initial_token, max_decrement, seed, None);
        prop_assert!(run.result.is_ok(), "game failed: {:?}", run.result.as_ref().err());
        check_transcript(&run);
        prop_assert!(run.observer.is_empty(), "violations: {:?}", run.observer.violations());
    }

    /// The same seed replays the same game.
    #[test]
    fn prop_seeded_games_replay(
        num_peers in 2usize..=5,
        initial_token in 0i64..=40,
        max_decrement in 2i64..=10,
        seed in any::<u64>(),
    ) {
        let first = seeded_game(num_peers, initial_token, max_decrement, seed, None);
        let second = seeded_game(num_peers, initial_token, max_decrement, seed, None);
        prop_assert_eq!(first.sink.lines(), second.sink.lines());
        prop_assert_eq!(first.outcome().winner, second.outcome().winner);
    }

    /// Each peer's final view of who is playing only contains peers that
    /// were still in the game when that peer stopped, and always contains
    /// the winner.
    #[test]
    fn prop_final_views_are_consistent(
        num_peers in 2usize..=6,
        seed in any::<u64>(),
    ) {
        let run = seeded_game(num_peers, 20, 8, seed, None);
        let outcome = run.outcome();
        let winner = &outcome.peers[outcome.winner.as_usize()];
        prop_assert_eq!(winner.playing.remaining(), 1);

        for summary in &outcome.peers {
            prop_assert!(summary.playing.is_playing(outcome.winner));
            prop_assert!(summary.playing.remaining() >= 1);
            if summary.peer != outcome.winner {
                prop_assert!(!summary.playing.is_playing(summary.peer));
            }
        }
    }

    /// The coordinator reports every peer's first turn in ring order.
    #[test]
    fn prop_first_lap_follows_the_ring(
        num_peers in 2usize..=6,
        seed in any::<u64>(),
    ) {
        // A large token and a small bound keep everyone in the first lap.
        let run = seeded_game(num_peers, 100, 3, seed, None);
        let lines = run.sink.lines();
        let first_lap: Vec<PeerId> = lines.iter().take(num_peers).map(StatusLine::peer).collect();
        let ring: Vec<PeerId> = (0..num_peers).map(PeerId::new).collect();
        prop_assert_eq!(first_lap, ring);
    }
}
