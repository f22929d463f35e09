//! Scripted games with exact transcripts.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{check_transcript, scripted_game, seeded_game};
use hot_potato::{assert_no_violations, PeerId, TurnState};

#[test]
fn elimination_resets_token_for_next_holder() {
    // The worked three-peer example (t=10) with M raised to 20 so the draws fit.
    // peer 0: 10 -> 6, peer 1: 6 -> -1 and out, peer 2 restarts from 10.
    let run = scripted_game(10, 20, &[&[4, 19], &[7], &[3]]);
    assert_eq!(
        run.rendered(),
        vec![
            "Peer 0 holds token 6",
            "Peer 1 holds token -1 (peer 1 drops out)",
            "Peer 2 holds token 7",
            "Peer 0 holds token -12 (peer 0 drops out)",
            "Peer 2 wins",
        ]
    );

    let outcome = run.outcome();
    assert_eq!(outcome.winner, PeerId::new(2));
    assert_eq!(outcome.peers[0].final_state, TurnState::Eliminated);
    assert_eq!(outcome.peers[1].final_state, TurnState::Eliminated);
    assert_eq!(outcome.peers[2].final_state, TurnState::GameOver);
    // peer 2 adopted the reset value after peer 0 dropped out
    assert_eq!(outcome.peers[2].final_token, 10);
    assert_no_violations!(run.observer);
    check_transcript(&run);
}

#[test]
fn non_coordinator_reports_before_handing_off() {
    let run = scripted_game(10, 20, &[&[1, 0], &[2, 15], &[8]]);
    assert_eq!(
        run.rendered(),
        vec![
            "Peer 0 holds token 9",
            "Peer 1 holds token 7",
            "Peer 2 holds token -1 (peer 2 drops out)",
            "Peer 0 holds token 10",
            "Peer 1 holds token -5 (peer 1 drops out)",
            "Peer 0 wins",
        ]
    );

    let outcome = run.outcome();
    assert_eq!(outcome.winner, PeerId::COORDINATOR);
    // one status report, then the elimination notice to the coordinator
    assert_eq!(outcome.peers[1].stats.sync_sends, 2);
    assert_no_violations!(run.observer);
    check_transcript(&run);
}

#[test]
fn every_peer_learns_every_elimination_before_its_next_turn() {
    let run = scripted_game(10, 20, &[&[1, 0], &[2, 15], &[8]]);
    let outcome = run.outcome();
    let winner = &outcome.peers[0];
    assert_eq!(winner.playing.remaining(), 1);
    assert!(winner.playing.is_playing(PeerId::COORDINATOR));
    assert_eq!(winner.stats.eliminations_seen, 2);
}

#[test]
fn single_peer_wins_without_a_turn() {
    let run = seeded_game(1, 5, 3, 0, None);
    assert_eq!(run.rendered(), vec!["Peer 0 wins"]);
    let outcome = run.outcome();
    assert_eq!(outcome.total_messages(), 0);
    assert_eq!(outcome.total_turns(), 0);
    assert_eq!(outcome.peers[0].final_token, 5);
    check_transcript(&run);
}

#[test]
fn two_peers_zero_token() {
    // Peer 0 starts at 0 and drops out with any positive draw.
    let run = scripted_game(0, 5, &[&[1], &[0]]);
    assert_eq!(
        run.rendered(),
        vec!["Peer 0 holds token -1 (peer 0 drops out)", "Peer 1 wins"]
    );
    check_transcript(&run);
}

#[test]
fn zero_draws_keep_the_token() {
    let run = scripted_game(3, 5, &[&[0, 0, 4], &[0, 0]]);
    assert_eq!(
        run.rendered(),
        vec![
            "Peer 0 holds token 3",
            "Peer 1 holds token 3",
            "Peer 0 holds token 3",
            "Peer 1 holds token 3",
            "Peer 0 holds token -1 (peer 0 drops out)",
            "Peer 1 wins",
        ]
    );
    check_transcript(&run);
}

#[test]
fn max_decrement_of_one_with_one_peer_still_ends() {
    let run = seeded_game(1, 5, 1, 0, None);
    assert_eq!(run.rendered(), vec!["Peer 0 wins"]);
    assert_no_violations!(run.observer);
}

#[test]
fn scripted_draws_are_clamped_below_max_decrement() {
    // A draw of 50 with M = 5 becomes 4.
    let run = scripted_game(3, 5, &[&[50], &[0]]);
    assert_eq!(
        run.rendered(),
        vec!["Peer 0 holds token -1 (peer 0 drops out)", "Peer 1 wins"]
    );
    assert_no_violations!(run.observer);
}
