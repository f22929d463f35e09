//! Games over transports that delay every send.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{check_transcript, seeded_game};
use hot_potato::{assert_no_violations, ChaosConfig};

#[test]
fn delays_do_not_change_the_transcript() {
    for seed in 0..4 {
        let calm = seeded_game(5, 15, 8, seed, None);
        let jittery = seeded_game(5, 15, 8, seed, Some(ChaosConfig::jittery(1)));
        assert_eq!(
            calm.sink.lines(),
            jittery.sink.lines(),
            "seed {} diverged under delays",
            seed
        );
        assert_eq!(calm.outcome().winner, jittery.outcome().winner);
        check_transcript(&jittery);
        assert_no_violations!(jittery.observer);
    }
}

#[test]
fn partial_delays_with_fast_sync_sends() {
    let chaos = ChaosConfig::builder()
        .max_delay_ms(2)
        .delay_probability(0.3)
        .delay_sync_sends(false)
        .seed(17)
        .build();
    let run = seeded_game(4, 12, 6, 3, Some(chaos));
    check_transcript(&run);
    assert_no_violations!(run.observer);
}

#[test]
fn passthrough_chaos_matches_plain_game() {
    let plain = seeded_game(3, 10, 5, 8, None);
    let wrapped = seeded_game(3, 10, 5, 8, Some(ChaosConfig::passthrough()));
    assert_eq!(plain.sink.lines(), wrapped.sink.lines());
    assert_eq!(
        plain.outcome().total_messages(),
        wrapped.outcome().total_messages()
    );
}
