//! Fuzz target for GameBuilder configuration.
//!
//! Arbitrary peer counts, tokens and bounds must either be rejected with an
//! error or produce a configuration within the documented ranges. Games are
//! not started.

#![no_main]

use arbitrary::Arbitrary;
use hot_potato::{ChaosConfig, GameBuilder, PotatoError};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzConfig {
    num_peers: usize,
    initial_token: i64,
    max_decrement: i64,
    seed: Option<u64>,
    chaos_delay_ms: Option<u16>,
}

fn build(input: &FuzzConfig) -> Result<GameBuilder, PotatoError> {
    let mut builder = GameBuilder::new()
        .with_num_peers(input.num_peers)?
        .with_initial_token(input.initial_token)?
        .with_max_decrement(input.max_decrement)?;
    if let Some(seed) = input.seed {
        builder = builder.with_seed(seed);
    }
    if let Some(ms) = input.chaos_delay_ms {
        builder = builder.with_chaos(ChaosConfig::jittery(u64::from(ms)));
    }
    Ok(builder)
}

fuzz_target!(|input: FuzzConfig| {
    match build(&input) {
        Ok(builder) => {
            let config = builder.config();
            assert!(config.num_peers >= 1);
            assert!(config.initial_token >= 0);
            assert!(config.max_decrement >= 1);
            let _ = format!("{:?}", builder);
        }
        Err(err) => {
            assert!(matches!(err, PotatoError::InvalidConfig { .. }));
            let _ = err.to_string();
        }
    }
});
