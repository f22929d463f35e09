//! Runs one hot potato game and prints the coordinator's status lines.
//!
//! ```text
//! hot-potato -t 100 -M 20 -n 5 --seed 7
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use hot_potato::report::ConsoleSink;
use hot_potato::{ChaosConfig, GameBuilder, GameOutcome, PotatoError};
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Status lines only
    Text,
    /// Status lines, then a JSON summary of the outcome
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "hot-potato", version, about)]
struct Opt {
    /// Token the coordinator starts with (non-negative)
    #[arg(short = 't', long = "token", allow_negative_numbers = true)]
    token: i64,
    /// Exclusive upper bound of each decrement (positive)
    #[arg(short = 'M', long = "max-decrement", allow_negative_numbers = true)]
    max_decrement: i64,
    /// Number of peers
    #[arg(short = 'n', long = "peers", default_value_t = 4)]
    peers: usize,
    /// Base seed for the per-peer generators
    #[arg(long)]
    seed: Option<u64>,
    /// Delay every send by up to this many milliseconds
    #[arg(long)]
    chaos_delay_ms: Option<u64>,
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Raise the log level (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn builder(opt: &Opt) -> Result<GameBuilder, PotatoError> {
    let mut builder = GameBuilder::new()
        .with_num_peers(opt.peers)?
        .with_initial_token(opt.token)?
        .with_max_decrement(opt.max_decrement)?
        .with_status_sink(Arc::new(ConsoleSink));
    if let Some(seed) = opt.seed {
        builder = builder.with_seed(seed);
    }
    if let Some(ms) = opt.chaos_delay_ms {
        builder = builder.with_chaos(ChaosConfig::jittery(ms));
    }
    Ok(builder)
}

fn print_summary(outcome: &GameOutcome) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

fn main() -> ExitCode {
    let opt = Opt::parse();

    // logs go to stderr so stdout carries only the game
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(log_level(opt.verbose))
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting up tracing subscriber failed: {}", err);
    }

    let outcome = match builder(&opt).and_then(GameBuilder::start_game) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(error = %err, "game aborted");
            eprintln!("hot-potato: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if opt.format == Format::Json {
        if let Err(err) = print_summary(&outcome) {
            eprintln!("hot-potato: failed to serialize outcome: {}", err);
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
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
    use hot_potato::InvalidConfigKind;

    #[test]
    fn parses_required_flags() {
        let opt = Opt::try_parse_from(["hot-potato", "-t", "10", "-M", "8"]).unwrap();
        assert_eq!(opt.token, 10);
        assert_eq!(opt.max_decrement, 8);
        assert_eq!(opt.peers, 4);
        assert_eq!(opt.format, Format::Text);
        assert_eq!(opt.seed, None);
    }

    #[test]
    fn missing_required_flag_is_a_usage_error() {
        assert!(Opt::try_parse_from(["hot-potato", "-t", "10"]).is_err());
        assert!(Opt::try_parse_from(["hot-potato", "-M", "10"]).is_err());
    }

    #[test]
    fn parses_extended_flags() {
        let opt = Opt::try_parse_from([
            "hot-potato",
            "--token",
            "50",
            "--max-decrement",
            "9",
            "-n",
            "6",
            "--seed",
            "3",
            "--chaos-delay-ms",
            "2",
            "--format",
            "json",
            "-vv",
        ])
        .unwrap();
        assert_eq!(opt.peers, 6);
        assert_eq!(opt.seed, Some(3));
        assert_eq!(opt.chaos_delay_ms, Some(2));
        assert_eq!(opt.format, Format::Json);
        assert_eq!(log_level(opt.verbose), Level::DEBUG);
    }

    #[test]
    fn negative_token_reaches_validation() {
        let opt = Opt::try_parse_from(["hot-potato", "-t", "-5", "-M", "3"]).unwrap();
        let err = builder(&opt).unwrap_err();
        assert_eq!(
            err,
            PotatoError::InvalidConfig {
                kind: InvalidConfigKind::NegativeInitialToken { value: -5 }
            }
        );
    }

    #[test]
    fn zero_max_decrement_is_rejected() {
        let opt = Opt::try_parse_from(["hot-potato", "-t", "5", "-M", "0"]).unwrap();
        assert!(builder(&opt).is_err());
    }

    #[test]
    fn builder_carries_options() {
        let opt = Opt::try_parse_from(["hot-potato", "-t", "7", "-M", "4", "-n", "3"]).unwrap();
        let config = builder(&opt).unwrap().config();
        assert_eq!(config.num_peers, 3);
        assert_eq!(config.initial_token, 7);
        assert_eq!(config.max_decrement, 4);
    }

    #[test]
    fn log_level_saturates() {
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(9), Level::TRACE);
    }
}
