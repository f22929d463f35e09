//! Game integration tests.
//!
//! This module contains integration tests that run whole games:
//! - Scripted scenarios with exact transcripts
//! - Property tests over seeds and configurations
//! - Games over delayed transports
//! - Peers wired by hand over the channel network

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

// Game test modules
mod game {
    pub mod chaos;
    pub mod properties;
    pub mod scenarios;
    pub mod transport;
}
