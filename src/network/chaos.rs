//! A [`Transport`] wrapper that injects delivery delays.
//!
//! [`ChaosTransport`] sleeps for a seeded random time before handing a
//! message to the inner transport. It never drops, duplicates or reorders:
//! the game assumes a reliable, ordered substrate, and the point of the
//! wrapper is to shake up thread interleavings while keeping that contract.
//!
//! # Example
//!
//! ```
//! use hot_potato::{ChannelNetwork, ChaosConfig, ChaosTransport};
//! use std::time::Duration;
//!
//! let config = ChaosConfig::builder()
//!     .max_delay(Duration::from_millis(2))
//!     .delay_probability(0.5)
//!     .seed(42)
//!     .build();
//!
//! let transports: Vec<_> = ChannelNetwork::new(3)
//!     .into_endpoints()
//!     .into_iter()
//!     .map(|endpoint| ChaosTransport::new(endpoint, config.clone()))
//!     .collect();
//! assert_eq!(transports.len(), 3);
//! ```

use std::time::Duration;

use crate::network::messages::GameMessage;
use crate::rng::{peer_seed, Pcg32, Rng, SeedableRng};
use crate::{PeerId, PotatoError, Transport};

/// Configuration for delay injection.
///
/// Use [`ChaosConfig::builder()`] for a fluent configuration API. The
/// default injects nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct ChaosConfig {
    /// Upper bound of the delay added before a send (default: 0ms).
    pub max_delay: Duration,
    /// Probability that a given send is delayed at all (0.0 - 1.0, default: 1.0).
    pub delay_probability: f64,
    /// Whether synchronous sends are delayed too (default: true).
    pub delay_sync_sends: bool,
    /// Random seed. Each endpoint mixes in its own id. `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::ZERO,
            delay_probability: 1.0,
            delay_sync_sends: true,
            seed: None,
        }
    }
}

impl ChaosConfig {
    /// Creates a new builder for fluent configuration.
    #[must_use]
    pub fn builder() -> ChaosConfigBuilder {
        ChaosConfigBuilder::new()
    }

    /// Creates a config that adds no delay.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Creates a config that delays every send by up to `ms` milliseconds.
    #[must_use]
    pub fn jittery(ms: u64) -> Self {
        Self {
            max_delay: Duration::from_millis(ms),
            ..Default::default()
        }
    }

    /// Returns `true` if this config can never delay anything.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.max_delay.is_zero() || self.delay_probability <= 0.0
    }
}

/// Builder for [`ChaosConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChaosConfigBuilder {
    config: ChaosConfig,
}

impl ChaosConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum delay before a send.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Sets the maximum delay in milliseconds (convenience method).
    #[must_use]
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.config.max_delay = Duration::from_millis(ms);
        self
    }

    /// Sets the probability that a send is delayed.
    #[must_use]
    pub fn delay_probability(mut self, probability: f64) -> Self {
        self.config.delay_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Sets whether synchronous sends are delayed.
    #[must_use]
    pub fn delay_sync_sends(mut self, enabled: bool) -> Self {
        self.config.delay_sync_sends = enabled;
        self
    }

    /// Sets the random seed for reproducible delays.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ChaosConfig {
        self.config
    }
}

/// Statistics about injected delays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChaosStats {
    /// Sends passed through, delayed or not.
    pub sends: u64,
    /// Sends that were delayed.
    pub delayed_sends: u64,
    /// Sum of all injected delays.
    pub total_delay: Duration,
}

/// Wraps a transport and delays its sends according to a [`ChaosConfig`].
#[derive(Debug)]
pub struct ChaosTransport<T: Transport> {
    inner: T,
    config: ChaosConfig,
    rng: Pcg32,
    stats: ChaosStats,
}

impl<T: Transport> ChaosTransport<T> {
    /// Creates a new chaos transport wrapping `inner`.
    pub fn new(inner: T, config: ChaosConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => Pcg32::seed_from_u64(peer_seed(seed, inner.local_id())),
            None => Pcg32::from_entropy(),
        };
        Self {
            inner,
            config,
            rng,
            stats: ChaosStats::default(),
        }
    }

    /// Returns statistics about injected delays.
    pub fn stats(&self) -> ChaosStats {
        self.stats
    }

    /// Picks the delay for the next send. Zero means no delay.
    fn next_delay(&mut self) -> Duration {
        if self.config.is_passthrough() {
            return Duration::ZERO;
        }
        let roll = f64::from(self.rng.next_u32()) / f64::from(u32::MAX);
        if roll >= self.config.delay_probability {
            return Duration::ZERO;
        }
        let max_micros = u32::try_from(self.config.max_delay.as_micros()).unwrap_or(u32::MAX);
        let micros = self.rng.gen_range(0..max_micros.saturating_add(1).max(1));
        Duration::from_micros(u64::from(micros))
    }

    fn pause(&mut self) {
        self.stats.sends += 1;
        let delay = self.next_delay();
        if !delay.is_zero() {
            self.stats.delayed_sends += 1;
            self.stats.total_delay += delay;
            std::thread::sleep(delay);
        }
    }
}

impl<T: Transport> Transport for ChaosTransport<T> {
    fn local_id(&self) -> PeerId {
        self.inner.local_id()
    }

    fn num_peers(&self) -> usize {
        self.inner.num_peers()
    }

    fn send(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
        self.pause();
        self.inner.send(to, msg)
    }

    fn send_sync(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
        if self.config.delay_sync_sends {
            self.pause();
        } else {
            self.stats.sends += 1;
        }
        self.inner.send_sync(to, msg)
    }

    fn recv(&mut self) -> Result<GameMessage, PotatoError> {
        self.inner.recv()
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
    use crate::network::channel::{ChannelNetwork, ChannelTransport};
    use crate::network::messages::Flag;

    fn endpoints(config: &ChaosConfig) -> Vec<ChaosTransport<ChannelTransport>> {
        ChannelNetwork::new(2)
            .into_endpoints()
            .into_iter()
            .map(|endpoint| ChaosTransport::new(endpoint, config.clone()))
            .collect()
    }

    #[test]
    fn builder_sets_fields() {
        let config = ChaosConfig::builder()
            .max_delay_ms(3)
            .delay_probability(2.0)
            .delay_sync_sends(false)
            .seed(9)
            .build();
        assert_eq!(config.max_delay, Duration::from_millis(3));
        assert!((config.delay_probability - 1.0).abs() < f64::EPSILON);
        assert!(!config.delay_sync_sends);
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn passthrough_never_delays() {
        assert!(ChaosConfig::passthrough().is_passthrough());
        assert!(!ChaosConfig::jittery(1).is_passthrough());

        let mut eps = endpoints(&ChaosConfig::passthrough());
        let mut b = eps.pop().unwrap();
        let mut a = eps.pop().unwrap();
        let msg = GameMessage::new(PeerId::new(0), 1, PeerId::new(1), Flag::Continue);
        a.send(PeerId::new(1), &msg).unwrap();
        assert_eq!(b.recv().unwrap(), msg);
        assert_eq!(a.stats().sends, 1);
        assert_eq!(a.stats().delayed_sends, 0);
    }

    #[test]
    fn delays_stay_within_bound_and_keep_order() {
        let config = ChaosConfig::builder().max_delay_ms(1).seed(7).build();
        let mut eps = endpoints(&config);
        let mut b = eps.pop().unwrap();
        let mut a = eps.pop().unwrap();

        for token in 0..20 {
            let msg = GameMessage::new(PeerId::new(0), token, PeerId::new(1), Flag::Continue);
            a.send(PeerId::new(1), &msg).unwrap();
        }
        for token in 0..20 {
            assert_eq!(b.recv().unwrap().token, token);
        }

        let stats = a.stats();
        assert_eq!(stats.sends, 20);
        assert!(stats.total_delay <= Duration::from_millis(20));
    }

    #[test]
    fn seeded_delays_are_reproducible() {
        let config = ChaosConfig::builder().max_delay_ms(5).seed(11).build();
        let mut first = ChaosTransport::new(
            ChannelNetwork::new(1).into_endpoints().pop().unwrap(),
            config.clone(),
        );
        let mut second = ChaosTransport::new(
            ChannelNetwork::new(1).into_endpoints().pop().unwrap(),
            config,
        );
        for _ in 0..10 {
            assert_eq!(first.next_delay(), second.next_delay());
        }
    }
}
