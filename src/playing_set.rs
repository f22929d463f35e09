//! Each peer's replica of who is still in the game.

use serde::{Deserialize, Serialize};

use crate::PeerId;

/// One flag per peer: `true` while the peer is still playing.
///
/// Every peer owns its own `PlayingSet`. Entries only ever go from playing to
/// eliminated, so replicas that have seen the same eliminations agree, and
/// [`merge`](Self::merge) of two replicas is always safe.
///
/// # Examples
///
/// ```
/// use hot_potato::{PeerId, PlayingSet};
///
/// let mut playing = PlayingSet::new(3);
/// assert!(playing.eliminate(PeerId::new(1)));
/// assert_eq!(playing.next_after(PeerId::new(0)), PeerId::new(2));
/// assert_eq!(playing.remaining(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayingSet {
    playing: Vec<bool>,
}

impl PlayingSet {
    /// Creates a set of `num_peers` peers, all playing.
    #[must_use]
    pub fn new(num_peers: usize) -> Self {
        Self {
            playing: vec![true; num_peers],
        }
    }

    /// Number of peers in the game, playing or not.
    #[must_use]
    pub fn num_peers(&self) -> usize {
        self.playing.len()
    }

    /// Returns `true` if `peer` is in range and still playing.
    #[must_use]
    pub fn is_playing(&self, peer: PeerId) -> bool {
        self.playing.get(peer.as_usize()).copied().unwrap_or(false)
    }

    /// Marks `peer` as eliminated.
    ///
    /// Returns `true` if this changed anything. Eliminating a peer twice, or
    /// an id outside the set, is a no-op.
    pub fn eliminate(&mut self, peer: PeerId) -> bool {
        match self.playing.get_mut(peer.as_usize()) {
            Some(entry) if *entry => {
                *entry = false;
                true
            }
            _ => false,
        }
    }

    /// Number of peers still playing.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.playing.iter().filter(|&&p| p).count()
    }

    /// Iterates over the peers still playing, in id order.
    pub fn playing_peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.playing
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p)
            .map(|(id, _)| PeerId::new(id))
    }

    /// Applies every elimination known to `other`.
    ///
    /// Sets of different sizes merge over their common prefix.
    pub fn merge(&mut self, other: &Self) {
        for (mine, theirs) in self.playing.iter_mut().zip(&other.playing) {
            *mine &= *theirs;
        }
    }

    /// The first playing peer strictly after `holder`, wrapping around.
    ///
    /// Returns `holder` itself when nobody else is playing, which is how a
    /// holder learns it has won. If not even `holder` is playing the scan
    /// stops after one full lap and also returns `holder`.
    #[must_use]
    pub fn next_after(&self, holder: PeerId) -> PeerId {
        let n = self.playing.len();
        if n == 0 {
            return holder;
        }
        let start = holder.as_usize() % n;
        (1..n)
            .map(|offset| PeerId::new((start + offset) % n))
            .find(|&candidate| self.is_playing(candidate))
            .unwrap_or(holder)
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

    fn p(id: usize) -> PeerId {
        PeerId::new(id)
    }

    #[test]
    fn starts_with_everyone_playing() {
        let set = PlayingSet::new(4);
        assert_eq!(set.num_peers(), 4);
        assert_eq!(set.remaining(), 4);
        assert!((0..4).all(|id| set.is_playing(p(id))));
        assert!(!set.is_playing(p(4)));
    }

    #[test]
    fn eliminate_is_monotone() {
        let mut set = PlayingSet::new(3);
        assert!(set.eliminate(p(1)));
        assert!(!set.eliminate(p(1)));
        assert!(!set.is_playing(p(1)));
        assert_eq!(set.remaining(), 2);
        assert!(!set.eliminate(p(17)));
    }

    #[test]
    fn playing_peers_in_order() {
        let mut set = PlayingSet::new(5);
        set.eliminate(p(0));
        set.eliminate(p(3));
        let peers: Vec<_> = set.playing_peers().collect();
        assert_eq!(peers, vec![p(1), p(2), p(4)]);
    }

    #[test]
    fn merge_takes_union_of_eliminations() {
        let mut a = PlayingSet::new(4);
        let mut b = PlayingSet::new(4);
        a.eliminate(p(1));
        b.eliminate(p(2));
        a.merge(&b);
        assert_eq!(a.playing_peers().collect::<Vec<_>>(), vec![p(0), p(3)]);
    }

    #[test]
    fn next_after_skips_eliminated_and_wraps() {
        let mut set = PlayingSet::new(4);
        assert_eq!(set.next_after(p(0)), p(1));
        assert_eq!(set.next_after(p(3)), p(0));
        set.eliminate(p(0));
        set.eliminate(p(1));
        assert_eq!(set.next_after(p(3)), p(2));
        assert_eq!(set.next_after(p(2)), p(3));
    }

    #[test]
    fn next_after_returns_holder_when_alone() {
        let mut set = PlayingSet::new(3);
        set.eliminate(p(0));
        set.eliminate(p(2));
        assert_eq!(set.next_after(p(1)), p(1));
    }

    #[test]
    fn next_after_terminates_when_nobody_plays() {
        let mut set = PlayingSet::new(3);
        for id in 0..3 {
            set.eliminate(p(id));
        }
        assert_eq!(set.next_after(p(1)), p(1));
        assert_eq!(PlayingSet::new(0).next_after(p(0)), p(0));
    }

    #[test]
    fn single_peer_is_its_own_successor() {
        assert_eq!(PlayingSet::new(1).next_after(p(0)), p(0));
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_set() -> impl Strategy<Value = PlayingSet> {
        proptest::collection::vec(any::<bool>(), 1..16).prop_map(|playing| PlayingSet { playing })
    }

    proptest! {
        /// The successor is a playing peer other than the holder, or the holder when it is the only one left.
        #[test]
        fn prop_next_after_is_playing_or_self(set in arb_set(), holder in 0usize..16) {
            let holder = PeerId::new(holder % set.num_peers());
            let next = set.next_after(holder);
            let others = set.playing_peers().filter(|&peer| peer != holder).count();
            if others == 0 {
                prop_assert_eq!(next, holder);
            } else {
                prop_assert_ne!(next, holder);
                prop_assert!(set.is_playing(next));
            }
        }

        /// No playing peer sits strictly between the holder and its successor.
        #[test]
        fn prop_next_after_is_first_in_ring_order(set in arb_set(), holder in 0usize..16) {
            let n = set.num_peers();
            let holder = PeerId::new(holder % n);
            let next = set.next_after(holder);
            let distance = (next.as_usize() + n - holder.as_usize()) % n;
            for offset in 1..distance {
                let skipped = PeerId::new((holder.as_usize() + offset) % n);
                prop_assert!(!set.is_playing(skipped));
            }
        }

        /// Entries never come back once eliminated, whatever is eliminated or merged afterwards.
        #[test]
        fn prop_eliminations_are_permanent(
            ops in proptest::collection::vec((0usize..8, any::<bool>()), 0..32),
        ) {
            let mut set = PlayingSet::new(8);
            let mut gone = [false; 8];
            for (id, use_merge) in ops {
                if use_merge {
                    let mut other = PlayingSet::new(8);
                    other.eliminate(PeerId::new(id));
                    set.merge(&other);
                } else {
                    set.eliminate(PeerId::new(id));
                }
                gone[id] = true;
                for (peer, &was_gone) in gone.iter().enumerate() {
                    prop_assert_eq!(set.is_playing(PeerId::new(peer)), !was_gone);
                }
            }
        }
    }
}
