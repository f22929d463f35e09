//! In-process [`Transport`] for peers running as threads.
//!
//! Every peer owns one mailbox. A send encodes the message into its wire
//! record and appends it to the recipient's mailbox, so messages from one
//! sender to one recipient arrive in the order they were sent. A synchronous
//! send additionally parks the sender until the recipient has taken the
//! message out of its mailbox.
//!
//! Dropping an endpoint closes its mailbox. Sends to a closed mailbox fail,
//! synchronous sends still waiting on it fail, and a receive that can never
//! be satisfied because every other endpoint is gone fails instead of
//! blocking forever. An [`AbortHandle`] fails every pending and future
//! receive at once, which is how a launcher unblocks peers after one of them
//! crashed.
//!
//! ```
//! use hot_potato::{ChannelNetwork, Flag, GameMessage, PeerId, Transport};
//!
//! let mut endpoints = ChannelNetwork::new(2).into_endpoints();
//! let mut second = endpoints.pop().unwrap();
//! let mut first = endpoints.pop().unwrap();
//!
//! let msg = GameMessage::new(PeerId::new(0), 5, PeerId::new(1), Flag::Continue);
//! first.send(PeerId::new(1), &msg)?;
//! assert_eq!(second.recv()?, msg);
//! # Ok::<(), hot_potato::PotatoError>(())
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::network::codec::{decode_message, encode_message};
use crate::network::messages::{GameMessage, WireRecord};
use crate::{PeerId, PotatoError, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Pending,
    Received,
    Dropped,
}

/// Completion signal for one synchronous send.
#[derive(Debug)]
struct Receipt {
    state: Mutex<Delivery>,
    settled: Condvar,
}

impl Receipt {
    fn new() -> Self {
        Self {
            state: Mutex::new(Delivery::Pending),
            settled: Condvar::new(),
        }
    }

    fn settle(&self, outcome: Delivery) {
        *self.state.lock() = outcome;
        self.settled.notify_all();
    }

    fn wait(&self) -> Delivery {
        let mut state = self.state.lock();
        while *state == Delivery::Pending {
            self.settled.wait(&mut state);
        }
        *state
    }
}

#[derive(Debug)]
struct Envelope {
    bytes: [u8; WireRecord::ENCODED_LEN],
    receipt: Option<Arc<Receipt>>,
}

#[derive(Debug, Default)]
struct Inbox {
    queue: VecDeque<Envelope>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Mailbox {
    inbox: Mutex<Inbox>,
    arrived: Condvar,
}

#[derive(Debug)]
struct Shared {
    mailboxes: Vec<Mailbox>,
    live_endpoints: AtomicUsize,
    aborted: AtomicBool,
}

impl Shared {
    fn wake_all(&self) {
        for mailbox in &self.mailboxes {
            let _inbox = mailbox.inbox.lock();
            mailbox.arrived.notify_all();
        }
    }
}

/// A set of connected mailboxes, one per peer.
#[derive(Debug)]
pub struct ChannelNetwork {
    shared: Arc<Shared>,
}

impl ChannelNetwork {
    /// Creates a network of `num_peers` mailboxes.
    #[must_use]
    pub fn new(num_peers: usize) -> Self {
        let mailboxes = (0..num_peers).map(|_| Mailbox::default()).collect();
        Self {
            shared: Arc::new(Shared {
                mailboxes,
                live_endpoints: AtomicUsize::new(num_peers),
                aborted: AtomicBool::new(false),
            }),
        }
    }

    /// Number of peers on this network.
    #[must_use]
    pub fn num_peers(&self) -> usize {
        self.shared.mailboxes.len()
    }

    /// Returns a handle that can abort the whole network later.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Splits the network into one endpoint per peer, ordered by id.
    #[must_use]
    pub fn into_endpoints(self) -> Vec<ChannelTransport> {
        (0..self.num_peers())
            .map(|id| ChannelTransport {
                id: PeerId::new(id),
                shared: Arc::clone(&self.shared),
            })
            .collect()
    }
}

/// Aborts a [`ChannelNetwork`] from outside its endpoints.
///
/// After [`abort`](Self::abort), every receive and send on the network fails
/// with [`PotatoError::Transport`]. Messages already queued are not delivered.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    shared: Arc<Shared>,
}

impl AbortHandle {
    /// Aborts the network and wakes every blocked receiver.
    pub fn abort(&self) {
        self.shared.aborted.store(true, Ordering::Release);
        self.shared.wake_all();
    }

    /// Returns `true` once [`abort`](Self::abort) was called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::Acquire)
    }
}

/// One peer's endpoint on a [`ChannelNetwork`].
#[derive(Debug)]
pub struct ChannelTransport {
    id: PeerId,
    shared: Arc<Shared>,
}

impl ChannelTransport {
    fn mailbox(&self, peer: PeerId) -> Result<&Mailbox, PotatoError> {
        self.shared
            .mailboxes
            .get(peer.as_usize())
            .ok_or(PotatoError::InvalidPeer {
                peer,
                num_peers: self.shared.mailboxes.len(),
            })
    }

    fn aborted_error(&self) -> PotatoError {
        PotatoError::Transport {
            peer: self.id,
            context: "the game was aborted".to_owned(),
        }
    }

    fn enqueue(
        &self,
        to: PeerId,
        msg: &GameMessage,
        receipt: Option<Arc<Receipt>>,
    ) -> Result<(), PotatoError> {
        let mailbox = self.mailbox(to)?;
        if self.shared.aborted.load(Ordering::Acquire) {
            return Err(self.aborted_error());
        }
        let bytes = encode_message(msg)?;
        let mut inbox = mailbox.inbox.lock();
        if inbox.closed {
            return Err(PotatoError::Transport {
                peer: self.id,
                context: format!("peer {} has left the game", to),
            });
        }
        inbox.queue.push_back(Envelope { bytes, receipt });
        mailbox.arrived.notify_one();
        Ok(())
    }

    /// Number of messages waiting in this endpoint's mailbox.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.mailbox(self.id)
            .map(|mailbox| mailbox.inbox.lock().queue.len())
            .unwrap_or(0)
    }
}

impl Transport for ChannelTransport {
    fn local_id(&self) -> PeerId {
        self.id
    }

    fn num_peers(&self) -> usize {
        self.shared.mailboxes.len()
    }

    fn send(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
        self.enqueue(to, msg, None)
    }

    fn send_sync(&mut self, to: PeerId, msg: &GameMessage) -> Result<(), PotatoError> {
        let receipt = Arc::new(Receipt::new());
        self.enqueue(to, msg, Some(Arc::clone(&receipt)))?;
        match receipt.wait() {
            Delivery::Received => Ok(()),
            Delivery::Dropped | Delivery::Pending => Err(PotatoError::Transport {
                peer: self.id,
                context: format!("peer {} left before receiving a synchronous send", to),
            }),
        }
    }

    fn recv(&mut self) -> Result<GameMessage, PotatoError> {
        let mailbox = self.mailbox(self.id)?;
        let envelope = {
            let mut inbox = mailbox.inbox.lock();
            loop {
                if self.shared.aborted.load(Ordering::Acquire) {
                    return Err(self.aborted_error());
                }
                if let Some(envelope) = inbox.queue.pop_front() {
                    break envelope;
                }
                if self.shared.live_endpoints.load(Ordering::Acquire) <= 1 {
                    return Err(PotatoError::Transport {
                        peer: self.id,
                        context: "every other peer has left the game".to_owned(),
                    });
                }
                mailbox.arrived.wait(&mut inbox);
            }
        };
        if let Some(receipt) = &envelope.receipt {
            receipt.settle(Delivery::Received);
        }
        Ok(decode_message(&envelope.bytes)?)
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        if let Ok(mailbox) = self.mailbox(self.id) {
            let mut inbox = mailbox.inbox.lock();
            inbox.closed = true;
            for envelope in inbox.queue.drain(..) {
                if let Some(receipt) = envelope.receipt {
                    receipt.settle(Delivery::Dropped);
                }
            }
        }
        self.shared.live_endpoints.fetch_sub(1, Ordering::AcqRel);
        // Wake receivers so they can notice they are alone.
        self.shared.wake_all();
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
    use crate::network::messages::Flag;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    fn msg(sender: usize, token: i32, next: usize) -> GameMessage {
        GameMessage::new(PeerId::new(sender), token, PeerId::new(next), Flag::Continue)
    }

    fn pair() -> (ChannelTransport, ChannelTransport) {
        let mut endpoints = ChannelNetwork::new(2).into_endpoints();
        let second = endpoints.pop().unwrap();
        let first = endpoints.pop().unwrap();
        (first, second)
    }

    #[test]
    fn endpoints_are_ordered_by_id() {
        let endpoints = ChannelNetwork::new(3).into_endpoints();
        let ids: Vec<_> = endpoints.iter().map(Transport::local_id).collect();
        assert_eq!(ids, vec![PeerId::new(0), PeerId::new(1), PeerId::new(2)]);
        assert!(endpoints.iter().all(|e| e.num_peers() == 3));
    }

    #[test]
    fn messages_from_one_sender_arrive_in_order() {
        let (mut a, mut b) = pair();
        for token in 0..10 {
            a.send(PeerId::new(1), &msg(0, token, 1)).unwrap();
        }
        assert_eq!(b.pending(), 10);
        for token in 0..10 {
            assert_eq!(b.recv().unwrap().token, token);
        }
    }

    #[test]
    fn send_to_unknown_peer_fails() {
        let (mut a, _b) = pair();
        let err = a.send(PeerId::new(5), &msg(0, 1, 5)).unwrap_err();
        assert_eq!(
            err,
            PotatoError::InvalidPeer {
                peer: PeerId::new(5),
                num_peers: 2
            }
        );
    }

    #[test]
    fn send_sync_waits_for_the_receiver() {
        let (mut a, mut b) = pair();
        let delivered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&delivered);

        let sender = thread::spawn(move || {
            a.send_sync(PeerId::new(1), &msg(0, 7, 1)).unwrap();
            flag.store(true, Ordering::SeqCst);
            a
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!delivered.load(Ordering::SeqCst));
        assert_eq!(b.recv().unwrap().token, 7);

        let _a = sender.join().unwrap();
        assert!(delivered.load(Ordering::SeqCst));
    }

    #[test]
    fn send_to_departed_peer_fails() {
        let (mut a, b) = pair();
        drop(b);
        let err = a.send(PeerId::new(1), &msg(0, 1, 1)).unwrap_err();
        assert!(matches!(err, PotatoError::Transport { .. }));
    }

    #[test]
    fn pending_sync_send_fails_when_receiver_leaves() {
        let (mut a, b) = pair();
        let sender = thread::spawn(move || a.send_sync(PeerId::new(1), &msg(0, 1, 1)));
        thread::sleep(Duration::from_millis(20));
        drop(b);
        let result = sender.join().unwrap();
        assert!(matches!(result, Err(PotatoError::Transport { .. })));
    }

    #[test]
    fn recv_fails_once_everyone_else_left() {
        let (mut a, b) = pair();
        drop(b);
        let err = a.recv().unwrap_err();
        assert!(err.to_string().contains("every other peer"));
    }

    #[test]
    fn abort_unblocks_waiting_receivers() {
        let network = ChannelNetwork::new(3);
        let abort = network.abort_handle();
        let mut endpoints = network.into_endpoints();
        let mut c = endpoints.pop().unwrap();
        let mut b = endpoints.pop().unwrap();
        let _a = endpoints.pop().unwrap();

        let receivers = [
            thread::spawn(move || b.recv()),
            thread::spawn(move || c.recv()),
        ];
        thread::sleep(Duration::from_millis(20));
        assert!(!abort.is_aborted());
        abort.abort();
        assert!(abort.is_aborted());

        for receiver in receivers {
            let err = receiver.join().unwrap().unwrap_err();
            assert!(err.to_string().contains("aborted"));
        }
    }

    #[test]
    fn send_after_abort_fails() {
        let network = ChannelNetwork::new(2);
        let abort = network.abort_handle();
        let mut endpoints = network.into_endpoints();
        let _b = endpoints.pop().unwrap();
        let mut a = endpoints.pop().unwrap();
        abort.abort();
        assert!(matches!(
            a.send(PeerId::new(1), &msg(0, 1, 1)),
            Err(PotatoError::Transport { .. })
        ));
    }

    #[test]
    fn queued_message_survives_sender_departure() {
        let (mut a, mut b) = pair();
        a.send(PeerId::new(1), &msg(0, 3, 1)).unwrap();
        drop(a);
        assert_eq!(b.recv().unwrap().token, 3);
        assert!(b.recv().is_err());
    }
}
