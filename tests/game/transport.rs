//! Peers wired by hand over the channel network.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::thread;

use hot_potato::report::CollectingSink;
use hot_potato::rng::{DecrementSource, ScriptedDraws};
use hot_potato::telemetry::{CollectingObserver, ViolationKind};
use hot_potato::{
    ChannelNetwork, Flag, GameBuilder, GameConfig, GameMessage, Peer, PeerId, PotatoError, Token,
    Transport, TurnState,
};

fn config(num_peers: usize) -> GameConfig {
    GameConfig {
        num_peers,
        initial_token: 10,
        max_decrement: 8,
    }
}

#[test]
fn stepping_two_peers_by_hand() {
    let sink = Arc::new(CollectingSink::new());
    let mut endpoints = ChannelNetwork::new(2).into_endpoints();
    let one = endpoints.pop().unwrap();
    let zero = endpoints.pop().unwrap();

    let mut coordinator = Peer::new(zero, ScriptedDraws::new([3, 1]), config(2))
        .unwrap()
        .with_status_sink(sink.clone());
    let mut other = Peer::new(one, ScriptedDraws::new([2]), config(2)).unwrap();

    assert_eq!(coordinator.state(), TurnState::Holding);
    assert_eq!(other.state(), TurnState::Waiting);

    assert_eq!(coordinator.step().unwrap(), TurnState::Waiting);
    assert_eq!(coordinator.token(), 7);
    assert_eq!(other.step().unwrap(), TurnState::Holding);
    assert_eq!(other.token(), 7);
    assert_eq!(other.step().unwrap(), TurnState::Waiting);
    assert_eq!(coordinator.step().unwrap(), TurnState::Holding);
    assert_eq!(coordinator.token(), 5);

    assert_eq!(
        sink.rendered(),
        vec!["Peer 0 holds token 7", "Peer 1 holds token 5"]
    );
    assert_eq!(coordinator.stats().messages_sent, 1);
    assert_eq!(other.stats().messages_received, 1);
}

#[test]
fn threads_over_the_channel_network() {
    let sink = Arc::new(CollectingSink::new());
    let scripts: [&[Token]; 3] = [&[4, 19], &[7], &[3]];

    let handles: Vec<_> = ChannelNetwork::new(3)
        .into_endpoints()
        .into_iter()
        .zip(scripts)
        .map(|(endpoint, script)| {
            let mut peer = Peer::new(
                endpoint,
                ScriptedDraws::new(script.iter().copied()),
                GameConfig {
                    max_decrement: 20,
                    ..config(3)
                },
            )
            .unwrap();
            if peer.id().is_coordinator() {
                peer = peer.with_status_sink(sink.clone());
            }
            thread::spawn(move || peer.run())
        })
        .collect();

    let summaries: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap())
        .collect();

    assert_eq!(summaries[2].final_state, TurnState::GameOver);
    assert_eq!(sink.len(), 5);
    assert_eq!(sink.rendered().last().unwrap(), "Peer 2 wins");
}

#[test]
fn stray_game_over_ends_a_waiting_peer() {
    let mut endpoints = ChannelNetwork::new(3).into_endpoints();
    let two = endpoints.pop().unwrap();
    let mut one = endpoints.pop().unwrap();

    let observer = Arc::new(CollectingObserver::new());
    let mut peer = Peer::new(two, ScriptedDraws::new([]), config(3))
        .unwrap()
        .with_violation_observer(observer.clone());
    assert_eq!(peer.state(), TurnState::Waiting);

    let notice = GameMessage::new(PeerId::new(1), 3, PeerId::new(1), Flag::GameOver);
    one.send(PeerId::new(2), &notice).unwrap();

    let state = peer.step().unwrap();
    assert!(state.is_terminal(), "peer kept waiting in {:?}", state);
    assert!(observer.has_violation(ViolationKind::Protocol));
}

#[test]
fn mismatched_transport_is_rejected() {
    let endpoint = ChannelNetwork::new(3).into_endpoints().pop().unwrap();
    let err = Peer::new(endpoint, ScriptedDraws::new([]), config(2)).unwrap_err();
    assert!(matches!(err, PotatoError::InvalidPeer { .. }));
}

#[test]
fn boxed_transports_drive_peers() {
    let mut endpoints: Vec<Box<dyn Transport>> = ChannelNetwork::new(2)
        .into_endpoints()
        .into_iter()
        .map(|endpoint| Box::new(endpoint) as Box<dyn Transport>)
        .collect();
    let one = endpoints.pop().unwrap();
    let zero = endpoints.pop().unwrap();

    let coordinator = Peer::new(zero, ScriptedDraws::new([9]), config(2)).unwrap();
    let other = Peer::new(one, ScriptedDraws::new([7]), config(2)).unwrap();
    let first = thread::spawn(move || coordinator.run());
    let second = thread::spawn(move || other.run());

    let zero = first.join().unwrap().unwrap();
    let one = second.join().unwrap().unwrap();
    // draws clamp to 7: 10 -> 3, 3 -> -4
    assert_eq!(zero.final_state, TurnState::GameOver);
    assert_eq!(one.final_state, TurnState::Eliminated);
    assert_eq!(one.final_token, -4);
}

struct Exploding;

impl DecrementSource for Exploding {
    fn draw(&mut self, _max_decrement: Token) -> Token {
        panic!("decrement source exploded");
    }
}

#[test]
fn panicking_peer_aborts_the_game() {
    let err = GameBuilder::new()
        .with_num_peers(3)
        .unwrap()
        .with_seed(5)
        .with_status_sink(Arc::new(CollectingSink::new()))
        .with_decrement_source(PeerId::new(1), Exploding)
        .start_game()
        .unwrap_err();
    assert_eq!(
        err,
        PotatoError::Internal {
            context: "peer 1 panicked".to_owned()
        }
    );
}
