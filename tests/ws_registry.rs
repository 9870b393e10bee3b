//! Test del Connection Registry e della Membership Cache
//!
//! Nessun socket: le connessioni sono handle con la sola coda di uscita.

mod common;

use common::*;
use messenger_server::core::WsError;
use messenger_server::dtos::WsEventDTO;
use messenger_server::entities::ChatType;
use messenger_server::ws::registry::ConnectionStreams;
use messenger_server::ws::{
    CloseReason, Connection, ConnectionRegistry, broadcast_to_chat, join_room, leave_room, send_direct,
};
use std::sync::Arc;

fn event(text: &str) -> Arc<WsEventDTO> {
    Arc::new(WsEventDTO::Error {
        code: 0,
        message: text.to_string(),
    })
}

fn drain(streams: &mut ConnectionStreams) -> Vec<WsEventDTO> {
    let mut events = Vec::new();
    while let Ok(event) = streams.outbound.try_recv() {
        events.push((*event).clone());
    }
    events
}

#[test]
fn test_attach_twice_leaves_one_connection_and_closes_first() {
    let registry = ConnectionRegistry::new();
    let (first, first_streams) = Connection::new(1, 5, 8);
    let (second, _second_streams) = Connection::new(1, 5, 8);

    assert!(registry.attach(first.clone()).unwrap().is_none());
    let replaced = registry.attach(second.clone()).unwrap().expect("First connection replaced");

    assert_eq!(replaced.id(), first.id());
    assert_eq!(registry.online_count(), 1);
    assert_eq!(registry.lookup(1).unwrap().id(), second.id());
    assert_eq!(*first_streams.shutdown.borrow(), Some(CloseReason::Superseded));
    assert!(!second.is_closed());
}

#[test]
fn test_superseded_connection_cannot_detach_successor() {
    let registry = ConnectionRegistry::new();
    let (first, _s1) = Connection::new(1, 5, 8);
    let (second, _s2) = Connection::new(1, 6, 8);
    registry.attach(first.clone()).unwrap();
    registry.attach(second.clone()).unwrap();

    assert!(!registry.detach_connection(1, first.id()));
    assert!(registry.is_user_online(1));
    assert_eq!(registry.rooms().rooms_of(1), vec![6]);

    assert!(registry.detach_connection(1, second.id()));
    assert!(!registry.is_user_online(1));
    assert!(registry.rooms().rooms_of(1).is_empty());
}

#[test]
fn test_closed_handle_is_rejected() {
    let registry = ConnectionRegistry::new();
    let (connection, _streams) = Connection::new(1, 5, 8);
    connection.close(CloseReason::ClientGone);

    assert!(matches!(registry.attach(connection), Err(WsError::InvalidConnection)));
    assert_eq!(registry.online_count(), 0);
    assert!(!registry.rooms().is_member(1, 5));
}

#[test]
fn test_detach_is_idempotent() {
    let registry = ConnectionRegistry::new();
    let (connection, _streams) = Connection::new(1, 5, 8);
    registry.attach(connection).unwrap();

    assert!(registry.detach(1).is_some());
    assert!(registry.detach(1).is_none());
    assert!(registry.rooms().members_of(5).is_empty());
}

#[tokio::test]
async fn test_membership_follows_guard_and_detach() {
    let (state, store) = create_test_state();
    store.insert_chat(5, ChatType::Group, vec![1, 2]);
    store.insert_chat(6, ChatType::Group, vec![1]);
    store.insert_chat(7, ChatType::Group, vec![2]);

    // senza sessione live il join non ha effetto
    assert!(!join_room(&state, 1, 6).await.unwrap());
    assert!(!state.users_online.rooms().is_member(1, 6));

    let (connection, _streams) = Connection::new(1, 5, 8);
    state.users_online.attach(connection.clone()).unwrap();
    assert!(state.users_online.rooms().is_member(1, 5));

    assert!(join_room(&state, 1, 6).await.unwrap());
    assert!(matches!(join_room(&state, 1, 7).await, Err(WsError::AccessDenied)));
    assert!(!state.users_online.rooms().is_member(1, 7));

    assert!(leave_room(&state, 1, 6));
    assert!(join_room(&state, 1, 6).await.unwrap());

    state.users_online.detach_connection(1, connection.id());
    assert!(!state.users_online.rooms().is_member(1, 5));
    assert!(!state.users_online.rooms().is_member(1, 6));
}

#[test]
fn test_broadcast_skips_members_without_connection() {
    let registry = ConnectionRegistry::new();
    let (alice, mut alice_streams) = Connection::new(1, 5, 8);
    let (bob, mut bob_streams) = Connection::new(2, 5, 8);
    let (carol, mut carol_streams) = Connection::new(3, 5, 8);
    for connection in [alice, bob.clone(), carol] {
        registry.attach(connection).unwrap();
    }

    registry.detach_connection(2, bob.id());

    assert_eq!(broadcast_to_chat(&registry, 5, event("hello")), 2);
    assert_eq!(drain(&mut alice_streams).len(), 1);
    assert!(drain(&mut bob_streams).is_empty());
    assert_eq!(drain(&mut carol_streams).len(), 1);
}

#[test]
fn test_slow_client_does_not_block_the_room() {
    let registry = ConnectionRegistry::new();
    let (slow, mut slow_streams) = Connection::new(1, 5, 1);
    let (fast, mut fast_streams) = Connection::new(2, 5, 8);
    registry.attach(slow).unwrap();
    registry.attach(fast).unwrap();

    assert_eq!(broadcast_to_chat(&registry, 5, event("one")), 2);
    // la coda del client lento è piena: l'evento viene scartato solo per lui
    assert_eq!(broadcast_to_chat(&registry, 5, event("two")), 1);

    assert_eq!(drain(&mut slow_streams).len(), 1);
    assert_eq!(drain(&mut fast_streams).len(), 2);
}

#[test]
fn test_send_direct_to_offline_user_is_dropped() {
    let registry = ConnectionRegistry::new();
    assert!(!send_direct(&registry, 9, event("nobody")));

    let (connection, mut streams) = Connection::new(9, 5, 8);
    registry.attach(connection).unwrap();
    assert!(send_direct(&registry, 9, event("somebody")));
    assert_eq!(drain(&mut streams).len(), 1);
}

#[test]
fn test_concurrent_attach_keeps_at_most_one_connection() {
    let registry = Arc::new(ConnectionRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let (connection, streams) = Connection::new(1, 5, 8);
                registry.attach(connection.clone()).unwrap();
                (connection, streams)
            })
        })
        .collect();
    let connections: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(registry.online_count(), 1);
    let current = registry.lookup(1).unwrap().id();
    let open: Vec<_> = connections
        .iter()
        .filter(|(connection, _)| !connection.is_closed())
        .map(|(connection, _)| connection.id())
        .collect();
    assert_eq!(open, vec![current], "Only the registered connection stays open");
}
