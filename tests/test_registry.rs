//! Tests for the connection registry and its slot table

use herald::server::buffer::Buffer;
use herald::server::connection::StateKind;
use herald::server::poller::{Interest, Multiplexer};
use herald::server::registry::{ConnId, Registry};
use mio::net::{TcpListener, TcpStream};
use std::io::Write;
use std::net::{TcpListener as StdListener, TcpStream as StdStream};

struct Harness {
    registry: Registry,
    acceptor: StdListener,
    clients: Vec<StdStream>,
    _listener: TcpListener,
}

impl Harness {
    fn new(initial_slots: usize, shrink_slack: usize) -> Self {
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let multiplexer = Multiplexer::new(&mut listener, initial_slots, shrink_slack).unwrap();

        Self {
            registry: Registry::new(multiplexer),
            acceptor: StdListener::bind("127.0.0.1:0").unwrap(),
            clients: Vec::new(),
            _listener: listener,
        }
    }

    fn connect(&mut self) -> ConnId {
        let client = StdStream::connect(self.acceptor.local_addr().unwrap()).unwrap();
        let (server_side, peer) = self.acceptor.accept().unwrap();
        server_side.set_nonblocking(true).unwrap();
        self.clients.push(client);

        self.registry
            .insert(TcpStream::from_std(server_side), peer, Buffer::new(64, 1024))
            .unwrap()
    }
}

#[test]
fn test_insert_assigns_one_slot_per_connection() {
    let mut h = Harness::new(2, 8);
    let ids: Vec<ConnId> = (0..10).map(|_| h.connect()).collect();

    assert_eq!(h.registry.len(), 10);
    assert_eq!(h.registry.slot_count(), 10);
    // 2 -> 4 -> 8 -> 16
    assert_eq!(h.registry.multiplexer().capacity(), 16);

    for id in &ids {
        let conn = h.registry.get(*id).unwrap();
        assert_eq!(conn.kind(), StateKind::IncomingRequest);
        assert_eq!(h.registry.interest(*id), Some(Interest::Readable));
    }
}

#[test]
fn test_slot_count_after_removals() {
    let mut h = Harness::new(4, 8);
    let ids: Vec<ConnId> = (0..12).map(|_| h.connect()).collect();

    for id in ids.iter().step_by(3) {
        assert!(h.registry.remove(*id));
    }

    assert_eq!(h.registry.len(), 8);
    assert_eq!(h.registry.slot_count(), 8);
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(h.registry.contains(*id), i % 3 != 0);
        assert_eq!(h.registry.interest(*id).is_some(), i % 3 != 0);
    }
}

#[test]
fn test_remove_twice_is_noop() {
    let mut h = Harness::new(4, 8);
    let first = h.connect();
    let _second = h.connect();

    assert!(h.registry.remove(first));
    assert!(!h.registry.remove(first));
    assert_eq!(h.registry.len(), 1);
    assert_eq!(h.registry.slot_count(), 1);
}

#[test]
fn test_iteration_survives_removing_current() {
    let mut h = Harness::new(4, 8);
    let ids: Vec<ConnId> = (0..5).map(|_| h.connect()).collect();

    let mut visited = Vec::new();
    let mut cursor = h.registry.first();
    while let Some(id) = cursor {
        cursor = h.registry.next_after(id);
        visited.push(id);
        if id == ids[1] || id == ids[3] {
            h.registry.remove(id);
        }
    }

    assert_eq!(visited, ids);
    assert_eq!(h.registry.ids(), vec![ids[0], ids[2], ids[4]]);
    assert_eq!(h.registry.slot_count(), 3);
}

#[test]
fn test_next_after_removed_id() {
    let mut h = Harness::new(4, 8);
    let ids: Vec<ConnId> = (0..3).map(|_| h.connect()).collect();

    h.registry.remove(ids[1]);

    assert_eq!(h.registry.next_after(ids[1]), Some(ids[2]));
    assert_eq!(h.registry.next_after(ids[0]), Some(ids[2]));
    assert_eq!(h.registry.next_after(ids[2]), None);
}

#[test]
fn test_slot_table_shrinks_with_hysteresis() {
    let mut h = Harness::new(4, 4);
    let ids: Vec<ConnId> = (0..20).map(|_| h.connect()).collect();
    assert_eq!(h.registry.multiplexer().capacity(), 32);

    for id in &ids[..15] {
        h.registry.remove(*id);
    }

    let multiplexer = h.registry.multiplexer();
    assert_eq!(multiplexer.len(), 5);
    assert!(multiplexer.capacity() >= 5);
    assert!(multiplexer.capacity() - multiplexer.len() <= 4);

    for id in &ids[15..] {
        h.registry.remove(*id);
    }
    assert!(h.registry.is_empty());
    assert_eq!(h.registry.multiplexer().capacity(), 4);
}

#[test]
fn test_moved_connection_still_receives_events() {
    let mut h = Harness::new(4, 8);
    let first = h.connect();
    let _second = h.connect();
    let third = h.connect();

    // The last slot moves into the hole left by the first connection.
    h.registry.remove(first);
    h.clients[2].write_all(b"ping").unwrap();

    for _ in 0..10 {
        h.registry.wait().unwrap();
        if h.registry.get(third).unwrap().readiness().readable {
            return;
        }
    }
    panic!("no readiness recorded for the moved connection");
}

#[test]
fn test_clear_closes_everything() {
    let mut h = Harness::new(4, 8);
    for _ in 0..6 {
        h.connect();
    }

    h.registry.clear();

    assert!(h.registry.is_empty());
    assert_eq!(h.registry.slot_count(), 0);
    assert_eq!(h.registry.first(), None);
}
