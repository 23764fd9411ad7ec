//! Live connections, in accept order, plus their multiplexer slots.
//!
//! Connections are addressed by [`ConnId`] handles that are never reused,
//! so a handle kept across a removal simply stops resolving.

use crate::server::buffer::Buffer;
use crate::server::connection::Connection;
use crate::server::poller::{Interest, Multiplexer, Readiness, Wakeup};
use mio::net::TcpStream;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::ops::Bound;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a [`Registry::wait`] call saw besides connection readiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wakeups {
    pub listener: bool,
    pub shutdown: bool,
}

pub struct Registry {
    connections: BTreeMap<ConnId, Connection>,
    multiplexer: Multiplexer,
    next_id: u64,
}

impl Registry {
    pub fn new(multiplexer: Multiplexer) -> Self {
        Self {
            connections: BTreeMap::new(),
            multiplexer,
            next_id: 1,
        }
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.multiplexer
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of occupied multiplexer slots. Always equals [`Registry::len`].
    pub fn slot_count(&self) -> usize {
        self.multiplexer.len()
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Adds a freshly accepted socket at the tail, waiting for its request.
    pub fn insert(&mut self, mut stream: TcpStream, peer: SocketAddr, buffer: Buffer) -> io::Result<ConnId> {
        let id = ConnId(self.next_id);
        let slot = self
            .multiplexer
            .register(&mut stream, id, Interest::Readable)?;
        self.next_id += 1;

        self.connections
            .insert(id, Connection::new(id, stream, peer, buffer, slot));
        debug!(conn = %id, %peer, slot, "Connection registered");
        Ok(id)
    }

    /// Unlinks `id`, frees its slot and drops its socket and file.
    ///
    /// Returns `false` when `id` was already gone.
    pub fn remove(&mut self, id: ConnId) -> bool {
        let Some(mut conn) = self.connections.remove(&id) else {
            return false;
        };

        let slot = conn.slot();
        if let Some(moved) = self.multiplexer.release(conn.stream_mut(), slot) {
            self.rebind(moved, slot);
        }
        debug!(conn = %id, peer = %conn.peer(), "Connection closed");
        true
    }

    pub fn set_interest(&mut self, id: ConnId, interest: Interest) -> io::Result<()> {
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no connection {id}")))?;
        let slot = conn.slot();
        self.multiplexer
            .set_interest(conn.stream_mut(), slot, interest)
    }

    pub fn interest(&self, id: ConnId) -> Option<Interest> {
        let conn = self.connections.get(&id)?;
        self.multiplexer.interest(conn.slot())
    }

    pub fn first(&self) -> Option<ConnId> {
        self.connections.keys().next().copied()
    }

    /// The connection after `id` in accept order. Works for removed ids too,
    /// so the successor can be looked up before or after closing `id`.
    pub fn next_after(&self, id: ConnId) -> Option<ConnId> {
        self.connections
            .range((Bound::Excluded(id), Bound::Unbounded))
            .next()
            .map(|(id, _)| *id)
    }

    pub fn ids(&self) -> Vec<ConnId> {
        self.connections.keys().copied().collect()
    }

    /// Connections waiting for the next broadcast.
    pub fn subscribers(&self) -> Vec<ConnId> {
        self.connections
            .values()
            .filter(|conn| conn.is_subscriber())
            .map(Connection::id)
            .collect()
    }

    /// Blocks until something is ready and records per-connection readiness
    /// for the coming pass.
    pub fn wait(&mut self) -> io::Result<Wakeups> {
        let mut wakeups = Wakeups::default();
        for wakeup in self.multiplexer.wait()? {
            match wakeup {
                Wakeup::Listener => wakeups.listener = true,
                Wakeup::Shutdown => wakeups.shutdown = true,
                Wakeup::Connection(id, readiness) => self.mark_ready(id, readiness),
            }
        }
        Ok(wakeups)
    }

    pub fn mark_ready(&mut self, id: ConnId, readiness: Readiness) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.mark_ready(readiness);
        }
    }

    /// Closes every connection.
    pub fn clear(&mut self) {
        for id in self.ids() {
            self.remove(id);
        }
    }

    fn rebind(&mut self, id: ConnId, slot: usize) {
        let Some(conn) = self.connections.get_mut(&id) else {
            warn!(conn = %id, slot, "Moved slot owner is not registered");
            return;
        };

        conn.set_slot(slot);
        if let Err(e) = self.multiplexer.rebind(conn.stream_mut(), slot) {
            warn!(conn = %id, slot, error = %e, "Failed to move connection to a new slot");
            self.remove(id);
        }
    }
}
