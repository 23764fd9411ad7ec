//! Readiness multiplexer.
//!
//! Wraps a [`mio::Poll`] together with a densely packed slot table. Slot 0
//! is the listening socket; live connections occupy slots `1..=len` and the
//! slot index doubles as the mio token. Removing a connection moves the last
//! slot into the hole, so the table never has gaps:
//!
//! ```text
//! before release(2):  [listener][#4][#7][#9][#12]
//! after  release(2):  [listener][#4][#12][#9]      #12 re-registered as Token(2)
//! ```
//!
//! The table and the event array grow by doubling and are reallocated
//! smaller once more than `shrink_slack` slots sit unused.

use crate::server::registry::ConnId;
use mio::event::{Event, Source};
use mio::{Events, Poll, Token, Waker};
use std::io;
use tracing::{trace, warn};

pub const LISTENER: Token = Token(0);
pub const WAKER: Token = Token(usize::MAX - 1);

/// What a connection waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Nothing but a hang-up. mio cannot express that alone, so idle
    /// sockets stay registered for reads.
    Idle,
    Readable,
    Writable,
}

impl Interest {
    fn to_mio(self) -> mio::Interest {
        match self {
            Interest::Idle | Interest::Readable => mio::Interest::READABLE,
            Interest::Writable => mio::Interest::WRITABLE,
        }
    }
}

/// Readiness reported for one connection during one loop pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// Error, or both directions closed by the peer
    pub hangup: bool,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        !(self.readable || self.writable || self.hangup)
    }

    pub fn merge(&mut self, other: Readiness) {
        self.readable |= other.readable;
        self.writable |= other.writable;
        self.hangup |= other.hangup;
    }

    fn from_event(event: &Event) -> Self {
        Self {
            readable: event.is_readable() || event.is_read_closed(),
            writable: event.is_writable(),
            hangup: event.is_error() || (event.is_read_closed() && event.is_write_closed()),
        }
    }
}

/// One entry of a [`Multiplexer::wait`] result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    Listener,
    Shutdown,
    Connection(ConnId, Readiness),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    owner: Option<ConnId>,
    interest: Interest,
}

pub struct Multiplexer {
    poll: Poll,
    events: Events,
    slots: Vec<Slot>,
    /// Connection slots allocated, not counting the listener's
    capacity: usize,
    min_capacity: usize,
    shrink_slack: usize,
}

impl Multiplexer {
    /// Creates the poll instance and registers `listener` in slot 0.
    pub fn new<S>(listener: &mut S, initial_slots: usize, shrink_slack: usize) -> io::Result<Self>
    where
        S: Source + ?Sized,
    {
        let poll = Poll::new()?;
        poll.registry()
            .register(listener, LISTENER, mio::Interest::READABLE)?;

        let capacity = initial_slots.max(1);
        let mut slots = Vec::with_capacity(capacity + 1);
        slots.push(Slot {
            owner: None,
            interest: Interest::Readable,
        });

        Ok(Self {
            poll,
            events: Self::event_array(capacity),
            slots,
            capacity,
            min_capacity: capacity,
            shrink_slack: shrink_slack.max(1),
        })
    }

    /// Creates the waker used to interrupt [`Multiplexer::wait`]. mio allows
    /// one waker per poll instance.
    pub fn waker(&self) -> io::Result<Waker> {
        Waker::new(self.poll.registry(), WAKER)
    }

    /// Number of live connection slots.
    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn owner(&self, slot: usize) -> Option<ConnId> {
        self.slots.get(slot).and_then(|s| s.owner)
    }

    pub fn interest(&self, slot: usize) -> Option<Interest> {
        self.connection_slot(slot).map(|s| s.interest)
    }

    /// Registers `source` in the next free slot, growing the table first
    /// when it is full.
    pub fn register<S>(&mut self, source: &mut S, owner: ConnId, interest: Interest) -> io::Result<usize>
    where
        S: Source + ?Sized,
    {
        if self.len() == self.capacity {
            self.resize(self.capacity * 2);
        }

        let slot = self.slots.len();
        self.poll
            .registry()
            .register(source, Token(slot), interest.to_mio())?;
        self.slots.push(Slot {
            owner: Some(owner),
            interest,
        });
        Ok(slot)
    }

    pub fn set_interest<S>(&mut self, source: &mut S, slot: usize, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        let current = self.connection_slot(slot).ok_or_else(|| bad_slot(slot))?.interest;
        if current == interest {
            return Ok(());
        }

        self.poll
            .registry()
            .reregister(source, Token(slot), interest.to_mio())?;
        self.slots[slot].interest = interest;
        Ok(())
    }

    /// Deregisters `source` and compacts the table.
    ///
    /// Returns the owner that was moved into `slot`, if any. Its source must
    /// then be handed to [`Multiplexer::rebind`].
    pub fn release<S>(&mut self, source: &mut S, slot: usize) -> Option<ConnId>
    where
        S: Source + ?Sized,
    {
        if self.connection_slot(slot).is_none() {
            warn!(slot, "Release of an unused slot");
            return None;
        }

        if let Err(e) = self.poll.registry().deregister(source) {
            warn!(slot, error = %e, "Failed to deregister socket");
        }

        self.slots.swap_remove(slot);
        let moved = self.owner(slot);
        self.shrink_if_slack();
        moved
    }

    /// Re-registers a source that [`Multiplexer::release`] moved into `slot`.
    pub fn rebind<S>(&mut self, source: &mut S, slot: usize) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        let interest = self.connection_slot(slot).ok_or_else(|| bad_slot(slot))?.interest;
        self.poll
            .registry()
            .reregister(source, Token(slot), interest.to_mio())
    }

    /// Blocks until at least one descriptor is ready.
    ///
    /// Tokens are resolved to owners before returning, so compacting the
    /// table while the result is processed cannot misroute anything. An
    /// interrupted wait returns no wakeups.
    pub fn wait(&mut self) -> io::Result<Vec<Wakeup>> {
        if let Err(e) = self.poll.poll(&mut self.events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(e);
        }

        let mut wakeups = Vec::new();
        for event in self.events.iter() {
            match event.token() {
                LISTENER => wakeups.push(Wakeup::Listener),
                WAKER => wakeups.push(Wakeup::Shutdown),
                Token(slot) => match self.owner(slot) {
                    Some(owner) => {
                        wakeups.push(Wakeup::Connection(owner, Readiness::from_event(event)))
                    }
                    None => trace!(slot, "Event for a released slot"),
                },
            }
        }
        Ok(wakeups)
    }

    fn connection_slot(&self, slot: usize) -> Option<&Slot> {
        if slot == 0 {
            return None;
        }
        self.slots.get(slot)
    }

    fn shrink_if_slack(&mut self) {
        let slack = self.capacity - self.len();
        if slack <= self.shrink_slack || self.capacity <= self.min_capacity {
            return;
        }

        let target = (self.len() + self.shrink_slack / 2).max(self.min_capacity);
        if target < self.capacity {
            self.resize(target);
        }
    }

    fn resize(&mut self, capacity: usize) {
        trace!(from = self.capacity, to = capacity, "Resizing slot table");
        if capacity > self.capacity {
            self.slots.reserve_exact(capacity + 1 - self.slots.len());
        } else {
            self.slots.shrink_to(capacity + 1);
        }
        self.capacity = capacity;
        self.events = Self::event_array(capacity);
    }

    // Room for every connection, the listener and the waker.
    fn event_array(capacity: usize) -> Events {
        Events::with_capacity(capacity + 2)
    }
}

fn bad_slot(slot: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("slot {slot} is not a connection slot"),
    )
}
