use anyhow::Context;
use mio::Waker;
use mio::net::TcpListener;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

use crate::config::{Config, LimitsConfig};
use crate::server::buffer::Buffer;
use crate::server::connection::{ConnectionError, Outcome};
use crate::server::poller::{Interest, Multiplexer};
use crate::server::registry::{ConnId, Registry};
use crate::server::services::Services;

/// Requests a running [`Server`] to stop.
///
/// The flag is checked once per loop iteration; triggering also wakes a
/// loop blocked in its readiness wait.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake the event loop");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// The event loop: one thread, one poll, every connection.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Registry,
    services: Services,
    limits: LimitsConfig,
    shutdown: ShutdownHandle,
}

impl Server {
    pub fn bind(cfg: &Config) -> anyhow::Result<Self> {
        let addr = cfg
            .server
            .listen_addr
            .to_socket_addrs()
            .with_context(|| format!("resolving {}", cfg.server.listen_addr))?
            .next()
            .with_context(|| format!("{} resolves to no address", cfg.server.listen_addr))?;

        let mut listener =
            TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
        let local_addr = listener.local_addr()?;

        let services = Services::open(cfg)?;

        let multiplexer = Multiplexer::new(
            &mut listener,
            cfg.limits.initial_slots,
            cfg.limits.slot_shrink_slack,
        )
        .context("creating the readiness table")?;
        let waker = multiplexer.waker().context("creating the shutdown waker")?;

        info!("Listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            registry: Registry::new(multiplexer),
            services,
            limits: cfg.limits.clone(),
            shutdown: ShutdownHandle {
                requested: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serves until shutdown is requested or a fatal error occurs, then
    /// closes every connection and the listening socket.
    pub fn run(mut self) -> anyhow::Result<()> {
        let result = self.event_loop();
        if let Err(e) = &result {
            error!("Event loop failed: {:#}", e);
        }
        self.teardown();
        result
    }

    fn event_loop(&mut self) -> anyhow::Result<()> {
        loop {
            if self.shutdown.is_triggered() {
                info!("Shutdown requested");
                return Ok(());
            }

            let wakeups = self.registry.wait().context("waiting for readiness")?;
            if wakeups.listener {
                self.accept_pending();
            }
            self.service_connections()?;
        }
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let buffer = Buffer::new(self.limits.initial_buffer, self.limits.max_buffer);
                    if let Err(e) = self.registry.insert(stream, peer, buffer) {
                        warn!(%peer, error = %e, "Failed to register connection");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    break;
                }
            }
        }
    }

    // The successor is looked up before servicing, since servicing may
    // close the current connection.
    fn service_connections(&mut self) -> anyhow::Result<()> {
        let mut cursor = self.registry.first();
        while let Some(id) = cursor {
            cursor = self.registry.next_after(id);

            let Some(conn) = self.registry.get_mut(id) else {
                continue;
            };
            let ready = conn.take_ready();
            if ready.is_empty() {
                continue;
            }

            let result = conn.on_ready(ready, &mut self.services);
            self.apply(id, result)?;
        }
        Ok(())
    }

    fn apply(&mut self, id: ConnId, result: Result<Outcome, ConnectionError>) -> anyhow::Result<()> {
        match result {
            Ok(Outcome::Keep) => {}
            Ok(Outcome::Watch(interest)) => self.watch(id, interest),
            Ok(Outcome::Close) => {
                self.registry.remove(id);
            }
            Ok(Outcome::Published) => {
                self.registry.remove(id);
                self.release_subscribers();
            }
            Err(e) if e.is_fatal() => {
                self.registry.remove(id);
                return Err(e.into());
            }
            Err(e) => {
                debug!(conn = %id, error = %e, "Closing connection");
                self.registry.remove(id);
            }
        }
        Ok(())
    }

    fn watch(&mut self, id: ConnId, interest: Interest) {
        if let Err(e) = self.registry.set_interest(id, interest) {
            warn!(conn = %id, ?interest, error = %e, "Failed to update interest");
            self.registry.remove(id);
        }
    }

    fn release_subscribers(&mut self) {
        let subscribers = self.registry.subscribers();
        debug!(count = subscribers.len(), "Releasing subscribers");

        for id in subscribers {
            let Some(conn) = self.registry.get_mut(id) else {
                continue;
            };
            match conn.release_subscription(&self.services) {
                Ok(()) => self.watch(id, Interest::Writable),
                Err(e) => {
                    warn!(conn = %id, error = %e, "Failed to release subscriber");
                    self.registry.remove(id);
                }
            }
        }
    }

    fn teardown(&mut self) {
        let open = self.registry.len();
        self.registry.clear();
        info!(connections = open, "Server stopped");
    }
}
