//! The event-driven core.
//!
//! One thread blocks on the [`poller::Multiplexer`]; every wakeup is routed
//! to the [`connection::Connection`] state machines held by the
//! [`registry::Registry`]:
//!
//! ```text
//!                      ┌─────────────────┐
//!        accept ──────▶│ IncomingRequest │
//!                      └────────┬────────┘
//!            GET               │ POST, length 0        POST, length > 0
//!        ┌──────────────────────┼──────────────────────────┐
//!        ▼                      ▼                          ▼
//! ┌────────────────┐   ┌────────────────┐         ┌────────────────┐
//! │ OutgoingAnswer │◀──│  ChatReceiver  │◀────────│   ChatSender   │
//! └───────┬────────┘   └────────────────┘ publish └───────┬────────┘
//!         │ drained                                        │ complete
//!         ▼                                                ▼
//!       closed                                           closed
//! ```

pub mod buffer;
pub mod connection;
pub mod listener;
pub mod poller;
pub mod registry;
pub mod services;

pub use listener::{Server, ShutdownHandle};
