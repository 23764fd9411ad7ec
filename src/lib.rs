//! Herald - static file server with a broadcast service
//!
//! Core library: a single-threaded readiness loop serving documents and
//! relaying posted messages to subscribers.

pub mod access_log;
pub mod broadcast;
pub mod config;
pub mod http;
pub mod server;
