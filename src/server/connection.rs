use mio::net::TcpStream;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info};

use crate::http::parser::{ParseError, parse_request};
use crate::http::request::Method;
use crate::http::response::{StatusCode, header_block};
use crate::server::buffer::{Buffer, BufferError};
use crate::server::poller::{Interest, Readiness};
use crate::server::registry::ConnId;
use crate::server::services::Services;

/// Where a connection is in its lifecycle.
///
/// A closed connection is not a state: it is removed from the registry on
/// the spot.
#[derive(Debug)]
pub enum ConnectionState {
    /// Reading the request header block
    IncomingRequest,
    /// Writing the buffer, refilled from `source` until it runs dry
    OutgoingAnswer { source: Option<File> },
    /// Subscribed, waiting for the next broadcast
    ChatReceiver,
    /// Uploading a message of `content_length` bytes starting at `body_offset`
    ChatSender {
        body_offset: usize,
        content_length: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    IncomingRequest,
    OutgoingAnswer,
    ChatReceiver,
    ChatSender,
}

/// What the event loop has to do after servicing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing changed
    Keep,
    /// Switch the connection's interest
    Watch(Interest),
    /// Close the connection
    Close,
    /// A message was appended to the broadcast log: close the sender and
    /// release every subscriber
    Published,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("bad request: {0}")]
    Parse(#[from] ParseError),
    #[error("broadcast post without Content-Length")]
    MissingContentLength,
    #[error("error document {} cannot be opened: {source}", .path.display())]
    ErrorDocument { path: PathBuf, source: io::Error },
}

impl ConnectionError {
    /// Errors the whole server cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectionError::ErrorDocument { .. })
    }
}

enum Received {
    Data,
    Eof,
    Blocked,
}

pub struct Connection {
    id: ConnId,
    stream: TcpStream,
    peer: SocketAddr,
    state: ConnectionState,
    buffer: Buffer,
    slot: usize,
    ready: Readiness,
}

impl Connection {
    pub fn new(id: ConnId, stream: TcpStream, peer: SocketAddr, buffer: Buffer, slot: usize) -> Self {
        Self {
            id,
            stream,
            peer,
            state: ConnectionState::IncomingRequest,
            buffer,
            slot,
            ready: Readiness::default(),
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        match self.state {
            ConnectionState::IncomingRequest => StateKind::IncomingRequest,
            ConnectionState::OutgoingAnswer { .. } => StateKind::OutgoingAnswer,
            ConnectionState::ChatReceiver => StateKind::ChatReceiver,
            ConnectionState::ChatSender { .. } => StateKind::ChatSender,
        }
    }

    pub fn is_subscriber(&self) -> bool {
        self.kind() == StateKind::ChatReceiver
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn set_slot(&mut self, slot: usize) {
        self.slot = slot;
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Readiness recorded since the connection was last serviced.
    pub fn readiness(&self) -> Readiness {
        self.ready
    }

    pub(crate) fn mark_ready(&mut self, readiness: Readiness) {
        self.ready.merge(readiness);
    }

    /// Hands out the readiness gathered for this pass and clears it.
    pub(crate) fn take_ready(&mut self) -> Readiness {
        std::mem::take(&mut self.ready)
    }

    /// Drives the state machine for one readiness notification.
    ///
    /// Sockets are edge-triggered, so every branch keeps going until the
    /// socket would block or the state changes.
    pub fn on_ready(&mut self, ready: Readiness, services: &mut Services) -> Result<Outcome, ConnectionError> {
        if ready.hangup {
            debug!(conn = %self.id, "Peer hung up");
            return Ok(Outcome::Close);
        }

        match (self.kind(), ready.readable, ready.writable) {
            (StateKind::OutgoingAnswer, _, true) => self.send(),
            (StateKind::IncomingRequest | StateKind::ChatSender, true, _) => self.receive(services),
            (StateKind::ChatReceiver, true, _) => self.discard_input(),
            _ => Ok(Outcome::Keep),
        }
    }

    /// Turns a subscriber into an answer streaming the broadcast log.
    pub fn release_subscription(&mut self, services: &Services) -> Result<(), ConnectionError> {
        let log = services.broadcast.reader()?;
        self.buffer.reset();
        self.buffer
            .append(&header_block(StatusCode::Ok, SystemTime::now()))?;
        self.state = ConnectionState::OutgoingAnswer { source: Some(log) };
        Ok(())
    }

    fn receive(&mut self, services: &mut Services) -> Result<Outcome, ConnectionError> {
        loop {
            match self.read_chunk()? {
                Received::Data => {}
                Received::Blocked => return Ok(Outcome::Keep),
                Received::Eof => {
                    debug!(conn = %self.id, state = ?self.kind(), "Peer closed before the request was complete");
                    return Ok(Outcome::Close);
                }
            }

            let next = match self.state {
                ConnectionState::IncomingRequest => self.on_request_bytes(services)?,
                ConnectionState::ChatSender {
                    body_offset,
                    content_length,
                } => self.on_body_bytes(body_offset, content_length, services)?,
                _ => Some(Outcome::Keep),
            };
            if let Some(outcome) = next {
                return Ok(outcome);
            }
        }
    }

    fn on_request_bytes(&mut self, services: &mut Services) -> Result<Option<Outcome>, ConnectionError> {
        let request = match parse_request(self.buffer.filled()) {
            Ok(request) => request,
            Err(ParseError::Incomplete) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match request.method {
            Method::GET => {
                self.answer_document(&request.url, services)?;
                Ok(Some(Outcome::Watch(Interest::Writable)))
            }
            Method::POST => match request.content_length {
                None => Err(ConnectionError::MissingContentLength),
                Some(0) => {
                    debug!(conn = %self.id, "Subscribed to broadcasts");
                    self.state = ConnectionState::ChatReceiver;
                    Ok(Some(Outcome::Watch(Interest::Idle)))
                }
                Some(content_length) => {
                    self.state = ConnectionState::ChatSender {
                        body_offset: request.body_offset,
                        content_length,
                    };
                    self.on_body_bytes(request.body_offset, content_length, services)
                }
            },
        }
    }

    // Bytes past `content_length` are not part of the message.
    fn on_body_bytes(
        &mut self,
        body_offset: usize,
        content_length: usize,
        services: &mut Services,
    ) -> Result<Option<Outcome>, ConnectionError> {
        let end = body_offset.saturating_add(content_length);
        if end > self.buffer.filled().len() {
            return Ok(None);
        }

        services
            .broadcast
            .append(&self.buffer.filled()[body_offset..end])?;
        services.logs.access(format_args!(
            "{} \"POST /broadcast.service\" {} bytes",
            self.peer, content_length
        ));
        info!(conn = %self.id, bytes = content_length, "Message published");
        Ok(Some(Outcome::Published))
    }

    fn answer_document(&mut self, url: &str, services: &mut Services) -> Result<(), ConnectionError> {
        let now = SystemTime::now();
        self.buffer.reset();

        let source = match services.open_document(url) {
            Ok(file) => {
                self.buffer.append(&header_block(StatusCode::Ok, now))?;
                services
                    .logs
                    .access(format_args!("{} \"GET {}\" 200", self.peer, url));
                file
            }
            Err(e) => {
                let path = services.document_path(url);
                services.logs.error(format_args!(
                    "{} file does not exist: {} ({})",
                    self.peer,
                    path.display(),
                    e
                ));
                services
                    .logs
                    .access(format_args!("{} \"GET {}\" 404", self.peer, url));
                debug!(conn = %self.id, url, error = %e, "Document not found");

                self.buffer.append(&header_block(StatusCode::NotFound, now))?;
                services
                    .open_not_found_page()
                    .map_err(|source| ConnectionError::ErrorDocument {
                        path: services.not_found_page().to_path_buf(),
                        source,
                    })?
            }
        };

        self.state = ConnectionState::OutgoingAnswer {
            source: Some(source),
        };
        Ok(())
    }

    fn send(&mut self) -> Result<Outcome, ConnectionError> {
        loop {
            let ConnectionState::OutgoingAnswer { source } = &mut self.state else {
                return Ok(Outcome::Keep);
            };

            if self.buffer.is_drained() {
                let Some(file) = source else {
                    return Ok(Outcome::Close);
                };
                self.buffer.reset();
                let n = read_file(file, self.buffer.spare_mut()?)?;
                if n == 0 {
                    return Ok(Outcome::Close);
                }
                self.buffer.produce(n);
            }

            match self.stream.write(self.buffer.pending()) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => self.buffer.drain(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Outcome::Keep),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    // Subscribers have nothing to say. A half-closed peer may still be
    // listening, so only a full hang-up ends the subscription.
    fn discard_input(&mut self) -> Result<Outcome, ConnectionError> {
        let mut scratch = [0u8; 512];
        loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => return Ok(Outcome::Keep),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Outcome::Keep),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_chunk(&mut self) -> Result<Received, ConnectionError> {
        loop {
            let spare = self.buffer.spare_mut()?;
            match self.stream.read(spare) {
                Ok(0) => return Ok(Received::Eof),
                Ok(n) => {
                    self.buffer.produce(n);
                    return Ok(Received::Data);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Received::Blocked),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn read_file(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            result => return result,
        }
    }
}
