use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use anyhow::Error;
use mio::{net::TcpListener, net::TcpStream, Events, Poll, Token};
use tracing::{event, instrument, Level};

use crate::{
    connection::{Connection, Dispatch, Status},
    server::Shared,
    session::SessionStore,
    Handler,
};

pub(crate) const LISTENER: Token = Token(0);
pub(crate) const WAKER: Token = Token(1);

/// Size of the scratch buffer reads go through.
const BUFFER_SIZE: usize = 2048;

/// How long to wait before accepting again after accept failed.
///
/// Readiness is edge-triggered, streams left in the backlog by a failed accept don't produce
/// another event on their own.
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

/// Single-threaded accept/read loop of one server.
pub(crate) struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    shared: Arc<Shared>,
    handler: Box<dyn Handler>,
    sessions: SessionStore,

    /// Live connections, keyed by their registration token.
    connections: HashMap<Token, Connection>,
    /// Tokens are never reused, a stale token can't reach a newer connection.
    next_token: usize,
    buffer: Box<[u8]>,
    /// Accept failed and the backlog may still hold streams.
    accept_stalled: bool,
}

impl EventLoop {
    pub fn new(
        poll: Poll,
        listener: TcpListener,
        shared: Arc<Shared>,
        handler: Box<dyn Handler>,
    ) -> Self {
        Self {
            poll,
            listener,
            shared,
            handler,
            sessions: SessionStore::default(),

            connections: HashMap::new(),
            next_token: WAKER.0 + 1,
            buffer: vec![0; BUFFER_SIZE].into_boxed_slice(),
            accept_stalled: false,
        }
    }

    #[instrument("http-event-loop", skip_all)]
    pub fn run(mut self) {
        event!(Level::DEBUG, "event loop started");

        let mut events = Events::with_capacity(128);
        while !self.shared.is_closed() {
            let timeout = self.accept_stalled.then_some(ACCEPT_RETRY);
            if let Err(error) = self.poll.poll(&mut events, timeout) {
                if error.kind() != ErrorKind::Interrupted {
                    event!(Level::ERROR, ?error, "failed to poll");
                }
                continue;
            }

            if self.accept_stalled {
                self.on_listener_ready();
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.on_listener_ready(),
                    WAKER => event!(Level::TRACE, "woken"),
                    token => {
                        let readable =
                            event.is_readable() || event.is_read_closed() || event.is_error();
                        self.on_connection_ready(token, readable, event.is_writable());
                    }
                }
            }
        }

        self.shutdown();
    }

    fn on_listener_ready(&mut self) {
        self.accept_stalled = false;

        // Accept any pending streams
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    if let Err(error) = self.open_connection(stream, peer_addr) {
                        event!(Level::WARN, ?peer_addr, ?error, "failed to open connection");
                    }
                }
                Err(error) => match error.kind() {
                    ErrorKind::WouldBlock => break,
                    ErrorKind::Interrupted => continue,
                    _ => {
                        // For example out of file descriptors, retried after a delay
                        event!(Level::WARN, ?error, "failed to accept stream");
                        self.accept_stalled = true;
                        break;
                    }
                },
            }
        }
    }

    fn open_connection(&mut self, stream: TcpStream, peer_addr: SocketAddr) -> Result<(), Error> {
        let token = Token(self.next_token);
        self.next_token += 1;

        // On failure the stream is dropped here, which closes it
        let connection = Connection::open(self.poll.registry(), stream, token, peer_addr)?;
        self.connections.insert(token, connection);
        self.update_count();

        event!(Level::DEBUG, ?peer_addr, count = self.connections.len(), "stream accepted");

        Ok(())
    }

    fn on_connection_ready(&mut self, token: Token, readable: bool, writable: bool) {
        let Some(connection) = self.connections.get_mut(&token) else {
            event!(Level::TRACE, ?token, "ready event for closed connection");
            return;
        };

        let registry = self.poll.registry();
        let mut result = Ok(Status::Open);

        if readable {
            let mut dispatch = Dispatch {
                handler: self.handler.as_mut(),
                sessions: &mut self.sessions,
            };
            result = connection.on_readable(registry, &mut self.buffer, &mut dispatch);
        }

        if writable && matches!(result, Ok(Status::Open)) {
            result = connection.on_writable(registry);
        }

        match result {
            Ok(Status::Open) => {}
            Ok(Status::Closed) => self.close_request(token),
            Err(error) => {
                event!(Level::WARN, ?error, "connection failed");
                self.close_request(token);
            }
        }
    }

    /// Tear down a connection: close its socket and remove it from the registry.
    ///
    /// Does nothing if the connection was already removed.
    fn close_request(&mut self, token: Token) {
        let Some(mut connection) = self.connections.remove(&token) else {
            return;
        };

        connection.close(self.poll.registry());
        self.update_count();

        event!(
            Level::DEBUG,
            peer_addr = ?connection.peer_addr(),
            session = connection.session(),
            count = self.connections.len(),
            "connection closed"
        );
    }

    fn update_count(&self) {
        self.shared
            .connections
            .store(self.connections.len(), Ordering::SeqCst);
    }

    fn shutdown(mut self) {
        event!(
            Level::DEBUG,
            connections = self.connections.len(),
            sessions = self.sessions.len(),
            "shutting down"
        );

        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close_request(token);
        }

        if let Err(error) = self.poll.registry().deregister(&mut self.listener) {
            event!(Level::WARN, ?error, "failed to deregister listener");
        }

        // Dropping the loop releases the listening socket and the poll instance
        event!(Level::DEBUG, "event loop stopped");
    }
}

