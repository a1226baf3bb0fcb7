use std::{
    io::{ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr},
};

use anyhow::{bail, Error};
use bytes::{Buf, Bytes, BytesMut};
use mio::{net::TcpStream, Interest, Registry, Token};
use tracing::{event, Level};

use crate::{
    parser::{HttpParser, ParseError, ParsedRequest},
    request::Method,
    session::{SessionStore, SESSION_COOKIE},
    Handler, Request, Response,
};

/// What the event loop should do with a connection after it has been serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Open,
    Closed,
}

/// Collaborators a connection dispatches complete requests to.
pub(crate) struct Dispatch<'a> {
    pub handler: &'a mut dyn Handler,
    pub sessions: &'a mut SessionStore,
}

/// One accepted client socket.
pub(crate) struct Connection {
    stream: TcpStream,
    token: Token,
    peer_addr: SocketAddr,

    parser: HttpParser,
    outbound: BytesMut,
    session: Option<String>,

    /// No further requests are read, the connection ends once `outbound` is flushed.
    closing: bool,
    write_interest: bool,
}

impl Connection {
    /// Wrap an accepted stream and register it for read readiness.
    pub fn open(
        registry: &Registry,
        mut stream: TcpStream,
        token: Token,
        peer_addr: SocketAddr,
    ) -> Result<Self, Error> {
        registry.register(&mut stream, token, Interest::READABLE)?;

        let this = Self {
            stream,
            token,
            peer_addr,

            parser: HttpParser::default(),
            outbound: BytesMut::new(),
            session: None,

            closing: false,
            write_interest: false,
        };
        Ok(this)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Id of the last session used by a request on this connection.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Read everything available, dispatching each request as soon as it is complete.
    ///
    /// `buffer` is scratch space shared by all connections. Data is copied out of it before
    /// it is parsed, so nothing in it survives this call.
    pub fn on_readable(
        &mut self,
        registry: &Registry,
        buffer: &mut [u8],
        dispatch: &mut Dispatch,
    ) -> Result<Status, Error> {
        while !self.closing {
            match self.stream.read(buffer) {
                // Read of zero means the peer has finished sending, answers to requests already
                // dispatched still need to be written
                Ok(0) => {
                    event!(Level::DEBUG, peer = ?self.peer_addr, "end of stream");
                    self.closing = true;
                    break;
                }
                Ok(len) => {
                    event!(Level::TRACE, bytes = len, "received data");

                    let mut data = Bytes::copy_from_slice(&buffer[..len]);
                    self.receive(&mut data, dispatch);
                }
                Err(error) => match error.kind() {
                    ErrorKind::WouldBlock => break,
                    ErrorKind::Interrupted => continue,
                    _ => return Err(error.into()),
                },
            }
        }

        self.flush(registry)
    }

    pub fn on_writable(&mut self, registry: &Registry) -> Result<Status, Error> {
        self.flush(registry)
    }

    /// Deregister and shut down the socket, it's closed when the connection is dropped.
    pub fn close(&mut self, registry: &Registry) {
        if let Err(error) = registry.deregister(&mut self.stream) {
            event!(Level::TRACE, ?error, "failed to deregister stream");
        }

        // Fails if the peer already went away, which is fine
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn receive(&mut self, data: &mut Bytes, dispatch: &mut Dispatch) {
        while !data.is_empty() && !self.closing {
            match self.parser.consume(data) {
                Ok(Some(request)) => self.dispatch(request, dispatch),
                Ok(None) => {}
                Err(error) => self.reject(error),
            }
        }
    }

    fn dispatch(&mut self, parsed: ParsedRequest, dispatch: &mut Dispatch) {
        let ParsedRequest { head, body } = parsed;
        event!(
            Level::DEBUG,
            method = head.method.as_str(),
            uri = head.uri.as_str(),
            "received request"
        );

        let keep_alive = head.keep_alive();
        let mut response = Response::new();
        let mut request = Request::new(&head, body, self.peer_addr, dispatch.sessions);

        match &head.method {
            Method::Get => dispatch.handler.do_get(&mut request, &mut response),
            Method::Post => dispatch.handler.do_post(&mut request, &mut response),
            Method::Other(_) => {
                response = Response::error(405);
                response.set_header("Allow", "GET, POST");
            }
        }

        if let Some(id) = request.created_session() {
            let cookie = format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, id);
            response.set_header("Set-Cookie", cookie);
        }

        if let Some(id) = request.current_session_id() {
            self.session = Some(id);
        }

        if !keep_alive {
            response.set_header("Connection", "close");
            self.closing = true;
        }

        event!(Level::DEBUG, status = response.status(), "sending response");
        response.encode(&mut self.outbound);
    }

    /// Answer a request that could not be parsed, then stop reading.
    fn reject(&mut self, error: ParseError) {
        event!(Level::DEBUG, peer = ?self.peer_addr, %error, "rejecting request");

        let mut response = Response::error(error.status());
        response.set_header("Connection", "close");
        response.encode(&mut self.outbound);

        self.closing = true;
    }

    /// Write as much pending data as the socket accepts.
    ///
    /// Keeps write interest registered for as long as data is pending.
    fn flush(&mut self, registry: &Registry) -> Result<Status, Error> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => bail!("failed to write to stream"),
                Ok(len) => self.outbound.advance(len),
                Err(error) => match error.kind() {
                    ErrorKind::WouldBlock => break,
                    ErrorKind::Interrupted => continue,
                    _ => return Err(error.into()),
                },
            }
        }

        let pending = !self.outbound.is_empty();
        if pending != self.write_interest {
            let interest = if pending {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            registry.reregister(&mut self.stream, self.token, interest)?;
            self.write_interest = pending;
        }

        if self.closing && !pending {
            return Ok(Status::Closed);
        }

        Ok(Status::Open)
    }
}
