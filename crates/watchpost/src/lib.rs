//! Minimal embeddable HTTP listener.
//!
//! A [`Server`] owns one listening socket and multiplexes all of its client connections on a
//! single dedicated thread, using mio readiness events. Complete requests are dispatched to
//! the [`Handler`] the server was opened with.
//!
//! ```no_run
//! use watchpost::{Config, Handler, Request, Response, Server};
//!
//! struct Hello;
//!
//! impl Handler for Hello {
//!     fn do_get(&mut self, _request: &mut Request, response: &mut Response) {
//!         response.set_body("Hello, World!");
//!     }
//!
//!     fn do_post(&mut self, request: &mut Request, response: &mut Response) {
//!         response.append(request.read());
//!     }
//! }
//!
//! # fn main() -> Result<(), anyhow::Error> {
//! let config = Config::new().with("tcp", 8080);
//! let mut server = Server::open(config, Hello)?;
//! server.join()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod event_loop;
mod handler;
mod parser;
mod request;
mod response;
mod server;
mod session;

pub use self::{
    config::{Config, ConfigError, DEFAULT_IP, DEFAULT_TCP},
    handler::Handler,
    parser::{ParseError, BODY_LIMIT, HEAD_LIMIT},
    request::{HttpField, Method, Request, RequestHead, Version},
    response::{reason, Response},
    server::{CloseHandle, Server},
    session::{Session, DEFAULT_SESSION_TIMEOUT, SESSION_COOKIE},
};
