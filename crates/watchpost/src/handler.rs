use anyhow::Error;

use crate::{Config, Request, Response};

/// Extension points a concrete server supplies.
///
/// The handler is moved onto the listener thread and every call happens there, one request
/// at a time. A handler that blocks stalls every other connection of the server.
pub trait Handler: Send + 'static {
    /// One-time setup, called after the socket is bound and before the event loop starts.
    ///
    /// `config` has the `ip` and `tcp` defaults filled in. Returning an error aborts
    /// [`Server::open`](crate::Server::open).
    fn init(&mut self, config: &Config) -> Result<(), Error> {
        let _ = config;
        Ok(())
    }

    /// Handle a complete `GET` request.
    ///
    /// The full response must be written to `response` before returning.
    fn do_get(&mut self, request: &mut Request, response: &mut Response);

    /// Handle a complete `POST` request.
    fn do_post(&mut self, request: &mut Request, response: &mut Response);
}
