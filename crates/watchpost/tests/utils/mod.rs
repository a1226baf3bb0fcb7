mod client;
mod handler;

use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::Error;
use watchpost::{Config, Server};

pub use self::{
    client::{given_client, then_closed, then_response, when_sent},
    handler::{Calls, RecordingHandler, LARGE_BODY_SIZE},
};

pub fn local_config() -> Config {
    Config::new().with("ip", "127.0.0.1").with("tcp", 0)
}

pub fn given_server() -> Result<(Server, Calls), Error> {
    let handler = RecordingHandler::default();
    let calls = handler.calls();
    let server = Server::open(local_config(), handler)?;

    Ok((server, calls))
}

/// Poll `condition` until it holds, or give up after a few seconds.
pub fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }

    condition()
}

pub fn then_connection_size(server: &Server, expected: usize) {
    let reached = wait_until(|| server.connection_size() == expected);
    assert!(
        reached,
        "expected {} connections, found {}",
        expected,
        server.connection_size()
    );
}
