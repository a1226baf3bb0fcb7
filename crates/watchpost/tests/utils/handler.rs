use std::sync::{Arc, Mutex};

use anyhow::{bail, Error};
use watchpost::{Config, Handler, Request, Response};

pub const LARGE_BODY_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub uri: String,
    pub query: Option<String>,
    pub host: Option<String>,
    pub body: Vec<u8>,
    pub requested_session: Option<String>,
}

#[derive(Clone, Default)]
pub struct Calls {
    inner: Arc<Mutex<Vec<Recorded>>>,
}

impl Calls {
    pub fn all(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    fn push(&self, recorded: Recorded) {
        self.inner.lock().unwrap().push(recorded);
    }
}

/// Handler recording every call it receives.
///
/// `GET` answers with the request URI as body, `POST` echoes the request body. A few paths
/// have special behavior: `/session` counts visits in the session, `/large` answers with
/// [`LARGE_BODY_SIZE`] bytes.
#[derive(Default)]
pub struct RecordingHandler {
    calls: Calls,
    fail_init: bool,
    config: Arc<Mutex<Option<Config>>>,
}

impl RecordingHandler {
    pub fn failing() -> Self {
        Self {
            fail_init: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.clone()
    }

    /// Config the handler was initialized with.
    pub fn config(&self) -> Arc<Mutex<Option<Config>>> {
        self.config.clone()
    }

    fn record(&self, request: &Request) {
        self.calls.push(Recorded {
            method: request.method().as_str().to_string(),
            uri: request.request_uri().to_string(),
            query: request.query_string().map(str::to_string),
            host: request.header("host").map(str::to_string),
            body: request.read().to_vec(),
            requested_session: request.requested_session_id().map(str::to_string),
        });
    }
}

impl Handler for RecordingHandler {
    fn init(&mut self, config: &Config) -> Result<(), Error> {
        if self.fail_init {
            bail!("intentional init failure");
        }

        *self.config.lock().unwrap() = Some(config.clone());
        Ok(())
    }

    fn do_get(&mut self, request: &mut Request, response: &mut Response) {
        self.record(request);

        let uri = request.request_uri().to_string();
        match uri.as_str() {
            "/session" => {
                let session = request.session(true).expect("session created");
                let visits = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
                session.set("visits", visits);

                response.set_body(visits.to_string());
            }
            "/large" => {
                response.set_body(vec![b'x'; LARGE_BODY_SIZE]);
            }
            _ => {
                response
                    .set_header("Content-Type", "text/plain")
                    .set_body(uri.clone());
            }
        }
    }

    fn do_post(&mut self, request: &mut Request, response: &mut Response) {
        self.record(request);

        let body = request.read().to_vec();
        response.set_status(201).set_body(body);
    }
}
