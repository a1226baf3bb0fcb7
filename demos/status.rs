use std::time::Instant;

use anyhow::Error;
use serde_json::json;
use tracing::{event, Level};
use watchpost::{Config, Handler, Request, Response, Server};

fn main() -> Result<(), Error> {
    devutils::init_logging();

    // Config can be passed as JSON, for example `{"ip": "0.0.0.0", "tcp": 2014}`
    let config = match std::env::args().nth(1) {
        Some(text) => Config::from_json(&text)?,
        None => Config::new().with("ip", "127.0.0.1"),
    };

    let mut server = Server::open(config, StatusServer::default())?;
    event!(Level::INFO, addr = ?server.local_addr(), "serving");

    server.join()?;

    Ok(())
}

#[derive(Default)]
struct StatusServer {
    name: String,
    started: Option<Instant>,
    requests: u64,
}

impl Handler for StatusServer {
    fn init(&mut self, config: &Config) -> Result<(), Error> {
        self.name = config
            .get("name")
            .and_then(|name| name.as_str())
            .unwrap_or("watchpost")
            .to_string();
        self.started = Some(Instant::now());

        Ok(())
    }

    fn do_get(&mut self, request: &mut Request, response: &mut Response) {
        self.requests += 1;

        if request.request_uri() != "/status" {
            *response = Response::error(404);
            return;
        }

        let uptime = self.started.map(|started| started.elapsed().as_secs());
        let visits = request.session(true).map(|session| {
            let visits = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
            session.set("visits", visits);
            visits
        });

        let body = json!({
            "name": self.name,
            "uptime": uptime,
            "requests": self.requests,
            "visits": visits,
        });
        response
            .set_header("Content-Type", "application/json")
            .set_body(body.to_string());
    }

    fn do_post(&mut self, request: &mut Request, response: &mut Response) {
        self.requests += 1;

        // Echo the body back
        let content_type = request
            .header("content-type")
            .unwrap_or("application/octet-stream")
            .to_string();
        response
            .set_header("Content-Type", content_type)
            .append(request.read());
    }
}
