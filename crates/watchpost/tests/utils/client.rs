use std::{
    io::{ErrorKind, Read, Write},
    net::TcpStream,
    time::Duration,
};

use anyhow::{bail, Context as _, Error};
use watchpost::Server;

pub struct TestResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("<binary>")
    }
}

pub fn given_client(server: &Server) -> Result<TcpStream, Error> {
    let stream = TcpStream::connect(server.local_addr()).context("failed to connect")?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_nodelay(true)?;

    Ok(stream)
}

pub fn when_sent(stream: &mut TcpStream, data: &[u8]) -> Result<(), Error> {
    stream.write_all(data)?;
    stream.flush()?;
    Ok(())
}

/// Read exactly one response from the stream.
pub fn then_response(stream: &mut TcpStream) -> Result<TestResponse, Error> {
    let mut data = Vec::new();
    let mut byte = [0; 1];

    // Read the head byte by byte, so nothing past this response is consumed
    while !data.ends_with(b"\r\n\r\n") {
        let len = stream.read(&mut byte)?;
        if len == 0 {
            bail!("stream closed before response head was complete");
        }
        data.push(byte[0]);
    }

    let head = String::from_utf8(data)?;
    let mut lines = head.split("\r\n").filter(|line| !line.is_empty());

    let status_line = lines.next().context("missing status line")?;
    let status = status_line
        .split(' ')
        .nth(1)
        .context("missing status code")?
        .parse()?;

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();

    let length: usize = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .context("missing content length")?
        .1
        .parse()?;

    let mut body = vec![0; length];
    stream.read_exact(&mut body)?;

    Ok(TestResponse {
        status,
        headers,
        body,
    })
}

/// Assert the server has closed the stream.
pub fn then_closed(stream: &mut TcpStream) {
    let mut buffer = [0; 64];

    match stream.read(&mut buffer) {
        Ok(0) => {}
        Ok(len) => panic!("expected closed stream, received {} bytes", len),
        Err(error) => assert!(
            !matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
            "stream was not closed"
        ),
    }
}
