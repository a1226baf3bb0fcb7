use std::io;

use bytes::{BufMut, Bytes, BytesMut};

/// Response sink a [`Handler`](crate::Handler) writes into.
///
/// Nothing is sent until the handler returns, the connection then encodes the response and
/// writes it to its socket.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: BytesMut,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: BytesMut::new(),
        }
    }

    /// An error response with the reason phrase as a plain text body.
    pub fn error(status: u16) -> Self {
        let mut response = Self::new();
        response
            .set_status(status)
            .set_header("Content-Type", "text/plain")
            .append(reason(status).as_bytes());
        response
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set a header, replacing any existing header with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();

        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }

        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body.clear();
        self.body.put(body.into());
        self
    }

    /// Append data to the body.
    pub fn append(&mut self, data: &[u8]) -> &mut Self {
        self.body.put_slice(data);
        self
    }

    /// Encode as HTTP/1.1 into `out`.
    ///
    /// `Content-Length` is always derived from the body.
    pub(crate) fn encode(&self, out: &mut BytesMut) {
        out.put(&b"HTTP/1.1 "[..]);
        out.put(self.status.to_string().as_bytes());
        out.put_u8(b' ');
        out.put(reason(self.status).as_bytes());
        out.put(&b"\r\n"[..]);

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }

            out.put(name.as_bytes());
            out.put(&b": "[..]);
            out.put(value.as_bytes());
            out.put(&b"\r\n"[..]);
        }

        out.put(&b"Content-Length: "[..]);
        out.put(self.body.len().to_string().as_bytes());
        out.put(&b"\r\n\r\n"[..]);
        out.put(&self.body[..]);
    }
}

impl io::Write for Response {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Standard reason phrase for a status code.
pub fn reason(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}
