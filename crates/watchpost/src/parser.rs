use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::request::{HttpField, Method, RequestHead, Version};

/// Maximum size of the request line and header fields together.
pub const HEAD_LIMIT: usize = 8 * 1024;

/// Maximum size of a request body.
pub const BODY_LIMIT: usize = 1024 * 1024;

/// Incremental HTTP/1.x request parser.
///
/// Data may arrive split at any point, the parser keeps what it has seen so far until a full
/// request is available.
pub struct HttpParser {
    data: BytesMut,
    has_cr: bool,
    last_line: usize,
    lines: Vec<usize>,
    state: State,
}

enum State {
    Head,
    Body {
        head: RequestHead,
        body: BytesMut,
        remaining: usize,
    },
}

/// A complete request.
#[derive(Debug)]
pub struct ParsedRequest {
    pub head: RequestHead,
    pub body: Bytes,
}

impl Default for HttpParser {
    fn default() -> Self {
        Self {
            data: BytesMut::new(),
            has_cr: false,
            last_line: 0,
            lines: Vec::new(),
            state: State::Head,
        }
    }
}

impl HttpParser {
    /// Consume bytes into the parser.
    ///
    /// Suspends and returns when a full request has been parsed, trimming `bytes` of the
    /// consumed data. Returns `None` once all of `bytes` has been consumed without completing
    /// a request.
    pub fn consume(&mut self, bytes: &mut Bytes) -> Result<Option<ParsedRequest>, ParseError> {
        loop {
            match std::mem::replace(&mut self.state, State::Head) {
                State::Head => {
                    let Some(head) = self.consume_head(bytes)? else {
                        return Ok(None);
                    };

                    let length = content_length(&head)?;
                    if length == 0 {
                        let request = ParsedRequest {
                            head,
                            body: Bytes::new(),
                        };
                        return Ok(Some(request));
                    }

                    self.state = State::Body {
                        head,
                        // Grows with the data actually received, not the announced length
                        body: BytesMut::new(),
                        remaining: length,
                    };
                }
                State::Body {
                    head,
                    mut body,
                    mut remaining,
                } => {
                    let available = remaining.min(bytes.len());
                    body.put(bytes.split_to(available));
                    remaining -= available;

                    if remaining > 0 {
                        self.state = State::Body {
                            head,
                            body,
                            remaining,
                        };
                        return Ok(None);
                    }

                    let request = ParsedRequest {
                        head,
                        body: body.freeze(),
                    };
                    return Ok(Some(request));
                }
            }
        }
    }

    fn consume_head(&mut self, bytes: &mut Bytes) -> Result<Option<RequestHead>, ParseError> {
        for (i, byte) in bytes.iter().enumerate() {
            match *byte {
                // CRNL is the required newline, so consume CR if it happens
                b'\r' => {
                    self.has_cr = true;
                }
                b'\n' => {
                    // Standalone \n is handled the same as CRNL
                    let header_done = self.handle_line();
                    self.has_cr = false;

                    if header_done {
                        bytes.advance(i + 1);

                        let head = self.take_head()?;
                        return Ok(Some(head));
                    }
                }
                _ => {
                    // CR with no NL needs to be counted as a space
                    if self.has_cr {
                        self.data.put_u8(b' ');
                    }

                    self.data.put_u8(*byte);
                    self.has_cr = false;
                }
            }

            if self.data.len() > HEAD_LIMIT {
                return Err(ParseError::HeadTooLarge);
            }
        }

        bytes.advance(bytes.len());
        Ok(None)
    }

    fn handle_line(&mut self) -> bool {
        let line = &self.data[self.last_line..];

        if line.is_empty() {
            // Empty lines before the request line are ignored
            return !self.lines.is_empty();
        }

        self.lines.push(line.len());
        self.last_line = self.data.len();

        false
    }

    /// Take the data and return it as an assembled head.
    ///
    /// Clears all currently pending data.
    fn take_head(&mut self) -> Result<RequestHead, ParseError> {
        let data = std::mem::take(&mut self.data);
        let mut data = data.freeze();
        let lines = std::mem::take(&mut self.lines);

        self.has_cr = false;
        self.last_line = 0;

        let mut lines = lines.into_iter().map(|length| data.split_to(length));

        let request_line = lines.next().ok_or(ParseError::InvalidRequestLine)?;
        let (method, uri, query, version) = parse_request_line(&request_line)?;

        let fields = lines.map(parse_field).collect::<Result<Vec<_>, _>>()?;

        let head = RequestHead {
            method,
            uri,
            query,
            version,
            fields,
        };
        Ok(head)
    }
}

fn parse_request_line(
    line: &[u8],
) -> Result<(Method, String, Option<String>, Version), ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidRequestLine)?;

    let mut parts = line.split(' ').filter(|part| !part.is_empty());
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidRequestLine);
    };

    if !method.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(ParseError::InvalidRequestLine);
    }

    let version = match version {
        "HTTP/1.1" => Version::Http11,
        "HTTP/1.0" => Version::Http10,
        _ if version.starts_with("HTTP/") => {
            return Err(ParseError::UnsupportedVersion(version.to_string()))
        }
        _ => return Err(ParseError::InvalidRequestLine),
    };

    let (uri, query) = match target.split_once('?') {
        Some((uri, query)) => (uri.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    };

    Ok((Method::from(method), uri, query, version))
}

fn parse_field(line: Bytes) -> Result<HttpField, ParseError> {
    let split = line
        .iter()
        .position(|ch| *ch == b':')
        .ok_or(ParseError::InvalidField)?;

    let mut value = line.clone();
    let name = value.split_to(split);
    value.advance(1);

    if name.is_empty() || name.iter().any(|ch| ch.is_ascii_whitespace()) {
        return Err(ParseError::InvalidField);
    }

    Ok(HttpField {
        name,
        value: trim(value),
    })
}

fn trim(mut value: Bytes) -> Bytes {
    let start = value
        .iter()
        .position(|ch| !ch.is_ascii_whitespace())
        .unwrap_or(value.len());
    value.advance(start);

    let end = value
        .iter()
        .rposition(|ch| !ch.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    value.truncate(end);

    value
}

fn content_length(head: &RequestHead) -> Result<usize, ParseError> {
    if head.header("transfer-encoding").is_some() {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    let Some(value) = head.header("content-length") else {
        return Ok(0);
    };

    let length = value
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidContentLength)?;

    if length > BODY_LIMIT {
        return Err(ParseError::BodyTooLarge);
    }

    Ok(length)
}

/// Reasons a request could not be parsed.
///
/// All of these end the connection, after the matching error response has been sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("malformed header field")]
    InvalidField,
    #[error("invalid content length")]
    InvalidContentLength,
    #[error("unsupported HTTP version {0}")]
    UnsupportedVersion(String),
    #[error("transfer encodings are not supported")]
    UnsupportedTransferEncoding,
    #[error("request head is too large")]
    HeadTooLarge,
    #[error("request body is too large")]
    BodyTooLarge,
}

impl ParseError {
    /// Status code to answer this error with.
    pub fn status(&self) -> u16 {
        match self {
            ParseError::InvalidRequestLine
            | ParseError::InvalidField
            | ParseError::InvalidContentLength => 400,
            ParseError::UnsupportedVersion(_) => 505,
            ParseError::UnsupportedTransferEncoding => 501,
            ParseError::HeadTooLarge => 431,
            ParseError::BodyTooLarge => 413,
        }
    }
}
