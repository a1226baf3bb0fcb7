use std::net::SocketAddr;

use bytes::Bytes;

use crate::session::{Session, SessionStore, SESSION_COOKIE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Other(method) => method.as_str(),
        }
    }
}

impl From<&str> for Method {
    fn from(value: &str) -> Self {
        match value {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HttpField {
    pub name: Bytes,
    pub value: Bytes,
}

/// Request line and header fields of a parsed request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: String,
    pub query: Option<String>,
    pub version: Version,
    pub fields: Vec<HttpField>,
}

impl RequestHead {
    /// Value of the first header field named `name`, compared case-insensitively.
    ///
    /// Values that are not valid UTF-8 are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name.as_bytes()))
            .and_then(|field| std::str::from_utf8(&field.value).ok())
    }

    /// Value of the cookie `name` from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let cookies = self.header("cookie")?;

        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.trim())
    }

    /// If the connection should stay open after this request has been answered.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection");
        let has_token = |token: &str| {
            connection
                .map(|value| {
                    value
                        .split(',')
                        .any(|item| item.trim().eq_ignore_ascii_case(token))
                })
                .unwrap_or(false)
        };

        match self.version {
            Version::Http11 => !has_token("close"),
            Version::Http10 => has_token("keep-alive"),
        }
    }
}

/// Read-only view of one parsed request, handed to a [`Handler`](crate::Handler).
pub struct Request<'a> {
    head: &'a RequestHead,
    body: Bytes,
    peer_addr: SocketAddr,
    sessions: &'a mut SessionStore,
    requested_session: Option<String>,
    created_session: Option<String>,
}

impl<'a> Request<'a> {
    pub(crate) fn new(
        head: &'a RequestHead,
        body: Bytes,
        peer_addr: SocketAddr,
        sessions: &'a mut SessionStore,
    ) -> Self {
        let requested_session = head.cookie(SESSION_COOKIE).map(str::to_string);

        Self {
            head,
            body,
            peer_addr,
            sessions,
            requested_session,
            created_session: None,
        }
    }

    /// The request body.
    pub fn read(&self) -> &[u8] {
        &self.body
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// Path part of the request target, without the query string.
    pub fn request_uri(&self) -> &str {
        &self.head.uri
    }

    pub fn query_string(&self) -> Option<&str> {
        self.head.query.as_deref()
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Session id sent by the client, whether or not that session still exists.
    pub fn requested_session_id(&self) -> Option<&str> {
        self.requested_session.as_deref()
    }

    /// The current session.
    ///
    /// If the client did not send a live session id and `create` is set, a new session is
    /// created and the response will carry its cookie.
    pub fn session(&mut self, create: bool) -> Option<&mut Session> {
        let id = match self.current_session_id() {
            Some(id) => id,
            None if create => {
                let id = self.sessions.create();
                self.created_session = Some(id.clone());
                id
            }
            None => return None,
        };

        self.sessions.get_mut(&id)
    }

    /// Remove the current session, if there is one.
    pub fn invalidate_session(&mut self) {
        if let Some(id) = self.current_session_id() {
            self.sessions.remove(&id);
        }

        self.created_session = None;
    }

    /// Id of the session created while handling this request.
    pub(crate) fn created_session(&self) -> Option<&str> {
        self.created_session.as_deref()
    }

    /// Id of the live session this request is associated with.
    pub(crate) fn current_session_id(&mut self) -> Option<String> {
        if let Some(id) = &self.created_session {
            return Some(id.clone());
        }

        let id = self.requested_session.as_ref()?;
        if self.sessions.touch(id) {
            Some(id.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(version: Version, fields: &[(&'static str, &'static str)]) -> RequestHead {
        RequestHead {
            method: Method::Get,
            uri: "/".to_string(),
            query: None,
            version,
            fields: fields
                .iter()
                .map(|(name, value)| HttpField {
                    name: Bytes::from_static(name.as_bytes()),
                    value: Bytes::from_static(value.as_bytes()),
                })
                .collect(),
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let head = head(Version::Http11, &[("Host", "localhost")]);

        assert_eq!(head.header("host"), Some("localhost"));
        assert_eq!(head.header("HOST"), Some("localhost"));
        assert_eq!(head.header("accept"), None);
    }

    #[test]
    fn keep_alive_follows_version_defaults() {
        assert!(head(Version::Http11, &[]).keep_alive());
        assert!(!head(Version::Http11, &[("Connection", "close")]).keep_alive());
        assert!(!head(Version::Http10, &[]).keep_alive());
        assert!(head(Version::Http10, &[("Connection", "Keep-Alive")]).keep_alive());
    }

    #[test]
    fn cookie_is_found_among_others() {
        let head = head(Version::Http11, &[("Cookie", "theme=dark; SESSION=abc ; x=1")]);

        assert_eq!(head.cookie("SESSION"), Some("abc"));
        assert_eq!(head.cookie("theme"), Some("dark"));
        assert_eq!(head.cookie("missing"), None);
    }

    #[test]
    fn session_is_created_on_demand() {
        let head = head(Version::Http11, &[]);
        let mut sessions = SessionStore::default();
        let addr = "127.0.0.1:1".parse().unwrap();

        let mut request = Request::new(&head, Bytes::new(), addr, &mut sessions);
        assert!(request.session(false).is_none());

        let id = request.session(true).unwrap().id().to_string();
        assert_eq!(request.created_session(), Some(id.as_str()));
        assert_eq!(request.session(false).unwrap().id(), id);
    }

    #[test]
    fn requested_session_is_reused() {
        let mut sessions = SessionStore::default();
        let id = sessions.create();
        let cookie = format!("SESSION={}", id);
        let mut head = head(Version::Http11, &[]);
        head.fields.push(HttpField {
            name: Bytes::from_static(b"Cookie"),
            value: Bytes::from(cookie),
        });
        let addr = "127.0.0.1:1".parse().unwrap();

        let mut request = Request::new(&head, Bytes::new(), addr, &mut sessions);
        assert_eq!(request.requested_session_id(), Some(id.as_str()));
        assert_eq!(request.session(true).unwrap().id(), id);
        assert!(request.created_session().is_none());

        request.invalidate_session();
        assert!(request.session(false).is_none());
    }
}
