use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
};

use serde_json::{Map, Value};
use thiserror::Error;

/// Listen address used when the config has no `ip` key.
pub const DEFAULT_IP: &str = "0.0.0.0";

/// Listen port used when the config has no `tcp` key.
pub const DEFAULT_TCP: u16 = 2014;

/// Key-value server configuration.
///
/// The server itself only reads `ip` and `tcp`. Every other key is kept as-is and handed to
/// [`Handler::init`](crate::Handler::init), so a concrete server can keep its own settings in
/// the same document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    values: Map<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from JSON text, which must contain an object.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The configured listen host, or [`DEFAULT_IP`].
    pub fn ip(&self) -> Result<&str, ConfigError> {
        match self.values.get("ip") {
            None => Ok(DEFAULT_IP),
            Some(Value::String(ip)) => Ok(ip.as_str()),
            Some(_) => Err(ConfigError::InvalidType("ip")),
        }
    }

    /// The configured listen port, or [`DEFAULT_TCP`].
    ///
    /// Numeric strings are accepted as well as numbers.
    pub fn tcp(&self) -> Result<u16, ConfigError> {
        let port = match self.values.get("tcp") {
            None => return Ok(DEFAULT_TCP),
            Some(Value::Number(number)) => number
                .as_u64()
                .ok_or_else(|| ConfigError::InvalidPort(number.to_string()))?,
            Some(Value::String(text)) => text
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidPort(text.clone()))?,
            Some(_) => return Err(ConfigError::InvalidType("tcp")),
        };

        u16::try_from(port).map_err(|_| ConfigError::InvalidPort(port.to_string()))
    }

    /// Resolve `ip` and `tcp` into the address to bind.
    ///
    /// Host names are resolved, the first resulting address is used.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self.ip()?;
        let port = self.tcp()?;

        let mut addrs = (ip, port)
            .to_socket_addrs()
            .map_err(|source| ConfigError::Resolve {
                host: ip.to_string(),
                source,
            })?;

        addrs
            .next()
            .ok_or_else(|| ConfigError::Unresolved(ip.to_string()))
    }

    /// Write the defaults for missing keys into the config itself.
    pub(crate) fn apply_defaults(&mut self) {
        if !self.contains("ip") {
            self.values.insert("ip".into(), DEFAULT_IP.into());
        }

        if !self.contains("tcp") {
            self.values.insert("tcp".into(), DEFAULT_TCP.into());
        }
    }
}

impl From<Map<String, Value>> for Config {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),
    #[error("config must be an object")]
    NotAnObject,
    #[error("config key `{0}` has an invalid type")]
    InvalidType(&'static str),
    #[error("invalid port `{0}`")]
    InvalidPort(String),
    #[error("failed to resolve `{host}`")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("`{0}` did not resolve to any address")]
    Unresolved(String),
}
