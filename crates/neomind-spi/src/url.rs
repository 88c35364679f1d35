//! Runtime context consumed by adaptive dispatch and active selection.
//!
//! Anything exposing string key/value lookup plus a protocol accessor can
//! drive extension selection. [`Url`] is the canonical carrier; plain string
//! maps work too, with the `protocol` entry standing in for the scheme.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Key whose lookup reads the protocol accessor instead of a parameter.
pub const PROTOCOL_KEY: &str = "protocol";

/// Key/value view over a runtime context.
pub trait Context {
    /// The protocol (scheme) of the context, if any.
    fn protocol(&self) -> Option<&str>;

    /// Look up a parameter by key.
    fn parameter(&self, key: &str) -> Option<&str>;

    /// All parameters, in a stable order.
    fn parameters(&self) -> Vec<(&str, &str)>;

    /// Human-readable rendering used in error messages.
    fn describe(&self) -> String;

    /// Look up a method-scoped parameter (`method.key`), falling back to `key`.
    fn method_parameter(&self, method: &str, key: &str) -> Option<&str> {
        self.parameter(&format!("{}.{}", method, key))
            .filter(|v| !v.is_empty())
            .or_else(|| self.parameter(key))
    }
}

/// URL parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("url is empty")]
    Empty,

    #[error("url {0} has no protocol")]
    MissingProtocol(String),

    #[error("invalid port in url {0}")]
    InvalidPort(String),
}

/// A service URL: `protocol://host:port/path?key=value&...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    protocol: String,
    host: String,
    port: Option<u16>,
    path: String,
    parameters: BTreeMap<String, String>,
}

impl Url {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into().trim_start_matches('/').to_string();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parse(s: &str) -> Result<Self, UrlError> {
        s.parse()
    }
}

impl FromStr for Url {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(UrlError::Empty);
        }

        let (rest, query) = match s.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (s, None),
        };

        let mut parameters = BTreeMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some((k, v)) => parameters.insert(k.trim().to_string(), v.trim().to_string()),
                    None => parameters.insert(pair.trim().to_string(), pair.trim().to_string()),
                };
            }
        }

        let (protocol, rest) = rest
            .split_once("://")
            .filter(|(p, _)| !p.is_empty())
            .ok_or_else(|| UrlError::MissingProtocol(s.to_string()))?;

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        };
        // Credentials are not part of the selection context.
        let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| UrlError::InvalidPort(s.to_string()))?;
                (host, Some(port))
            }
            None => (authority, None),
        };

        Ok(Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            parameters,
        })
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        for (i, (k, v)) in self.parameters.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, k, v)?;
        }
        Ok(())
    }
}

impl Context for Url {
    fn protocol(&self) -> Option<&str> {
        Some(self.protocol.as_str()).filter(|p| !p.is_empty())
    }

    fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    fn parameters(&self) -> Vec<(&str, &str)> {
        self.parameters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl Context for HashMap<String, String> {
    fn protocol(&self) -> Option<&str> {
        self.get(PROTOCOL_KEY).map(String::as_str)
    }

    fn parameter(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }

    fn parameters(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<_> = self.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        entries.sort_unstable();
        entries
    }

    fn describe(&self) -> String {
        format!("{:?}", self.parameters())
    }
}

impl Context for BTreeMap<String, String> {
    fn protocol(&self) -> Option<&str> {
        self.get(PROTOCOL_KEY).map(String::as_str)
    }

    fn parameter(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }

    fn parameters(&self) -> Vec<(&str, &str)> {
        self.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}
