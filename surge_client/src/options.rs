//! Connection options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Username/password pair sent with every request
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection pool bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Connections opened eagerly when the session starts
    pub min_connections: usize,
    /// Maximum connections dispatching requests at once
    pub max_connections: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_connections: 8,
            max_connections: 12,
        }
    }
}

/// How payload bytes are put on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transcoding {
    /// Bytes are sent untouched
    #[default]
    Raw,
    /// Payload is parsed as JSON and re-serialized
    Json,
}

/// How the endpoint host name is resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "addrs", rename_all = "snake_case")]
pub enum DnsResolution {
    /// Use the system resolver
    #[default]
    System,
    /// Pin the endpoint host to fixed addresses, skipping DNS
    Static(Vec<SocketAddr>),
}

/// Options passed through to the connector when a session is opened
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub endpoint: String,
    pub credentials: Credentials,
    pub pool: PoolOptions,
    /// Operations allowed to wait for a free connection before new writes
    /// are rejected as overloaded
    pub send_queue_capacity: usize,
    pub transcoding: Transcoding,
    pub dns: DnsResolution,
    pub connect_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    pub fn with_transcoding(mut self, transcoding: Transcoding) -> Self {
        self.transcoding = transcoding;
        self
    }

    pub fn with_dns(mut self, dns: DnsResolution) -> Self {
        self.dns = dns;
        self
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8091".to_string(),
            credentials: Credentials::default(),
            pool: PoolOptions::default(),
            send_queue_capacity: 4096,
            transcoding: Transcoding::Raw,
            dns: DnsResolution::System,
            connect_timeout: Duration::from_secs(10),
        }
    }
}
