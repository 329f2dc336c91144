use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use http::HeaderValue;

use crate::codec::DEFAULT_MAX_BODY_SIZE;
use crate::connection::{ChatConfig, DEFAULT_BUFFER_SIZE, DEFAULT_CHUNK_SIZE};
use crate::ensure;
use crate::net::DEFAULT_EVENTS_CAPACITY;
use crate::protocol::ConfigError;

/// Default value of the `Server` response header
pub const DEFAULT_SERVER_NAME: &str = concat!("webconfig-http/", env!("CARGO_PKG_VERSION"));

/// Default upper bound for a request head
pub const DEFAULT_MAX_HEAD_SIZE: usize = 8 * 1024;

const DEFAULT_BACKLOG: i32 = 128;

/// Tunables of an [`HttpServer`](crate::server::HttpServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    address: IpAddr,
    backlog: i32,
    reuse_address: bool,
    server_name: HeaderValue,
    poll_timeout: Duration,
    events_capacity: usize,
    in_buffer_size: usize,
    out_buffer_size: usize,
    file_chunk_size: usize,
    max_head_size: usize,
    max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            backlog: DEFAULT_BACKLOG,
            reuse_address: true,
            server_name: HeaderValue::from_static(DEFAULT_SERVER_NAME),
            poll_timeout: Duration::ZERO,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            in_buffer_size: DEFAULT_BUFFER_SIZE,
            out_buffer_size: DEFAULT_BUFFER_SIZE,
            file_chunk_size: DEFAULT_CHUNK_SIZE,
            max_head_size: DEFAULT_MAX_HEAD_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Interface the listener binds to, all interfaces by default.
    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn reuse_address(&self) -> bool {
        self.reuse_address
    }

    pub fn server_name(&self) -> &HeaderValue {
        &self.server_name
    }

    /// How long a single [`update`](crate::server::HttpServer::update) may wait for readiness.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn events_capacity(&self) -> usize {
        self.events_capacity
    }

    pub fn file_chunk_size(&self) -> usize {
        self.file_chunk_size
    }

    pub fn max_head_size(&self) -> usize {
        self.max_head_size
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig { in_buffer_size: self.in_buffer_size, out_buffer_size: self.out_buffer_size }
    }
}

#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
    server_name: Option<String>,
}

impl ServerConfigBuilder {
    fn new() -> Self {
        Self { config: ServerConfig::default(), server_name: None }
    }

    pub fn address(mut self, address: impl Into<IpAddr>) -> Self {
        self.config.address = address.into();
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.config.backlog = backlog;
        self
    }

    pub fn reuse_address(mut self, reuse_address: bool) -> Self {
        self.config.reuse_address = reuse_address;
        self
    }

    pub fn server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.config.poll_timeout = poll_timeout;
        self
    }

    pub fn events_capacity(mut self, events_capacity: usize) -> Self {
        self.config.events_capacity = events_capacity;
        self
    }

    pub fn in_buffer_size(mut self, size: usize) -> Self {
        self.config.in_buffer_size = size;
        self
    }

    pub fn out_buffer_size(mut self, size: usize) -> Self {
        self.config.out_buffer_size = size;
        self
    }

    pub fn file_chunk_size(mut self, size: usize) -> Self {
        self.config.file_chunk_size = size;
        self
    }

    pub fn max_head_size(mut self, size: usize) -> Self {
        self.config.max_head_size = size;
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if a size is zero or the server name can't be
    /// used as a header value.
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let mut config = self.config;

        for (name, size) in [
            ("backlog", usize::try_from(config.backlog).unwrap_or(0)),
            ("events_capacity", config.events_capacity),
            ("in_buffer_size", config.in_buffer_size),
            ("out_buffer_size", config.out_buffer_size),
            ("file_chunk_size", config.file_chunk_size),
            ("max_head_size", config.max_head_size),
        ] {
            ensure!(size > 0, ConfigError::ZeroSize { name });
        }

        if let Some(server_name) = self.server_name {
            config.server_name = HeaderValue::from_str(&server_name).map_err(|_| ConfigError::InvalidServerName(server_name))?;
        }

        Ok(config)
    }
}
