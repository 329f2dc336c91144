//! The embeddable server: configuration and the `start` / `update` / `stop` lifecycle.

mod config;
mod http_server;

pub use config::DEFAULT_MAX_HEAD_SIZE;
pub use config::DEFAULT_SERVER_NAME;
pub use config::ServerConfig;
pub use config::ServerConfigBuilder;
pub use http_server::HttpServer;
