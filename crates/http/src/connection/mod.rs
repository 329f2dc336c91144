//! Per-connection protocol handling.
//!
//! - [`Chat`] / [`ChatChannel`]: a channel framed by a terminator with a
//!   queue of outbound [`Producer`]s
//! - [`HttpConnection`]: the [`ChatHandler`] serving one HTTP request

mod chat;
mod http_connection;
mod producer;

pub use chat::Chat;
pub use chat::ChatChannel;
pub use chat::ChatConfig;
pub use chat::ChatHandler;
pub use chat::DEFAULT_BUFFER_SIZE;
pub use http_connection::HEAD_TERMINATOR;
pub use http_connection::HttpConnection;
pub use producer::DEFAULT_CHUNK_SIZE;
pub use producer::FileProducer;
pub use producer::Producer;
pub use producer::SimpleProducer;
