//! Protocol types shared by the parser, the encoder and handlers.
//!
//! - [`Request`]: a fully parsed request, immutable once handed out
//! - [`Response`]: status, headers and a [`ResponseBody`] filled in by the handler
//! - [`ResponseHead`] / [`PayloadSize`]: what the encoder serializes
//! - error types for parsing, sending, serving and configuration

mod request;
pub use request::Request;

mod response;
pub use response::PayloadSize;
pub use response::Response;
pub use response::ResponseBody;
pub use response::ResponseHead;

mod error;
pub use error::ConfigError;
pub use error::ParseError;
pub use error::SendError;
pub use error::ServerError;
