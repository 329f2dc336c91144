//! Byte level codecs.
//!
//! - [`TerminatorDecoder`]: splits an inbound stream on a configurable
//!   delimiter, the framing used by [`Chat`](crate::connection::Chat)
//! - [`RequestParser`]: the character driven request state machine
//! - [`ResponseEncoder`]: serializes a response head
//!
//! The decoder and encoder implement the `tokio_util` codec traits but are
//! driven synchronously from the reactor thread.

mod request_parser;
mod response_encoder;
mod terminator_decoder;

pub use request_parser::DEFAULT_MAX_BODY_SIZE;
pub use request_parser::ParseState;
pub use request_parser::RequestParser;
pub use response_encoder::ResponseEncoder;
pub use terminator_decoder::Collected;
pub use terminator_decoder::TerminatorDecoder;
pub use terminator_decoder::find_prefix_at_end;
