//! A single-threaded, non-blocking HTTP server meant to be embedded in a
//! long-running process, typically to expose a configuration or debug panel
//! to a browser.
//!
//! The server never spawns threads and never blocks the host: the host calls
//! [`HttpServer::update`](server::HttpServer::update) from its own loop and each
//! call runs one pass of the reactor.
//!
//! # Example
//!
//! ```no_run
//! use http::StatusCode;
//! use webconfig_http::escape::html_encode;
//! use webconfig_http::handler::make_handler;
//! use webconfig_http::server::HttpServer;
//!
//! let mut speed = String::from("1.0");
//! let handler = make_handler(move |request, response| match request.path() {
//!     "/" => {
//!         if let Some(value) = request.query_param("speed") {
//!             speed = value.to_string();
//!         }
//!         response.html(format!("<p>speed = {}</p>", html_encode(&speed)));
//!     }
//!     _ => response.set_status(StatusCode::NOT_FOUND),
//! });
//!
//! let mut server = HttpServer::new(handler)?;
//! server.start(8080)?;
//! loop {
//!     server.update()?;
//!     // ... the host's own work ...
//! #   break;
//! }
//! # Ok::<(), webconfig_http::protocol::ServerError>(())
//! ```
//!
//! # Architecture
//!
//! - [`net`]: non-blocking [`Channel`](net::Channel)s and the [`Reactor`](net::Reactor)
//!   dispatching their readiness events
//! - [`codec`]: terminator framing, the request state machine and the response encoder
//! - [`connection`]: the framed [`Chat`](connection::Chat) stream and the
//!   [`HttpConnection`](connection::HttpConnection) serving one request per connection
//! - [`server`]: [`HttpServer`](server::HttpServer) and its configuration
//! - [`handler`]: the [`Handler`](handler::Handler) trait requests are dispatched to
//! - [`protocol`]: request, response and error types
//! - [`escape`]: URL and HTML escaping
//!
//! # Limitations
//!
//! - one request per connection, the connection is closed after the response
//! - no TLS and no chunked transfer encoding
//! - request bodies need a `Content-Length`

pub mod codec;
pub mod connection;
pub mod escape;
pub mod handler;
pub mod net;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
