use std::cell::RefCell;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

use socket2::{Domain, Type};
use tracing::{debug, info, warn};

use crate::connection::{Chat, ChatChannel, HEAD_TERMINATOR, HttpConnection};
use crate::handler::Handler;
use crate::net::{Channel, Dispatcher, Reactor, Spawner, Token};
use crate::protocol::ServerError;
use crate::server::ServerConfig;

/// The listening channel, turning each accepted socket into an [`HttpConnection`].
struct HttpListener<H> {
    channel: Channel,
    handler: Rc<RefCell<H>>,
    config: Rc<ServerConfig>,
}

impl<H: Handler + 'static> Dispatcher for HttpListener<H> {
    fn channel(&self) -> &Channel {
        &self.channel
    }

    fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    fn writable(&self) -> bool {
        false
    }

    fn handle_accept(&mut self, spawner: &mut Spawner) {
        let (stream, peer) = match self.channel.accept() {
            Ok(Some(pair)) => pair,
            Ok(None) => return,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                return;
            }
        };

        debug!(%peer, "accepted connection");
        let chat = Chat::new(Channel::from_stream(stream), HEAD_TERMINATOR, self.config.chat_config());
        let connection = HttpConnection::new(Rc::clone(&self.handler), Rc::clone(&self.config));
        spawner.spawn(ChatChannel::new(chat, connection));
    }
}

/// An HTTP server driven from the host's own loop.
///
/// Nothing happens in the background: every [`update`](Self::update) runs one
/// reactor pass that accepts connections, reads requests and writes responses.
///
/// ```no_run
/// use webconfig_http::handler::make_handler;
/// use webconfig_http::server::HttpServer;
///
/// let handler = make_handler(|request, response| {
///     response.html(format!("<h1>{}</h1>", request.path()));
/// });
///
/// let mut server = HttpServer::new(handler)?;
/// server.start(8080)?;
/// loop {
///     server.update()?;
///     // host work
/// #   break;
/// }
/// # Ok::<(), webconfig_http::protocol::ServerError>(())
/// ```
pub struct HttpServer<H> {
    reactor: Reactor,
    handler: Rc<RefCell<H>>,
    config: Rc<ServerConfig>,
    listener: Option<(Token, SocketAddr)>,
}

impl<H> fmt::Debug for HttpServer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer")
            .field("reactor", &self.reactor)
            .field("config", &self.config)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl<H: Handler + 'static> HttpServer<H> {
    pub fn new(handler: H) -> Result<Self, ServerError> {
        Self::with_config(handler, ServerConfig::default())
    }

    pub fn with_config(handler: H, config: ServerConfig) -> Result<Self, ServerError> {
        let reactor = Reactor::with_capacity(config.events_capacity())?;
        Ok(Self { reactor, handler: Rc::new(RefCell::new(handler)), config: Rc::new(config), listener: None })
    }

    /// Starts listening on `port` of the configured interface; port 0 picks
    /// an ephemeral port. Does nothing if the server already listens.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Listen` naming the step that failed.
    pub fn start(&mut self, port: u16) -> Result<SocketAddr, ServerError> {
        if let Some((_, address)) = self.listener {
            debug!(%address, "already listening");
            return Ok(address);
        }

        let address = SocketAddr::new(self.config.address(), port);
        let mut channel = Channel::new();
        channel.create_socket(Domain::for_address(address), Type::STREAM).map_err(ServerError::listen("create socket", address))?;
        if self.config.reuse_address() {
            channel.set_reuse_address(true).map_err(ServerError::listen("set reuse address", address))?;
        }
        channel.bind(address).map_err(ServerError::listen("bind", address))?;
        channel.listen(self.config.backlog()).map_err(ServerError::listen("listen", address))?;

        let local_addr = channel.local_addr()?;
        let token = self.reactor.insert(HttpListener { channel, handler: Rc::clone(&self.handler), config: Rc::clone(&self.config) });
        self.listener = Some((token, local_addr));

        info!(address = %local_addr, "start listening");
        Ok(local_addr)
    }

    /// Closes the listening socket right away. Connections already accepted
    /// keep being served by [`update`](Self::update).
    pub fn stop(&mut self) {
        if let Some((token, address)) = self.listener.take() {
            self.reactor.remove(token);
            info!(%address, "stop listening");
        }
    }

    /// Runs one reactor pass, waiting at most the configured poll timeout.
    ///
    /// Returns the number of dispatched read and write events.
    pub fn update(&mut self) -> Result<usize, ServerError> {
        let dispatched = self.reactor.poll(Some(self.config.poll_timeout()))?;
        self.forget_dead_listener();
        Ok(dispatched)
    }

    /// A listener torn down by the reactor after an error is gone for good.
    fn forget_dead_listener(&mut self) {
        if let Some((token, address)) = self.listener
            && !self.reactor.contains(token)
        {
            warn!(%address, "listener closed after an error");
            self.listener = None;
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.map(|(_, address)| address)
    }

    pub fn is_running(&self) -> bool {
        self.listener.is_some()
    }

    /// Open client connections.
    pub fn connections(&self) -> usize {
        let listening = self.listener.is_some_and(|(token, _)| self.reactor.contains(token));
        self.reactor.len().saturating_sub(usize::from(listening))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn handler(&self) -> &Rc<RefCell<H>> {
        &self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::handler::MockHandler;

    fn local_config() -> ServerConfig {
        ServerConfig::builder().address(Ipv4Addr::LOCALHOST).build().unwrap()
    }

    #[test]
    fn start_is_idempotent() {
        let mut server = HttpServer::with_config(MockHandler::new(), local_config()).unwrap();
        assert!(!server.is_running());

        let first = server.start(0).unwrap();
        let second = server.start(0).unwrap();
        assert_eq!(first, second);
        assert!(server.is_running());
        assert_eq!(server.connections(), 0);
    }

    #[test]
    fn update_without_listener() {
        let mut server = HttpServer::with_config(MockHandler::new(), local_config()).unwrap();
        assert_eq!(server.update().unwrap(), 0);
    }

    #[test]
    fn failed_listener_is_forgotten() {
        let mut server = HttpServer::with_config(MockHandler::new(), local_config()).unwrap();
        server.start(0).unwrap();
        let (token, _) = server.listener.unwrap();

        server.reactor.close(token);
        server.update().unwrap();
        assert!(!server.reactor.contains(token));
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);
        assert_eq!(server.connections(), 0);

        // a fresh start binds again
        server.start(0).unwrap();
        assert!(server.is_running());
    }

    #[test]
    fn debug_shows_listener_not_handler() {
        let mut server = HttpServer::with_config(MockHandler::new(), local_config()).unwrap();
        let address = server.start(0).unwrap();

        let debug = format!("{server:?}");
        assert!(debug.starts_with("HttpServer {"), "{debug}");
        assert!(debug.contains(&address.to_string()), "{debug}");
        assert!(debug.contains("Reactor {"), "{debug}");
    }

    #[test]
    fn start_on_taken_port_reports_bind() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = ServerConfig::builder().address(Ipv4Addr::LOCALHOST).reuse_address(false).build().unwrap();
        let mut server = HttpServer::with_config(MockHandler::new(), config).unwrap();
        match server.start(port) {
            Err(ServerError::Listen { action, .. }) => assert!(action == "bind" || action == "listen"),
            other => panic!("expected listen error, got {other:?}"),
        }
        assert!(!server.is_running());
    }
}
