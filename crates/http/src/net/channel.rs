use std::io::{self, ErrorKind, Read, Write};
use std::mem;
use std::net::{Shutdown, SocketAddr};

use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use socket2::{Domain, Protocol, SockAddr, Type};
use tracing::trace;

/// The socket a [`Channel`] currently owns.
#[derive(Debug, Default)]
enum Socket {
    #[default]
    Idle,
    /// Created and possibly bound, not listening yet
    Unbound(socket2::Socket),
    Listener(TcpListener),
    Stream(TcpStream),
}

/// A single non-blocking socket endpoint.
///
/// Operations that would block come back as "try again" values (`Ok(0)`,
/// `Ok(None)`) rather than errors, so callers only see real failures.
#[derive(Debug, Default)]
pub struct Channel {
    socket: Socket,
    accepting: bool,
    connected: bool,
    closed: bool,
    write_blocked: bool,
}

impl Channel {
    /// An idle channel, see [`create_socket`](Self::create_socket).
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already connected stream, typically one returned by [`accept`](Self::accept).
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { socket: Socket::Stream(stream), connected: true, ..Default::default() }
    }

    pub fn from_std_stream(stream: std::net::TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self::from_stream(TcpStream::from_std(stream)))
    }

    pub fn create_socket(&mut self, domain: Domain, ty: Type) -> io::Result<()> {
        let socket = socket2::Socket::new(domain, ty, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        self.socket = Socket::Unbound(socket);
        self.closed = false;
        Ok(())
    }

    pub fn set_reuse_address(&mut self, reuse: bool) -> io::Result<()> {
        self.unbound()?.set_reuse_address(reuse)
    }

    pub fn bind(&mut self, address: SocketAddr) -> io::Result<()> {
        self.unbound()?.bind(&SockAddr::from(address))
    }

    /// Starts listening and marks the channel as accepting.
    ///
    /// On failure the unbound socket is kept, so the caller may retry.
    pub fn listen(&mut self, backlog: i32) -> io::Result<()> {
        let Socket::Unbound(socket) = mem::take(&mut self.socket) else {
            return Err(not_in_state("listen"));
        };

        if let Err(e) = socket.listen(backlog) {
            self.socket = Socket::Unbound(socket);
            return Err(e);
        }

        let listener: std::net::TcpListener = socket.into();
        self.socket = Socket::Listener(TcpListener::from_std(listener));
        self.accepting = true;
        Ok(())
    }

    /// Accepts one pending connection, `None` when there is nothing to accept.
    pub fn accept(&mut self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let Socket::Listener(listener) = &self.socket else {
            return Err(not_in_state("accept"));
        };

        match listener.accept() {
            Ok(pair) => Ok(Some(pair)),
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Starts a non-blocking connect. It completes with the first write event.
    pub fn connect(&mut self, address: SocketAddr) -> io::Result<()> {
        let stream = TcpStream::connect(address)?;
        self.socket = Socket::Stream(stream);
        self.connected = false;
        self.closed = false;
        Ok(())
    }

    /// Writes as much of `data` as the OS accepts.
    ///
    /// Returns `Ok(0)` when the socket would block. A short or blocked write
    /// marks the channel write-blocked until the next write event.
    pub fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let Socket::Stream(stream) = &mut self.socket else {
            return Err(not_in_state("send"));
        };

        match stream.write(data) {
            Ok(n) => {
                self.write_blocked = n < data.len();
                trace!(sent = n, requested = data.len(), "send");
                Ok(n)
            }
            Err(e) if is_transient(&e) => {
                self.write_blocked = true;
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads into `buf`.
    ///
    /// `Ok(None)` means try again, `Ok(Some(0))` that the peer shut down its side.
    pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let Socket::Stream(stream) = &mut self.socket else {
            return Err(not_in_state("recv"));
        };

        match stream.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Shuts the stream down and marks the channel closed. The descriptor
    /// itself is released when the channel is dropped.
    pub fn close(&mut self) {
        if let Socket::Stream(stream) = &self.socket {
            // the peer may already be gone
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.accepting = false;
        self.closed = true;
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.socket {
            Socket::Idle => Err(not_in_state("local_addr")),
            Socket::Unbound(socket) => socket.local_addr()?.as_socket().ok_or_else(|| not_in_state("local_addr")),
            Socket::Listener(listener) => listener.local_addr(),
            Socket::Stream(stream) => stream.local_addr(),
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match &self.socket {
            Socket::Stream(stream) => stream.peer_addr(),
            _ => Err(not_in_state("peer_addr")),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_write_blocked(&self) -> bool {
        self.write_blocked
    }

    pub fn set_write_blocked(&mut self, write_blocked: bool) {
        self.write_blocked = write_blocked;
    }

    /// The part the reactor registers with the poller.
    pub(crate) fn source_mut(&mut self) -> Option<&mut dyn Source> {
        match &mut self.socket {
            Socket::Listener(listener) => Some(listener as &mut dyn Source),
            Socket::Stream(stream) => Some(stream as &mut dyn Source),
            Socket::Idle | Socket::Unbound(_) => None,
        }
    }

    fn unbound(&self) -> io::Result<&socket2::Socket> {
        match &self.socket {
            Socket::Unbound(socket) => Ok(socket),
            _ => Err(not_in_state("configure")),
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

fn not_in_state(operation: &str) -> io::Error {
    io::Error::new(ErrorKind::NotConnected, format!("socket is not in a state to {operation}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::time::{Duration, Instant};

    fn listening() -> Channel {
        let mut channel = Channel::new();
        channel.create_socket(Domain::IPV4, Type::STREAM).unwrap();
        channel.set_reuse_address(true).unwrap();
        channel.bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0).into()).unwrap();
        channel.listen(8).unwrap();
        channel
    }

    fn accept_within(channel: &mut Channel, timeout: Duration) -> (TcpStream, SocketAddr) {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pair) = channel.accept().unwrap() {
                return pair;
            }
            assert!(Instant::now() < deadline, "no connection accepted");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn listen_marks_accepting() {
        let mut channel = listening();
        assert!(channel.is_accepting());
        assert!(!channel.is_connected());
        assert!(channel.local_addr().unwrap().port() > 0);
        assert!(channel.accept().unwrap().is_none());
    }

    #[test]
    fn listen_requires_a_socket() {
        let mut channel = Channel::new();
        assert!(channel.listen(8).is_err());
        assert!(channel.bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0).into()).is_err());
    }

    #[test]
    fn send_and_recv_over_loopback() {
        let mut listener = listening();
        let mut client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let (stream, peer) = accept_within(&mut listener, Duration::from_secs(5));
        let mut channel = Channel::from_stream(stream);
        assert!(channel.is_connected());
        assert_eq!(channel.peer_addr().unwrap(), peer);

        let mut buf = [0; 16];
        assert_eq!(channel.recv(&mut buf).unwrap(), None);

        client.write_all(b"ping").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let n = loop {
            if let Some(n) = channel.recv(&mut buf).unwrap() {
                break n;
            }
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(&buf[..n], b"ping");

        assert_eq!(channel.send(b"pong").unwrap(), 4);
        assert!(!channel.is_write_blocked());
        let mut reply = [0; 4];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong");

        drop(client);
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(n) = channel.recv(&mut buf).unwrap() {
                assert_eq!(n, 0);
                break;
            }
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }

        channel.close();
        assert!(channel.is_closed());
    }
}
