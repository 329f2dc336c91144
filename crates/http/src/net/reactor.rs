//! Readiness driven dispatch over a set of channels.
//!
//! The [`Reactor`] owns every registered [`Dispatcher`]. Each call to
//! [`Reactor::poll`] is one pass:
//!
//! 1. channels marked closed are deregistered and dropped
//! 2. every remaining channel is armed with the interest its dispatcher
//!    reports through [`Dispatcher::readable`] / [`Dispatcher::writable`]
//! 3. the poller is waited on once
//! 4. read and write events are dispatched in token order
//! 5. dispatchers spawned while accepting are registered
//!
//! Channels are re-armed on every pass, so a socket that still has unread
//! input is reported again on the next pass just like with `select`.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, ErrorKind};
use std::time::Duration;

use mio::{Events, Interest, Poll};
use tracing::{debug, error, trace, warn};

use crate::net::Channel;

pub use mio::Token;

/// Default number of events fetched by a single poll
pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;

/// Event hooks of a channel owned by the [`Reactor`].
///
/// Only [`channel`](Self::channel) and [`channel_mut`](Self::channel_mut) are
/// required; every hook has a default that does nothing useful beyond logging.
pub trait Dispatcher {
    fn channel(&self) -> &Channel;

    fn channel_mut(&mut self) -> &mut Channel;

    /// Whether the reactor should wait for input on this channel.
    fn readable(&self) -> bool {
        let channel = self.channel();
        channel.is_connected() || channel.is_accepting()
    }

    /// Whether the reactor should wait for the channel to accept output.
    fn writable(&self) -> bool {
        let channel = self.channel();
        !channel.is_connected() || channel.is_write_blocked()
    }

    /// A listening channel has a pending connection.
    fn handle_accept(&mut self, _spawner: &mut Spawner) {
        warn!("unhandled accept event");
    }

    /// A non-blocking connect completed.
    fn handle_connect(&mut self) {
        trace!("unhandled connect event");
    }

    fn handle_read(&mut self) {
        trace!("unhandled read event");
    }

    fn handle_write(&mut self) {
        trace!("unhandled write event");
    }

    /// The channel is going away, either because the peer shut down or after an error.
    fn handle_close(&mut self) {
        self.channel_mut().close();
    }

    fn handle_error(&mut self, e: &io::Error) {
        error!(cause = %e, "uncaptured channel error");
    }

    /// Sends through the channel, absorbing "would block" and tearing the
    /// channel down on any other failure. Returns the number of bytes written.
    fn raw_send(&mut self, data: &[u8]) -> usize {
        match self.channel_mut().send(data) {
            Ok(n) => n,
            Err(e) if is_disconnect(&e) => {
                debug!(cause = %e, "peer went away while sending");
                self.handle_close();
                self.channel_mut().close();
                0
            }
            Err(e) => {
                self.fail(&e);
                0
            }
        }
    }

    /// Receives from the channel. Returns zero when nothing was read; the
    /// channel is closed afterwards if the peer shut down or an error occurred.
    fn raw_recv(&mut self, buf: &mut [u8]) -> usize {
        match self.channel_mut().recv(buf) {
            Ok(Some(0)) => {
                trace!("peer shut down");
                self.handle_close();
                self.channel_mut().close();
                0
            }
            Ok(Some(n)) => n,
            Ok(None) => 0,
            Err(e) if is_disconnect(&e) => {
                debug!(cause = %e, "peer went away while receiving");
                self.handle_close();
                self.channel_mut().close();
                0
            }
            Err(e) => {
                self.fail(&e);
                0
            }
        }
    }

    /// Reports `e`, then closes the channel.
    fn fail(&mut self, e: &io::Error) {
        self.handle_error(e);
        self.handle_close();
        self.channel_mut().close();
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe | ErrorKind::NotConnected)
}

/// Collects dispatchers created while handling an accept event.
#[derive(Default)]
pub struct Spawner {
    spawned: Vec<Box<dyn Dispatcher>>,
}

impl fmt::Debug for Spawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner").field("spawned", &self.spawned.len()).finish()
    }
}

impl Spawner {
    pub fn spawn(&mut self, dispatcher: impl Dispatcher + 'static) {
        self.spawned.push(Box::new(dispatcher));
    }

    pub fn len(&self) -> usize {
        self.spawned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spawned.is_empty()
    }
}

struct Entry {
    dispatcher: Box<dyn Dispatcher>,
    registered: bool,
}

/// The channel registry together with the poller driving it.
pub struct Reactor {
    poll: Poll,
    events: Events,
    entries: BTreeMap<Token, Entry>,
    next_token: usize,
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("poll", &self.poll)
            .field("channels", &self.entries.keys().collect::<Vec<_>>())
            .field("next_token", &self.next_token)
            .finish_non_exhaustive()
    }
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Self::with_capacity(DEFAULT_EVENTS_CAPACITY)
    }

    pub fn with_capacity(events_capacity: usize) -> io::Result<Self> {
        Ok(Self { poll: Poll::new()?, events: Events::with_capacity(events_capacity), entries: BTreeMap::new(), next_token: 0 })
    }

    /// Adds a dispatcher; it is armed on the next [`poll`](Self::poll).
    pub fn insert(&mut self, dispatcher: impl Dispatcher + 'static) -> Token {
        self.insert_boxed(Box::new(dispatcher))
    }

    fn insert_boxed(&mut self, dispatcher: Box<dyn Dispatcher>) -> Token {
        // never reused, so a recycled descriptor can't alias an old entry
        let token = Token(self.next_token);
        self.next_token += 1;
        self.entries.insert(token, Entry { dispatcher, registered: false });
        token
    }

    pub fn get(&self, token: Token) -> Option<&dyn Dispatcher> {
        self.entries.get(&token).map(|entry| entry.dispatcher.as_ref())
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut dyn Dispatcher> {
        match self.entries.get_mut(&token) {
            Some(entry) => Some(entry.dispatcher.as_mut()),
            None => None,
        }
    }

    /// Deregisters and hands back a dispatcher. Dropping it releases the socket.
    pub fn remove(&mut self, token: Token) -> Option<Box<dyn Dispatcher>> {
        let mut entry = self.entries.remove(&token)?;
        self.deregister(&mut entry);
        Some(entry.dispatcher)
    }

    /// Marks a channel closed; it is dropped at the start of the next pass.
    pub fn close(&mut self, token: Token) {
        if let Some(entry) = self.entries.get_mut(&token) {
            entry.dispatcher.channel_mut().close();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, token: Token) -> bool {
        self.entries.contains_key(&token)
    }

    /// Runs one pass, waiting at most `timeout` (`None` waits indefinitely).
    ///
    /// Returns the number of read and write callbacks dispatched.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        self.purge_closed();

        if self.arm() == 0 {
            return Ok(0);
        }

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(0),
            Err(e) => return Err(e),
        }

        let fired = coalesce(self.events.iter().map(|event| {
            let readable = event.is_readable() || event.is_read_closed() || event.is_error();
            let writable = event.is_writable() || event.is_write_closed();
            (event.token(), readable, writable)
        }));

        let mut spawner = Spawner::default();
        let mut dispatched = 0;
        for (token, (readable, writable)) in fired {
            let Some(entry) = self.entries.get_mut(&token) else {
                continue;
            };
            let dispatcher = entry.dispatcher.as_mut();

            if readable && !dispatcher.channel().is_closed() {
                dispatched += 1;
                dispatch_read(dispatcher, &mut spawner);
            }

            if writable && !dispatcher.channel().is_closed() {
                dispatched += 1;
                dispatch_write(dispatcher);
            }
        }

        for dispatcher in spawner.spawned {
            let token = self.insert_boxed(dispatcher);
            trace!(?token, "registered spawned channel");
        }

        Ok(dispatched)
    }

    /// Polls until no channel is left.
    pub fn run(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        while !self.is_empty() {
            self.poll(timeout)?;
        }
        Ok(())
    }

    fn purge_closed(&mut self) {
        let closed: Vec<Token> = self.entries.iter().filter(|(_, entry)| entry.dispatcher.channel().is_closed()).map(|(token, _)| *token).collect();

        for token in closed {
            if let Some(mut entry) = self.entries.remove(&token) {
                trace!(?token, "purging closed channel");
                self.deregister(&mut entry);
            }
        }
    }

    /// Registers every channel with its current interest, returning how many are armed.
    fn arm(&mut self) -> usize {
        let registry = self.poll.registry();
        let mut armed = 0;

        for (token, entry) in self.entries.iter_mut() {
            let dispatcher = entry.dispatcher.as_mut();
            let interest = match (dispatcher.readable(), dispatcher.writable()) {
                (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
                (true, false) => Some(Interest::READABLE),
                (false, true) => Some(Interest::WRITABLE),
                (false, false) => None,
            };

            let was_registered = entry.registered;
            let Some(source) = dispatcher.channel_mut().source_mut() else {
                continue;
            };

            let result = match interest {
                Some(interest) if was_registered => registry.reregister(source, *token, interest),
                Some(interest) => registry.register(source, *token, interest),
                None if was_registered => registry.deregister(source),
                None => Ok(()),
            };

            match result {
                Ok(()) => {
                    entry.registered = interest.is_some();
                    armed += usize::from(interest.is_some());
                }
                Err(e) => {
                    warn!(?token, cause = %e, "failed to register channel");
                    dispatcher.fail(&e);
                }
            }
        }

        armed
    }

    fn deregister(&self, entry: &mut Entry) {
        if !entry.registered {
            return;
        }
        entry.registered = false;
        if let Some(source) = entry.dispatcher.channel_mut().source_mut() {
            // the descriptor is dropped right after, errors are irrelevant
            let _ = self.poll.registry().deregister(source);
        }
    }
}

/// Merges the events of one pass per token, so each channel gets at most one
/// read and one write callback however many events the poller reported.
fn coalesce(events: impl IntoIterator<Item = (Token, bool, bool)>) -> BTreeMap<Token, (bool, bool)> {
    let mut fired: BTreeMap<Token, (bool, bool)> = BTreeMap::new();
    for (token, readable, writable) in events {
        let readiness = fired.entry(token).or_default();
        readiness.0 |= readable;
        readiness.1 |= writable;
    }
    fired
}

fn dispatch_read(dispatcher: &mut dyn Dispatcher, spawner: &mut Spawner) {
    let (accepting, connected) = (dispatcher.channel().is_accepting(), dispatcher.channel().is_connected());
    if accepting {
        dispatcher.handle_accept(spawner);
    } else if !connected {
        dispatcher.handle_connect();
        dispatcher.channel_mut().set_connected(true);
        dispatcher.handle_read();
    } else {
        dispatcher.handle_read();
    }
}

fn dispatch_write(dispatcher: &mut dyn Dispatcher) {
    if !dispatcher.channel().is_connected() {
        dispatcher.handle_connect();
        dispatcher.channel_mut().set_connected(true);
    }
    dispatcher.channel_mut().set_write_blocked(false);
    dispatcher.handle_write();
}
