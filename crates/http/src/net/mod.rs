//! Non-blocking sockets and the reactor multiplexing them.

mod channel;
mod reactor;

pub use channel::Channel;
pub use reactor::DEFAULT_EVENTS_CAPACITY;
pub use reactor::Dispatcher;
pub use reactor::Reactor;
pub use reactor::Spawner;
pub use reactor::Token;
