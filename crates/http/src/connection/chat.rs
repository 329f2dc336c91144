//! Terminator framed byte stream over a [`Channel`].
//!
//! [`Chat`] couples a channel with an inbound accumulator, framed by a
//! [`TerminatorDecoder`], and an outbound queue of [`Producer`]s. The protocol
//! logic lives in a [`ChatHandler`]; [`ChatChannel`] glues both together and
//! plugs them into the [`Reactor`](crate::net::Reactor).
//!
//! Outbound data is pulled lazily: a producer is only asked for more bytes
//! when the outbound buffer has room, so a large file never sits in memory
//! as a whole.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::mem;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::{Collected, TerminatorDecoder};
use crate::connection::{Producer, SimpleProducer};
use crate::net::{Channel, Dispatcher};
use crate::protocol::ParseError;

/// Default size of the inbound and outbound buffers
pub const DEFAULT_BUFFER_SIZE: usize = 512;

#[derive(Debug, Clone, Copy)]
pub struct ChatConfig {
    /// Upper bound of buffered inbound bytes, the channel stops reading above it
    pub in_buffer_size: usize,
    /// Target size of the outbound buffer, producers are drained up to it
    pub out_buffer_size: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { in_buffer_size: DEFAULT_BUFFER_SIZE, out_buffer_size: DEFAULT_BUFFER_SIZE }
    }
}

enum Outgoing {
    Producer(Box<dyn Producer>),
    /// Close the channel once everything queued before has been sent
    Close,
}

/// The buffering half of a framed channel, handed to [`ChatHandler`] callbacks.
pub struct Chat {
    channel: Channel,
    decoder: TerminatorDecoder,
    in_buf: BytesMut,
    out_buf: BytesMut,
    fifo: VecDeque<Outgoing>,
    config: ChatConfig,
}

impl fmt::Debug for Chat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chat")
            .field("channel", &self.channel)
            .field("decoder", &self.decoder)
            .field("in_buf_len", &self.in_buf.len())
            .field("out_buf_len", &self.out_buf.len())
            .field("queued", &self.fifo.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Chat {
    pub fn new(channel: Channel, terminator: impl Into<Bytes>, config: ChatConfig) -> Self {
        Self {
            channel,
            decoder: TerminatorDecoder::new(terminator),
            in_buf: BytesMut::with_capacity(config.in_buffer_size),
            out_buf: BytesMut::with_capacity(config.out_buffer_size),
            fifo: VecDeque::new(),
            config,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Switches the delimiter. Takes effect for the bytes not yet delivered,
    /// including the rest of the current read. An empty terminator turns
    /// framing off.
    pub fn set_terminator(&mut self, terminator: impl Into<Bytes>) {
        self.decoder.set_terminator(terminator);
    }

    pub fn terminator(&self) -> &[u8] {
        self.decoder.terminator()
    }

    /// Queues `data`, sliced into chunks of at most `out_buffer_size`.
    pub fn send(&mut self, data: impl Into<Bytes>) {
        let data = data.into();
        if data.is_empty() {
            return;
        }
        let chunk_size = self.config.out_buffer_size;
        self.push(SimpleProducer::with_chunk_size(data, chunk_size));
    }

    pub fn push(&mut self, producer: impl Producer + 'static) {
        if self.channel.is_closed() {
            trace!("ignoring output queued on a closed channel");
            return;
        }
        self.fifo.push_back(Outgoing::Producer(Box::new(producer)));
    }

    /// Closes the channel after everything queued so far has been sent.
    /// Anything queued afterwards is discarded.
    pub fn close_when_done(&mut self) {
        if !self.channel.is_closed() {
            self.fifo.push_back(Outgoing::Close);
        }
    }

    /// Whether outbound bytes or queued items are waiting.
    pub fn pending(&self) -> bool {
        !self.out_buf.is_empty() || !self.fifo.is_empty()
    }

    pub fn readable(&self) -> bool {
        self.channel.is_connected() && self.in_buf.len() < self.config.in_buffer_size
    }

    pub fn writable(&self) -> bool {
        self.pending() || !self.channel.is_connected() || self.channel.is_write_blocked()
    }

    fn next_item(&mut self) -> Result<Option<Collected>, ParseError> {
        self.decoder.decode(&mut self.in_buf)
    }

    /// Fills the outbound buffer from the queue. Returns `true` when the close
    /// sentinel was reached with nothing left to send.
    fn refill(&mut self) -> io::Result<bool> {
        while self.out_buf.len() < self.config.out_buffer_size {
            match self.fifo.front_mut() {
                None => break,
                Some(Outgoing::Close) => {
                    if self.out_buf.is_empty() {
                        self.fifo.clear();
                        return Ok(true);
                    }
                    break;
                }
                Some(Outgoing::Producer(producer)) => {
                    let chunk = producer.more()?;
                    if chunk.is_empty() {
                        self.fifo.pop_front();
                    } else {
                        self.out_buf.extend_from_slice(&chunk);
                    }
                }
            }
        }
        Ok(false)
    }

    fn close_is_next(&self) -> bool {
        self.out_buf.is_empty() && matches!(self.fifo.front(), Some(Outgoing::Close))
    }
}

/// Protocol callbacks of a [`ChatChannel`].
pub trait ChatHandler {
    /// Bytes of the current segment, terminator excluded. May be called
    /// several times per segment.
    fn collect_incoming_data(&mut self, chat: &mut Chat, data: Bytes);

    /// The terminator was seen. The handler may switch terminators here.
    fn found_terminator(&mut self, chat: &mut Chat);

    fn handle_close(&mut self, _chat: &mut Chat) {}
}

/// A [`Chat`] driven by its [`ChatHandler`].
pub struct ChatChannel<H> {
    chat: Chat,
    handler: H,
    scratch: Vec<u8>,
}

impl<H: fmt::Debug> fmt::Debug for ChatChannel<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatChannel").field("chat", &self.chat).field("handler", &self.handler).finish_non_exhaustive()
    }
}

impl<H: ChatHandler> ChatChannel<H> {
    pub fn new(chat: Chat, handler: H) -> Self {
        let scratch = vec![0; chat.config.in_buffer_size];
        Self { chat, handler, scratch }
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut Chat {
        &mut self.chat
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn process_incoming(&mut self) {
        while !self.chat.channel.is_closed() {
            match self.chat.next_item() {
                Ok(Some(Collected::Data(data))) => self.handler.collect_incoming_data(&mut self.chat, data),
                Ok(Some(Collected::Terminator)) => self.handler.found_terminator(&mut self.chat),
                Ok(None) => break,
                Err(e) => {
                    self.fail(&io::Error::new(io::ErrorKind::InvalidData, e));
                    break;
                }
            }
        }
    }

    fn initiate_send(&mut self) {
        match self.chat.refill() {
            Ok(true) => {
                self.handle_close();
                return;
            }
            Ok(false) => {}
            Err(e) => {
                self.fail(&e);
                return;
            }
        }

        if !self.chat.out_buf.is_empty() {
            let mut out = mem::take(&mut self.chat.out_buf);
            let sent = self.raw_send(&out);
            out.advance(sent);
            self.chat.out_buf = out;
        }

        if !self.chat.channel.is_closed() && self.chat.close_is_next() {
            self.handle_close();
        }
    }
}

impl<H: ChatHandler> Dispatcher for ChatChannel<H> {
    fn channel(&self) -> &Channel {
        &self.chat.channel
    }

    fn channel_mut(&mut self) -> &mut Channel {
        &mut self.chat.channel
    }

    fn readable(&self) -> bool {
        self.chat.readable()
    }

    fn writable(&self) -> bool {
        self.chat.writable()
    }

    fn handle_read(&mut self) {
        let room = self.chat.config.in_buffer_size.saturating_sub(self.chat.in_buf.len());
        if room == 0 {
            return;
        }

        let mut scratch = mem::take(&mut self.scratch);
        scratch.resize(self.chat.config.in_buffer_size, 0);
        let n = self.raw_recv(&mut scratch[..room]);
        if n > 0 {
            trace!(received = n, "read");
            self.chat.in_buf.extend_from_slice(&scratch[..n]);
        }
        self.scratch = scratch;

        if n > 0 {
            self.process_incoming();
        }
        if self.chat.pending() && !self.chat.channel.is_closed() {
            self.initiate_send();
        }
    }

    fn handle_write(&mut self) {
        self.initiate_send();
    }

    fn handle_close(&mut self) {
        self.handler.handle_close(&mut self.chat);
        self.chat.fifo.clear();
        self.chat.channel.close();
    }
}
