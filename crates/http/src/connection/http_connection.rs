use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use http::header::{DATE, SERVER};
use tokio_util::codec::Encoder;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{ParseState, RequestParser, ResponseEncoder};
use crate::connection::{Chat, ChatHandler, FileProducer};
use crate::handler::Handler;
use crate::protocol::{ParseError, Request, Response, ResponseBody};
use crate::server::ServerConfig;

/// Delimiter of the request head
pub const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug)]
enum Phase {
    /// Collecting the head segment
    Head,
    /// Head parsed, waiting for the rest of the declared body
    Body(RequestParser),
    /// Response queued, further input is ignored
    Done,
}

/// Serves exactly one request on a framed channel.
///
/// The head is collected up to [`HEAD_TERMINATOR`] and parsed. If the request
/// declares a body that has not fully arrived yet, the terminator is switched
/// off and the parser resumes with each read until the body is complete.
pub struct HttpConnection<H> {
    handler: Rc<RefCell<H>>,
    config: Rc<ServerConfig>,
    head: BytesMut,
    phase: Phase,
}

impl<H> fmt::Debug for HttpConnection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection").field("head_len", &self.head.len()).field("phase", &self.phase).finish_non_exhaustive()
    }
}

impl<H: Handler> HttpConnection<H> {
    pub fn new(handler: Rc<RefCell<H>>, config: Rc<ServerConfig>) -> Self {
        Self { handler, config, head: BytesMut::new(), phase: Phase::Head }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    fn parse_head(&mut self, chat: &mut Chat) {
        if self.head.is_empty() {
            debug!("empty request head, closing without response");
            self.phase = Phase::Done;
            chat.channel_mut().close();
            return;
        }

        let mut head = mem::take(&mut self.head);
        head.extend_from_slice(HEAD_TERMINATOR);

        let mut parser = RequestParser::with_max_body_size(self.config.max_body_size());
        match parser.parse(&head) {
            Ok(ParseState::Ok) => self.respond(chat, parser.finish()),
            Ok(ParseState::Body) => {
                trace!(remaining = parser.remaining_body(), "waiting for request body");
                chat.set_terminator(Bytes::new());
                self.phase = Phase::Body(parser);
            }
            Ok(state) => self.respond(chat, Err(ParseError::incomplete(state))),
            Err(e) => self.respond(chat, Err(e)),
        }
    }

    fn respond(&mut self, chat: &mut Chat, request: Result<Request, ParseError>) {
        self.phase = Phase::Done;

        let mut response = Response::new();
        response.headers_mut().insert(SERVER, self.config.server_name().clone());

        match request {
            Ok(request) => {
                if let Some(date) = request.headers().get(DATE) {
                    response.headers_mut().insert(DATE, date.clone());
                }
                self.handler.borrow_mut().handle(&request, &mut response);
                info!(method = %request.method(), path = request.path(), status = response.status().as_u16(), "served request");
            }
            Err(e) => {
                warn!(cause = %e, "bad request");
                response.set_status(StatusCode::BAD_REQUEST);
            }
        }

        let (head, body) = response.into_parts();
        let payload_size = body.payload_size();

        let mut buf = BytesMut::new();
        if let Err(e) = ResponseEncoder::new().encode((head, payload_size), &mut buf) {
            error!(cause = %e, "can't encode response head");
            chat.channel_mut().close();
            return;
        }
        chat.send(buf.freeze());

        match body {
            ResponseBody::Empty => {}
            ResponseBody::Bytes(bytes) => chat.send(bytes),
            ResponseBody::File(file) => chat.push(FileProducer::with_chunk_size(file, self.config.file_chunk_size())),
        }
        chat.close_when_done();
    }
}

impl<H: Handler> ChatHandler for HttpConnection<H> {
    fn collect_incoming_data(&mut self, chat: &mut Chat, data: Bytes) {
        match &mut self.phase {
            Phase::Head => {
                let size = self.head.len() + data.len();
                let max_size = self.config.max_head_size();
                if size > max_size {
                    self.respond(chat, Err(ParseError::too_large_header(size, max_size)));
                    return;
                }
                self.head.extend_from_slice(&data);
            }

            Phase::Body(parser) => match parser.feed_body(&data) {
                Ok(ParseState::Ok) => {
                    if let Phase::Body(parser) = mem::replace(&mut self.phase, Phase::Done) {
                        self.respond(chat, parser.finish());
                    }
                }
                Ok(_) => {}
                Err(e) => self.respond(chat, Err(e)),
            },

            Phase::Done => trace!(ignored = data.len(), "input after request"),
        }
    }

    fn found_terminator(&mut self, chat: &mut Chat) {
        match self.phase {
            Phase::Head => self.parse_head(chat),
            Phase::Body(_) | Phase::Done => {}
        }
    }

    fn handle_close(&mut self, _chat: &mut Chat) {
        match &self.phase {
            Phase::Head if !self.head.is_empty() => debug!(received = self.head.len(), "peer closed before request head completed"),
            Phase::Body(parser) => debug!(remaining = parser.remaining_body(), "peer closed before request body completed"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::{Duration, Instant};

    use http::HeaderValue;
    use indoc::indoc;

    use crate::connection::ChatChannel;
    use crate::handler::MockHandler;
    use crate::net::{Channel, Dispatcher};

    fn serve(handler: MockHandler, config: ServerConfig, request: &[u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let config = Rc::new(config);
        let chat = Chat::new(Channel::from_std_stream(server).unwrap(), HEAD_TERMINATOR, config.chat_config());
        let mut channel = ChatChannel::new(chat, HttpConnection::new(Rc::new(RefCell::new(handler)), config));

        client.write_all(request).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !channel.channel().is_closed() {
            assert!(Instant::now() < deadline, "connection never closed");
            channel.handle_read();
            if channel.chat().pending() {
                channel.handle_write();
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn handler_fills_response() {
        let mut handler = MockHandler::new();
        handler.expect_handle().times(1).returning(|request, response| {
            assert_eq!(request.path(), "/x");
            assert_eq!(request.query_param("a"), Some("1"));
            response.set_body("hello");
        });

        let request = indoc! {"
            GET /x?a=1 HTTP/1.1\r
            Host: h\r
            Date: Tue, 15 Nov 1994 08:12:31 GMT\r
            \r
        "};
        let response = serve(handler, ServerConfig::default(), request.as_bytes());

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("server: webconfig-http/"));
        assert!(response.contains("date: Tue, 15 Nov 1994 08:12:31 GMT\r\n"));
        assert!(response.contains("content-length: 5\r\n"));
        assert!(response.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn malformed_request_skips_handler() {
        let mut handler = MockHandler::new();
        handler.expect_handle().times(0);

        let response = serve(handler, ServerConfig::default(), b"GET\r\nHost: h\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("content-length: 0\r\n"));
    }

    #[test]
    fn body_split_across_reads_is_collected() {
        let mut handler = MockHandler::new();
        handler.expect_handle().times(1).returning(|request, response| {
            assert_eq!(request.content_length(), 11);
            response.set_body(request.body().clone());
        });

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let config = Rc::new(ServerConfig::default());
        let chat = Chat::new(Channel::from_std_stream(server).unwrap(), HEAD_TERMINATOR, config.chat_config());
        let mut channel = ChatChannel::new(chat, HttpConnection::new(Rc::new(RefCell::new(handler)), config));

        client.write_all(b"POST /save HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while channel.chat().terminator() == HEAD_TERMINATOR {
            assert!(Instant::now() < deadline);
            channel.handle_read();
        }
        assert!(!channel.handler().is_done());

        client.write_all(b" world").unwrap();
        while !channel.channel().is_closed() {
            assert!(Instant::now() < deadline);
            channel.handle_read();
            if channel.chat().pending() {
                channel.handle_write();
            }
        }

        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        assert!(response.ends_with("\r\n\r\nhello world"));
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut handler = MockHandler::new();
        handler.expect_handle().times(0);

        let config = ServerConfig::builder().max_head_size(32).build().unwrap();
        let request = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(64));
        let response = serve(handler, config, request.as_bytes());
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn empty_head_closes_silently() {
        let mut handler = MockHandler::new();
        handler.expect_handle().times(0);

        let response = serve(handler, ServerConfig::default(), b"\r\n\r\n");
        assert!(response.is_empty());
    }

    #[test]
    fn streams_file_body() {
        let path = std::env::temp_dir().join(format!("webconfig-http-connection-{}", std::process::id()));
        let content = "0123456789".repeat(200);
        std::fs::write(&path, &content).unwrap();

        let mut handler = MockHandler::new();
        let file_path = path.clone();
        handler.expect_handle().times(1).returning(move |_, response| {
            response.headers_mut().insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            response.set_file(std::fs::File::open(&file_path).unwrap());
        });

        let config = ServerConfig::builder().file_chunk_size(100).build().unwrap();
        let response = serve(handler, config, b"GET /log.txt HTTP/1.1\r\n\r\n");
        assert!(response.contains("content-length: 2000\r\n"));
        assert!(response.ends_with(&content));

        std::fs::remove_file(&path).unwrap();
    }
}
