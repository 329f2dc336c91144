//! Character driven HTTP request parser.
//!
//! [`RequestParser`] walks the head segment of a request one byte at a time:
//!
//! ```text
//! Method -> Url -> (UrlParam <-> UrlValue)* -> Version
//!        -> (HeaderKey <-> HeaderValue)* -> Ok
//!                                        -> Body -> Ok
//! ```
//!
//! The head segment is everything up to and including the blank line. When a
//! `Content-Length` header announces a body, the parser stops in
//! [`ParseState::Body`] and is resumed with [`RequestParser::feed_body`] as
//! further bytes arrive, so the caller never has to block waiting for them.
//!
//! # Example
//!
//! ```
//! use webconfig_http::codec::{ParseState, RequestParser};
//!
//! let mut parser = RequestParser::new();
//! let state = parser.parse(b"GET /x?a=1&b=2 HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
//! assert_eq!(state, ParseState::Ok);
//!
//! let request = parser.finish().unwrap();
//! assert_eq!(request.path(), "/x");
//! assert_eq!(request.query_param("b"), Some("2"));
//! ```

use std::collections::HashMap;
use std::mem;

use bytes::BytesMut;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tracing::trace;

use crate::ensure;
use crate::escape::{url_decode, url_decode_form};
use crate::protocol::{ParseError, Request};

/// Default upper bound for a declared request body
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Parser states, in the order a well formed request visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Method,
    Url,
    UrlParam,
    UrlValue,
    Version,
    HeaderKey,
    HeaderValue,
    Body,
    Ok,
}

/// Incremental request parser, see the [module documentation](self).
#[derive(Debug)]
pub struct RequestParser {
    state: ParseState,
    max_body_size: usize,

    method: Vec<u8>,
    url: Vec<u8>,
    version: Vec<u8>,
    key: Vec<u8>,
    value: Vec<u8>,

    has_query: bool,
    query: HashMap<String, String>,
    headers: HeaderMap,
    content_length: usize,
    body: BytesMut,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::with_max_body_size(DEFAULT_MAX_BODY_SIZE)
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_body_size(max_body_size: usize) -> Self {
        Self {
            state: ParseState::Method,
            max_body_size,
            method: Vec::new(),
            url: Vec::new(),
            version: Vec::new(),
            key: Vec::new(),
            value: Vec::new(),
            has_query: false,
            query: HashMap::new(),
            headers: HeaderMap::new(),
            content_length: 0,
            body: BytesMut::new(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParseState::Ok
    }

    /// Bytes still missing from the declared body.
    pub fn remaining_body(&self) -> usize {
        self.content_length - self.body.len()
    }

    /// Drives the state machine over `input`, returning the state reached once
    /// the input is exhausted.
    ///
    /// Bytes seen in [`ParseState::Body`] are appended to the body up to the
    /// declared length; anything after a complete request is ignored.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the request line contains a line break, the
    /// method is not a valid token, a header name or value is invalid, or the
    /// content length is not a number or exceeds the configured limit.
    pub fn parse(&mut self, input: &[u8]) -> Result<ParseState, ParseError> {
        let mut index = 0;
        while index < input.len() {
            match self.state {
                ParseState::Body => {
                    index += self.take_body(&input[index..]);
                    continue;
                }
                ParseState::Ok => break,
                _ => self.step(input[index])?,
            }
            index += 1;
        }

        Ok(self.state)
    }

    /// Feeds body bytes that arrived after the head segment.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Incomplete` when the parser is not waiting for a body.
    pub fn feed_body(&mut self, input: &[u8]) -> Result<ParseState, ParseError> {
        match self.state {
            ParseState::Body => {
                self.take_body(input);
                Ok(self.state)
            }
            ParseState::Ok => Ok(self.state),
            state => Err(ParseError::incomplete(state)),
        }
    }

    /// Converts a completed parser into a [`Request`].
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Incomplete` carrying the current state unless the
    /// parser reached [`ParseState::Ok`].
    pub fn finish(self) -> Result<Request, ParseError> {
        ensure!(self.state == ParseState::Ok, ParseError::incomplete(self.state));

        // validated when leaving the method state
        let method = Method::from_bytes(&self.method).map_err(|_| ParseError::InvalidMethod)?;

        Ok(Request {
            method,
            path: lossy(url_decode(&self.url)),
            has_query: self.has_query,
            query: self.query,
            version: lossy(self.version),
            headers: self.headers,
            content_length: self.content_length,
            body: self.body.freeze(),
        })
    }

    fn step(&mut self, c: u8) -> Result<(), ParseError> {
        match self.state {
            ParseState::Method => match c {
                b' ' => {
                    ensure!(Method::from_bytes(&self.method).is_ok(), ParseError::InvalidMethod);
                    self.state = ParseState::Url;
                }
                b'\r' | b'\n' => return Err(ParseError::invalid_request_line("line break inside method")),
                c => self.method.push(c),
            },

            ParseState::Url => match c {
                b'?' => {
                    self.has_query = true;
                    self.key.clear();
                    self.query.clear();
                    self.state = ParseState::UrlParam;
                }
                b' ' => self.state = ParseState::Version,
                b'\r' | b'\n' => return Err(ParseError::invalid_request_line("line break inside url")),
                c => self.url.push(c),
            },

            ParseState::UrlParam => match c {
                b'=' => {
                    self.value.clear();
                    self.state = ParseState::UrlValue;
                }
                b'&' => self.store_param(),
                b' ' => {
                    self.store_param();
                    self.state = ParseState::Version;
                }
                b'\r' | b'\n' => return Err(ParseError::invalid_request_line("line break inside query")),
                c => self.key.push(c),
            },

            ParseState::UrlValue => match c {
                b'&' => {
                    self.store_param();
                    self.state = ParseState::UrlParam;
                }
                b' ' => {
                    self.store_param();
                    self.state = ParseState::Version;
                }
                b'\r' | b'\n' => return Err(ParseError::invalid_request_line("line break inside query")),
                c => self.value.push(c),
            },

            ParseState::Version => match c {
                b'\r' => {}
                b'\n' => {
                    self.key.clear();
                    self.headers.clear();
                    self.state = ParseState::HeaderKey;
                }
                c => self.version.push(c),
            },

            ParseState::HeaderKey => match c {
                b'\r' | b':' => {}
                b'\n' => {
                    ensure!(self.key.is_empty(), ParseError::invalid_header(format!("header {:?} has no value", String::from_utf8_lossy(&self.key))));
                    self.end_of_headers()?;
                }
                b' ' => {
                    self.value.clear();
                    self.state = ParseState::HeaderValue;
                }
                c => self.key.push(c),
            },

            ParseState::HeaderValue => match c {
                b'\r' => {}
                b'\n' => {
                    self.store_header()?;
                    self.state = ParseState::HeaderKey;
                }
                c => self.value.push(c),
            },

            ParseState::Body | ParseState::Ok => {}
        }

        Ok(())
    }

    /// Stores the pending query pair and resets the scratch buffers.
    fn store_param(&mut self) {
        let key = mem::take(&mut self.key);
        let value = mem::take(&mut self.value);
        if key.is_empty() {
            return;
        }

        let key = lossy(url_decode_form(&key));
        let value = lossy(url_decode_form(&value));
        trace!(%key, %value, "parsed query param");

        self.query
            .entry(key)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    fn store_header(&mut self) -> Result<(), ParseError> {
        let key = mem::take(&mut self.key);
        let value = mem::take(&mut self.value);

        let name = HeaderName::from_bytes(&key).map_err(|_| ParseError::invalid_header(format!("invalid header name {:?}", lossy(key))))?;
        let decoded = url_decode(value.trim_ascii());
        let value = HeaderValue::from_bytes(&decoded).map_err(|_| ParseError::invalid_header(format!("invalid value for header {name}")))?;

        self.headers.insert(name, value);
        Ok(())
    }

    fn end_of_headers(&mut self) -> Result<(), ParseError> {
        let Some(value) = self.headers.get(CONTENT_LENGTH) else {
            self.state = ParseState::Ok;
            return Ok(());
        };

        let text = value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
        let length = text.trim().parse::<usize>().map_err(|_| ParseError::invalid_content_length(format!("value {text} is not a number")))?;
        ensure!(length <= self.max_body_size, ParseError::too_large_body(length, self.max_body_size));

        trace!(length, "expecting request body");
        self.content_length = length;
        self.body.reserve(length);
        self.state = if length == 0 { ParseState::Ok } else { ParseState::Body };
        Ok(())
    }

    /// Appends body bytes up to the declared length, returning how many were used.
    fn take_body(&mut self, input: &[u8]) -> usize {
        let used = input.len().min(self.remaining_body());
        self.body.extend_from_slice(&input[..used]);
        if self.remaining_body() == 0 {
            self.state = ParseState::Ok;
        }
        // whatever follows a complete body is dropped
        input.len()
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
