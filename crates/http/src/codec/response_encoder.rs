//! Response head serialization.
//!
//! Writes the status line, the headers and the blank line that ends the head.
//! The body is never encoded here: in-memory bodies are queued as they are and
//! files are streamed by a [`FileProducer`](crate::connection::FileProducer).

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH};
use http::{HeaderValue, Version};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{PayloadSize, ResponseHead, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

const CLOSE: HeaderValue = HeaderValue::from_static("close");

/// Every response closes its connection, so `Connection: close` is always
/// written and `Content-Length` is filled in whenever the size is known.
#[derive(Debug, Default)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<(ResponseHead, PayloadSize)> for ResponseEncoder {
    type Error = SendError;

    /// # Errors
    ///
    /// Returns `SendError::UnsupportedVersion` for anything newer than HTTP/1.1.
    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        let version = match head.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(SendError::UnsupportedVersion(v));
            }
        };

        dst.reserve(INIT_HEADER_SIZE);
        write!(
            FastWrite(dst),
            "{} {} {}\r\n",
            version,
            head.status.as_str(),
            head.status.canonical_reason().unwrap_or("Unknown")
        )?;

        match payload_size {
            PayloadSize::Length(n) => {
                head.headers.insert(CONTENT_LENGTH, n.into());
            }
            PayloadSize::Empty => {
                head.headers.insert(CONTENT_LENGTH, 0.into());
            }
            PayloadSize::Unknown => {
                head.headers.remove(CONTENT_LENGTH);
            }
        }
        head.headers.insert(CONNECTION, CLOSE);

        for (header_name, header_value) in head.headers.iter() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use http::header::{DATE, SERVER};

    fn encode(head: ResponseHead, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        ResponseEncoder::new().encode((head, payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn status_line_and_headers() {
        let mut head = ResponseHead::default();
        head.headers.insert(SERVER, HeaderValue::from_static("test"));
        head.headers.insert(DATE, HeaderValue::from_static("Tue, 15 Nov 1994 08:12:31 GMT"));

        let encoded = encode(head, PayloadSize::Length(12));
        assert!(encoded.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(encoded.contains("\r\nserver: test\r\n"));
        assert!(encoded.contains("\r\ndate: Tue, 15 Nov 1994 08:12:31 GMT\r\n"));
        assert!(encoded.contains("\r\ncontent-length: 12\r\n"));
        assert!(encoded.contains("\r\nconnection: close\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));
    }

    #[test]
    fn not_found_without_body() {
        let head = ResponseHead { status: StatusCode::NOT_FOUND, ..Default::default() };
        let encoded = encode(head, PayloadSize::Empty);
        assert!(encoded.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(encoded.contains("content-length: 0\r\n"));
    }

    #[test]
    fn unknown_size_drops_content_length() {
        let mut head = ResponseHead { version: Version::HTTP_10, ..Default::default() };
        head.headers.insert(CONTENT_LENGTH, 99.into());

        let encoded = encode(head, PayloadSize::Unknown);
        assert!(encoded.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(!encoded.contains("content-length"));
    }

    #[test]
    fn http2_is_rejected() {
        let head = ResponseHead { version: Version::HTTP_2, ..Default::default() };
        let result = ResponseEncoder::new().encode((head, PayloadSize::Empty), &mut BytesMut::new());
        assert!(matches!(result, Err(SendError::UnsupportedVersion(Version::HTTP_2))));
    }
}
