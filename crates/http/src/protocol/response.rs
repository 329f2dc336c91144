//! Response under construction.
//!
//! A [`Response`] is created per request, filled in by the handler and then
//! split by the connection into a [`ResponseHead`] for the encoder and a
//! [`ResponseBody`] that is either sent at once or streamed from a file.

use std::fs::File;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode, Version};
use mime::Mime;

/// Size information the encoder uses to frame the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Length not known up front, the payload ends when the connection closes
    Unknown,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self { status: StatusCode::OK, version: Version::HTTP_11, headers: HeaderMap::new() }
    }
}

/// Either nothing, an in-memory buffer or an open file.
#[derive(Debug, Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Bytes(Bytes),
    File(File),
}

impl ResponseBody {
    /// Files report their metadata length, or [`PayloadSize::Unknown`] when
    /// the metadata can't be read.
    pub fn payload_size(&self) -> PayloadSize {
        match self {
            ResponseBody::Empty => PayloadSize::Empty,
            ResponseBody::Bytes(bytes) if bytes.is_empty() => PayloadSize::Empty,
            ResponseBody::Bytes(bytes) => PayloadSize::Length(bytes.len() as u64),
            ResponseBody::File(file) => match file.metadata() {
                Ok(metadata) => PayloadSize::Length(metadata.len()),
                Err(_) => PayloadSize::Unknown,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct Response {
    head: ResponseHead,
    body: ResponseBody,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self { head: ResponseHead { status, ..Default::default() }, body: ResponseBody::Empty }
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.head.status = status;
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.head.version = version;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.head.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Replaces the body with an in-memory buffer, dropping any file set before.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = ResponseBody::Bytes(body.into());
    }

    /// Streams `file` as the body, dropping any buffer set before.
    pub fn set_file(&mut self, file: File) {
        self.body = ResponseBody::File(file);
    }

    pub fn set_content_type(&mut self, mime: &Mime) {
        if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
            self.head.headers.insert(CONTENT_TYPE, value);
        }
    }

    /// Sets an HTML body together with its content type.
    pub fn html(&mut self, body: impl Into<Bytes>) {
        self.set_content_type(&mime::TEXT_HTML_UTF_8);
        self.set_body(body);
    }

    pub fn into_parts(self) -> (ResponseHead, ResponseBody) {
        (self.head, self.body)
    }
}
