//! Parsed HTTP request.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method};

/// A fully parsed request as handed to a [`Handler`](crate::handler::Handler).
///
/// Query values of repeated keys are joined with `", "`.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) has_query: bool,
    pub(crate) query: HashMap<String, String>,
    pub(crate) version: String,
    pub(crate) headers: HeaderMap,
    pub(crate) content_length: usize,
    pub(crate) body: Bytes,
}

impl Request {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The URL-decoded path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the request url carried a `?`, even an empty one.
    pub fn has_query(&self) -> bool {
        self.has_query
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// The protocol version exactly as sent, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The length declared by `Content-Length`, zero when absent.
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parses the body as `application/x-www-form-urlencoded` pairs.
    ///
    /// Pairs are separated by `&` or `;`; pairs without `=` or with an empty
    /// value are skipped, later keys overwrite earlier ones.
    pub fn form(&self) -> HashMap<String, String> {
        self.body
            .split(|&b| b == b';')
            .flat_map(|part| serde_urlencoded::from_bytes::<Vec<(String, String)>>(part).unwrap_or_default())
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .collect()
    }
}
