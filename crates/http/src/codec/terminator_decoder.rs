//! Terminator based framing for byte streams.
//!
//! The decoder turns a raw inbound buffer into a sequence of [`Collected`]
//! items: runs of data followed by a [`Collected::Terminator`] marker whenever
//! the configured delimiter is seen. Data is handed out as soon as it is known
//! not to be part of the delimiter, so only a possible terminator prefix at the
//! very end of the buffer is ever held back.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//! use webconfig_http::codec::{Collected, TerminatorDecoder};
//!
//! let mut decoder = TerminatorDecoder::new("\r\n");
//! let mut buf = BytesMut::from("hello\r");
//!
//! // "\r" may start the terminator, so only "hello" is released
//! assert_eq!(decoder.decode(&mut buf)?, Some(Collected::Data("hello".into())));
//! assert_eq!(decoder.decode(&mut buf)?, None);
//!
//! buf.extend_from_slice(b"\nworld");
//! assert_eq!(decoder.decode(&mut buf)?, Some(Collected::Terminator));
//! assert_eq!(decoder.decode(&mut buf)?, Some(Collected::Data("world".into())));
//! # Ok::<(), webconfig_http::protocol::ParseError>(())
//! ```

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::protocol::ParseError;

/// An item produced by [`TerminatorDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collected {
    /// Bytes belonging to the current segment, terminator excluded
    Data(Bytes),
    /// The terminator was consumed, the current segment is complete
    Terminator,
}

/// Splits a byte stream on a configurable terminator.
///
/// An empty terminator disables framing: every byte is released as data.
#[derive(Debug, Clone, Default)]
pub struct TerminatorDecoder {
    terminator: Bytes,
}

impl TerminatorDecoder {
    pub fn new(terminator: impl Into<Bytes>) -> Self {
        Self { terminator: terminator.into() }
    }

    pub fn terminator(&self) -> &[u8] {
        &self.terminator
    }

    pub fn set_terminator(&mut self, terminator: impl Into<Bytes>) {
        self.terminator = terminator.into();
    }
}

impl Decoder for TerminatorDecoder {
    type Item = Collected;
    type Error = ParseError;

    /// Takes the next item out of `src`, or `None` if nothing can be released
    /// until more bytes arrive. Framing itself never fails.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if self.terminator.is_empty() {
            return Ok(Some(Collected::Data(src.split().freeze())));
        }

        let item = match find(src, &self.terminator) {
            Some(0) => {
                src.advance(self.terminator.len());
                Some(Collected::Terminator)
            }
            Some(index) => Some(Collected::Data(src.split_to(index).freeze())),
            None => {
                let keep = find_prefix_at_end(src, &self.terminator);
                let release = src.len() - keep;
                (release > 0).then(|| Collected::Data(src.split_to(release).freeze()))
            }
        };
        Ok(item)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Returns the length of the longest suffix of `haystack` that is a proper
/// prefix of `needle`.
pub fn find_prefix_at_end(haystack: &[u8], needle: &[u8]) -> usize {
    let longest = needle.len().saturating_sub(1).min(haystack.len());
    (1..=longest).rev().find(|&len| haystack.ends_with(&needle[..len])).unwrap_or(0)
}
