use std::fs::File;
use std::io::{self, ErrorKind, Read};

use bytes::{Bytes, BytesMut};

/// Default chunk size of [`SimpleProducer`] and [`FileProducer`]
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// A lazy source of outbound bytes.
///
/// [`more`](Self::more) is called whenever the outbound buffer has room; an
/// empty chunk means the producer is exhausted and is removed from the queue.
pub trait Producer {
    fn more(&mut self) -> io::Result<Bytes>;
}

impl<F> Producer for F
where
    F: FnMut() -> io::Result<Bytes>,
{
    fn more(&mut self) -> io::Result<Bytes> {
        self()
    }
}

/// Hands out an in-memory buffer in fixed size slices.
#[derive(Debug)]
pub struct SimpleProducer {
    data: Bytes,
    chunk_size: usize,
}

impl SimpleProducer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_chunk_size(data, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self { data: data.into(), chunk_size: chunk_size.max(1) }
    }
}

impl Producer for SimpleProducer {
    fn more(&mut self) -> io::Result<Bytes> {
        let n = self.data.len().min(self.chunk_size);
        Ok(self.data.split_to(n))
    }
}

/// Streams an open file, reading it lazily one chunk per call.
#[derive(Debug)]
pub struct FileProducer {
    file: File,
    chunk_size: usize,
}

impl FileProducer {
    pub fn new(file: File) -> Self {
        Self::with_chunk_size(file, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(file: File, chunk_size: usize) -> Self {
        Self { file, chunk_size: chunk_size.max(1) }
    }
}

impl Producer for FileProducer {
    fn more(&mut self) -> io::Result<Bytes> {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let n = loop {
            match self.file.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        buf.truncate(n);
        Ok(buf.freeze())
    }
}
