//! Incremental receive buffer.

use super::chunk::{Chunk, parse_chunk};
use super::{HttpRequest, HttpResponse, ParseResult};
use bytes::{Buf, Bytes, BytesMut};

/// One decoded frame of a chunked body, detached from the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkFrame {
    Data(Bytes),
    Last,
}

/// Bytes received but not yet consumed by a parse.
///
/// Every `parse_*` method either consumes exactly one complete item from
/// the front and returns it, or returns `Ok(None)` and leaves the buffer
/// untouched so more data can be appended.
#[derive(Debug, Default)]
pub struct Buffer {
    data: BytesMut,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn parse_request(&mut self) -> ParseResult<Option<HttpRequest>> {
        Ok(HttpRequest::parse(&self.data)?.map(|(request, used)| {
            self.data.advance(used);
            request
        }))
    }

    /// Consumes the head only; body bytes stay buffered.
    pub fn parse_response(&mut self) -> ParseResult<Option<HttpResponse>> {
        Ok(HttpResponse::parse(&self.data)?.map(|(response, used)| {
            self.data.advance(used);
            response
        }))
    }

    pub fn parse_chunk(&mut self) -> ParseResult<Option<ChunkFrame>> {
        let Some((chunk, used)) = parse_chunk(&self.data)? else {
            return Ok(None);
        };
        let frame = match chunk {
            Chunk::Data(data) => ChunkFrame::Data(Bytes::copy_from_slice(data)),
            Chunk::Last => ChunkFrame::Last,
        };
        self.data.advance(used);
        Ok(Some(frame))
    }

    /// Remove up to `max` bytes from the front.
    pub fn take(&mut self, max: usize) -> Bytes {
        let n = max.min(self.data.len());
        self.data.split_to(n).freeze()
    }

    pub fn take_all(&mut self) -> Bytes {
        self.data.split().freeze()
    }
}
