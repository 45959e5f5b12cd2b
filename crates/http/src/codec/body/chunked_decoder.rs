//! Decoder for `Transfer-Encoding: chunked` request bodies.
//!
//! Chunk extensions and trailer fields are accepted and discarded.

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use std::cmp;
use tokio_util::codec::Decoder;
use tracing::trace;

/// Longest size line (or trailer line) accepted before giving up.
const MAX_LINE_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting `<hex size>[;ext]\r\n`
    Size,
    /// Inside chunk data, bytes still to read
    Data(u64),
    /// Expecting the CRLF closing a chunk
    DataEnd,
    /// After the last chunk, skipping trailer lines until an empty one
    Trailer,
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size }
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { State::Trailer } else { State::Data(size) };
                }

                State::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = cmp::min(remaining, src.len() as u64);
                    let bytes = src.split_to(len as usize).freeze();
                    self.state = if remaining == len { State::DataEnd } else { State::Data(remaining - len) };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                State::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    ensure!(&src[..2] == b"\r\n", ParseError::invalid_chunk("missing CRLF after chunk data"));
                    src.advance(2);
                    self.state = State::Size;
                }

                State::Trailer => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        trace!("finished reading chunked body");
                        self.state = State::Done;
                    }
                }

                State::Done => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

/// Splits one CRLF terminated line off `src`, without the terminator.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    match src.windows(2).position(|window| window == b"\r\n") {
        Some(end) => {
            let mut line = src.split_to(end + 2);
            line.truncate(end);
            ensure!(!line.contains(&b'\n'), ParseError::invalid_chunk("bare LF in chunk line"));
            Ok(Some(line))
        }
        None => {
            ensure!(src.len() <= MAX_LINE_BYTES, ParseError::invalid_chunk("chunk line too long"));
            Ok(None)
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let size = match line.iter().position(|b| *b == b';') {
        Some(ext) => &line[..ext],
        None => line,
    };
    let size = size.trim_ascii();
    ensure!(!size.is_empty(), ParseError::invalid_chunk("empty chunk size"));

    size.iter().try_fold(0u64, |acc, b| {
        let digit = (*b as char).to_digit(16).ok_or_else(|| ParseError::invalid_chunk("chunk size is not hex"))?;
        acc.checked_mul(16)
            .and_then(|acc| acc.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_chunk("chunk size overflow"))
    })
}
