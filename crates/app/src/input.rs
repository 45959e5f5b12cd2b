//! The request body as seen by applications.

use std::cmp;
use std::io;

use bytes::{Buf, Bytes, BytesMut};
use micro_http::protocol::ParseError;
use micro_http::protocol::body::ReqBody;

/// A single-pass, blocking reader over the request body.
///
/// Bytes stream in from the connection as the application reads them; the
/// body is never buffered in full unless the application asks for all of it.
/// Once the body is exhausted every read returns empty bytes.
///
/// The inherent `read`, `read_line` and `read_to_end` shadow the
/// [`io::Read`] / [`io::BufRead`] methods of the same name; the trait impls
/// are there for APIs taking `impl Read` or `impl BufRead`.
#[derive(Debug)]
pub struct Input {
    body: ReqBody,
    buffer: Bytes,
}

impl Input {
    pub fn new(body: ReqBody) -> Self {
        Self { body, buffer: Bytes::new() }
    }

    pub fn empty() -> Self {
        Self::new(ReqBody::empty())
    }

    /// Reads `size` bytes, or fewer at the end of the body. `None` reads
    /// everything that is left.
    pub fn read(&mut self, size: Option<usize>) -> io::Result<Bytes> {
        let Some(size) = size else {
            return self.read_to_end();
        };

        let mut out = BytesMut::new();
        while out.len() < size && self.fill()? {
            let n = cmp::min(size - out.len(), self.buffer.len());
            out.extend_from_slice(&self.buffer.split_to(n));
        }
        Ok(out.freeze())
    }

    /// Reads up to and including the next `\n`, stopping early after `limit`
    /// bytes or at the end of the body.
    pub fn read_line(&mut self, limit: Option<usize>) -> io::Result<Bytes> {
        let mut line = BytesMut::new();
        loop {
            if limit.is_some_and(|limit| line.len() >= limit) || !self.fill()? {
                break;
            }

            let window = limit.map_or(self.buffer.len(), |limit| cmp::min(limit - line.len(), self.buffer.len()));
            match self.buffer[..window].iter().position(|b| *b == b'\n') {
                Some(index) => {
                    line.extend_from_slice(&self.buffer.split_to(index + 1));
                    break;
                }
                None => line.extend_from_slice(&self.buffer.split_to(window)),
            }
        }
        Ok(line.freeze())
    }

    /// Reads lines until the end of the body, or until at least `hint` bytes
    /// have been read.
    pub fn read_lines(&mut self, hint: Option<usize>) -> io::Result<Vec<Bytes>> {
        let mut lines = Vec::new();
        let mut total = 0;
        loop {
            let line = self.read_line(None)?;
            if line.is_empty() {
                break;
            }
            total += line.len();
            lines.push(line);
            if hint.is_some_and(|hint| hint > 0 && total >= hint) {
                break;
            }
        }
        Ok(lines)
    }

    pub fn read_to_end(&mut self) -> io::Result<Bytes> {
        let mut out = BytesMut::new();
        while self.fill()? {
            out.extend_from_slice(&self.buffer);
            self.buffer.clear();
        }
        Ok(out.freeze())
    }

    /// `true` once the body has been fully consumed.
    pub fn is_exhausted(&self) -> bool {
        self.buffer.is_empty() && self.body.is_eof()
    }

    /// Makes sure `buffer` holds unread bytes, returning `false` at the end of
    /// the body.
    fn fill(&mut self) -> io::Result<bool> {
        while self.buffer.is_empty() {
            match self.body.blocking_next() {
                Some(Ok(chunk)) => self.buffer = chunk,
                Some(Err(e)) => return Err(into_io_error(e)),
                None => return Ok(false),
            }
        }
        Ok(true)
    }
}

impl io::Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || !self.fill()? {
            return Ok(0);
        }
        let n = cmp::min(buf.len(), self.buffer.len());
        buf[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);
        Ok(n)
    }
}

impl io::BufRead for Input {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.fill()?;
        Ok(&self.buffer)
    }

    fn consume(&mut self, amt: usize) {
        self.buffer.advance(cmp::min(amt, self.buffer.len()));
    }
}

fn into_io_error(e: ParseError) -> io::Error {
    match e {
        ParseError::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        e => io::Error::new(io::ErrorKind::InvalidData, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Read};

    fn input(chunks: &[&'static str]) -> Input {
        Input::new(ReqBody::from_chunks(chunks.iter().copied().map(str::as_bytes)))
    }

    #[test]
    fn sized_reads_cross_chunks() {
        let mut input = input(&["Hel", "lo W", "orld"]);
        assert_eq!(input.read(Some(5)).unwrap(), "Hello");
        assert_eq!(input.read(Some(0)).unwrap(), "");
        assert_eq!(input.read(None).unwrap(), " World");
        assert!(input.is_exhausted());
        assert_eq!(input.read(Some(5)).unwrap(), "");
        assert_eq!(input.read_to_end().unwrap(), "");
    }

    #[test]
    fn lines() {
        let mut input = input(&["first\nsec", "ond\n", "third"]);
        assert_eq!(input.read_line(None).unwrap(), "first\n");
        assert_eq!(input.read_line(Some(3)).unwrap(), "sec");
        assert_eq!(input.read_lines(None).unwrap(), vec![Bytes::from("ond\n"), Bytes::from("third")]);
        assert_eq!(input.read_line(None).unwrap(), "");
    }

    #[test]
    fn read_lines_stops_at_hint() {
        let mut input = input(&["a\nb\nc\n"]);
        assert_eq!(input.read_lines(Some(3)).unwrap(), vec![Bytes::from("a\n"), Bytes::from("b\n")]);
        assert_eq!(input.read_lines(None).unwrap(), vec![Bytes::from("c\n")]);
    }

    #[test]
    fn std_io_traits() {
        let mut input = input(&["one\ntwo", "\n"]);
        let mut line = String::new();
        BufRead::read_line(&mut input, &mut line).unwrap();
        assert_eq!(line, "one\n");

        let mut rest = Vec::new();
        Read::read_to_end(&mut input, &mut rest).unwrap();
        assert_eq!(rest, b"two\n");
    }

    #[test]
    fn empty_body() {
        let mut input = Input::empty();
        assert!(input.is_exhausted());
        assert_eq!(input.read(None).unwrap(), "");
        assert_eq!(input.read_line(None).unwrap(), "");
    }
}
