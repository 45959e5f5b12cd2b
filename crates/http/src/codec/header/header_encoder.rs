//! Response head encoding.
//!
//! The status line is written exactly as the application produced it and the
//! application headers keep their order and casing. Framing headers
//! (`Content-Length`, `Transfer-Encoding`, `Connection`) belong to the
//! transport: any the application supplied are skipped and the encoder writes
//! its own from the chosen [`Framing`].

use crate::ensure;
use crate::protocol::{ResponseHead, SendError};

use bytes::{BufMut, BytesMut};
use std::fmt::Write;
use tokio_util::codec::Encoder;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// How the body following a head is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Length(u64),
    Chunked,
    /// No framing header, the body ends when the connection closes
    UntilClose,
}

/// Connection persistence to announce in the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Default for the protocol version, nothing to write
    Implicit,
    KeepAlive,
    Close,
}

#[derive(Debug, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, Framing, Persistence)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, Framing, Persistence), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, framing, persistence) = item;

        // validate everything first, a rejected head must leave `dst` untouched
        ensure!(is_single_line(head.status()), SendError::invalid_head("status line contains CR or LF"));
        for (name, value) in head.headers() {
            ensure!(
                !name.is_empty() && is_single_line(name) && !name.contains(':'),
                SendError::invalid_head(format!("invalid header name {name:?}"))
            );
            ensure!(is_single_line(value), SendError::invalid_head(format!("header {name} has CR or LF in its value")));
        }

        dst.reserve(INIT_HEADER_SIZE);
        dst.put_slice(b"HTTP/1.1 ");
        dst.put_slice(head.status().as_bytes());
        dst.put_slice(b"\r\n");

        for (name, value) in head.headers() {
            if is_framing_header(name) {
                continue;
            }
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }

        match framing {
            Framing::Length(length) => {
                write!(dst, "Content-Length: {length}\r\n").map_err(|_| SendError::invalid_head("write content-length"))?;
            }
            Framing::Chunked => dst.put_slice(b"Transfer-Encoding: chunked\r\n"),
            Framing::UntilClose => {}
        }

        match persistence {
            Persistence::Implicit => {}
            Persistence::KeepAlive => dst.put_slice(b"Connection: keep-alive\r\n"),
            Persistence::Close => dst.put_slice(b"Connection: close\r\n"),
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn is_framing_header(name: &str) -> bool {
    ["content-length", "transfer-encoding", "connection"].iter().any(|framing| name.eq_ignore_ascii_case(framing))
}

fn is_single_line(s: &str) -> bool {
    !s.bytes().any(|b| b == b'\r' || b == b'\n')
}
