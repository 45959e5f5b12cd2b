use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt::Write;

use tokio_util::codec::Encoder;

/// Frames each chunk as `<hex size>\r\n<data>\r\n`, ending with `0\r\n\r\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                // an empty chunk would read as the terminator
                if !bytes.has_remaining() {
                    return Ok(());
                }
                write!(dst, "{:X}\r\n", bytes.remaining()).map_err(|_| SendError::invalid_body("chunk size write failed"))?;
                dst.reserve(bytes.remaining() + 2);
                dst.put(bytes);
                dst.put_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.put_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}
