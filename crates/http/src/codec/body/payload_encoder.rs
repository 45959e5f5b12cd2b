use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, PayloadSize, SendError};
use bytes::{Buf, BufMut, BytesMut};

use tokio_util::codec::Encoder;

/// Encodes response body items according to the framing chosen for the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
    eof: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// `Content-Length` payload
    Length(LengthEncoder),

    /// `Transfer-Encoding: chunked` payload
    Chunked(ChunkedEncoder),

    /// Bytes written as they come, delimited by closing the connection
    UntilClose,

    /// Body is accepted but never written (`HEAD`, empty bodies)
    Discard,
}

impl PayloadEncoder {
    pub fn new(payload_size: PayloadSize) -> Self {
        let kind = match payload_size {
            PayloadSize::Length(length) => Kind::Length(LengthEncoder::new(length)),
            PayloadSize::Chunked => Kind::Chunked(ChunkedEncoder::new()),
            PayloadSize::Empty => Kind::Discard,
        };
        Self { kind, eof: false }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose, eof: false }
    }

    pub fn discard() -> Self {
        Self { kind: Kind::Discard, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::UntilClose | Kind::Discard => self.eof,
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.eof |= item.is_eof();
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::UntilClose => {
                if let PayloadItem::Chunk(bytes) = item {
                    dst.put(bytes);
                }
                Ok(())
            }
            Kind::Discard => Ok(()),
        }
    }
}
