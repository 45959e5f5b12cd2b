use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

/// Writes exactly `length` body bytes.
///
/// Anything more or less than the advertised length is an error: the head has
/// already promised the client a size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                let size = bytes.remaining() as u64;
                if size > self.length {
                    return Err(SendError::invalid_body(format!("{} bytes over content-length", size - self.length)));
                }
                self.length -= size;
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let len = chunk.len();
                    dst.extend_from_slice(chunk);
                    bytes.advance(len);
                }
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                if self.length > 0 {
                    return Err(SendError::invalid_body(format!("body ended {} bytes short of content-length", self.length)));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn exact_length() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"Hel")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"lo")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert!(encoder.is_finish());
        assert_eq!(&dst[..], b"Hello");
    }

    #[test]
    fn short_and_long_bodies_fail() {
        let mut dst = BytesMut::new();

        let mut encoder = LengthEncoder::new(5);
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"Hel")), &mut dst).unwrap();
        assert!(encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).is_err());

        let mut encoder = LengthEncoder::new(2);
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"Hel")), &mut dst).is_err());
    }
}
