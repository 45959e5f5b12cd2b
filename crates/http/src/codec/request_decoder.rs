//! Streaming request decoder.
//!
//! Yields one `Message::Header` per request followed by its payload items; the
//! last item of every request (even a bodiless one) is `PayloadItem::Eof`.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// `payload_decoder` is `None` while waiting for a head and `Some` while the
/// body of the last decoded head is being read.
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder = None;
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            // a body cut short by the peer closing
            None if self.payload_decoder.is_some() => Err(ParseError::UnexpectedEof),
            None if !buf.is_empty() => Err(ParseError::invalid_header("connection closed in the middle of a request head")),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Method;
    use indoc::indoc;

    #[test]
    fn pipelined_requests() {
        let str = indoc! {r##"
        POST /echo HTTP/1.1
        Content-Length: 5

        HelloGET / HTTP/1.1
        Host: localhost

        "##};

        let mut buf = BytesMut::from(str);
        let mut decoder = RequestDecoder::new();

        let Some(Message::Header((header, payload_size))) = decoder.decode(&mut buf).unwrap() else {
            panic!("expect header");
        };
        assert_eq!(header.method(), &Method::POST);
        assert_eq!(payload_size, PayloadSize::Length(5));

        let item = decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap();
        assert_eq!(item, PayloadItem::Chunk(Bytes::from_static(b"Hello")));
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());

        let Some(Message::Header((header, payload_size))) = decoder.decode(&mut buf).unwrap() else {
            panic!("expect header");
        };
        assert_eq!(header.method(), &Method::GET);
        assert!(payload_size.is_empty());
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn truncated_body_at_eof() {
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        let mut decoder = RequestDecoder::new();

        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_header());
        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_payload());
        assert!(matches!(decoder.decode_eof(&mut buf), Err(ParseError::UnexpectedEof)));
    }
}
