use crate::codec::body::PayloadEncoder;
use crate::codec::header::{Framing, HeaderEncoder, Persistence};
use crate::protocol::{Message, PayloadSize, RequestHeader, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use http::{Method, Version};
use tokio_util::codec::Encoder;
use tracing::error;

/// Encodes a response head followed by its payload items.
///
/// Call [`ResponseEncoder::prepare`] with each request before encoding its
/// response, so the framing suits the peer: HTTP/1.0 clients never get a
/// chunked body (it is close-delimited instead) and `HEAD` responses keep
/// their framing headers but drop the body bytes.
#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
    version: Version,
    keep_alive: bool,
    head_request: bool,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn prepare(&mut self, request: &RequestHeader) {
        self.version = request.version();
        self.keep_alive = request.keep_alive();
        self.head_request = request.method() == Method::HEAD;
    }

    /// Announces `Connection: close` on the next head.
    pub fn close_after_response(&mut self) {
        self.keep_alive = false;
    }

    /// Whether the connection may carry another request after this response.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// `true` when no response body is in flight.
    pub fn is_idle(&self) -> bool {
        self.payload_encoder.is_none()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None, version: Version::HTTP_11, keep_alive: true, head_request: false }
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(SendError::invalid_head("previous response body is unfinished"));
                }

                let framing = match payload_size {
                    PayloadSize::Length(length) => Framing::Length(length),
                    PayloadSize::Empty => Framing::Length(0),
                    PayloadSize::Chunked if self.version == Version::HTTP_10 => {
                        self.keep_alive = false;
                        Framing::UntilClose
                    }
                    PayloadSize::Chunked => Framing::Chunked,
                };

                let persistence = match (self.keep_alive, self.version) {
                    (false, _) => Persistence::Close,
                    (true, Version::HTTP_10) => Persistence::KeepAlive,
                    (true, _) => Persistence::Implicit,
                };

                self.header_encoder.encode((head, framing, persistence), dst)?;

                let payload_encoder = match framing {
                    _ if self.head_request => PayloadEncoder::discard(),
                    Framing::UntilClose => PayloadEncoder::until_close(),
                    _ => PayloadEncoder::new(payload_size),
                };
                self.payload_encoder = Some(payload_encoder);
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response header but receive payload item");
                    return Err(SendError::invalid_body("payload before response head"));
                };

                let result = payload_encoder.encode(payload_item, dst);
                if result.is_err() || payload_encoder.is_finish() {
                    self.payload_encoder = None;
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::Request;

    fn request(method: Method, version: Version) -> RequestHeader {
        Request::builder().method(method).version(version).uri("/").body(()).unwrap().into()
    }

    fn encode_response(encoder: &mut ResponseEncoder, payload_size: PayloadSize, chunks: &[&'static [u8]]) -> String {
        let mut dst = BytesMut::new();
        let head = ResponseHead::new("200 OK", vec![("Server".into(), "test".into())]);
        encoder.encode(Message::<_, Bytes>::Header((head, payload_size)), &mut dst).unwrap();
        for chunk in chunks {
            encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Chunk(Bytes::from_static(chunk))), &mut dst).unwrap();
        }
        encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut dst).unwrap();
        assert!(encoder.is_idle());
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn chunked_response() {
        let mut encoder = ResponseEncoder::new();
        encoder.prepare(&request(Method::GET, Version::HTTP_11));

        let wire = encode_response(&mut encoder, PayloadSize::Chunked, &[b"Hello", b" World"]);
        assert_eq!(wire, "HTTP/1.1 200 OK\r\nServer: test\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n");
        assert!(encoder.keep_alive());
    }

    #[test]
    fn http10_gets_close_delimited_body() {
        let mut encoder = ResponseEncoder::new();
        encoder.prepare(&request(Method::GET, Version::HTTP_10));

        let wire = encode_response(&mut encoder, PayloadSize::Chunked, &[b"Hello", b" World"]);
        assert_eq!(wire, "HTTP/1.1 200 OK\r\nServer: test\r\nConnection: close\r\n\r\nHello World");
        assert!(!encoder.keep_alive());
    }

    #[test]
    fn head_response_has_no_body() {
        let mut encoder = ResponseEncoder::new();
        encoder.prepare(&request(Method::HEAD, Version::HTTP_11));

        let wire = encode_response(&mut encoder, PayloadSize::Length(11), &[b"Hello World"]);
        assert_eq!(wire, "HTTP/1.1 200 OK\r\nServer: test\r\nContent-Length: 11\r\n\r\n");
    }

    #[test]
    fn payload_without_head_fails() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        let result = encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut dst);
        assert!(result.is_err());
    }
}
