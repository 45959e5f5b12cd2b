//! HTTP/1.1 wire codec.
//!
//! [`RequestDecoder`] and [`ResponseEncoder`] plug into `tokio_util`'s
//! `FramedRead` / `FramedWrite`. Both work on [`Message`](crate::protocol::Message)s:
//! a head followed by payload items ending in EOF.
//!
//! ```
//! use bytes::BytesMut;
//! use micro_http::codec::RequestDecoder;
//! use micro_http::protocol::Message;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let message = decoder.decode(&mut buffer).unwrap();
//! assert!(matches!(message, Some(Message::Header(_))));
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
