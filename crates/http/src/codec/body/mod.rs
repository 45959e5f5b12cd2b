//! Body framing for both directions.
//!
//! Requests are decoded by [`PayloadDecoder`] (content-length or chunked),
//! responses are encoded by [`PayloadEncoder`], which additionally knows how
//! to write a close-delimited body for HTTP/1.0 peers and how to swallow the
//! body of a `HEAD` response.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
