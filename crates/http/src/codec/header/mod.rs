//! Request head decoding and response head encoding.

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::{Framing, HeaderEncoder, Persistence};
