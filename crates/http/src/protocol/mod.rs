//! Protocol types shared by the codec, the connection and handlers.
//!
//! - [`Message`], [`PayloadItem`], [`PayloadSize`]: a head followed by body
//!   items, and how that body is framed
//! - [`RequestHeader`]: the decoded request head
//! - [`ResponseHead`]: a status line and ordered header list as written by
//!   the handler
//! - [`body`]: the streaming request body handed to handlers
//! - [`HttpError`], [`ParseError`], [`SendError`]: failures while reading
//!   requests and writing responses

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
