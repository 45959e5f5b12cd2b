//! Request body streaming.
//!
//! The connection reads payload items off the wire and forwards them through a
//! bounded channel to a [`ReqBody`], which may be consumed either from a
//! blocking thread ([`ReqBody::blocking_next`]) or asynchronously through
//! `http_body::Body`. The bounded channel is the backpressure: a handler that
//! reads slowly stalls the reader instead of buffering the whole body.
//!
//! The producer half, [`BodySender`], always drains the payload off the wire
//! even when the handler stopped reading, so the next request on a keep-alive
//! connection starts at a message boundary.

mod req_body;

pub use req_body::ReqBody;

use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, trace};

/// Number of payload items that may sit between the wire and the handler.
const BODY_CHANNEL_SIZE: usize = 8;

pub(crate) fn body_channel(payload_size: PayloadSize) -> (BodySender, ReqBody) {
    let (sender, receiver) = mpsc::channel(BODY_CHANNEL_SIZE);
    (BodySender::new(sender), ReqBody::new(receiver, payload_size))
}

pub(crate) struct BodySender {
    sender: Option<mpsc::Sender<Result<PayloadItem, ParseError>>>,
    eof: bool,
}

impl BodySender {
    fn new(sender: mpsc::Sender<Result<PayloadItem, ParseError>>) -> Self {
        Self { sender: Some(sender), eof: false }
    }

    /// Forwards payload items to the [`ReqBody`] until EOF.
    ///
    /// Once the receiving side is dropped the items are still read, only no
    /// longer forwarded.
    pub(crate) async fn send_body<S>(&mut self, payload_stream: &mut S) -> Result<(), ParseError>
    where
        S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
    {
        while !self.eof {
            let payload_item = match read_data(payload_stream).await {
                Ok(payload_item) => payload_item,
                Err(e) => {
                    error!(cause = %e, "failed to read request body");
                    self.eof = true;
                    if let Some(sender) = self.sender.take() {
                        // the receiver may already be gone, nothing left to tell
                        let _ = sender.send(Err(ParseError::invalid_body(e.to_string()))).await;
                    }
                    return Err(e);
                }
            };

            self.eof = payload_item.is_eof();

            if let Some(sender) = &self.sender
                && sender.send(Ok(payload_item)).await.is_err()
            {
                trace!("request body receiver dropped, draining the rest");
                self.sender = None;
            }
        }

        Ok(())
    }

    /// Drops the channel and discards whatever is left of the payload.
    pub(crate) async fn skip_body<S>(&mut self, payload_stream: &mut S) -> Result<(), ParseError>
    where
        S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
    {
        self.sender = None;
        while !self.eof {
            let payload_item = read_data(payload_stream).await.inspect_err(|_| self.eof = true)?;
            self.eof = payload_item.is_eof();
        }
        Ok(())
    }
}

async fn read_data<S>(payload_stream: &mut S) -> Result<PayloadItem, ParseError>
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    match payload_stream.next().await {
        Some(Ok(Message::Payload(payload_item))) => Ok(payload_item),
        Some(Ok(Message::Header(_))) => {
            error!("should not receive header while reading the request body");
            Err(ParseError::invalid_body("received header while reading the request body"))
        }
        Some(Err(e)) => Err(e),
        None => Err(ParseError::UnexpectedEof),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    type Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>;

    fn payload(items: Vec<PayloadItem>) -> impl Stream<Item = Item> + Unpin {
        stream::iter(items.into_iter().map(|item| Ok(Message::Payload(item))))
    }

    #[tokio::test]
    async fn forwards_chunks_until_eof() {
        let (mut sender, mut body) = body_channel(PayloadSize::Length(10));
        let mut stream = payload(vec![
            PayloadItem::Chunk(Bytes::from_static(b"Hello")),
            PayloadItem::Chunk(Bytes::from_static(b"World")),
            PayloadItem::Eof,
        ]);

        sender.send_body(&mut stream).await.unwrap();

        assert_eq!(body.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"Hello"));
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"World"));
        assert!(body.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn keeps_draining_after_receiver_dropped() {
        let (mut sender, body) = body_channel(PayloadSize::Chunked);
        drop(body);

        let chunks = (0..BODY_CHANNEL_SIZE * 2).map(|_| PayloadItem::Chunk(Bytes::from_static(b"x")));
        let mut stream = payload(chunks.chain(std::iter::once(PayloadItem::Eof)).collect());

        sender.send_body(&mut stream).await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn skip_consumes_the_rest() {
        let (mut sender, _body) = body_channel(PayloadSize::Length(3));
        let mut stream = payload(vec![PayloadItem::Chunk(Bytes::from_static(b"abc")), PayloadItem::Eof]);

        sender.skip_body(&mut stream).await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let (mut sender, mut body) = body_channel(PayloadSize::Length(10));
        let mut stream = payload(vec![PayloadItem::Chunk(Bytes::from_static(b"abc"))]);

        assert!(matches!(sender.send_body(&mut stream).await, Err(ParseError::UnexpectedEof)));
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert!(body.next_chunk().await.unwrap().is_err());
    }
}
