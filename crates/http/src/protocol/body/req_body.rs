use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::sync::mpsc;

/// The consumer side of a request body.
///
/// Single pass: once EOF (or an error) has been observed every further read
/// yields `None`.
#[derive(Debug)]
pub struct ReqBody {
    receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    payload_size: PayloadSize,
    eof: bool,
}

impl ReqBody {
    pub(crate) fn new(receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>, payload_size: PayloadSize) -> Self {
        Self { receiver, payload_size, eof: payload_size.is_empty() }
    }

    /// A body without any bytes.
    pub fn empty() -> Self {
        let (_sender, receiver) = mpsc::channel(1);
        Self::new(receiver, PayloadSize::Empty)
    }

    /// A body whose chunks are all known up front.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        let chunks: Vec<Bytes> = chunks.into_iter().map(Into::into).filter(|chunk| !chunk.is_empty()).collect();
        let length: u64 = chunks.iter().map(|chunk| chunk.len() as u64).sum();

        let (sender, receiver) = mpsc::channel(chunks.len() + 1);
        for chunk in chunks {
            // capacity covers every chunk plus eof
            let _ = sender.try_send(Ok(PayloadItem::Chunk(chunk)));
        }
        let _ = sender.try_send(Ok(PayloadItem::Eof));

        Self::new(receiver, PayloadSize::new_length(length))
    }

    pub fn payload_size(&self) -> PayloadSize {
        self.payload_size
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Blocks the current thread until the next chunk arrives.
    ///
    /// Must not be called from within an async runtime; the connection runs
    /// handlers on the blocking pool for exactly this reason.
    pub fn blocking_next(&mut self) -> Option<Result<Bytes, ParseError>> {
        if self.eof {
            return None;
        }
        let item = self.receiver.blocking_recv();
        self.on_item(item)
    }

    /// Awaits the next chunk.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, ParseError>> {
        if self.eof {
            return None;
        }
        let item = self.receiver.recv().await;
        self.on_item(item)
    }

    fn on_item(&mut self, item: Option<Result<PayloadItem, ParseError>>) -> Option<Result<Bytes, ParseError>> {
        match item {
            Some(Ok(PayloadItem::Chunk(bytes))) => Some(Ok(bytes)),
            Some(Ok(PayloadItem::Eof)) => {
                self.eof = true;
                None
            }
            Some(Err(e)) => {
                self.eof = true;
                Some(Err(e))
            }
            None => {
                self.eof = true;
                Some(Err(ParseError::UnexpectedEof))
            }
        }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.eof {
            return Poll::Ready(None);
        }

        let item = ready!(this.receiver.poll_recv(cx));
        Poll::Ready(this.on_item(item).map(|result| result.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        self.eof
    }

    fn size_hint(&self) -> SizeHint {
        match self.payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}
