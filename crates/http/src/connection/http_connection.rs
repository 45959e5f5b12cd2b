use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::ensure;
use crate::handler::{ConnectionInfo, Handler, Request, ResponseWriter};
use crate::protocol::body::body_channel;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError};

/// Response frames buffered between the handler thread and the connection.
const FRAME_CHANNEL_SIZE: usize = 16;

type ResponseMessage = Message<(ResponseHead, PayloadSize)>;

/// An HTTP/1.1 connection: reads requests, runs the [`Handler`] for each one
/// on the blocking pool, and streams its response back.
///
/// While the handler runs, the connection concurrently pumps the request body
/// into the handler's [`ReqBody`](crate::protocol::body::ReqBody) and writes
/// whatever response frames the handler produced. Once the response is done
/// any unread body is drained so the next request starts on a message
/// boundary.
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    connection_info: ConnectionInfo,
}

/// What the handler thread sends to the connection.
#[derive(Debug)]
enum Frame {
    Head(ResponseHead, PayloadSize),
    Chunk(Bytes),
    End,
    Abort,
}

#[derive(Debug)]
enum ResponseState {
    AwaitingHead,
    Streaming,
    Complete,
    Aborted,
    /// the head was refused by the encoder, nothing reached the wire
    HeadRejected,
    Failed(SendError),
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            connection_info: ConnectionInfo::default(),
        }
    }

    pub fn with_connection_info(mut self, connection_info: ConnectionInfo) -> Self {
        self.connection_info = connection_info;
        self
    }

    /// Serves requests until the peer goes away or the connection can't be reused.
    pub async fn process<H: Handler>(mut self, handler: Arc<H>) -> Result<(), HttpError> {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    let keep_alive = self.do_process(header, payload_size, &handler).await?;
                    if !keep_alive {
                        debug!("connection is not reusable, shutting down");
                        self.framed_write.get_mut().shutdown().await.map_err(SendError::io)?;
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive request body while expecting a request head");
                    self.send_error_response(handler.as_ref(), StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("payload without request head").into());
                }

                Some(Err(ParseError::Io { source })) => {
                    info!(cause = %source, "can't read request, connection shutdown");
                    return Err(ParseError::io(source).into());
                }

                Some(Err(e)) => {
                    warn!(cause = %e, "can't parse request");
                    let status = match &e {
                        ParseError::TooLargeHeader { .. } | ParseError::TooManyHeaders { .. } => {
                            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
                        }
                        ParseError::InvalidVersion(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
                        _ => StatusCode::BAD_REQUEST,
                    };
                    self.send_error_response(handler.as_ref(), status).await?;
                    return Err(e.into());
                }

                None => {
                    debug!("peer closed the connection");
                    return Ok(());
                }
            }
        }
    }

    /// Serves one request, returning whether the connection may be reused.
    async fn do_process<H: Handler>(
        &mut self,
        header: RequestHeader,
        payload_size: PayloadSize,
        handler: &Arc<H>,
    ) -> Result<bool, HttpError> {
        if header.expects_continue() && !payload_size.is_empty() {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            debug!("receive expect request header, sent continue response");
        }

        debug!(method = %header.method(), uri = %header.uri(), "receive request");
        self.framed_write.encoder_mut().prepare(&header);

        let (mut body_sender, req_body) = body_channel(payload_size);
        let request = Request::new(header, req_body).with_connection_info(self.connection_info);

        let (frame_sender, mut frame_receiver) = mpsc::channel(FRAME_CHANNEL_SIZE);
        let task_handler = Arc::clone(handler);
        let handler_task = tokio::task::spawn_blocking(move || {
            let mut writer = ChannelWriter::new(frame_sender);
            task_handler.handle(request, &mut writer);
        });

        let mut state = ResponseState::AwaitingHead;
        let mut body_result = None;
        {
            let Self { framed_read, framed_write, .. } = self;

            // Both sides make progress together: the handler may be blocked on
            // the body while earlier response frames wait to be written.
            let body_future = body_sender.send_body(framed_read);
            tokio::pin!(body_future);

            loop {
                select! {
                    biased;

                    frame = frame_receiver.recv() => {
                        let Some(frame) = frame else { break };
                        state = write_frame(framed_write, frame, state).await;
                        if !matches!(state, ResponseState::AwaitingHead | ResponseState::Streaming) {
                            break;
                        }
                    }

                    result = &mut body_future, if body_result.is_none() => {
                        body_result = Some(result);
                    }
                }
            }
        }

        // unblocks a handler still sending frames
        drop(frame_receiver);
        let body_ok = !matches!(body_result, Some(Err(_)));

        let keep_alive = match state {
            ResponseState::Complete => {
                let drained = body_sender.skip_body(&mut self.framed_read).await.is_ok();
                join_handler(handler_task).await;
                body_ok && drained && self.framed_write.encoder().keep_alive()
            }

            ResponseState::AwaitingHead | ResponseState::HeadRejected => {
                let drained = body_sender.skip_body(&mut self.framed_read).await.is_ok();
                join_handler(handler_task).await;
                warn!("request handler produced no response, sending internal server error");
                if !(body_ok && drained) {
                    self.framed_write.encoder_mut().close_after_response();
                }
                self.send_error_response(handler.as_ref(), StatusCode::INTERNAL_SERVER_ERROR).await?;
                self.framed_write.encoder().keep_alive()
            }

            ResponseState::Streaming | ResponseState::Aborted => {
                drop(body_sender);
                join_handler(handler_task).await;
                warn!("response aborted before completion, closing connection");
                // best effort, the peer sees a truncated response either way
                let _ = SinkExt::<ResponseMessage>::flush(&mut self.framed_write).await;
                false
            }

            ResponseState::Failed(e) => {
                drop(body_sender);
                join_handler(handler_task).await;
                return Err(e.into());
            }
        };

        Ok(keep_alive)
    }

    async fn send_error_response<H: Handler + ?Sized>(&mut self, handler: &H, status: StatusCode) -> Result<(), HttpError> {
        ensure!(self.framed_write.encoder().is_idle(), SendError::invalid_head("response already in flight").into());

        let (head, body) = handler.error_response(status);
        let payload_size = PayloadSize::new_length(body.len() as u64);

        self.framed_write.feed(ResponseMessage::Header((head, payload_size))).await?;
        if !body.is_empty() {
            self.framed_write.feed(ResponseMessage::Payload(PayloadItem::Chunk(body))).await?;
        }
        self.framed_write.send(ResponseMessage::Payload(PayloadItem::Eof)).await?;
        Ok(())
    }
}

async fn write_frame<W>(framed_write: &mut FramedWrite<W, ResponseEncoder>, frame: Frame, state: ResponseState) -> ResponseState
where
    W: AsyncWrite + Unpin,
{
    let result = match (frame, &state) {
        (Frame::Head(head, payload_size), ResponseState::AwaitingHead) => {
            match framed_write.feed(ResponseMessage::Header((head, payload_size))).await {
                Ok(()) => return ResponseState::Streaming,
                Err(SendError::InvalidHead { reason }) => {
                    error!(%reason, "response head rejected");
                    return ResponseState::HeadRejected;
                }
                Err(e) => Err(e),
            }
        }
        (Frame::Chunk(bytes), ResponseState::Streaming) => {
            framed_write.send(ResponseMessage::Payload(PayloadItem::Chunk(bytes))).await
        }
        (Frame::End, ResponseState::Streaming) => {
            return match framed_write.send(ResponseMessage::Payload(PayloadItem::Eof)).await {
                Ok(()) => ResponseState::Complete,
                Err(SendError::InvalidBody { reason }) => {
                    error!(%reason, "response body does not match its framing");
                    ResponseState::Aborted
                }
                Err(e) => ResponseState::Failed(e),
            };
        }
        (Frame::Abort, _) => return ResponseState::Aborted,
        (frame, state) => {
            error!(?frame, ?state, "response frame out of order");
            return ResponseState::Aborted;
        }
    };

    match result {
        Ok(()) => state,
        Err(SendError::InvalidBody { reason }) => {
            error!(%reason, "response body does not match its framing");
            ResponseState::Aborted
        }
        Err(e) => {
            info!(cause = %e, "failed to write response, client probably gone");
            ResponseState::Failed(e)
        }
    }
}

async fn join_handler(handler_task: tokio::task::JoinHandle<()>) {
    if let Err(e) = handler_task.await {
        error!(cause = %e, "request handler task failed");
    }
}

/// The [`ResponseWriter`] handed to the handler thread.
///
/// Frames travel over a bounded channel; a closed channel means the
/// connection stopped accepting them, which surfaces as [`SendError::Closed`].
struct ChannelWriter {
    sender: mpsc::Sender<Frame>,
    head_written: bool,
    done: bool,
}

impl ChannelWriter {
    fn new(sender: mpsc::Sender<Frame>) -> Self {
        Self { sender, head_written: false, done: false }
    }

    fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.sender.blocking_send(frame).map_err(|_| SendError::Closed)
    }
}

impl ResponseWriter for ChannelWriter {
    fn write_head(&mut self, head: ResponseHead, payload_size: PayloadSize) -> Result<(), SendError> {
        ensure!(!self.head_written, SendError::invalid_head("response head already written"));
        self.head_written = true;
        self.send(Frame::Head(head, payload_size))
    }

    fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SendError> {
        ensure!(self.head_written && !self.done, SendError::invalid_body("chunk outside of a response body"));
        if chunk.is_empty() {
            return Ok(());
        }
        self.send(Frame::Chunk(chunk))
    }

    fn finish(&mut self) -> Result<(), SendError> {
        ensure!(self.head_written && !self.done, SendError::invalid_body("response is not streaming"));
        self.done = true;
        self.send(Frame::End)
    }

    fn abort(&mut self) {
        if !self.done {
            self.done = true;
            // nothing to do if the connection is already gone
            let _ = self.send(Frame::Abort);
        }
    }
}
