//! Response bodies as returned by applications, and the adapter that turns
//! any of them into a uniform pull-based [`ChunkSource`].
//!
//! A [`Body`] is classified exactly once by [`ChunkSource::adapt`]. After that
//! the dispatcher only ever calls [`ChunkSource::pull`] and
//! [`ChunkSource::close`]; the producer's cleanup runs at most once, either
//! from `close` or, if the dispatcher never got there, from `Drop`.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use tracing::{error, trace};

use crate::error::{AppError, ProtocolViolation};
use crate::start_response::StartResponse;

/// One step of a body producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    Chunk(Bytes),
    /// The producer has nothing more; this is not an error.
    Exhausted,
}

/// A body producer pulled one chunk at a time.
pub trait PullIterator: Send {
    fn pull(&mut self) -> Result<Pull, AppError>;

    /// Releases whatever the producer holds. Called at most once.
    fn close(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

type Resume = Box<dyn FnMut(&mut StartResponse) -> Result<Pull, AppError> + Send>;
type OnClose = Box<dyn FnOnce() -> Result<(), AppError> + Send>;

/// A lazily started producer.
///
/// Nothing runs until the dispatcher pulls the first chunk, so the producer
/// may call [`StartResponse::begin`] on its first resumption instead of
/// before the application returns.
pub struct Generator {
    resume: Resume,
    on_close: Option<OnClose>,
}

impl Generator {
    pub fn new<F>(resume: F) -> Self
    where
        F: FnMut(&mut StartResponse) -> Result<Pull, AppError> + Send + 'static,
    {
        Self { resume: Box::new(resume), on_close: None }
    }

    pub fn on_close<F>(mut self, on_close: F) -> Self
    where
        F: FnOnce() -> Result<(), AppError> + Send + 'static,
    {
        self.on_close = Some(Box::new(on_close));
        self
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator").field("on_close", &self.on_close.is_some()).finish_non_exhaustive()
    }
}

/// What an application returns as its response body.
pub enum Body {
    /// A single materialized chunk.
    Bytes(Bytes),
    /// Materialized chunks, sent in order.
    Sequence(Vec<Bytes>),
    Iter(Box<dyn PullIterator>),
    Generator(Generator),
    /// Any other value; accepted only if it is one of the byte shapes
    /// [`ChunkSource::adapt`] knows about.
    Other(Box<dyn Any + Send>),
}

impl Body {
    pub fn empty() -> Self {
        Body::Bytes(Bytes::new())
    }

    /// Wraps a std iterator of chunks.
    pub fn iter<I, T>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Into<Bytes>,
    {
        Body::Iter(Box::new(IterSource { iter: iter.into_iter() }))
    }

    pub fn pull_iter<P: PullIterator + 'static>(iter: P) -> Self {
        Body::Iter(Box::new(iter))
    }

    pub fn other<T: Any + Send>(value: T) -> Self {
        Body::Other(Box::new(value))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Body::Sequence(chunks) => f.debug_tuple("Sequence").field(&chunks.len()).finish(),
            Body::Iter(_) => f.write_str("Iter"),
            Body::Generator(generator) => generator.fmt(f),
            Body::Other(_) => f.write_str("Other"),
        }
    }
}

struct IterSource<I> {
    iter: I,
}

impl<I, T> PullIterator for IterSource<I>
where
    I: Iterator<Item = T> + Send,
    T: Into<Bytes>,
{
    fn pull(&mut self) -> Result<Pull, AppError> {
        Ok(self.iter.next().map_or(Pull::Exhausted, |chunk| Pull::Chunk(chunk.into())))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes.into())
    }
}

impl From<String> for Body {
    fn from(string: String) -> Self {
        Body::Bytes(string.into())
    }
}

impl From<&'static str> for Body {
    fn from(str: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(str.as_bytes()))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(bytes))
    }
}

impl From<Vec<Bytes>> for Body {
    fn from(chunks: Vec<Bytes>) -> Self {
        Body::Sequence(chunks)
    }
}

impl<const N: usize> From<[&'static [u8]; N]> for Body {
    fn from(chunks: [&'static [u8]; N]) -> Self {
        Body::Sequence(chunks.into_iter().map(Bytes::from_static).collect())
    }
}

impl<const N: usize> From<[&'static str; N]> for Body {
    fn from(chunks: [&'static str; N]) -> Self {
        Body::Sequence(chunks.into_iter().map(|chunk| Bytes::from_static(chunk.as_bytes())).collect())
    }
}

impl From<Generator> for Body {
    fn from(generator: Generator) -> Self {
        Body::Generator(generator)
    }
}

/// A classified body, ready to be pulled by the dispatcher.
pub struct ChunkSource {
    kind: SourceKind,
    closed: bool,
}

enum SourceKind {
    Chunks(VecDeque<Bytes>),
    Iter(Box<dyn PullIterator>),
    Generator(Generator),
}

impl ChunkSource {
    /// Classifies `body`. `Body::Other` values are probed for `Bytes`,
    /// `Vec<u8>`, `Vec<Bytes>`, `String`, `&'static [u8]` and `&'static str`.
    pub fn adapt(body: Body) -> Result<Self, ProtocolViolation> {
        let kind = match body {
            Body::Bytes(bytes) => SourceKind::Chunks(VecDeque::from([bytes])),
            Body::Sequence(chunks) => SourceKind::Chunks(chunks.into()),
            Body::Iter(iter) => SourceKind::Iter(iter),
            Body::Generator(generator) => SourceKind::Generator(generator),
            Body::Other(value) => SourceKind::Chunks(probe(value)?),
        };
        Ok(Self { kind, closed: false })
    }

    /// Produces the next chunk. A generator may call `start_response` here.
    pub fn pull(&mut self, start_response: &mut StartResponse) -> Result<Pull, AppError> {
        if self.closed {
            return Ok(Pull::Exhausted);
        }
        match &mut self.kind {
            SourceKind::Chunks(chunks) => Ok(chunks.pop_front().map_or(Pull::Exhausted, Pull::Chunk)),
            SourceKind::Iter(iter) => iter.pull(),
            SourceKind::Generator(generator) => (generator.resume)(start_response),
        }
    }

    /// Total remaining length when every chunk is already materialized.
    pub fn remaining_len(&self) -> Option<u64> {
        match &self.kind {
            SourceKind::Chunks(chunks) => Some(chunks.iter().map(|chunk| chunk.len() as u64).sum()),
            SourceKind::Iter(_) | SourceKind::Generator(_) => None,
        }
    }

    /// Runs the producer's cleanup. Only the first call does anything.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let result = panic::catch_unwind(AssertUnwindSafe(|| match &mut self.kind {
            SourceKind::Chunks(chunks) => {
                chunks.clear();
                Ok(())
            }
            SourceKind::Iter(iter) => iter.close(),
            SourceKind::Generator(generator) => generator.on_close.take().map_or(Ok(()), |on_close| on_close()),
        }));

        match result {
            Ok(Ok(())) => trace!("response body closed"),
            Ok(Err(e)) => error!(cause = %e, "response body cleanup failed"),
            Err(_) => error!("response body cleanup panicked"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            SourceKind::Chunks(_) => "Chunks",
            SourceKind::Iter(_) => "Iter",
            SourceKind::Generator(_) => "Generator",
        };
        f.debug_struct("ChunkSource").field("kind", &kind).field("closed", &self.closed).finish()
    }
}

impl Drop for ChunkSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn probe(value: Box<dyn Any + Send>) -> Result<VecDeque<Bytes>, ProtocolViolation> {
    let value = match value.downcast::<Bytes>() {
        Ok(bytes) => return Ok(VecDeque::from([*bytes])),
        Err(value) => value,
    };
    let value = match value.downcast::<Vec<u8>>() {
        Ok(bytes) => return Ok(VecDeque::from([Bytes::from(*bytes)])),
        Err(value) => value,
    };
    let value = match value.downcast::<Vec<Bytes>>() {
        Ok(chunks) => return Ok(VecDeque::from(*chunks)),
        Err(value) => value,
    };
    let value = match value.downcast::<String>() {
        Ok(string) => return Ok(VecDeque::from([Bytes::from(*string)])),
        Err(value) => value,
    };
    let value = match value.downcast::<&'static [u8]>() {
        Ok(bytes) => return Ok(VecDeque::from([Bytes::from_static(*bytes)])),
        Err(value) => value,
    };
    match value.downcast::<&'static str>() {
        Ok(str) => Ok(VecDeque::from([Bytes::from_static(str.as_bytes())])),
        Err(_) => Err(ProtocolViolation::invalid_body("value is not a byte string or a sequence of byte strings")),
    }
}
