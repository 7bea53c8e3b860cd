use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::StreamExt as _;

use crate::errors::SourceError;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static>>;

/// Source of raw body chunks for one session.
///
/// `next_chunk` is the only suspension point of the consumer loop.
#[async_trait::async_trait]
pub trait ByteSource: Send {
    /// Returns the next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Option<Result<Bytes, SourceError>>;

    /// Closes the underlying stream. The consumer calls this exactly once.
    fn release(&mut self);
}

/// An already-established streaming response: preamble plus body.
pub struct StreamResponse<S> {
    pub status: u16,
    pub content_type: Option<String>,
    /// `None` when the response carried no readable body.
    pub body: Option<S>,
}

impl<S: ByteSource> StreamResponse<S> {
    pub fn new(status: u16, content_type: Option<String>, body: Option<S>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    /// A `200 text/event-stream` response around `body`.
    pub fn event_stream(body: S) -> Self {
        Self::new(200, Some("text/event-stream".to_string()), Some(body))
    }
}

/// Releases the wrapped source once, either explicitly or on drop.
pub(crate) struct SourceGuard<S: ByteSource> {
    source: S,
    released: bool,
}

impl<S: ByteSource> SourceGuard<S> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    pub(crate) async fn next_chunk(&mut self) -> Option<Result<Bytes, SourceError>> {
        if self.released {
            return None;
        }
        self.source.next_chunk().await
    }

    pub(crate) fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
        }
    }
}

impl<S: ByteSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Body of a `reqwest` response.
pub struct ReqwestSource {
    stream: Option<ByteStream>,
}

impl ReqwestSource {
    /// Adapts a response whose request has already been sent.
    pub fn from_response(response: reqwest::Response) -> StreamResponse<ReqwestSource> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);
        let body = ReqwestSource {
            stream: Some(Box::pin(response.bytes_stream())),
        };
        StreamResponse::new(status, content_type, Some(body))
    }
}

#[async_trait::async_trait]
impl ByteSource for ReqwestSource {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, SourceError>> {
        let stream = self.stream.as_mut()?;
        stream
            .next()
            .await
            .map(|chunk| chunk.map_err(SourceError::from))
    }

    fn release(&mut self) {
        // Dropping the body stream closes the connection.
        self.stream = None;
    }
}

/// Replays captured bytes as a sequence of chunks.
pub struct ReplaySource {
    chunks: VecDeque<Bytes>,
    trailing_error: Option<SourceError>,
    releases: Arc<AtomicUsize>,
}

impl ReplaySource {
    /// Replays the given chunks in order.
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            trailing_error: None,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replays `data` in chunks of `chunk_size` bytes (the last may be shorter).
    pub fn chunked(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        let data: Bytes = data.into();
        let size = chunk_size.max(1);
        let mut chunks = Vec::with_capacity(data.len() / size + 1);
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + size).min(data.len());
            chunks.push(data.slice(offset..end));
            offset = end;
        }
        Self::new(chunks)
    }

    /// Fails with `message` after the last chunk instead of ending cleanly.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.trailing_error = Some(SourceError::new(message));
        self
    }

    /// Counter of `release` calls, shared with this source.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }
}

#[async_trait::async_trait]
impl ByteSource for ReplaySource {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, SourceError>> {
        match self.chunks.pop_front() {
            Some(chunk) => Some(Ok(chunk)),
            None => self.trailing_error.take().map(Err),
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.chunks.clear();
        self.trailing_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunked_replay_covers_every_byte() {
        let mut source = ReplaySource::chunked(&b"abcdefg"[..], 3);
        let mut seen = Vec::new();
        while let Some(chunk) = source.next_chunk().await {
            seen.push(chunk.expect("chunk"));
        }
        assert_eq!(seen, vec![Bytes::from("abc"), Bytes::from("def"), Bytes::from("g")]);
    }

    #[tokio::test]
    async fn trailing_error_is_reported_once() {
        let mut source = ReplaySource::new(["x"]).then_fail("reset by peer");
        assert!(matches!(source.next_chunk().await, Some(Ok(_))));
        assert!(matches!(source.next_chunk().await, Some(Err(err)) if err.message == "reset by peer"));
        assert!(source.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn guard_releases_exactly_once() {
        let source = ReplaySource::new(["a", "b"]);
        let releases = source.release_counter();
        let mut guard = SourceGuard::new(source);
        assert!(guard.next_chunk().await.is_some());
        guard.release();
        assert!(guard.next_chunk().await.is_none());
        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_releases_on_drop() {
        let source = ReplaySource::new(Vec::<Bytes>::new());
        let releases = source.release_counter();
        drop(SourceGuard::new(source));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
