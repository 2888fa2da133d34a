//! Streaming response support.
//!
//! Chunked delivery of generated content. The stream is backed by an mpsc
//! channel; dropping the `ChunkStream` closes the channel, which is how a
//! caller abandons consumption mid-stream without leaking the producer.

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::backend::traits::{FinishReason, GenerationResponse, TokenUsage};

/// A chunk of streamed content.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    /// Text content
    pub content: String,
    /// Whether this is the final chunk
    pub is_final: bool,
    /// Finish reason (only on final chunk)
    pub finish_reason: Option<FinishReason>,
    /// Token usage (only on final chunk)
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// Create a content chunk.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: false,
            finish_reason: None,
            usage: None,
        }
    }

    /// Create a final chunk carrying the run's total usage.
    pub fn final_chunk(
        content: impl Into<String>,
        reason: FinishReason,
        usage: TokenUsage,
    ) -> Self {
        Self {
            content: content.into(),
            is_final: true,
            finish_reason: Some(reason),
            usage: Some(usage),
        }
    }
}

pin_project! {
    /// Stream of chunks from content generation.
    pub struct ChunkStream {
        #[pin]
        receiver: mpsc::Receiver<StreamChunk>,
        // Accumulated content (for getting full response)
        accumulated: String,
        // Whether stream is complete
        complete: bool,
        // Final usage (available after stream completes)
        usage: Option<TokenUsage>,
    }
}

impl ChunkStream {
    /// Create a new chunk stream.
    pub fn new(receiver: mpsc::Receiver<StreamChunk>) -> Self {
        Self {
            receiver,
            accumulated: String::new(),
            complete: false,
            usage: None,
        }
    }

    /// Create a stream from a complete response (for non-streaming backends).
    pub fn from_complete(response: GenerationResponse) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let usage = response.usage;

        tokio::spawn(async move {
            let _ = tx
                .send(StreamChunk::final_chunk(
                    response.content,
                    response.finish_reason,
                    usage,
                ))
                .await;
        });

        Self {
            receiver: rx,
            accumulated: String::new(),
            complete: false,
            usage: Some(usage),
        }
    }

    /// Create a sender/receiver pair for streaming.
    pub fn channel(buffer: usize) -> (ChunkStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        let sender = ChunkStreamSender { sender: tx };
        let stream = Self::new(rx);
        (sender, stream)
    }

    /// Content accumulated so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Whether the stream is complete.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Usage (available after stream completes).
    pub fn usage(&self) -> Option<&TokenUsage> {
        self.usage.as_ref()
    }

    /// Drain the stream into a complete response.
    pub async fn collect(mut self) -> GenerationResponse {
        use futures::StreamExt;

        let mut finish_reason = FinishReason::Stop;

        while let Some(chunk) = self.next().await {
            if let Some(reason) = chunk.finish_reason {
                finish_reason = reason;
            }
        }

        GenerationResponse {
            content: self.accumulated,
            finish_reason,
            usage: self.usage.unwrap_or_default(),
        }
    }
}

impl Stream for ChunkStream {
    type Item = StreamChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                this.accumulated.push_str(&chunk.content);

                if chunk.is_final {
                    *this.complete = true;
                    if chunk.usage.is_some() {
                        *this.usage = chunk.usage;
                    }
                }

                Poll::Ready(Some(chunk))
            }
            Poll::Ready(None) => {
                *this.complete = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Sender side of a chunk stream.
pub struct ChunkStreamSender {
    sender: mpsc::Sender<StreamChunk>,
}

impl ChunkStreamSender {
    /// Send a content chunk. Fails once the consumer has dropped the stream.
    pub async fn send(&self, content: impl Into<String>) -> Result<(), StreamError> {
        self.sender
            .send(StreamChunk::content(content))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Send the final chunk with the run's total usage.
    pub async fn finish(
        self,
        content: impl Into<String>,
        reason: FinishReason,
        usage: TokenUsage,
    ) -> Result<(), StreamError> {
        self.sender
            .send(StreamChunk::final_chunk(content, reason, usage))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Close without sending final content (mid-stream failure).
    pub async fn close(self) {
        drop(self.sender);
    }
}

/// Error during streaming.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Consumer dropped the stream
    #[error("Stream closed")]
    Closed,
}
