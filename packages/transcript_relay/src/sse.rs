//! Transport Framer
//!
//! Wire format: one event per frame, `data: <json>\n\n`, terminated by
//! `data: [DONE]\n\n`. A frame is always handed to the transport as a single
//! write, so the terminator can never be split across writes.
//!
//! The response body is fed through a bounded channel: when the client reads
//! slowly the channel fills and `send` suspends, which pauses the upstream
//! iteration (the relay loop only awaits the next turn message after the
//! previous frames were accepted). When the client disconnects the receiver
//! side is dropped and `send` fails, which the relay loop treats as
//! cancellation.

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use agent_stream::{DONE_SENTINEL, DownstreamEvent};

/// Why a frame could not be delivered.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The client went away; no further events should be attempted.
    #[error("client disconnected; transport channel closed")]
    Closed,

    /// The event could not be encoded; the stream is torn down rather than
    /// skipping a frame.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serializes one event as a self-delimited wire frame.
pub fn frame(event: &DownstreamEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// The sentinel frame closing every stream.
pub fn done_frame() -> String {
    format!("data: {DONE_SENTINEL}\n\n")
}

/// Write half of a relay stream.
pub struct FrameSink {
    tx: mpsc::Sender<String>,
}

impl FrameSink {
    /// Frames and writes one event, flushing immediately. Suspends while the
    /// outbound channel is full (backpressure).
    pub async fn send(&self, event: &DownstreamEvent) -> Result<(), SinkError> {
        let frame = frame(event)?;
        self.tx.send(frame).await.map_err(|_| SinkError::Closed)
    }

    /// Writes the termination sentinel and closes the stream.
    pub async fn finish(self) -> Result<(), SinkError> {
        self.tx
            .send(done_frame())
            .await
            .map_err(|_| SinkError::Closed)
    }

    /// Resolves when the client side has gone away. Used to cancel the
    /// upstream iteration promptly instead of discovering the disconnect on
    /// the next send.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Builds the streaming response and its paired sink.
///
/// `capacity` bounds how many frames may be buffered ahead of the client;
/// beyond that the producer suspends.
pub fn sse_response(capacity: usize) -> (FrameSink, Response) {
    let (tx, rx) = mpsc::channel::<String>(capacity);

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>));

    let response = (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response();

    (FrameSink { tx }, response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_format() {
        let event = DownstreamEvent::Text {
            text: "hi".to_string(),
        };
        let framed = frame(&event).unwrap();
        assert_eq!(framed, "data: {\"type\":\"text\",\"text\":\"hi\"}\n\n");
        assert!(framed.ends_with("\n\n"));
    }

    #[test]
    fn test_done_frame() {
        assert_eq!(done_frame(), "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_sink_delivers_frames_in_order() {
        let (sink, response) = sse_response(8);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );

        sink.send(&DownstreamEvent::Text {
            text: "one".to_string(),
        })
        .await
        .unwrap();
        sink.finish().await.unwrap();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(
            text,
            "data: {\"type\":\"text\",\"text\":\"one\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_send_fails_after_client_disconnect() {
        let (sink, response) = sse_response(8);
        drop(response);

        let err = sink
            .send(&DownstreamEvent::Text {
                text: "lost".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }

    #[tokio::test]
    async fn test_closed_resolves_on_disconnect() {
        let (sink, response) = sse_response(8);
        drop(response);
        // Must resolve rather than hang
        sink.closed().await;
    }

    #[tokio::test]
    async fn test_bounded_channel_applies_backpressure() {
        let (sink, _response) = sse_response(1);
        sink.send(&DownstreamEvent::Text {
            text: "fills the buffer".to_string(),
        })
        .await
        .unwrap();

        // With the channel full and nothing reading, the next send must
        // park - this is what pauses the upstream iteration.
        let event = DownstreamEvent::Text {
            text: "must wait".to_string(),
        };
        let mut second = tokio_test::task::spawn(sink.send(&event));
        tokio_test::assert_pending!(second.poll());
    }
}
