//! Frames and connection halves shared by both legs.
//!
//! The client leg is an axum `WebSocket`, the backend leg a tokio-tungstenite
//! stream. Both are adapted into the same [`Connection`] shape so the session
//! never depends on which library owns a socket, and tests can substitute
//! in-memory duplex streams.

use std::pin::Pin;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage, WebSocket};
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WireCloseFrame;
use tokio_tungstenite::tungstenite::{self, Message as WireMessage};
use tokio_tungstenite::WebSocketStream;

/// Going away: the peer vanished or the relay is shutting down.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Internal error: forwarding failed or the backend is unavailable.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Transport failure on either leg.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Client(#[from] axum::Error),

    #[error(transparent)]
    Backend(#[from] tungstenite::Error),
}

/// Close code and reason carried by a Close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A single WebSocket message, forwarded as an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

impl Frame {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) | Frame::Ping(data) | Frame::Pong(data) => data.len(),
            Frame::Close(close) => close.as_ref().map_or(0, |c| 2 + c.reason.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw frames only show up when writing; reading never yields them.
    pub fn from_wire(message: WireMessage) -> Option<Self> {
        let frame = match message {
            WireMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            WireMessage::Binary(data) => Frame::Binary(data),
            WireMessage::Ping(data) => Frame::Ping(data),
            WireMessage::Pong(data) => Frame::Pong(data),
            WireMessage::Close(close) => Frame::Close(close.map(|c| CloseReason {
                code: u16::from(c.code),
                reason: c.reason.as_str().to_owned(),
            })),
            WireMessage::Frame(_) => return None,
        };
        Some(frame)
    }
}

impl From<ClientMessage> for Frame {
    fn from(message: ClientMessage) -> Self {
        match message {
            ClientMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            ClientMessage::Binary(data) => Frame::Binary(data),
            ClientMessage::Ping(data) => Frame::Ping(data),
            ClientMessage::Pong(data) => Frame::Pong(data),
            ClientMessage::Close(close) => Frame::Close(close.map(|c| CloseReason {
                code: c.code,
                reason: c.reason.as_str().to_owned(),
            })),
        }
    }
}

impl From<Frame> for ClientMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ClientMessage::Text(text.into()),
            Frame::Binary(data) => ClientMessage::Binary(data),
            Frame::Ping(data) => ClientMessage::Ping(data),
            Frame::Pong(data) => ClientMessage::Pong(data),
            Frame::Close(close) => ClientMessage::Close(close.map(|c| ClientCloseFrame {
                code: c.code,
                reason: c.reason.into(),
            })),
        }
    }
}

impl From<Frame> for WireMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => WireMessage::Text(text.into()),
            Frame::Binary(data) => WireMessage::Binary(data),
            Frame::Ping(data) => WireMessage::Ping(data),
            Frame::Pong(data) => WireMessage::Pong(data),
            Frame::Close(close) => WireMessage::Close(close.map(|c| WireCloseFrame {
                code: CloseCode::from(c.code),
                reason: c.reason.into(),
            })),
        }
    }
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// One leg of a session, split into its read and write halves.
pub struct Connection {
    pub frames: FrameStream,
    pub sink: FrameSink,
}

impl Connection {
    /// Adapt an upgraded client socket.
    pub fn from_client(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        let sink = sink.with(|frame: Frame| {
            future::ready(Ok::<_, TransportError>(ClientMessage::from(frame)))
        });
        let frames = stream.map(|message| message.map(Frame::from).map_err(TransportError::from));
        Self {
            frames: Box::pin(frames),
            sink: Box::pin(sink),
        }
    }

    /// Adapt a tokio-tungstenite stream (backend leg, or in-memory in tests).
    pub fn from_wire<S>(socket: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = socket.split();
        let sink = sink.with(|frame: Frame| {
            future::ready(Ok::<_, TransportError>(WireMessage::from(frame)))
        });
        let frames = stream.filter_map(|message| {
            future::ready(match message {
                Ok(message) => Frame::from_wire(message).map(Ok),
                Err(err) => Some(Err(TransportError::from(err))),
            })
        });
        Self {
            frames: Box::pin(frames),
            sink: Box::pin(sink),
        }
    }

    /// Optionally send a final frame, close the write half, then read until
    /// the peer answers the close or the socket ends.
    ///
    /// Errors are ignored: the socket may already be gone. Callers bound the
    /// wait; a peer that never answers keeps this pending.
    pub async fn close(mut self, last: Option<Frame>) {
        if let Some(frame) = last {
            if let Err(err) = self.sink.send(frame).await {
                tracing::trace!(error = %err, "Close frame not delivered");
            }
        }
        if let Err(err) = self.sink.close().await {
            tracing::trace!(error = %err, "Sink close failed");
        }
        while let Some(Ok(frame)) = self.frames.next().await {
            if matches!(frame, Frame::Close(_)) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_binary_keep_their_type_across_libraries() {
        let text = Frame::from(ClientMessage::Text("INVITE sip:388@pbx SIP/2.0".into()));
        assert_eq!(text, Frame::Text("INVITE sip:388@pbx SIP/2.0".into()));
        assert!(matches!(WireMessage::from(text), WireMessage::Text(t) if t.as_str().starts_with("INVITE")));

        let binary = Frame::from_wire(WireMessage::Binary(Bytes::from_static(&[0, 159, 146, 150])))
            .unwrap();
        assert!(
            matches!(ClientMessage::from(binary), ClientMessage::Binary(b) if b[..] == [0u8, 159, 146, 150])
        );
    }

    #[test]
    fn close_code_and_reason_survive() {
        let close = Frame::from(ClientMessage::Close(Some(ClientCloseFrame {
            code: 4001,
            reason: "unregistered".into(),
        })));
        assert_eq!(close, Frame::Close(Some(CloseReason::new(4001, "unregistered"))));

        match WireMessage::from(close) {
            WireMessage::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 4001);
                assert_eq!(frame.reason.as_str(), "unregistered");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn frame_length_counts_payload() {
        assert_eq!(Frame::Text("200 OK".into()).len(), 6);
        assert_eq!(Frame::Close(None).len(), 0);
        assert!(Frame::Pong(Bytes::new()).is_empty());
    }
}
