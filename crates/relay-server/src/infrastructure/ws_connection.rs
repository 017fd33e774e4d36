//! Adapts an axum [`WebSocket`] to the core's [`FrameSink`] / [`FrameSource`].
//!
//! The socket is split once at upgrade time. The write half sits behind a
//! mutex because the broadcaster may write to the same client from several
//! tasks; the read half is owned by the session task alone.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::trace;

use relay_core::{FrameSink, FrameSource, TransportError};

/// Splits an upgraded socket into the two halves the relay core expects.
pub fn split_socket(socket: WebSocket) -> (WsFrameSink, WsFrameSource) {
    let (tx, rx) = socket.split();
    (WsFrameSink { tx: Mutex::new(tx) }, WsFrameSource { rx })
}

pub struct WsFrameSink {
    tx: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn write_frame(&self, frame: &str) -> Result<(), TransportError> {
        let mut tx = self.tx.lock().await;
        tx.send(Message::Text(frame.to_owned().into()))
            .await
            .map_err(|e| TransportError::new(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut tx = self.tx.lock().await;
        // The peer may already have gone away; a second close is a no-op.
        match tx.close().await {
            Ok(()) => Ok(()),
            Err(e) => {
                trace!("close on finished socket: {e}");
                Ok(())
            }
        }
    }
}

pub struct WsFrameSource {
    rx: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.rx.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
                }
                // axum answers pings itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::new(e.to_string())),
            }
        }
    }
}
