//! Transport abstraction over the messaging socket.
//!
//! The connection manager is written against these traits so its state
//! machine can be exercised with a scripted fake; the production
//! implementation wraps tokio-tungstenite.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

/// Opens one socket. Each call is one connection attempt.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), String>;
}

/// Write half of an open socket.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: String) -> Result<(), String>;
}

/// Read half of an open socket.
#[async_trait]
pub trait FrameStream: Send {
    /// Next text frame, or `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<String, String>>;
}

/// Production transport over tokio-tungstenite.
#[derive(Debug, Default, Clone)]
pub struct WsTransport;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), String> {
        let (socket, _response) = connect_async(url).await.map_err(|e| e.to_string())?;
        let (write, read) = socket.split();
        Ok((Box::new(WsSink { write }), Box::new(WsStream { read })))
    }
}

struct WsSink {
    write: SplitSink<Socket, WsMessage>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<(), String> {
        self.write
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|e| e.to_string())
    }
}

struct WsStream {
    read: SplitStream<Socket>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<String, String>> {
        while let Some(item) = self.read.next().await {
            match item {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.to_string())),
                Ok(WsMessage::Close(_)) => return None,
                // Pong replies are handled by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(e.to_string())),
            }
        }
        None
    }
}
