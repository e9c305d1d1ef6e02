use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::{FeedError, FeedResult};

/// Inbound text frames from an open connection. The stream ending means the
/// server hung up cleanly; an `Err` item is a transport-level failure.
pub type FrameStream = BoxStream<'static, FeedResult<String>>;

/// Seam between the feed client's reconnect machinery and the wire.
///
/// The client only ever asks for a fresh connection; everything else
/// (frame decoding, state tracking, retry) lives above this trait, which
/// keeps the state machine testable with scripted in-memory transports.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self) -> FeedResult<FrameStream>;
}

/// Production transport: a receive-only WebSocket connection to the
/// backend's `/ws` endpoint.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> FeedResult<FrameStream> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let frames = socket
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Close(frame)) => {
                        debug!("server sent close frame: {:?}", frame);
                        None
                    }
                    // Control and binary frames carry no alerts.
                    Ok(_) => None,
                    Err(e) => Some(Err(FeedError::Transport(e.to_string()))),
                }
            })
            .boxed();

        Ok(frames)
    }
}
