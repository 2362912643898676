//! Connector seam between the reconnect loop and the network.

use crate::error::{StreamError, StreamResult};
use crate::message::Message;
use async_trait::async_trait;
use futures::{Sink, Stream};
use futures_util::{SinkExt, StreamExt};
use std::pin::Pin;
use url::Url;

/// Write half of an established session.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = StreamError> + Send>>;

/// Read half of an established session.
pub type FrameStream = Pin<Box<dyn Stream<Item = StreamResult<Message>> + Send>>;

/// Opens a new duplex session. Called once per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake and return the split session.
    async fn connect(&self, url: &Url) -> StreamResult<(FrameSink, FrameStream)>;
}

/// [`Connector`] speaking WebSocket through `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> StreamResult<(FrameSink, FrameStream)> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(StreamError::from)
            .with(|message: Message| {
                futures::future::ready(Ok::<_, StreamError>(tungstenite::Message::from(message)))
            });
        let stream = read.map(|frame| frame.map(Message::from).map_err(StreamError::from));

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
