use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::protocol::{OutboundMessage, ServerEvent, SessionSetup, parse_server_message};
use crate::error::prelude::*;

const OUTBOUND_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 256;

/// Both halves of an opened live channel.
///
/// Dropping `outbound` ends the writer task, which closes the socket.
pub struct LiveChannel {
    pub outbound: mpsc::Sender<OutboundMessage>,
    pub inbound: mpsc::Receiver<ServerEvent>,
    pub reader: Option<AbortHandle>,
}

/// Opens live channels. The seam the session uses to reach the remote model.
pub trait LiveConnector: Send + Sync {
    fn connect(
        &self,
        setup: SessionSetup,
    ) -> impl Future<Output = Result<LiveChannel, SessionError>> + Send;
}

/// WebSocket connector for the `BidiGenerateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    ws_url: String,
    api_key: String,
}

impl GeminiConnector {
    pub fn new(ws_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> Result<url::Url, SessionError> {
        let mut url = url::Url::parse(&self.ws_url)
            .map_err(|e| SessionError::Connect(format!("invalid live URL: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

impl LiveConnector for GeminiConnector {
    async fn connect(&self, setup: SessionSetup) -> Result<LiveChannel, SessionError> {
        let url = self.endpoint()?;
        let setup_message = setup
            .to_message()
            .map_err(|e| SessionError::Connect(format!("failed to encode setup: {e}")))?;

        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        sink.send(Message::Text(setup_message.into()))
            .await
            .map_err(|e| SessionError::Connect(format!("failed to send setup: {e}")))?;

        tracing::info!(model = %setup.model, voice = %setup.voice, "live socket connected");

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerEvent>(INBOUND_CAPACITY);

        let writer_events = inbound_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match message.to_message() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping unencodable outbound message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::error!(error = %e, "live socket send failed");
                    let _ = writer_events
                        .send(ServerEvent::Error(format!("send failed: {e}")))
                        .await;
                    return;
                }
                tracing::trace!("sent audio frame");
            }
            let _ = sink.close().await;
            tracing::debug!("live socket writer finished");
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let raw = match message {
                    Ok(Message::Text(text)) => text.as_str().to_string(),
                    Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                        Ok(text) => text.to_string(),
                        Err(_) => {
                            tracing::warn!(len = bytes.len(), "ignoring non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty());
                        let _ = inbound_tx.send(ServerEvent::Closed { reason }).await;
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "live socket receive failed");
                        let _ = inbound_tx.send(ServerEvent::Error(e.to_string())).await;
                        return;
                    }
                };

                match parse_server_message(&raw) {
                    Ok(events) => {
                        for event in events {
                            if inbound_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring unparsable server message"),
                }
            }
            let _ = inbound_tx.send(ServerEvent::Closed { reason: None }).await;
        });

        Ok(LiveChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
            reader: Some(reader.abort_handle()),
        })
    }
}
