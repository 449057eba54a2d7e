//! WebSocket probe: one JSON-RPC style message out, one frame back.

use async_trait::async_trait;
use fleetcheck_core::error::error_chain;
use fleetcheck_core::{
    Decode, Host, HeaderMultiMap, Payload, Probe, ProbeError, ProbeOutcome, RequestDescriptor, TransportKind,
};
use futures_util::{SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct WsProbeOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for WsProbeOptions {
    fn default() -> Self {
        Self { connect_timeout: Duration::from_secs(10), read_timeout: Duration::from_secs(5) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WsProbe {
    opts: WsProbeOptions,
}

impl WsProbe {
    pub fn new(opts: WsProbeOptions) -> Self {
        Self { opts }
    }
}

fn classify(host: &Host, err: WsError) -> ProbeError {
    let host = host.to_string();
    match err {
        WsError::Url(e) => ProbeError::InvalidTarget { host, cause: e.to_string() },
        WsError::Http(resp) => ProbeError::Protocol {
            host,
            cause: format!("handshake rejected with status {}", resp.status()),
        },
        e @ (WsError::Io(_) | WsError::Tls(_) | WsError::ConnectionClosed | WsError::AlreadyClosed) => {
            ProbeError::Connect { host, cause: error_chain(&e) }
        }
        e => ProbeError::Protocol { host, cause: error_chain(&e) },
    }
}

/// Next text or binary frame; control frames are skipped.
async fn next_data_frame<S>(host: &Host, read: &mut S) -> Result<String, ProbeError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Binary(bytes))) => return Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ProbeError::Protocol {
                    host: host.to_string(),
                    cause: "connection closed before a reply".into(),
                })
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(classify(host, e)),
        }
    }
}

#[async_trait]
impl Probe for WsProbe {
    async fn probe(&self, host: &Host, request: &RequestDescriptor) -> Result<ProbeOutcome, ProbeError> {
        if request.transport != TransportKind::WebsocketRoundtrip {
            return Err(ProbeError::Unsupported { host: host.to_string(), transport: request.transport });
        }
        let invalid = |cause: String| ProbeError::InvalidTarget { host: host.to_string(), cause };
        let url = request.url(host);
        let mut handshake = url.as_str().into_client_request().map_err(|e| classify(host, e))?;
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            handshake.headers_mut().append(name, value);
        }
        if request.secure {
            // Ensure a crypto provider is installed (ring)
            let _ = rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());
        }

        let (connect, read_limit) = (self.opts.connect_timeout, self.opts.read_timeout);
        debug!(%url, "opening websocket");
        let (stream, response) = timeout(connect, connect_async(handshake))
            .await
            .map_err(|_| ProbeError::Timeout { host: host.to_string(), stage: "websocket handshake", after: connect })?
            .map_err(|e| classify(host, e))?;
        let status = response.status().as_u16();
        let headers: HeaderMultiMap = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        let (mut write, mut read) = stream.split();
        let message = request.body.clone().unwrap_or_default();
        timeout(connect, write.send(Message::Text(message)))
            .await
            .map_err(|_| ProbeError::Timeout { host: host.to_string(), stage: "websocket write", after: connect })?
            .map_err(|e| classify(host, e))?;

        let frame = timeout(read_limit, next_data_frame(host, &mut read))
            .await
            .map_err(|_| ProbeError::Timeout { host: host.to_string(), stage: "websocket read", after: read_limit })??;
        debug!(%url, len = frame.len(), "websocket reply");
        let _ = timeout(read_limit, write.close()).await;

        let payload = match request.decode {
            Decode::Raw => Payload::Text(frame),
            Decode::Json => serde_json::from_str(&frame).map(Payload::Json).map_err(|e| ProbeError::Protocol {
                host: host.to_string(),
                cause: format!("reply is not JSON: {}", e),
            })?,
        };
        Ok(ProbeOutcome { status, headers, payload })
    }

    fn supports(&self, transport: TransportKind) -> bool {
        transport == TransportKind::WebsocketRoundtrip
    }
}
