use crate::error::ProbeError;
use crate::outcome::ProbeOutcome;
use crate::request::{RequestDescriptor, TransportKind};
use crate::Host;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One transport-specific request/response cycle.
///
/// Implementations issue exactly one outbound request per call and bound
/// every wait; they return a normalized outcome or a typed error, never a
/// partial result.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, host: &Host, request: &RequestDescriptor) -> Result<ProbeOutcome, ProbeError>;

    fn supports(&self, transport: TransportKind) -> bool {
        let _ = transport;
        true
    }
}

/// Per-operation time limits handed to the concrete probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub http: Duration,
    pub grpc_dial: Duration,
    pub grpc_call: Duration,
    pub ws_connect: Duration,
    pub ws_read: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            http: Duration::from_secs(10),
            grpc_dial: Duration::from_secs(5),
            grpc_call: Duration::from_secs(5),
            ws_connect: Duration::from_secs(10),
            ws_read: Duration::from_secs(5),
        }
    }
}

/// Routes each request to the probe registered for its transport family.
#[derive(Clone, Default)]
pub struct ProbeSet {
    http: Option<Arc<dyn Probe>>,
    grpc: Option<Arc<dyn Probe>>,
    websocket: Option<Arc<dyn Probe>>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http(mut self, probe: Arc<dyn Probe>) -> Self {
        self.http = Some(probe);
        self
    }

    pub fn with_grpc(mut self, probe: Arc<dyn Probe>) -> Self {
        self.grpc = Some(probe);
        self
    }

    pub fn with_websocket(mut self, probe: Arc<dyn Probe>) -> Self {
        self.websocket = Some(probe);
        self
    }

    fn route(&self, transport: TransportKind) -> Option<&Arc<dyn Probe>> {
        match transport {
            TransportKind::HttpOptions | TransportKind::HttpGet | TransportKind::HttpPost => self.http.as_ref(),
            TransportKind::GrpcUnary => self.grpc.as_ref(),
            TransportKind::WebsocketRoundtrip => self.websocket.as_ref(),
        }
    }
}

#[async_trait]
impl Probe for ProbeSet {
    async fn probe(&self, host: &Host, request: &RequestDescriptor) -> Result<ProbeOutcome, ProbeError> {
        match self.route(request.transport) {
            Some(p) => p.probe(host, request).await,
            None => Err(ProbeError::Unsupported { host: host.to_string(), transport: request.transport }),
        }
    }

    fn supports(&self, transport: TransportKind) -> bool {
        self.route(transport).is_some_and(|p| p.supports(transport))
    }
}
