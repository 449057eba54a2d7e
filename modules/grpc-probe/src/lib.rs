//! gRPC probe: dial, wait for readiness, issue one unary statistics call.
//!
//! The three stages fail with distinct errors (`Dial`, `NotReady`, `Rpc`) so a
//! report says where the exchange broke. Dial and readiness share one
//! `dial_timeout` budget; the call gets its own.

pub mod proto;

use async_trait::async_trait;
use fleetcheck_core::error::error_chain;
use fleetcheck_core::{Host, HeaderMultiMap, Payload, Probe, ProbeError, ProbeOutcome, RequestDescriptor, TransportKind};
use proto::{StatisticsRequest, StatisticsResponse};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{MetadataKey, MetadataValue};
use tonic::transport::{ClientTlsConfig, Endpoint};
use tracing::debug;

pub const DEFAULT_STATISTICS_METHOD: &str = "/vega.api.v1.CoreService/Statistics";

#[derive(Debug, Clone, Copy)]
pub struct GrpcProbeOptions {
    pub dial_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for GrpcProbeOptions {
    fn default() -> Self {
        Self { dial_timeout: Duration::from_secs(5), call_timeout: Duration::from_secs(5) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GrpcProbe {
    opts: GrpcProbeOptions,
}

impl GrpcProbe {
    pub fn new(opts: GrpcProbeOptions) -> Self {
        Self { opts }
    }

    fn endpoint(&self, host: &Host, request: &RequestDescriptor) -> Result<Endpoint, ProbeError> {
        let invalid = |cause: String| ProbeError::InvalidTarget { host: host.to_string(), cause };
        let endpoint = Endpoint::from_shared(request.origin(host)).map_err(|e| invalid(error_chain(&e)))?;
        if !request.secure {
            return Ok(endpoint);
        }
        // Ensure a crypto provider is installed (ring)
        let _ = rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());
        let tls = ClientTlsConfig::new().with_webpki_roots().domain_name(host.as_str());
        endpoint.tls_config(tls).map_err(|e| invalid(error_chain(&e)))
    }
}

fn method_path(host: &Host, request: &RequestDescriptor) -> Result<PathAndQuery, ProbeError> {
    let raw = if request.path.is_empty() {
        DEFAULT_STATISTICS_METHOD.to_string()
    } else {
        format!("/{}", request.path.trim_start_matches('/'))
    };
    PathAndQuery::try_from(raw.as_str())
        .map_err(|e| ProbeError::InvalidTarget { host: host.to_string(), cause: e.to_string() })
}

#[async_trait]
impl Probe for GrpcProbe {
    async fn probe(&self, host: &Host, request: &RequestDescriptor) -> Result<ProbeOutcome, ProbeError> {
        if request.transport != TransportKind::GrpcUnary {
            return Err(ProbeError::Unsupported { host: host.to_string(), transport: request.transport });
        }
        let path = method_path(host, request)?;
        let endpoint = self.endpoint(host, request)?;
        let (dial, call) = (self.opts.dial_timeout, self.opts.call_timeout);
        let h = || host.to_string();

        debug!(origin = %request.origin(host), method = %path, "dialing grpc node");
        let started = Instant::now();
        let channel = timeout(dial, endpoint.connect())
            .await
            .map_err(|_| ProbeError::Timeout { host: h(), stage: "grpc dial", after: dial })?
            .map_err(|e| ProbeError::Dial { host: h(), cause: error_chain(&e) })?;

        let mut client = tonic::client::Grpc::new(channel);
        timeout(dial.saturating_sub(started.elapsed()), client.ready())
            .await
            .map_err(|_| ProbeError::Timeout { host: h(), stage: "grpc readiness", after: dial })?
            .map_err(|e| ProbeError::NotReady { host: h(), cause: error_chain(&e) })?;

        let mut rpc = tonic::Request::new(StatisticsRequest {});
        for (name, value) in &request.headers {
            let key = MetadataKey::from_bytes(name.to_ascii_lowercase().as_bytes())
                .map_err(|e| ProbeError::InvalidTarget { host: h(), cause: format!("metadata key {:?}: {}", name, e) })?;
            let value = MetadataValue::try_from(value.as_str())
                .map_err(|e| ProbeError::InvalidTarget { host: h(), cause: format!("metadata value for {:?}: {}", name, e) })?;
            rpc.metadata_mut().append(key, value);
        }

        let codec = ProstCodec::<StatisticsRequest, StatisticsResponse>::default();
        let response = timeout(call, client.unary(rpc, path, codec))
            .await
            .map_err(|_| ProbeError::Timeout { host: h(), stage: "grpc call", after: call })?
            .map_err(|status| ProbeError::Rpc {
                host: h(),
                cause: format!("{:?}: {}", status.code(), status.message()),
            })?;

        let (metadata, message, _) = response.into_parts();
        let headers: HeaderMultiMap = metadata
            .into_headers()
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        debug!(host = %host, metadata = headers.len(), "grpc statistics received");

        Ok(ProbeOutcome {
            status: tonic::Code::Ok as u16,
            headers,
            payload: Payload::Json(message.to_json()),
        })
    }

    fn supports(&self, transport: TransportKind) -> bool {
        transport == TransportKind::GrpcUnary
    }
}
