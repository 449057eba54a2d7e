//! HTTP(S) probe: OPTIONS/GET/POST with every response header kept.
//!
//! The client never decompresses on its own, so `Content-Encoding` and
//! `Content-Length` reach expectations exactly as the server sent them.
//! The body is decoded here afterwards.

use async_compression::tokio::bufread::{BrotliDecoder, GzipDecoder, ZlibDecoder};
use async_trait::async_trait;
use fleetcheck_core::error::error_chain;
use fleetcheck_core::{Host, HeaderMultiMap, Payload, Probe, ProbeError, ProbeOutcome, RequestDescriptor, TransportKind};
use reqwest::{redirect::Policy, Client, Method};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpProbeOptions {
    pub timeout: Duration,
    pub redirects: usize,
    pub user_agent: Option<String>,
}

impl Default for HttpProbeOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10), redirects: 10, user_agent: None }
    }
}

#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(opts: HttpProbeOptions) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .redirect(Policy::limited(opts.redirects))
            .timeout(opts.timeout);
        if let Some(ua) = &opts.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        Ok(Self { client: builder.build()?, timeout: opts.timeout })
    }

    fn classify(&self, host: &Host, err: &reqwest::Error) -> ProbeError {
        let host = host.to_string();
        if err.is_timeout() {
            ProbeError::Timeout { host, stage: "http request", after: self.timeout }
        } else if err.is_builder() {
            ProbeError::InvalidTarget { host, cause: error_chain(err) }
        } else if err.is_body() || err.is_decode() {
            ProbeError::Protocol { host, cause: error_chain(err) }
        } else {
            ProbeError::Connect { host, cause: error_chain(err) }
        }
    }
}

/// Undo every `Content-Encoding` in reverse order of application.
async fn decode_body(headers: &HeaderMultiMap, body: &[u8]) -> Result<Vec<u8>, String> {
    let codings: Vec<String> = headers
        .get_all("content-encoding")
        .iter()
        .flat_map(|v| v.split(','))
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty() && c != "identity")
        .collect();
    let mut data = body.to_vec();
    for coding in codings.iter().rev() {
        if data.is_empty() {
            break;
        }
        let mut out = Vec::new();
        let read = match coding.as_str() {
            "gzip" | "x-gzip" => GzipDecoder::new(&data[..]).read_to_end(&mut out).await,
            "deflate" => ZlibDecoder::new(&data[..]).read_to_end(&mut out).await,
            "br" => BrotliDecoder::new(&data[..]).read_to_end(&mut out).await,
            other => return Err(format!("unsupported content-encoding {:?}", other)),
        };
        read.map_err(|e| format!("decoding {} body: {}", coding, e))?;
        data = out;
    }
    Ok(data)
}

fn method_for(transport: TransportKind) -> Option<Method> {
    match transport {
        TransportKind::HttpOptions => Some(Method::OPTIONS),
        TransportKind::HttpGet => Some(Method::GET),
        TransportKind::HttpPost => Some(Method::POST),
        _ => None,
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, host: &Host, request: &RequestDescriptor) -> Result<ProbeOutcome, ProbeError> {
        let method = method_for(request.transport)
            .ok_or_else(|| ProbeError::Unsupported { host: host.to_string(), transport: request.transport })?;
        let url = Url::parse(&request.url(host))
            .map_err(|e| ProbeError::InvalidTarget { host: host.to_string(), cause: e.to_string() })?;

        let mut req = self.client.request(method.clone(), url.clone());
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        debug!(%url, %method, "sending http request");
        let resp = req.send().await.map_err(|e| self.classify(host, &e))?;
        let status = resp.status().as_u16();
        let headers: HeaderMultiMap = resp
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let body = resp.bytes().await.map_err(|e| self.classify(host, &e))?;
        debug!(%url, status, headers = headers.len(), body_len = body.len(), "http response");
        let body = decode_body(&headers, &body)
            .await
            .map_err(|cause| ProbeError::Protocol { host: host.to_string(), cause })?;

        Ok(ProbeOutcome { status, headers, payload: Payload::from_body(&body) })
    }

    fn supports(&self, transport: TransportKind) -> bool {
        method_for(transport).is_some()
    }
}
