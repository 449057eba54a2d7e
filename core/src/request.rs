use crate::Host;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which probe handles a request, and with which verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    HttpOptions,
    HttpGet,
    HttpPost,
    GrpcUnary,
    WebsocketRoundtrip,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::HttpOptions => "http-options",
            TransportKind::HttpGet => "http-get",
            TransportKind::HttpPost => "http-post",
            TransportKind::GrpcUnary => "grpc-unary",
            TransportKind::WebsocketRoundtrip => "websocket-roundtrip",
        }
    }

    pub fn is_http(self) -> bool {
        matches!(self, TransportKind::HttpOptions | TransportKind::HttpGet | TransportKind::HttpPost)
    }

    fn scheme(self, secure: bool) -> &'static str {
        match (self, secure) {
            (TransportKind::WebsocketRoundtrip, true) => "wss",
            (TransportKind::WebsocketRoundtrip, false) => "ws",
            (_, true) => "https",
            (_, false) => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a WebSocket reply is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decode {
    /// Decode one JSON message; an unparseable reply is a protocol error.
    #[default]
    Json,
    /// Take one frame as text without interpreting it.
    Raw,
}

/// Host-independent description of one outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDescriptor {
    pub transport: TransportKind,
    /// URL path for HTTP and WebSocket, `/package.Service/Method` for gRPC.
    pub path: String,
    pub port: Option<u16>,
    pub secure: bool,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub decode: Decode,
}

impl RequestDescriptor {
    pub fn new(transport: TransportKind, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
            port: None,
            secure: true,
            headers: Vec::new(),
            body: None,
            decode: Decode::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_decode(mut self, decode: Decode) -> Self {
        self.decode = decode;
        self
    }

    /// `host[:port]`
    pub fn authority(&self, host: &Host) -> String {
        match self.port {
            Some(p) => format!("{}:{}", host, p),
            None => host.to_string(),
        }
    }

    /// Scheme and authority, e.g. `https://api0.example.net:13007`.
    pub fn origin(&self, host: &Host) -> String {
        format!("{}://{}", self.transport.scheme(self.secure), self.authority(host))
    }

    pub fn url(&self, host: &Host) -> String {
        format!("{}/{}", self.origin(host), self.path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_per_transport() {
        let host = Host::from("be0.example.net");
        let get = RequestDescriptor::new(TransportKind::HttpGet, "/rest/transactions");
        assert_eq!(get.url(&host), "https://be0.example.net/rest/transactions");

        let root = RequestDescriptor::new(TransportKind::HttpOptions, "");
        assert_eq!(root.url(&host), "https://be0.example.net/");

        let ws = RequestDescriptor::new(TransportKind::WebsocketRoundtrip, "websocket");
        assert_eq!(ws.url(&host), "wss://be0.example.net/websocket");
        assert_eq!(ws.clone().insecure().url(&host), "ws://be0.example.net/websocket");

        let grpc = RequestDescriptor::new(TransportKind::GrpcUnary, "/svc/Method").with_port(13007);
        assert_eq!(grpc.origin(&host), "https://be0.example.net:13007");
    }

    #[test]
    fn transport_names_round_trip_through_yaml() {
        let t: TransportKind = serde_yaml::from_str("websocket-roundtrip").unwrap();
        assert_eq!(t, TransportKind::WebsocketRoundtrip);
        assert!(serde_yaml::from_str::<TransportKind>("http-put").is_err());
        assert!(TransportKind::HttpPost.is_http());
        assert!(!TransportKind::GrpcUnary.is_http());
    }
}
