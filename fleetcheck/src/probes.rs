//! Wires the compiled-in transport probes into one dispatcher.

use anyhow::Result;
#[cfg(feature = "http")]
use anyhow::Context;
use fleetcheck_core::{Plan, Probe, ProbeSet};
use std::sync::Arc;

#[allow(unused_mut, unused_variables)]
pub fn build(plan: &Plan) -> Result<Arc<dyn Probe>> {
    let t = plan.timeouts;
    let mut set = ProbeSet::new();

    #[cfg(feature = "http")]
    {
        let opts = http_probe::HttpProbeOptions {
            timeout: t.http,
            user_agent: Some(format!("fleetcheck/{}", env!("CARGO_PKG_VERSION"))),
            ..Default::default()
        };
        let probe = http_probe::HttpProbe::new(opts).context("building http client")?;
        set = set.with_http(Arc::new(probe));
    }
    #[cfg(feature = "grpc")]
    {
        let opts = grpc_probe::GrpcProbeOptions { dial_timeout: t.grpc_dial, call_timeout: t.grpc_call };
        set = set.with_grpc(Arc::new(grpc_probe::GrpcProbe::new(opts)));
    }
    #[cfg(feature = "ws")]
    {
        let opts = ws_probe::WsProbeOptions { connect_timeout: t.ws_connect, read_timeout: t.ws_read };
        set = set.with_websocket(Arc::new(ws_probe::WsProbe::new(opts)));
    }
    Ok(Arc::new(set))
}
