//! Per-request runtime context.

use serde::{Deserialize, Serialize};

/// Tenant assumed when a request carries no tenant ID.
pub const DEFAULT_TENANT: &str = "default";

/// Observed conditions for one decision request.
///
/// Supplied by the caller, forwarded verbatim to the predictor and the
/// telemetry sink, never mutated by the engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub app_id: String,
    /// Uplink bandwidth (Mbit/s)
    #[serde(default)]
    pub bw_mbps: f64,
    /// Round-trip time to the edge (ms)
    #[serde(default)]
    pub rtt_ms: f64,
    /// Packet loss rate (0-1)
    #[serde(default)]
    pub loss: f64,
    /// Device CPU load (0-1)
    #[serde(default)]
    pub device_cpu: f64,
    /// Battery state of charge (0-1)
    #[serde(default)]
    pub battery_soc: f64,
    /// Edge CPU load (0-1)
    #[serde(default)]
    pub edge_cpu: f64,
    /// Input size (KiB)
    #[serde(default)]
    pub input_kb: f64,
    /// p95 latency budget (ms)
    #[serde(default)]
    pub slo_p95_ms: f64,
}

impl Context {
    /// Create a context for a tenant with the given SLO and zeroed conditions.
    pub fn for_tenant(tenant_id: impl Into<String>, slo_p95_ms: f64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            slo_p95_ms,
            ..Default::default()
        }
    }

    /// Tenant ID, or [`DEFAULT_TENANT`] when absent.
    pub fn tenant(&self) -> &str {
        if self.tenant_id.is_empty() {
            DEFAULT_TENANT
        } else {
            &self.tenant_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_defaults() {
        let ctx = Context::default();
        assert_eq!(ctx.tenant(), "default");

        let ctx = Context::for_tenant("acme", 120.0);
        assert_eq!(ctx.tenant(), "acme");
        assert_eq!(ctx.slo_p95_ms, 120.0);
    }

    #[test]
    fn test_deserialize_partial() {
        let ctx: Context =
            serde_json::from_str(r#"{"tenant_id":"t1","rtt_ms":12.5,"slo_p95_ms":80}"#).unwrap();
        assert_eq!(ctx.tenant_id, "t1");
        assert_eq!(ctx.rtt_ms, 12.5);
        assert_eq!(ctx.bw_mbps, 0.0);
    }
}
