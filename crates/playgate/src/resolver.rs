//! # Endpoint failover
//!
//! Picks the first delivery endpoint that answers a probe for a target
//! resource. Candidates are probed one at a time, in the order given, each
//! bounded by the probe timeout, so a full pass over `n` dead endpoints
//! never takes longer than `n * probe_timeout`.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::ResolverConfig;
use crate::transport::{ProbeError, ProbeTransport};

/// Outcome of one resolution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointProbeResult {
    /// The first endpoint that answered
    Reachable(String),
    /// Every candidate failed or timed out
    Exhausted,
}

impl EndpointProbeResult {
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            EndpointProbeResult::Reachable(endpoint) => Some(endpoint),
            EndpointProbeResult::Exhausted => None,
        }
    }

    pub fn into_endpoint(self) -> Option<String> {
        match self {
            EndpointProbeResult::Reachable(endpoint) => Some(endpoint),
            EndpointProbeResult::Exhausted => None,
        }
    }
}

/// Build the URL fetching `target` through `endpoint`.
///
/// The target is appended verbatim; delivery endpoints expect the raw URL.
pub fn proxied_url(endpoint: &str, query_param: &str, target: &str) -> String {
    format!("{endpoint}?{query_param}={target}")
}

pub struct EndpointResolver<T> {
    transport: T,
    config: ResolverConfig,
}

impl<T> EndpointResolver<T>
where
    T: ProbeTransport,
{
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ResolverConfig::default())
    }

    pub fn with_config(transport: T, config: ResolverConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// URL used both for probing and for playback through `endpoint`
    pub fn proxied_url(&self, endpoint: &str, target: &str) -> String {
        proxied_url(endpoint, &self.config.query_param, target)
    }

    /// Probe `candidates` in order and return the first reachable one.
    ///
    /// Individual probe failures are logged and skipped, never returned.
    pub async fn resolve<S>(&self, target_url: &str, candidates: &[S]) -> EndpointProbeResult
    where
        S: AsRef<str>,
    {
        let started = Instant::now();

        for (position, candidate) in candidates.iter().enumerate() {
            let endpoint = candidate.as_ref();
            let probe_url = self.proxied_url(endpoint, target_url);

            match self.probe_once(&probe_url).await {
                Ok(()) => {
                    info!(
                        endpoint,
                        position,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Delivery endpoint reachable"
                    );
                    return EndpointProbeResult::Reachable(endpoint.to_string());
                }
                Err(e) => {
                    debug!(endpoint, position, error = %e, "Delivery endpoint probe failed");
                }
            }
        }

        warn!(
            target_url,
            candidates = candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "No reachable delivery endpoint"
        );
        EndpointProbeResult::Exhausted
    }

    async fn probe_once(&self, probe_url: &str) -> Result<(), ProbeError> {
        let timeout = self.config.probe_timeout;
        // The transport is asked to honour the timeout; this bound holds even if it doesn't.
        match tokio::time::timeout(timeout, self.transport.probe(probe_url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }

    /// Worst-case duration of one [`resolve`](Self::resolve) call
    pub fn max_resolution_time(&self, candidate_count: usize) -> Duration {
        let count = u32::try_from(candidate_count).unwrap_or(u32::MAX);
        self.config.probe_timeout.saturating_mul(count)
    }
}
