use parley_core::{Capability, PairSupport, Readiness};
use parley_providers::CapabilityProvider;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answers "can this capability be used right now?". Never errors: a backend that
/// cannot answer is treated as not having the capability.
#[derive(Clone)]
pub struct CapabilityProbe {
    provider: Arc<dyn CapabilityProvider>,
}

impl CapabilityProbe {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self { provider }
    }

    pub async fn check_readiness(&self, capability: Capability) -> Readiness {
        match self.provider.readiness(capability).await {
            Ok(readiness) => {
                debug!(capability = %capability, readiness = %readiness, "Probed capability");
                readiness
            }
            Err(e) => {
                warn!(
                    capability = %capability,
                    provider = self.provider.name(),
                    error = %e,
                    "Readiness probe failed, treating as unavailable"
                );
                Readiness::Unavailable
            }
        }
    }

    pub async fn check_pair_support(&self, source: &str, target: &str) -> PairSupport {
        match self.provider.pair_support(source, target).await {
            Ok(support) => support,
            Err(e) => {
                warn!(source, target, error = %e, "Pair support probe failed");
                PairSupport::Unknown
            }
        }
    }

    /// Readiness of every capability, in `Capability::ALL` order.
    pub async fn snapshot(&self) -> Vec<(Capability, Readiness)> {
        let mut out = Vec::with_capacity(Capability::ALL.len());
        for capability in Capability::ALL {
            out.push((capability, self.check_readiness(capability).await));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    #[tokio::test]
    async fn test_probe_errors_degrade() {
        let provider = ScriptedProvider::new()
            .with_readiness_error(Capability::Detection, "connection refused")
            .with_pair_error("boom");
        let probe = CapabilityProbe::new(Arc::new(provider));

        assert_eq!(probe.check_readiness(Capability::Detection).await, Readiness::Unavailable);
        assert_eq!(probe.check_pair_support("en", "es").await, PairSupport::Unknown);
    }

    #[tokio::test]
    async fn test_snapshot_reports_each_capability() {
        let provider = ScriptedProvider::new()
            .with_readiness(Capability::Detection, Readiness::ReadyImmediate)
            .with_readiness(Capability::Translation, Readiness::ReadyAfterProvision)
            .with_readiness(Capability::Summarization, Readiness::Unavailable);
        let probe = CapabilityProbe::new(Arc::new(provider));

        assert_eq!(
            probe.snapshot().await,
            vec![
                (Capability::Detection, Readiness::ReadyImmediate),
                (Capability::Translation, Readiness::ReadyAfterProvision),
                (Capability::Summarization, Readiness::Unavailable),
            ]
        );
    }
}
