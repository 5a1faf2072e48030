use parley_core::progress::ProgressSender;
use parley_core::{Error, ProgressReporter, ProvisionRequest, Readiness, Result};
use parley_providers::CapabilityProvider;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::handle::{cancellable, ProvisionedHandle};

/// Turns a usable capability into a handle. Nothing is cached: every call creates a
/// new handle, and a failure is never retried here.
#[derive(Clone)]
pub struct CapabilityProvisioner {
    provider: Arc<dyn CapabilityProvider>,
}

impl CapabilityProvisioner {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self { provider }
    }

    /// `readiness` is the probe result the caller acted on. `Unavailable` fails before the
    /// backend or the progress channel is touched.
    pub async fn provision(
        &self,
        readiness: Readiness,
        request: &ProvisionRequest,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedHandle> {
        let capability = request.capability();
        if !readiness.is_usable() {
            return Err(Error::CapabilityUnavailable(capability));
        }

        info!(capability = %capability, readiness = %readiness, "Provisioning capability");
        let mut reporter = ProgressReporter::new(capability, progress);
        let provider = &self.provider;
        let result = cancellable(cancel, async {
            let handle = provider.create(request, &mut reporter).await?;
            handle.ready().await?;
            Ok::<_, Error>(handle)
        })
        .await;
        reporter.close();

        match result {
            Ok(handle) if handle.capability() == capability => {
                info!(
                    capability = %capability,
                    progress_events = reporter.emitted(),
                    "Capability provisioned"
                );
                Ok(ProvisionedHandle::new(handle))
            }
            Ok(handle) => Err(Error::provisioning(
                capability,
                format!("backend returned a {} handle", handle.capability().handle_name()),
            )),
            Err(Error::Cancelled) => {
                warn!(capability = %capability, "Provisioning cancelled");
                Err(Error::Cancelled)
            }
            Err(e @ Error::CapabilityUnavailable(_)) => Err(e),
            Err(e @ Error::ProvisioningFailed { .. }) => Err(e),
            Err(e) => {
                warn!(capability = %capability, error = %e, "Provisioning failed");
                Err(Error::provisioning(capability, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use parley_core::{Capability, ProgressEvent};
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<parley_core::CapabilityProgress>) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(p) = rx.try_recv() {
            out.push(p.event);
        }
        out
    }

    #[tokio::test]
    async fn test_unavailable_fails_fast_without_progress() {
        let provider = Arc::new(
            ScriptedProvider::new().with_progress(Capability::Detection, &[(1, 10), (10, 10)]),
        );
        let provisioner = CapabilityProvisioner::new(provider.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = provisioner
            .provision(
                Readiness::Unavailable,
                &ProvisionRequest::Detection,
                Some(tx),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CapabilityUnavailable(Capability::Detection)));
        assert_eq!(provider.create_calls(Capability::Detection), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_with_call() {
        let provider = Arc::new(ScriptedProvider::new().with_progress(
            Capability::Summarization,
            &[(0, 100), (40, 100), (30, 100), (80, 90), (100, 120), (120, 120)],
        ));
        let provisioner = CapabilityProvisioner::new(provider.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = provisioner
            .provision(
                Readiness::ReadyAfterProvision,
                &ProvisionRequest::Summarization(Default::default()),
                Some(tx),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(handle.capability(), Capability::Summarization);

        let events = drain(&mut rx);
        assert!(!events.is_empty());
        for pair in events.windows(2) {
            assert!(pair[0].bytes_loaded <= pair[1].bytes_loaded);
            assert!(pair[0].bytes_total <= pair[1].bytes_total);
        }
        assert!(events.iter().all(|e| e.bytes_loaded <= e.bytes_total));
        // the sender was released with the reporter
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_backend_error_becomes_provisioning_failed() {
        let provider = Arc::new(
            ScriptedProvider::new().with_create_error(Capability::Translation, "disk full"),
        );
        let provisioner = CapabilityProvisioner::new(provider.clone());
        let request = ProvisionRequest::Translation {
            source: "en".to_string(),
            target: "es".to_string(),
        };

        let err = provisioner
            .provision(Readiness::ReadyImmediate, &request, None, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            Error::ProvisioningFailed { capability, cause } => {
                assert_eq!(capability, Capability::Translation);
                assert!(cause.contains("disk full"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // no automatic retry
        assert_eq!(provider.create_calls(Capability::Translation), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_provisioning() {
        let (provider, _gate) = ScriptedProvider::new().gated(Capability::Detection);
        let provider = Arc::new(provider);
        let provisioner = CapabilityProvisioner::new(provider.clone());
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                provisioner
                    .provision(
                        Readiness::ReadyAfterProvision,
                        &ProvisionRequest::Detection,
                        None,
                        &cancel,
                    )
                    .await
            })
        };
        provider.wait_entered().await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_each_call_creates_a_new_handle() {
        let provider = Arc::new(ScriptedProvider::new());
        let provisioner = CapabilityProvisioner::new(provider.clone());
        let cancel = CancellationToken::new();
        for _ in 0..2 {
            provisioner
                .provision(Readiness::ReadyImmediate, &ProvisionRequest::Detection, None, &cancel)
                .await
                .unwrap();
        }
        assert_eq!(provider.create_calls(Capability::Detection), 2);
    }
}
