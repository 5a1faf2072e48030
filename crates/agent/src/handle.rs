use parley_core::{normalize_language_code, Capability, Error, Result};
use parley_providers::{CapabilityHandle, Detector, Summarizer, Translator};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Races `fut` against `cancel`; cancellation wins ties.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

/// A freshly provisioned capability. Owned by the run that created it and dropped when
/// the stage ends.
#[derive(Debug)]
pub struct ProvisionedHandle {
    inner: CapabilityHandle,
}

impl ProvisionedHandle {
    pub(crate) fn new(inner: CapabilityHandle) -> Self {
        Self { inner }
    }

    pub fn capability(&self) -> Capability {
        self.inner.capability()
    }

    pub fn into_detector(self) -> Result<DetectorHandle> {
        match self.inner {
            CapabilityHandle::Detector(inner) => Ok(DetectorHandle { inner }),
            other => Err(mismatch(Capability::Detection, other.capability())),
        }
    }

    pub fn into_translator(self) -> Result<TranslatorHandle> {
        match self.inner {
            CapabilityHandle::Translator(inner) => Ok(TranslatorHandle { inner }),
            other => Err(mismatch(Capability::Translation, other.capability())),
        }
    }

    pub fn into_summarizer(self) -> Result<SummarizerHandle> {
        match self.inner {
            CapabilityHandle::Summarizer(inner) => Ok(SummarizerHandle { inner }),
            other => Err(mismatch(Capability::Summarization, other.capability())),
        }
    }
}

fn mismatch(wanted: Capability, got: Capability) -> Error {
    Error::provisioning(wanted, format!("backend returned a {} handle", got.handle_name()))
}

fn passthrough(e: &Error) -> bool {
    matches!(e, Error::Cancelled)
}

pub struct DetectorHandle {
    inner: Box<dyn Detector>,
}

impl std::fmt::Debug for DetectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DetectorHandle").finish()
    }
}

impl DetectorHandle {
    /// Language of `text` as a lowercase primary subtag (`"EN-us"` becomes `"en"`).
    pub async fn detect(&self, text: &str, cancel: &CancellationToken) -> Result<String> {
        let raw = cancellable(cancel, self.inner.detect(text))
            .await
            .map_err(|e| {
                if passthrough(&e) {
                    e
                } else {
                    Error::DetectionFailed(e.to_string())
                }
            })?;
        let code = normalize_language_code(&raw).ok_or_else(|| {
            Error::DetectionFailed(format!("unrecognized language code '{}'", raw.trim()))
        })?;
        debug!(raw = %raw.trim(), code = %code, "Detected language");
        Ok(code)
    }
}

pub struct TranslatorHandle {
    inner: Box<dyn Translator>,
}

impl std::fmt::Debug for TranslatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorHandle")
            .field("source", &self.source_language())
            .field("target", &self.target_language())
            .finish()
    }
}

impl TranslatorHandle {
    pub fn source_language(&self) -> &str {
        self.inner.source_language()
    }

    pub fn target_language(&self) -> &str {
        self.inner.target_language()
    }

    /// Whether this handle was created for exactly `source -> target`.
    pub fn serves(&self, source: &str, target: &str) -> bool {
        self.source_language() == source && self.target_language() == target
    }

    pub async fn translate(&self, text: &str, cancel: &CancellationToken) -> Result<String> {
        let out = cancellable(cancel, self.inner.translate(text))
            .await
            .map_err(|e| {
                if passthrough(&e) {
                    e
                } else {
                    Error::TranslationFailed(e.to_string())
                }
            })?;
        let out = out.trim();
        if out.is_empty() {
            return Err(Error::TranslationFailed("backend returned an empty translation".to_string()));
        }
        Ok(out.to_string())
    }
}

pub struct SummarizerHandle {
    inner: Box<dyn Summarizer>,
}

impl std::fmt::Debug for SummarizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SummarizerHandle").finish()
    }
}

impl SummarizerHandle {
    pub async fn summarize(
        &self,
        text: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let out = cancellable(cancel, self.inner.summarize(text, context))
            .await
            .map_err(|e| {
                if passthrough(&e) {
                    e
                } else {
                    Error::SummarizationFailed(e.to_string())
                }
            })?;
        let out = out.trim();
        if out.is_empty() {
            return Err(Error::SummarizationFailed("backend returned an empty summary".to_string()));
        }
        Ok(out.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedDetector(&'static str);

    #[async_trait]
    impl Detector for FixedDetector {
        async fn detect(&self, _text: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct StuckDetector;

    #[async_trait]
    impl Detector for StuckDetector {
        async fn detect(&self, _text: &str) -> Result<String> {
            std::future::pending::<()>().await;
            Ok("en".to_string())
        }
    }

    struct EchoSummarizer(&'static str);

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(&self, _text: &str, _context: Option<&str>) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn detector(d: impl Detector + 'static) -> DetectorHandle {
        ProvisionedHandle::new(CapabilityHandle::Detector(Box::new(d)))
            .into_detector()
            .unwrap()
    }

    #[tokio::test]
    async fn test_detect_normalizes_code() {
        let cancel = CancellationToken::new();
        assert_eq!(detector(FixedDetector("EN-us")).detect("hi", &cancel).await.unwrap(), "en");
        assert_eq!(detector(FixedDetector(" pt_BR\n")).detect("oi", &cancel).await.unwrap(), "pt");
    }

    #[tokio::test]
    async fn test_detect_rejects_garbage() {
        let cancel = CancellationToken::new();
        let err = detector(FixedDetector("The language is English"))
            .detect("hi", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DetectionFailed(_)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_invocation() {
        let cancel = CancellationToken::new();
        let handle = detector(StuckDetector);
        cancel.cancel();
        let err = handle.detect("hi", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_empty_summary_is_failure() {
        let handle = ProvisionedHandle::new(CapabilityHandle::Summarizer(Box::new(EchoSummarizer("  "))))
            .into_summarizer()
            .unwrap();
        let err = handle
            .summarize("text", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SummarizationFailed(_)));
    }

    #[test]
    fn test_wrong_handle_kind() {
        let handle = ProvisionedHandle::new(CapabilityHandle::Summarizer(Box::new(EchoSummarizer("x"))));
        let err = handle.into_translator().unwrap_err();
        assert!(matches!(
            err,
            Error::ProvisioningFailed { capability: Capability::Translation, .. }
        ));

        let handle = ProvisionedHandle::new(CapabilityHandle::Detector(Box::new(FixedDetector("en"))));
        let err = handle.into_summarizer().unwrap_err();
        assert!(matches!(
            err,
            Error::ProvisioningFailed { capability: Capability::Summarization, .. }
        ));
    }

    #[test]
    fn test_handles_debug() {
        assert_eq!(format!("{:?}", detector(FixedDetector("en"))), "DetectorHandle");
        let summarizer = ProvisionedHandle::new(CapabilityHandle::Summarizer(Box::new(EchoSummarizer("x"))))
            .into_summarizer()
            .unwrap();
        assert_eq!(format!("{:?}", summarizer), "SummarizerHandle");
    }
}
