pub mod client;
pub mod factory;
pub mod ollama;
pub mod remote;

use async_trait::async_trait;
use parley_core::{Capability, PairSupport, ProgressReporter, ProvisionRequest, Readiness, Result};

/// A backend that can report and materialize the three capabilities.
///
/// Implementations must not cache handles: every `create` call yields a fresh
/// handle owned by the caller.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Current readiness. Backends may return `Err` for transport problems;
    /// callers treat that as `Unavailable`.
    async fn readiness(&self, capability: Capability) -> Result<Readiness>;

    async fn pair_support(&self, source: &str, target: &str) -> Result<PairSupport>;

    /// Materialize a handle, downloading whatever is needed first. Progress goes
    /// to `progress`; the caller closes it when this returns.
    async fn create(
        &self,
        request: &ProvisionRequest,
        progress: &mut ProgressReporter,
    ) -> Result<CapabilityHandle>;
}

#[async_trait]
pub trait Detector: Send + Sync {
    /// Best-guess language of `text`, as the backend reports it.
    async fn detect(&self, text: &str) -> Result<String>;

    /// Suspension point after creation; resolves once the handle can serve calls.
    async fn ready(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    fn source_language(&self) -> &str;
    fn target_language(&self) -> &str;

    async fn translate(&self, text: &str) -> Result<String>;

    async fn ready(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, context: Option<&str>) -> Result<String>;

    async fn ready(&self) -> Result<()> {
        Ok(())
    }
}

/// A materialized capability as produced by a backend.
pub enum CapabilityHandle {
    Detector(Box<dyn Detector>),
    Translator(Box<dyn Translator>),
    Summarizer(Box<dyn Summarizer>),
}

impl CapabilityHandle {
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityHandle::Detector(_) => Capability::Detection,
            CapabilityHandle::Translator(_) => Capability::Translation,
            CapabilityHandle::Summarizer(_) => Capability::Summarization,
        }
    }

    pub async fn ready(&self) -> Result<()> {
        match self {
            CapabilityHandle::Detector(h) => h.ready().await,
            CapabilityHandle::Translator(h) => h.ready().await,
            CapabilityHandle::Summarizer(h) => h.ready().await,
        }
    }
}

impl std::fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityHandle::Translator(t) => f
                .debug_struct("Translator")
                .field("source", &t.source_language())
                .field("target", &t.target_language())
                .finish(),
            other => f.debug_tuple(other.capability().handle_name()).finish(),
        }
    }
}

pub use factory::create_provider;
pub use ollama::OllamaProvider;
pub use remote::RemoteProvider;
