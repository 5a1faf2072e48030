//! In-memory `CapabilityProvider` with scripted answers, for orchestrator tests.

use async_trait::async_trait;
use parley_core::{
    Capability, Error, PairSupport, ProgressReporter, ProvisionRequest, Readiness, Result,
};
use parley_providers::{CapabilityHandle, CapabilityProvider, Detector, Summarizer, Translator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct Counters {
    readiness: AtomicUsize,
    pair: AtomicUsize,
    detect: AtomicUsize,
    translate: AtomicUsize,
    summarize: AtomicUsize,
}

pub struct ScriptedProvider {
    readiness: HashMap<Capability, std::result::Result<Readiness, String>>,
    pair: std::result::Result<PairSupport, String>,
    detect: std::result::Result<String, String>,
    translate_error: Option<String>,
    summary: std::result::Result<String, String>,
    create_errors: HashMap<Capability, String>,
    progress: HashMap<Capability, Vec<(u64, u64)>>,
    gate: Option<(Capability, Arc<Notify>)>,
    entered: Arc<Notify>,
    creates: HashMap<Capability, AtomicUsize>,
    counters: Arc<Counters>,
}

impl ScriptedProvider {
    /// Everything ready immediately, every pair supported, detection answers "en".
    pub fn new() -> Self {
        Self {
            readiness: Capability::ALL
                .iter()
                .map(|c| (*c, Ok(Readiness::ReadyImmediate)))
                .collect(),
            pair: Ok(PairSupport::Yes),
            detect: Ok("en".to_string()),
            translate_error: None,
            summary: Ok("A short summary.".to_string()),
            create_errors: HashMap::new(),
            progress: HashMap::new(),
            gate: None,
            entered: Arc::new(Notify::new()),
            creates: Capability::ALL.iter().map(|c| (*c, AtomicUsize::new(0))).collect(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_readiness(mut self, capability: Capability, readiness: Readiness) -> Self {
        self.readiness.insert(capability, Ok(readiness));
        self
    }

    pub fn with_readiness_error(mut self, capability: Capability, error: &str) -> Self {
        self.readiness.insert(capability, Err(error.to_string()));
        self
    }

    pub fn with_pair_support(mut self, support: PairSupport) -> Self {
        self.pair = Ok(support);
        self
    }

    pub fn with_pair_error(mut self, error: &str) -> Self {
        self.pair = Err(error.to_string());
        self
    }

    pub fn detecting(mut self, language: &str) -> Self {
        self.detect = Ok(language.to_string());
        self
    }

    pub fn with_detect_error(mut self, error: &str) -> Self {
        self.detect = Err(error.to_string());
        self
    }

    pub fn with_translate_error(mut self, error: &str) -> Self {
        self.translate_error = Some(error.to_string());
        self
    }

    pub fn summarizing(mut self, summary: &str) -> Self {
        self.summary = Ok(summary.to_string());
        self
    }

    pub fn with_summary_error(mut self, error: &str) -> Self {
        self.summary = Err(error.to_string());
        self
    }

    pub fn with_create_error(mut self, capability: Capability, error: &str) -> Self {
        self.create_errors.insert(capability, error.to_string());
        self
    }

    /// Raw samples fed to the reporter while creating `capability`.
    pub fn with_progress(mut self, capability: Capability, samples: &[(u64, u64)]) -> Self {
        self.progress.insert(capability, samples.to_vec());
        self
    }

    /// `create` for `capability` blocks until the returned `Notify` is signalled.
    pub fn gated(mut self, capability: Capability) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some((capability, gate.clone()));
        (self, gate)
    }

    /// Resolves once a gated `create` has started waiting.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn create_calls(&self, capability: Capability) -> usize {
        self.creates
            .get(&capability)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn total_create_calls(&self) -> usize {
        Capability::ALL.iter().map(|c| self.create_calls(*c)).sum()
    }

    pub fn readiness_calls(&self) -> usize {
        self.counters.readiness.load(Ordering::SeqCst)
    }

    pub fn pair_calls(&self) -> usize {
        self.counters.pair.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.counters.detect.load(Ordering::SeqCst)
    }

    pub fn translate_calls(&self) -> usize {
        self.counters.translate.load(Ordering::SeqCst)
    }

    pub fn summarize_calls(&self) -> usize {
        self.counters.summarize.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn readiness(&self, capability: Capability) -> Result<Readiness> {
        self.counters.readiness.fetch_add(1, Ordering::SeqCst);
        match self.readiness.get(&capability) {
            Some(Ok(r)) => Ok(*r),
            Some(Err(e)) => Err(Error::Provider(e.clone())),
            None => Ok(Readiness::Unavailable),
        }
    }

    async fn pair_support(&self, _source: &str, _target: &str) -> Result<PairSupport> {
        self.counters.pair.fetch_add(1, Ordering::SeqCst);
        self.pair.clone().map_err(Error::Provider)
    }

    async fn create(
        &self,
        request: &ProvisionRequest,
        progress: &mut ProgressReporter,
    ) -> Result<CapabilityHandle> {
        let capability = request.capability();
        if let Some(counter) = self.creates.get(&capability) {
            counter.fetch_add(1, Ordering::SeqCst);
        }

        for (loaded, total) in self.progress.get(&capability).into_iter().flatten() {
            progress.report(*loaded, *total);
            tokio::task::yield_now().await;
        }

        if let Some((gated, gate)) = &self.gate {
            if *gated == capability {
                self.entered.notify_one();
                gate.notified().await;
            }
        }

        if let Some(e) = self.create_errors.get(&capability) {
            return Err(Error::Provider(e.clone()));
        }

        let counters = self.counters.clone();
        Ok(match request {
            ProvisionRequest::Detection => CapabilityHandle::Detector(Box::new(ScriptedDetector {
                result: self.detect.clone(),
                counters,
            })),
            ProvisionRequest::Translation { source, target } => {
                CapabilityHandle::Translator(Box::new(ScriptedTranslator {
                    source: source.clone(),
                    target: target.clone(),
                    error: self.translate_error.clone(),
                    counters,
                }))
            }
            ProvisionRequest::Summarization(_) => {
                CapabilityHandle::Summarizer(Box::new(ScriptedSummarizer {
                    result: self.summary.clone(),
                    counters,
                }))
            }
        })
    }
}

struct ScriptedDetector {
    result: std::result::Result<String, String>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, _text: &str) -> Result<String> {
        self.counters.detect.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(Error::Provider)
    }
}

struct ScriptedTranslator {
    source: String,
    target: String,
    error: Option<String>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Translator for ScriptedTranslator {
    fn source_language(&self) -> &str {
        &self.source
    }

    fn target_language(&self) -> &str {
        &self.target
    }

    async fn translate(&self, text: &str) -> Result<String> {
        self.counters.translate.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(e) => Err(Error::Provider(e.clone())),
            None => Ok(format!("[{}] {}", self.target, text)),
        }
    }
}

struct ScriptedSummarizer {
    result: std::result::Result<String, String>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, _text: &str, _context: Option<&str>) -> Result<String> {
        self.counters.summarize.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(Error::Provider)
    }
}
