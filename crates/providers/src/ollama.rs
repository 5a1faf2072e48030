use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use parley_core::config::LanguageOption;
use parley_core::{
    Capability, Error, PairSupport, ProgressReporter, ProvisionRequest, Readiness, Result,
    SummarizerOptions, AUTO_LANGUAGE,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::client::build_http_client;
use crate::{CapabilityHandle, CapabilityProvider, Detector, Summarizer, Translator};

const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";

/// On-device capabilities backed by a local Ollama daemon. One model serves all three
/// capabilities; provisioning means pulling that model.
pub struct OllamaProvider {
    endpoint: OllamaEndpoint,
    languages: Vec<LanguageOption>,
}

#[derive(Clone)]
struct OllamaEndpoint {
    client: Client,
    api_base: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(api_base: Option<&str>, model: &str, languages: Vec<LanguageOption>) -> Self {
        Self::new_with_proxy(api_base, model, languages, None, None, &[])
    }

    pub fn new_with_proxy(
        api_base: Option<&str>,
        model: &str,
        languages: Vec<LanguageOption>,
        provider_proxy: Option<&str>,
        global_proxy: Option<&str>,
        no_proxy: &[String],
    ) -> Self {
        let resolved_base = api_base
            .unwrap_or(DEFAULT_OLLAMA_BASE)
            .trim_end_matches('/')
            .to_string();
        // 本地推理和模型下载都可能很慢
        let client = build_http_client(
            provider_proxy,
            global_proxy,
            no_proxy,
            &resolved_base,
            Duration::from_secs(300),
        );
        Self {
            endpoint: OllamaEndpoint {
                client,
                api_base: resolved_base,
                model: normalize_model(model).to_string(),
            },
            languages,
        }
    }

    pub fn model(&self) -> &str {
        &self.endpoint.model
    }

    fn language_name<'a>(languages: &'a [LanguageOption], code: &'a str) -> &'a str {
        languages
            .iter()
            .find(|l| l.code == code)
            .map(|l| l.name.as_str())
            .unwrap_or(code)
    }

    async fn installed_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.endpoint.api_base);
        let response = self
            .endpoint
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama unreachable at {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Provider(format!("Ollama /api/tags returned HTTP {}", status)));
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse Ollama tags: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull(&self, progress: &mut ProgressReporter) -> Result<()> {
        let url = format!("{}/api/pull", self.endpoint.api_base);
        info!(model = %self.endpoint.model, "Pulling Ollama model");

        let body = PullRequest {
            model: &self.endpoint.model,
            stream: true,
        };
        let response = self
            .endpoint
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama pull request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let raw_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %raw_body, "Ollama pull error");
            return Err(Error::Provider(format!("Ollama pull error {}: {}", status, raw_body)));
        }

        let mut tracker = PullProgress::default();
        let mut buffer = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Provider(format!("Ollama pull stream broken: {}", e)))?;
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line = buffer.split_to(pos + 1);
                if let Some((loaded, total)) = tracker.apply_line(&line)? {
                    progress.report(loaded, total);
                }
            }
        }
        if let Some((loaded, total)) = tracker.apply_line(&buffer)? {
            progress.report(loaded, total);
        }

        if !tracker.succeeded {
            return Err(Error::Provider("Ollama pull ended without success".to_string()));
        }
        info!(model = %self.endpoint.model, "Ollama model pulled");
        Ok(())
    }
}

/// Config may store "ollama/llama3" but the API expects "llama3".
fn normalize_model(model: &str) -> &str {
    model.strip_prefix("ollama/").unwrap_or(model)
}

/// `llama3` and `llama3:latest` name the same model.
fn model_matches(installed: &str, wanted: &str) -> bool {
    fn with_tag(name: &str) -> String {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{}:latest", name)
        }
    }
    with_tag(installed) == with_tag(wanted)
}

#[async_trait]
impl CapabilityProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn readiness(&self, capability: Capability) -> Result<Readiness> {
        let models = match self.installed_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(capability = %capability, error = %e, "Ollama not reachable");
                return Ok(Readiness::Unavailable);
            }
        };
        let present = models.iter().any(|m| model_matches(m, &self.endpoint.model));
        debug!(model = %self.endpoint.model, present, installed = models.len(), "Ollama tags checked");
        Ok(if present {
            Readiness::ReadyImmediate
        } else {
            Readiness::ReadyAfterProvision
        })
    }

    async fn pair_support(&self, source: &str, target: &str) -> Result<PairSupport> {
        let known = |code: &str| self.languages.iter().any(|l| l.code == code);
        if !known(target) {
            return Ok(PairSupport::No);
        }
        if source == AUTO_LANGUAGE || known(source) {
            Ok(PairSupport::Yes)
        } else {
            Ok(PairSupport::Unknown)
        }
    }

    async fn create(
        &self,
        request: &ProvisionRequest,
        progress: &mut ProgressReporter,
    ) -> Result<CapabilityHandle> {
        let models = self.installed_models().await?;
        if !models.iter().any(|m| model_matches(m, &self.endpoint.model)) {
            self.pull(progress).await?;
        }

        let endpoint = self.endpoint.clone();
        let handle = match request {
            ProvisionRequest::Detection => CapabilityHandle::Detector(Box::new(OllamaDetector { endpoint })),
            ProvisionRequest::Translation { source, target } => {
                CapabilityHandle::Translator(Box::new(OllamaTranslator {
                    endpoint,
                    source: source.clone(),
                    target: target.clone(),
                    source_name: Self::language_name(&self.languages, source).to_string(),
                    target_name: Self::language_name(&self.languages, target).to_string(),
                }))
            }
            ProvisionRequest::Summarization(options) => {
                CapabilityHandle::Summarizer(Box::new(OllamaSummarizer {
                    endpoint,
                    options: options.clone(),
                }))
            }
        };
        Ok(handle)
    }
}

impl OllamaEndpoint {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.api_base);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };
        debug!(model = %self.model, prompt_len = prompt.len(), "Ollama generate");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Ollama API error");
            return Err(Error::Provider(format!("Ollama API error {}: {}", status, raw_body)));
        }
        parse_generate_response(&raw_body)
    }

    /// Loads the model into memory; Ollama treats an empty prompt as a load request.
    async fn warm_up(&self) -> Result<()> {
        self.generate("").await.map(|_| ())
    }
}

fn parse_generate_response(raw_body: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(raw_body).map_err(|e| {
        Error::Provider(format!("Failed to parse Ollama response: {}. Body: {}", e, raw_body))
    })?;
    if let Some(err) = parsed.error {
        return Err(Error::Provider(format!("Ollama error: {}", err)));
    }
    Ok(parsed.response.trim().to_string())
}

fn detection_prompt(text: &str) -> String {
    format!(
        "Identify the language of the text below. Answer with its two-letter ISO 639-1 code only.\n\nText:\n{}",
        text
    )
}

fn translation_prompt(source_name: Option<&str>, target_name: &str, text: &str) -> String {
    let from = source_name
        .map(|name| format!(" from {}", name))
        .unwrap_or_default();
    format!(
        "Translate the text below{} into {}. Answer with the translation only.\n\nText:\n{}",
        from, target_name, text
    )
}

fn summarization_prompt(options: &SummarizerOptions, context: Option<&str>, text: &str) -> String {
    let mut prompt = format!(
        "Summarize the text below as {} in {} format, {} length.",
        options.summary_type.replace('-', " "),
        options.format.replace('-', " "),
        options.length
    );
    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!(" Context: {}.", ctx.trim()));
    }
    prompt.push_str(" Answer with the summary only.\n\nText:\n");
    prompt.push_str(text);
    prompt
}

struct OllamaDetector {
    endpoint: OllamaEndpoint,
}

#[async_trait]
impl Detector for OllamaDetector {
    async fn detect(&self, text: &str) -> Result<String> {
        self.endpoint.generate(&detection_prompt(text)).await
    }

    async fn ready(&self) -> Result<()> {
        self.endpoint.warm_up().await
    }
}

struct OllamaTranslator {
    endpoint: OllamaEndpoint,
    source: String,
    target: String,
    source_name: String,
    target_name: String,
}

#[async_trait]
impl Translator for OllamaTranslator {
    fn source_language(&self) -> &str {
        &self.source
    }

    fn target_language(&self) -> &str {
        &self.target
    }

    async fn translate(&self, text: &str) -> Result<String> {
        let source_name = (self.source != AUTO_LANGUAGE).then_some(self.source_name.as_str());
        self.endpoint
            .generate(&translation_prompt(source_name, &self.target_name, text))
            .await
    }

    async fn ready(&self) -> Result<()> {
        self.endpoint.warm_up().await
    }
}

struct OllamaSummarizer {
    endpoint: OllamaEndpoint,
    options: SummarizerOptions,
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, text: &str, context: Option<&str>) -> Result<String> {
        let context = context.or(self.options.shared_context.as_deref());
        self.endpoint
            .generate(&summarization_prompt(&self.options, context, text))
            .await
    }

    async fn ready(&self) -> Result<()> {
        self.endpoint.warm_up().await
    }
}

/// Folds `/api/pull` NDJSON lines into overall byte counts. Each layer reports its own
/// `completed`/`total`; the sum across layers is what gets reported.
#[derive(Debug, Default)]
struct PullProgress {
    layers: HashMap<String, (u64, u64)>,
    succeeded: bool,
}

impl PullProgress {
    fn apply_line(&mut self, line: &[u8]) -> Result<Option<(u64, u64)>> {
        let trimmed = String::from_utf8_lossy(line);
        let trimmed = trimmed.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let status: PullStatus = match serde_json::from_str(trimmed) {
            Ok(s) => s,
            Err(e) => {
                warn!(line = %trimmed, error = %e, "Skipping unparseable Ollama pull line");
                return Ok(None);
            }
        };
        if let Some(err) = status.error {
            return Err(Error::Provider(format!("Ollama pull failed: {}", err)));
        }
        if status.status.as_deref() == Some("success") {
            self.succeeded = true;
        }
        match (status.digest, status.total) {
            (Some(digest), Some(total)) if total > 0 => {
                let completed = status.completed.unwrap_or(0).min(total);
                let entry = self.layers.entry(digest).or_insert((0, total));
                entry.0 = entry.0.max(completed);
                entry.1 = total;
                Ok(Some(self.totals()))
            }
            _ => Ok(None),
        }
    }

    fn totals(&self) -> (u64, u64) {
        self.layers
            .values()
            .fold((0, 0), |(l, t), (loaded, total)| (l + loaded, t + total))
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}
