use async_trait::async_trait;
use parley_core::{
    Capability, Error, PairSupport, ProgressReporter, ProvisionRequest, Readiness, Result,
    SummarizerOptions,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::client::build_http_client;
use crate::{CapabilityHandle, CapabilityProvider, Detector, Summarizer, Translator};

/// Longest slice of an error body kept in error messages.
const ERROR_BODY_PREVIEW: usize = 300;

fn preview(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(ERROR_BODY_PREVIEW)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

#[derive(Clone)]
struct RemoteEndpoint {
    client: Client,
    api_base: String,
    api_key: String,
}

impl RemoteEndpoint {
    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.api_base, path);
        info!(url = %url, "Calling remote capability API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("request to {} failed: {}", path, e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, path = %path, body = %preview(&raw_body), "Remote capability API error");
            return Err(Error::Provider(format!(
                "{} returned HTTP {}: {}",
                path,
                status,
                preview(&raw_body)
            )));
        }

        debug!(path = %path, body_len = raw_body.len(), "Remote capability API response");
        serde_json::from_str(&raw_body).map_err(|e| {
            Error::Provider(format!(
                "Failed to parse {} response: {}. Body: {}",
                path,
                e,
                preview(&raw_body)
            ))
        })
    }
}

/// Capabilities served by a bearer-token HTTP API:
/// `POST /detect`, `POST /translate`, `POST /summarize`.
pub struct RemoteProvider {
    endpoint: RemoteEndpoint,
    configured: bool,
    languages: Vec<String>,
}

impl RemoteProvider {
    pub fn new(api_key: &str, api_base: Option<&str>, languages: Vec<String>) -> Self {
        Self::new_with_proxy(
            api_key,
            api_base,
            languages,
            None,
            None,
            &[],
            Duration::from_secs(60),
        )
    }

    pub fn new_with_proxy(
        api_key: &str,
        api_base: Option<&str>,
        languages: Vec<String>,
        provider_proxy: Option<&str>,
        global_proxy: Option<&str>,
        no_proxy: &[String],
        timeout: Duration,
    ) -> Self {
        let resolved_base = api_base
            .map(|b| b.trim().trim_end_matches('/').to_string())
            .unwrap_or_default();
        let client = build_http_client(provider_proxy, global_proxy, no_proxy, &resolved_base, timeout);
        let configured = !api_key.trim().is_empty() && !resolved_base.is_empty();
        Self {
            endpoint: RemoteEndpoint {
                client,
                api_base: resolved_base,
                api_key: api_key.trim().to_string(),
            },
            configured,
            languages,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }
}

#[async_trait]
impl CapabilityProvider for RemoteProvider {
    fn name(&self) -> &str {
        "remote"
    }

    async fn readiness(&self, _capability: Capability) -> Result<Readiness> {
        // Nothing to download; usable whenever credentials are present.
        Ok(if self.configured {
            Readiness::ReadyImmediate
        } else {
            Readiness::Unavailable
        })
    }

    async fn pair_support(&self, _source: &str, target: &str) -> Result<PairSupport> {
        if !self.configured {
            return Ok(PairSupport::No);
        }
        Ok(if self.languages.iter().any(|l| l == target) {
            PairSupport::Yes
        } else {
            PairSupport::No
        })
    }

    async fn create(
        &self,
        request: &ProvisionRequest,
        _progress: &mut ProgressReporter,
    ) -> Result<CapabilityHandle> {
        if !self.configured {
            return Err(Error::CapabilityUnavailable(request.capability()));
        }
        let endpoint = self.endpoint.clone();
        let handle = match request {
            ProvisionRequest::Detection => CapabilityHandle::Detector(Box::new(RemoteDetector { endpoint })),
            ProvisionRequest::Translation { source, target } => {
                CapabilityHandle::Translator(Box::new(RemoteTranslator {
                    endpoint,
                    source: source.clone(),
                    target: target.clone(),
                }))
            }
            ProvisionRequest::Summarization(options) => {
                CapabilityHandle::Summarizer(Box::new(RemoteSummarizer {
                    endpoint,
                    options: options.clone(),
                }))
            }
        };
        Ok(handle)
    }
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct DetectResponse {
    language: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    text: &'a str,
    target_language: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translation: String,
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    #[serde(rename = "type")]
    summary_type: &'a str,
    format: &'a str,
    length: &'a str,
}

#[derive(Deserialize)]
struct SummarizeResponse {
    summary: String,
}

struct RemoteDetector {
    endpoint: RemoteEndpoint,
}

#[async_trait]
impl Detector for RemoteDetector {
    async fn detect(&self, text: &str) -> Result<String> {
        let resp: DetectResponse = self.endpoint.post("/detect", &DetectRequest { text }).await?;
        Ok(resp.language)
    }
}

struct RemoteTranslator {
    endpoint: RemoteEndpoint,
    source: String,
    target: String,
}

#[async_trait]
impl Translator for RemoteTranslator {
    fn source_language(&self) -> &str {
        &self.source
    }

    fn target_language(&self) -> &str {
        &self.target
    }

    async fn translate(&self, text: &str) -> Result<String> {
        let body = TranslateRequest {
            text,
            target_language: &self.target,
        };
        let resp: TranslateResponse = self.endpoint.post("/translate", &body).await?;
        Ok(resp.translation)
    }
}

struct RemoteSummarizer {
    endpoint: RemoteEndpoint,
    options: SummarizerOptions,
}

#[async_trait]
impl Summarizer for RemoteSummarizer {
    async fn summarize(&self, text: &str, context: Option<&str>) -> Result<String> {
        let body = SummarizeRequest {
            text,
            context: context.or(self.options.shared_context.as_deref()),
            summary_type: &self.options.summary_type,
            format: &self.options.format,
            length: &self.options.length,
        };
        let resp: SummarizeResponse = self.endpoint.post("/summarize", &body).await?;
        Ok(resp.summary)
    }
}
