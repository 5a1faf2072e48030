use parley_core::{
    Capability, ConversationLog, Error, FailureKind, PipelineConfig, PipelineOutcome,
    ProvisionRequest, Readiness, Result, SkipReason, Stage, SystemTurnKind, TranslationMode,
    TurnId, AUTO_LANGUAGE,
};
use parley_providers::CapabilityProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{EventSender, PipelineEvent};
use crate::handle::ProvisionedHandle;
use crate::probe::CapabilityProbe;
use crate::provisioner::CapabilityProvisioner;

const EMPTY_INPUT_MESSAGE: &str = "Please enter some text!";

/// Ends a run however it ends: retires its token, then releases the busy flag.
struct RunGuard<'a> {
    busy: &'a AtomicBool,
    active: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut active = lock(self.active);
        *active = None;
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Drives probe → provision → invoke for each stage of a user action and mirrors every
/// outcome into the conversation log.
///
/// One run at a time: `process`, `translate`, and `summarize` return `Error::Busy`
/// while another run is active instead of queueing.
pub struct Orchestrator {
    probe: CapabilityProbe,
    provisioner: CapabilityProvisioner,
    pipeline: PipelineConfig,
    log: Mutex<ConversationLog>,
    target_language: Mutex<String>,
    busy: AtomicBool,
    /// Token of the active run. Only set while `busy` is true; both change under this lock.
    cancel: Mutex<Option<CancellationToken>>,
    events: Option<EventSender>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn stage_noun(stage: Stage) -> &'static str {
    match stage {
        Stage::Validating => "Input",
        Stage::Detecting => "Language detection",
        Stage::Translating => "Translation",
        Stage::Summarizing => "Summarization",
    }
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CapabilityProvider>, pipeline: PipelineConfig) -> Self {
        let target = pipeline.default_target_language.clone();
        Self {
            probe: CapabilityProbe::new(provider.clone()),
            provisioner: CapabilityProvisioner::new(provider),
            pipeline,
            log: Mutex::new(ConversationLog::new()),
            target_language: Mutex::new(target),
            busy: AtomicBool::new(false),
            cancel: Mutex::new(None),
            events: None,
        }
    }

    /// Stream stage, progress, and outcome events to `tx` as they happen.
    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub fn probe(&self) -> &CapabilityProbe {
        &self.probe
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Cancel the active run, if any. Its current stage fails with `Cancelled`.
    pub fn cancel(&self) {
        if let Some(token) = lock(&self.cancel).as_ref() {
            info!("Cancelling active pipeline run");
            token.cancel();
        }
    }

    /// Snapshot of the conversation so far.
    pub fn log(&self) -> ConversationLog {
        lock(&self.log).clone()
    }

    pub fn target_language(&self) -> String {
        lock(&self.target_language).clone()
    }

    pub fn set_target_language(&self, code: &str) -> Result<()> {
        let code = code.trim().to_lowercase();
        if !self.pipeline.is_supported_language(&code) {
            return Err(Error::Validation(format!(
                "unsupported target language '{}'; choose one of: {}",
                code,
                self.pipeline.language_codes().join(", ")
            )));
        }
        *lock(&self.target_language) = code;
        Ok(())
    }

    fn begin_run(&self) -> Result<(RunGuard<'_>, CancellationToken)> {
        let mut active = lock(&self.cancel);
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Rejected action while a run is in progress");
            return Err(Error::Busy);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        drop(active);
        let guard = RunGuard {
            busy: &self.busy,
            active: &self.cancel,
        };
        Ok((guard, token))
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn stage_started(&self, stage: Stage, turn: Option<TurnId>) {
        info!(stage = %stage, turn = ?turn, "Stage started");
        self.emit(PipelineEvent::StageStarted { stage, turn });
    }

    fn describe(&self, outcome: &PipelineOutcome) -> (String, SystemTurnKind) {
        match outcome {
            PipelineOutcome::Detected { language } => {
                (format!("Detected language: {}", language), SystemTurnKind::Info)
            }
            PipelineOutcome::Translated { to, text, .. } => (
                format!("Translated to {}: {}", self.pipeline.language_name(to), text),
                SystemTurnKind::Info,
            ),
            PipelineOutcome::SummaryOffered { .. } => (
                "This message is long enough to summarize.".to_string(),
                SystemTurnKind::Info,
            ),
            PipelineOutcome::Summarized { text } => (format!("Summary: {}", text), SystemTurnKind::Info),
            PipelineOutcome::Skipped { stage, reason } => (
                format!("{} skipped: {}", stage_noun(*stage), reason),
                SystemTurnKind::Info,
            ),
            PipelineOutcome::Failed { stage, error } => {
                let text = match error {
                    FailureKind::EmptyInput => EMPTY_INPUT_MESSAGE.to_string(),
                    FailureKind::Cancelled => format!("{} cancelled", stage_noun(*stage)),
                    FailureKind::ProvisioningFailed { cause } => {
                        format!("{} could not be prepared: {}", stage_noun(*stage), cause)
                    }
                    FailureKind::DetectionFailed { cause }
                    | FailureKind::TranslationFailed { cause }
                    | FailureKind::SummarizationFailed { cause } => {
                        format!("{} failed: {}", stage_noun(*stage), cause)
                    }
                };
                (text, SystemTurnKind::Error)
            }
        }
    }

    /// Mirror `outcome` into the log as a system turn related to `turn`, then publish it.
    fn record(&self, turn: Option<TurnId>, outcome: PipelineOutcome, offers: bool) -> PipelineOutcome {
        {
            let mut log = lock(&self.log);
            let already_offered = matches!(outcome, PipelineOutcome::SummaryOffered { turn: t } if log.offers_summarization(t));
            if !already_offered {
                let (text, kind) = self.describe(&outcome);
                let offers = offers || matches!(outcome, PipelineOutcome::SummaryOffered { .. });
                if let Err(e) = log.append_system(&text, kind, turn, offers) {
                    warn!(error = %e, "Failed to append system turn");
                }
            }
        }

        if outcome.is_failure() {
            warn!(turn = ?turn, outcome = %outcome.classification(), "Stage failed");
        } else {
            info!(turn = ?turn, outcome = %outcome.classification(), "Stage outcome");
        }
        self.emit(PipelineEvent::Outcome {
            turn,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn failure(stage: Stage, err: &Error) -> PipelineOutcome {
        PipelineOutcome::failed(stage, FailureKind::from_error(stage, err))
    }

    /// Provision while forwarding progress into the event stream. Forwarding finishes
    /// before this returns, so progress never trails the stage outcome.
    async fn provision(
        &self,
        readiness: Readiness,
        request: &ProvisionRequest,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedHandle> {
        let Some(events) = self.events.clone() else {
            return self.provisioner.provision(readiness, request, None, cancel).await;
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let forward = async move {
            while let Some(progress) = rx.recv().await {
                let _ = events.send(PipelineEvent::Progress(progress));
            }
        };
        let (result, ()) = tokio::join!(
            self.provisioner.provision(readiness, request, Some(tx), cancel),
            forward
        );
        result
    }

    /// Run the pipeline for one user submission.
    ///
    /// Returns the ordered outcomes: detection first, then translation when it runs
    /// automatically, then the length branch.
    pub async fn process(&self, text: &str) -> Result<Vec<PipelineOutcome>> {
        let (_guard, cancel) = self.begin_run()?;

        self.stage_started(Stage::Validating, None);
        let text = text.trim();
        if text.is_empty() {
            let outcome = self.record(
                None,
                PipelineOutcome::failed(Stage::Validating, FailureKind::EmptyInput),
                false,
            );
            return Ok(vec![outcome]);
        }

        let turn = lock(&self.log).append_user(text);
        let mut long = self.pipeline.exceeds_threshold(text);
        let automatic = self.pipeline.translation_mode == TranslationMode::Automatic;
        debug!(turn = %turn, chars = text.len(), long, "User turn appended");

        let mut outcomes = Vec::new();

        // 自动翻译模式下，长度判断要等译文出来再做
        let detection = self.detect_stage(turn, text, long && !automatic, &cancel).await;
        let cancelled = matches!(
            detection,
            PipelineOutcome::Failed { error: FailureKind::Cancelled, .. }
        );
        outcomes.push(detection);
        if cancelled {
            return Ok(outcomes);
        }

        if automatic {
            let target = self.target_language();
            let translation = self.translate_stage(turn, &target, &cancel).await;
            let cancelled = matches!(
                translation,
                PipelineOutcome::Failed { error: FailureKind::Cancelled, .. }
            );
            if let PipelineOutcome::Translated { to, .. } = &translation {
                if *to == self.pipeline.default_target_language {
                    let log = lock(&self.log);
                    long = self.pipeline.exceeds_threshold(log.working_text(turn).unwrap_or(text));
                }
            }
            outcomes.push(translation);
            if cancelled {
                return Ok(outcomes);
            }
        }

        // Decided on length alone; the summarizer is probed when the user asks for it.
        let offer = if long {
            PipelineOutcome::SummaryOffered { turn }
        } else {
            PipelineOutcome::skipped(Stage::Summarizing, SkipReason::TooShort)
        };
        outcomes.push(self.record(Some(turn), offer, false));

        Ok(outcomes)
    }

    async fn detect_stage(
        &self,
        turn: TurnId,
        text: &str,
        long: bool,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let stage = Stage::Detecting;
        self.stage_started(stage, Some(turn));

        let readiness = self.probe.check_readiness(Capability::Detection).await;
        if readiness == Readiness::Unavailable {
            return self.record(
                Some(turn),
                PipelineOutcome::skipped(stage, SkipReason::CapabilityUnavailable),
                false,
            );
        }

        let detected = async {
            let detector = self
                .provision(readiness, &ProvisionRequest::Detection, cancel)
                .await?
                .into_detector()?;
            detector.detect(text, cancel).await
        }
        .await;

        match detected {
            Ok(language) => {
                lock(&self.log).record_language(turn, &language);
                self.record(Some(turn), PipelineOutcome::Detected { language }, long)
            }
            Err(e) => self.record(Some(turn), Self::failure(stage, &e), false),
        }
    }

    /// Translate the most recent user turn into `target`.
    pub async fn translate(&self, target: &str) -> Result<PipelineOutcome> {
        let target = target.trim().to_lowercase();
        if !self.pipeline.is_supported_language(&target) {
            return Err(Error::Validation(format!(
                "unsupported target language '{}'",
                target
            )));
        }
        let (_guard, cancel) = self.begin_run()?;
        let turn = lock(&self.log)
            .last_user_turn()
            .ok_or_else(|| Error::Validation("there is no message to translate yet".to_string()))?;
        Ok(self.translate_stage(turn, &target, &cancel).await)
    }

    async fn translate_stage(&self, turn: TurnId, target: &str, cancel: &CancellationToken) -> PipelineOutcome {
        let stage = Stage::Translating;
        self.stage_started(stage, Some(turn));

        let (text, source) = {
            let log = lock(&self.log);
            let text = log.user_text(turn).unwrap_or_default().to_string();
            let source = log
                .detected_language(turn)
                .unwrap_or(AUTO_LANGUAGE)
                .to_string();
            (text, source)
        };

        if source == target {
            return self.record(
                Some(turn),
                PipelineOutcome::skipped(stage, SkipReason::SameLanguage),
                false,
            );
        }

        let readiness = self.probe.check_readiness(Capability::Translation).await;
        if readiness == Readiness::Unavailable {
            return self.record(
                Some(turn),
                PipelineOutcome::skipped(stage, SkipReason::CapabilityUnavailable),
                false,
            );
        }

        let support = self.probe.check_pair_support(&source, target).await;
        if !support.is_supported() {
            debug!(source = %source, target = %target, support = ?support, "Pair not supported");
            return self.record(
                Some(turn),
                PipelineOutcome::skipped(stage, SkipReason::UnsupportedPair),
                false,
            );
        }

        let request = ProvisionRequest::Translation {
            source: source.clone(),
            target: target.to_string(),
        };
        let translated = async {
            let translator = self
                .provision(readiness, &request, cancel)
                .await?
                .into_translator()?;
            if !translator.serves(&source, target) {
                return Err(Error::provisioning(
                    Capability::Translation,
                    format!(
                        "handle bound to {} -> {}, wanted {} -> {}",
                        translator.source_language(),
                        translator.target_language(),
                        source,
                        target
                    ),
                ));
            }
            translator.translate(&text, cancel).await
        }
        .await;

        let outcome = match translated {
            Ok(text) => {
                if target == self.pipeline.default_target_language {
                    lock(&self.log).record_working_text(turn, &text);
                }
                PipelineOutcome::Translated {
                    from: source,
                    to: target.to_string(),
                    text,
                }
            }
            Err(e) => Self::failure(stage, &e),
        };
        self.record(Some(turn), outcome, false)
    }

    /// Summarize a user turn, typically one that received an offer.
    pub async fn summarize(&self, turn: TurnId) -> Result<PipelineOutcome> {
        let (_guard, cancel) = self.begin_run()?;
        let text = {
            let log = lock(&self.log);
            match log.get(turn) {
                None => return Err(Error::NotFound(format!("turn {}", turn))),
                Some(t) if !t.is_user() => {
                    return Err(Error::Validation(format!("turn {} is not a user turn", turn)))
                }
                Some(_) => log.working_text(turn).unwrap_or_default().to_string(),
            }
        };

        let stage = Stage::Summarizing;
        self.stage_started(stage, Some(turn));

        if !self.pipeline.exceeds_threshold(&text) {
            return Ok(self.record(
                Some(turn),
                PipelineOutcome::skipped(stage, SkipReason::TooShort),
                false,
            ));
        }

        let readiness = self.probe.check_readiness(Capability::Summarization).await;
        if readiness == Readiness::Unavailable {
            return Ok(self.record(
                Some(turn),
                PipelineOutcome::skipped(stage, SkipReason::CapabilityUnavailable),
                false,
            ));
        }

        let request = ProvisionRequest::Summarization(self.pipeline.summarizer.clone());
        let summarized = async {
            let summarizer = self
                .provision(readiness, &request, &cancel)
                .await?
                .into_summarizer()?;
            summarizer.summarize(&text, None, &cancel).await
        }
        .await;

        let outcome = match summarized {
            Ok(text) => PipelineOutcome::Summarized { text },
            Err(e) => Self::failure(stage, &e),
        };
        Ok(self.record(Some(turn), outcome, false))
    }

    /// The user turn `/summarize` acts on when none is named.
    pub fn latest_offered_turn(&self) -> Option<TurnId> {
        lock(&self.log).latest_offered_turn()
    }
}
