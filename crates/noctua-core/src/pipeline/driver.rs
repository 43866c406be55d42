//! Pipeline driver: the staged state machine.
//!
//! `run_pipeline` sequences RECON → SCHEMA → CODEGEN → TEST ⇄ REPAIR →
//! HARDEN, wrapping every stage with retry, budget enforcement, artifact
//! verification and event emission. The function never returns an error
//! across its public boundary: every internal failure is converted into a
//! FAILED state with `state.error` set and a `pipeline_failed` event.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::guardrail::BashGuardrail;
use crate::llm::retry::{self, IsRetryable, RetryConfig};
use crate::llm::{
    artifacts, CostEstimator, InvokeConfig, InvokeResult, LlmRuntime, ReasoningEffort,
    ToolActivity, ToolSet,
};
use crate::paths;
use crate::report::adapters;
use crate::report::{
    recon_report_schema, test_report_schema, ReconReport, ReconReportWire, TestReport,
    TestReportWire,
};

use super::budget::StageBudgets;
use super::diagnosis;
use super::events::{EventEmitter, PipelineEvent};
use super::prompts;
use super::state::{self, PipelineState, Stage, DEFAULT_MAX_REPAIR_ATTEMPTS};

/// Safety-net turn cap for the Explore phase; the budget is the bound
/// that fires in practice.
const EXPLORE_MAX_TURNS: usize = 1000;
/// Turn cap for the tool-using code stages.
const CODE_MAX_TURNS: usize = 100;

const EXPLORE_RETRIES: u32 = 3;
const EXPLORE_BACKOFF_BASE: Duration = Duration::from_secs(30);
const SYNTH_RETRIES: u32 = 3;
const SYNTH_BACKOFF_BASE: Duration = Duration::from_secs(15);

/// Pause between the Explore and Synthesize phases to avoid rate-limit
/// bursts right after a long tool-using call.
const RECON_COOLDOWN: Duration = Duration::from_secs(15);

const FINDINGS_MAX_CHARS: usize = 15_000;
const FINDINGS_MIN_CHARS: usize = 50;
/// Cap on captured stdout/stderr stored per test report.
const CAPTURE_MAX_CHARS: usize = 4_000;

const SCHEMA_RETRY_HINT: &str =
    "Re-read the recon report and write the schema file directly with write_file.";
const CODEGEN_RETRY_HINT: &str =
    "Write both files directly with write_file; do not stop after describing them.";

/// Options for one pipeline run.
#[derive(Clone)]
pub struct PipelineOptions {
    pub base_dir: PathBuf,
    pub model: String,
    pub max_repair_attempts: u32,
    pub budgets: StageBudgets,
    pub cancel: CancellationToken,
    pub observer: Option<mpsc::UnboundedSender<PipelineEvent>>,
    pub cost_estimator: Option<Arc<dyn CostEstimator>>,
}

impl PipelineOptions {
    pub fn new(base_dir: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            model: model.into(),
            max_repair_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
            budgets: StageBudgets::default(),
            cancel: CancellationToken::new(),
            observer: None,
            cost_estimator: None,
        }
    }

    pub fn with_max_repair_attempts(mut self, max: u32) -> Self {
        self.max_repair_attempts = max;
        self
    }

    pub fn with_budgets(mut self, budgets: StageBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cost_estimator(mut self, estimator: Arc<dyn CostEstimator>) -> Self {
        self.cost_estimator = Some(estimator);
        self
    }
}

/// Final state plus the ordered trace of every event the run emitted.
#[derive(Debug)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub events: Vec<PipelineEvent>,
}

/// Drive a full pipeline run. Cancellable at every stage boundary; on
/// cancellation the current state is persisted and returned as-is.
pub async fn run_pipeline(
    runtime: Arc<dyn LlmRuntime>,
    target_url: &str,
    user_intent: &str,
    options: PipelineOptions,
) -> PipelineRun {
    let state = PipelineState::new(
        &options.base_dir,
        target_url,
        user_intent,
        options.max_repair_attempts,
    );
    let events = EventEmitter::new(options.observer.clone());
    let guardrail = Arc::new(BashGuardrail::new(&state.work_dir));

    let mut driver = PipelineDriver {
        runtime,
        state,
        options,
        events: events.clone(),
        guardrail,
    };
    driver.run().await;

    PipelineRun {
        state: driver.state,
        events: events.trace(),
    }
}

struct PipelineDriver {
    runtime: Arc<dyn LlmRuntime>,
    state: PipelineState,
    options: PipelineOptions,
    events: EventEmitter,
    guardrail: Arc<BashGuardrail>,
}

impl PipelineDriver {
    async fn run(&mut self) {
        if let Err(err) = tokio::fs::create_dir_all(&self.state.scraper_dir).await {
            self.fail_pipeline(
                Stage::Recon,
                format!(
                    "workspace setup failed at {}: {err}",
                    self.state.work_dir.display()
                ),
            )
            .await;
            return;
        }

        self.persist().await;
        tracing::info!(
            project = %self.state.project_name,
            url = %self.state.target_url,
            "pipeline started"
        );
        self.log(format!(
            "pipeline started: {} ({})",
            self.state.target_url, self.state.user_intent
        ))
        .await;

        if self.cancelled().await {
            return;
        }
        if let Err(reason) = self.stage_recon().await {
            self.fail_stage(Stage::Recon, reason).await;
            return;
        }

        if self.cancelled().await {
            return;
        }
        if let Err(reason) = self.stage_schema().await {
            self.fail_stage(Stage::Schema, reason).await;
            return;
        }

        if self.cancelled().await {
            return;
        }
        if let Err(reason) = self.stage_codegen().await {
            self.fail_stage(Stage::Codegen, reason).await;
            return;
        }

        // ── Test ⇄ repair loop ─────────────────────────────────────────
        loop {
            if self.cancelled().await {
                return;
            }
            let report = match self.stage_test().await {
                Ok(report) => report,
                Err(reason) => {
                    self.fail_stage(Stage::Test, reason).await;
                    return;
                }
            };

            if report.success {
                break;
            }

            if self.state.repair_attempts >= self.state.max_repair_attempts {
                self.fail_pipeline(
                    Stage::Repair,
                    format!(
                        "max repair attempts ({}) exhausted after {} failed test runs",
                        self.state.max_repair_attempts,
                        self.state.test_results.len()
                    ),
                )
                .await;
                return;
            }

            if self.cancelled().await {
                return;
            }
            if let Err(reason) = self.stage_repair().await {
                self.fail_stage(Stage::Repair, reason).await;
                return;
            }
        }

        if self.cancelled().await {
            return;
        }
        if let Err(reason) = self.stage_harden().await {
            self.fail_stage(Stage::Harden, reason).await;
            return;
        }

        self.finish().await;
    }

    // ── Stage 1: RECON (explore, cool-down, synthesize) ────────────────

    async fn stage_recon(&mut self) -> Result<(), String> {
        let started = Instant::now();
        self.begin_stage(Stage::Recon).await;

        let findings = self.explore().await?;

        // Cool-down between phases.
        tokio::time::sleep(RECON_COOLDOWN).await;

        self.synthesize(&findings).await?;

        let summary = self
            .state
            .recon_report
            .as_ref()
            .map(|report| format!("analyzed {} ({} pages)", report.site_name, report.pages.len()));
        self.complete_stage(Stage::Recon, started, summary).await;
        Ok(())
    }

    async fn explore(&mut self) -> Result<String, String> {
        let prompt = prompts::explore_prompt(&self.state);
        let (activity_tx, forwarder) = self.tool_forwarder(Stage::Recon);
        let config = self
            .base_config(ToolSet::recon())
            .with_max_turns(EXPLORE_MAX_TURNS)
            .with_budget(self.options.budgets.explore())
            .with_effort(ReasoningEffort::Medium)
            .with_tool_activity(activity_tx);

        let runtime = Arc::clone(&self.runtime);
        let invoked = retry::with_backoff(
            "recon.explore",
            RetryConfig::new(EXPLORE_RETRIES, EXPLORE_BACKOFF_BASE),
            |_| runtime.invoke(&prompt, &config),
        )
        .await;
        drop(config);
        let _ = forwarder.await;

        let result = invoked.map_err(|err| format!("explore failed: {err}"))?;

        let findings = crate::text::truncate_chars(&result.collected_text(), FINDINGS_MAX_CHARS);
        let findings_chars = findings.chars().count();
        if let Err(err) =
            tokio::fs::write(paths::findings_file(&self.state.work_dir), &findings).await
        {
            tracing::warn!(error = %err, "failed to persist findings.txt");
        }
        if findings_chars < FINDINGS_MIN_CHARS {
            return Err(format!(
                "explore produced only {findings_chars} chars of findings; nothing to synthesize"
            ));
        }

        self.log(format!(
            "explore finished: {findings_chars} chars of findings in {} turns",
            result.num_turns
        ))
        .await;
        Ok(findings)
    }

    async fn synthesize(&mut self, findings: &str) -> Result<(), String> {
        let prompt = prompts::synthesize_prompt(&self.state, findings);
        let config = self
            .base_config(ToolSet::none())
            .with_max_turns(1)
            .with_budget(self.options.budgets.synthesize())
            .with_effort(ReasoningEffort::Medium)
            .with_output_schema(recon_report_schema());

        let schedule = RetryConfig::new(SYNTH_RETRIES, SYNTH_BACKOFF_BASE);
        let mut last = SynthFailure {
            message: "not attempted".into(),
            retryable: false,
            num_turns: 0,
            finish_reason: "none".into(),
        };

        for attempt in 1..=SYNTH_RETRIES {
            match self.synthesize_once(&prompt, &config, attempt).await {
                Ok(wire) => {
                    self.store_recon_report(wire).await;
                    return Ok(());
                }
                Err(failure) => {
                    self.log(format!(
                        "synthesize attempt {attempt} failed: {}",
                        failure.message
                    ))
                    .await;
                    let retryable = failure.retryable;
                    last = failure;
                    if !retryable || attempt == SYNTH_RETRIES {
                        break;
                    }
                    tokio::time::sleep(schedule.delay_after(attempt)).await;
                }
            }
        }

        Err(format!(
            "recon synthesis failed: {} (findings {} chars, {} turns, finish reason {})",
            last.message,
            findings.chars().count(),
            last.num_turns,
            last.finish_reason
        ))
    }

    async fn synthesize_once(
        &self,
        prompt: &str,
        config: &InvokeConfig,
        attempt: u32,
    ) -> Result<ReconReportWire, SynthFailure> {
        let result = match self.runtime.invoke(prompt, config).await {
            Ok(result) => result,
            Err(err) => {
                return Err(SynthFailure {
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                    num_turns: 0,
                    finish_reason: "error".into(),
                })
            }
        };

        self.capture_synth_attempt(&result, attempt).await;

        let parsed: Result<ReconReportWire, String> = match (&result.final_output, &result.output) {
            (Some(value), _) => serde_json::from_value(value.clone())
                .map_err(|err| format!("validated output did not match wire form: {err}")),
            (None, Some(output)) => adapters::recover_recon_report(output),
            (None, None) => Err("synthesize produced no output".into()),
        };

        parsed.map_err(|message| SynthFailure {
            message,
            retryable: true,
            num_turns: result.num_turns,
            finish_reason: result.finish_reason.clone(),
        })
    }

    /// Keep the raw synthesize output on disk for post-mortems.
    async fn capture_synth_attempt(&self, result: &InvokeResult, attempt: u32) {
        let raw = result
            .final_output
            .as_ref()
            .map(|value| value.to_string())
            .or_else(|| result.output.clone())
            .unwrap_or_default();
        let path = paths::synth_attempt_file(&self.state.work_dir, attempt);
        if let Err(err) = tokio::fs::write(&path, raw).await {
            tracing::debug!(error = %err, path = %path.display(), "failed to capture synth attempt");
        }
    }

    async fn store_recon_report(&mut self, wire: ReconReportWire) {
        let wire_json = serde_json::to_string_pretty(&wire).unwrap_or_default();
        if let Err(err) = tokio::fs::write(
            paths::recon_report_file(&self.state.work_dir),
            wire_json,
        )
        .await
        {
            tracing::warn!(error = %err, "failed to persist recon-report.json");
        }
        self.state.recon_report = Some(ReconReport::from_wire(wire));
        self.persist().await;
    }

    // ── Stage 2: SCHEMA ────────────────────────────────────────────────

    async fn stage_schema(&mut self) -> Result<(), String> {
        let started = Instant::now();
        self.begin_stage(Stage::Schema).await;

        let schema_path = paths::schema_file(&self.state.scraper_dir);
        let expected = vec![schema_path.clone()];
        let prompt = prompts::schema_prompt(&self.state);

        self.invoke_code_stage(
            Stage::Schema,
            &prompt,
            ToolSet::code(),
            ReasoningEffort::Low,
            self.options.budgets.schema,
            Some((&expected, SCHEMA_RETRY_HINT)),
        )
        .await
        .map_err(|err| format!("schema generation failed: {err}"))?;

        if !artifacts::all_present(&expected).await {
            return Err(format!(
                "schema stage did not produce {}",
                schema_path.display()
            ));
        }

        self.state.schema_path = Some(schema_path);
        self.complete_stage(Stage::Schema, started, Some("schema.ts written".into()))
            .await;
        Ok(())
    }

    // ── Stage 3: CODEGEN ───────────────────────────────────────────────

    async fn stage_codegen(&mut self) -> Result<(), String> {
        let started = Instant::now();
        self.begin_stage(Stage::Codegen).await;

        let expected = vec![
            paths::scraper_file(&self.state.scraper_dir),
            paths::entry_file(&self.state.scraper_dir),
        ];
        let prompt = prompts::codegen_prompt(&self.state);

        self.invoke_code_stage(
            Stage::Codegen,
            &prompt,
            ToolSet::code(),
            ReasoningEffort::High,
            self.options.budgets.codegen,
            Some((&expected, CODEGEN_RETRY_HINT)),
        )
        .await
        .map_err(|err| format!("code generation failed: {err}"))?;

        let missing = artifacts::missing_files(&expected).await;
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
            return Err(format!(
                "codegen stage did not produce: {}",
                names.join(", ")
            ));
        }

        self.complete_stage(
            Stage::Codegen,
            started,
            Some("scraper.ts and index.ts written".into()),
        )
        .await;
        Ok(())
    }

    // ── Stage 4: TEST ──────────────────────────────────────────────────

    async fn stage_test(&mut self) -> Result<TestReport, String> {
        let started = Instant::now();
        self.begin_stage(Stage::Test).await;

        let prompt = prompts::test_prompt(&self.state);
        let (activity_tx, forwarder) = self.tool_forwarder(Stage::Test);
        let config = self
            .base_config(ToolSet::test())
            .with_max_turns(CODE_MAX_TURNS)
            .with_budget(self.options.budgets.test)
            .with_effort(ReasoningEffort::Low)
            .with_output_schema(test_report_schema())
            .with_guardrail(self.guardrail.clone())
            .with_tool_activity(activity_tx);

        let invoked = self.runtime.invoke(&prompt, &config).await;
        drop(config);
        let _ = forwarder.await;

        let result = invoked.map_err(|err| format!("test run failed: {err}"))?;

        let wire: TestReportWire = match (result.final_output, result.output.as_deref()) {
            (Some(value), _) => serde_json::from_value(value)
                .map_err(|err| format!("test report did not match wire form: {err}"))?,
            (None, Some(output)) => adapters::recover_test_report(output)?,
            (None, None) => return Err("test stage produced no report".into()),
        };

        let wire_json = serde_json::to_string_pretty(&wire).unwrap_or_default();
        if let Err(err) =
            tokio::fs::write(paths::test_report_file(&self.state.work_dir), wire_json).await
        {
            tracing::warn!(error = %err, "failed to persist test-report.json");
        }

        let mut report = TestReport::from_wire(wire);
        report.stdout = crate::text::truncate_with_marker(&report.stdout, CAPTURE_MAX_CHARS);
        report.stderr = crate::text::truncate_with_marker(&report.stderr, CAPTURE_MAX_CHARS);

        self.state.test_results.push(report.clone());
        self.persist().await;

        let attempt = self.state.test_results.len() as u32;
        self.events.emit(PipelineEvent::TestResult {
            report: report.clone(),
            attempt,
        });
        self.log(format!("test attempt {attempt}: {}", report.summary()))
            .await;

        self.complete_stage(Stage::Test, started, Some(report.summary()))
            .await;
        Ok(report)
    }

    // ── Stage 5: REPAIR ────────────────────────────────────────────────

    async fn stage_repair(&mut self) -> Result<(), String> {
        self.state.repair_attempts += 1;
        self.persist().await;
        self.events.emit(PipelineEvent::RepairAttempt {
            attempt: self.state.repair_attempts,
            max_attempts: self.state.max_repair_attempts,
        });

        let started = Instant::now();
        self.begin_stage(Stage::Repair).await;

        let kind = self.state.last_test_report().map(diagnosis::classify_failure);
        let prompt = prompts::repair_prompt(&self.state);

        self.invoke_code_stage(
            Stage::Repair,
            &prompt,
            ToolSet::repair(),
            ReasoningEffort::High,
            self.options.budgets.repair,
            None,
        )
        .await
        .map_err(|err| {
            format!(
                "repair attempt {} failed: {err}",
                self.state.repair_attempts
            )
        })?;

        self.complete_stage(
            Stage::Repair,
            started,
            kind.map(|kind| format!("addressed {}", kind.label())),
        )
        .await;
        Ok(())
    }

    // ── Stage 6: HARDEN ────────────────────────────────────────────────

    async fn stage_harden(&mut self) -> Result<(), String> {
        let started = Instant::now();
        self.begin_stage(Stage::Harden).await;

        let prompt = prompts::harden_prompt(&self.state);
        self.invoke_code_stage(
            Stage::Harden,
            &prompt,
            ToolSet::code(),
            ReasoningEffort::Medium,
            self.options.budgets.harden,
            None,
        )
        .await
        .map_err(|err| format!("hardening failed: {err}"))?;

        self.complete_stage(
            Stage::Harden,
            started,
            Some("production hardening applied".into()),
        )
        .await;
        Ok(())
    }

    // ── Shared invocation plumbing ─────────────────────────────────────

    /// Invoke a tool-using code stage: guardrailed, with tool-activity
    /// forwarding and optional file-presence retry.
    async fn invoke_code_stage(
        &self,
        stage: Stage,
        prompt: &str,
        tools: ToolSet,
        effort: ReasoningEffort,
        budget_usd: f64,
        expected: Option<(&[PathBuf], &str)>,
    ) -> Result<InvokeResult, crate::llm::InvokeError> {
        let (activity_tx, forwarder) = self.tool_forwarder(stage);
        let config = self
            .base_config(tools)
            .with_max_turns(CODE_MAX_TURNS)
            .with_budget(budget_usd)
            .with_effort(effort)
            .with_guardrail(self.guardrail.clone())
            .with_tool_activity(activity_tx);

        let invoked = match expected {
            Some((files, hint)) => {
                artifacts::invoke_expecting_files(
                    self.runtime.as_ref(),
                    prompt,
                    &config,
                    files,
                    hint,
                )
                .await
            }
            None => self.runtime.invoke(prompt, &config).await,
        };
        drop(config);
        let _ = forwarder.await;
        invoked
    }

    /// Shared config base: model handle, cancellation token and the
    /// pass-through cost estimator.
    fn base_config(&self, tools: ToolSet) -> InvokeConfig {
        let mut config = InvokeConfig::new(&self.options.model, tools)
            .with_cancel(self.options.cancel.clone());
        if let Some(estimator) = &self.options.cost_estimator {
            config = config.with_cost_estimator(estimator.clone());
        }
        config
    }

    /// Forward tool activity reported by the runtime into stage tool
    /// events, concurrently with the in-flight invocation.
    fn tool_forwarder(
        &self,
        stage: Stage,
    ) -> (mpsc::UnboundedSender<ToolActivity>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = self.events.clone();
        let handle = tokio::spawn(async move {
            while let Some(activity) = rx.recv().await {
                match activity {
                    ToolActivity::Started { tool } => {
                        emitter.emit(PipelineEvent::StageToolStart { stage, tool });
                    }
                    ToolActivity::Finished { tool, duration_ms } => {
                        emitter.emit(PipelineEvent::StageToolEnd {
                            stage,
                            tool,
                            duration_ms,
                        });
                    }
                }
            }
        });
        (tx, handle)
    }

    // ── Lifecycle helpers ──────────────────────────────────────────────

    async fn begin_stage(&mut self, stage: Stage) {
        self.state.current_stage = stage;
        self.persist().await;
        tracing::info!(stage = %stage, "stage started");
        self.log(format!("stage {stage} started")).await;
        self.events.emit(PipelineEvent::StageStart { stage });
    }

    async fn complete_stage(&mut self, stage: Stage, started: Instant, summary: Option<String>) {
        self.persist().await;
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(stage = %stage, duration_ms, "stage complete");
        self.log(format!("stage {stage} complete in {duration_ms}ms"))
            .await;
        self.events.emit(PipelineEvent::StageComplete {
            stage,
            duration_ms,
            summary,
        });
    }

    /// A stage failed while it was open: balance its `stage_start` with a
    /// `stage_error`, then mark the whole pipeline failed.
    async fn fail_stage(&mut self, stage: Stage, reason: String) {
        self.mark_failed(&reason).await;
        self.events.emit(PipelineEvent::StageError {
            stage,
            error: reason.clone(),
        });
        self.events.emit(PipelineEvent::PipelineFailed { reason, stage });
    }

    /// The pipeline failed outside an open stage (workspace setup, repair
    /// exhaustion): no `stage_error` is owed.
    async fn fail_pipeline(&mut self, stage: Stage, reason: String) {
        self.mark_failed(&reason).await;
        self.events.emit(PipelineEvent::PipelineFailed { reason, stage });
    }

    async fn mark_failed(&mut self, reason: &str) {
        tracing::error!(stage = %self.state.current_stage, error = %reason, "pipeline failed");
        self.log(format!("pipeline failed: {reason}")).await;
        self.state.current_stage = Stage::Failed;
        self.state.error = Some(reason.to_string());
        self.state.completed_at = Some(Utc::now());
        self.persist().await;
    }

    async fn finish(&mut self) {
        self.state.current_stage = Stage::Done;
        self.state.completed_at = Some(Utc::now());
        self.persist().await;

        let record_count = self
            .state
            .last_test_report()
            .map(|report| report.record_count)
            .unwrap_or(0);
        tracing::info!(
            project = %self.state.project_name,
            record_count,
            "pipeline complete"
        );
        self.log(format!("pipeline complete: {record_count} records"))
            .await;
        self.events.emit(PipelineEvent::PipelineComplete {
            scraper_dir: self.state.scraper_dir.clone(),
            record_count,
        });
    }

    /// Stage-boundary cancellation check. A cancelled run persists its
    /// current state and returns it unchanged; cancellation is not a
    /// failure.
    async fn cancelled(&mut self) -> bool {
        if !self.options.cancel.is_cancelled() {
            return false;
        }
        tracing::warn!(stage = %self.state.current_stage, "pipeline cancelled at stage boundary");
        self.log("cancelled at stage boundary").await;
        self.persist().await;
        true
    }

    async fn persist(&self) {
        if let Err(err) = state::save_state(&self.state).await {
            tracing::error!(error = %err, "failed to persist state.json");
        }
    }

    /// Append a timestamped line to `debug.log`. Diagnostics only; never
    /// fatal.
    async fn log(&self, message: impl AsRef<str>) {
        let line = format!(
            "{} [{}] {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            self.state.current_stage,
            message.as_ref()
        );
        let path = paths::debug_log_file(&self.state.work_dir);
        match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                let _ = file.write_all(line.as_bytes()).await;
            }
            Err(err) => {
                tracing::debug!(error = %err, "debug log unavailable");
            }
        }
    }
}

struct SynthFailure {
    message: String,
    retryable: bool,
    num_turns: usize,
    finish_reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::InvokeError;

    /// Runtime that must never be reached.
    struct PanicRuntime;

    #[async_trait::async_trait]
    impl LlmRuntime for PanicRuntime {
        async fn invoke(
            &self,
            _prompt: &str,
            _config: &InvokeConfig,
        ) -> Result<InvokeResult, InvokeError> {
            panic!("runtime must not be invoked");
        }
    }

    #[tokio::test]
    async fn pre_cancelled_run_returns_without_invoking() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let options = PipelineOptions::new(dir.path(), "test-model").with_cancel(cancel);
        let run = run_pipeline(Arc::new(PanicRuntime), "https://x.test", "X", options).await;

        assert_eq!(run.state.current_stage, Stage::Recon);
        assert!(run.state.error.is_none());
        assert!(run.events.is_empty());
        // State was persisted at the boundary.
        let saved = state::load_state(&run.state.work_dir).await.unwrap();
        assert!(saved.is_some());
    }

    #[tokio::test]
    async fn workspace_setup_failure_fails_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        // Occupy the .noctua path with a file so create_dir_all fails.
        let blocker = dir.path().join(".noctua");
        tokio::fs::write(&blocker, "not a directory").await.unwrap();

        let options = PipelineOptions::new(dir.path(), "test-model");
        let run = run_pipeline(Arc::new(PanicRuntime), "https://x.test", "X", options).await;

        assert_eq!(run.state.current_stage, Stage::Failed);
        assert!(run.state.error.as_deref().unwrap().contains("workspace setup failed"));
        assert!(matches!(
            run.events.last(),
            Some(PipelineEvent::PipelineFailed { .. })
        ));
    }
}
