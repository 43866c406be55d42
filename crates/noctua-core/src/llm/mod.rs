//! LLM invocation contract.
//!
//! The pipeline never talks to a provider directly. It depends on a single
//! primitive, [`LlmRuntime::invoke`], whose configuration enumerates the
//! model handle, tool set, turn cap, budget ceiling, reasoning effort,
//! optional structured-output schema and optional input guardrails. The
//! transport-level client, token accounting and the tool implementations
//! live outside this crate.

pub mod artifacts;
pub mod retry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::guardrail::InputGuardrail;
use retry::{is_retryable_status, message_is_transient, IsRetryable};

/// Named set of tools mounted for one invocation. The pipeline composes
/// these per stage; the runtime resolves names to implementations.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    names: Vec<&'static str>,
}

impl ToolSet {
    /// Reconnaissance: browse and intercept, read-only on disk.
    pub fn recon() -> Self {
        Self {
            names: vec!["web_probe", "web_intercept_api", "read_file"],
        }
    }

    /// Code-writing stages (schema, codegen, harden).
    pub fn code() -> Self {
        Self {
            names: vec!["bash", "read_file", "write_file", "edit_file", "glob", "grep"],
        }
    }

    /// Test stage: run the scraper and validate its output.
    pub fn test() -> Self {
        Self {
            names: vec!["bash", "read_file", "scraper_test", "scraper_lint", "glob"],
        }
    }

    /// Repair stage: edit code and re-probe the site.
    pub fn repair() -> Self {
        Self {
            names: vec!["bash", "read_file", "write_file", "edit_file", "web_probe", "glob"],
        }
    }

    /// No tools (pure text/structured-output turns).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Reasoning effort requested for an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Maps token usage to dollars for budget enforcement. Owned by the
/// outer system; the pipeline passes it through without interpreting it.
pub trait CostEstimator: Send + Sync {
    fn estimate_usd(&self, usage: &Usage, model: &str) -> f64;
}

/// Structured-output schema attached to an invocation. When present, the
/// runtime validates the model's final message against `schema` and
/// surfaces the validated value as [`InvokeResult::final_output`].
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// Tool lifecycle notifications the runtime reports while an invocation
/// is in flight. The driver forwards these to its observer as
/// `stage_tool_start` / `stage_tool_end` events.
#[derive(Debug, Clone)]
pub enum ToolActivity {
    Started { tool: String },
    Finished { tool: String, duration_ms: u64 },
}

/// Configuration for one [`LlmRuntime::invoke`] call.
#[derive(Clone)]
pub struct InvokeConfig {
    pub model: String,
    pub tools: ToolSet,
    pub max_turns: usize,
    /// Ceiling in USD; the runtime raises [`InvokeError::BudgetExceeded`]
    /// when the call would pass it.
    pub budget_usd: f64,
    pub effort: ReasoningEffort,
    pub output_schema: Option<OutputSchema>,
    pub guardrails: Vec<Arc<dyn InputGuardrail>>,
    /// Instruction prefix prepended to the prompt by the runtime.
    pub instructions: Option<String>,
    pub cost_estimator: Option<Arc<dyn CostEstimator>>,
    pub tool_activity: Option<mpsc::UnboundedSender<ToolActivity>>,
    pub cancel: CancellationToken,
}

impl InvokeConfig {
    pub fn new(model: impl Into<String>, tools: ToolSet) -> Self {
        Self {
            model: model.into(),
            tools,
            max_turns: 1,
            budget_usd: f64::INFINITY,
            effort: ReasoningEffort::Medium,
            output_schema: None,
            guardrails: Vec::new(),
            instructions: None,
            cost_estimator: None,
            tool_activity: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_budget(mut self, budget_usd: f64) -> Self {
        self.budget_usd = budget_usd;
        self
    }

    pub fn with_effort(mut self, effort: ReasoningEffort) -> Self {
        self.effort = effort;
        self
    }

    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_guardrail(mut self, guardrail: Arc<dyn InputGuardrail>) -> Self {
        self.guardrails.push(guardrail);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_cost_estimator(mut self, estimator: Arc<dyn CostEstimator>) -> Self {
        self.cost_estimator = Some(estimator);
        self
    }

    pub fn with_tool_activity(mut self, tx: mpsc::UnboundedSender<ToolActivity>) -> Self {
        self.tool_activity = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for InvokeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokeConfig")
            .field("model", &self.model)
            .field("tools", &self.tools)
            .field("max_turns", &self.max_turns)
            .field("budget_usd", &self.budget_usd)
            .field("effort", &self.effort)
            .field("output_schema", &self.output_schema.as_ref().map(|s| s.name))
            .field("guardrails", &self.guardrails.len())
            .finish_non_exhaustive()
    }
}

/// Role of a message in the invocation transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One message of the transcript, reduced to what the pipeline needs
/// (role plus flattened text content).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: Option<String>,
}

/// Token usage reported by the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Result of one invocation.
#[derive(Debug, Clone, Default)]
pub struct InvokeResult {
    /// Final free text, when the model produced one.
    pub output: Option<String>,
    /// Validated structured output, when an [`OutputSchema`] was supplied
    /// and the model's final message passed validation. Absent with a raw
    /// `output` means the caller may attempt its own parse as fallback.
    pub final_output: Option<Value>,
    pub messages: Vec<TranscriptMessage>,
    pub num_turns: usize,
    pub finish_reason: String,
    pub total_cost_usd: f64,
    pub usage: Usage,
}

impl InvokeResult {
    /// Flatten the result into free text: prefer `output`, otherwise
    /// concatenate assistant and tool text from the transcript.
    pub fn collected_text(&self) -> String {
        if let Some(output) = &self.output {
            if !output.trim().is_empty() {
                return output.clone();
            }
        }
        let mut parts = Vec::new();
        for message in &self.messages {
            if message.role == Role::User {
                continue;
            }
            if let Some(content) = &message.content {
                if !content.trim().is_empty() {
                    parts.push(content.as_str());
                }
            }
        }
        parts.join("\n\n")
    }
}

/// Distinguished error kinds surfaced by the runtime.
#[derive(Debug)]
pub enum InvokeError {
    /// The per-call budget ceiling was reached.
    BudgetExceeded { spent_usd: f64, budget_usd: f64 },
    /// Structured-output validation failed and the runtime could not
    /// recover a raw text either.
    OutputParse { message: String },
    /// Model-layer failure (HTTP error, broken stream).
    Model { status: Option<u16>, message: String },
    /// Anything else.
    Other(anyhow::Error),
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExceeded {
                spent_usd,
                budget_usd,
            } => write!(
                f,
                "budget exceeded: spent ${spent_usd:.2} of ${budget_usd:.2} limit"
            ),
            Self::OutputParse { message } => write!(f, "output parse error: {message}"),
            Self::Model {
                status: Some(status),
                message,
            } => write!(f, "HTTP {status}: {message}"),
            Self::Model {
                status: None,
                message,
            } => write!(f, "{message}"),
            Self::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for InvokeError {}

impl IsRetryable for InvokeError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::BudgetExceeded { .. } | Self::OutputParse { .. } => false,
            Self::Model { status, message } => status
                .map(is_retryable_status)
                .unwrap_or(false)
                || message_is_transient(message),
            Self::Other(err) => message_is_transient(&err.to_string()),
        }
    }
}

/// The single primitive the pipeline drives. Implementations own the
/// provider transport, the conversational tool loop, cost accounting and
/// structured-output validation.
#[async_trait]
pub trait LlmRuntime: Send + Sync {
    async fn invoke(&self, prompt: &str, config: &InvokeConfig) -> Result<InvokeResult, InvokeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_error_formats_two_decimals() {
        let err = InvokeError::BudgetExceeded {
            spent_usd: 0.42,
            budget_usd: 0.4,
        };
        let message = err.to_string();
        assert!(message.contains("0.42"));
        assert!(message.contains("0.40"));
    }

    #[test]
    fn retryability_by_kind() {
        assert!(InvokeError::Model {
            status: Some(429),
            message: "slow down".into()
        }
        .is_retryable());
        assert!(InvokeError::Model {
            status: None,
            message: "connect ETIMEDOUT".into()
        }
        .is_retryable());
        assert!(!InvokeError::Model {
            status: Some(400),
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!InvokeError::BudgetExceeded {
            spent_usd: 1.0,
            budget_usd: 0.5
        }
        .is_retryable());
        assert!(!InvokeError::OutputParse {
            message: "not json".into()
        }
        .is_retryable());
    }

    #[test]
    fn collected_text_prefers_output() {
        let result = InvokeResult {
            output: Some("final".into()),
            messages: vec![TranscriptMessage {
                role: Role::Assistant,
                content: Some("earlier".into()),
            }],
            ..Default::default()
        };
        assert_eq!(result.collected_text(), "final");
    }

    #[test]
    fn collected_text_concatenates_transcript() {
        let result = InvokeResult {
            messages: vec![
                TranscriptMessage {
                    role: Role::User,
                    content: Some("prompt".into()),
                },
                TranscriptMessage {
                    role: Role::Assistant,
                    content: Some("looked at the site".into()),
                },
                TranscriptMessage {
                    role: Role::Tool,
                    content: Some("<html>...</html>".into()),
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            result.collected_text(),
            "looked at the site\n\n<html>...</html>"
        );
    }

    #[test]
    fn stage_tool_sets() {
        assert_eq!(
            ToolSet::recon().names(),
            ["web_probe", "web_intercept_api", "read_file"]
        );
        assert!(ToolSet::test().names().contains(&"scraper_test"));
        assert!(ToolSet::repair().names().contains(&"web_probe"));
        assert!(ToolSet::none().is_empty());
    }
}
