//! Tool-input guardrails.
//!
//! A guardrail is a veto policy over `(tool_name, tool_args)` evaluated by
//! the runtime before a tool call executes. A tripped guardrail rejects the
//! call upstream; the denial surfaces to the model as a tool error, never
//! as a pipeline failure.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::text::truncate_chars;

/// Max length of the diagnostic string attached to a trip.
const OUTPUT_INFO_MAX_CHARS: usize = 80;

/// Shell command patterns that are always rejected, matched on word
/// boundaries (case-sensitive).
const BLOCKED_COMMAND_PATTERNS: [&str; 5] = [
    r"(^|\s)rm -rf /(\s|$)",
    r"(^|\s)rm -rf ~(\s|$)",
    r"(^|\s)rm -rf \$HOME(\s|$)",
    r"(^|\s)git push --force(\s|$)",
    r"(^|\s)git push -f(\s|$)",
];

/// Verdict of one guardrail check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailVerdict {
    pub tripwire_triggered: bool,
    pub output_info: Option<String>,
}

impl GuardrailVerdict {
    pub fn pass() -> Self {
        Self {
            tripwire_triggered: false,
            output_info: None,
        }
    }

    pub fn trip(info: impl AsRef<str>) -> Self {
        Self {
            tripwire_triggered: true,
            output_info: Some(truncate_chars(info.as_ref(), OUTPUT_INFO_MAX_CHARS)),
        }
    }
}

/// Per-call input policy, evaluated by the runtime before tool execution.
pub trait InputGuardrail: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, tool_name: &str, args: &Value) -> GuardrailVerdict;
}

/// Guardrail over `bash` tool calls: rejects destructive command patterns
/// and absolute paths that point outside the run's workspace.
pub struct BashGuardrail {
    workspace: PathBuf,
    blocked: Vec<Regex>,
}

fn absolute_path_regex() -> &'static Regex {
    // Coarse token scan: any whitespace-delimited token starting with `/`
    // counts as a path, including substrings of quoted arguments.
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|\s)(/[^\s]+)").expect("valid regex"))
}

impl BashGuardrail {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let blocked = BLOCKED_COMMAND_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("valid regex"))
            .collect();
        Self {
            workspace: workspace.into(),
            blocked,
        }
    }

    /// A referenced absolute path is acceptable when it stays inside the
    /// workspace, is an ancestor of it (commands naming a parent dir), or
    /// points at the shared scratch locations.
    fn path_is_allowed(&self, raw: &str) -> bool {
        let path = Path::new(raw);
        raw == "/"
            || raw == "/dev/null"
            || path.starts_with(&self.workspace)
            || self.workspace.starts_with(path)
            || path.starts_with("/tmp")
    }

    fn check_command(&self, command: &str) -> GuardrailVerdict {
        for pattern in &self.blocked {
            if let Some(found) = pattern.find(command) {
                return GuardrailVerdict::trip(format!(
                    "blocked command pattern: {}",
                    found.as_str().trim()
                ));
            }
        }

        for captures in absolute_path_regex().captures_iter(command) {
            let candidate = &captures[2];
            if !self.path_is_allowed(candidate) {
                return GuardrailVerdict::trip(format!("path outside workspace: {candidate}"));
            }
        }

        GuardrailVerdict::pass()
    }
}

impl InputGuardrail for BashGuardrail {
    fn name(&self) -> &'static str {
        "bash_guardrail"
    }

    fn check(&self, tool_name: &str, args: &Value) -> GuardrailVerdict {
        if tool_name != "bash" {
            return GuardrailVerdict::pass();
        }
        let Some(command) = args.get("command").and_then(Value::as_str) else {
            return GuardrailVerdict::pass();
        };
        self.check_command(command)
    }
}
