//! File-presence wrapper for file-writing stages.
//!
//! A stage that is supposed to produce files sometimes ends its turn
//! without writing them. The wrapper runs the invocation once, checks the
//! expected paths, and if any are missing re-invokes a single time with a
//! reinforced prompt naming them. The caller still verifies presence after
//! the wrapper returns and decides whether a remaining gap is fatal.

use std::path::PathBuf;

use super::{InvokeConfig, InvokeError, InvokeResult, LlmRuntime};

/// Return the subset of `expected` that does not exist on disk.
pub async fn missing_files(expected: &[PathBuf]) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    for path in expected {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            missing.push(path.clone());
        }
    }
    missing
}

/// Reinforced tail appended to the original prompt on retry.
pub(crate) fn retry_context(missing: &[PathBuf], retry_hint: &str) -> String {
    let mut block = String::from(
        "\n\n## Previous attempt incomplete\n\
         The following required files were NOT created:\n",
    );
    for path in missing {
        block.push_str(&format!("- {}\n", path.display()));
    }
    block.push_str("\nYou MUST write every file listed above before finishing. ");
    block.push_str(retry_hint);
    block
}

/// Invoke once; if any expected file is missing afterwards, invoke once
/// more with the reinforced prompt. No third attempt.
pub async fn invoke_expecting_files(
    runtime: &dyn LlmRuntime,
    prompt: &str,
    config: &InvokeConfig,
    expected: &[PathBuf],
    retry_hint: &str,
) -> Result<InvokeResult, InvokeError> {
    let result = runtime.invoke(prompt, config).await?;

    let missing = missing_files(expected).await;
    if missing.is_empty() {
        return Ok(result);
    }

    tracing::warn!(
        missing = ?missing.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        "expected files missing after invocation, retrying with reinforced prompt"
    );

    let reinforced = format!("{prompt}{}", retry_context(&missing, retry_hint));
    runtime.invoke(&reinforced, config).await
}

/// Convenience for callers verifying after the wrapper returns.
pub async fn all_present(expected: &[PathBuf]) -> bool {
    missing_files(expected).await.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolSet;
    use std::sync::Mutex;

    /// Mock runtime that records prompts and optionally writes a file on
    /// the nth call.
    struct WritingRuntime {
        prompts: Mutex<Vec<String>>,
        write_on_call: Option<(usize, PathBuf)>,
    }

    #[async_trait::async_trait]
    impl LlmRuntime for WritingRuntime {
        async fn invoke(
            &self,
            prompt: &str,
            _config: &InvokeConfig,
        ) -> Result<InvokeResult, InvokeError> {
            let call_index = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len()
            };
            if let Some((n, path)) = &self.write_on_call {
                if call_index == *n {
                    tokio::fs::write(path, "export const schema = {};")
                        .await
                        .unwrap();
                }
            }
            Ok(InvokeResult::default())
        }
    }

    fn config() -> InvokeConfig {
        InvokeConfig::new("test-model", ToolSet::code())
    }

    #[tokio::test]
    async fn no_retry_when_file_written_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("schema.ts");
        let runtime = WritingRuntime {
            prompts: Mutex::new(Vec::new()),
            write_on_call: Some((1, target.clone())),
        };

        let result = invoke_expecting_files(
            &runtime,
            "write the schema",
            &config(),
            std::slice::from_ref(&target),
            "re-read the report first",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(runtime.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retry_prompt_names_missing_file_and_hint() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("schema.ts");
        let runtime = WritingRuntime {
            prompts: Mutex::new(Vec::new()),
            write_on_call: Some((2, target.clone())),
        };

        let result = invoke_expecting_files(
            &runtime,
            "write the schema",
            &config(),
            std::slice::from_ref(&target),
            "re-read the report first",
        )
        .await;

        assert!(result.is_ok());
        let prompts = runtime.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].starts_with("write the schema"));
        assert!(prompts[1].contains(&target.display().to_string()));
        assert!(prompts[1].contains("re-read the report first"));
        assert!(all_present(std::slice::from_ref(&target)).await);
    }

    #[tokio::test]
    async fn no_third_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never.ts");
        let runtime = WritingRuntime {
            prompts: Mutex::new(Vec::new()),
            write_on_call: None,
        };

        let _ = invoke_expecting_files(
            &runtime,
            "write it",
            &config(),
            std::slice::from_ref(&target),
            "hint",
        )
        .await;

        assert_eq!(runtime.prompts.lock().unwrap().len(), 2);
        assert!(!all_present(std::slice::from_ref(&target)).await);
    }
}
