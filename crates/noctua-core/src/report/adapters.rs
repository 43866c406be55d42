//! Recovery of wire reports from partially malformed model output.
//!
//! When the runtime returns raw text instead of a validated structured
//! output, the text usually still contains the JSON object, wrapped in a
//! code fence or surrounded by prose. These adapters extract candidate
//! JSON spans and validate them by strict deserialization into the wire
//! types.

use serde::de::DeserializeOwned;

use super::recon::ReconReportWire;
use super::test_report::TestReportWire;

/// Candidate JSON spans in `raw`, most specific first.
fn json_candidates(raw: &str) -> Vec<&str> {
    let mut candidates = Vec::new();

    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        candidates.push(trimmed);
    }

    // Fenced blocks: ```json ... ``` or bare ``` ... ```
    let mut rest = raw;
    while let Some(start) = rest.find("```") {
        let after_fence = &rest[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(end) => {
                candidates.push(body[..end].trim());
                rest = &body[end + 3..];
            }
            None => break,
        }
    }

    // Outermost brace span.
    if let (Some(open), Some(close)) = (raw.find('{'), raw.rfind('}')) {
        if open < close {
            candidates.push(raw[open..=close].trim());
        }
    }

    candidates
}

fn recover<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, String> {
    let mut last_error = format!("{what}: no JSON object found in output");
    for candidate in json_candidates(raw) {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(err) => last_error = format!("{what}: {err}"),
        }
    }
    Err(last_error)
}

/// Recover a wire recon report from raw synthesize output.
pub fn recover_recon_report(raw: &str) -> Result<ReconReportWire, String> {
    recover(raw, "recon report")
}

/// Recover a wire test report from raw test-stage output.
pub fn recover_test_report(raw: &str) -> Result<TestReportWire, String> {
    recover(raw, "test report")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_RECON: &str = r#"{
        "url": "https://example.gov",
        "siteName": "Example",
        "siteType": "spa",
        "pages": [],
        "apiEndpoints": null,
        "antiBot": {"captcha": false, "cloudflare": false, "rateLimit": false, "requiresAuth": false},
        "sampleData": null,
        "suggestedStrategy": "browser_only"
    }"#;

    #[test]
    fn recovers_bare_json() {
        let report = recover_recon_report(MINIMAL_RECON).unwrap();
        assert_eq!(report.site_name, "Example");
    }

    #[test]
    fn recovers_from_json_fence() {
        let raw = format!("Here is the report:\n```json\n{MINIMAL_RECON}\n```\nDone.");
        let report = recover_recon_report(&raw).unwrap();
        assert_eq!(report.url, "https://example.gov");
    }

    #[test]
    fn recovers_from_surrounding_prose() {
        let raw = format!("I analyzed the site. {MINIMAL_RECON} Let me know if anything is off.");
        let report = recover_recon_report(&raw).unwrap();
        assert_eq!(report.site_name, "Example");
    }

    #[test]
    fn reports_last_validation_error() {
        let err = recover_recon_report("{\"url\": 42}").unwrap_err();
        assert!(err.starts_with("recon report:"));
    }

    #[test]
    fn no_json_at_all() {
        let err = recover_test_report("nothing to see here").unwrap_err();
        assert!(err.contains("test report"));
    }

    #[test]
    fn recovers_test_report_from_fence() {
        let raw = r#"```json
        {
          "success": true, "exitCode": 0, "timedOut": false,
          "recordCount": 5, "durationMs": 1000,
          "schemaErrors": [], "sampleRecords": [], "fieldCoverage": [],
          "stdout": "", "stderr": ""
        }
        ```"#;
        let report = recover_test_report(raw).unwrap();
        assert!(report.success);
        assert_eq!(report.record_count, 5);
    }
}
