//! Failure diagnosis for the repair stage.
//!
//! Classifies the primary failure of the last test run so the repair
//! prompt can route the model at the right layer (imports vs. navigation
//! vs. selectors) instead of letting it guess.

use crate::report::recon::PagePurpose;
use crate::report::{ReconReport, TestReport};

/// Primary failure category of a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Broken import/require resolution in the generated code.
    Module,
    /// The scraper never reached the target page.
    Navigation,
    /// Selectors matched nothing or waits timed out.
    Selector,
    /// Anything else (schema mismatches, empty output, crashes).
    General,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Module => "module_error",
            Self::Navigation => "navigation_error",
            Self::Selector => "selector_error",
            Self::General => "general",
        }
    }
}

/// Classify the primary failure from a failed test report. Schema error
/// messages are checked before captured stderr so the most specific
/// signal wins.
pub fn classify_failure(report: &TestReport) -> FailureKind {
    let mut haystack = String::new();
    for error in &report.schema_errors {
        haystack.push_str(&error.message);
        haystack.push('\n');
    }
    haystack.push_str(&report.stderr);
    haystack.push('\n');
    haystack.push_str(&report.stdout);
    let lower = haystack.to_ascii_lowercase();

    if lower.contains("cannot find module")
        || lower.contains("module_not_found")
        || lower.contains("err_module_not_found")
    {
        FailureKind::Module
    } else if lower.contains("net::err")
        || lower.contains("err_name_not_resolved")
        || lower.contains("err_connection")
        || lower.contains("navigation failed")
        || lower.contains("page.goto")
    {
        FailureKind::Navigation
    } else if lower.contains("selector") || lower.contains("timeout") || lower.contains("timed out")
    {
        FailureKind::Selector
    } else {
        FailureKind::General
    }
}

/// Diagnosis block embedded into the repair prompt: the classified
/// failure, targeted guidance, and page URLs from the recon report as
/// re-probing hints.
pub fn diagnosis_block(report: &TestReport, recon: Option<&ReconReport>) -> String {
    let kind = classify_failure(report);

    let guidance = match kind {
        FailureKind::Module => {
            "Fix the import/require paths first. Check relative paths against the actual \
             files on disk (file extensions matter for ESM imports) before touching any \
             scraping logic."
        }
        FailureKind::Navigation => {
            "The scraper never reached the target page. Re-probe the URL, check for \
             redirects or changed paths, and verify the wait-for-load conditions."
        }
        FailureKind::Selector => {
            "Selectors matched nothing or timed out. Re-probe the page and compare the \
             live DOM against the selectors in scraper.ts; prefer stable attributes over \
             positional selectors."
        }
        FailureKind::General => {
            "Read the captured output carefully, reproduce the failure with the test \
             command, and fix the first error in the chain before re-running."
        }
    };

    let mut block = format!("Diagnosis: {}\n{}\n", kind.label(), guidance);

    if let Some(recon) = recon {
        let hints: Vec<&str> = recon
            .pages_with_purpose(PagePurpose::Search)
            .chain(recon.pages_with_purpose(PagePurpose::Listing))
            .map(|page| page.url.as_str())
            .collect();
        if !hints.is_empty() {
            block.push_str("Known-good pages from reconnaissance:\n");
            for url in hints {
                block.push_str(&format!("- {url}\n"));
            }
        }
    }

    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::test_report::{SchemaErrorWire, TestReportWire};

    fn failed_report(message: &str) -> TestReport {
        TestReport::from_wire(TestReportWire {
            success: false,
            exit_code: 1,
            timed_out: false,
            record_count: 0,
            duration_ms: 900,
            schema_errors: vec![SchemaErrorWire {
                path: None,
                message: message.into(),
            }],
            sample_records: vec![],
            field_coverage: vec![],
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    #[test]
    fn selector_timeout_classifies_as_selector_error() {
        let report = failed_report("Timeout 15000ms exceeded waiting for selector '.row'");
        assert_eq!(classify_failure(&report), FailureKind::Selector);
        assert!(diagnosis_block(&report, None).contains("selector_error"));
    }

    #[test]
    fn missing_module_classifies_as_module_error() {
        let report = failed_report("Cannot find module './scraper.js'");
        assert_eq!(classify_failure(&report), FailureKind::Module);
        assert!(diagnosis_block(&report, None).contains("module_error"));
    }

    #[test]
    fn dns_failure_classifies_as_navigation() {
        let report = failed_report("net::ERR_NAME_NOT_RESOLVED at https://example.gov");
        assert_eq!(classify_failure(&report), FailureKind::Navigation);
    }

    #[test]
    fn unknown_failure_is_general() {
        let report = failed_report("expected string, got null");
        assert_eq!(classify_failure(&report), FailureKind::General);
        assert!(diagnosis_block(&report, None).contains("general"));
    }

    #[test]
    fn stderr_is_considered_when_schema_errors_are_silent() {
        let mut report = failed_report("some schema note");
        report.schema_errors.clear();
        report.stderr = "Error: Cannot find module 'playwright'".into();
        assert_eq!(classify_failure(&report), FailureKind::Module);
    }

    #[test]
    fn module_beats_selector_when_both_present() {
        let mut report = failed_report("Cannot find module './scraper.js'");
        report.stderr = "Timeout waiting for selector".into();
        assert_eq!(classify_failure(&report), FailureKind::Module);
    }
}
