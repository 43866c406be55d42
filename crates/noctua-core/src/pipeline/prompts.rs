//! Stage prompt builders.
//!
//! Pure functions from `PipelineState` (plus previous-stage outputs) to
//! prompt text. No I/O happens here; everything a prompt embeds is read
//! from the state record or passed in by the driver.

use crate::paths;
use crate::pipeline::diagnosis;
use crate::pipeline::state::PipelineState;

/// Phase A: free exploration of the target site with the recon tool set.
pub fn explore_prompt(state: &PipelineState) -> String {
    format!(
        r#"You are doing reconnaissance on a website to prepare for writing a scraper.

Target URL: {url}
Goal: {intent}

Work through these steps:
1. Probe the target URL and note how the page is rendered (static HTML, client-side app, or a mix).
2. Find the page where the target data actually lives: a search form, a listing, or a data portal linked from the landing page.
3. If there is a search form, map every field: name, CSS selector, input type, whether it is required, and any option values.
4. Watch network traffic while interacting with the page and note any JSON API endpoints: URL, method, content type, and the shape of the response.
5. Check for anti-bot measures: CAPTCHAs, Cloudflare challenges, rate limiting, login walls.
6. Extract 2-3 sample records of the target data so the record shape is concrete.
7. Note how pagination works, if the data spans multiple pages.

Finish with a detailed written summary of everything you found. Include exact URLs, selectors, endpoint shapes and sample records; the summary is the only thing carried forward."#,
        url = state.target_url,
        intent = state.user_intent,
    )
}

/// Phase B: distill the findings into the structured recon report.
pub fn synthesize_prompt(state: &PipelineState, findings: &str) -> String {
    format!(
        r#"Turn these reconnaissance findings into a structured site analysis.

Target URL: {url}
Goal: {intent}

## Findings

{findings}

## Output

Respond with a single JSON object matching the recon report schema. Rules:
- Every field must be present; use null where you have nothing (never omit a key).
- `sampleData` entries and `responseShape` are JSON encoded as strings.
- `siteType` is one of: static_html, spa, api_first, hybrid, unknown.
- `suggestedStrategy` is one of: form_search, listing, api_direct, browser_only. Prefer api_direct when a usable JSON endpoint exists.
- List pages in the order a scraper would visit them."#,
        url = state.target_url,
        intent = state.user_intent,
        findings = findings,
    )
}

/// SCHEMA stage: derive the validation schema for the record shape.
pub fn schema_prompt(state: &PipelineState) -> String {
    let report_path = paths::recon_report_file(&state.work_dir);
    let schema_path = paths::schema_file(&state.scraper_dir);
    format!(
        r#"Read the recon report at {report} and write a validation schema for the records this scraper will extract.

Write the schema to {schema}. It must:
- Export a `recordSchema` (zod) describing one extracted record, with a field per data element found during recon.
- Use `.nullable()` for fields that may legitimately be missing on some records, like this:

```ts
import {{ z }} from "zod";

export const recordSchema = z.object({{
  businessName: z.string(),
  address: z.string().nullable(),
  permitNumber: z.string().nullable(),
}});

export type Record = z.infer<typeof recordSchema>;
```

- Keep field names camelCase and descriptive of the site's own terminology.
- Do not invent fields that recon never observed."#,
        report = report_path.display(),
        schema = schema_path.display(),
    )
}

/// CODEGEN stage: generate the scraper and its entry point.
pub fn codegen_prompt(state: &PipelineState) -> String {
    let scaffold = paths::scaffold_import_path(&state.scraper_dir);
    let scraper_path = paths::scraper_file(&state.scraper_dir);
    let entry_path = paths::entry_file(&state.scraper_dir);
    let schema_path = paths::schema_file(&state.scraper_dir);
    let recon_summary = state
        .recon_report
        .as_ref()
        .map(|r| r.summary())
        .unwrap_or_else(|| "No recon report available.".to_string());

    format!(
        r##"Write the scraper for this site.

## Site analysis

{summary}

## Files to write

1. `{scraper}` — a scraper config exported as `scraperConfig`, imported and run by the scaffold.
2. `{entry}` — the entry point: import the scaffold from "{scaffold}", import `scraperConfig` and the `recordSchema` from `{schema}`, wire them together and run.

## Scraper config shape, worked examples

A form-search site:

```ts
import type {{ ScraperConfig }} from "{scaffold}";

export const scraperConfig: ScraperConfig = {{
  startUrl: "https://example.gov/search",
  strategy: "form_search",
  search: {{
    fields: [{{ selector: "#businessName", value: "{{{{query}}}}" }}],
    submitSelector: "button[type=submit]",
  }},
  rows: "table.results tbody tr",
  fields: {{
    businessName: {{ selector: "td:nth-child(1)" }},
    permitNumber: {{ selector: "td:nth-child(3)" }},
  }},
  pagination: {{ type: "next_link", nextSelector: "a[rel=next]" }},
}};
```

An API-first site:

```ts
import type {{ ScraperConfig }} from "{scaffold}";

export const scraperConfig: ScraperConfig = {{
  startUrl: "https://example.gov/data-search/records",
  strategy: "api_direct",
  api: {{
    url: "https://example.gov/data-search/records",
    method: "GET",
    params: {{ name: "{{{{query}}}}", page: "{{{{page}}}}" }},
    recordsPath: "data",
    nextPage: {{ type: "url_param", param: "page" }},
  }},
  fields: {{
    businessName: {{ path: "businessName" }},
    taxpayerId: {{ path: "taxpayerId" }},
  }},
}};
```

## Requirements

- Follow the suggested strategy from the site analysis unless recon shows it cannot work.
- Map every schema field to a selector or response path observed during recon.
- The entry point must accept `--limit N` to cap extracted records and exit non-zero on failure.
- Both files must exist when you finish."##,
        summary = recon_summary,
        scraper = scraper_path.display(),
        entry = entry_path.display(),
        scaffold = scaffold,
        schema = schema_path.display(),
    )
}

/// TEST stage: run the scraper and report the outcome as structured output.
pub fn test_prompt(state: &PipelineState) -> String {
    let entry_path = paths::entry_file(&state.scraper_dir);
    format!(
        r#"Test the generated scraper.

Run exactly this command from the scraper directory:

    npx tsx {entry} --limit 5

Then:
1. Capture the exit code, stdout and stderr. Exit code 124 means the run timed out.
2. Validate every extracted record against the schema in schema.ts (scraper_test does this); collect each validation error with its record path.
3. Compute per-field coverage: for each schema field, the percentage of records where it was non-empty.
4. Keep up to three sample records.

Respond with a single JSON object matching the test report schema: success, exitCode, timedOut, recordCount, durationMs, schemaErrors, sampleRecords (JSON strings), fieldCoverage, stdout, stderr. `success` is true only when the run exited 0, extracted at least one record, and produced no schema errors."#,
        entry = entry_path.display(),
    )
}

/// REPAIR stage: fix the scraper guided by the failure diagnosis.
pub fn repair_prompt(state: &PipelineState) -> String {
    let mut history = String::new();
    for (index, report) in state.test_results.iter().enumerate() {
        history.push_str(&format!(
            "Attempt {}: {} — {} records, {} schema errors\n",
            index + 1,
            if report.success { "PASS" } else { "FAIL" },
            report.record_count,
            report.schema_errors.len(),
        ));
        for error in &report.schema_errors {
            match &error.path {
                Some(path) => history.push_str(&format!("    {path}: {}\n", error.message)),
                None => history.push_str(&format!("    {}\n", error.message)),
            }
        }
    }

    let diagnosis = state
        .last_test_report()
        .map(|report| diagnosis::diagnosis_block(report, state.recon_report.as_ref()))
        .unwrap_or_default();

    let scraper_path = paths::scraper_file(&state.scraper_dir);
    format!(
        r#"The scraper is failing its test. Fix it.

## Test history

{history}
## {diagnosis}

## Instructions

- Start from the diagnosis above; fix the classified failure before anything else.
- The scraper lives at {scraper}; the test command is `npx tsx {entry} --limit 5`.
- Re-probe live pages when selectors or endpoints are in doubt instead of guessing.
- Make the smallest change that fixes the failure; do not rewrite working parts."#,
        history = history,
        diagnosis = diagnosis,
        scraper = scraper_path.display(),
        entry = paths::entry_file(&state.scraper_dir).display(),
    )
}

/// HARDEN stage: production hardening via targeted edits.
pub fn harden_prompt(state: &PipelineState) -> String {
    let scraper_path = paths::scraper_file(&state.scraper_dir);
    let entry_path = paths::entry_file(&state.scraper_dir);
    format!(
        r#"The scraper at {scraper} passes its test. Harden it for production with targeted edits; do not restructure working code.

Add, where missing:
1. Retry with backoff around network requests (3 attempts, exponential delay).
2. Rate limiting between requests (configurable delay, default 1s).
3. Per-record error handling: a record that fails to parse is logged and skipped, never fatal to the whole run.
4. Progress logging: one line per page fetched and a running record count.
5. CLI validation in {entry}: reject unknown flags, require a numeric --limit, print usage on error.

Keep the record schema and the extraction logic unchanged — the test that passes now must still pass."#,
        scraper = scraper_path.display(),
        entry = entry_path.display(),
    )
}
