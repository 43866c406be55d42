//! Recon report: structured site analysis produced by the synthesize phase.
//!
//! Two physical shapes exist. The **wire form** is strict-mode-safe for
//! structured-output validators: every field is present (absent encoded as
//! null) and free-form records travel as JSON strings. The **internal
//! form** is the idiomatic one the rest of the pipeline reads. The wire
//! form is observable on disk as `recon-report.json` and must stay stable.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::OutputSchema;

/// How the target site serves its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteType {
    StaticHtml,
    Spa,
    ApiFirst,
    Hybrid,
    Unknown,
}

/// Role a page plays in the scraping flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagePurpose {
    Search,
    Listing,
    Detail,
    Login,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationType {
    NextLink,
    UrlParam,
    InfiniteScroll,
    LoadMore,
    None,
}

/// Overall approach the codegen stage should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedStrategy {
    FormSearch,
    Listing,
    ApiDirect,
    BrowserOnly,
}

/// Anti-bot posture observed during recon. Identical in both forms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AntiBot {
    pub captcha: bool,
    pub cloudflare: bool,
    pub rate_limit: bool,
    pub requires_auth: bool,
}

// ── Wire form ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FormFieldWire {
    pub name: String,
    pub selector: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaginationWire {
    #[serde(rename = "type")]
    pub pagination_type: PaginationType,
    #[serde(default)]
    pub next_selector: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub load_more_selector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PageWire {
    pub url: String,
    pub purpose: PagePurpose,
    #[serde(default)]
    pub form_fields: Option<Vec<FormFieldWire>>,
    #[serde(default)]
    pub data_elements: Option<Vec<String>>,
    #[serde(default)]
    pub pagination: Option<PaginationWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApiEndpointWire {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Shape description carried as an opaque string (often JSON).
    #[serde(default)]
    pub response_shape: Option<String>,
}

/// Strict rendering validated as structured output and persisted to
/// `recon-report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReconReportWire {
    pub url: String,
    pub site_name: String,
    pub site_type: SiteType,
    pub pages: Vec<PageWire>,
    #[serde(default)]
    pub api_endpoints: Option<Vec<ApiEndpointWire>>,
    pub anti_bot: AntiBot,
    /// Sample records, each serialized as a JSON string.
    #[serde(default)]
    pub sample_data: Option<Vec<String>>,
    pub suggested_strategy: SuggestedStrategy,
}

// ── Internal form ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub name: String,
    pub selector: String,
    pub field_type: String,
    pub required: bool,
    pub options: Vec<String>,
}

/// Pagination with only the fields its type carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pagination {
    NextLink { next_selector: Option<String> },
    UrlParam { param: Option<String> },
    InfiniteScroll,
    LoadMore { load_more_selector: Option<String> },
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub url: String,
    pub purpose: PagePurpose,
    pub form_fields: Vec<FormField>,
    pub data_elements: Vec<String>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    pub url: String,
    pub method: String,
    pub content_type: Option<String>,
    pub response_shape: Option<Value>,
}

/// Idiomatic form consumed by the prompt builders and the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconReport {
    pub url: String,
    pub site_name: String,
    pub site_type: SiteType,
    pub pages: Vec<Page>,
    pub api_endpoints: Vec<ApiEndpoint>,
    pub anti_bot: AntiBot,
    pub sample_data: Vec<Value>,
    pub suggested_strategy: SuggestedStrategy,
}

impl ReconReport {
    /// Pages with the given purpose, in report order.
    pub fn pages_with_purpose(&self, purpose: PagePurpose) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(move |p| p.purpose == purpose)
    }

    /// Short textual summary embedded into downstream prompts.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Site: {} ({})", self.site_name, self.url),
            format!(
                "Type: {:?}, strategy: {:?}",
                self.site_type, self.suggested_strategy
            ),
        ];
        for page in &self.pages {
            lines.push(format!("- {:?} page: {}", page.purpose, page.url));
        }
        for endpoint in &self.api_endpoints {
            lines.push(format!("- API {} {}", endpoint.method, endpoint.url));
        }
        if self.anti_bot.captcha
            || self.anti_bot.cloudflare
            || self.anti_bot.rate_limit
            || self.anti_bot.requires_auth
        {
            lines.push(format!(
                "Anti-bot: captcha={} cloudflare={} rateLimit={} requiresAuth={}",
                self.anti_bot.captcha,
                self.anti_bot.cloudflare,
                self.anti_bot.rate_limit,
                self.anti_bot.requires_auth
            ));
        }
        lines.join("\n")
    }
}

// ── Wire <-> internal conversion ───────────────────────────────────────

/// Parse an opaque wire string into a JSON value, keeping the raw string
/// when it is not valid JSON.
fn parse_opaque(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

/// Re-encode an internal value as an opaque wire string. Plain strings go
/// out raw; everything else is compact JSON.
fn encode_opaque(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<PaginationWire> for Pagination {
    fn from(wire: PaginationWire) -> Self {
        match wire.pagination_type {
            PaginationType::NextLink => Pagination::NextLink {
                next_selector: wire.next_selector,
            },
            PaginationType::UrlParam => Pagination::UrlParam { param: wire.param },
            PaginationType::InfiniteScroll => Pagination::InfiniteScroll,
            PaginationType::LoadMore => Pagination::LoadMore {
                load_more_selector: wire.load_more_selector,
            },
            PaginationType::None => Pagination::None,
        }
    }
}

impl From<&Pagination> for PaginationWire {
    fn from(pagination: &Pagination) -> Self {
        let mut wire = PaginationWire {
            pagination_type: PaginationType::None,
            next_selector: None,
            param: None,
            load_more_selector: None,
        };
        match pagination {
            Pagination::NextLink { next_selector } => {
                wire.pagination_type = PaginationType::NextLink;
                wire.next_selector = next_selector.clone();
            }
            Pagination::UrlParam { param } => {
                wire.pagination_type = PaginationType::UrlParam;
                wire.param = param.clone();
            }
            Pagination::InfiniteScroll => wire.pagination_type = PaginationType::InfiniteScroll,
            Pagination::LoadMore { load_more_selector } => {
                wire.pagination_type = PaginationType::LoadMore;
                wire.load_more_selector = load_more_selector.clone();
            }
            Pagination::None => {}
        }
        wire
    }
}

impl ReconReport {
    /// Convert the strict wire form into the internal form. Applied
    /// immediately after structured-output validation.
    pub fn from_wire(wire: ReconReportWire) -> Self {
        Self {
            url: wire.url,
            site_name: wire.site_name,
            site_type: wire.site_type,
            pages: wire
                .pages
                .into_iter()
                .map(|page| Page {
                    url: page.url,
                    purpose: page.purpose,
                    form_fields: page
                        .form_fields
                        .unwrap_or_default()
                        .into_iter()
                        .map(|f| FormField {
                            name: f.name,
                            selector: f.selector,
                            field_type: f.field_type,
                            required: f.required,
                            options: f.options.unwrap_or_default(),
                        })
                        .collect(),
                    data_elements: page.data_elements.unwrap_or_default(),
                    pagination: page.pagination.map(Pagination::from),
                })
                .collect(),
            api_endpoints: wire
                .api_endpoints
                .unwrap_or_default()
                .into_iter()
                .map(|e| ApiEndpoint {
                    url: e.url,
                    method: e.method,
                    content_type: e.content_type,
                    response_shape: e.response_shape.map(parse_opaque),
                })
                .collect(),
            anti_bot: wire.anti_bot,
            sample_data: wire
                .sample_data
                .unwrap_or_default()
                .into_iter()
                .map(parse_opaque)
                .collect(),
            suggested_strategy: wire.suggested_strategy,
        }
    }

    /// Render back to the wire form. Empty collections normalize to null.
    pub fn to_wire(&self) -> ReconReportWire {
        ReconReportWire {
            url: self.url.clone(),
            site_name: self.site_name.clone(),
            site_type: self.site_type,
            pages: self
                .pages
                .iter()
                .map(|page| PageWire {
                    url: page.url.clone(),
                    purpose: page.purpose,
                    form_fields: if page.form_fields.is_empty() {
                        None
                    } else {
                        Some(
                            page.form_fields
                                .iter()
                                .map(|f| FormFieldWire {
                                    name: f.name.clone(),
                                    selector: f.selector.clone(),
                                    field_type: f.field_type.clone(),
                                    required: f.required,
                                    options: if f.options.is_empty() {
                                        None
                                    } else {
                                        Some(f.options.clone())
                                    },
                                })
                                .collect(),
                        )
                    },
                    data_elements: if page.data_elements.is_empty() {
                        None
                    } else {
                        Some(page.data_elements.clone())
                    },
                    pagination: page.pagination.as_ref().map(PaginationWire::from),
                })
                .collect(),
            api_endpoints: if self.api_endpoints.is_empty() {
                None
            } else {
                Some(
                    self.api_endpoints
                        .iter()
                        .map(|e| ApiEndpointWire {
                            url: e.url.clone(),
                            method: e.method.clone(),
                            content_type: e.content_type.clone(),
                            response_shape: e.response_shape.as_ref().map(encode_opaque),
                        })
                        .collect(),
                )
            },
            anti_bot: self.anti_bot,
            sample_data: if self.sample_data.is_empty() {
                None
            } else {
                Some(self.sample_data.iter().map(encode_opaque).collect())
            },
            suggested_strategy: self.suggested_strategy,
        }
    }
}

// ── Structured-output schema ───────────────────────────────────────────

/// JSON schema for the wire form, handed to the runtime for validated
/// structured output.
fn nullable_string() -> Value {
    json!({ "type": ["string", "null"] })
}

pub fn recon_report_schema() -> OutputSchema {
    let schema = json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "url", "siteName", "siteType", "pages", "apiEndpoints",
            "antiBot", "sampleData", "suggestedStrategy"
        ],
        "properties": {
            "url": { "type": "string" },
            "siteName": { "type": "string" },
            "siteType": {
                "type": "string",
                "enum": ["static_html", "spa", "api_first", "hybrid", "unknown"]
            },
            "pages": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["url", "purpose", "formFields", "dataElements", "pagination"],
                    "properties": {
                        "url": { "type": "string" },
                        "purpose": {
                            "type": "string",
                            "enum": ["search", "listing", "detail", "login", "other"]
                        },
                        "formFields": {
                            "type": ["array", "null"],
                            "items": {
                                "type": "object",
                                "additionalProperties": false,
                                "required": ["name", "selector", "type", "required", "options"],
                                "properties": {
                                    "name": { "type": "string" },
                                    "selector": { "type": "string" },
                                    "type": { "type": "string" },
                                    "required": { "type": "boolean" },
                                    "options": {
                                        "type": ["array", "null"],
                                        "items": { "type": "string" }
                                    }
                                }
                            }
                        },
                        "dataElements": {
                            "type": ["array", "null"],
                            "items": { "type": "string" }
                        },
                        "pagination": {
                            "type": ["object", "null"],
                            "additionalProperties": false,
                            "required": ["type", "nextSelector", "param", "loadMoreSelector"],
                            "properties": {
                                "type": {
                                    "type": "string",
                                    "enum": ["next_link", "url_param", "infinite_scroll", "load_more", "none"]
                                },
                                "nextSelector": nullable_string(),
                                "param": nullable_string(),
                                "loadMoreSelector": nullable_string()
                            }
                        }
                    }
                }
            },
            "apiEndpoints": {
                "type": ["array", "null"],
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["url", "method", "contentType", "responseShape"],
                    "properties": {
                        "url": { "type": "string" },
                        "method": { "type": "string" },
                        "contentType": nullable_string(),
                        "responseShape": nullable_string()
                    }
                }
            },
            "antiBot": {
                "type": "object",
                "additionalProperties": false,
                "required": ["captcha", "cloudflare", "rateLimit", "requiresAuth"],
                "properties": {
                    "captcha": { "type": "boolean" },
                    "cloudflare": { "type": "boolean" },
                    "rateLimit": { "type": "boolean" },
                    "requiresAuth": { "type": "boolean" }
                }
            },
            "sampleData": {
                "type": ["array", "null"],
                "items": { "type": "string" }
            },
            "suggestedStrategy": {
                "type": "string",
                "enum": ["form_search", "listing", "api_direct", "browser_only"]
            }
        }
    });

    OutputSchema {
        name: "recon_report",
        schema,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_wire() -> ReconReportWire {
        ReconReportWire {
            url: "https://example.gov/search".into(),
            site_name: "Example Records".into(),
            site_type: SiteType::Hybrid,
            pages: vec![PageWire {
                url: "https://example.gov/search".into(),
                purpose: PagePurpose::Search,
                form_fields: Some(vec![FormFieldWire {
                    name: "name".into(),
                    selector: "#q".into(),
                    field_type: "text".into(),
                    required: true,
                    options: None,
                }]),
                data_elements: None,
                pagination: Some(PaginationWire {
                    pagination_type: PaginationType::UrlParam,
                    next_selector: None,
                    param: Some("page".into()),
                    load_more_selector: None,
                }),
            }],
            api_endpoints: Some(vec![ApiEndpointWire {
                url: "https://example.gov/api/search".into(),
                method: "GET".into(),
                content_type: Some("application/json".into()),
                response_shape: Some(r#"{"data":[],"page":1}"#.into()),
            }]),
            anti_bot: AntiBot {
                rate_limit: true,
                ..Default::default()
            },
            sample_data: Some(vec![r#"{"name":"Acme LLC","id":"123"}"#.into()]),
            suggested_strategy: SuggestedStrategy::ApiDirect,
        }
    }

    #[test]
    fn wire_internal_wire_round_trip() {
        let wire = sample_wire();
        let internal = ReconReport::from_wire(wire.clone());
        assert_eq!(internal.to_wire(), wire);
    }

    #[test]
    fn opaque_strings_become_values() {
        let internal = ReconReport::from_wire(sample_wire());
        assert_eq!(internal.sample_data[0]["name"], "Acme LLC");
        let shape = internal.api_endpoints[0].response_shape.as_ref().unwrap();
        assert_eq!(shape["page"], 1);
    }

    #[test]
    fn unparseable_opaque_string_survives_as_string() {
        let mut wire = sample_wire();
        wire.sample_data = Some(vec!["not json at all".into()]);
        let internal = ReconReport::from_wire(wire.clone());
        assert_eq!(
            internal.sample_data[0],
            Value::String("not json at all".into())
        );
        assert_eq!(internal.to_wire(), wire);
    }

    #[test]
    fn nulls_normalize_to_empty_collections() {
        let mut wire = sample_wire();
        wire.api_endpoints = None;
        wire.sample_data = None;
        let internal = ReconReport::from_wire(wire);
        assert!(internal.api_endpoints.is_empty());
        assert!(internal.sample_data.is_empty());
    }

    #[test]
    fn wire_json_uses_camel_case_and_nulls() {
        let mut wire = sample_wire();
        wire.sample_data = None;
        let value = serde_json::to_value(&wire).unwrap();
        assert!(value.get("siteName").is_some());
        assert!(value.get("suggestedStrategy").is_some());
        assert!(value["sampleData"].is_null());
    }

    #[test]
    fn wire_rejects_unknown_fields() {
        let mut value = serde_json::to_value(sample_wire()).unwrap();
        value["surprise"] = Value::Bool(true);
        assert!(serde_json::from_value::<ReconReportWire>(value).is_err());
    }

    #[test]
    fn summary_lists_pages_and_endpoints() {
        let internal = ReconReport::from_wire(sample_wire());
        let summary = internal.summary();
        assert!(summary.contains("Example Records"));
        assert!(summary.contains("https://example.gov/api/search"));
        assert!(summary.contains("rateLimit=true"));
    }

    #[test]
    fn schema_is_strict() {
        let schema = recon_report_schema();
        assert_eq!(schema.name, "recon_report");
        assert_eq!(schema.schema["additionalProperties"], false);
        let required = schema.schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "antiBot"));
    }
}
