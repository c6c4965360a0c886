//! Result types: per-page records, the ordered page map, and summaries.
//!
//! Everything here serializes straight to the JSON blob callers persist or
//! display:
//!
//! ```json
//! {
//!   "page_1": { "WagesTipsOtherComp": "50000.00", "DocumentType": "W-2" },
//!   "page_2": { "error": "Failed to find valid JSON in Gemini response.",
//!               "raw_response": "I cannot process this image." }
//! }
//! ```
//!
//! or, when the whole document failed, `{ "error": "<reason>" }`.

use crate::error::{ExtractError, PageError};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Key the extractor injects when the model did not report a document type.
pub const DOCUMENT_TYPE_KEY: &str = "DocumentType";

// ── Per-page record ──────────────────────────────────────────────────────

/// The structured result of analysing one page.
///
/// Serialized untagged: a success is the bare field map, a failure is an
/// object with an `error` key plus optional diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionRecord {
    Failed(ExtractionFailure),
    Fields(Map<String, Value>),
}

impl ExtractionRecord {
    pub fn is_error(&self) -> bool {
        matches!(self, ExtractionRecord::Failed(_))
    }

    pub fn fields(&self) -> Option<&Map<String, Value>> {
        match self {
            ExtractionRecord::Fields(map) => Some(map),
            ExtractionRecord::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ExtractionRecord::Failed(f) => Some(&f.error),
            ExtractionRecord::Fields(_) => None,
        }
    }

    /// Number of extracted key-value pairs (0 for failures).
    pub fn field_count(&self) -> usize {
        self.fields().map_or(0, Map::len)
    }

    pub(crate) fn failed(error: PageError) -> Self {
        ExtractionRecord::Failed(ExtractionFailure::new(error))
    }
}

/// The error arm of an [`ExtractionRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<ResponseFeedback>,
}

impl ExtractionFailure {
    pub fn new(error: PageError) -> Self {
        Self {
            error: error.to_string(),
            raw_response: None,
            feedback: None,
        }
    }

    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    pub fn with_feedback(mut self, feedback: ResponseFeedback) -> Self {
        self.feedback = Some(feedback);
        self
    }
}

impl From<ExtractionFailure> for ExtractionRecord {
    fn from(f: ExtractionFailure) -> Self {
        ExtractionRecord::Failed(f)
    }
}

// ── Service diagnostics ──────────────────────────────────────────────────

/// Diagnostic metadata lifted from a model response that carried no usable
/// text (blocked, filtered, truncated or empty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_ratings: Option<Value>,
    /// Why one or more of the fields above could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_error: Option<String>,
}

impl ResponseFeedback {
    /// Probe a `generateContent`-shaped response envelope for diagnostics.
    ///
    /// Each field is read on its own; a malformed field is noted in
    /// `feedback_error` and never stops the others from being read. Safety
    /// ratings are only read when the first candidate did not finish with
    /// `STOP`.
    pub fn probe(raw: &Value) -> Self {
        let mut feedback = ResponseFeedback::default();
        let mut problems: Vec<String> = Vec::new();

        match raw.get("promptFeedback") {
            None | Some(Value::Null) => {}
            Some(v) => feedback.prompt_feedback = Some(v.clone()),
        }

        match raw.get("candidates") {
            None | Some(Value::Null) => {}
            Some(Value::Array(candidates)) => match candidates.first() {
                None => problems.push("response has an empty candidate list".to_string()),
                Some(first) => {
                    match first.get("finishReason") {
                        None | Some(Value::Null) => {}
                        Some(Value::String(reason)) => {
                            feedback.finish_reason = Some(reason.clone())
                        }
                        Some(other) => {
                            problems.push(format!("finishReason is not a string: {other}"))
                        }
                    }
                    if feedback.finish_reason.as_deref() != Some("STOP") {
                        match first.get("safetyRatings") {
                            None | Some(Value::Null) => {}
                            Some(v) => feedback.safety_ratings = Some(v.clone()),
                        }
                    }
                }
            },
            Some(other) => problems.push(format!(
                "candidates is not a list: {}",
                json_kind(other)
            )),
        }

        if !problems.is_empty() {
            feedback.feedback_error = Some(problems.join("; "));
        }
        feedback
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Page map ─────────────────────────────────────────────────────────────

/// Ordered, append-only map from 1-indexed page number to its record.
///
/// Serializes as a JSON object keyed `"page_<n>"` in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResultMap {
    entries: Vec<(usize, ExtractionRecord)>,
}

impl PageResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Append the record for `page_num`. The aggregator inserts each page
    /// exactly once, in ascending order.
    pub(crate) fn insert(&mut self, page_num: usize, record: ExtractionRecord) {
        debug_assert!(
            self.get(page_num).is_none(),
            "page {page_num} inserted twice"
        );
        self.entries.push((page_num, record));
    }

    /// The JSON key used for a page number.
    pub fn page_key(page_num: usize) -> String {
        format!("page_{page_num}")
    }

    pub fn get(&self, page_num: usize) -> Option<&ExtractionRecord> {
        self.entries
            .iter()
            .find(|(n, _)| *n == page_num)
            .map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ExtractionRecord)> {
        self.entries.iter().map(|(n, r)| (*n, r))
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| Self::page_key(*n)).collect()
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|(_, r)| r.is_error()).count()
    }
}

impl Serialize for PageResultMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (page_num, record) in &self.entries {
            map.serialize_entry(&Self::page_key(*page_num), record)?;
        }
        map.end()
    }
}

impl IntoIterator for PageResultMap {
    type Item = (usize, ExtractionRecord);
    type IntoIter = std::vec::IntoIter<(usize, ExtractionRecord)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ── Caller-facing document result ────────────────────────────────────────

/// What a caller persists: the page map, or a single top-level error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DocumentExtraction {
    Pages(PageResultMap),
    Failed { error: String },
}

impl DocumentExtraction {
    pub fn pages(&self) -> Option<&PageResultMap> {
        match self {
            DocumentExtraction::Pages(p) => Some(p),
            DocumentExtraction::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DocumentExtraction::Failed { error } => Some(error),
            DocumentExtraction::Pages(_) => None,
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl From<Result<PageResultMap, ExtractError>> for DocumentExtraction {
    fn from(result: Result<PageResultMap, ExtractError>) -> Self {
        match result {
            Ok(pages) => DocumentExtraction::Pages(pages),
            Err(e) => DocumentExtraction::Failed {
                error: e.to_string(),
            },
        }
    }
}

// ── Summary ──────────────────────────────────────────────────────────────

/// Outcome of one page, as reported in an [`ExtractionSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageStatus {
    Success { fields: usize },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub page_num: usize,
    pub status: PageStatus,
}

/// Success/error counts over a [`PageResultMap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub pages: Vec<PageSummary>,
    pub success_count: usize,
    pub error_count: usize,
    pub total_fields: usize,
}

impl ExtractionSummary {
    pub fn from_pages(pages: &PageResultMap) -> Self {
        let pages: Vec<PageSummary> = pages
            .iter()
            .map(|(page_num, record)| PageSummary {
                page_num,
                status: match record {
                    ExtractionRecord::Fields(map) => PageStatus::Success { fields: map.len() },
                    ExtractionRecord::Failed(f) => PageStatus::Error {
                        message: f.error.clone(),
                    },
                },
            })
            .collect();

        let success_count = pages
            .iter()
            .filter(|p| matches!(p.status, PageStatus::Success { .. }))
            .count();
        let total_fields = pages
            .iter()
            .map(|p| match p.status {
                PageStatus::Success { fields } => fields,
                PageStatus::Error { .. } => 0,
            })
            .sum();

        Self {
            error_count: pages.len() - success_count,
            success_count,
            total_fields,
            pages,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

impl fmt::Display for ExtractionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extraction Summary:")?;
        for page in &self.pages {
            let key = PageResultMap::page_key(page.page_num);
            match &page.status {
                PageStatus::Success { fields } => {
                    writeln!(f, "- {key}: Success - Extracted {fields} key-value pairs.")?
                }
                PageStatus::Error { message } => writeln!(f, "- {key}: Error - {message}")?,
            }
        }
        if self.has_errors() {
            write!(
                f,
                "{}/{} pages failed",
                self.error_count,
                self.pages.len()
            )
        } else {
            write!(
                f,
                "Total key-value pairs extracted across all pages: {}",
                self.total_fields
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn fields(v: Value) -> ExtractionRecord {
        match v {
            Value::Object(map) => ExtractionRecord::Fields(map),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn failure_serializes_without_empty_diagnostics() {
        let record = ExtractionRecord::Failed(
            ExtractionFailure::new(PageError::NoJsonFound)
                .with_raw_response("I cannot process this image."),
        );
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "error": "Failed to find valid JSON in Gemini response.",
                "raw_response": "I cannot process this image."
            })
        );
    }

    #[test]
    fn record_deserializes_into_the_right_arm() {
        let ok: ExtractionRecord = serde_json::from_value(json!({"TotalAmount": "1.00"})).unwrap();
        assert!(!ok.is_error());
        let bad: ExtractionRecord = serde_json::from_value(json!({"error": "x"})).unwrap();
        assert_eq!(bad.error(), Some("x"));
    }

    #[test]
    fn page_map_serializes_in_page_order() {
        let mut map = PageResultMap::new();
        for n in 1..=11 {
            map.insert(n, fields(json!({"n": n})));
        }
        let text = serde_json::to_string(&map).unwrap();
        let p2 = text.find("\"page_2\"").unwrap();
        let p10 = text.find("\"page_10\"").unwrap();
        assert!(p2 < p10, "insertion order must win over lexical order: {text}");
        assert_eq!(map.get(10).unwrap().fields().unwrap()["n"], json!(10));
        assert_eq!(map.keys().first().map(String::as_str), Some("page_1"));
    }

    #[test]
    fn document_failure_is_a_single_error_object() {
        let doc = DocumentExtraction::from(Err(ExtractError::SourceNotFound {
            path: PathBuf::from("missing.pdf"),
        }));
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"error": "Source PDF file not found: missing.pdf"})
        );
        assert!(doc.pages().is_none());
    }

    #[test]
    fn probe_reads_blocked_candidate() {
        let raw = json!({
            "candidates": [{
                "finishReason": "SAFETY",
                "safetyRatings": [{"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH"}]
            }]
        });
        let fb = ResponseFeedback::probe(&raw);
        assert_eq!(fb.finish_reason.as_deref(), Some("SAFETY"));
        assert!(fb.safety_ratings.is_some());
        assert!(fb.feedback_error.is_none());
    }

    #[test]
    fn probe_skips_safety_ratings_on_stop() {
        let raw = json!({"candidates": [{"finishReason": "STOP", "safetyRatings": []}]});
        let fb = ResponseFeedback::probe(&raw);
        assert_eq!(fb.finish_reason.as_deref(), Some("STOP"));
        assert!(fb.safety_ratings.is_none());
    }

    #[test]
    fn probe_reads_prompt_feedback_without_candidates() {
        let raw = json!({"promptFeedback": {"blockReason": "OTHER"}});
        let fb = ResponseFeedback::probe(&raw);
        assert_eq!(fb.prompt_feedback, Some(json!({"blockReason": "OTHER"})));
        assert!(fb.finish_reason.is_none());
        assert!(fb.feedback_error.is_none());
    }

    #[test]
    fn probe_absorbs_malformed_fields() {
        let raw = json!({
            "promptFeedback": {"blockReason": "SAFETY"},
            "candidates": "oops"
        });
        let fb = ResponseFeedback::probe(&raw);
        assert!(fb.prompt_feedback.is_some());
        assert_eq!(fb.feedback_error.as_deref(), Some("candidates is not a list: string"));

        let fb = ResponseFeedback::probe(&json!({"candidates": []}));
        assert!(fb.feedback_error.unwrap().contains("empty candidate list"));

        let fb = ResponseFeedback::probe(&json!({"candidates": [{"finishReason": 3}]}));
        assert!(fb.finish_reason.is_none());
        assert!(fb.feedback_error.unwrap().contains("finishReason"));
    }

    #[test]
    fn summary_counts_and_display() {
        let mut map = PageResultMap::new();
        map.insert(1, fields(json!({"A": "1", "B": "2"})));
        map.insert(
            2,
            ExtractionRecord::failed(PageError::ModelService {
                detail: "HTTP 500: down".into(),
            }),
        );
        map.insert(3, fields(json!({"C": "3"})));

        let summary = ExtractionSummary::from_pages(&map);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.total_fields, 3);

        let text = summary.to_string();
        assert!(text.contains("- page_1: Success - Extracted 2 key-value pairs."));
        assert!(text.contains("- page_2: Error - Gemini API call failed: HTTP 500: down"));
        assert!(text.ends_with("1/3 pages failed"));
    }

    #[test]
    fn summary_without_errors_reports_total() {
        let mut map = PageResultMap::new();
        map.insert(1, fields(json!({"A": "1"})));
        let summary = ExtractionSummary::from_pages(&map);
        assert!(summary
            .to_string()
            .ends_with("Total key-value pairs extracted across all pages: 1"));
    }
}
