//! Core diligence types shared by the scoring, merge, and thesis-fit layers.
//!
//! Everything here is serde-compatible with the camelCase JSON the web layer
//! persists, so records round-trip through storage without a mapping step.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::normalize::is_low_quality_extracted_link_content;

// =============================================================================
// Metrics
// =============================================================================

/// Well-known metric keys on `DiligenceRecord::metrics`.
pub mod metric_keys {
    pub const FUNDING_AMOUNT: &str = "fundingAmount";
    pub const COMMITTED_AMOUNT: &str = "committedAmount";
    pub const VALUATION: &str = "valuation";
    pub const ARR: &str = "arr";
    pub const TAM: &str = "tam";
    pub const SAM: &str = "sam";
    pub const SOM: &str = "som";
    pub const ACV: &str = "acv";
    pub const RUNWAY: &str = "runway";
    pub const YOY_GROWTH: &str = "yoyGrowth";
}

/// Where a metric value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    /// Entered by an analyst. Never overwritten by model output.
    Manual,
    /// Returned by the scoring model.
    #[default]
    Ai,
    /// Pulled out of notes or documents by the fact extractors.
    Extracted,
    Hubspot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEntry {
    pub value: String,
    #[serde(default)]
    pub source: MetricSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl MetricEntry {
    pub fn new(value: impl Into<String>, source: MetricSource) -> Self {
        Self {
            value: value.into(),
            source,
            source_detail: None,
            updated_at: Some(Utc::now().to_rfc3339()),
        }
    }

    /// True when the entry carries a real value rather than a placeholder.
    pub fn is_populated(&self) -> bool {
        !crate::text::normalize::is_placeholder_value(&self.value)
    }
}

// =============================================================================
// Documents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkIngestStatus {
    Ingested,
    Failed,
    Pending,
}

/// One uploaded file or ingested link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiligenceDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_ingest_status: Option<LinkIngestStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_ingest_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
}

impl DiligenceDocument {
    /// Links and URLs are ingested remotely and carry an ingest status.
    pub fn is_link(&self) -> bool {
        matches!(
            self.file_type.trim().to_ascii_lowercase().as_str(),
            "link" | "url"
        )
    }

    pub fn text(&self) -> &str {
        self.extracted_text.as_deref().unwrap_or("")
    }

    /// A link is usable only once ingested with real content; a file only
    /// when extraction produced any text at all.
    pub fn is_usable_for_scoring(&self) -> bool {
        if self.is_link() {
            self.link_ingest_status == Some(LinkIngestStatus::Ingested)
                && !is_low_quality_extracted_link_content(self.text())
        } else {
            !self.text().trim().is_empty()
        }
    }

    /// Whether a re-score should attempt to re-ingest this link.
    pub fn needs_reingestion(&self) -> bool {
        self.is_link()
            && self.external_url.as_deref().is_some_and(|u| !u.trim().is_empty())
            && (self.link_ingest_status != Some(LinkIngestStatus::Ingested)
                || is_low_quality_extracted_link_content(self.text()))
    }
}

// =============================================================================
// Scores
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    Full,
    Incremental,
}

/// How well the evidence supports a criterion judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStatus {
    Supported,
    Partial,
    Unknown,
    Contradicted,
}

impl EvidenceStatus {
    pub fn is_unsupported(self) -> bool {
        matches!(self, EvidenceStatus::Unknown | EvidenceStatus::Contradicted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CriterionScore {
    pub name: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_status: Option<EvidenceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_override: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrided_at: Option<String>,
}

impl CriterionScore {
    pub fn effective_score(&self) -> f64 {
        self.manual_override.unwrap_or(self.score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
    pub category: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub weighted_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_override: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrided_at: Option<String>,
    #[serde(default)]
    pub criteria: Vec<CriterionScore>,
}

impl CategoryScore {
    /// Analyst override wins over the model's score.
    pub fn effective_score(&self) -> f64 {
        self.manual_override.unwrap_or(self.score)
    }
}

/// Answers to the fixed thesis questions, optionally hand-edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ThesisAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_solving: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_approach: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_customer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_now: Option<String>,
    #[serde(default)]
    pub manually_edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
}

/// One score snapshot per scoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiligenceScore {
    #[serde(default)]
    pub overall: u32,
    #[serde(default)]
    pub data_quality: u32,
    #[serde(default)]
    pub categories: Vec<CategoryScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thesis_answers: Option<ThesisAnswers>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_input_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_mode: Option<ScoringMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescore_explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scored_at: Option<String>,
}

impl DiligenceScore {
    pub fn category(&self, name: &str) -> Option<&CategoryScore> {
        self.categories
            .iter()
            .find(|c| c.category.trim().eq_ignore_ascii_case(name.trim()))
    }

    pub fn scored_at_utc(&self) -> Option<DateTime<Utc>> {
        self.scored_at.as_deref().and_then(parse_timestamp)
    }
}

// =============================================================================
// Thesis fit
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThesisFit {
    OnThesis,
    Mixed,
    OffThesis,
}

impl ThesisFit {
    /// Parse a model label. Anything outside the three valid values is `None`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "on_thesis" => Some(ThesisFit::OnThesis),
            "mixed" => Some(ThesisFit::Mixed),
            "off_thesis" => Some(ThesisFit::OffThesis),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThesisFit::OnThesis => "on_thesis",
            ThesisFit::Mixed => "mixed",
            ThesisFit::OffThesis => "off_thesis",
        }
    }
}

/// Classified fit of a company against the investment thesis.
///
/// `why_not_fit` holds direct thesis conflicts only; missing information
/// lives in `evidence_gaps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThesisFitResult {
    pub fit: ThesisFit,
    pub confidence: u32,
    #[serde(default)]
    pub why_fits: Vec<String>,
    #[serde(default)]
    pub why_not_fit: Vec<String>,
    #[serde(default)]
    pub evidence_gaps: Vec<String>,
    #[serde(default)]
    pub evidence_anchors: Vec<String>,
    #[serde(default)]
    pub crux_question: String,
    #[serde(default)]
    pub company_description: String,
    #[serde(default)]
    pub problem_solving: String,
    #[serde(default)]
    pub solution_approach: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<String>,
}

// =============================================================================
// Record
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CategorizedNote {
    pub category: String,
    pub text: String,
}

/// One company under review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiligenceRecord {
    pub id: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_one_liner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub categorized_notes: Vec<CategorizedNote>,
    #[serde(default)]
    pub documents: Vec<DiligenceDocument>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<DiligenceScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thesis_fit: Option<ThesisFitResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_research: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_synergy_research: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_necessity_research: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hubspot_company_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hubspot_deal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hubspot_synced_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl DiligenceRecord {
    pub fn usable_documents(&self) -> impl Iterator<Item = &DiligenceDocument> {
        self.documents.iter().filter(|d| d.is_usable_for_scoring())
    }

    /// Metric value if present and not a placeholder.
    pub fn metric(&self, key: &str) -> Option<&str> {
        self.metrics
            .get(key)
            .filter(|m| m.is_populated())
            .map(|m| m.value.trim())
    }

    pub fn has_metric(&self, key: &str) -> bool {
        self.metric(key).is_some()
    }

    /// Documents added since the previous score was taken.
    ///
    /// Without a previous score every document is new. Once a score exists,
    /// documents with no upload timestamp are treated as already scored, and
    /// a score with no `scoredAt` counts nothing as new.
    pub fn new_documents_since_last_score(&self) -> usize {
        let Some(score) = self.score.as_ref() else {
            return self.documents.len();
        };
        let Some(scored_at) = score.scored_at_utc() else {
            return 0;
        };
        self.documents
            .iter()
            .filter_map(|d| d.uploaded_at.as_deref().and_then(parse_timestamp))
            .filter(|uploaded| *uploaded > scored_at)
            .count()
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Per-request scoring settings passed through to the model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringSettings {
    /// Allow the scorer to pull web research into its context.
    #[serde(default = "default_true")]
    pub use_web_research: bool,
    /// Pass the linked HubSpot company record into the scoring context.
    #[serde(default = "default_true")]
    pub include_hubspot_context: bool,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            use_web_research: true,
            include_hubspot_context: true,
        }
    }
}

fn default_true() -> bool {
    true
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
