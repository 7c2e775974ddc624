//! Collaborator boundaries for the scoring pipelines.
//!
//! Persistence, link ingestion, the scoring and thesis models, research
//! enrichment, and CRM sync are all reached through these traits so the
//! pipelines can run against SQLite and HTTP in production and against
//! in-memory fakes in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::criteria::DiligenceCriteria;
use crate::error::DiligenceError;
use crate::hubspot::{HubSpotCompanyData, HubSpotSyncResult};
use crate::types::{
    CategorizedNote, DiligenceDocument, DiligenceRecord, DiligenceScore, MetricEntry,
    ScoringSettings, ThesisAnswers, ThesisFitResult,
};

// =============================================================================
// Persistence
// =============================================================================

/// Partial record update. Each `Some` field replaces the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_one_liner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<DiligenceDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BTreeMap<String, MetricEntry>>,
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
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == RecordPatch::default()
    }

    pub fn apply(self, record: &mut DiligenceRecord) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        fn set_opt<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        set_opt(&mut record.company_description, self.company_description);
        set_opt(&mut record.company_one_liner, self.company_one_liner);
        set(&mut record.documents, self.documents);
        set(&mut record.metrics, self.metrics);
        set_opt(&mut record.score, self.score);
        set_opt(&mut record.thesis_fit, self.thesis_fit);
        set_opt(&mut record.team_research, self.team_research);
        set_opt(&mut record.portfolio_synergy_research, self.portfolio_synergy_research);
        set_opt(&mut record.problem_necessity_research, self.problem_necessity_research);
        set_opt(&mut record.hubspot_company_id, self.hubspot_company_id);
        set_opt(&mut record.hubspot_deal_id, self.hubspot_deal_id);
        set_opt(&mut record.hubspot_synced_at, self.hubspot_synced_at);
    }
}

#[async_trait]
pub trait DiligenceStore: Send + Sync {
    async fn load_record(&self, id: &str) -> Result<Option<DiligenceRecord>, DiligenceError>;

    /// Apply a partial update and return the stored record.
    async fn update_record(
        &self,
        id: &str,
        patch: RecordPatch,
    ) -> Result<DiligenceRecord, DiligenceError>;
}

// =============================================================================
// Ingestion
// =============================================================================

#[async_trait]
pub trait DocumentIngestor: Send + Sync {
    /// Fetch a link document and return its extracted text.
    async fn ingest_link(&self, document: &DiligenceDocument) -> Result<String, DiligenceError>;
}

// =============================================================================
// Scoring model
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRequest {
    pub document_texts: Vec<String>,
    pub criteria: DiligenceCriteria,
    pub company_name: String,
    pub company_url: Option<String>,
    pub notes: Option<String>,
    pub categorized_notes: Vec<CategorizedNote>,
    pub questions: Vec<String>,
    pub hubspot_company_data: Option<HubSpotCompanyData>,
    pub team_research: Option<String>,
    pub portfolio_synergy_research: Option<String>,
    pub problem_necessity_research: Option<String>,
    pub metrics: BTreeMap<String, String>,
    pub previous_score: Option<DiligenceScore>,
    pub existing_thesis_answers: Option<ThesisAnswers>,
    pub settings: ScoringSettings,
    /// Restrict scoring to one category.
    pub category: Option<String>,
}

/// Company fields the scorer may fill in when the record lacks them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub one_liner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringOutcome {
    pub score: DiligenceScore,
    #[serde(default)]
    pub metrics: BTreeMap<String, String>,
    #[serde(default)]
    pub company_metadata: CompanyMetadata,
}

#[async_trait]
pub trait ScoringModel: Send + Sync {
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringOutcome, DiligenceError>;
}

// =============================================================================
// Enrichment
// =============================================================================

/// Web research used as extra scoring context. Every call is best-effort.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn team_research(&self, record: &DiligenceRecord) -> Result<Option<String>, DiligenceError>;

    async fn portfolio_synergy_research(
        &self,
        record: &DiligenceRecord,
    ) -> Result<Option<String>, DiligenceError>;

    async fn problem_necessity_research(
        &self,
        record: &DiligenceRecord,
    ) -> Result<Option<String>, DiligenceError>;
}

// =============================================================================
// Thesis model
// =============================================================================

#[async_trait]
pub trait ThesisModel: Send + Sync {
    /// Complete a rendered thesis-fit prompt and return the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String, DiligenceError>;
}

// =============================================================================
// CRM
// =============================================================================

#[async_trait]
pub trait HubSpotSync: Send + Sync {
    async fn fetch_company(
        &self,
        company_id: &str,
    ) -> Result<Option<HubSpotCompanyData>, DiligenceError>;

    async fn sync_record(&self, record: &DiligenceRecord) -> Result<HubSpotSyncResult, DiligenceError>;
}
