//! Scoring-input fingerprint.
//!
//! A re-score is skipped only when the fingerprint of everything the scorer
//! would see is unchanged. Documents and criteria are hashed in record
//! order, categorized notes keep their sequence, metrics are hashed in key
//! order.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::criteria::DiligenceCriteria;
use crate::types::{CategorizedNote, DiligenceDocument, DiligenceRecord, LinkIngestStatus, ScoringSettings};

/// Bump whenever scoring prompts or merge rules change. Every stored
/// fingerprint is invalidated by a new value.
pub const SCORER_VERSION: &str = "rescore-2026.10.1";

const FINGERPRINT_HEX_LEN: usize = 32;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintDocument<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub file_type: &'a str,
    pub extracted_text: &'a str,
    pub link_ingest_status: Option<LinkIngestStatus>,
}

impl<'a> From<&'a DiligenceDocument> for FingerprintDocument<'a> {
    fn from(doc: &'a DiligenceDocument) -> Self {
        Self {
            id: &doc.id,
            name: &doc.name,
            file_type: &doc.file_type,
            extracted_text: doc.text(),
            link_ingest_status: doc.link_ingest_status,
        }
    }
}

/// Everything that can change a score.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringFingerprintInput<'a> {
    pub company_name: &'a str,
    pub company_url: Option<&'a str>,
    pub company_description: Option<&'a str>,
    pub company_one_liner: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub categorized_notes: &'a [CategorizedNote],
    pub metrics: BTreeMap<&'a str, &'a str>,
    pub documents: Vec<FingerprintDocument<'a>>,
    pub criteria: &'a DiligenceCriteria,
    pub scorer_version: &'a str,
    pub use_web_research: bool,
    pub include_hubspot_context: bool,
}

impl<'a> ScoringFingerprintInput<'a> {
    pub fn from_record(
        record: &'a DiligenceRecord,
        criteria: &'a DiligenceCriteria,
        settings: ScoringSettings,
    ) -> Self {
        Self {
            company_name: &record.company_name,
            company_url: record.company_url.as_deref(),
            company_description: record.company_description.as_deref(),
            company_one_liner: record.company_one_liner.as_deref(),
            notes: record.notes.as_deref(),
            categorized_notes: &record.categorized_notes,
            metrics: record
                .metrics
                .iter()
                .map(|(key, entry)| (key.as_str(), entry.value.as_str()))
                .collect(),
            documents: record.documents.iter().map(FingerprintDocument::from).collect(),
            criteria,
            scorer_version: SCORER_VERSION,
            use_web_research: settings.use_web_research,
            include_hubspot_context: settings.include_hubspot_context,
        }
    }
}

/// Hash the scoring inputs. Never fails: if the input cannot be serialized
/// the result is a one-off value that matches no stored fingerprint, so the
/// caller re-scores.
pub fn build_scoring_fingerprint(input: &ScoringFingerprintInput<'_>) -> String {
    match serde_json::to_vec(input) {
        Ok(bytes) => {
            let digest = Sha256::digest(&bytes);
            let mut hex = hex::encode(digest);
            hex.truncate(FINGERPRINT_HEX_LEN);
            hex
        }
        Err(e) => {
            log::warn!("fingerprint: serialization failed, forcing re-score: {}", e);
            format!("unhashable-{}", uuid::Uuid::new_v4())
        }
    }
}
