//! Re-score and thesis-fit pipelines.
//!
//! A re-score validates the request, refreshes link documents, and skips
//! when nothing scoring-relevant changed. Otherwise it gathers best-effort
//! research, calls the scoring model, merges the result with the analyst's
//! overrides, and persists it, with an optional push to HubSpot at the end.
//! Only validation, storage, and the scoring call itself can fail a
//! re-score; every other collaborator is best-effort.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::config::{ConfigStore, LoadedConfig};
use crate::error::DiligenceError;
use crate::fingerprint::{build_scoring_fingerprint, ScoringFingerprintInput};
use crate::hubspot::HubSpotCompanyData;
use crate::merge::{merge_category_rescore, merge_rescored};
use crate::narrative::{build_rescore_narrative, NarrativeInput};
use crate::provider::{
    CompanyMetadata, DiligenceStore, DocumentIngestor, EnrichmentProvider, HubSpotSync,
    RecordPatch, ScoringModel, ScoringRequest, ThesisModel,
};
use crate::text::facts::{extract_committed_amount, extract_funding_amount, extract_tam};
use crate::text::normalize::{
    is_low_quality_extracted_link_content, is_placeholder_value, normalize_committed_candidate,
    normalize_funding_candidate, normalize_tam_candidate,
};
use crate::thesis::classify::classify_thesis_fit;
use crate::thesis::prompt::build_thesis_fit_prompt;
use crate::thesis::response::parse_thesis_fit_response;
use crate::thesis::ThesisContext;
use crate::types::{
    metric_keys, DiligenceDocument, DiligenceRecord, LinkIngestStatus, MetricEntry, MetricSource,
    ScoringMode, ScoringSettings, ThesisFitResult,
};

// =============================================================================
// Request / response
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescoreRequest {
    #[serde(default)]
    pub diligence_id: String,
    /// Score even when the fingerprint matches.
    #[serde(default)]
    pub force_full: bool,
    /// Re-score only this category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Overrides the configured scoring settings for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ScoringSettings>,
}

impl RescoreRequest {
    pub fn new(diligence_id: impl Into<String>) -> Self {
        Self {
            diligence_id: diligence_id.into(),
            ..Default::default()
        }
    }

    pub fn force_full(mut self) -> Self {
        self.force_full = true;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescoreResponse {
    pub success: bool,
    pub skipped: bool,
    pub message: String,
    pub record: DiligenceRecord,
    pub document_warnings: Vec<String>,
    pub new_documents: usize,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_mode: Option<ScoringMode>,
    pub hubspot_synced: bool,
}

// =============================================================================
// Link refresh
// =============================================================================

struct LinkRefresh {
    documents: Vec<DiligenceDocument>,
    attempted: usize,
}

/// Re-ingest every link that needs it, concurrently. Each outcome lands on
/// its own document; one failure never aborts the others.
async fn refresh_link_documents(
    ingestor: &Arc<dyn DocumentIngestor>,
    documents: &[DiligenceDocument],
) -> LinkRefresh {
    let mut documents = documents.to_vec();
    let mut set = JoinSet::new();

    for (idx, doc) in documents.iter().enumerate() {
        if !doc.needs_reingestion() {
            continue;
        }
        let ingestor = Arc::clone(ingestor);
        let doc = doc.clone();
        set.spawn(async move {
            let outcome = ingestor.ingest_link(&doc).await;
            (idx, outcome)
        });
    }
    let attempted = set.len();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Ok(text))) => {
                let doc = &mut documents[idx];
                doc.extracted_text = Some(text);
                doc.link_ingest_status = Some(LinkIngestStatus::Ingested);
                doc.link_ingest_message = None;
            }
            Ok((idx, Err(e))) => {
                let doc = &mut documents[idx];
                log::warn!("rescore: link ingestion failed for {}: {}", doc.name, e);
                doc.link_ingest_status = Some(LinkIngestStatus::Failed);
                doc.link_ingest_message = Some(e.to_string());
            }
            Err(e) => log::warn!("rescore: link ingestion task aborted: {}", e),
        }
    }

    LinkRefresh {
        documents,
        attempted,
    }
}

/// "<name>: <message>" for every document the scorer cannot use, in
/// document order, capped at `max`.
pub fn document_warnings(documents: &[DiligenceDocument], max: usize) -> Vec<String> {
    documents
        .iter()
        .filter_map(|doc| {
            let message = if doc.is_link() {
                match doc.link_ingest_status {
                    Some(LinkIngestStatus::Failed) => doc
                        .link_ingest_message
                        .clone()
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| "link ingestion failed".to_string()),
                    Some(LinkIngestStatus::Ingested)
                        if is_low_quality_extracted_link_content(doc.text()) =>
                    {
                        "linked page returned too little readable content".to_string()
                    }
                    Some(LinkIngestStatus::Ingested) => return None,
                    _ => "link has not been ingested".to_string(),
                }
            } else if doc.text().trim().is_empty() {
                "no text could be extracted".to_string()
            } else {
                return None;
            };
            Some(format!("{}: {}", doc.name, message))
        })
        .take(max)
        .collect()
}

// =============================================================================
// Metric merge
// =============================================================================

/// Gate a model- or extractor-reported value through its key's normalizer.
fn gate_metric_value(key: &str, raw: &str) -> String {
    match key {
        metric_keys::FUNDING_AMOUNT => normalize_funding_candidate(raw),
        metric_keys::COMMITTED_AMOUNT => normalize_committed_candidate(raw),
        metric_keys::TAM => normalize_tam_candidate(raw),
        _ if is_placeholder_value(raw) => String::new(),
        _ => raw.trim().to_string(),
    }
}

/// Fold model-reported metrics into the record's metrics. Manual entries
/// are never overwritten and placeholders never land.
pub fn merge_metrics(
    existing: &BTreeMap<String, MetricEntry>,
    reported: &BTreeMap<String, String>,
) -> BTreeMap<String, MetricEntry> {
    let mut merged = existing.clone();
    for (key, raw) in reported {
        let value = gate_metric_value(key, raw);
        if value.is_empty() {
            continue;
        }
        match merged.get(key) {
            Some(entry) if entry.source == MetricSource::Manual => continue,
            Some(entry) if entry.value.trim() == value => continue,
            _ => {
                merged.insert(key.clone(), MetricEntry::new(value, MetricSource::Ai));
            }
        }
    }
    merged
}

/// Notes plus usable document text, for fact extraction.
fn fact_corpus(record: &DiligenceRecord) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(notes) = record.notes.as_deref() {
        parts.push(notes);
    }
    parts.extend(record.categorized_notes.iter().map(|n| n.text.as_str()));
    parts.extend(record.usable_documents().map(|d| d.text()));
    parts.join("\n")
}

/// Extract funding, committed, and TAM facts the record still lacks.
pub fn backfill_facts(record: &DiligenceRecord, metrics: &mut BTreeMap<String, MetricEntry>) {
    let extractors: [(&str, fn(&str) -> String); 3] = [
        (metric_keys::FUNDING_AMOUNT, extract_funding_amount),
        (metric_keys::COMMITTED_AMOUNT, extract_committed_amount),
        (metric_keys::TAM, extract_tam),
    ];
    let missing: Vec<_> = extractors
        .into_iter()
        .filter(|(key, _)| match metrics.get(*key) {
            Some(entry) => entry.source != MetricSource::Manual && !entry.is_populated(),
            None => true,
        })
        .collect();
    if missing.is_empty() {
        return;
    }

    let corpus = fact_corpus(record);
    if corpus.trim().is_empty() {
        return;
    }
    for (key, extract) in missing {
        let value = extract(&corpus);
        if value.is_empty() {
            continue;
        }
        log::debug!("rescore: extracted {} = {} for {}", key, value, record.id);
        let mut entry = MetricEntry::new(value, MetricSource::Extracted);
        entry.source_detail = Some("notes and documents".to_string());
        metrics.insert(key.to_string(), entry);
    }
}

fn fill_if_missing(current: Option<&str>, proposed: Option<&str>) -> Option<String> {
    if current.is_some_and(|c| !c.trim().is_empty()) {
        return None;
    }
    proposed
        .map(str::trim)
        .filter(|p| !is_placeholder_value(p))
        .map(str::to_string)
}

// =============================================================================
// Research
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Research {
    Team,
    PortfolioSynergy,
    ProblemNecessity,
}

impl Research {
    const ALL: [Research; 3] = [
        Research::Team,
        Research::PortfolioSynergy,
        Research::ProblemNecessity,
    ];

    fn label(self) -> &'static str {
        match self {
            Research::Team => "team research",
            Research::PortfolioSynergy => "portfolio synergy research",
            Research::ProblemNecessity => "problem necessity research",
        }
    }

    async fn fetch(
        self,
        provider: &dyn EnrichmentProvider,
        record: &DiligenceRecord,
    ) -> Result<Option<String>, DiligenceError> {
        match self {
            Research::Team => provider.team_research(record).await,
            Research::PortfolioSynergy => provider.portfolio_synergy_research(record).await,
            Research::ProblemNecessity => provider.problem_necessity_research(record).await,
        }
    }

    fn apply(self, record: &mut DiligenceRecord, text: String) -> RecordPatch {
        let mut patch = RecordPatch::default();
        match self {
            Research::Team => {
                record.team_research = Some(text.clone());
                patch.team_research = Some(text);
            }
            Research::PortfolioSynergy => {
                record.portfolio_synergy_research = Some(text.clone());
                patch.portfolio_synergy_research = Some(text);
            }
            Research::ProblemNecessity => {
                record.problem_necessity_research = Some(text.clone());
                patch.problem_necessity_research = Some(text);
            }
        }
        patch
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs re-scores and thesis-fit classification against injected
/// collaborators.
pub struct Rescorer {
    store: Arc<dyn DiligenceStore>,
    ingestor: Arc<dyn DocumentIngestor>,
    scorer: Arc<dyn ScoringModel>,
    config: Arc<ConfigStore>,
    enrichment: Option<Arc<dyn EnrichmentProvider>>,
    hubspot: Option<Arc<dyn HubSpotSync>>,
    thesis_model: Option<Arc<dyn ThesisModel>>,
}

impl Rescorer {
    pub fn new(
        store: Arc<dyn DiligenceStore>,
        ingestor: Arc<dyn DocumentIngestor>,
        scorer: Arc<dyn ScoringModel>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            store,
            ingestor,
            scorer,
            config,
            enrichment: None,
            hubspot: None,
            thesis_model: None,
        }
    }

    pub fn with_enrichment(mut self, enrichment: Arc<dyn EnrichmentProvider>) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub fn with_hubspot(mut self, hubspot: Arc<dyn HubSpotSync>) -> Self {
        self.hubspot = Some(hubspot);
        self
    }

    pub fn with_thesis_model(mut self, model: Arc<dyn ThesisModel>) -> Self {
        self.thesis_model = Some(model);
        self
    }

    async fn load(&self, diligence_id: &str) -> Result<DiligenceRecord, DiligenceError> {
        self.store
            .load_record(diligence_id)
            .await?
            .ok_or_else(|| DiligenceError::RecordNotFound(diligence_id.to_string()))
    }

    pub async fn rescore(&self, request: &RescoreRequest) -> Result<RescoreResponse, DiligenceError> {
        let diligence_id = request.diligence_id.trim();
        if diligence_id.is_empty() {
            return Err(DiligenceError::MissingDiligenceId);
        }
        let config = self.config.snapshot();
        let category = match request.category.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                Some(config.criteria.require_category(name)?.name.clone())
            }
            _ => None,
        };
        let settings = request.settings.unwrap_or(config.config.scoring);
        let mut record = self.load(diligence_id).await?;

        let refresh = refresh_link_documents(&self.ingestor, &record.documents).await;
        if refresh.attempted > 0 {
            log::info!(
                "rescore: re-ingested {} link(s) for {}",
                refresh.attempted,
                diligence_id
            );
            record = self
                .store
                .update_record(
                    diligence_id,
                    RecordPatch {
                        documents: Some(refresh.documents),
                        ..Default::default()
                    },
                )
                .await?;
        }
        let warnings = document_warnings(&record.documents, config.config.max_document_warnings);

        let fingerprint = build_scoring_fingerprint(&ScoringFingerprintInput::from_record(
            &record,
            &config.criteria,
            settings,
        ));
        let new_documents = record.new_documents_since_last_score();
        let unchanged = record
            .score
            .as_ref()
            .and_then(|s| s.scoring_input_fingerprint.as_deref())
            == Some(fingerprint.as_str());

        if unchanged && new_documents == 0 && !request.force_full && category.is_none() {
            log::info!("rescore: inputs unchanged for {}, skipping", diligence_id);
            return Ok(RescoreResponse {
                success: true,
                skipped: true,
                message: "No scoring inputs changed since the last score; re-score skipped."
                    .to_string(),
                record,
                document_warnings: warnings,
                new_documents,
                fingerprint,
                scoring_mode: None,
                hubspot_synced: false,
            });
        }

        if settings.use_web_research {
            self.gather_research(&mut record).await;
        }
        let hubspot_company = if settings.include_hubspot_context {
            self.hubspot_context(&record).await
        } else {
            None
        };

        let scoring_request = self.build_scoring_request(
            &record,
            &config,
            settings,
            hubspot_company,
            category.clone(),
        );
        log::info!(
            "rescore: scoring {} ({} usable documents, category {})",
            diligence_id,
            scoring_request.document_texts.len(),
            category.as_deref().unwrap_or("all")
        );
        let outcome = self.scorer.score(&scoring_request).await.map_err(|e| {
            log::warn!("rescore: scoring failed for {}: {}", diligence_id, e);
            match e {
                DiligenceError::ScoringFailed(_) => e,
                other => DiligenceError::ScoringFailed(other.to_string()),
            }
        })?;

        let ai_score = outcome.score.clone();
        let mut final_score = match (category.as_deref(), record.score.as_ref()) {
            (Some(name), Some(previous)) => {
                merge_category_rescore(previous, outcome.score, name, &config.criteria)?
            }
            (Some(name), None) => {
                log::info!(
                    "rescore: {} has no previous score, scoring {} as a full score",
                    diligence_id,
                    name
                );
                merge_rescored(outcome.score, None)
            }
            (None, previous) => merge_rescored(outcome.score, previous),
        };

        let mut metrics = merge_metrics(&record.metrics, &outcome.metrics);
        backfill_facts(&record, &mut metrics);
        let CompanyMetadata {
            description,
            one_liner,
        } = outcome.company_metadata;
        let company_description =
            fill_if_missing(record.company_description.as_deref(), description.as_deref());
        let company_one_liner =
            fill_if_missing(record.company_one_liner.as_deref(), one_liner.as_deref());

        // The stored fingerprint covers what this score leaves behind, so an
        // untouched record skips next time.
        let mut scored = record.clone();
        scored.metrics = metrics.clone();
        if company_description.is_some() {
            scored.company_description = company_description.clone();
        }
        if company_one_liner.is_some() {
            scored.company_one_liner = company_one_liner.clone();
        }
        let stored_fingerprint = build_scoring_fingerprint(&ScoringFingerprintInput::from_record(
            &scored,
            &config.criteria,
            settings,
        ));

        final_score.scoring_input_fingerprint = Some(stored_fingerprint.clone());
        final_score.scored_at = Some(Utc::now().to_rfc3339());
        final_score.rescore_explanation = Some(build_rescore_narrative(&NarrativeInput {
            previous: record.score.as_ref(),
            ai_score: &ai_score,
            final_score: &final_score,
            new_documents,
            founder_questions: &config.config.founder_questions,
        }));
        let scoring_mode = final_score.scoring_mode;
        let previous_overall = record.score.as_ref().map(|s| s.overall);
        let overall = final_score.overall;

        let mut record = self
            .store
            .update_record(
                diligence_id,
                RecordPatch {
                    score: Some(final_score),
                    metrics: Some(metrics),
                    company_description,
                    company_one_liner,
                    ..Default::default()
                },
            )
            .await?;

        let message = match previous_overall {
            Some(previous) => format!("Re-scored: overall {} -> {}.", previous, overall),
            None => format!("Scored: overall {}.", overall),
        };
        log::info!("rescore: {} {}", diligence_id, message);

        let hubspot_synced = if config.config.hubspot.sync_on_rescore {
            self.sync_hubspot(&mut record).await
        } else {
            false
        };

        Ok(RescoreResponse {
            success: true,
            skipped: false,
            message,
            record,
            document_warnings: warnings,
            new_documents,
            fingerprint: stored_fingerprint,
            scoring_mode,
            hubspot_synced,
        })
    }

    /// Run each research call in turn, persisting each result as it lands.
    async fn gather_research(&self, record: &mut DiligenceRecord) {
        let Some(provider) = self.enrichment.as_deref() else {
            return;
        };
        for research in Research::ALL {
            let text = match research.fetch(provider, record).await {
                Ok(Some(text)) if !text.trim().is_empty() => text,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("rescore: {} failed for {}: {}", research.label(), record.id, e);
                    continue;
                }
            };
            let patch = research.apply(record, text);
            if let Err(e) = self.store.update_record(&record.id, patch).await {
                log::warn!(
                    "rescore: failed to persist {} for {}: {}",
                    research.label(),
                    record.id,
                    e
                );
            }
        }
    }

    async fn hubspot_context(&self, record: &DiligenceRecord) -> Option<HubSpotCompanyData> {
        let hubspot = self.hubspot.as_deref()?;
        let company_id = record
            .hubspot_company_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())?;
        match hubspot.fetch_company(company_id).await {
            Ok(company) => company,
            Err(e) => {
                log::warn!(
                    "rescore: HubSpot company refresh failed for {}: {}",
                    record.id,
                    e
                );
                None
            }
        }
    }

    fn build_scoring_request(
        &self,
        record: &DiligenceRecord,
        config: &LoadedConfig,
        settings: ScoringSettings,
        hubspot_company_data: Option<HubSpotCompanyData>,
        category: Option<String>,
    ) -> ScoringRequest {
        let research = |text: &Option<String>| {
            if settings.use_web_research {
                text.clone().filter(|t| !t.trim().is_empty())
            } else {
                None
            }
        };
        ScoringRequest {
            document_texts: record
                .usable_documents()
                .map(|d| d.text().to_string())
                .collect(),
            criteria: config.criteria.clone(),
            company_name: record.company_name.clone(),
            company_url: record.company_url.clone(),
            notes: record.notes.clone(),
            categorized_notes: record.categorized_notes.clone(),
            questions: config.config.founder_questions.clone(),
            hubspot_company_data,
            team_research: research(&record.team_research),
            portfolio_synergy_research: research(&record.portfolio_synergy_research),
            problem_necessity_research: research(&record.problem_necessity_research),
            metrics: record
                .metrics
                .iter()
                .filter(|(_, m)| m.is_populated())
                .map(|(k, m)| (k.clone(), m.value.trim().to_string()))
                .collect(),
            previous_score: record.score.clone(),
            existing_thesis_answers: record.score.as_ref().and_then(|s| s.thesis_answers.clone()),
            settings,
            category,
        }
    }

    /// Push the record to HubSpot. Failures are logged and reported as
    /// `false`, never as an error.
    async fn sync_hubspot(&self, record: &mut DiligenceRecord) -> bool {
        let Some(hubspot) = self.hubspot.as_deref() else {
            log::warn!("rescore: HubSpot sync enabled but no client configured");
            return false;
        };
        let result = match hubspot.sync_record(record).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("rescore: HubSpot sync failed for {}: {}", record.id, e);
                return false;
            }
        };
        let patch = RecordPatch {
            hubspot_company_id: Some(result.company_id),
            hubspot_deal_id: Some(result.deal_id),
            hubspot_synced_at: Some(Utc::now().to_rfc3339()),
            ..Default::default()
        };
        match self.store.update_record(&record.id, patch).await {
            Ok(updated) => *record = updated,
            Err(e) => log::warn!(
                "rescore: failed to persist HubSpot ids for {}: {}",
                record.id,
                e
            ),
        }
        true
    }

    /// Classify a record against the active thesis and persist the result.
    pub async fn run_thesis_fit(&self, diligence_id: &str) -> Result<ThesisFitResult, DiligenceError> {
        let diligence_id = diligence_id.trim();
        if diligence_id.is_empty() {
            return Err(DiligenceError::MissingDiligenceId);
        }
        let model = self.thesis_model.as_deref().ok_or_else(|| {
            DiligenceError::ConfigurationError("No thesis model configured".to_string())
        })?;
        let config = self.config.snapshot();
        let record = self.load(diligence_id).await?;

        let prompt = build_thesis_fit_prompt(&record, &config);
        let response = model.complete(&prompt).await?;
        let raw = parse_thesis_fit_response(&response)?;
        let result = classify_thesis_fit(&raw, &ThesisContext::new(&record));
        log::info!(
            "thesis_fit: {} classified {} ({}% confidence, {} conflicts, {} gaps)",
            diligence_id,
            result.fit.as_str(),
            result.confidence,
            result.why_not_fit.len(),
            result.evidence_gaps.len()
        );

        self.store
            .update_record(
                diligence_id,
                RecordPatch {
                    thesis_fit: Some(result.clone()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(result)
    }
}
