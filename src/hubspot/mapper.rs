//! Maps a diligence record onto HubSpot company and deal properties.

use std::collections::BTreeMap;

use super::HubSpotCompanyData;
use crate::config::HubSpotConfig;
use crate::text::facts::parse_amount_usd;
use crate::text::normalize::{normalize_domain, normalize_key, truncate_at_word};
use crate::types::{metric_keys, DiligenceRecord};

pub type Properties = BTreeMap<String, String>;

const MAX_DESCRIPTION_CHARS: usize = 1_000;

/// Where the company side of a sync should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyTarget {
    /// The record is already linked to this company.
    Linked(String),
    MatchedByDomain(String),
    MatchedByName(String),
    CreateNew,
}

impl CompanyTarget {
    pub fn existing_id(&self) -> Option<&str> {
        match self {
            CompanyTarget::Linked(id)
            | CompanyTarget::MatchedByDomain(id)
            | CompanyTarget::MatchedByName(id) => Some(id),
            CompanyTarget::CreateNew => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CompanyTarget::Linked(_) => "linked",
            CompanyTarget::MatchedByDomain(_) => "domain",
            CompanyTarget::MatchedByName(_) => "name",
            CompanyTarget::CreateNew => "new",
        }
    }
}

fn insert_nonempty(props: &mut Properties, key: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        props.insert(key.to_string(), value.to_string());
    }
}

fn format_amount(value: f64) -> String {
    format!("{:.0}", value.round())
}

pub fn build_company_properties(record: &DiligenceRecord) -> Properties {
    let mut props = Properties::new();
    insert_nonempty(&mut props, "name", Some(record.company_name.as_str()));
    if let Some(url) = record.company_url.as_deref() {
        insert_nonempty(&mut props, "domain", normalize_domain(url).as_deref());
        insert_nonempty(&mut props, "website", Some(url));
    }
    let description = record
        .company_description
        .as_deref()
        .or(record.company_one_liner.as_deref())
        .map(|d| truncate_at_word(d, MAX_DESCRIPTION_CHARS));
    insert_nonempty(&mut props, "description", description.as_deref());
    if let Some(arr) = record.metric(metric_keys::ARR).and_then(parse_amount_usd) {
        props.insert("annualrevenue".to_string(), format_amount(arr));
    }
    props
}

pub fn deal_name(record: &DiligenceRecord) -> String {
    format!("{} - Diligence", record.company_name.trim())
}

pub fn build_deal_properties(record: &DiligenceRecord, config: &HubSpotConfig) -> Properties {
    let mut props = Properties::new();
    props.insert("dealname".to_string(), deal_name(record));
    insert_nonempty(&mut props, "pipeline", Some(config.pipeline_id.as_str()));
    insert_nonempty(&mut props, "dealstage", config.deal_stage_id.as_deref());
    if let Some(amount) = record
        .metric(metric_keys::FUNDING_AMOUNT)
        .and_then(parse_amount_usd)
    {
        props.insert("amount".to_string(), format_amount(amount));
    }

    if let Some(score) = &record.score {
        props.insert("diligence_score".to_string(), score.overall.to_string());
        props.insert(
            "diligence_data_quality".to_string(),
            score.data_quality.to_string(),
        );
    }
    if let Some(fit) = &record.thesis_fit {
        props.insert("thesis_fit".to_string(), fit.fit.as_str().to_string());
        props.insert("thesis_fit_confidence".to_string(), fit.confidence.to_string());
        insert_nonempty(&mut props, "thesis_crux_question", Some(fit.crux_question.as_str()));
    }
    if let Some(committed) = record.metric(metric_keys::COMMITTED_AMOUNT) {
        props.insert("committed_amount".to_string(), committed.to_string());
    }
    props
}

/// Labels of required fields missing from the mapped properties.
pub fn evaluate_required_fields(company: &Properties, deal: &Properties) -> Vec<&'static str> {
    let required = [
        ("Company name", company.get("name")),
        ("Company domain", company.get("domain")),
        ("Pipeline", deal.get("pipeline")),
        ("Deal stage", deal.get("dealstage")),
        ("Amount", deal.get("amount")),
    ];
    required
        .into_iter()
        .filter(|(_, value)| value.map_or(true, |v| v.trim().is_empty()))
        .map(|(label, _)| label)
        .collect()
}

/// Pick the company to update: the linked id, else a search candidate whose
/// domain matches, else one whose name matches, else a new company.
pub fn resolve_company_target(
    record: &DiligenceRecord,
    candidates: &[HubSpotCompanyData],
) -> CompanyTarget {
    if let Some(id) = record
        .hubspot_company_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        return CompanyTarget::Linked(id.to_string());
    }

    if let Some(domain) = record.company_url.as_deref().and_then(normalize_domain) {
        if let Some(hit) = candidates.iter().find(|c| {
            c.domain.as_deref().and_then(normalize_domain).as_deref() == Some(domain.as_str())
        }) {
            return CompanyTarget::MatchedByDomain(hit.id.clone());
        }
    }

    let name = normalize_key(&record.company_name);
    if !name.is_empty() {
        if let Some(hit) = candidates
            .iter()
            .find(|c| c.name.as_deref().map(normalize_key).as_deref() == Some(name.as_str()))
        {
            return CompanyTarget::MatchedByName(hit.id.clone());
        }
    }

    CompanyTarget::CreateNew
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiligenceScore, MetricEntry, MetricSource};

    fn record() -> DiligenceRecord {
        let mut record = DiligenceRecord {
            id: "r1".to_string(),
            company_name: "Acme, Inc.".to_string(),
            company_url: Some("https://www.acme.io/".to_string()),
            company_one_liner: Some("Claims intake automation".to_string()),
            score: Some(DiligenceScore {
                overall: 72,
                data_quality: 64,
                ..Default::default()
            }),
            ..Default::default()
        };
        record.metrics.insert(
            metric_keys::FUNDING_AMOUNT.to_string(),
            MetricEntry::new("$1.5M", MetricSource::Extracted),
        );
        record
    }

    fn config() -> HubSpotConfig {
        HubSpotConfig {
            deal_stage_id: Some("qualifiedtobuy".to_string()),
            ..HubSpotConfig::default()
        }
    }

    fn candidate(id: &str, name: &str, domain: Option<&str>) -> HubSpotCompanyData {
        HubSpotCompanyData {
            id: id.to_string(),
            name: Some(name.to_string()),
            domain: domain.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_company_properties() {
        let props = build_company_properties(&record());
        assert_eq!(props["name"], "Acme, Inc.");
        assert_eq!(props["domain"], "acme.io");
        assert_eq!(props["description"], "Claims intake automation");
        assert!(!props.contains_key("annualrevenue"));
    }

    #[test]
    fn test_deal_properties() {
        let props = build_deal_properties(&record(), &config());
        assert_eq!(props["dealname"], "Acme, Inc. - Diligence");
        assert_eq!(props["pipeline"], "default");
        assert_eq!(props["dealstage"], "qualifiedtobuy");
        assert_eq!(props["amount"], "1500000");
        assert_eq!(props["diligence_score"], "72");
    }

    #[test]
    fn test_required_fields() {
        let record = record();
        let company = build_company_properties(&record);
        let deal = build_deal_properties(&record, &config());
        assert!(evaluate_required_fields(&company, &deal).is_empty());

        let mut bare = DiligenceRecord {
            company_name: "Acme".to_string(),
            ..Default::default()
        };
        bare.metrics.insert(
            metric_keys::FUNDING_AMOUNT.to_string(),
            MetricEntry::new("not disclosed", MetricSource::Ai),
        );
        let missing = evaluate_required_fields(
            &build_company_properties(&bare),
            &build_deal_properties(&bare, &HubSpotConfig::default()),
        );
        assert_eq!(missing, vec!["Company domain", "Deal stage", "Amount"]);
    }

    #[test]
    fn test_resolve_prefers_linked_then_domain_then_name() {
        let mut linked = record();
        linked.hubspot_company_id = Some("99".to_string());
        let candidates = vec![
            candidate("1", "Acme Inc", None),
            candidate("2", "Acme Holdings", Some("https://acme.io")),
        ];
        assert_eq!(resolve_company_target(&linked, &candidates), CompanyTarget::Linked("99".into()));

        let record = record();
        assert_eq!(
            resolve_company_target(&record, &candidates),
            CompanyTarget::MatchedByDomain("2".into())
        );
        assert_eq!(
            resolve_company_target(&record, &candidates[..1]),
            CompanyTarget::MatchedByName("1".into())
        );
        assert_eq!(resolve_company_target(&record, &[]), CompanyTarget::CreateNew);
    }
}
