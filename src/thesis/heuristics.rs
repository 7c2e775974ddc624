//! Deterministic fallbacks when the model leaves a list empty.

use std::sync::OnceLock;

use regex::Regex;

use super::ThesisContext;
use crate::text::normalize::truncate_at_word;
use crate::types::metric_keys;

struct ConflictRule {
    pattern: Regex,
    tag: &'static str,
    template: &'static str,
}

fn conflict_rules() -> &'static [ConflictRule] {
    static RULES: OnceLock<Vec<ConflictRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |pattern: &str, tag: &'static str, template: &'static str| ConflictRule {
            pattern: Regex::new(pattern).expect("heuristic conflict regex should compile"),
            tag,
            template,
        };
        vec![
            rule(
                r"(?i)\b(?:insurance carrier|licensed (?:insurer|carrier)|underwrit(?:e|es|ing)|risk[- ]bearing|balance[- ]sheet risk|reinsurance|admitted carrier)\b",
                "[dealbreaker:regulated-balance-sheet]",
                "Business appears to carry regulated insurance risk",
            ),
            rule(
                r"(?i)\b(?:consulting|professional services|agency model|implementation services|managed services|services revenue|staff augmentation|done[- ]for[- ]you)\b",
                "[pillar:software-leverage]",
                "Delivery looks services-heavy, limiting software margins",
            ),
            rule(
                r"(?i)\b(?:government agenc(?:y|ies)|public sector|federal|municipal(?:ities)?|state agenc(?:y|ies)|procurement cycles?|govtech|department of defense)\b",
                "[pillar:sales-velocity]",
                "Go-to-market depends on public-sector buyers with long procurement cycles",
            ),
            rule(
                r"(?i)\b(?:proprietary hardware|custom hardware|hardware device|sensors?|iot|manufactur(?:e|es|ing)|firmware|robotics|wearables?)\b",
                "[pillar:capital-efficiency]",
                "Product depends on hardware, raising capital intensity",
            ),
            rule(
                r"(?i)(?:\b(?:fda (?:clearance|approval)|ul certification|iso 26262|faa certification|safety certification|clinical trials?|ce marking)\b|510\(k\))",
                "[dealbreaker:regulatory-timeline]",
                "Path to market requires safety certification",
            ),
        ]
    })
}

/// Tagged conflict bullets synthesized from keyword hits in the record's text.
pub fn heuristic_conflicts(ctx: &ThesisContext<'_>) -> Vec<String> {
    conflict_rules()
        .iter()
        .filter_map(|rule| {
            let hit = rule.pattern.find(&ctx.corpus)?;
            Some(format!(
                "{} {} (mentions \"{}\").",
                rule.tag,
                rule.template,
                hit.as_str().to_lowercase()
            ))
        })
        .collect()
}

/// Why-fit bullets built from structured signals on the record.
pub fn heuristic_why_fits(ctx: &ThesisContext<'_>) -> Vec<String> {
    let record = ctx.record;
    let mut fits = Vec::new();

    let metric_bullets = [
        (metric_keys::ARR, "Reported ARR of"),
        (metric_keys::TAM, "Stated TAM of"),
        (metric_keys::YOY_GROWTH, "Year-over-year growth of"),
        (metric_keys::RUNWAY, "Runway of"),
    ];
    for (key, label) in metric_bullets {
        if let Some(value) = record.metric(key) {
            fits.push(format!("{} {}.", label, value));
        }
    }

    if let Some(one_liner) = record
        .company_one_liner
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        fits.push(format!(
            "Clear positioning: {}",
            truncate_at_word(one_liner, 160)
        ));
    }

    let usable = record.usable_documents().count();
    if usable > 0 {
        fits.push(format!(
            "Supporting materials available ({} usable document{}).",
            usable,
            if usable == 1 { "" } else { "s" }
        ));
    }

    let has_notes = record.notes.as_deref().is_some_and(|n| !n.trim().is_empty())
        || record.categorized_notes.iter().any(|n| !n.text.trim().is_empty());
    if has_notes {
        fits.push("Analyst notes capture first-hand diligence context.".to_string());
    }

    fits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiligenceDocument, DiligenceRecord, MetricEntry, MetricSource};

    fn record_with_notes(notes: &str) -> DiligenceRecord {
        DiligenceRecord {
            id: "r1".to_string(),
            company_name: "Acme".to_string(),
            notes: Some(notes.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_services_and_public_sector_conflicts() {
        let record = record_with_notes(
            "Revenue is mostly professional services. Customers are state agencies with annual procurement cycles.",
        );
        let ctx = ThesisContext::new(&record);
        let conflicts = heuristic_conflicts(&ctx);
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts[0].starts_with("[pillar:software-leverage]"));
        assert!(conflicts[0].contains("professional services"));
        assert!(conflicts[1].starts_with("[pillar:sales-velocity]"));
    }

    #[test]
    fn test_certification_conflict_matches_510k() {
        let record = record_with_notes("The device needs 510(k) clearance before launch.");
        let conflicts = heuristic_conflicts(&ThesisContext::new(&record));
        assert!(conflicts
            .iter()
            .any(|c| c.starts_with("[dealbreaker:regulatory-timeline]")));
    }

    #[test]
    fn test_plain_software_has_no_conflicts() {
        let record = record_with_notes("Workflow software for mid-market logistics teams, sold per seat.");
        assert!(heuristic_conflicts(&ThesisContext::new(&record)).is_empty());
    }

    #[test]
    fn test_why_fits_from_signals() {
        let mut record = record_with_notes("Strong reference calls.");
        record.company_one_liner = Some("Claims automation for brokers".to_string());
        record
            .metrics
            .insert(metric_keys::ARR.to_string(), MetricEntry::new("$1.2M", MetricSource::Manual));
        record
            .metrics
            .insert(metric_keys::TAM.to_string(), MetricEntry::new("unknown", MetricSource::Ai));
        record.documents.push(DiligenceDocument {
            id: "d1".to_string(),
            name: "deck.pdf".to_string(),
            file_type: "pdf".to_string(),
            extracted_text: Some("Deck text".to_string()),
            ..Default::default()
        });

        let fits = heuristic_why_fits(&ThesisContext::new(&record));
        assert_eq!(
            fits,
            vec![
                "Reported ARR of $1.2M.",
                "Clear positioning: Claims automation for brokers",
                "Supporting materials available (1 usable document).",
                "Analyst notes capture first-hand diligence context.",
            ]
        );
    }

    #[test]
    fn test_empty_record_has_no_why_fits() {
        let record = DiligenceRecord::default();
        assert!(heuristic_why_fits(&ThesisContext::new(&record)).is_empty());
    }
}
