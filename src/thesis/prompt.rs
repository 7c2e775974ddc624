//! Thesis-fit prompt construction.

use crate::config::LoadedConfig;
use crate::text::normalize::{clean_extracted_text, truncate_at_word};
use crate::types::DiligenceRecord;

/// Characters of cleaned text included per usable document.
const MAX_DOCUMENT_EXCERPT: usize = 2_500;
/// Cap on the combined document excerpts.
const MAX_DOCUMENTS_CONTEXT: usize = 12_000;
const MAX_NOTES_CONTEXT: usize = 4_000;

const CALIBRATION_EXAMPLES: &str = r#"Calibration examples:
- A vertical SaaS company selling workflow software to mid-market operators, with paying customers cited in the deck: on_thesis. Missing churn data is an evidence gap, not a conflict.
- A licensed carrier taking balance-sheet insurance risk: off_thesis with "[dealbreaker:regulated-balance-sheet] ..." in whyNotFit.
- A promising product where the deck omits revenue and team background: mixed. Both omissions belong in evidenceGaps."#;

const RESPONSE_SCHEMA: &str = r#"Respond with a single JSON object:
{
  "fit": "on_thesis" | "mixed" | "off_thesis",
  "confidence": 0-100,
  "whyFits": ["..."],
  "whyNotFit": ["[pillar:<name>] ..." or "[dealbreaker:<name>] ..."],
  "evidenceGaps": ["..."],
  "evidenceAnchors": ["short quotes or facts from the materials"],
  "cruxQuestion": "...",
  "companyDescription": "...",
  "problemSolving": "...",
  "solutionApproach": "..."
}
Rules:
- whyNotFit holds direct conflicts with the thesis only. Tag each with the pillar or dealbreaker it violates.
- Anything you do not know or could not find goes in evidenceGaps, never in whyNotFit.
- Do not call a company off_thesis because information is missing.
- evidenceAnchors must quote or paraphrase concrete evidence from the materials above."#;

/// Wrap untrusted text so the model treats it as data.
fn wrap_user_data(text: &str) -> String {
    format!("<user_data>\n{}\n</user_data>", text.trim())
}

/// Company context block: identity, notes, metrics, and document excerpts.
pub fn build_company_context(record: &DiligenceRecord) -> String {
    let mut facts = vec![format!("Company: {}", record.company_name.trim())];
    if let Some(url) = record.company_url.as_deref().filter(|s| !s.trim().is_empty()) {
        facts.push(format!("Website: {}", url.trim()));
    }
    if let Some(one_liner) = record.company_one_liner.as_deref().filter(|s| !s.trim().is_empty()) {
        facts.push(format!("One-liner: {}", one_liner.trim()));
    }
    if let Some(description) = record
        .company_description
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        facts.push(format!("Description: {}", truncate_at_word(description, 600)));
    }
    for (key, entry) in record.metrics.iter().filter(|(_, m)| m.is_populated()) {
        facts.push(format!("Metric {}: {}", key, entry.value.trim()));
    }

    let mut sections = vec![facts.join("\n")];

    let mut notes = Vec::new();
    if let Some(text) = record.notes.as_deref().filter(|s| !s.trim().is_empty()) {
        notes.push(clean_extracted_text(text));
    }
    for note in record.categorized_notes.iter().filter(|n| !n.text.trim().is_empty()) {
        notes.push(format!("[{}] {}", note.category, clean_extracted_text(&note.text)));
    }
    if !notes.is_empty() {
        sections.push(format!(
            "Analyst notes:\n{}",
            truncate_at_word(&notes.join("\n"), MAX_NOTES_CONTEXT)
        ));
    }

    let mut budget = MAX_DOCUMENTS_CONTEXT;
    let mut excerpts = Vec::new();
    for doc in record.usable_documents() {
        if budget == 0 {
            break;
        }
        let excerpt = truncate_at_word(
            &clean_extracted_text(doc.text()),
            MAX_DOCUMENT_EXCERPT.min(budget),
        );
        if excerpt.is_empty() {
            continue;
        }
        budget = budget.saturating_sub(excerpt.chars().count());
        excerpts.push(format!("--- {} ({}) ---\n{}", doc.name, doc.file_type, excerpt));
    }
    if !excerpts.is_empty() {
        sections.push(format!("Documents:\n{}", excerpts.join("\n\n")));
    }

    sections.join("\n\n")
}

/// Full thesis-fit prompt for one record against the active thesis.
pub fn build_thesis_fit_prompt(record: &DiligenceRecord, config: &LoadedConfig) -> String {
    let mut prompt = String::with_capacity(8192);
    prompt.push_str(
        "You are a venture investor assessing whether a company fits the fund's investment thesis.\n\n",
    );
    prompt.push_str("Investment thesis:\n");
    prompt.push_str(config.thesis_markdown.trim());
    prompt.push_str("\n\nCompany under review:\n");
    prompt.push_str(&wrap_user_data(&build_company_context(record)));
    prompt.push_str("\n\n");
    prompt.push_str(CALIBRATION_EXAMPLES);
    prompt.push_str("\n\n");
    prompt.push_str(RESPONSE_SCHEMA);
    prompt.push('\n');
    prompt
}
