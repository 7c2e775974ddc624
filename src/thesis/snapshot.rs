//! Company snapshot text: description, problem, and solution.
//!
//! Each field is taken from the first acceptable source in this order:
//! structured facts document, model output, prior thesis answers, sentences
//! mined from notes and documents, then a fixed fallback sentence.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use super::response::RawThesisFit;
use super::ThesisContext;
use crate::text::normalize::{
    clean_extracted_text, extract_clean_sentences, is_placeholder_value, normalize_domain,
    normalize_key, truncate_at_word,
};

const MAX_SNAPSHOT_CHARS: usize = 320;
const MINED_SENTENCE_SCAN: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotText {
    pub company_description: String,
    pub problem_solving: String,
    pub solution_approach: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotField {
    Description,
    Problem,
    Solution,
}

fn re_unknownish() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:unknown|unclear|tbd|to be determined|insufficient (?:information|data)|no (?:information|data|details)(?: available)?|not (?:provided|mentioned|clear|known))\b",
        )
        .expect("unknownish regex should compile")
    })
}

fn re_description_sentence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:builds|provides|offers|develops|is an?|helps|enables|platform for|company that)\b")
            .expect("description regex should compile")
    })
}

fn re_problem_sentence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:problem|pain|struggl\w*|challeng\w*|inefficien\w*|manual(?:ly)?|costly|broken|fragmented|wast\w*|lack of|time[- ]consuming|error[- ]prone|bottleneck\w*)\b",
        )
        .expect("problem regex should compile")
    })
}

fn re_solution_sentence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:solution|platform|automat\w*|software|api|workflow|we (?:build|built|use|provide)|leverag\w*|machine learning|ai[- ]powered|integrat\w*)\b",
        )
        .expect("solution regex should compile")
    })
}

/// Words that carry no information about what a company does.
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "its", "their", "of", "for", "and", "by", "with", "to", "in",
    "on", "provides", "offers", "builds", "develops", "platform", "company", "solution",
    "solutions", "product", "products", "service", "services", "software", "app", "inc", "llc",
    "ltd", "corp", "co", "www", "com", "io", "ai", "http", "https",
];

/// True when the text says nothing beyond the company's own name or domain.
pub fn is_vacuous(text: &str, company_name: &str, company_url: Option<&str>) -> bool {
    let mut ignored: HashSet<String> = FILLER_WORDS.iter().map(|w| w.to_string()).collect();
    let identity = [Some(company_name.to_string()), company_url.and_then(normalize_domain)];
    for value in identity.iter().flatten() {
        for token in value.split(|c: char| !c.is_alphanumeric()) {
            let key = normalize_key(token);
            if !key.is_empty() {
                ignored.insert(key);
            }
        }
        ignored.insert(normalize_key(value));
    }

    !text
        .split(|c: char| !c.is_alphanumeric())
        .map(normalize_key)
        .filter(|t| !t.is_empty())
        .any(|t| !ignored.contains(&t))
}

fn accept(candidate: Option<&str>, ctx: &ThesisContext<'_>) -> Option<String> {
    let cleaned = clean_extracted_text(candidate?);
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if is_placeholder_value(&cleaned) || re_unknownish().is_match(&cleaned) {
        return None;
    }
    if is_vacuous(&cleaned, ctx.company_name(), ctx.record.company_url.as_deref()) {
        return None;
    }
    Some(truncate_at_word(&cleaned, MAX_SNAPSHOT_CHARS))
}

/// `key: value` lines from any structured facts document on the record.
fn structured_facts(ctx: &ThesisContext<'_>) -> HashMap<String, String> {
    let mut facts = HashMap::new();
    let docs = ctx
        .record
        .documents
        .iter()
        .filter(|d| d.file_type.trim().eq_ignore_ascii_case("facts"));
    for doc in docs {
        for line in doc.text().lines() {
            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim();
                if !value.is_empty() {
                    facts.entry(normalize_key(key)).or_insert_with(|| value.to_string());
                }
            }
        }
    }
    facts
}

fn fact_keys(field: SnapshotField) -> &'static [&'static str] {
    match field {
        SnapshotField::Description => &["companydescription", "description", "overview"],
        SnapshotField::Problem => &["problemsolving", "problem"],
        SnapshotField::Solution => &["solutionapproach", "solution", "approach"],
    }
}

fn mined_sentence(field: SnapshotField, ctx: &ThesisContext<'_>) -> Option<String> {
    let pattern = match field {
        SnapshotField::Description => re_description_sentence(),
        SnapshotField::Problem => re_problem_sentence(),
        SnapshotField::Solution => re_solution_sentence(),
    };
    extract_clean_sentences(&ctx.corpus, MINED_SENTENCE_SCAN)
        .into_iter()
        .filter(|s| pattern.is_match(s))
        .find_map(|s| accept(Some(&s), ctx))
}

fn fallback(field: SnapshotField, name: &str) -> String {
    let name = if name.is_empty() { "This company" } else { name };
    match field {
        SnapshotField::Description => format!(
            "{} has not yet shared enough material for a reliable company description.",
            name
        ),
        SnapshotField::Problem => format!(
            "The customer problem {} targets still needs to be confirmed with the founders.",
            name
        ),
        SnapshotField::Solution => format!(
            "How {} solves that problem still needs to be confirmed with the founders.",
            name
        ),
    }
}

fn resolve_field(
    field: SnapshotField,
    raw: &RawThesisFit,
    facts: &HashMap<String, String>,
    ctx: &ThesisContext<'_>,
) -> String {
    let prior = ctx.record.score.as_ref().and_then(|s| s.thesis_answers.as_ref());
    let (model, previous) = match field {
        SnapshotField::Description => (
            raw.company_description.as_deref(),
            prior.and_then(|a| a.company_description.as_deref()),
        ),
        SnapshotField::Problem => (
            raw.problem_solving.as_deref(),
            prior.and_then(|a| a.problem_solving.as_deref()),
        ),
        SnapshotField::Solution => (
            raw.solution_approach.as_deref(),
            prior.and_then(|a| a.solution_approach.as_deref()),
        ),
    };

    fact_keys(field)
        .iter()
        .find_map(|k| accept(facts.get(*k).map(String::as_str), ctx))
        .or_else(|| accept(model, ctx))
        .or_else(|| accept(previous, ctx))
        .or_else(|| mined_sentence(field, ctx))
        .unwrap_or_else(|| fallback(field, ctx.company_name()))
}

pub fn build_snapshot(raw: &RawThesisFit, ctx: &ThesisContext<'_>) -> SnapshotText {
    let facts = structured_facts(ctx);
    SnapshotText {
        company_description: resolve_field(SnapshotField::Description, raw, &facts, ctx),
        problem_solving: resolve_field(SnapshotField::Problem, raw, &facts, ctx),
        solution_approach: resolve_field(SnapshotField::Solution, raw, &facts, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiligenceDocument, DiligenceRecord, DiligenceScore, ThesisAnswers};

    fn record() -> DiligenceRecord {
        DiligenceRecord {
            id: "r1".to_string(),
            company_name: "Acme".to_string(),
            company_url: Some("https://www.acme.io".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_vacuous_detection() {
        assert!(is_vacuous("Acme provides the Acme platform", "Acme", Some("acme.io")));
        assert!(is_vacuous("acme.io", "Acme", Some("https://acme.io")));
        assert!(!is_vacuous("Acme automates claims intake for brokers", "Acme", None));
    }

    #[test]
    fn test_facts_document_wins_over_model() {
        let mut record = record();
        record.documents.push(DiligenceDocument {
            id: "facts".to_string(),
            name: "Structured facts".to_string(),
            file_type: "facts".to_string(),
            extracted_text: Some(
                "Company Description: Claims intake automation for commercial brokers\nProblem: unknown"
                    .to_string(),
            ),
            ..Default::default()
        });
        let ctx = ThesisContext::new(&record);
        let raw = RawThesisFit {
            company_description: Some("Model description of claims software".to_string()),
            problem_solving: Some("Brokers rekey every claim by hand.".to_string()),
            ..Default::default()
        };
        let snapshot = build_snapshot(&raw, &ctx);
        assert_eq!(
            snapshot.company_description,
            "Claims intake automation for commercial brokers"
        );
        assert_eq!(snapshot.problem_solving, "Brokers rekey every claim by hand.");
    }

    #[test]
    fn test_vacuous_model_text_falls_through_to_prior_answers() {
        let mut record = record();
        record.score = Some(DiligenceScore {
            thesis_answers: Some(ThesisAnswers {
                company_description: Some("Underwriting copilot for specialty MGAs".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let ctx = ThesisContext::new(&record);
        let raw = RawThesisFit {
            company_description: Some("Acme provides the Acme platform".to_string()),
            ..Default::default()
        };
        let snapshot = build_snapshot(&raw, &ctx);
        assert_eq!(
            snapshot.company_description,
            "Underwriting copilot for specialty MGAs"
        );
    }

    #[test]
    fn test_mined_sentences_then_fallback() {
        let mut record = record();
        record.notes = Some(
            "Brokers struggle with manual claims intake across carriers. We spoke with the CEO last week about hiring."
                .to_string(),
        );
        let ctx = ThesisContext::new(&record);
        let raw = RawThesisFit {
            problem_solving: Some("Not specified".to_string()),
            ..Default::default()
        };
        let snapshot = build_snapshot(&raw, &ctx);
        assert_eq!(
            snapshot.problem_solving,
            "Brokers struggle with manual claims intake across carriers."
        );
        assert!(snapshot.solution_approach.starts_with("How Acme solves"));
    }
}
