//! Decoding of the thesis-fit model response.
//!
//! Models return JSON with inconsistent key casing, bullets as strings or
//! objects, and confidence as a number, a percent string, or a fraction.
//! Everything is coerced here so the classifier only sees clean lists.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::DiligenceError;
use crate::types::ThesisFit;

/// Model output after defensive coercion. Missing or malformed fields are
/// empty rather than errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawThesisFit {
    pub fit: Option<ThesisFit>,
    /// Normalized to 0–100.
    pub confidence: Option<f64>,
    pub why_fits: Vec<String>,
    pub why_not_fit: Vec<String>,
    pub evidence_gaps: Vec<String>,
    pub evidence_anchors: Vec<String>,
    pub crux_question: Option<String>,
    pub company_description: Option<String>,
    pub problem_solving: Option<String>,
    pub solution_approach: Option<String>,
}

impl RawThesisFit {
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        Self {
            fit: field(obj, &["fit", "thesisFit", "thesis_fit", "label"])
                .and_then(Value::as_str)
                .and_then(ThesisFit::parse),
            confidence: field(obj, &["confidence", "confidenceScore", "confidence_score"])
                .and_then(coerce_confidence),
            why_fits: string_list(field(obj, &["whyFits", "why_fits", "whyFit", "why_fit"])),
            why_not_fit: string_list(field(
                obj,
                &["whyNotFit", "why_not_fit", "whyNotFits", "why_not_fits", "conflicts"],
            )),
            evidence_gaps: string_list(field(obj, &["evidenceGaps", "evidence_gaps", "gaps"])),
            evidence_anchors: string_list(field(
                obj,
                &["evidenceAnchors", "evidence_anchors", "anchors"],
            )),
            crux_question: optional_text(field(obj, &["cruxQuestion", "crux_question", "crux"])),
            company_description: optional_text(field(
                obj,
                &["companyDescription", "company_description"],
            )),
            problem_solving: optional_text(field(obj, &["problemSolving", "problem_solving"])),
            solution_approach: optional_text(field(
                obj,
                &["solutionApproach", "solution_approach"],
            )),
        }
    }
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| obj.get(*name))
        .filter(|v| !v.is_null())
}

fn coerce_confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let scaled = if raw <= 1.0 { raw * 100.0 } else { raw };
    Some(scaled.min(100.0))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => ["text", "bullet", "reason", "summary", "value"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(value_text)
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
}

/// Strip list markers ("- ", "* ", "• ", "1. ", "2) ") and collapse spaces.
pub fn clean_bullet(raw: &str) -> String {
    let mut text = raw.trim();
    loop {
        let before = text;
        text = text.trim_start_matches(['-', '*', '•', '–', '·']).trim_start();
        let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 && digits < 3 {
            let rest = &text[digits..];
            if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
                if stripped.is_empty() || stripped.starts_with(char::is_whitespace) {
                    text = stripped.trim_start();
                }
            }
        }
        if text == before {
            break;
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Coerce an array, a single string, or a newline-separated block into
/// distinct non-empty bullets.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
        Some(Value::String(s)) => s.lines().map(str::to_string).collect(),
        Some(other) => value_text(other).into_iter().collect(),
        None => Vec::new(),
    };
    dedupe_bullets(items.iter().map(|s| clean_bullet(s)))
}

/// Drop empties and case-insensitive duplicates, keeping first occurrence.
pub fn dedupe_bullets(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

/// First JSON object in a model completion. Each `{` is tried as the start
/// of a value, so code fences, leading prose and stray braces fall away;
/// trailing text after a complete object is ignored.
fn first_json_object(response: &str) -> Option<Value> {
    response
        .match_indices('{')
        .find_map(|(start, _)| {
            serde_json::Deserializer::from_str(&response[start..])
                .into_iter::<Value>()
                .next()
                .and_then(Result::ok)
        })
        .filter(Value::is_object)
}

/// Decode a raw thesis-fit completion.
pub fn parse_thesis_fit_response(response: &str) -> Result<RawThesisFit, DiligenceError> {
    let value = first_json_object(response).ok_or_else(|| {
        DiligenceError::ParseError("No JSON object found in thesis-fit response".into())
    })?;
    Ok(RawThesisFit::from_value(&value))
}
