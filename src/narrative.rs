//! Plain-text explanation of what a re-score changed.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::types::{CriterionScore, DiligenceScore};

const TOP_N: usize = 3;
const WEAK_SCORE_BELOW: f64 = 70.0;
const WEAK_CONFIDENCE_BELOW: f64 = 50.0;
const UNSUPPORTED_EVIDENCE_PENALTY: f64 = 12.0;
const MISSING_CONFIDENCE: f64 = 50.0;

pub struct NarrativeInput<'a> {
    pub previous: Option<&'a DiligenceScore>,
    /// The model's score before overrides were re-applied.
    pub ai_score: &'a DiligenceScore,
    pub final_score: &'a DiligenceScore,
    pub new_documents: usize,
    pub founder_questions: &'a [String],
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDelta {
    pub category: String,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeakCriterion<'a> {
    pub category: &'a str,
    pub criterion: &'a CriterionScore,
    pub materiality: f64,
}

/// Signed change in effective score for categories present in both scores,
/// largest moves first. Unchanged categories are left out.
pub fn category_deltas(previous: &DiligenceScore, current: &DiligenceScore) -> Vec<CategoryDelta> {
    let mut deltas: Vec<CategoryDelta> = current
        .categories
        .iter()
        .filter_map(|cat| {
            let before = previous.category(&cat.category)?;
            let delta = cat.effective_score() - before.effective_score();
            (delta.abs() > f64::EPSILON).then(|| CategoryDelta {
                category: cat.category.clone(),
                delta,
            })
        })
        .collect();
    deltas.sort_by(|a, b| {
        b.delta
            .abs()
            .partial_cmp(&a.delta.abs())
            .unwrap_or(Ordering::Equal)
    });
    deltas.truncate(TOP_N);
    deltas
}

/// `(100 − score) × weight/100 + 12·[unknown|contradicted] + max(0, 70 − confidence)/5`
pub fn materiality(criterion: &CriterionScore, category_weight: f64) -> f64 {
    let shortfall = (100.0 - criterion.effective_score()) * (category_weight / 100.0);
    let evidence = match criterion.evidence_status {
        Some(status) if status.is_unsupported() => UNSUPPORTED_EVIDENCE_PENALTY,
        _ => 0.0,
    };
    let confidence = criterion.confidence.unwrap_or(MISSING_CONFIDENCE);
    shortfall + evidence + (70.0 - confidence).max(0.0) / 5.0
}

fn is_weak(criterion: &CriterionScore) -> bool {
    criterion.effective_score() < WEAK_SCORE_BELOW
        || criterion.evidence_status.is_some_and(|s| s.is_unsupported())
        || criterion.confidence.is_some_and(|c| c < WEAK_CONFIDENCE_BELOW)
}

/// The most decision-relevant weak criteria across all categories.
pub fn rank_weak_criteria(score: &DiligenceScore) -> Vec<WeakCriterion<'_>> {
    let mut weak: Vec<WeakCriterion<'_>> = score
        .categories
        .iter()
        .flat_map(|cat| {
            cat.criteria
                .iter()
                .filter(|c| is_weak(c))
                .map(move |c| WeakCriterion {
                    category: &cat.category,
                    criterion: c,
                    materiality: materiality(c, cat.weight),
                })
        })
        .collect();
    weak.sort_by(|a, b| {
        b.materiality
            .partial_cmp(&a.materiality)
            .unwrap_or(Ordering::Equal)
    });
    weak.truncate(TOP_N);
    weak
}

/// Up to three distinct follow-ups: the score's own, then the weak
/// criteria's, then the standing founder questions.
pub fn select_follow_ups(
    score: &DiligenceScore,
    weak: &[WeakCriterion<'_>],
    founder_questions: &[String],
) -> Vec<String> {
    let mut seen = HashSet::new();
    score
        .follow_up_questions
        .iter()
        .chain(weak.iter().flat_map(|w| w.criterion.follow_up_questions.iter()))
        .chain(founder_questions.iter())
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(TOP_N)
        .map(str::to_string)
        .collect()
}

pub fn build_rescore_narrative(input: &NarrativeInput<'_>) -> String {
    let final_score = input.final_score;
    let mut lines = Vec::new();

    let docs = match input.new_documents {
        0 => "no new documents".to_string(),
        1 => "1 new document".to_string(),
        n => format!("{} new documents", n),
    };

    match input.previous {
        Some(previous) => {
            lines.push(format!(
                "Re-scored with {}. Overall {} -> {} (AI {}). Data quality {} -> {}.",
                docs,
                previous.overall,
                final_score.overall,
                input.ai_score.overall,
                previous.data_quality,
                final_score.data_quality
            ));
            let deltas = category_deltas(previous, final_score);
            if !deltas.is_empty() {
                let moves: Vec<String> = deltas
                    .iter()
                    .map(|d| format!("{} {:+.0}", d.category, d.delta))
                    .collect();
                lines.push(format!("Biggest moves: {}.", moves.join(", ")));
            }
        }
        None => lines.push(format!(
            "First score with {}. Overall {} (AI {}). Data quality {}.",
            docs, final_score.overall, input.ai_score.overall, final_score.data_quality
        )),
    }

    let weak = rank_weak_criteria(final_score);
    if !weak.is_empty() {
        let items: Vec<String> = weak
            .iter()
            .map(|w| {
                let mut item = format!(
                    "{} ({}) {:.0}/100",
                    w.criterion.name,
                    w.category,
                    w.criterion.effective_score()
                );
                if let Some(status) = w.criterion.evidence_status.filter(|s| s.is_unsupported()) {
                    item.push_str(&format!(", evidence {:?}", status).to_lowercase());
                }
                item
            })
            .collect();
        lines.push(format!("Most material gaps: {}.", items.join("; ")));
    }

    let follow_ups = select_follow_ups(final_score, &weak, input.founder_questions);
    if !follow_ups.is_empty() {
        let numbered: Vec<String> = follow_ups
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}) {}", i + 1, q))
            .collect();
        lines.push(format!("Follow-ups: {}", numbered.join(" ")));
    }

    lines.join("\n")
}
