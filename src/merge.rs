//! Merge a fresh AI score with the previous one.
//!
//! Analyst overrides (category and criterion level) and hand-edited thesis
//! answers always survive a re-score. The overall is recomputed from
//! effective scores after overrides are re-applied.

use std::collections::HashMap;

use crate::criteria::DiligenceCriteria;
use crate::error::DiligenceError;
use crate::types::{CategoryScore, CriterionScore, DiligenceScore, ScoringMode, ThesisAnswers};

/// Preserved override metadata for one category or criterion.
#[derive(Debug, Clone, PartialEq)]
struct PreservedOverride {
    manual_override: f64,
    override_reason: Option<String>,
    overrided_at: Option<String>,
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `round(Σ(effective × weight) / Σweight)`, or `None` when the weights sum
/// to zero.
pub fn compute_weighted_overall(categories: &[CategoryScore]) -> Option<u32> {
    let total_weight: f64 = categories.iter().map(|c| c.weight).sum();
    if !total_weight.is_finite() || total_weight <= 0.0 {
        return None;
    }
    let weighted: f64 = categories
        .iter()
        .map(|c| c.effective_score() * c.weight)
        .sum();
    let overall = (weighted / total_weight).round();
    if !overall.is_finite() {
        return None;
    }
    Some(overall.clamp(0.0, 100.0) as u32)
}

/// Recompute `score.overall` in place. A zero weight sum keeps the current value.
pub fn recompute_overall(score: &mut DiligenceScore) {
    match compute_weighted_overall(&score.categories) {
        Some(overall) => score.overall = overall,
        None => log::warn!(
            "merge: category weights sum to zero, keeping overall {}",
            score.overall
        ),
    }
}

fn category_overrides(previous: &DiligenceScore) -> HashMap<String, PreservedOverride> {
    previous
        .categories
        .iter()
        .filter_map(|c| {
            c.manual_override.map(|value| {
                (
                    name_key(&c.category),
                    PreservedOverride {
                        manual_override: value,
                        override_reason: c.override_reason.clone(),
                        overrided_at: c.overrided_at.clone(),
                    },
                )
            })
        })
        .collect()
}

fn criterion_overrides(previous: &DiligenceScore) -> HashMap<(String, String), PreservedOverride> {
    let mut map = HashMap::new();
    for category in &previous.categories {
        for criterion in &category.criteria {
            if let Some(value) = criterion.manual_override {
                map.insert(
                    (name_key(&category.category), name_key(&criterion.name)),
                    PreservedOverride {
                        manual_override: value,
                        override_reason: criterion.override_reason.clone(),
                        overrided_at: criterion.overrided_at.clone(),
                    },
                );
            }
        }
    }
    map
}

fn apply_category_override(category: &mut CategoryScore, preserved: &PreservedOverride) {
    category.manual_override = Some(preserved.manual_override);
    category.override_reason = preserved.override_reason.clone();
    category.overrided_at = preserved.overrided_at.clone();
    category.weighted_score = round2(preserved.manual_override * category.weight / 100.0);
}

fn apply_criterion_override(criterion: &mut CriterionScore, preserved: &PreservedOverride) {
    criterion.manual_override = Some(preserved.manual_override);
    criterion.override_reason = preserved.override_reason.clone();
    criterion.overrided_at = preserved.overrided_at.clone();
}

/// Re-apply every override in `previous` onto matching categories and
/// criteria of `fresh`. Categories the analyst never touched keep the AI score.
pub fn preserve_overrides(fresh: &mut DiligenceScore, previous: &DiligenceScore) {
    if previous.categories.is_empty() {
        return;
    }
    let categories = category_overrides(previous);
    let criteria = criterion_overrides(previous);
    for category in fresh.categories.iter_mut() {
        preserve_category(category, &categories, &criteria);
    }
}

fn preserve_category(
    category: &mut CategoryScore,
    categories: &HashMap<String, PreservedOverride>,
    criteria: &HashMap<(String, String), PreservedOverride>,
) {
    let key = name_key(&category.category);
    if let Some(preserved) = categories.get(&key) {
        apply_category_override(category, preserved);
    }
    for criterion in category.criteria.iter_mut() {
        if let Some(preserved) = criteria.get(&(key.clone(), name_key(&criterion.name))) {
            apply_criterion_override(criterion, preserved);
        }
    }
}

fn keep_edited_thesis_answers(fresh: &mut DiligenceScore, previous: &DiligenceScore) {
    if let Some(answers) = previous.thesis_answers.as_ref().filter(|a| a.manually_edited) {
        fresh.thesis_answers = Some(answers.clone());
    }
}

/// Merge a full re-score against the previous score.
pub fn merge_rescored(mut fresh: DiligenceScore, previous: Option<&DiligenceScore>) -> DiligenceScore {
    if let Some(previous) = previous {
        preserve_overrides(&mut fresh, previous);
        keep_edited_thesis_answers(&mut fresh, previous);
        // A zero weight sum falls back to the previous record's overall.
        fresh.overall = previous.overall;
    }
    recompute_overall(&mut fresh);
    fresh.scoring_mode = Some(ScoringMode::Full);
    fresh
}

/// Merge a re-score of a single category into the previous score.
///
/// Only the named category is replaced (or appended if the previous score
/// lacked it); every other category is kept verbatim. Data quality and
/// follow-ups come from the previous score.
pub fn merge_category_rescore(
    previous: &DiligenceScore,
    fresh: DiligenceScore,
    category: &str,
    criteria: &DiligenceCriteria,
) -> Result<DiligenceScore, DiligenceError> {
    let canonical = criteria.require_category(category)?.name.clone();
    let key = name_key(&canonical);

    let mut rescored = fresh
        .categories
        .into_iter()
        .find(|c| name_key(&c.category) == key)
        .ok_or_else(|| {
            DiligenceError::ScoringFailed(format!(
                "Scoring result did not include category {}",
                canonical
            ))
        })?;
    rescored.category = canonical;
    preserve_category(
        &mut rescored,
        &category_overrides(previous),
        &criterion_overrides(previous),
    );

    let mut merged = previous.clone();
    match merged
        .categories
        .iter_mut()
        .find(|c| name_key(&c.category) == key)
    {
        Some(slot) => *slot = rescored,
        None => merged.categories.push(rescored),
    }

    merged.thesis_answers = merge_scoped_thesis_answers(
        previous.thesis_answers.as_ref(),
        fresh.thesis_answers,
    );
    recompute_overall(&mut merged);
    merged.scoring_mode = Some(ScoringMode::Incremental);
    merged.rescore_explanation = None;
    Ok(merged)
}

fn merge_scoped_thesis_answers(
    previous: Option<&ThesisAnswers>,
    fresh: Option<ThesisAnswers>,
) -> Option<ThesisAnswers> {
    match (previous, fresh) {
        (Some(prev), _) if prev.manually_edited => Some(prev.clone()),
        (Some(prev), Some(fresh)) if *prev != fresh => Some(fresh),
        (None, Some(fresh)) => Some(fresh),
        (prev, _) => prev.cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::test_support::sample_criteria;

    fn category(name: &str, weight: f64, score: f64) -> CategoryScore {
        CategoryScore {
            category: name.to_string(),
            weight,
            score,
            weighted_score: round2(score * weight / 100.0),
            ..Default::default()
        }
    }

    fn score(overall: u32, categories: Vec<CategoryScore>) -> DiligenceScore {
        DiligenceScore {
            overall,
            data_quality: 70,
            categories,
            ..Default::default()
        }
    }

    #[test]
    fn test_team_override_survives_rescore() {
        let mut team = category("Team", 50.0, 70.0);
        team.manual_override = Some(85.0);
        team.override_reason = Some("strong founders".to_string());
        team.overrided_at = Some("2026-05-01T10:00:00Z".to_string());
        let previous = score(78, vec![team, category("Market", 50.0, 70.0)]);

        for ai_team in [10.0, 55.0, 99.0] {
            let fresh = score(0, vec![category("team", 50.0, ai_team), category("Market", 50.0, 60.0)]);
            let merged = merge_rescored(fresh, Some(&previous));
            let team = &merged.categories[0];
            assert_eq!(team.manual_override, Some(85.0));
            assert_eq!(team.override_reason.as_deref(), Some("strong founders"));
            assert_eq!(team.overrided_at.as_deref(), Some("2026-05-01T10:00:00Z"));
            assert_eq!(team.score, ai_team);
            assert_eq!(team.weighted_score, 42.5);
            assert_eq!(merged.overall, 73);
        }
    }

    #[test]
    fn test_weighted_overall_uses_effective_scores() {
        let mut overridden = category("Market", 50.0, 20.0);
        overridden.manual_override = Some(60.0);
        let merged = merge_rescored(score(0, vec![category("Team", 50.0, 80.0), overridden]), None);
        assert_eq!(merged.overall, 70);
    }

    #[test]
    fn test_zero_weight_keeps_prior_overall() {
        let fresh = score(64, vec![category("Team", 0.0, 90.0), category("Market", 0.0, 10.0)]);
        let merged = merge_rescored(fresh, Some(&score(55, vec![])));
        assert_eq!(merged.overall, 55);
        assert_eq!(compute_weighted_overall(&merged.categories), None);
    }

    #[test]
    fn test_zero_weight_first_score_keeps_fresh_overall() {
        let fresh = score(64, vec![category("Team", 0.0, 90.0)]);
        assert_eq!(merge_rescored(fresh, None).overall, 64);
    }

    #[test]
    fn test_previous_without_categories_is_noop() {
        let fresh = score(0, vec![category("Team", 100.0, 66.0)]);
        let merged = merge_rescored(fresh, Some(&score(40, vec![])));
        assert_eq!(merged.overall, 66);
        assert_eq!(merged.categories[0].manual_override, None);
    }

    #[test]
    fn test_criterion_override_survives() {
        let mut team = category("Team", 100.0, 70.0);
        team.criteria = vec![CriterionScore {
            name: "Founder-market fit".to_string(),
            score: 60.0,
            manual_override: Some(90.0),
            override_reason: Some("reference calls".to_string()),
            ..Default::default()
        }];
        let previous = score(70, vec![team]);

        let mut fresh_team = category("Team", 100.0, 50.0);
        fresh_team.criteria = vec![CriterionScore {
            name: "founder-market fit".to_string(),
            score: 40.0,
            ..Default::default()
        }];
        let merged = merge_rescored(score(0, vec![fresh_team]), Some(&previous));
        let criterion = &merged.categories[0].criteria[0];
        assert_eq!(criterion.score, 40.0);
        assert_eq!(criterion.manual_override, Some(90.0));
        assert_eq!(criterion.override_reason.as_deref(), Some("reference calls"));
    }

    #[test]
    fn test_manually_edited_thesis_answers_kept() {
        let mut previous = score(50, vec![category("Team", 100.0, 50.0)]);
        previous.thesis_answers = Some(ThesisAnswers {
            company_description: Some("Analyst wording".to_string()),
            manually_edited: true,
            ..Default::default()
        });
        let mut fresh = score(0, vec![category("Team", 100.0, 60.0)]);
        fresh.thesis_answers = Some(ThesisAnswers {
            company_description: Some("Model wording".to_string()),
            ..Default::default()
        });
        let merged = merge_rescored(fresh, Some(&previous));
        assert_eq!(merged.thesis_answers, previous.thesis_answers);
    }

    #[test]
    fn test_unedited_thesis_answers_take_fresh_values() {
        let mut previous = score(50, vec![]);
        previous.thesis_answers = Some(ThesisAnswers {
            company_description: Some("Old".to_string()),
            ..Default::default()
        });
        let mut fresh = score(0, vec![category("Team", 100.0, 60.0)]);
        fresh.thesis_answers = Some(ThesisAnswers {
            company_description: Some("New".to_string()),
            ..Default::default()
        });
        let merged = merge_rescored(fresh, Some(&previous));
        assert_eq!(
            merged.thesis_answers.and_then(|a| a.company_description).as_deref(),
            Some("New")
        );
    }

    #[test]
    fn test_category_rescore_replaces_only_that_category() {
        let mut previous = score(
            0,
            vec![
                category("Team", 40.0, 80.0),
                category("Market", 35.0, 60.0),
                category("Product", 25.0, 40.0),
            ],
        );
        recompute_overall(&mut previous);
        previous.data_quality = 55;

        let mut fresh = score(0, vec![category("market", 35.0, 100.0), category("Team", 40.0, 0.0)]);
        fresh.data_quality = 90;

        let merged = merge_category_rescore(&previous, fresh, "MARKET", &sample_criteria()).expect("merge");
        assert_eq!(merged.categories.len(), 3);
        assert_eq!(merged.categories[0], previous.categories[0]);
        assert_eq!(merged.categories[1].category, "Market");
        assert_eq!(merged.categories[1].score, 100.0);
        assert_eq!(merged.categories[2], previous.categories[2]);
        assert_eq!(merged.data_quality, 55);
        // (80*40 + 100*35 + 40*25) / 100 = 77
        assert_eq!(merged.overall, 77);
        assert_eq!(merged.scoring_mode, Some(ScoringMode::Incremental));
    }

    #[test]
    fn test_category_rescore_unknown_category_errors() {
        let previous = score(50, vec![category("Team", 100.0, 50.0)]);
        let fresh = score(0, vec![category("Moat", 100.0, 90.0)]);
        let err = merge_category_rescore(&previous, fresh, "Moat", &sample_criteria()).unwrap_err();
        assert!(matches!(err, DiligenceError::UnknownCategory(_)));
    }

    #[test]
    fn test_category_rescore_appends_missing_category_and_keeps_override() {
        let mut team = category("Team", 40.0, 80.0);
        team.manual_override = Some(90.0);
        let previous = score(90, vec![team.clone()]);

        let fresh = score(0, vec![category("Product", 25.0, 50.0)]);
        let merged = merge_category_rescore(&previous, fresh, "Product", &sample_criteria()).expect("merge");
        assert_eq!(merged.categories.len(), 2);
        assert_eq!(merged.categories[0], team);
        // (90*40 + 50*25) / 65 = 74.6
        assert_eq!(merged.overall, 75);
    }

    #[test]
    fn test_category_rescore_keeps_override_on_rescored_category() {
        let mut team = category("Team", 40.0, 80.0);
        team.manual_override = Some(30.0);
        team.override_reason = Some("key hire left".to_string());
        let previous = score(30, vec![team]);
        let fresh = score(0, vec![category("Team", 40.0, 95.0)]);
        let merged = merge_category_rescore(&previous, fresh, "Team", &sample_criteria()).expect("merge");
        assert_eq!(merged.categories[0].manual_override, Some(30.0));
        assert_eq!(merged.categories[0].score, 95.0);
        assert_eq!(merged.overall, 30);
    }

    #[test]
    fn test_category_rescore_thesis_answers() {
        let answers = |text: &str, edited: bool| ThesisAnswers {
            why_now: Some(text.to_string()),
            manually_edited: edited,
            ..Default::default()
        };
        assert_eq!(
            merge_scoped_thesis_answers(Some(&answers("old", false)), None),
            Some(answers("old", false))
        );
        assert_eq!(
            merge_scoped_thesis_answers(Some(&answers("old", false)), Some(answers("new", false))),
            Some(answers("new", false))
        );
        assert_eq!(
            merge_scoped_thesis_answers(Some(&answers("old", true)), Some(answers("new", false))),
            Some(answers("old", true))
        );
    }
}
