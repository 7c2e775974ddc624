//! Post-processing of model thesis-fit output into a [`ThesisFitResult`].
//!
//! Pipeline: split conflicts from gaps, fill empty lists from heuristics,
//! prune noise, infer the fit label, calibrate confidence, settle the crux
//! question, and build snapshot text. Pure function of its inputs.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use super::heuristics::{heuristic_conflicts, heuristic_why_fits};
use super::response::{dedupe_bullets, RawThesisFit};
use super::snapshot::build_snapshot;
use super::ThesisContext;
use crate::types::{metric_keys, ThesisFit, ThesisFitResult};

const MAX_BULLETS: usize = 6;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

fn re_conflict_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[\s*(?:pillar|dealbreaker)\s*:[^\]]*\]")
            .expect("conflict tag regex should compile")
    })
}

fn re_strong_conflict() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:off[- ]thesis|outside (?:our|the) thesis|misaligned with|conflicts? with (?:our|the) thesis|no (?:clear |defensible )?moat|weak founder[- ]market fit|consumer marketplace|two[- ]sided marketplace|consumer[- ]facing|services[- ]heavy|consulting[- ]led|capital[- ]intensive|hardware[- ]dependent|regulated insurance|balance[- ]sheet risk|government (?:buyers|contracts|procurement)|commoditi[sz]ed|crypto(?:currency)?|dealbreaker)\b",
        )
        .expect("strong conflict regex should compile")
    })
}

fn re_missingness() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:unknown|unclear|uncertain|not (?:yet )?(?:provided|specified|disclosed|available|mentioned|shared|clear|known|verified)|insufficient|limited (?:information|data|detail|details|evidence|visibility)|lack(?:s|ing)? (?:of )?(?:information|data|detail|details|evidence|visibility)|no (?:information|data|details|evidence) (?:on|about|regarding)|missing|unverified|tbd|to be determined|needs? (?:more|further) (?:information|diligence|detail))\b",
        )
        .expect("missingness regex should compile")
    })
}

fn re_anti_conflict() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:no indication|does not appear to be|doesn't appear to be|does not seem to be|not an? (?:consumer|services|hardware|marketplace) (?:business|company|model)|no (?:obvious|clear|apparent|direct) (?:conflict|misalignment)|not (?:obviously|clearly) (?:off[- ]thesis|misaligned)|no red flags?)\b",
        )
        .expect("anti-conflict regex should compile")
    })
}

fn re_founder_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:founders?|founding team|team|management|leadership|ceo|cto)\b")
            .expect("founder reference regex should compile")
    })
}

fn re_founder_signal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:co-?founder|founder|ceo|cto|founding team|previously (?:at|founded|led)|ex-[a-z]+|linkedin\.com/in)\b",
        )
        .expect("founder signal regex should compile")
    })
}

fn re_financial_metric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(arr|tam|sam|som|acv)\b").expect("financial metric regex should compile")
    })
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A bullet is a genuine conflict only when it is tagged or uses strong
/// conflict language, and talks neither about missing information nor
/// denies the conflict.
pub fn is_genuine_conflict(bullet: &str) -> bool {
    (re_conflict_tag().is_match(bullet) || re_strong_conflict().is_match(bullet))
        && !re_missingness().is_match(bullet)
        && !re_anti_conflict().is_match(bullet)
}

/// Split raw why-not-fit bullets into (conflicts, reclassified gaps).
pub fn split_conflicts_and_gaps(why_not_fit: &[String]) -> (Vec<String>, Vec<String>) {
    why_not_fit
        .iter()
        .cloned()
        .partition(|bullet| is_genuine_conflict(bullet))
}

fn is_founder_boilerplate(bullet: &str) -> bool {
    re_founder_reference().is_match(bullet) && re_missingness().is_match(bullet)
}

fn metric_key_for(term: &str) -> Option<&'static str> {
    match term.to_ascii_lowercase().as_str() {
        "arr" => Some(metric_keys::ARR),
        "tam" => Some(metric_keys::TAM),
        "sam" => Some(metric_keys::SAM),
        "som" => Some(metric_keys::SOM),
        "acv" => Some(metric_keys::ACV),
        _ => None,
    }
}

/// A financial gap is stale when every metric it mentions is already
/// populated on the record.
fn is_stale_financial_gap(bullet: &str, ctx: &ThesisContext<'_>) -> bool {
    let keys: Vec<&str> = re_financial_metric()
        .captures_iter(bullet)
        .filter_map(|caps| metric_key_for(&caps[1]))
        .collect();
    !keys.is_empty() && keys.iter().all(|k| ctx.record.has_metric(k))
}

/// Drop boilerplate and already-answered bullets from conflicts and gaps.
pub fn prune_noise(
    conflicts: Vec<String>,
    gaps: Vec<String>,
    ctx: &ThesisContext<'_>,
) -> (Vec<String>, Vec<String>) {
    let founder_evidence = ctx.has_usable_documents() || re_founder_signal().is_match(&ctx.corpus);
    let keep = |bullet: &String| {
        !re_anti_conflict().is_match(bullet)
            && !(founder_evidence && is_founder_boilerplate(bullet))
    };
    let conflicts = conflicts.into_iter().filter(|b| keep(b)).collect();
    let gaps = gaps
        .into_iter()
        .filter(|b| keep(b))
        .filter(|b| !is_stale_financial_gap(b, ctx))
        .collect();
    (conflicts, gaps)
}

/// Trust a valid model label, except that off-thesis needs at least one
/// genuine conflict; without one the label drops to mixed.
pub fn infer_fit(model_fit: Option<ThesisFit>, conflicts: usize, why_fits: usize) -> ThesisFit {
    match model_fit {
        Some(ThesisFit::OffThesis) if conflicts == 0 => ThesisFit::Mixed,
        Some(fit) => fit,
        None if conflicts >= 3 && why_fits <= 1 => ThesisFit::OffThesis,
        None if conflicts == 0 && why_fits >= 2 => ThesisFit::OnThesis,
        None => ThesisFit::Mixed,
    }
}

/// Evidence-count signal used to spread model confidence.
pub fn structural_confidence(
    anchors: usize,
    why_fits: usize,
    why_not_fit: usize,
    gaps: usize,
    fit: ThesisFit,
) -> f64 {
    let score = 35.0 + 8.0 * anchors.min(6) as f64 + 4.0 * why_fits.min(4) as f64
        + 4.0 * why_not_fit.min(4) as f64
        - 5.0 * gaps.min(5) as f64
        - if fit == ThesisFit::Mixed { 6.0 } else { 0.0 };
    score.clamp(0.0, 100.0)
}

/// `0.6 × model + 0.4 × structural`, rounded into 0–100. Without a model
/// confidence the structural score stands alone.
pub fn calibrate_confidence(model_confidence: Option<f64>, structural: f64) -> u32 {
    let blended = match model_confidence.filter(|c| c.is_finite()) {
        Some(raw) => 0.6 * raw.clamp(0.0, 100.0) + 0.4 * structural,
        None => structural,
    };
    blended.round().clamp(0.0, 100.0) as u32
}

fn strip_tag(bullet: &str) -> String {
    re_conflict_tag()
        .replace_all(bullet, "")
        .trim()
        .trim_end_matches(['.', ';'])
        .to_string()
}

/// The model's crux question if usable, otherwise one derived from the
/// strongest available signal.
pub fn synthesize_crux(
    model_crux: Option<&str>,
    conflicts: &[String],
    gaps: &[String],
    why_fits: &[String],
    company_name: &str,
) -> String {
    if let Some(crux) = model_crux.map(str::trim).filter(|c| c.len() > 8) {
        return crux.to_string();
    }
    let name = if company_name.is_empty() { "the company" } else { company_name };
    if let Some(conflict) = conflicts.first() {
        return format!(
            "Can {} credibly resolve this thesis conflict: {}?",
            name,
            strip_tag(conflict)
        );
    }
    if !gaps.is_empty() {
        return format!(
            "Which missing datapoint would most change our conviction on {}?",
            name
        );
    }
    if let Some(fit) = why_fits.first() {
        return format!(
            "How durable is this advantage for {}: {}?",
            name,
            fit.trim_end_matches(['.', ';'])
        );
    }
    format!("What evidence would confirm {} fits the thesis?", name)
}

/// Classify raw model output for one record.
pub fn classify_thesis_fit(raw: &RawThesisFit, ctx: &ThesisContext<'_>) -> ThesisFitResult {
    let (mut conflicts, reclassified) = split_conflicts_and_gaps(&raw.why_not_fit);
    let mut gaps = dedupe_bullets(raw.evidence_gaps.iter().cloned().chain(reclassified));

    if conflicts.is_empty() {
        conflicts = heuristic_conflicts(ctx);
        if !conflicts.is_empty() {
            log::debug!("thesis_fit: {} heuristic conflicts for {}", conflicts.len(), ctx.record.id);
        }
    }

    let mut why_fits = raw.why_fits.clone();
    if why_fits.is_empty() {
        why_fits = heuristic_why_fits(ctx);
    }

    (conflicts, gaps) = prune_noise(conflicts, gaps, ctx);
    conflicts.truncate(MAX_BULLETS);
    gaps.truncate(MAX_BULLETS);
    why_fits.truncate(MAX_BULLETS);
    let mut anchors = raw.evidence_anchors.clone();
    anchors.truncate(MAX_BULLETS);

    let fit = infer_fit(raw.fit, conflicts.len(), why_fits.len());
    let structural = structural_confidence(
        anchors.len(),
        why_fits.len(),
        conflicts.len(),
        gaps.len(),
        fit,
    );
    let confidence = calibrate_confidence(raw.confidence, structural);
    let crux_question = synthesize_crux(
        raw.crux_question.as_deref(),
        &conflicts,
        &gaps,
        &why_fits,
        ctx.company_name(),
    );
    let snapshot = build_snapshot(raw, ctx);

    ThesisFitResult {
        fit,
        confidence,
        why_fits,
        why_not_fit: conflicts,
        evidence_gaps: gaps,
        evidence_anchors: anchors,
        crux_question,
        company_description: snapshot.company_description,
        problem_solving: snapshot.problem_solving,
        solution_approach: snapshot.solution_approach,
        computed_at: Some(Utc::now().to_rfc3339()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiligenceDocument, DiligenceRecord, MetricEntry, MetricSource};

    fn bare_record() -> DiligenceRecord {
        DiligenceRecord {
            id: "r1".to_string(),
            company_name: "Acme".to_string(),
            ..Default::default()
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missingness_bullet_becomes_gap() {
        let bullet = "Founder backgrounds unclear due to limited information";
        assert!(!is_genuine_conflict(bullet));
        let (conflicts, gaps) = split_conflicts_and_gaps(&strings(&[bullet]));
        assert!(conflicts.is_empty());
        assert_eq!(gaps, vec![bullet]);
    }

    #[test]
    fn test_tagged_and_strong_bullets_are_conflicts() {
        assert!(is_genuine_conflict("[pillar:software-leverage] Heavy implementation work"));
        assert!(is_genuine_conflict("Consumer marketplace with thin take rates"));
        assert!(!is_genuine_conflict("No indication this is a consumer marketplace"));
        assert!(!is_genuine_conflict("Unclear whether there is a moat"));
        assert!(!is_genuine_conflict("Sales cycle could be long"));
    }

    #[test]
    fn test_off_thesis_on_gaps_alone_downgrades_to_mixed() {
        let record = bare_record();
        let ctx = ThesisContext::new(&record);
        let raw = RawThesisFit {
            fit: Some(ThesisFit::OffThesis),
            confidence: Some(80.0),
            why_not_fit: strings(&[
                "Revenue figures not provided",
                "Customer count unknown",
                "Go-to-market motion unclear",
            ]),
            ..Default::default()
        };
        let result = classify_thesis_fit(&raw, &ctx);
        assert!(result.why_not_fit.is_empty());
        assert_eq!(result.evidence_gaps.len(), 3);
        assert_eq!(result.fit, ThesisFit::Mixed);
    }

    #[test]
    fn test_off_thesis_kept_with_real_conflict() {
        assert_eq!(infer_fit(Some(ThesisFit::OffThesis), 1, 0), ThesisFit::OffThesis);
        assert_eq!(infer_fit(Some(ThesisFit::OffThesis), 0, 0), ThesisFit::Mixed);
    }

    #[test]
    fn test_off_thesis_without_conflicts_or_gaps_is_mixed() {
        let record = bare_record();
        let ctx = ThesisContext::new(&record);
        let raw = RawThesisFit {
            fit: Some(ThesisFit::OffThesis),
            confidence: Some(80.0),
            ..Default::default()
        };
        let result = classify_thesis_fit(&raw, &ctx);
        assert!(result.why_not_fit.is_empty());
        assert_eq!(result.fit, ThesisFit::Mixed);
    }

    #[test]
    fn test_fit_rule_without_model_label() {
        assert_eq!(infer_fit(None, 3, 1), ThesisFit::OffThesis);
        assert_eq!(infer_fit(None, 0, 2), ThesisFit::OnThesis);
        assert_eq!(infer_fit(None, 1, 2), ThesisFit::Mixed);
        assert_eq!(infer_fit(None, 3, 2), ThesisFit::Mixed);
    }

    #[test]
    fn test_confidence_always_in_bounds() {
        let fits = [ThesisFit::OnThesis, ThesisFit::Mixed, ThesisFit::OffThesis];
        for anchors in [0, 3, 12] {
            for counts in [0, 2, 9] {
                for gaps in [0, 5, 20] {
                    for fit in fits {
                        let structural = structural_confidence(anchors, counts, counts, gaps, fit);
                        for raw in [None, Some(0.0), Some(55.5), Some(100.0), Some(f64::NAN)] {
                            let c = calibrate_confidence(raw, structural);
                            assert!(c <= 100, "confidence {} out of range", c);
                        }
                    }
                }
            }
        }
        // 35 - 25 - 6 = 4 with nothing but gaps
        assert_eq!(structural_confidence(0, 0, 0, 5, ThesisFit::Mixed), 4.0);
        assert_eq!(structural_confidence(6, 4, 4, 0, ThesisFit::OnThesis), 100.0);
        assert_eq!(calibrate_confidence(Some(70.0), 50.0), 62);
        assert_eq!(calibrate_confidence(None, 47.0), 47);
    }

    #[test]
    fn test_heuristic_conflicts_fill_empty_model_list() {
        let mut record = bare_record();
        record.notes = Some("Roughly 60% of revenue is professional services.".to_string());
        let ctx = ThesisContext::new(&record);
        let result = classify_thesis_fit(&RawThesisFit::default(), &ctx);
        assert_eq!(result.why_not_fit.len(), 1);
        assert!(result.why_not_fit[0].starts_with("[pillar:software-leverage]"));
        assert!(result.crux_question.starts_with("Can Acme credibly resolve this thesis conflict: Delivery looks services-heavy"));
    }

    #[test]
    fn test_founder_boilerplate_pruned_when_documents_exist() {
        let mut record = bare_record();
        record.documents.push(DiligenceDocument {
            id: "d1".to_string(),
            name: "deck.pdf".to_string(),
            file_type: "pdf".to_string(),
            extracted_text: Some("Team slide".to_string()),
            ..Default::default()
        });
        let ctx = ThesisContext::new(&record);
        let (conflicts, gaps) = prune_noise(
            vec![],
            strings(&["Founder information missing", "Pricing model unclear"]),
            &ctx,
        );
        assert!(conflicts.is_empty());
        assert_eq!(gaps, vec!["Pricing model unclear"]);
    }

    #[test]
    fn test_founder_boilerplate_kept_without_evidence() {
        let record = bare_record();
        let ctx = ThesisContext::new(&record);
        let (_, gaps) = prune_noise(vec![], strings(&["Founder information missing"]), &ctx);
        assert_eq!(gaps.len(), 1);
    }

    #[test]
    fn test_financial_gap_pruned_when_metric_populated() {
        let mut record = bare_record();
        record
            .metrics
            .insert(metric_keys::ARR.to_string(), MetricEntry::new("$2M", MetricSource::Manual));
        let ctx = ThesisContext::new(&record);
        let (_, gaps) = prune_noise(
            vec![],
            strings(&["ARR not disclosed", "ARR and TAM unknown", "Churn unknown"]),
            &ctx,
        );
        assert_eq!(gaps, vec!["ARR and TAM unknown", "Churn unknown"]);
    }

    #[test]
    fn test_crux_priorities() {
        let conflicts = strings(&["[dealbreaker:regulated-balance-sheet] Carries underwriting risk."]);
        let gaps = strings(&["Churn unknown"]);
        let fits = strings(&["Reported ARR of $2M."]);
        assert_eq!(
            synthesize_crux(None, &conflicts, &gaps, &fits, "Acme"),
            "Can Acme credibly resolve this thesis conflict: Carries underwriting risk?"
        );
        assert_eq!(
            synthesize_crux(None, &[], &gaps, &fits, "Acme"),
            "Which missing datapoint would most change our conviction on Acme?"
        );
        assert_eq!(
            synthesize_crux(None, &[], &[], &fits, "Acme"),
            "How durable is this advantage for Acme: Reported ARR of $2M?"
        );
        assert_eq!(
            synthesize_crux(Some("Will brokers pay per seat?"), &conflicts, &gaps, &fits, "Acme"),
            "Will brokers pay per seat?"
        );
    }

    #[test]
    fn test_classify_on_thesis_record() {
        let mut record = bare_record();
        record.company_one_liner = Some("Workflow software for freight brokers".to_string());
        let ctx = ThesisContext::new(&record);
        let raw = RawThesisFit {
            fit: Some(ThesisFit::OnThesis),
            confidence: Some(75.0),
            why_fits: strings(&["Vertical workflow SaaS", "Clear buyer"]),
            evidence_anchors: strings(&["Deck p.4: 40 paying brokers"]),
            ..Default::default()
        };
        let result = classify_thesis_fit(&raw, &ctx);
        assert_eq!(result.fit, ThesisFit::OnThesis);
        assert!(result.why_not_fit.is_empty());
        // structural 35 + 8 + 8 = 51; 0.6*75 + 0.4*51 = 65.4
        assert_eq!(result.confidence, 65);
        assert!(result.computed_at.is_some());
    }
}
