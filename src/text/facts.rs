//! Monetary fact extraction from free text.
//!
//! Each fact type is an ordered list of regex patterns (most specific first)
//! plus a set of context rules. Every match from every pattern becomes a
//! candidate; the sentence around it is scored against the rules and the
//! highest score wins, earliest position breaking ties. First-match regex
//! alone tends to grab roadmap numbers ("$5M Series A in Q1 2026") instead
//! of the round actually being raised.

use std::sync::OnceLock;

use regex::Regex;

use super::normalize::{
    normalize_committed_candidate, normalize_funding_candidate, normalize_tam_candidate,
};

/// Dollar amount with an optional magnitude suffix.
const AMOUNT: &str = r"\$\s?\d+(?:[.,]\d+)*(?:\s?(?:mm|[kmb]|million|billion|thousand)\b)?";

/// Context reaches at most this many bytes either side of the match.
const CONTEXT_REACH: usize = 60;

/// A scored match for one fact.
#[derive(Debug, Clone, PartialEq)]
pub struct FactCandidate {
    pub value: String,
    /// Byte offset of the amount in the source text.
    pub position: usize,
    pub score: i32,
}

struct ContextRule {
    pattern: Regex,
    weight: i32,
}

/// Patterns and context rules for one fact type.
struct FactExtractor {
    patterns: Vec<Regex>,
    rules: Vec<ContextRule>,
}

impl FactExtractor {
    fn compile(patterns: &[&str], rules: &[(&str, i32)]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| {
                    Regex::new(&p.replace("{AMOUNT}", AMOUNT))
                        .expect("fact pattern should compile")
                })
                .collect(),
            rules: rules
                .iter()
                .map(|(p, weight)| ContextRule {
                    pattern: Regex::new(p).expect("context rule should compile"),
                    weight: *weight,
                })
                .collect(),
        }
    }

    /// All matches across all patterns, one candidate per position.
    fn candidates(&self, text: &str) -> Vec<FactCandidate> {
        let mut found: Vec<FactCandidate> = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(amount) = caps.get(1) else {
                    continue;
                };
                let value = tidy_amount(amount.as_str());
                if value.is_empty() || found.iter().any(|c| c.position == amount.start()) {
                    continue;
                }
                let context = context_around(text, amount.start(), amount.end());
                found.push(FactCandidate {
                    value,
                    position: amount.start(),
                    score: self.score_context(context),
                });
            }
        }
        found
    }

    fn score_context(&self, context: &str) -> i32 {
        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(context))
            .map(|rule| rule.weight)
            .sum()
    }

    fn best(&self, text: &str) -> Option<FactCandidate> {
        pick_best(self.candidates(text))
    }
}

/// Highest score wins; ties go to the earliest position.
pub fn pick_best(candidates: Vec<FactCandidate>) -> Option<FactCandidate> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(b) if b.score > candidate.score => Some(b),
        Some(b) if b.score == candidate.score && b.position <= candidate.position => Some(b),
        _ => Some(candidate),
    })
}

/// The sentence containing `[start, end)`, clipped to `CONTEXT_REACH` bytes
/// either side.
fn context_around(text: &str, start: usize, end: usize) -> &str {
    let bytes = text.as_bytes();
    let floor = start.saturating_sub(CONTEXT_REACH);
    let mut s = start;
    while s > floor {
        let prev = bytes[s - 1];
        if prev == b'\n' {
            break;
        }
        if s >= 2 && prev.is_ascii_whitespace() && matches!(bytes[s - 2], b'.' | b'!' | b'?') {
            break;
        }
        s -= 1;
    }
    while !text.is_char_boundary(s) {
        s += 1;
    }

    let ceiling = (end + CONTEXT_REACH).min(bytes.len());
    let mut e = end;
    while e < ceiling {
        let b = bytes[e];
        if b == b'\n' {
            break;
        }
        if matches!(b, b'.' | b'!' | b'?')
            && (e + 1 == bytes.len() || bytes[e + 1].is_ascii_whitespace())
        {
            e += 1;
            break;
        }
        e += 1;
    }
    while !text.is_char_boundary(e) {
        e -= 1;
    }
    &text[s..e.max(s)]
}

/// "$ 2  million" -> "$2 million"
fn tidy_amount(raw: &str) -> String {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    joined.replacen("$ ", "$", 1)
}

// ---------------------------------------------------------------------------
// Funding ask
// ---------------------------------------------------------------------------

const TEMPORAL_DISTRACTOR: &str = r"(?i)\bq[1-4]\s*'?\s*\d{2,4}\b|\b20[2-9]\d\b|\blaunch\w*|\bnext\s+round\b|\broadmap\b|\bprojected\b|\bforecast\w*|\bwill\s+raise\b|\bplan(?:s|ning)?\s+to\s+raise\b|\bby\s+end\s+of\b";

fn funding_extractor() -> &'static FactExtractor {
    static EXTRACTOR: OnceLock<FactExtractor> = OnceLock::new();
    EXTRACTOR.get_or_init(|| {
        FactExtractor::compile(
            &[
                r"(?i)\b(?:this\s+raise|this\s+round|current\s+raise|raise\s+target|target(?:ing)?|round\s+size|raising\s+today)\b[^$\n]{0,40}?({AMOUNT})",
                r"(?i)\b(?:raising|raise|fundrais(?:e|ing)|round\s+of|investment\s+of|seeking)\s+(?:(?:a|an|of|up\s+to|approximately|about|roughly)\s+)*~?({AMOUNT})",
                r"(?i)({AMOUNT})\s+(?:(?:pre-seed|seed|series\s+[a-d]|bridge|safe|convertible(?:\s+note)?|equity)\s+)?(?:raise|round)\b",
            ],
            &[
                (r"(?i)\bthis\s+(?:raise|round)\b", 8),
                (r"(?i)\btoday\b", 8),
                (r"(?i)\btarget(?:ing|ed)?\b", 8),
                (r"(?i)\b(?:currently|now|are|is)\s+raising\b", 5),
                (r"(?i)\bround\s+size\b|\bseeking\b", 5),
                (TEMPORAL_DISTRACTOR, -7),
                (
                    r"(?i)\braised\s+to\s+date\b|\bpreviously\s+raised\b|\btotal\s+raised\b|\balready\s+raised\b|\bvaluation\b|\b(?:pre|post)-money\b|\barr\b|\brevenue\b|\btam\b|\bmarket\s+size\b|\bcommit(?:ted|ments?)\b",
                    -4,
                ),
            ],
        )
    })
}

/// The amount of the round currently being raised, or empty.
pub fn extract_funding_amount(text: &str) -> String {
    funding_extractor()
        .best(text)
        .map(|c| normalize_funding_candidate(&c.value))
        .unwrap_or_default()
}

/// Every funding candidate with its score, for inspection and tests.
pub fn funding_candidates(text: &str) -> Vec<FactCandidate> {
    funding_extractor().candidates(text)
}

// ---------------------------------------------------------------------------
// Committed amount
// ---------------------------------------------------------------------------

fn committed_extractor() -> &'static FactExtractor {
    static EXTRACTOR: OnceLock<FactExtractor> = OnceLock::new();
    EXTRACTOR.get_or_init(|| {
        FactExtractor::compile(
            &[
                r"(?i)({AMOUNT})\s+(?:(?:already|soft[- ]?|hard[- ]?|verbally)\s*)?(?:committed|commitments?|funded|secured|closed|circled)\b",
                r"(?i)({AMOUNT})\s+(?:in|of)\s+(?:(?:soft|hard|verbal|signed)\s+)?(?:commitments?|committed\s+capital|soft\s+circles?)",
                r"(?i)\b(?:committed|commitments?|soft[- ]circled|secured|closed|funded)\s*(?:so\s+far|to\s+date)?\s*(?:of|:|at|is|are|totals?|totaling)?\s*~?({AMOUNT})",
            ],
            &[
                (r"(?i)\bcommitted\b", 8),
                (r"(?i)\bin\s+(?:\w+\s+)?commitments?\b|\bcommitments?\b", 8),
                (r"(?i)\bfunded\b|\bsecured\b", 8),
                (r"(?i)\bsoft[- ]circled\b|\bverbal\w*\b|\blead\s+investor\b|\balready\b", 5),
                (TEMPORAL_DISTRACTOR, -7),
                (r"(?i)\btarget\b|\bround\s+size\b|\btotal\s+raise\b", -4),
            ],
        )
    })
}

/// The already-secured portion of a round, or empty.
///
/// "raising $1M with $260K committed" yields "$260K": only phrases tied to
/// commitment language produce candidates at all.
pub fn extract_committed_amount(text: &str) -> String {
    committed_extractor()
        .best(text)
        .map(|c| normalize_committed_candidate(&c.value))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// TAM
// ---------------------------------------------------------------------------

fn tam_extractor() -> &'static FactExtractor {
    static EXTRACTOR: OnceLock<FactExtractor> = OnceLock::new();
    EXTRACTOR.get_or_init(|| {
        FactExtractor::compile(
            &[
                r"(?i)\b(?:tam|total\s+addressable\s+market)\b[^$\n]{0,40}?({AMOUNT})",
                r"(?i)\b(?:addressable\s+market|market\s+size|market\s+opportunity|market\s+of)\b[^$\n]{0,40}?({AMOUNT})",
                r"(?i)({AMOUNT})\s+(?:tam|total\s+addressable\s+market|addressable\s+market|market(?:\s+opportunity)?)\b",
            ],
            &[
                (r"(?i)\btam\b|\btotal\s+addressable\b", 8),
                (r"(?i)\baddressable\b|\bmarket\s+(?:size|opportunity)\b", 5),
                (r"(?i)\bsam\b|\bsom\b|\bserviceable\b|\bobtainable\b", -4),
                (r"(?i)\braising\b|\barr\b|\brevenue\b|\bcagr\b", -4),
            ],
        )
    })
}

/// Total addressable market, or empty.
pub fn extract_tam(text: &str) -> String {
    tam_extractor()
        .best(text)
        .map(|c| normalize_tam_candidate(&c.value))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Amount parsing
// ---------------------------------------------------------------------------

fn re_amount_parts() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:[.,]\d+)*)\s*(mm|[kmb]|million|billion|thousand)?\b")
            .expect("amount parts regex should compile")
    })
}

/// Parse "$1.5M", "$260K", "$2 million", "$1,250,000" into dollars.
pub fn parse_amount_usd(text: &str) -> Option<f64> {
    let caps = re_amount_parts().captures(text)?;
    // Commas are thousands separators.
    let base: f64 = caps[1].replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(s) if s == "k" || s == "thousand" => 1_000.0,
        Some(s) if s == "m" || s == "mm" || s == "million" => 1_000_000.0,
        Some(s) if s == "b" || s == "billion" => 1_000_000_000.0,
        _ => 1.0,
    };
    Some(base * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funding_prefers_target_today_framing() {
        let text = "We are raising $2M. Target: $1.5M raise today.";
        assert_eq!(extract_funding_amount(text), "$1.5M");
    }

    #[test]
    fn test_funding_candidates_are_scored() {
        let text = "We are raising $2M. Target: $1.5M raise today.";
        let candidates = funding_candidates(text);
        let two = candidates.iter().find(|c| c.value == "$2M").expect("$2M candidate");
        let one_five = candidates.iter().find(|c| c.value == "$1.5M").expect("$1.5M candidate");
        assert!(one_five.score > two.score);
    }

    #[test]
    fn test_funding_penalizes_future_roadmap() {
        let text = "Plan to raise $10M Series A in Q1 2026. We are currently raising $750K.";
        assert_eq!(extract_funding_amount(text), "$750K");
    }

    #[test]
    fn test_funding_ignores_raised_to_date() {
        let text = "Previously raised $400K from angels. Now raising $1.2M seed round.";
        assert_eq!(extract_funding_amount(text), "$1.2M");
    }

    #[test]
    fn test_funding_tie_breaks_by_position() {
        let text = "Raising $3M from angels. Raising $4M from funds.";
        assert_eq!(extract_funding_amount(text), "$3M");
    }

    #[test]
    fn test_funding_no_match() {
        assert_eq!(extract_funding_amount("We sell software to banks."), "");
        assert_eq!(extract_funding_amount(""), "");
    }

    #[test]
    fn test_committed_disambiguates_from_ask() {
        assert_eq!(extract_committed_amount("raising $1M with $260K committed"), "$260K");
    }

    #[test]
    fn test_committed_in_commitments() {
        assert_eq!(
            extract_committed_amount("Seed round of $2.5M, with $900K in soft commitments from the lead."),
            "$900K"
        );
    }

    #[test]
    fn test_committed_prefix_form() {
        assert_eq!(extract_committed_amount("Commitments to date: $350K"), "$350K");
    }

    #[test]
    fn test_committed_no_match() {
        assert_eq!(extract_committed_amount("raising $1M"), "");
    }

    #[test]
    fn test_tam_extraction() {
        assert_eq!(extract_tam("We see a TAM of $45B across North America."), "$45B");
        assert_eq!(
            extract_tam("SAM of $2B. Total addressable market is $30B."),
            "$30B"
        );
    }

    #[test]
    fn test_tidy_amount() {
        assert_eq!(tidy_amount("$ 2  million"), "$2 million");
    }

    #[test]
    fn test_parse_amount_usd() {
        assert_eq!(parse_amount_usd("$1.5M"), Some(1_500_000.0));
        assert_eq!(parse_amount_usd("$260K"), Some(260_000.0));
        assert_eq!(parse_amount_usd("$2 million"), Some(2_000_000.0));
        assert_eq!(parse_amount_usd("$1,250,000"), Some(1_250_000.0));
        assert_eq!(parse_amount_usd("$3B"), Some(3_000_000_000.0));
        assert_eq!(parse_amount_usd("unknown"), None);
    }

    #[test]
    fn test_pick_best_empty() {
        assert_eq!(pick_best(Vec::new()), None);
    }
}
