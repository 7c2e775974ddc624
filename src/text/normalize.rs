//! Text cleanup for noisy extracted content.
//!
//! Deck extraction, rich-text pastes, and link ingestion all leave debris
//! behind (page counters, email footers, DocSend chrome, Office CSS, search
//! scaffolding). These helpers turn that into short clean sentences and
//! gate placeholder values like "N/A" out of fact fields.
//!
//! Nothing in here panics or returns errors: bad input yields empty output.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

fn re_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:unknown|n/a|na|none|null)\s*\.?\s*$")
            .expect("placeholder regex should compile")
    })
}

fn re_not_specified() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bnot\s+(?:specified|disclosed|available)\b")
            .expect("not-specified regex should compile")
    })
}

fn re_email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("email regex should compile")
    })
}

fn re_page_fraction() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,3})\s*/\s*(\d{1,3})\b").expect("page fraction regex should compile")
    })
}

fn re_deck_boilerplate() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:this document is shared (?:with you )?(?:via|using) docsend|powered by docsend|shared via docsend|sign up for (?:a )?(?:free )?docsend(?: account)?|view (?:this )?document on docsend|docsend|made with pitch|created (?:with|in) canva|built with pitch\.com|strictly confidential|confidential (?:and|&) proprietary|all rights reserved|click to edit(?: master)? (?:title|text) style|download (?:as )?pdf|page \d+ of \d+|\bslide \d+\b|©\s*\d{4}[^\n]*)",
        )
        .expect("deck boilerplate regex should compile")
    })
}

fn re_search_scaffolding() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)(?:\[/?(?:web[_ ]?)?search[_ ]?results?\]|</?search_results?>|\b(?:begin|end)\s+(?:web\s+)?search\s+results?\b|\bweb search results?:|\bsearch query:[^\n]*|^\s*(?:result|source)\s*#?\d+\s*:)",
        )
        .expect("search scaffolding regex should compile")
    })
}

fn re_html_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<!--.*?-->|<style\b[^>]*>.*?</style>|<script\b[^>]*>.*?</script>|<xml\b[^>]*>.*?</xml>")
            .expect("html block regex should compile")
    })
}

fn re_html_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<\s*(?:br|/p|/div|/li|/tr|/h[1-6])\s*/?\s*>")
            .expect("html break regex should compile")
    })
}

fn re_html_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^<>]{1,400}>").expect("html tag regex should compile"))
}

fn re_numeric_entity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)&#(x[0-9a-f]{1,6}|\d{1,7});").expect("numeric entity regex should compile")
    })
}

fn re_named_entity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&[A-Za-z]{2,8};").expect("named entity regex should compile"))
}

fn re_office_markup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:@font-face\s*\{[^}]*\}|[\w.:#-]*\bmso[\w-]*\s*\{[^}]*\}|mso-[a-z-]+\s*:\s*[^;\n]*;?|\bmso(?:normal|listparagraph\w*|tablegrid|chpdefault|papdefault)\b|/\*\s*style definitions\s*\*/|\btable\.msonormaltable\b|\bNormal\s+0\s+false\s+false\s+false\b|\bEN-US\s+X-NONE\s+X-NONE\b)",
        )
        .expect("office markup regex should compile")
    })
}

fn re_degree_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:\b(?:phd|mba|bsc|msc|university|college|institute|stanford|harvard|mit|wharton|insead|alumn(?:us|a|i)|graduated?|degree)\b|\bph\.d|\b[bm]\.[sa]\.)",
        )
        .expect("degree regex should compile")
    })
}

fn re_business_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:customers?|clients?|users?|platform|product|revenue|market|software|solution|company|startup|business|enterprise|saas|builds?|helps|enables|automat\w*|workflow|pricing|sales)\b",
        )
        .expect("business regex should compile")
    })
}

fn re_bot_wall() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:enable javascript|javascript is (?:disabled|required)|access denied|verify (?:that )?you are (?:a )?human|captcha|403 forbidden|404 not found|page not found|just a moment|checking your browser|attention required|request blocked|cookies? (?:are|is) (?:required|disabled)|accept (?:all )?cookies to continue)",
        )
        .expect("bot wall regex should compile")
    })
}

// ---------------------------------------------------------------------------
// Placeholder gate
// ---------------------------------------------------------------------------

/// True for empty text, bare sentinels (`unknown`, `n/a`, `na`, `none`,
/// `null`), and any phrase containing "not specified/disclosed/available".
pub fn is_placeholder_value(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || re_placeholder().is_match(trimmed) || re_not_specified().is_match(trimmed)
}

fn normalize_fact_candidate(raw: &str) -> String {
    if is_placeholder_value(raw) {
        String::new()
    } else {
        raw.trim().to_string()
    }
}

/// Final validity gate for an extracted or model-reported funding ask.
pub fn normalize_funding_candidate(raw: &str) -> String {
    normalize_fact_candidate(raw)
}

/// Final validity gate for a TAM value.
pub fn normalize_tam_candidate(raw: &str) -> String {
    normalize_fact_candidate(raw)
}

/// Final validity gate for the already-committed portion of a round.
pub fn normalize_committed_candidate(raw: &str) -> String {
    normalize_fact_candidate(raw)
}

// ---------------------------------------------------------------------------
// Artifact stripping
// ---------------------------------------------------------------------------

/// Collapse runs of spaces inside each line and drop blank lines.
pub fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    let decoded = re_numeric_entity().replace_all(text, |caps: &Captures| {
        let body = &caps[1];
        let code = if let Some(hex) = body.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()
        } else {
            body.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });

    re_named_entity()
        .replace_all(&decoded, |caps: &Captures| {
            match caps[0].to_ascii_lowercase().as_str() {
                "&nbsp;" => " ",
                "&amp;" => "&",
                "&lt;" => "<",
                "&gt;" => ">",
                "&quot;" => "\"",
                "&apos;" => "'",
                "&ndash;" | "&mdash;" => "-",
                "&hellip;" => "...",
                "&rsquo;" | "&lsquo;" => "'",
                "&rdquo;" | "&ldquo;" => "\"",
                _ => " ",
            }
            .to_string()
        })
        .into_owned()
}

/// Remove HTML tags, entities, and Microsoft Office markup left over from
/// rich-text pastes. Block-level closers become line breaks.
pub fn strip_rich_text_artifacts(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let without_blocks = re_html_block().replace_all(text, " ");
    let with_breaks = re_html_break().replace_all(&without_blocks, "\n");
    let without_tags = re_html_tag().replace_all(&with_breaks, " ");
    let decoded = decode_entities(&without_tags);
    let without_office = re_office_markup().replace_all(&decoded, " ");
    collapse_whitespace(&without_office.replace('\u{a0}', " "))
}

/// Remove pitch-deck extraction debris: `N/M` page counters, email
/// addresses, hosting-service boilerplate, and injected search scaffolding.
///
/// `24/7` survives because a page counter never exceeds its total.
pub fn strip_deck_extraction_artifacts(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let normalized: String = text.nfkc().collect();
    let without_pages = re_page_fraction().replace_all(&normalized, |caps: &Captures| {
        let page = caps[1].parse::<u32>().unwrap_or(0);
        let total = caps[2].parse::<u32>().unwrap_or(0);
        if page >= 1 && total >= page {
            " ".to_string()
        } else {
            caps[0].to_string()
        }
    });
    let without_emails = re_email().replace_all(&without_pages, " ");
    let without_boilerplate = re_deck_boilerplate().replace_all(&without_emails, " ");
    let without_scaffolding = re_search_scaffolding().replace_all(&without_boilerplate, " ");
    collapse_whitespace(&without_scaffolding)
}

/// Both cleaners in sequence; the usual entry point for raw extracted text.
pub fn clean_extracted_text(text: &str) -> String {
    strip_deck_extraction_artifacts(&strip_rich_text_artifacts(text))
}

// ---------------------------------------------------------------------------
// Sentence filtering
// ---------------------------------------------------------------------------

/// Heuristic: is this line deck layout debris rather than a real sentence?
///
/// Rejects short lines, lines dominated by single capital letters (column
/// header fragments), founder bio tails (degrees and schools with no
/// business context), and anything containing an email address.
pub fn is_likely_deck_fragment(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.chars().count() < 24 {
        return true;
    }
    if re_email().is_match(trimmed) {
        return true;
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let single_caps = tokens
        .iter()
        .filter(|t| {
            let core = t.trim_end_matches(['.', ':', ',']);
            core.chars().count() == 1 && core.chars().all(|c| c.is_ascii_uppercase())
        })
        .count();
    if tokens.len() >= 3 && single_caps * 2 >= tokens.len() {
        return true;
    }

    re_degree_keyword().is_match(trimmed) && !re_business_keyword().is_match(trimmed)
}

/// Split text into sentences on terminal punctuation followed by
/// whitespace, and on line breaks. Decimal points (`$1.5M`) do not split.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let mut current = String::new();
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }
        let rest = current.trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }
    }
    sentences
}

/// Clean text and return up to `max` distinct sentences that read like
/// prose rather than deck fragments.
pub fn extract_clean_sentences(text: &str, max: usize) -> Vec<String> {
    let cleaned = clean_extracted_text(text);
    let mut seen = HashSet::new();
    split_sentences(&cleaned)
        .into_iter()
        .filter(|s| !is_likely_deck_fragment(s))
        .filter(|s| seen.insert(normalize_key(s)))
        .take(max)
        .collect()
}

/// Truncate to at most `max_chars` characters, preferring a word boundary.
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    let shortened = match cut.rfind(' ') {
        Some(idx) if idx > max_chars / 2 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}...", shortened.trim_end_matches([',', ';', ':', ' ']))
}

// ---------------------------------------------------------------------------
// Link quality
// ---------------------------------------------------------------------------

/// Minimum cleaned length for ingested link content to count as real.
const MIN_LINK_CONTENT_CHARS: usize = 200;

/// Bot-wall phrases only disqualify pages shorter than this.
const BOT_WALL_SCAN_CHARS: usize = 1_500;

/// True when ingested link text is too thin, is an error or bot-wall page,
/// or is mostly non-alphabetic noise.
pub fn is_low_quality_extracted_link_content(text: &str) -> bool {
    let cleaned = collapse_whitespace(text);
    let length = cleaned.chars().count();
    if length < MIN_LINK_CONTENT_CHARS {
        return true;
    }
    if length < BOT_WALL_SCAN_CHARS && re_bot_wall().is_match(&cleaned) {
        return true;
    }
    let visible = cleaned.chars().filter(|c| !c.is_whitespace()).count();
    let alphabetic = cleaned.chars().filter(|c| c.is_alphabetic()).count();
    visible == 0 || alphabetic * 2 < visible
}

/// Normalize a string for fuzzy matching: lowercase + ASCII alphanumeric only.
pub fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Bare lowercase host for a company URL or domain: `https://www.Acme.io/about`
/// becomes `acme.io`. `None` when no host can be parsed.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let parsed = url::Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    (host.contains('.')).then_some(host)
}
