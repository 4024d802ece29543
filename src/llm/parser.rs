use log::warn;

use crate::schema::{Recommendation, RecommendationField};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecommendation {
    pub recommendation: Recommendation,
    /// Fields left empty because their section could not be found.
    pub missing: Vec<RecommendationField>,
}

impl ParsedRecommendation {
    fn from_recommendation(recommendation: Recommendation) -> Self {
        let missing = recommendation.missing_fields();
        Self {
            recommendation,
            missing,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// True for a trailing line that only carries heading decoration for the
/// next marker ("**", "### **", "2.", "- **"). Bare numbers and dates are
/// content.
fn is_heading_residue(line: &str) -> bool {
    let line = line.trim();
    let decoration = |c: char| matches!(c, '*' | '#' | '_' | '-') || c.is_whitespace();
    if line.is_empty() {
        return false;
    }
    if line.chars().all(decoration) && line.contains(['*', '#']) {
        return true;
    }
    let after_digits = line.trim_start_matches(|c: char| c.is_ascii_digit());
    after_digits.len() < line.len()
        && after_digits
            .strip_prefix('.')
            .is_some_and(|rest| rest.chars().all(decoration))
}

/// Drops a `**`/`__` left open at the start of `text`, i.e. the closing half of
/// an emphasised heading. Balanced emphasis in the body is kept.
fn strip_unbalanced_emphasis(text: &str) -> &str {
    for mark in ["**", "__"] {
        if let Some(rest) = text.strip_prefix(mark) {
            let line = &rest[..rest.find('\n').unwrap_or(rest.len())];
            if line.matches(mark).count() % 2 == 0 {
                return rest;
            }
        }
    }
    text
}

/// Trims the body found after a marker. Decoration for the following heading
/// is only removed when such a heading exists.
fn clean_section(raw: &str, next_marker_follows: bool) -> String {
    let body = strip_unbalanced_emphasis(raw).trim_start_matches([' ', '\t']);
    let body = body.strip_prefix(':').unwrap_or(body);
    let body = strip_unbalanced_emphasis(body.trim_start_matches([' ', '\t']));
    let body = body.trim_end();
    if !next_marker_follows {
        return body.trim().to_string();
    }
    let body = match body.rfind('\n') {
        Some(pos) if is_heading_residue(&body[pos + 1..]) => &body[..pos],
        None if is_heading_residue(body) => "",
        _ => body,
    };
    body.trim().to_string()
}

/// Warns once per field still missing from a final reply.
pub(crate) fn log_missing(parsed: &ParsedRecommendation) {
    for field in &parsed.missing {
        warn!("Recommendation section '{}' is missing from the reply", field);
    }
}

fn sections_from_markers(text: &str) -> ParsedRecommendation {
    let mut spans: [Option<(usize, usize)>; 3] = [None; 3];
    let mut cursor = 0;
    for (slot, field) in RecommendationField::ALL.iter().enumerate() {
        let marker = field.marker();
        if let Some(offset) = text[cursor..].find(marker) {
            let start = cursor + offset;
            let end = start + marker.len();
            spans[slot] = Some((start, end));
            cursor = end;
        }
    }

    let mut sections: [String; 3] = Default::default();
    for (slot, span) in spans.iter().enumerate() {
        if let Some((_, body_start)) = span {
            let next_start = spans[slot + 1..]
                .iter()
                .flatten()
                .map(|(start, _)| *start)
                .next();
            let body_end = next_start.unwrap_or(text.len());
            sections[slot] = clean_section(&text[*body_start..body_end], next_start.is_some());
        }
    }

    let [correction, evidence, corrective_action] = sections;
    ParsedRecommendation::from_recommendation(Recommendation {
        correction,
        evidence,
        corrective_action,
    })
}

/// Splits a free-text reply on the three section headings.
///
/// Headings are searched in order, each one after the end of the previous hit,
/// and matched literally (case-sensitive). A field runs from the end of its
/// heading to the start of the next heading found, or to the end of the text.
/// Missing headings leave their field empty and are reported in `missing`.
pub fn parse_marked_sections(text: &str) -> ParsedRecommendation {
    let parsed = sections_from_markers(text);
    log_missing(&parsed);
    parsed
}

fn clean_json_output(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Reads a `{correction, evidence, corrective_action}` object out of the reply,
/// tolerating code fences or prose around it.
pub fn parse_structured(text: &str) -> Option<Recommendation> {
    let json = clean_json_output(text)?;
    let recommendation: Recommendation = serde_json::from_str(json).ok()?;
    let has_content = RecommendationField::ALL
        .iter()
        .any(|f| !recommendation.field(*f).trim().is_empty());
    has_content.then(|| Recommendation {
        correction: recommendation.correction.trim().to_string(),
        evidence: recommendation.evidence.trim().to_string(),
        corrective_action: recommendation.corrective_action.trim().to_string(),
    })
}

/// Structured JSON first, then the section headings. Does not log.
pub(crate) fn parse_response_quietly(text: &str) -> ParsedRecommendation {
    match parse_structured(text) {
        Some(recommendation) => ParsedRecommendation::from_recommendation(recommendation),
        None => sections_from_markers(text),
    }
}

/// Structured JSON first, then the section headings.
pub fn parse_response(text: &str) -> ParsedRecommendation {
    let parsed = parse_response_quietly(text);
    log_missing(&parsed);
    parsed
}

/// Splits a combined reply into `count` slices of consecutive paragraphs.
///
/// Paragraphs are blank-line separated blocks. They are grouped in chunks of
/// `ceil(paragraphs / count)`; missing trailing slices are empty strings. There
/// is no guarantee a slice lines up with one non-conformity unless the model
/// emitted exactly `count` uniform blocks.
pub fn split_batch_response(text: &str, count: usize) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }
    let normalized = text.replace("\r\n", "\n");
    let paragraphs: Vec<&str> = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let chunk_size = paragraphs.len().div_ceil(count).max(1);
    let mut slices: Vec<String> = paragraphs
        .chunks(chunk_size)
        .map(|chunk| chunk.join("\n\n"))
        .collect();
    if slices.len() < count {
        warn!(
            "Batch reply has {} blocks for {} non-conformities",
            slices.len(),
            count
        );
        slices.resize(count, String::new());
    }
    slices
}
