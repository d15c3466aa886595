//! JSON parsing for generation-service responses.
//!
//! The service returns dynamic JSON with no schema guarantee. Everything
//! is validated here at the boundary; malformed items are dropped and
//! counted rather than trusted, and unvalidated structures never reach
//! the scheduling engine.

use regex::Regex;
use serde::Deserialize;

use crate::types::PhrasingType;

/// Remove code fences and thinking tags from a model response.
pub fn remove_code_blocks(content: &str) -> String {
    let content = content.trim();

    let code_re = Regex::new(r"^```[a-zA-Z0-9]*\n?([\s\S]*?)\n?```$").unwrap();
    let content = code_re
        .captures(content)
        .map(|c| c.get(1).map(|m| m.as_str().trim()).unwrap_or(content))
        .unwrap_or(content);

    let think_re = Regex::new(r"<think>[\s\S]*?</think>").unwrap();
    think_re.replace_all(content, "").trim().to_string()
}

/// A validated concept candidate from concept synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptCandidate {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConceptCandidate {
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConceptsResponse {
    concepts: Vec<RawConceptCandidate>,
}

/// Parse concept candidates from a synthesis response.
///
/// Candidates without a usable title are dropped. An unparseable
/// response yields an empty list rather than an error; the pipeline
/// treats "nothing usable" as a short batch, not a failure.
pub fn parse_concept_candidates(response: &str) -> Vec<ConceptCandidate> {
    let cleaned = remove_code_blocks(response);
    if cleaned.is_empty() {
        return vec![];
    }

    let raw: Vec<RawConceptCandidate> = match serde_json::from_str::<ConceptsResponse>(&cleaned) {
        Ok(r) => r.concepts,
        // Some models return the bare array without the wrapper object.
        Err(_) => serde_json::from_str(&cleaned).unwrap_or_default(),
    };

    raw.into_iter()
        .filter_map(|raw| {
            let title = raw.title?.trim().to_string();
            if title.is_empty() {
                return None;
            }
            let description = raw
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
            Some(ConceptCandidate { title, description })
        })
        .collect()
}

/// A validated phrasing candidate from phrasing generation.
#[derive(Debug, Clone)]
pub struct PhrasingCandidate {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub phrasing_type: PhrasingType,
}

#[derive(Debug, Deserialize)]
struct RawPhrasingCandidate {
    question: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default, alias = "correctAnswer")]
    correct_answer: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default, rename = "type")]
    phrasing_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhrasingsResponse {
    phrasings: Vec<RawPhrasingCandidate>,
}

/// Parsed phrasing batch with its raw item count.
///
/// `total` counts every item the service returned, valid or not, so the
/// pipeline can track generated and saved separately.
#[derive(Debug, Default)]
pub struct ParsedPhrasings {
    pub valid: Vec<PhrasingCandidate>,
    pub total: usize,
}

/// Parse and validate phrasing candidates from a generation response.
pub fn parse_phrasing_candidates(response: &str) -> ParsedPhrasings {
    let cleaned = remove_code_blocks(response);
    if cleaned.is_empty() {
        return ParsedPhrasings::default();
    }

    let raw: Vec<RawPhrasingCandidate> = match serde_json::from_str::<PhrasingsResponse>(&cleaned) {
        Ok(r) => r.phrasings,
        Err(_) => serde_json::from_str(&cleaned).unwrap_or_default(),
    };

    let total = raw.len();
    let valid = raw.into_iter().filter_map(validate_phrasing).collect();

    ParsedPhrasings { valid, total }
}

fn validate_phrasing(raw: RawPhrasingCandidate) -> Option<PhrasingCandidate> {
    let question = raw.question?.trim().to_string();
    if question.is_empty() {
        return None;
    }
    let correct_answer = raw.correct_answer?.trim().to_string();
    if correct_answer.is_empty() {
        return None;
    }

    let phrasing_type = raw
        .phrasing_type
        .as_deref()
        .and_then(PhrasingType::from_str_flexible)
        .unwrap_or_default();

    let options: Vec<String> = raw
        .options
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    // Multiple choice needs real distractors and must contain the
    // correct answer among its options.
    if phrasing_type == PhrasingType::MultipleChoice
        && (options.len() < 2 || !options.contains(&correct_answer))
    {
        return None;
    }

    let explanation = raw
        .explanation
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    Some(PhrasingCandidate {
        question,
        options,
        correct_answer,
        explanation,
        phrasing_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_code_blocks() {
        let input = "```json\n{\"concepts\": []}\n```";
        assert_eq!(remove_code_blocks(input), "{\"concepts\": []}");

        let with_think = "<think>reasoning here</think>{\"concepts\": []}";
        assert_eq!(remove_code_blocks(with_think), "{\"concepts\": []}");
    }

    #[test]
    fn test_parse_concepts_wrapper_and_bare_array() {
        let wrapped = r#"{"concepts": [{"title": "Osmosis", "description": "Water movement"}]}"#;
        let parsed = parse_concept_candidates(wrapped);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "Osmosis");

        let bare = r#"[{"title": "Diffusion"}]"#;
        let parsed = parse_concept_candidates(bare);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].description, None);
    }

    #[test]
    fn test_parse_concepts_drops_malformed() {
        let input = r#"{"concepts": [
            {"title": "Valid"},
            {"title": ""},
            {"description": "no title"},
            {"title": "   "}
        ]}"#;
        let parsed = parse_concept_candidates(input);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "Valid");
    }

    #[test]
    fn test_parse_concepts_garbage_yields_empty() {
        assert!(parse_concept_candidates("I cannot help with that").is_empty());
        assert!(parse_concept_candidates("").is_empty());
    }

    #[test]
    fn test_parse_phrasings_counts_total_including_invalid() {
        let input = r#"{"phrasings": [
            {"question": "What is ATP?", "type": "multiple_choice",
             "options": ["Energy currency", "A protein"], "correctAnswer": "Energy currency"},
            {"question": "", "correctAnswer": "x"},
            {"question": "Missing answer"}
        ]}"#;
        let parsed = parse_phrasing_candidates(input);
        assert_eq!(parsed.total, 3);
        assert_eq!(parsed.valid.len(), 1);
        assert_eq!(parsed.valid[0].question, "What is ATP?");
    }

    #[test]
    fn test_multiple_choice_requires_answer_among_options() {
        let input = r#"{"phrasings": [
            {"question": "Q1", "type": "multiple_choice",
             "options": ["A", "B"], "correctAnswer": "C"},
            {"question": "Q2", "type": "multiple_choice",
             "options": ["Only one"], "correctAnswer": "Only one"}
        ]}"#;
        let parsed = parse_phrasing_candidates(input);
        assert_eq!(parsed.total, 2);
        assert!(parsed.valid.is_empty());
    }

    #[test]
    fn test_short_answer_needs_no_options() {
        let input = r#"{"phrasings": [
            {"question": "Define osmosis", "type": "short_answer",
             "correct_answer": "Movement of water across a membrane"}
        ]}"#;
        let parsed = parse_phrasing_candidates(input);
        assert_eq!(parsed.valid.len(), 1);
        assert_eq!(parsed.valid[0].phrasing_type, PhrasingType::ShortAnswer);
        assert!(parsed.valid[0].options.is_empty());
    }

    #[test]
    fn test_phrasings_inside_code_fence() {
        let input = "```json\n{\"phrasings\": [{\"question\": \"Q\", \"type\": \"true_false\", \"correctAnswer\": \"true\"}]}\n```";
        let parsed = parse_phrasing_candidates(input);
        assert_eq!(parsed.valid.len(), 1);
        assert_eq!(parsed.valid[0].phrasing_type, PhrasingType::TrueFalse);
    }
}
