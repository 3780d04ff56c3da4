//! Prompt construction and response normalization.
//!
//! Chat-style providers answer every operation with free text. This module
//! turns an operation into a prompt and turns the reply back into the
//! operation's [`NormalizedResult`] variant, tolerating the usual model
//! quirks (fenced JSON, prose around the object, stray hashtags).

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use agora_core::{Content, NormalizedResult, OperationKind};

use crate::provider::{ExecuteOptions, ProviderError};

/// ```json fenced block.
static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("static regex")
});

/// Outermost `{...}` span.
static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex"));

/// Outermost `[...]` span.
static JSON_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("static regex"));

/// Confidence assigned when the model gives none.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Moderation categories asked of chat models.
pub const MODERATION_CATEGORIES: [&str; 6] = [
    "harassment",
    "hate",
    "self_harm",
    "sexual",
    "violence",
    "spam",
];

// =============================================================================
// PROMPTS
// =============================================================================

/// System and user message for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// The reply is expected to be a JSON object.
    pub expects_json: bool,
}

/// Build the prompt for a chat-served operation.
pub fn build_prompt(op: OperationKind, content: &Content, options: &ExecuteOptions) -> Prompt {
    let text = content.as_text();
    let (system, user, expects_json) = match op {
        OperationKind::Moderate => (
            format!(
                "You are a content moderator for a campus community. Score the text for each \
                 category from 0.0 to 1.0: {}. Reply with JSON only: \
                 {{\"flagged\": bool, \"scores\": {{\"category\": number}}}}.",
                MODERATION_CATEGORIES.join(", ")
            ),
            text,
            true,
        ),
        OperationKind::Tag => (
            format!(
                "You label campus posts. Return at most {} short lowercase topic tags. \
                 Reply with JSON only: {{\"tags\": [string], \"confidence\": number}}.",
                options.max_tags
            ),
            text,
            true,
        ),
        OperationKind::Summarize => (
            format!(
                "Summarize the text in at most {} characters. Reply with the summary only.",
                options.max_length
            ),
            text,
            false,
        ),
        OperationKind::Embed => (String::new(), text, false),
        OperationKind::Chat | OperationKind::StudyAssist | OperationKind::CodeHelp => (
            options
                .system_prompt
                .clone()
                .unwrap_or_else(|| conversational_system_prompt(op).to_string()),
            text,
            false,
        ),
    };
    Prompt {
        system,
        user,
        expects_json,
    }
}

fn conversational_system_prompt(op: OperationKind) -> &'static str {
    match op {
        OperationKind::StudyAssist => {
            "You are a patient study assistant for university students. Explain concepts \
             step by step and suggest how to practice them."
        }
        OperationKind::CodeHelp => {
            "You are a programming tutor. Point out the problem, show a corrected snippet, \
             and explain the fix briefly."
        }
        _ => "You are a helpful assistant for a campus community platform.",
    }
}

// =============================================================================
// JSON EXTRACTION
// =============================================================================

/// Find a JSON value in model output.
///
/// Tries the whole reply, then a fenced block, then the outermost object,
/// then the outermost array.
pub fn extract_json(text: &str) -> Option<JsonValue> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<JsonValue>(trimmed) {
        if v.is_object() || v.is_array() {
            return Some(v);
        }
    }
    if let Some(caps) = FENCED_JSON.captures(trimmed) {
        if let Ok(v) = serde_json::from_str::<JsonValue>(caps[1].trim()) {
            return Some(v);
        }
    }
    for re in [&*JSON_OBJECT, &*JSON_ARRAY] {
        if let Some(m) = re.find(trimmed) {
            if let Ok(v) = serde_json::from_str::<JsonValue>(m.as_str()) {
                return Some(v);
            }
        }
    }
    None
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Trim, lowercase, strip `#`, drop empties and duplicates, cap at `max_tags`.
pub fn normalize_tags<I, S>(raw: I, max_tags: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let mut tags = Vec::new();
    for tag in raw {
        let tag = tag
            .as_ref()
            .trim()
            .trim_start_matches('#')
            .trim()
            .to_lowercase();
        if tag.is_empty() || !seen.insert(tag.clone()) {
            continue;
        }
        tags.push(tag);
        if tags.len() >= max_tags {
            break;
        }
    }
    tags
}

/// Parse a tagging reply: JSON object, bare JSON array, or a comma list.
pub fn parse_tags(reply: &str, max_tags: usize) -> NormalizedResult {
    let (raw, confidence): (Vec<String>, f64) = match extract_json(reply) {
        Some(JsonValue::Object(obj)) => {
            let tags = obj
                .get("tags")
                .and_then(|t| t.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            let confidence = obj
                .get("confidence")
                .and_then(|c| c.as_f64())
                .unwrap_or(DEFAULT_CONFIDENCE);
            (tags, confidence)
        }
        Some(JsonValue::Array(items)) => (
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            DEFAULT_CONFIDENCE,
        ),
        _ => (
            reply
                .split([',', '\n'])
                .map(|s| s.trim_start_matches(['-', '*', ' ']).to_string())
                .collect(),
            DEFAULT_CONFIDENCE,
        ),
    };
    NormalizedResult::Tags {
        tags: normalize_tags(raw, max_tags),
        confidence: confidence.clamp(0.0, 1.0),
    }
}

/// Build a moderation result.
///
/// Flagged when the provider flagged it or any score reaches `threshold`.
/// Categories are the provider's plus every category at or over threshold.
pub fn moderation_result(
    provider_flagged: bool,
    provider_categories: BTreeSet<String>,
    scores: BTreeMap<String, f64>,
    threshold: f64,
) -> NormalizedResult {
    let mut categories = provider_categories;
    categories.extend(
        scores
            .iter()
            .filter(|(_, s)| **s >= threshold)
            .map(|(c, _)| c.clone()),
    );
    let flagged = provider_flagged || !categories.is_empty();
    let max_score = scores.values().copied().fold(0.0_f64, f64::max).clamp(0.0, 1.0);
    let confidence = if flagged { max_score } else { 1.0 - max_score };
    NormalizedResult::Moderation {
        flagged,
        categories,
        scores,
        confidence,
    }
}

/// Parse a chat model's moderation reply.
pub fn parse_moderation(reply: &str, threshold: f64) -> Result<NormalizedResult, ProviderError> {
    let Some(JsonValue::Object(obj)) = extract_json(reply) else {
        return Err(ProviderError::malformed("moderation", "no JSON object in reply"));
    };
    let flagged = obj.get("flagged").and_then(|f| f.as_bool()).unwrap_or(false);
    let scores: BTreeMap<String, f64> = obj
        .get("scores")
        .and_then(|s| s.as_object())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_f64().map(|s| (k.to_lowercase(), s.clamp(0.0, 1.0))))
                .collect()
        })
        .unwrap_or_default();
    Ok(moderation_result(flagged, BTreeSet::new(), scores, threshold))
}

/// Build a summary result, cut to `max_length` characters.
pub fn summary_result(reply: &str, content: &Content, max_length: usize) -> NormalizedResult {
    let summary: String = reply.trim().chars().take(max_length).collect();
    let summary = summary.trim_end().to_string();
    NormalizedResult::Summary {
        summary_length: summary.chars().count(),
        summary,
        original_length: content.char_len(),
    }
}

/// Build a conversational result; top-level JSON object fields are lifted.
pub fn text_result(reply: &str) -> NormalizedResult {
    let text = reply.trim().to_string();
    let structured_fields = match serde_json::from_str::<JsonValue>(&text) {
        Ok(JsonValue::Object(obj)) => obj.into_iter().collect(),
        _ => BTreeMap::new(),
    };
    NormalizedResult::Text {
        text,
        structured_fields,
    }
}

/// Build an embedding result, rejecting empty or non-finite vectors.
pub fn embedding_result(vector: Vec<f32>) -> Result<NormalizedResult, ProviderError> {
    if vector.is_empty() {
        return Err(ProviderError::malformed("embedding", "empty vector"));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(ProviderError::malformed("embedding", "non-finite component"));
    }
    Ok(NormalizedResult::Embedding {
        dimensions: vector.len(),
        vector,
    })
}

/// Map a chat reply onto the operation's result variant.
pub fn normalize_reply(
    op: OperationKind,
    reply: &str,
    content: &Content,
    options: &ExecuteOptions,
) -> Result<NormalizedResult, ProviderError> {
    match op {
        OperationKind::Moderate => parse_moderation(reply, options.moderation_threshold),
        OperationKind::Tag => Ok(parse_tags(reply, options.max_tags)),
        OperationKind::Summarize => Ok(summary_result(reply, content, options.max_length)),
        OperationKind::Chat | OperationKind::StudyAssist | OperationKind::CodeHelp => {
            Ok(text_result(reply))
        }
        OperationKind::Embed => Err(ProviderError::malformed(
            "embedding",
            "chat reply cannot carry a vector",
        )),
    }
}
