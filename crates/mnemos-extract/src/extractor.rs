// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model-based extraction of facts, events, and person-field deltas
//! from a finished conversational turn.
//!
//! The model is never trusted: every candidate fact must carry an
//! evidence quote that is a literal substring of the source user
//! text, or it is dropped before storage.

use mnemos_core::types::{FactCategory, ModelRequest};
use mnemos_core::{ExtractionConfig, MnemosError, ModelAdapter};
use serde::Deserialize;
use tracing::debug;

use crate::parse::{parse_object, ModelParse};

/// System prompt for the extraction call.
const EXTRACTION_SYSTEM_PROMPT: &str = "\
You extract durable memory from one conversational turn. \
Respond with a single JSON object and nothing else.";

/// Instruction body for the extraction call.
const EXTRACTION_PROMPT: &str = r#"Extract information from this turn that would be actionable in a future conversation. Output one JSON object:

{
  "facts": [
    {"content": "...", "category": "...", "evidenceQuote": "..."}
  ],
  "events": [
    {"title": "...", "category": "...", "daysFromNow": 1.0}
  ],
  "fields": {"concerns": [], "goals": [], "preferences": [], "mood": null, "curiosity": []}
}

Rules for facts:
- Present tense, standalone statements (e.g. "Works at Initech")
- category: one of preference, personal, plan, professional, relationship, misc
- evidenceQuote: an exact, verbatim quote from the USER message (max 200 characters)
- Only include what the user stated, not the assistant
- If nothing is memorable, use an empty list

Rules for events: only concrete dated commitments (reminders, appointments, trips).
Rules for fields: only what changed this turn; omit anything unchanged.

User message:
{user}

Assistant reply:
{assistant}
"#;

/// Verification prompt: a second, independent judgment.
const VERIFY_PROMPT: &str = r#"Below is a conversation turn and a numbered list of claims extracted from it. Decide which claims are directly supported by the conversation.

User message:
{user}

Assistant reply:
{assistant}

Claims:
{claims}

Respond with one JSON object: {"supported": [indices of supported claims]}"#;

/// A candidate fact as returned by the model, pre-filter.
///
/// The category stays a raw string here; unknown values fold into
/// misc at storage time instead of failing the whole payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFact {
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub evidence_quote: String,
}

impl CandidateFact {
    /// The typed category, unknown values folding into misc.
    pub fn category(&self) -> FactCategory {
        FactCategory::from_str_value(&self.category)
    }
}

/// A dated event as returned by the model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEvent {
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub days_from_now: f64,
}

/// Structured-field changes observed this turn.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldsDelta {
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub preferences: Vec<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub curiosity: Vec<String>,
}

impl FieldsDelta {
    pub fn is_empty(&self) -> bool {
        self.concerns.is_empty()
            && self.goals.is_empty()
            && self.preferences.is_empty()
            && self.mood.is_none()
            && self.curiosity.is_empty()
    }
}

/// Everything one extraction call can yield. The three paths are
/// independent: events and fields proceed even when facts are empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionPayload {
    #[serde(default)]
    pub facts: Vec<CandidateFact>,
    #[serde(default)]
    pub events: Vec<CandidateEvent>,
    #[serde(default)]
    pub fields: Option<FieldsDelta>,
}

#[derive(Debug, Deserialize)]
struct VerifyPayload {
    #[serde(default)]
    supported: Vec<usize>,
}

/// Build the extraction request for one turn.
pub fn extraction_request(
    user_text: &str,
    assistant_text: &str,
    config: &ExtractionConfig,
) -> ModelRequest {
    ModelRequest {
        system_prompt: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
        prompt: EXTRACTION_PROMPT
            .replace("{user}", user_text)
            .replace("{assistant}", assistant_text),
        max_tokens: config.max_tokens,
    }
}

/// Parse the extraction response. Unparsable output drops everything.
pub fn parse_extraction(response: &str) -> ExtractionPayload {
    match parse_object::<ExtractionPayload>(response) {
        ModelParse::Parsed(payload) => payload,
        ModelParse::Unparsable => ExtractionPayload::default(),
    }
}

/// The hard grounding invariant: drop any fact whose evidence quote
/// is empty, over-long, or not a literal substring of the user text.
/// A fact that cannot be pointed to in the source is never stored.
pub fn filter_grounded(
    candidates: Vec<CandidateFact>,
    user_text: &str,
    config: &ExtractionConfig,
) -> Vec<CandidateFact> {
    candidates
        .into_iter()
        .filter(|fact| {
            if fact.content.trim().is_empty() || fact.evidence_quote.trim().is_empty() {
                debug!(content = fact.content.as_str(), "dropping fact without content or quote");
                metrics::counter!("mnemos_facts_dropped_ungrounded_total").increment(1);
                return false;
            }
            if fact.evidence_quote.chars().count() > config.max_quote_chars {
                debug!(content = fact.content.as_str(), "dropping fact with over-long quote");
                metrics::counter!("mnemos_facts_dropped_ungrounded_total").increment(1);
                return false;
            }
            if !user_text.contains(&fact.evidence_quote) {
                debug!(
                    content = fact.content.as_str(),
                    "dropping fact with non-verbatim evidence quote"
                );
                metrics::counter!("mnemos_facts_dropped_ungrounded_total").increment(1);
                return false;
            }
            true
        })
        .collect()
}

/// Second-pass verification: an independent model call judges whether
/// each claim is supported; unsupported claims are dropped. An
/// unparsable verdict keeps the batch (grounding already held) rather
/// than inventing one.
pub async fn verify_facts(
    model: &dyn ModelAdapter,
    user_text: &str,
    assistant_text: &str,
    candidates: Vec<CandidateFact>,
) -> Result<Vec<CandidateFact>, MnemosError> {
    if candidates.is_empty() {
        return Ok(candidates);
    }
    let claims = candidates
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{i}. {}", f.content))
        .collect::<Vec<_>>()
        .join("\n");
    let request = ModelRequest {
        system_prompt: None,
        prompt: VERIFY_PROMPT
            .replace("{user}", user_text)
            .replace("{assistant}", assistant_text)
            .replace("{claims}", &claims),
        max_tokens: 256,
    };
    let response = model.complete(request).await?;

    match parse_object::<VerifyPayload>(&response.content) {
        ModelParse::Parsed(verdict) => Ok(candidates
            .into_iter()
            .enumerate()
            .filter(|(i, _)| verdict.supported.contains(i))
            .map(|(_, f)| f)
            .collect()),
        ModelParse::Unparsable => Ok(candidates),
    }
}
