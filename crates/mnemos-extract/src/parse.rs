// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema validation of model output with an explicit parse result.
//!
//! Malformed output is a normal input, not an exception: every model
//! response lands in `Parsed(value)` or `Unparsable`, and the caller
//! picks a deterministic fallback for the latter.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Outcome of validating model output against a schema.
#[derive(Debug)]
pub enum ModelParse<T> {
    /// The output matched the expected schema.
    Parsed(T),
    /// The output could not be parsed; take the fallback path.
    Unparsable,
}

/// Extract and parse the first JSON object in a model response.
///
/// Handles markdown code fences and surrounding prose by slicing from
/// the first `{` to the last `}`.
pub fn parse_object<T: DeserializeOwned>(response: &str) -> ModelParse<T> {
    parse_slice(response, '{', '}')
}

/// Extract and parse the first JSON array in a model response.
pub fn parse_array<T: DeserializeOwned>(response: &str) -> ModelParse<T> {
    parse_slice(response, '[', ']')
}

fn parse_slice<T: DeserializeOwned>(response: &str, open: char, close: char) -> ModelParse<T> {
    let trimmed = response.trim();
    let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) else {
        warn!("model response contained no JSON payload");
        debug!(raw = response, "unparsable model response");
        return ModelParse::Unparsable;
    };
    if end < start {
        return ModelParse::Unparsable;
    }
    match serde_json::from_str::<T>(&trimmed[start..=end]) {
        Ok(value) => ModelParse::Parsed(value),
        Err(e) => {
            warn!(error = %e, "model response failed schema validation");
            debug!(raw = response, "unparsable model response");
            ModelParse::Unparsable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        facts: Vec<String>,
    }

    #[test]
    fn parses_bare_object() {
        let parsed = parse_object::<Payload>(r#"{"facts": ["a"]}"#);
        assert!(matches!(parsed, ModelParse::Parsed(p) if p.facts == vec!["a"]));
    }

    #[test]
    fn parses_fenced_object() {
        let response = "```json\n{\"facts\": [\"a\", \"b\"]}\n```";
        let parsed = parse_object::<Payload>(response);
        assert!(matches!(parsed, ModelParse::Parsed(p) if p.facts.len() == 2));
    }

    #[test]
    fn parses_object_with_surrounding_prose() {
        let response = "Here you go:\n{\"facts\": []}\nHope that helps!";
        assert!(matches!(
            parse_object::<Payload>(response),
            ModelParse::Parsed(_)
        ));
    }

    #[test]
    fn garbage_is_unparsable() {
        assert!(matches!(
            parse_object::<Payload>("I could not find any facts."),
            ModelParse::Unparsable
        ));
    }

    #[test]
    fn schema_mismatch_is_unparsable() {
        assert!(matches!(
            parse_object::<Payload>(r#"{"facts": "not a list"}"#),
            ModelParse::Unparsable
        ));
    }

    #[test]
    fn parses_array() {
        let parsed = parse_array::<Vec<u32>>("the indices are [0, 2] as requested");
        assert!(matches!(parsed, ModelParse::Parsed(v) if v == vec![0, 2]));
    }
}
