//! Validation and repair of untrusted model output
//!
//! Every provider response is free-form text that only claims to be JSON.
//! Parsing runs a fixed repair ladder; if nothing on the ladder recovers an
//! object, a secondary extraction call asks the model itself to restate the
//! fields as strict JSON. Failure after that is terminal — a malformed
//! response is never replaced with a fabricated default.

use crate::error::AdvisorError;
use crate::prompts;
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::Result;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Parse `raw` as a JSON object whose top-level keys are a superset of
/// `required`. Applies the textual repair ladder on direct-parse failure.
pub fn parse_object(raw: &str, required: &[&str]) -> Result<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
        return check_required(map, raw, required);
    }

    let candidate = repair(raw);
    debug!(original = raw.len(), repaired = candidate.len(), "Applied textual repair");

    match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Object(map)) => check_required(map, raw, required),
        Ok(other) => Err(AdvisorError::MalformedOutput {
            message: format!("expected a JSON object, got {}", value_kind(&other)),
            raw: raw.to_string(),
        }),
        Err(e) => Err(AdvisorError::MalformedOutput {
            message: e.to_string(),
            raw: raw.to_string(),
        }),
    }
}

/// Parse with the extraction fallback: when the local ladder fails, one
/// secondary call restates the required fields as strict JSON and the same
/// ladder runs on its output.
pub async fn parse_or_extract(
    provider: &dyn CompletionProvider,
    raw: &str,
    required: &[&str],
) -> Result<Map<String, Value>> {
    match parse_object(raw, required) {
        Ok(map) => Ok(map),
        Err(local) => {
            warn!(error = %local, "Local repair failed, delegating to extraction call");

            let pair = prompts::extraction(required, raw);
            let request = CompletionRequest::new(pair.system, pair.user)
                .with_temperature(0.2)
                .force_json();

            let second = provider.complete(&request).await?;

            parse_object(&second, required).map_err(|e| AdvisorError::MalformedOutput {
                message: format!("extraction fallback failed: {}", e),
                raw: raw.to_string(),
            })
        }
    }
}

/// Rename `sector_preference` to the canonical `sectors`, once. An existing
/// `sectors` key wins; the alias key is removed either way, so the rename
/// must not be re-applied further down a chained pipeline.
pub fn normalize_sector_alias(map: &mut Map<String, Value>) {
    if let Some(value) = map.remove("sector_preference") {
        map.entry("sectors").or_insert(value);
    }
}

fn check_required(
    map: Map<String, Value>,
    raw: &str,
    required: &[&str],
) -> Result<Map<String, Value>> {
    let missing: Vec<String> = required
        .iter()
        .filter(|field| !map.contains_key(**field))
        .map(|field| field.to_string())
        .collect();

    if missing.is_empty() {
        Ok(map)
    } else {
        Err(AdvisorError::SchemaViolation {
            missing,
            raw: raw.to_string(),
        })
    }
}

/// The textual repair ladder, applied in order:
/// 1. strip markdown code fences
/// 2. unwrap one layer if the whole text is a quoted string (must run
///    before the brace trim, or the escapes inside survive the slice)
/// 3. trim to the substring between the first `{` and the last `}`
/// 4. substitute double for single quotes, only when the candidate has no
///    double quotes at all (a legitimate apostrophe in prose corrupts this
///    step, which is why it is gated so narrowly)
fn repair(raw: &str) -> String {
    let mut text = raw
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        if let Ok(Value::String(inner)) = serde_json::from_str::<Value>(&text) {
            text = inner;
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            text = text[start..=end].to_string();
        }
    }

    if text.contains('\'') && !text.contains('"') {
        text = text.replace('\'', "\"");
    }

    text
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockProvider, MockReply};

    #[test]
    fn test_direct_parse() {
        let map = parse_object(r#"{"a": 1}"#, &["a"]).unwrap();
        assert_eq!(map["a"], Value::from(1));
    }

    #[test]
    fn test_fenced_json_parses_like_plain() {
        let fenced = parse_object("```json\n{\"a\":1}\n```", &["a"]).unwrap();
        let plain = parse_object(r#"{"a":1}"#, &["a"]).unwrap();
        assert_eq!(fenced, plain);
    }

    #[test]
    fn test_surrounding_prose_is_trimmed() {
        let raw = "Sure! Here is the analysis you asked for:\n{\"score\": 0.7}\nLet me know if you need more.";
        let map = parse_object(raw, &["score"]).unwrap();
        assert_eq!(map["score"], Value::from(0.7));
    }

    #[test]
    fn test_quoted_string_unwraps_one_layer() {
        let raw = r#""{\"a\": 1}""#;
        let map = parse_object(raw, &["a"]).unwrap();
        assert_eq!(map["a"], Value::from(1));
    }

    #[test]
    fn test_single_quote_substitution() {
        let map = parse_object("{'risk_tolerance': 'high'}", &["risk_tolerance"]).unwrap();
        assert_eq!(map["risk_tolerance"], Value::from("high"));
    }

    #[test]
    fn test_single_quote_substitution_skipped_when_double_quotes_present() {
        // The apostrophe must not be touched because the text already uses
        // double quotes for its strings.
        let raw = r#"{"rationale": "the company's moat is wide"}"#;
        let map = parse_object(raw, &["rationale"]).unwrap();
        assert_eq!(map["rationale"], Value::from("the company's moat is wide"));
    }

    #[test]
    fn test_missing_required_fields_is_schema_violation() {
        let err = parse_object(r#"{"a": 1}"#, &["a", "b", "c"]).unwrap_err();
        match err {
            AdvisorError::SchemaViolation { missing, raw } => {
                assert_eq!(missing, vec!["b".to_string(), "c".to_string()]);
                assert!(raw.contains("\"a\""));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_array_is_malformed() {
        let err = parse_object("[]", &[]).unwrap_err();
        assert!(matches!(err, AdvisorError::MalformedOutput { .. }));
    }

    #[test]
    fn test_unrecoverable_text_keeps_raw() {
        let err = parse_object("no structure here at all", &["a"]).unwrap_err();
        assert_eq!(err.raw_output(), Some("no structure here at all"));
    }

    #[test]
    fn test_alias_normalization_is_single_shot() {
        let mut map = parse_object(
            r#"{"sector_preference": ["technology", "finance"]}"#,
            &[],
        )
        .unwrap();
        normalize_sector_alias(&mut map);

        assert!(map.get("sector_preference").is_none());
        assert_eq!(
            map["sectors"],
            serde_json::json!(["technology", "finance"])
        );

        // Re-applying is a no-op, and canonical keys are never clobbered.
        normalize_sector_alias(&mut map);
        assert_eq!(
            map["sectors"],
            serde_json::json!(["technology", "finance"])
        );
    }

    #[tokio::test]
    async fn test_extraction_fallback_recovers() {
        let provider = MockProvider::with_responses(vec![r#"{"risk_tolerance": "moderate"}"#]);

        let map = parse_or_extract(&provider, "total garbage", &["risk_tolerance"])
            .await
            .unwrap();

        assert_eq!(map["risk_tolerance"], Value::from("moderate"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_extraction_returning_empty_array_is_malformed() {
        let provider = MockProvider::with_responses(vec!["[]"]);

        let err = parse_or_extract(&provider, "unparsable prose", &["risk_tolerance"])
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::MalformedOutput { .. }));
        assert_eq!(err.raw_output(), Some("unparsable prose"));
    }

    #[tokio::test]
    async fn test_extraction_not_invoked_when_local_parse_succeeds() {
        let provider = MockProvider::new(vec![MockReply::Fatal("must not be called".into())]);

        let map = parse_or_extract(&provider, r#"{"a": 1}"#, &["a"]).await.unwrap();

        assert_eq!(map["a"], Value::from(1));
        assert_eq!(provider.call_count(), 0);
    }
}
