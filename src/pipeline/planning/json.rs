use serde_json::{Map, Value};

use crate::pipeline::PipelineError;

/// Locate the JSON object inside an LLM reply that may carry code
/// fences or surrounding prose.
fn extract_json_block(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') {
                return block;
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}

/// Parse an LLM reply into a JSON object.
pub fn parse_json_object(response: &str) -> Result<Map<String, Value>, PipelineError> {
    let block = extract_json_block(response);
    match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(PipelineError::InvalidJson(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(PipelineError::InvalidJson(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
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

    #[test]
    fn parses_bare_object() {
        let map = parse_json_object(r#"{"slides": []}"#).unwrap();
        assert!(map.contains_key("slides"));
    }

    #[test]
    fn parses_fenced_object() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(parse_json_object(text).unwrap()["a"], 1);
    }

    #[test]
    fn parses_object_after_prose() {
        let text = "Sure! {\"global_style_prompt\": \"calm\"} hope that helps";
        assert_eq!(parse_json_object(text).unwrap()["global_style_prompt"], "calm");
    }

    #[test]
    fn rejects_arrays_and_garbage() {
        assert!(matches!(
            parse_json_object("[1, 2]"),
            Err(PipelineError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_json_object("not json at all"),
            Err(PipelineError::InvalidJson(_))
        ));
    }
}
