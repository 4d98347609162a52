//! Pull a JSON object out of free-form model output.

use serde::de::DeserializeOwned;

/// Strip code fences and keep the outermost `{ ... }` span.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let json = extract_json_object(raw).ok_or_else(|| "no JSON object in model output".to_string())?;
    serde_json::from_str(json).map_err(|e| format!("malformed JSON in model output: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Out {
        summary: String,
    }

    #[test]
    fn test_plain_json() {
        let out: Out = parse_model_json(r#"{"summary": "ok"}"#).unwrap();
        assert_eq!(out.summary, "ok");
    }

    #[test]
    fn test_fenced_json_with_chatter() {
        let raw = "Here is the analysis:\n```json\n{\"summary\": \"fenced {nested}\"}\n```\nLet me know!";
        let out: Out = parse_model_json(raw).unwrap();
        assert_eq!(out.summary, "fenced {nested}");
    }

    #[test]
    fn test_rejects_missing_or_broken_json() {
        assert!(parse_model_json::<Out>("no json here").is_err());
        assert!(parse_model_json::<Out>("} backwards {").is_err());
        assert!(parse_model_json::<Out>("{\"summary\": ").is_err());
        assert!(parse_model_json::<Out>("{\"other\": 1}").is_err());
    }
}
