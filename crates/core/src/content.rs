//! Normalization of execution-service response shapes.
//!
//! The service wraps results differently depending on whether the model
//! produced plain prose or a sectioned document, and the nesting has
//! drifted across service versions. [`normalize_content`] is the single
//! place that knows about those shapes; everything downstream consumes the
//! tagged [`AnalysisContent`] enum and never sniffs raw JSON.

use serde::{Deserialize, Serialize};

/// Normalized analysis result content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisContent {
    /// Plain prose result.
    Text { text: String },
    /// Sectioned document result.
    Structured { sections: Vec<Section> },
    /// A shape this client does not recognize. Preserved verbatim so the
    /// UI can still render something and logs stay diagnosable.
    Unrecognized { raw: serde_json::Value },
}

/// One section of a structured result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub heading: String,
    pub body: String,
}

/// Map a raw execution-service payload to [`AnalysisContent`].
///
/// Recognized shapes:
/// - a bare JSON string;
/// - `{"text": "..."}` or `{"output": "..."}`;
/// - `{"sections": [...]}` or `{"output": {"sections": [...]}}`, where each
///   section is either `{"heading", "body"}` or a bare string.
///
/// Anything else comes back as `Unrecognized` carrying the raw value.
pub fn normalize_content(raw: &serde_json::Value) -> AnalysisContent {
    if let Some(text) = raw.as_str() {
        return AnalysisContent::Text {
            text: text.to_string(),
        };
    }

    if let Some(obj) = raw.as_object() {
        for key in ["text", "output"] {
            if let Some(text) = obj.get(key).and_then(|v| v.as_str()) {
                return AnalysisContent::Text {
                    text: text.to_string(),
                };
            }
        }

        let sections = obj
            .get("sections")
            .or_else(|| obj.get("output").and_then(|o| o.get("sections")));
        if let Some(items) = sections.and_then(|s| s.as_array()) {
            if let Some(parsed) = parse_sections(items) {
                return AnalysisContent::Structured { sections: parsed };
            }
        }
    }

    AnalysisContent::Unrecognized { raw: raw.clone() }
}

/// Parse a sections array; `None` if any element has an unusable shape.
fn parse_sections(items: &[serde_json::Value]) -> Option<Vec<Section>> {
    items
        .iter()
        .map(|item| {
            if let Some(body) = item.as_str() {
                return Some(Section {
                    heading: String::new(),
                    body: body.to_string(),
                });
            }
            let obj = item.as_object()?;
            Some(Section {
                heading: obj
                    .get("heading")
                    .and_then(|h| h.as_str())
                    .unwrap_or_default()
                    .to_string(),
                body: obj.get("body")?.as_str()?.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn bare_string_is_text() {
        let content = normalize_content(&json!("RSI shows divergence"));
        assert_eq!(
            content,
            AnalysisContent::Text {
                text: "RSI shows divergence".into()
            }
        );
    }

    #[test]
    fn text_key_is_text() {
        let content = normalize_content(&json!({"text": "hold"}));
        assert_matches!(content, AnalysisContent::Text { text } if text == "hold");
    }

    #[test]
    fn output_string_is_text() {
        let content = normalize_content(&json!({"output": "sell signal"}));
        assert_matches!(content, AnalysisContent::Text { text } if text == "sell signal");
    }

    #[test]
    fn top_level_sections_are_structured() {
        let content = normalize_content(&json!({
            "sections": [
                {"heading": "Summary", "body": "Bullish"},
                {"heading": "Risks", "body": "Earnings next week"},
            ]
        }));
        assert_matches!(content, AnalysisContent::Structured { sections } => {
            assert_eq!(sections.len(), 2);
            assert_eq!(sections[0].heading, "Summary");
            assert_eq!(sections[1].body, "Earnings next week");
        });
    }

    #[test]
    fn nested_output_sections_are_structured() {
        let content = normalize_content(&json!({
            "output": {"sections": [{"heading": "H", "body": "B"}]}
        }));
        assert_matches!(content, AnalysisContent::Structured { sections } => {
            assert_eq!(sections.len(), 1);
        });
    }

    #[test]
    fn bare_string_sections_get_empty_headings() {
        let content = normalize_content(&json!({"sections": ["first", "second"]}));
        assert_matches!(content, AnalysisContent::Structured { sections } => {
            assert_eq!(sections[0].heading, "");
            assert_eq!(sections[0].body, "first");
            assert_eq!(sections[1].body, "second");
        });
    }

    #[test]
    fn section_without_body_is_unrecognized() {
        let raw = json!({"sections": [{"heading": "only a heading"}]});
        let content = normalize_content(&raw);
        assert_matches!(content, AnalysisContent::Unrecognized { .. });
    }

    #[test]
    fn unknown_object_is_unrecognized_and_preserved() {
        let raw = json!({"blob": [1, 2, 3]});
        let content = normalize_content(&raw);
        assert_eq!(content, AnalysisContent::Unrecognized { raw: raw.clone() });
    }

    #[test]
    fn null_is_unrecognized() {
        assert_matches!(
            normalize_content(&serde_json::Value::Null),
            AnalysisContent::Unrecognized { .. }
        );
    }
}
