//! Document analysis types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub file_keys: Vec<String>,
    pub intent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub suggestions: Vec<AnalysisSuggestion>,
}

/// A candidate slot value extracted from an uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSuggestion {
    pub slot_name: String,
    pub value: serde_json::Value,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl AnalysisSuggestion {
    pub fn new(slot_name: impl Into<String>, value: serde_json::Value, confidence: f64) -> Self {
        Self {
            slot_name: slot_name.into(),
            value,
            confidence: confidence.clamp(0.0, 1.0),
            source_file: None,
        }
    }

    pub fn from_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let s = AnalysisSuggestion::new("amount", serde_json::json!(500), 1.7);
        assert_eq!(s.confidence, 1.0);
    }

    #[test]
    fn analyze_response_tolerates_missing_list() {
        let resp: AnalyzeResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.suggestions.is_empty());
    }
}
