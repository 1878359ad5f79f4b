//! The JSON document stored at a config key.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConfigItem {
    /// The source-side type name, informational only.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "hint_type", skip_serializing_if = "Option::is_none")]
    pub hint_type: Option<String>,
    /// Canonical string encoding of the current value.
    pub value: String,
    pub comment: String,
}

impl ConfigItem {
    pub fn new(type_name: impl Into<String>, value: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            hint_type: None,
            value: value.into(),
            comment: comment.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ConfigItem always serializes")
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
