// src/models/settings.rs
use serde::{Deserialize, Serialize};

/// Cosmetic and persona preferences. Saved wholesale; missing fields read back as defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: String,
    pub font_size: String,
    pub personality: String,
    pub reply_length: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            font_size: "medium".to_string(),
            personality: "friendly".to_string(),
            reply_length: "medium".to_string(),
        }
    }
}
