//! The terminal answer returned to every query (§3, §6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelUsed {
    L1,
    L2,
    L3,
    L4,
    L5,
    L6,
    Fallback,
}

impl std::fmt::Display for LevelUsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LevelUsed::L1 => "L1",
            LevelUsed::L2 => "L2",
            LevelUsed::L3 => "L3",
            LevelUsed::L4 => "L4",
            LevelUsed::L5 => "L5",
            LevelUsed::L6 => "L6",
            LevelUsed::Fallback => "fallback",
        };
        write!(f, "{s}")
    }
}

/// Returned by the hierarchical controller for every request (§3, I5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RAGResponse {
    pub content: String,
    pub confidence: f32,
    pub sources: Vec<String>,
    pub level_used: LevelUsed,
    pub processing_time: Duration,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RAGResponse {
    /// The polite fallback response: 0.8 confidence, empty sources (§7).
    pub fn fallback(content: impl Into<String>, processing_time: Duration) -> Self {
        Self {
            content: content.into(),
            confidence: 0.8,
            sources: Vec::new(),
            level_used: LevelUsed::Fallback,
            processing_time,
            metadata: HashMap::new(),
        }
    }

    pub fn with_level_confidence(mut self, level: &str, confidence: f32) -> Self {
        let map = self
            .metadata
            .entry("level_confidences".to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        if let serde_json::Value::Object(obj) = map {
            obj.insert(level.to_string(), serde_json::json!(confidence));
        }
        self
    }
}
