use crate::models::FeatureMap;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

const DEFAULT_FEATURES: &[(&str, &[&str])] = &[
    ("camera", &["camera", "photo", "picture", "selfie", "lens"]),
    ("battery", &["battery", "charging", "power", "backup", "fast charge"]),
    ("performance", &["performance", "speed", "lag", "processor", "gaming"]),
    ("display", &["screen", "display", "resolution", "brightness", "refresh rate"]),
];

// Comment records flatten feature flags next to these keys.
const RESERVED_NAMES: &[&str] = &["comment", "sentiment"];

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub name: String,
    pub keywords: Vec<String>,
}

impl Feature {
    /// Matches against text that is already lower-cased.
    fn is_mentioned_in(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|keyword| lowered.contains(keyword.as_str()))
    }
}

/// Ordered set of product features and their trigger keywords.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl Default for FeatureSet {
    fn default() -> Self {
        let features = DEFAULT_FEATURES
            .iter()
            .map(|(name, keywords)| Feature {
                name: name.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            })
            .collect();
        FeatureSet { features }
    }
}

impl FeatureSet {
    pub fn new(features: Vec<Feature>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(features.len());

        for feature in features {
            let name = feature.name.trim().to_string();
            if name.is_empty() {
                bail!("feature names must not be empty");
            }
            if RESERVED_NAMES.contains(&name.as_str()) {
                bail!("feature name '{name}' is reserved");
            }
            if !seen.insert(name.clone()) {
                bail!("duplicate feature name '{name}'");
            }

            let keywords: Vec<String> = feature
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                bail!("feature '{name}' has no keywords");
            }

            normalized.push(Feature { name, keywords });
        }

        Ok(FeatureSet {
            features: normalized,
        })
    }

    /// Reads a JSON array of `{"name": ..., "keywords": [...]}` objects.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feature keywords from {}", path.display()))?;
        let features: Vec<Feature> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid feature keyword file {}", path.display()))?;
        FeatureSet::new(features)
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Flags every configured feature with 1 if any of its keywords occurs in `text`.
    pub fn tag(&self, text: &str) -> FeatureMap<u8> {
        let lowered = text.to_lowercase();
        FeatureMap::new(
            self.features
                .iter()
                .map(|feature| (feature.name.clone(), u8::from(feature.is_mentioned_in(&lowered))))
                .collect(),
        )
    }
}
