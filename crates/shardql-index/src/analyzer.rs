//! Per-field analyzer configuration and the compiled-analyzer cache a Shard
//! keeps alongside its engine handle (§3 Shard attributes).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Per-field analyzer configuration for a shard. `default_analyzer` applies
/// to any field without an entry in `per_field`.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub default_analyzer: String,
    pub per_field: HashMap<String, String>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            default_analyzer: "standard".to_string(),
            per_field: HashMap::new(),
        }
    }
}

impl AnalyzerSettings {
    pub fn analyzer_for_field(&self, field: &str) -> &str {
        self.per_field
            .get(field)
            .map(|s| s.as_str())
            .unwrap_or(&self.default_analyzer)
    }
}

/// A compiled tokenizer. Real engines would back this with a full analysis
/// chain (char filters, tokenizer, token filters); the two provided here
/// cover the cases the shard core itself needs to exercise the cache.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, text: &str) -> Vec<String>;
}

/// Lowercases and splits on anything that isn't alphanumeric.
pub struct StandardAnalyzer;
impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect()
    }
}

/// Emits the input unchanged as a single token; used for keyword-style
/// fields that must not be tokenized.
pub struct KeywordAnalyzer;
impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        }
    }
}

fn build_analyzer(name: &str) -> Arc<dyn Analyzer> {
    match name {
        "keyword" => Arc::new(KeywordAnalyzer),
        _ => Arc::new(StandardAnalyzer),
    }
}

/// Caches compiled analyzers by name so repeated `AnalyzeText` calls don't
/// re-build the same tokenizer chain.
#[derive(Default)]
pub struct AnalyzerCache {
    compiled: RwLock<HashMap<String, Arc<dyn Analyzer>>>,
}

impl AnalyzerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&self, name: &str) -> Arc<dyn Analyzer> {
        if let Some(a) = self.compiled.read().get(name) {
            return a.clone();
        }
        let built = build_analyzer(name);
        self.compiled
            .write()
            .insert(name.to_string(), built.clone());
        built
    }

    /// Closed alongside the engine handle when the shard closes (§4.8 step 5).
    pub fn clear(&self) {
        self.compiled.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_analyzer_lowercases_and_splits() {
        let a = StandardAnalyzer;
        assert_eq!(a.analyze("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn keyword_analyzer_is_single_token() {
        let a = KeywordAnalyzer;
        assert_eq!(a.analyze("us-east-1"), vec!["us-east-1"]);
    }

    #[test]
    fn per_field_overrides_default() {
        let mut settings = AnalyzerSettings::default();
        settings.per_field.insert("host".to_string(), "keyword".to_string());
        assert_eq!(settings.analyzer_for_field("host"), "keyword");
        assert_eq!(settings.analyzer_for_field("message"), "standard");
    }

    #[test]
    fn cache_reuses_compiled_analyzer() {
        let cache = AnalyzerCache::new();
        let a = cache.get_or_build("standard");
        let b = cache.get_or_build("standard");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
