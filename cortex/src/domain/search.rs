// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Search query and result types for hybrid retrieval

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::memory::{Memory, MemoryType};

/// Which legs of the hybrid retriever run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Pure semantic intent: vector store only
    Vector,
    /// Pure structural filters: graph store only
    Graph,
    /// Both legs concurrently, merged
    Hybrid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default)]
    pub types: Vec<MemoryType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_age: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_deprecated: bool,
    /// Overrides the strategy inferred from the query shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SearchStrategy>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn in_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_types(mut self, types: Vec<MemoryType>) -> Self {
        self.types = types;
        self
    }

    pub fn has_semantic_intent(&self) -> bool {
        self.embedding.as_ref().map(|e| !e.is_empty()).unwrap_or(false)
            || self.text.as_ref().map(|t| !t.trim().is_empty()).unwrap_or(false)
    }

    pub fn has_structural_filters(&self) -> bool {
        self.workspace.is_some() || !self.types.is_empty() || !self.tags.is_empty()
    }

    /// Explicit strategy, else inferred from what the query carries
    pub fn resolve_strategy(&self) -> SearchStrategy {
        if let Some(strategy) = self.strategy {
            return strategy;
        }
        match (self.has_semantic_intent(), self.has_structural_filters()) {
            (true, false) => SearchStrategy::Vector,
            (false, _) => SearchStrategy::Graph,
            (true, true) => SearchStrategy::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySearchResult {
    pub memory: Memory,
    pub combined_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structural_score: Option<f64>,
    pub strategy: SearchStrategy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_inference() {
        assert_eq!(SearchQuery::text("auth").resolve_strategy(), SearchStrategy::Vector);
        assert_eq!(
            SearchQuery::text("auth").in_workspace("svc").resolve_strategy(),
            SearchStrategy::Hybrid
        );
        let structural = SearchQuery::default().with_tags(["rust"]);
        assert_eq!(structural.resolve_strategy(), SearchStrategy::Graph);
        assert_eq!(SearchQuery::default().resolve_strategy(), SearchStrategy::Graph);
    }

    #[test]
    fn test_explicit_strategy_wins() {
        let mut query = SearchQuery::text("auth").in_workspace("svc");
        query.strategy = Some(SearchStrategy::Vector);
        assert_eq!(query.resolve_strategy(), SearchStrategy::Vector);
    }

    #[test]
    fn test_blank_text_is_not_semantic() {
        let query = SearchQuery::text("   ");
        assert!(!query.has_semantic_intent());
    }

    #[test]
    fn test_max_age_humantime() {
        let query: SearchQuery = serde_json::from_str(r#"{"text":"auth","max_age":"7days"}"#).unwrap();
        assert_eq!(query.max_age, Some(Duration::from_secs(7 * 24 * 3600)));
    }
}
