// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Health report returned by `MemoryService::health`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Embedding provider or reasoning oracle failing; storage intact
    Degraded,
    /// Graph or vector store failing
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    GraphStore,
    VectorStore,
    EmbeddingProvider,
    ReasoningOracle,
}

impl Component {
    /// Whether a failure of this component makes the whole service unhealthy
    pub fn is_critical(&self) -> bool {
        matches!(self, Component::GraphStore | Component::VectorStore)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: Component,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let status = if components.iter().any(|c| !c.healthy && c.component.is_critical()) {
            HealthStatus::Unhealthy
        } else if components.iter().any(|c| !c.healthy) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        Self {
            status,
            components,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(component: Component, healthy: bool) -> ComponentHealth {
        ComponentHealth {
            component,
            healthy,
            latency_ms: healthy.then_some(1),
            error: (!healthy).then(|| "down".to_string()),
        }
    }

    #[test]
    fn test_status_derivation() {
        let all_up = vec![probe(Component::GraphStore, true), probe(Component::VectorStore, true)];
        assert_eq!(HealthReport::from_components(all_up).status, HealthStatus::Healthy);

        let embed_down = vec![probe(Component::GraphStore, true), probe(Component::EmbeddingProvider, false)];
        assert_eq!(HealthReport::from_components(embed_down).status, HealthStatus::Degraded);

        let vector_down = vec![probe(Component::VectorStore, false), probe(Component::ReasoningOracle, false)];
        assert_eq!(HealthReport::from_components(vector_down).status, HealthStatus::Unhealthy);
    }
}
