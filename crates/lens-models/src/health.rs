//! Component health reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Liveness of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ComponentHealth {
    pub live: bool,
    /// Whether this component participates in overall health
    pub required: bool,
}

/// Result of one health poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthStatus {
    /// AND over all required components
    pub healthy: bool,
    pub components: BTreeMap<String, ComponentHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    pub fn from_components(components: BTreeMap<String, ComponentHealth>) -> Self {
        let healthy = components.values().filter(|c| c.required).all(|c| c.live);
        Self {
            healthy,
            components,
            checked_at: Utc::now(),
        }
    }

    /// Liveness of a named component, if it was polled.
    pub fn is_live(&self, name: &str) -> Option<bool> {
        self.components.get(name).map(|c| c.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_component_does_not_fail_overall_health() {
        let mut components = BTreeMap::new();
        components.insert("capture".to_string(), ComponentHealth { live: true, required: true });
        components.insert(
            "enrichment".to_string(),
            ComponentHealth { live: false, required: false },
        );

        let status = HealthStatus::from_components(components);
        assert!(status.healthy);
        assert_eq!(status.is_live("enrichment"), Some(false));
    }

    #[test]
    fn test_required_component_fails_overall_health() {
        let mut components = BTreeMap::new();
        components.insert("detector".to_string(), ComponentHealth { live: false, required: true });

        assert!(!HealthStatus::from_components(components).healthy);
    }
}
