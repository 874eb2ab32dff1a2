use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// Health Check Abstractions
// ============================================================================
//
// Component health as reported to the health monitor, plus the board the
// monitor publishes its latest aggregate to. HTTP handlers read the board
// instead of asking the actor.
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }

    /// Gauge value: 0 healthy, 1 degraded, 2 unhealthy
    pub fn code(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Unhealthy(_) => 2,
        }
    }
}

/// Health information for a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    #[serde(flatten)]
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus, at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: at,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

impl SystemHealth {
    /// Fold component states: any unhealthy → unhealthy, else any degraded → degraded
    pub fn aggregate(components: BTreeMap<String, ComponentHealth>, check_time: DateTime<Utc>) -> Self {
        let unhealthy: Vec<String> = components
            .values()
            .filter_map(|c| match &c.status {
                HealthStatus::Unhealthy(reason) => Some(format!("{}: {}", c.name, reason)),
                _ => None,
            })
            .collect();
        let degraded: Vec<&str> = components
            .values()
            .filter(|c| matches!(c.status, HealthStatus::Degraded(_)))
            .map(|c| c.name.as_str())
            .collect();

        let overall_status = if !unhealthy.is_empty() {
            HealthStatus::Unhealthy(unhealthy.join(", "))
        } else if !degraded.is_empty() {
            HealthStatus::Degraded(format!("degraded: {}", degraded.join(", ")))
        } else {
            HealthStatus::Healthy
        };

        Self {
            overall_status,
            components,
            check_time,
        }
    }
}

/// Latest published system health, shared with the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct HealthBoard {
    latest: Arc<RwLock<Option<SystemHealth>>>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, health: SystemHealth) {
        *self.latest.write().unwrap_or_else(|p| p.into_inner()) = Some(health);
    }

    /// Latest snapshot; healthy with no components before the first publish
    pub fn snapshot(&self) -> SystemHealth {
        self.latest
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .unwrap_or_else(|| SystemHealth::aggregate(BTreeMap::new(), Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, status: HealthStatus) -> (String, ComponentHealth) {
        (name.to_string(), ComponentHealth::new(name, status, Utc::now()))
    }

    #[test]
    fn test_unhealthy_component_dominates() {
        let components = BTreeMap::from([
            component("payment_gateway", HealthStatus::Unhealthy("circuit open".to_string())),
            component("notifier", HealthStatus::Degraded("half-open".to_string())),
            component("sweep_scheduler", HealthStatus::Healthy),
        ]);

        let health = SystemHealth::aggregate(components, Utc::now());
        assert_eq!(
            health.overall_status,
            HealthStatus::Unhealthy("payment_gateway: circuit open".to_string())
        );
    }

    #[test]
    fn test_degraded_without_unhealthy() {
        let components = BTreeMap::from([
            component("notifier", HealthStatus::Degraded("half-open".to_string())),
            component("sweep_scheduler", HealthStatus::Healthy),
        ]);

        let health = SystemHealth::aggregate(components, Utc::now());
        assert!(matches!(health.overall_status, HealthStatus::Degraded(_)));
        assert_eq!(health.overall_status.code(), 1);
    }

    #[test]
    fn test_board_defaults_to_healthy() {
        let board = HealthBoard::new();
        assert!(board.snapshot().overall_status.is_healthy());

        board.publish(SystemHealth::aggregate(
            BTreeMap::from([component("notifier", HealthStatus::Unhealthy("down".to_string()))]),
            Utc::now(),
        ));
        assert!(board.snapshot().overall_status.is_unhealthy());
    }

    #[test]
    fn test_status_serializes_with_reason() {
        let json = serde_json::to_value(HealthStatus::Degraded("slow".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "degraded", "reason": "slow"}));
    }
}
