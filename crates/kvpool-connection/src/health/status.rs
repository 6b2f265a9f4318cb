//! Latency-based health classification

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health class of a connection, judged from its PING latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Round trip within the healthy threshold
    #[default]
    Healthy,
    /// Working, but latency is elevated
    Degraded,
    /// Very slow or not answering at all
    Unhealthy,
}

impl HealthStatus {
    /// Classify a latency using the default thresholds.
    ///
    /// Default thresholds:
    /// - Healthy: <= 50ms
    /// - Degraded: <= 250ms
    /// - Unhealthy: above that
    ///
    /// # Example
    ///
    /// ```
    /// use kvpool_connection::health::HealthStatus;
    /// use std::time::Duration;
    ///
    /// assert_eq!(HealthStatus::from_latency(Duration::from_millis(2)), HealthStatus::Healthy);
    /// assert_eq!(HealthStatus::from_latency(Duration::from_millis(120)), HealthStatus::Degraded);
    /// assert_eq!(HealthStatus::from_latency(Duration::from_secs(1)), HealthStatus::Unhealthy);
    /// ```
    pub fn from_latency(latency: Duration) -> Self {
        Self::from_latency_with_thresholds(latency, &HealthThresholds::default())
    }

    /// Classify a latency using custom thresholds.
    pub fn from_latency_with_thresholds(latency: Duration, thresholds: &HealthThresholds) -> Self {
        if latency <= thresholds.healthy_threshold {
            HealthStatus::Healthy
        } else if latency <= thresholds.degraded_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// `Healthy` and `Degraded` connections can still serve requests.
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Thresholds for health classification
#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    /// Maximum latency considered healthy
    pub healthy_threshold: Duration,
    /// Maximum latency considered degraded (above this is unhealthy)
    pub degraded_threshold: Duration,
}

impl HealthThresholds {
    /// Create new thresholds in milliseconds; the degraded bound never sits
    /// below the healthy one.
    pub fn new(healthy_ms: u64, degraded_ms: u64) -> Self {
        Self {
            healthy_threshold: Duration::from_millis(healthy_ms),
            degraded_threshold: Duration::from_millis(degraded_ms.max(healthy_ms)),
        }
    }
}

impl Default for HealthThresholds {
    /// Healthy <= 50ms, degraded <= 250ms
    fn default() -> Self {
        Self::new(50, 250)
    }
}
