//! Health reporting for the queue store.
//!
//! A store is healthy while it accepts mutations and every side effect it
//! started after a commit has succeeded. One failed recall or notice degrades
//! it until the process restarts; shutdown makes it unhealthy.

/// Health check status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Accepting mutations, no side effect failures
    Healthy,

    /// Accepting mutations, but side effects have failed
    Degraded,

    /// Not accepting mutations
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is degraded
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Store counters a health check is derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    /// Shutdown has started
    pub shutting_down: bool,
    /// Side effects started but not finished
    pub pending_effects: usize,
    /// Side effects that failed since the store was created
    pub failed_effects: usize,
    /// Open requests across every registered item
    pub open_requests: usize,
}

/// Health of a queue store at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Derived status
    pub status: HealthStatus,

    /// Why the store is not healthy
    pub message: Option<String>,

    /// Counters the status was derived from
    pub counters: StoreCounters,
}

impl HealthCheck {
    /// Derive the status from the store's counters.
    ///
    /// Shutdown wins over failed effects.
    #[must_use]
    pub fn from_counters(counters: StoreCounters) -> Self {
        let (status, message) = if counters.shutting_down {
            (
                HealthStatus::Unhealthy,
                Some("Store is shutting down".to_string()),
            )
        } else if counters.failed_effects > 0 {
            (
                HealthStatus::Degraded,
                Some(format!("{} side effects failed", counters.failed_effects)),
            )
        } else {
            (HealthStatus::Healthy, None)
        };
        Self {
            status,
            message,
            counters,
        }
    }

    /// Counters as `(name, value)` pairs, for logs and health endpoints
    #[must_use]
    pub fn metadata(&self) -> [(&'static str, usize); 3] {
        [
            ("pending_effects", self.counters.pending_effects),
            ("failed_effects", self.counters.failed_effects),
            ("open_requests", self.counters.open_requests),
        ]
    }
}
