use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

use crate::alert::{Severity, SecurityAlert};

/// Derived counts shown on the dashboard header and metric cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedMetrics {
    /// Every alert currently held.
    pub total: usize,
    /// Alerts with critical or high severity.
    pub critical: usize,
    /// Alerts received within the last hour.
    pub recent: usize,
}

/// Ordered in-memory collection of received alerts, newest first.
///
/// Unbounded by default, matching the dashboard's behavior of keeping
/// everything for the session. An optional capacity limit can be set, in
/// which case the oldest alert is evicted when a new one arrives.
#[derive(Debug, Clone, Default)]
pub struct AlertFeed {
    alerts: VecDeque<SecurityAlert>,
    max_len: Option<usize>,
}

impl AlertFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounded feed: once `max_len` alerts are held, each new arrival
    /// evicts the oldest. `max_len` of zero is treated as unbounded.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            alerts: VecDeque::new(),
            max_len: (max_len > 0).then_some(max_len),
        }
    }

    /// Prepend a newly received alert.
    pub fn push(&mut self, alert: SecurityAlert) {
        self.alerts.push_front(alert);
        if let Some(max) = self.max_len {
            while self.alerts.len() > max {
                self.alerts.pop_back();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Drop every held alert. Connection handling is unaffected; this only
    /// touches the collection.
    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    /// Alerts in feed order, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &SecurityAlert> {
        self.alerts.iter()
    }

    pub fn get(&self, index: usize) -> Option<&SecurityAlert> {
        self.alerts.get(index)
    }

    /// Owned copy of the current feed, newest first.
    pub fn snapshot(&self) -> Vec<SecurityAlert> {
        self.alerts.iter().cloned().collect()
    }

    /// Counts per severity level, for the timeline breakdown.
    pub fn severity_counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for alert in &self.alerts {
            *counts.entry(alert.severity).or_insert(0) += 1;
        }
        counts
    }

    /// Derived metric counts relative to `now`. "Recent" means the alert's
    /// timestamp falls within the last hour.
    pub fn metrics(&self, now: DateTime<Utc>) -> FeedMetrics {
        let window = Duration::hours(1);
        FeedMetrics {
            total: self.alerts.len(),
            critical: self
                .alerts
                .iter()
                .filter(|a| a.severity.is_critical())
                .count(),
            recent: self
                .alerts
                .iter()
                .filter(|a| a.is_recent(window, now))
                .count(),
        }
    }
}
