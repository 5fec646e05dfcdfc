use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SnapshotConfig;
use crate::types::Asset;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetValue {
    pub symbol: String,
    pub value: f64,
}

/// Point-in-time portfolio total with its per-asset breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub total_value: f64,
    pub asset_values: Vec<AssetValue>,
}

impl PortfolioSnapshot {
    pub fn from_assets(assets: &[Asset], timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            total_value: assets.iter().map(|a| a.value).sum(),
            asset_values: assets
                .iter()
                .map(|a| AssetValue {
                    symbol: a.symbol.clone(),
                    value: a.value,
                })
                .collect(),
        }
    }
}

/// Most recent snapshot by timestamp
pub fn latest(history: &[PortfolioSnapshot]) -> Option<&PortfolioSnapshot> {
    history.iter().max_by_key(|s| s.timestamp)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapshotDecision<'a> {
    Capture,
    ReuseLatest(&'a PortfolioSnapshot),
}

/// Debounce policy for the value history
#[derive(Debug, Clone, Copy)]
pub struct SnapshotPolicy {
    pub min_interval: Duration,
    pub min_change_percent: f64,
    pub retention: Duration,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::minutes(30),
            min_change_percent: 0.5,
            retention: Duration::days(7),
        }
    }
}

impl SnapshotPolicy {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            min_interval: Duration::minutes(config.min_interval_minutes),
            min_change_percent: config.min_change_percent,
            retention: Duration::days(config.retention_days),
        }
    }

    pub fn should_snapshot(&self, current_value: f64, history: &[PortfolioSnapshot], now: DateTime<Utc>) -> bool {
        matches!(self.decide(current_value, history, now), SnapshotDecision::Capture)
    }

    pub fn decide<'a>(
        &self,
        current_value: f64,
        history: &'a [PortfolioSnapshot],
        now: DateTime<Utc>,
    ) -> SnapshotDecision<'a> {
        let Some(last) = latest(history) else {
            return SnapshotDecision::Capture;
        };

        if now - last.timestamp >= self.min_interval {
            return SnapshotDecision::Capture;
        }

        // A zero baseline never triggers on change alone
        let percent_change = if last.total_value > 0.0 {
            (current_value - last.total_value).abs() / last.total_value * 100.0
        } else {
            0.0
        };
        if percent_change >= self.min_change_percent {
            return SnapshotDecision::Capture;
        }

        debug!(
            "Reusing snapshot from {} ({:.3}% change)",
            last.timestamp, percent_change
        );
        SnapshotDecision::ReuseLatest(last)
    }

    /// Drop snapshots that fell out of the retention window
    pub fn retain_window(&self, history: &mut Vec<PortfolioSnapshot>, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        history.retain(|s| s.timestamp > cutoff);
    }
}

/// Persistence contract for snapshot history
pub trait SnapshotStore {
    fn save(&mut self, snapshot: PortfolioSnapshot);

    /// Most recent snapshot no older than `lookback`
    fn latest_within(&self, lookback: Duration, now: DateTime<Utc>) -> Option<&PortfolioSnapshot>;

    /// Snapshots inside the retention window, oldest first
    fn history(&self, now: DateTime<Utc>) -> Vec<PortfolioSnapshot>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    snapshots: Vec<PortfolioSnapshot>,
    policy: SnapshotPolicy,
}

impl MemorySnapshotStore {
    pub fn new(policy: SnapshotPolicy) -> Self {
        Self {
            snapshots: Vec::new(),
            policy,
        }
    }

    pub fn with_snapshots(policy: SnapshotPolicy, snapshots: Vec<PortfolioSnapshot>) -> Self {
        Self { snapshots, policy }
    }

    /// Persist a new snapshot only when the policy asks for one; returns the
    /// snapshot now representing `assets` and whether it was newly captured.
    pub fn record(&mut self, assets: &[Asset], now: DateTime<Utc>) -> (PortfolioSnapshot, bool) {
        let candidate = PortfolioSnapshot::from_assets(assets, now);
        let recent: Vec<PortfolioSnapshot> = self.latest_within(self.policy.min_interval, now).cloned().into_iter().collect();

        match self.policy.decide(candidate.total_value, &recent, now) {
            SnapshotDecision::ReuseLatest(existing) => (existing.clone(), false),
            SnapshotDecision::Capture => {
                self.save(candidate.clone());
                (candidate, true)
            }
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&mut self, snapshot: PortfolioSnapshot) {
        let now = snapshot.timestamp;
        self.snapshots.push(snapshot);
        self.snapshots.sort_by_key(|s| s.timestamp);
        self.policy.retain_window(&mut self.snapshots, now);
    }

    fn latest_within(&self, lookback: Duration, now: DateTime<Utc>) -> Option<&PortfolioSnapshot> {
        let since = now - lookback;
        latest(&self.snapshots).filter(|s| s.timestamp >= since)
    }

    fn history(&self, now: DateTime<Utc>) -> Vec<PortfolioSnapshot> {
        let cutoff = now - self.policy.retention;
        self.snapshots
            .iter()
            .filter(|s| s.timestamp > cutoff)
            .cloned()
            .collect()
    }
}
