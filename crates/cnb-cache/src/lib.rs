//! In-memory per-region snapshot cache and the read-side query service.
//!
//! The cache holds exactly the 27 fixed region keys from process start.
//! Each entry is an `Arc` swap behind its own lock: writers replace whole
//! snapshots, readers clone a pointer, and no operation takes a lock across
//! more than one region.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cnb_core::{
    region_by_code, CompetitionRecord, CompetitionStatus, Region, RegionHealth,
    RegionSnapshot, REGIONS,
};
use serde::Serialize;

pub struct RegionCache {
    entries: HashMap<&'static str, RwLock<Arc<RegionSnapshot>>>,
}

impl RegionCache {
    /// All 27 keys present, unpopulated, from the start.
    pub fn new() -> Self {
        let entries = REGIONS
            .iter()
            .map(|region| {
                (
                    region.code,
                    RwLock::new(Arc::new(RegionSnapshot::empty(region.code))),
                )
            })
            .collect();
        Self { entries }
    }

    fn entry(&self, region_code: &str) -> Option<&RwLock<Arc<RegionSnapshot>>> {
        let region = region_by_code(region_code)?;
        self.entries.get(region.code)
    }

    /// Current snapshot for a region; `None` only for codes outside the
    /// fixed set. Readers block at most for the duration of a pointer swap.
    pub fn get(&self, region_code: &str) -> Option<Arc<RegionSnapshot>> {
        self.entry(region_code)
            .map(|lock| lock.read().expect("region entry lock poisoned").clone())
    }

    /// Atomic whole-snapshot replace, keyed by `snapshot.region_code`.
    /// Returns `false` for codes outside the fixed set.
    pub fn put(&self, snapshot: RegionSnapshot) -> bool {
        match self.entry(&snapshot.region_code) {
            Some(lock) => {
                *lock.write().expect("region entry lock poisoned") = Arc::new(snapshot);
                true
            }
            None => false,
        }
    }

    /// Records a failed attempt: only `last_attempt_at`/`last_error` move,
    /// a previously successful record list stays untouched.
    pub fn mark_failure(
        &self,
        region_code: &str,
        error: &str,
        attempted_at: DateTime<Utc>,
    ) -> bool {
        match self.entry(region_code) {
            Some(lock) => {
                let mut guard = lock.write().expect("region entry lock poisoned");
                let mut updated = RegionSnapshot::clone(&guard);
                updated.last_attempt_at = Some(attempted_at);
                updated.last_error = Some(error.to_string());
                *guard = Arc::new(updated);
                true
            }
            None => false,
        }
    }

    /// Point-in-time view over all regions, in region-table order. Each
    /// snapshot is internally consistent; the view is not transactionally
    /// simultaneous across regions.
    pub fn all(&self) -> Vec<Arc<RegionSnapshot>> {
        REGIONS
            .iter()
            .filter_map(|region| self.get(region.code))
            .collect()
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Open/scheduled/total counters for one region or the grand total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegionCounts {
    pub open: usize,
    pub scheduled: usize,
    pub total: usize,
}

impl RegionCounts {
    fn count(records: &[CompetitionRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.status {
                CompetitionStatus::Open => counts.open += 1,
                CompetitionStatus::Scheduled => counts.scheduled += 1,
            }
            counts.total += 1;
        }
        counts
    }

    fn merge(&mut self, other: Self) {
        self.open += other.open;
        self.scheduled += other.scheduled;
        self.total += other.total;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub regions: BTreeMap<String, RegionCounts>,
    pub totals: RegionCounts,
    /// Regions with at least one successful refresh.
    pub populated_regions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub regions: BTreeMap<String, RegionHealth>,
    pub healthy: usize,
    pub degraded: usize,
    pub availability_percent: f64,
    /// Aggregate: "healthy" at >=80% healthy regions, "degraded" at >=50%,
    /// otherwise "unhealthy".
    pub status: &'static str,
    pub checked_at: DateTime<Utc>,
}

/// A record tagged with the region it came from, for cross-region listings.
#[derive(Debug, Clone, Serialize)]
pub struct RegionalRecord {
    pub region_code: String,
    #[serde(flatten)]
    pub record: CompetitionRecord,
}

/// A filtered record list paired with the snapshot it was computed from.
/// Built from a single cache read, so the list and the freshness metadata
/// always describe the same snapshot version.
#[derive(Debug, Clone)]
pub struct RegionView {
    pub snapshot: Arc<RegionSnapshot>,
    pub records: Vec<CompetitionRecord>,
}

/// Read-only views over the cache. Never performs network I/O and never
/// fails because of upstream conditions: at worst it answers with empty
/// lists and a degraded health flag.
#[derive(Clone)]
pub struct QueryService {
    cache: Arc<RegionCache>,
    refresh_interval: Duration,
}

impl QueryService {
    pub fn new(cache: Arc<RegionCache>, refresh_interval: Duration) -> Self {
        Self {
            cache,
            refresh_interval,
        }
    }

    pub fn list_regions(&self) -> &'static [Region] {
        &REGIONS
    }

    /// Ordered, filtered record list for one region. `None` only for codes
    /// outside the fixed set; a cold region yields an empty list.
    pub fn get(
        &self,
        region_code: &str,
        status_filter: Option<CompetitionStatus>,
        search_text: Option<&str>,
    ) -> Option<Vec<CompetitionRecord>> {
        self.region_view(region_code, status_filter, search_text)
            .map(|view| view.records)
    }

    /// Filtered records together with the snapshot they came from. One cache
    /// read feeds both, so a concurrent replace can never pair an old record
    /// list with newer freshness metadata.
    pub fn region_view(
        &self,
        region_code: &str,
        status_filter: Option<CompetitionStatus>,
        search_text: Option<&str>,
    ) -> Option<RegionView> {
        let snapshot = self.cache.get(region_code)?;
        let records = filter_records(&snapshot.records, status_filter, search_text);
        Some(RegionView { snapshot, records })
    }

    /// Per-region and grand-total counts, computed purely from the cache.
    pub fn global_stats(&self) -> GlobalStats {
        let mut regions = BTreeMap::new();
        let mut totals = RegionCounts::default();
        let mut populated_regions = 0;

        for snapshot in self.cache.all() {
            let counts = RegionCounts::count(&snapshot.records);
            totals.merge(counts);
            if snapshot.is_populated() {
                populated_regions += 1;
            }
            regions.insert(snapshot.region_code.clone(), counts);
        }

        GlobalStats {
            regions,
            totals,
            populated_regions,
        }
    }

    pub fn health_summary(&self) -> HealthSummary {
        self.health_summary_at(Utc::now())
    }

    /// A region is healthy iff its last success is within twice the refresh
    /// interval of `now`; never-refreshed regions are degraded.
    pub fn health_summary_at(&self, now: DateTime<Utc>) -> HealthSummary {
        let mut regions = BTreeMap::new();
        let mut healthy = 0;

        for snapshot in self.cache.all() {
            let health = match snapshot.last_success_at {
                Some(at) if within_window(now, at, self.refresh_interval) => {
                    healthy += 1;
                    RegionHealth::Healthy
                }
                _ => RegionHealth::Degraded,
            };
            regions.insert(snapshot.region_code.clone(), health);
        }

        let total = regions.len().max(1);
        let degraded = total - healthy;
        let availability_percent = (healthy as f64 / total as f64) * 100.0;
        let status = if availability_percent >= 80.0 {
            "healthy"
        } else if availability_percent >= 50.0 {
            "degraded"
        } else {
            "unhealthy"
        };

        HealthSummary {
            regions,
            healthy,
            degraded,
            availability_percent,
            status,
            checked_at: now,
        }
    }

    /// Aggregated records across all 27 regions, in region-table order.
    pub fn search_all(&self, open_only: bool) -> Vec<RegionalRecord> {
        self.cache
            .all()
            .iter()
            .flat_map(|snapshot| {
                snapshot
                    .records
                    .iter()
                    .filter(|record| !open_only || record.status == CompetitionStatus::Open)
                    .map(|record| RegionalRecord {
                        region_code: snapshot.region_code.clone(),
                        record: record.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

fn filter_records(
    records: &[CompetitionRecord],
    status_filter: Option<CompetitionStatus>,
    search_text: Option<&str>,
) -> Vec<CompetitionRecord> {
    records
        .iter()
        .filter(|record| status_filter.is_none_or(|status| record.status == status))
        .filter(|record| {
            search_text
                .map(|needle| record.matches_search(needle))
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}

fn within_window(now: DateTime<Utc>, at: DateTime<Utc>, refresh_interval: Duration) -> bool {
    match (now - at).to_std() {
        Ok(age) => age <= refresh_interval.saturating_mul(2),
        // `at` in the future means fresher than fresh.
        Err(_) => true,
    }
}
