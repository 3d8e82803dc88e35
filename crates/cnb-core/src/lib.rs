//! Core domain model for the competition tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of tracked administrative regions (26 states + federal district).
pub const REGION_COUNT: usize = 27;

/// One fixed administrative region: two-letter code plus display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub code: &'static str,
    pub name: &'static str,
}

/// The fixed region table. Listing order is the canonical order for
/// aggregate views.
pub const REGIONS: [Region; REGION_COUNT] = [
    Region { code: "ac", name: "Acre" },
    Region { code: "al", name: "Alagoas" },
    Region { code: "ap", name: "Amapá" },
    Region { code: "am", name: "Amazonas" },
    Region { code: "ba", name: "Bahia" },
    Region { code: "ce", name: "Ceará" },
    Region { code: "df", name: "Distrito Federal" },
    Region { code: "es", name: "Espírito Santo" },
    Region { code: "go", name: "Goiás" },
    Region { code: "ma", name: "Maranhão" },
    Region { code: "mt", name: "Mato Grosso" },
    Region { code: "ms", name: "Mato Grosso do Sul" },
    Region { code: "mg", name: "Minas Gerais" },
    Region { code: "pa", name: "Pará" },
    Region { code: "pb", name: "Paraíba" },
    Region { code: "pr", name: "Paraná" },
    Region { code: "pe", name: "Pernambuco" },
    Region { code: "pi", name: "Piauí" },
    Region { code: "rj", name: "Rio de Janeiro" },
    Region { code: "rn", name: "Rio Grande do Norte" },
    Region { code: "rs", name: "Rio Grande do Sul" },
    Region { code: "ro", name: "Rondônia" },
    Region { code: "rr", name: "Roraima" },
    Region { code: "sc", name: "Santa Catarina" },
    Region { code: "sp", name: "São Paulo" },
    Region { code: "se", name: "Sergipe" },
    Region { code: "to", name: "Tocantins" },
];

/// Looks up a region by code, ignoring case and surrounding whitespace.
pub fn region_by_code(code: &str) -> Option<Region> {
    let code = code.trim();
    REGIONS
        .iter()
        .copied()
        .find(|region| region.code.eq_ignore_ascii_case(code))
}

/// Publication status of a competition as shown on the listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionStatus {
    Open,
    Scheduled,
}

impl CompetitionStatus {
    /// Classifies status text: any occurrence of the word "previsto"
    /// (case-insensitive) means the competition is only scheduled; every
    /// other value is open. There is no third state.
    pub fn classify(status_text: &str) -> Self {
        if status_text.to_lowercase().contains("previsto") {
            CompetitionStatus::Scheduled
        } else {
            CompetitionStatus::Open
        }
    }
}

/// One competition announcement as extracted from the listing table.
/// Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionRecord {
    pub organization: String,
    /// Free-form positions text as published, not normalized.
    pub positions: String,
    pub status: CompetitionStatus,
    /// Absolute detail link, when the row carries one.
    pub url: Option<String>,
}

impl CompetitionRecord {
    /// Case-insensitive substring match over organization and positions.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.organization.to_lowercase().contains(&needle)
            || self.positions.to_lowercase().contains(&needle)
    }
}

/// Latest known state for one region: the record list from the last
/// successful extraction plus freshness/error metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub region_code: String,
    /// Source table order, preserved.
    pub records: Vec<CompetitionRecord>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Cleared on the next successful refresh.
    pub last_error: Option<String>,
}

impl RegionSnapshot {
    /// Unpopulated snapshot, the state every region starts in.
    pub fn empty(region_code: impl Into<String>) -> Self {
        Self {
            region_code: region_code.into(),
            records: Vec::new(),
            last_success_at: None,
            last_attempt_at: None,
            last_error: None,
        }
    }

    /// Snapshot for a successful extraction at `at`.
    pub fn success(
        region_code: impl Into<String>,
        records: Vec<CompetitionRecord>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            region_code: region_code.into(),
            records,
            last_success_at: Some(at),
            last_attempt_at: Some(at),
            last_error: None,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.last_success_at.is_some()
    }
}

/// Freshness signal derived from a snapshot's `last_success_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionHealth {
    Healthy,
    Degraded,
}
