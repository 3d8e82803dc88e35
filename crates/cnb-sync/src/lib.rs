//! Refresh cycle orchestration: per-region fan-out into fetch + extract,
//! fan-in as atomic cache writes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use cnb_cache::RegionCache;
use cnb_core::{RegionSnapshot, REGIONS};
use cnb_extract::ExtractionError;
use cnb_fetch::{FetchConfig, FetchError, Fetcher};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use url::Url;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub refresh_interval: Duration,
    pub http_timeout: Duration,
    pub user_agent: String,
    /// Upper bound on simultaneous outbound requests within a cycle.
    /// A tuning knob for upstream politeness, not a correctness requirement.
    pub fetch_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: cnb_fetch::DEFAULT_BASE_URL.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            http_timeout: cnb_fetch::DEFAULT_TIMEOUT,
            user_agent: cnb_fetch::DEFAULT_USER_AGENT.to_string(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("CNB_BASE_URL").unwrap_or(defaults.base_url),
            refresh_interval: env_secs("CNB_REFRESH_INTERVAL_SECS")
                .unwrap_or(defaults.refresh_interval),
            http_timeout: env_secs("CNB_HTTP_TIMEOUT_SECS").unwrap_or(defaults.http_timeout),
            user_agent: std::env::var("CNB_USER_AGENT").unwrap_or(defaults.user_agent),
            fetch_concurrency: std::env::var("CNB_FETCH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fetch_concurrency),
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}

#[derive(Debug, Error)]
enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractionError),
    #[error("invalid listing url: {0}")]
    ListingUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy)]
pub struct CycleSummary {
    pub refreshed: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Drives one startup pass and then fixed-interval passes until the process
/// exits. Cycles run strictly one after another, so a region never has two
/// in-flight refreshes.
pub struct RefreshScheduler {
    cache: Arc<RegionCache>,
    fetcher: Fetcher,
    refresh_interval: Duration,
    limit: Arc<Semaphore>,
}

impl RefreshScheduler {
    pub fn new(config: &SyncConfig, cache: Arc<RegionCache>) -> Result<Self> {
        let fetcher = Fetcher::new(FetchConfig {
            base_url: config.base_url.clone(),
            timeout: config.http_timeout,
            user_agent: config.user_agent.clone(),
        })?;
        Url::parse(&config.base_url)
            .with_context(|| format!("parsing base url {}", config.base_url))?;
        Ok(Self {
            cache,
            fetcher,
            refresh_interval: config.refresh_interval,
            limit: Arc::new(Semaphore::new(config.fetch_concurrency.max(1))),
        })
    }

    /// One full pass over all 27 regions. Per-region failures are recorded
    /// in the cache and never abort or delay the other regions.
    pub async fn run_cycle(&self) -> CycleSummary {
        let started = Instant::now();
        info!("starting refresh cycle");

        let mut handles = Vec::with_capacity(REGIONS.len());
        for region in &REGIONS {
            let fetcher = self.fetcher.clone();
            let cache = self.cache.clone();
            let limit = self.limit.clone();
            handles.push(tokio::spawn(async move {
                refresh_region(fetcher, cache, limit, region.code).await
            }));
        }

        let mut refreshed = 0usize;
        let mut failed = 0usize;
        for handle in handles {
            match handle.await {
                Ok(true) => refreshed += 1,
                Ok(false) => failed += 1,
                Err(err) => {
                    failed += 1;
                    error!("refresh task join error: {err}");
                }
            }
        }

        let elapsed = started.elapsed();
        info!(
            refreshed,
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "refresh cycle complete"
        );
        CycleSummary {
            refreshed,
            failed,
            elapsed,
        }
    }

    /// Startup pass immediately, then one pass per interval, forever.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // First tick completes immediately: the startup pass.
            ticker.tick().await;
            self.run_cycle().await;
        }
    }
}

async fn refresh_region(
    fetcher: Fetcher,
    cache: Arc<RegionCache>,
    limit: Arc<Semaphore>,
    region_code: &'static str,
) -> bool {
    let _permit = limit.acquire().await.expect("semaphore not closed");

    match fetch_and_extract(&fetcher, region_code).await {
        Ok(records) => {
            info!(region = region_code, records = records.len(), "region refreshed");
            cache.put(RegionSnapshot::success(region_code, records, Utc::now()))
        }
        Err(err) => {
            warn!(region = region_code, error = %err, "region refresh failed");
            cache.mark_failure(region_code, &err.to_string(), Utc::now());
            false
        }
    }
}

async fn fetch_and_extract(
    fetcher: &Fetcher,
    region_code: &'static str,
) -> Result<Vec<cnb_core::CompetitionRecord>, RefreshError> {
    // Relative detail links resolve against the page they appeared on, not
    // the shared listing base.
    let listing_page = Url::parse(&fetcher.listing_url(region_code))?;
    let raw_markup = fetcher.fetch(region_code).await?;
    // Extraction is CPU-bound and synchronous; no document state ever
    // crosses an await point.
    let records = cnb_extract::extract(&raw_markup, &listing_page)?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnb_core::CompetitionStatus;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SP_LISTING: &str = r#"
        <table>
          <tr><th>Órgão</th><th>Vagas</th><th>Situação</th></tr>
          <tr><td><a href="/concursos/pref-a/">Prefeitura A</a></td><td>10 vagas</td><td>aberto</td></tr>
          <tr><td>Tribunal B</td><td>5 vagas</td><td>Previsto para 2025</td></tr>
          <tr><td>Câmara C</td><td>3 vagas</td><td>aberto</td></tr>
        </table>
    "#;

    async fn scheduler_for(server: &MockServer, cache: Arc<RegionCache>) -> RefreshScheduler {
        let config = SyncConfig {
            base_url: format!("{}/concursos", server.uri()),
            refresh_interval: Duration::from_secs(3600),
            http_timeout: Duration::from_secs(2),
            user_agent: "cnb-tracker/test".to_string(),
            fetch_concurrency: 4,
        };
        RefreshScheduler::new(&config, cache).unwrap()
    }

    #[tokio::test]
    async fn cycle_populates_every_region_from_listing_markup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/concursos/[a-z]{2}/$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SP_LISTING))
            .mount(&server)
            .await;

        let cache = Arc::new(RegionCache::new());
        let summary = scheduler_for(&server, cache.clone()).await.run_cycle().await;

        assert_eq!(summary.refreshed, 27);
        assert_eq!(summary.failed, 0);

        let snapshot = cache.get("sp").unwrap();
        assert_eq!(snapshot.records.len(), 3);
        assert_eq!(snapshot.records[1].status, CompetitionStatus::Scheduled);
        assert_eq!(snapshot.records[0].status, CompetitionStatus::Open);
        assert!(snapshot
            .records[0]
            .url
            .as_deref()
            .unwrap()
            .ends_with("/concursos/pref-a/"));
        assert!(snapshot.is_populated());
    }

    #[tokio::test]
    async fn document_relative_links_resolve_against_the_region_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/concursos/[a-z]{2}/$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<table><tr><td><a href="edital/">Prefeitura D</a></td><td>2 vagas</td></tr></table>"#,
            ))
            .mount(&server)
            .await;

        let cache = Arc::new(RegionCache::new());
        scheduler_for(&server, cache.clone()).await.run_cycle().await;

        let mg = cache.get("mg").unwrap();
        let expected = format!("{}/concursos/mg/edital/", server.uri());
        assert_eq!(mg.records[0].url.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn one_failing_region_does_not_disturb_the_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/concursos/rj/"))
            .respond_with(ResponseTemplate::new(500))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/concursos/[a-z]{2}/$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SP_LISTING))
            .mount(&server)
            .await;

        let cache = Arc::new(RegionCache::new());
        let summary = scheduler_for(&server, cache.clone()).await.run_cycle().await;

        assert_eq!(summary.refreshed, 26);
        assert_eq!(summary.failed, 1);

        let rj = cache.get("rj").unwrap();
        assert!(!rj.is_populated());
        assert!(rj.last_error.as_deref().unwrap().contains("500"));
        assert!(rj.last_attempt_at.is_some());

        assert_eq!(cache.get("sp").unwrap().records.len(), 3);
    }

    #[tokio::test]
    async fn shape_change_marks_failure_but_keeps_previous_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/concursos/[a-z]{2}/$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><p>manutenção</p></html>"),
            )
            .mount(&server)
            .await;

        let cache = Arc::new(RegionCache::new());
        let succeeded_at = Utc::now();
        cache.put(RegionSnapshot::success(
            "sp",
            vec![cnb_core::CompetitionRecord {
                organization: "Prefeitura A".to_string(),
                positions: "10 vagas".to_string(),
                status: CompetitionStatus::Open,
                url: None,
            }],
            succeeded_at,
        ));

        let summary = scheduler_for(&server, cache.clone()).await.run_cycle().await;
        assert_eq!(summary.failed, 27);

        let sp = cache.get("sp").unwrap();
        assert_eq!(sp.records.len(), 1);
        assert_eq!(sp.last_success_at, Some(succeeded_at));
        assert!(sp.last_error.is_some());
    }

    #[test]
    fn default_config_matches_documented_intervals() {
        let config = SyncConfig::default();
        assert_eq!(config.refresh_interval, Duration::from_secs(3600));
        assert_eq!(config.http_timeout, Duration::from_secs(15));
        assert_eq!(config.fetch_concurrency, DEFAULT_FETCH_CONCURRENCY);
    }
}
