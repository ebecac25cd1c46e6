//! Report lookups with stale-read fallback and concurrent fan-out.
//!
//! Every lookup reads the bearer token from the shared [`CredentialStore`],
//! asks upstream for the report, and records successful results in a
//! per-kind [`ReportCache`]. When upstream fails the cached report is served
//! instead, chosen by the configured [`FallbackPolicy`].
//!
//! Batch lookups run one fetch per tracker concurrently and keep the input
//! order. Each slot resolves to a [`FetchOutcome`]; the public batch calls
//! collapse those to all-or-nothing: either every position has a report
//! (fresh or cached) or the whole batch fails with
//! [`GatewayError::TrackerNotFound`].
//!
//! The fan-out is a plain `join_all` over the requested ids: every fetch is
//! polled on the calling task, so it overlaps I/O but never runs on more than
//! one worker thread. The number of in-flight requests equals the number of
//! ids in the batch.

use std::sync::Arc;

use futures::future::join_all;

use crate::client::TelemetryApi;
use crate::config::{FallbackPolicy, GatewayConfig};
use crate::credential_cache::CredentialStore;
use crate::error::{GatewayError, Result};
use crate::report_cache::ReportCache;
use crate::types::{Freshness, HardwareReport, LocationReport, Lookup, Report, TrackerId};

/// Result of a single tracker fetch inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<R> {
    /// Upstream answered.
    Fresh(R),
    /// Upstream failed; a cached report stands in.
    Fallback(R),
    /// Upstream failed and nothing was cached. Holds the upstream error.
    Failed(GatewayError),
}

impl<R> FetchOutcome<R> {
    pub fn into_lookup(self) -> Result<Lookup<R>> {
        match self {
            Self::Fresh(report) => Ok(Lookup {
                report,
                freshness: Freshness::Fresh,
            }),
            Self::Fallback(report) => Ok(Lookup {
                report,
                freshness: Freshness::Stale,
            }),
            Self::Failed(_) => Err(GatewayError::TrackerNotFound),
        }
    }
}

/// Report types the gateway keeps a cache for.
pub trait GatewayReport: Report {
    #[doc(hidden)]
    fn cache(gateway: &ReportGateway) -> &ReportCache<Self>;
}

impl GatewayReport for LocationReport {
    fn cache(gateway: &ReportGateway) -> &ReportCache<Self> {
        &gateway.locations
    }
}

impl GatewayReport for HardwareReport {
    fn cache(gateway: &ReportGateway) -> &ReportCache<Self> {
        &gateway.hardware
    }
}

pub struct ReportGateway {
    api: Arc<dyn TelemetryApi>,
    store: CredentialStore,
    policy: FallbackPolicy,
    locations: ReportCache<LocationReport>,
    hardware: ReportCache<HardwareReport>,
}

impl ReportGateway {
    pub fn new(api: Arc<dyn TelemetryApi>, store: CredentialStore, config: &GatewayConfig) -> Self {
        Self {
            api,
            store,
            policy: config.fallback,
            locations: ReportCache::new(config.cache_capacity, config.cache_ttl),
            hardware: ReportCache::new(config.cache_capacity, config.cache_ttl),
        }
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    pub fn cache<R: GatewayReport>(&self) -> &ReportCache<R> {
        R::cache(self)
    }

    /// Latest report for one tracker, falling back to the cache on upstream failure.
    pub async fn fetch_one<R: GatewayReport>(&self, tracker_id: &TrackerId) -> Result<R> {
        self.lookup_one(tracker_id).await.map(|l| l.report)
    }

    /// Like [`fetch_one`](Self::fetch_one), but says whether the report is stale.
    pub async fn lookup_one<R: GatewayReport>(&self, tracker_id: &TrackerId) -> Result<Lookup<R>> {
        tracing::info!("Get {} for tracker '{}'", R::KIND, tracker_id);
        let bearer = self.store.bearer_token().await?;
        self.fetch_outcome::<R>(&bearer, tracker_id)
            .await
            .into_lookup()
    }

    /// Latest reports for several trackers, in input order.
    pub async fn fetch_many<R: GatewayReport>(&self, tracker_ids: &[TrackerId]) -> Result<Vec<R>> {
        let lookups = self.lookup_many(tracker_ids).await?;
        Ok(lookups.into_iter().map(|l| l.report).collect())
    }

    pub async fn lookup_many<R: GatewayReport>(
        &self,
        tracker_ids: &[TrackerId],
    ) -> Result<Vec<Lookup<R>>> {
        self.fetch_outcomes::<R>(tracker_ids)
            .await?
            .into_iter()
            .map(FetchOutcome::into_lookup)
            .collect()
    }

    /// Per-tracker outcomes of a batch, before the all-or-nothing collapse.
    ///
    /// Only fails with [`GatewayError::NotAuthenticated`]; upstream failures are
    /// reported per slot.
    pub async fn fetch_outcomes<R: GatewayReport>(
        &self,
        tracker_ids: &[TrackerId],
    ) -> Result<Vec<FetchOutcome<R>>> {
        tracing::info!(
            "Get {} for {} tracker(s): {}",
            R::KIND,
            tracker_ids.len(),
            join_ids(tracker_ids)
        );
        let bearer = self.store.bearer_token().await?;

        let fetches = tracker_ids
            .iter()
            .map(|tracker_id| self.fetch_outcome::<R>(&bearer, tracker_id));
        Ok(join_all(fetches).await)
    }

    /// Fetch without fallback. Upstream failures come back untouched.
    pub async fn fetch_live<R: GatewayReport>(&self, tracker_id: &TrackerId) -> Result<R> {
        let bearer = self.store.bearer_token().await?;
        self.fetch_upstream(&bearer, tracker_id).await
    }

    pub async fn fetch_location(&self, tracker_id: &TrackerId) -> Result<LocationReport> {
        self.fetch_one(tracker_id).await
    }

    pub async fn fetch_locations(&self, tracker_ids: &[TrackerId]) -> Result<Vec<LocationReport>> {
        self.fetch_many(tracker_ids).await
    }

    pub async fn fetch_hardware(&self, tracker_id: &TrackerId) -> Result<HardwareReport> {
        self.fetch_one(tracker_id).await
    }

    pub async fn fetch_hardware_reports(
        &self,
        tracker_ids: &[TrackerId],
    ) -> Result<Vec<HardwareReport>> {
        self.fetch_many(tracker_ids).await
    }

    /// `battery_level` of the tracker's hardware report (fallback applies).
    /// `None` when upstream reported no level.
    pub async fn battery_level(&self, tracker_id: &TrackerId) -> Result<Option<u8>> {
        self.lookup_battery_level(tracker_id).await.map(|l| l.report)
    }

    pub async fn lookup_battery_level(
        &self,
        tracker_id: &TrackerId,
    ) -> Result<Lookup<Option<u8>>> {
        let lookup = self.lookup_one::<HardwareReport>(tracker_id).await?;
        Ok(lookup.map(|report| report.battery_level))
    }

    pub async fn battery_levels(&self, tracker_ids: &[TrackerId]) -> Result<Vec<Option<u8>>> {
        let lookups = self.lookup_battery_levels(tracker_ids).await?;
        Ok(lookups.into_iter().map(|l| l.report).collect())
    }

    pub async fn lookup_battery_levels(
        &self,
        tracker_ids: &[TrackerId],
    ) -> Result<Vec<Lookup<Option<u8>>>> {
        let lookups = self.lookup_many::<HardwareReport>(tracker_ids).await?;
        Ok(lookups
            .into_iter()
            .map(|l| l.map(|report| report.battery_level))
            .collect())
    }

    async fn fetch_outcome<R: GatewayReport>(
        &self,
        bearer: &str,
        tracker_id: &TrackerId,
    ) -> FetchOutcome<R> {
        let err = match self.fetch_upstream::<R>(bearer, tracker_id).await {
            Ok(report) => return FetchOutcome::Fresh(report),
            Err(err) => err,
        };

        match R::cache(self).fallback(tracker_id, self.policy) {
            Some(report) => {
                tracing::warn!(
                    "Error while getting {} for tracker '{}': {}. Returning last {} instead",
                    R::KIND,
                    tracker_id,
                    err,
                    R::KIND
                );
                FetchOutcome::Fallback(report)
            }
            None => {
                tracing::error!(
                    "Error while getting {} for tracker '{}': {}. Nothing cached",
                    R::KIND,
                    tracker_id,
                    err
                );
                FetchOutcome::Failed(err)
            }
        }
    }

    async fn fetch_upstream<R: GatewayReport>(
        &self,
        bearer: &str,
        tracker_id: &TrackerId,
    ) -> Result<R> {
        let body = self.api.fetch_report(R::KIND, tracker_id, bearer).await?;
        let report: R = serde_json::from_value(body).map_err(|e| GatewayError::Upstream {
            status: None,
            message: format!("Malformed {} for tracker '{}': {}", R::KIND, tracker_id, e),
        })?;

        R::cache(self).store(tracker_id, report.clone());
        tracing::debug!("Tracker {} found for '{}'", R::KIND, tracker_id);
        Ok(report)
    }
}

fn join_ids(tracker_ids: &[TrackerId]) -> String {
    tracker_ids
        .iter()
        .map(TrackerId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
