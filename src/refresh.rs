//! Keeps station forecasts fresh: decides when a fetch is due, runs at most one
//! fetch-and-decode cycle per station at a time, and throttles retries after failures.

use crate::decoder::archive::with_kml_member;
use crate::decoder::kml::{DecodeSummary, KmlDecoder};
use crate::error::MosmixError;
use crate::fetch::error::FetchError;
use crate::fetch::source::ForecastSource;
use crate::store::registry::{ForecastSink, StationRegistry};
use chrono::{Duration, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task;
use tokio_util::io::SyncIoBridge;

/// How long forecasts stay fresh and how long to wait before retrying a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Freshness granted once a fetch starts producing data. MOSMIX_L is reissued
    /// hourly; the default is slightly less so an hourly trigger always picks up the
    /// new issue.
    pub max_age: Duration,
    /// Deadline set when a fetch starts; it stays in effect if the fetch fails.
    pub retry_backoff: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::seconds(3590),
            retry_backoff: Duration::minutes(10),
        }
    }
}

/// Result of [`RefreshCoordinator::ensure_fresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The deadline had not passed; nothing was fetched.
    Fresh,
    /// A new forecast was decoded.
    Refreshed(DecodeSummary),
}

type SharedRefresh = Shared<BoxFuture<'static, Result<RefreshOutcome, MosmixError>>>;
/// Per station: the registry generation the refresh writes into, and its outcome.
type InFlight = Arc<Mutex<HashMap<String, (u64, SharedRefresh)>>>;

/// Removes a refresh's in-flight entry on every exit path of its task, including a
/// panic or the runtime shutting down.
struct InFlightGuard {
    in_flight: InFlight,
    station: String,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer refresh may already have replaced this one.
        let current = in_flight.get(&self.station).map(|(generation, _)| *generation);
        if current == Some(self.generation) {
            in_flight.remove(&self.station);
        }
    }
}

pub struct RefreshCoordinator {
    registry: Arc<StationRegistry>,
    source: Arc<dyn ForecastSource>,
    policy: RefreshPolicy,
    in_flight: InFlight,
}

impl RefreshCoordinator {
    pub fn new(
        registry: Arc<StationRegistry>,
        source: Arc<dyn ForecastSource>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            registry,
            source,
            policy,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<StationRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Fetches and decodes the station's forecast if its next-refresh deadline is
    /// unset or has passed; otherwise returns [`RefreshOutcome::Fresh`] immediately.
    ///
    /// Concurrent calls for a station share one in-flight refresh and all receive its
    /// outcome. The refresh runs as its own task, so dropping the returned future does
    /// not cancel it. A refresh started before the station was forgotten is not joined;
    /// its results are discarded.
    ///
    /// # Errors
    ///
    /// [`MosmixError::StationNotPublished`] if the server has no product for the
    /// station, [`MosmixError::FetchFailed`] for any other transport, archive or
    /// document error. In both cases the next attempt is held back by the retry backoff.
    pub async fn ensure_fresh(&self, station: &str) -> Result<RefreshOutcome, MosmixError> {
        let refresh = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            let current = self.registry.generation(station);
            match in_flight.get(station) {
                Some((generation, refresh)) if Some(*generation) == current => {
                    debug!("Joining in-flight refresh for station {}", station);
                    refresh.clone()
                }
                _ => {
                    let now = Utc::now();
                    if !self.registry.is_due(station, now) {
                        debug!("Forecast for station {} is still fresh", station);
                        return Ok(RefreshOutcome::Fresh);
                    }
                    let generation = self
                        .registry
                        .arm_refresh(station, now + self.policy.retry_backoff);
                    let refresh = self.spawn_refresh(station, generation);
                    in_flight.insert(station.to_string(), (generation, refresh.clone()));
                    refresh
                }
            }
        };
        refresh.await
    }

    // Called with the in-flight lock held; the task removes its own entry when done.
    fn spawn_refresh(&self, station: &str, generation: u64) -> SharedRefresh {
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            station: station.to_string(),
            generation,
        };
        let handle = tokio::spawn(refresh_station(
            Arc::clone(&self.registry),
            Arc::clone(&self.source),
            self.policy,
            generation,
            guard,
        ));
        let station = station.to_string();
        async move {
            handle.await.unwrap_or_else(|e| {
                Err(MosmixError::from_fetch(&station, FetchError::TaskJoin(e)))
            })
        }
        .boxed()
        .shared()
    }
}

async fn refresh_station(
    registry: Arc<StationRegistry>,
    source: Arc<dyn ForecastSource>,
    policy: RefreshPolicy,
    generation: u64,
    guard: InFlightGuard,
) -> Result<RefreshOutcome, MosmixError> {
    let station = guard.station.as_str();
    info!("Refreshing forecast for station {}", station);

    match fetch_and_decode(&registry, source.as_ref(), policy, station, generation).await {
        Ok(summary) => {
            info!(
                "Decoded forecast for station {} ({}): {} time steps, {} series",
                station, summary.description, summary.time_steps, summary.series
            );
            Ok(RefreshOutcome::Refreshed(summary))
        }
        Err(error) => {
            // The decoder grants full freshness at the first tag; a failed cycle must not keep it.
            registry
                .cycle(generation)
                .set_next_refresh(station, Utc::now() + policy.retry_backoff);
            warn!("Refreshing forecast for station {} failed: {}", station, error);
            Err(MosmixError::from_fetch(station, error))
        }
    }
}

async fn fetch_and_decode(
    registry: &Arc<StationRegistry>,
    source: &dyn ForecastSource,
    policy: RefreshPolicy,
    station: &str,
    generation: u64,
) -> Result<DecodeSummary, FetchError> {
    let body = source.open(station).await?;
    let elements = registry.requested_elements(station);
    let reader = SyncIoBridge::new(body);
    let registry = Arc::clone(registry);
    let station = station.to_string();

    task::spawn_blocking(move || {
        let cycle = registry.cycle(generation);
        with_kml_member(reader, |document| {
            KmlDecoder::new(&cycle, &station, &elements, policy.max_age).decode(document)
        })
    })
    .await?
}
