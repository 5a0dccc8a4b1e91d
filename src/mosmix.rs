//! This module provides the main entry point: the [`Mosmix`] client, which owns the
//! shared station registry and refresh coordinator, and [`StationQuery`], the handle a
//! single caller uses to query one station.

use crate::config::{hours_to_duration, StationQueryConfig};
use crate::error::MosmixError;
use crate::fetch::source::{ForecastSource, HttpForecastSource, DEFAULT_BASE_URL};
use crate::query::engine::QueryEngine;
use crate::query::snapshot::ForecastSnapshot;
use crate::refresh::{RefreshCoordinator, RefreshOutcome, RefreshPolicy};
use crate::store::registry::StationRegistry;
use crate::types::extra_field::ExtraField;
use bon::bon;
use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, Stream};
use log::debug;
use std::sync::Arc;
use tokio::time::{Interval, MissedTickBehavior};

/// The client that keeps MOSMIX forecasts for any number of stations.
///
/// Every [`StationQuery`] created from one client shares its registry, so a station
/// queried by several callers is downloaded once per refresh cycle.
///
/// # Examples
///
/// ```no_run
/// # use mosmix::{Mosmix, MosmixError};
/// # #[tokio::main]
/// # async fn main() -> Result<(), MosmixError> {
/// let client = Mosmix::builder().build();
/// let frankfurt = client.station("10637").call();
/// let snapshot = frankfurt.query().await?;
/// println!("{} °C at {}", snapshot.temperature_c, snapshot.station);
/// # Ok(())
/// # }
/// ```
pub struct Mosmix {
    registry: Arc<StationRegistry>,
    coordinator: Arc<RefreshCoordinator>,
    engine: QueryEngine,
}

#[bon]
impl Mosmix {
    /// Creates a client downloading from the DWD open data server.
    ///
    /// # Optional Builder Methods
    ///
    /// * `.base_url(..)`: directory holding the per-station folders. Defaults to
    ///   [`DEFAULT_BASE_URL`].
    /// * `.client(reqwest::Client)`: HTTP client to download with.
    /// * `.max_age(Duration)`: how long a decoded forecast counts as fresh. Defaults
    ///   to 3590 seconds.
    /// * `.retry_backoff(Duration)`: how long to wait after a failed fetch. Defaults
    ///   to 10 minutes.
    #[builder]
    pub fn new(
        #[builder(into)] base_url: Option<String>,
        client: Option<reqwest::Client>,
        max_age: Option<Duration>,
        retry_backoff: Option<Duration>,
    ) -> Self {
        let defaults = RefreshPolicy::default();
        let policy = RefreshPolicy {
            max_age: max_age.unwrap_or(defaults.max_age),
            retry_backoff: retry_backoff.unwrap_or(defaults.retry_backoff),
        };
        let source = HttpForecastSource::new(
            client.unwrap_or_default(),
            base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        );
        Self::with_source(Arc::new(source), policy)
    }

    /// Creates a client reading forecasts from any [`ForecastSource`].
    pub fn with_source(source: Arc<dyn ForecastSource>, policy: RefreshPolicy) -> Self {
        let registry = Arc::new(StationRegistry::new());
        Self {
            coordinator: Arc::new(RefreshCoordinator::new(
                Arc::clone(&registry),
                source,
                policy,
            )),
            engine: QueryEngine::new(Arc::clone(&registry)),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<StationRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.coordinator.policy()
    }

    /// Refreshes `station` if its forecast is due. See [`RefreshCoordinator::ensure_fresh`].
    pub async fn ensure_fresh(&self, station: &str) -> Result<RefreshOutcome, MosmixError> {
        self.coordinator.ensure_fresh(station).await
    }

    /// Subscribes to a station as described by a host configuration.
    pub fn subscribe(&self, config: &StationQueryConfig) -> StationQuery {
        self.station(&config.station)
            .extra_fields(config.extra_fields())
            .look_ahead(config.look_ahead())
            .maybe_repeat(config.repeat_interval())
            .call()
    }

    /// Subscribes to `station` and returns the caller's [`StationQuery`].
    ///
    /// The extra fields are added to the station's requested element set; they are
    /// extracted from the next download. Call `.call()` to finish the builder.
    ///
    /// # Optional Builder Methods
    ///
    /// * `.extra_fields(Vec<ExtraField>)`: fields added to every snapshot.
    /// * `.look_ahead(Duration)`: offset of the query instant from now. Defaults to zero.
    /// * `.repeat(std::time::Duration)`: period of [`StationQuery::watch`]. A zero or
    ///   missing period makes `watch` yield a single result.
    #[builder(start_fn = station)]
    pub fn build_station(
        &self,
        #[builder(start_fn)] station: &str,
        extra_fields: Option<Vec<ExtraField>>,
        look_ahead: Option<Duration>,
        repeat: Option<std::time::Duration>,
    ) -> StationQuery {
        let fields = extra_fields.unwrap_or_default();
        self.registry
            .subscribe(station, fields.iter().map(|field| field.name.as_str()));
        debug!(
            "Subscribed to station {} ({} subscribers)",
            station,
            self.registry.subscribers(station)
        );
        StationQuery {
            station: station.to_string(),
            fields,
            look_ahead: look_ahead.unwrap_or_else(Duration::zero),
            repeat: repeat.filter(|period| !period.is_zero()),
            coordinator: Arc::clone(&self.coordinator),
            engine: self.engine.clone(),
        }
    }
}

/// One caller's subscription to a station.
///
/// Dropping the handle releases the subscription; when the last handle for a station
/// is dropped, everything known about the station is forgotten.
pub struct StationQuery {
    station: String,
    fields: Vec<ExtraField>,
    look_ahead: Duration,
    repeat: Option<std::time::Duration>,
    coordinator: Arc<RefreshCoordinator>,
    engine: QueryEngine,
}

impl StationQuery {
    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn fields(&self) -> &[ExtraField] {
        &self.fields
    }

    pub fn look_ahead(&self) -> Duration {
        self.look_ahead
    }

    pub async fn ensure_fresh(&self) -> Result<RefreshOutcome, MosmixError> {
        self.coordinator.ensure_fresh(&self.station).await
    }

    /// Snapshot of the current table at `at`, without refreshing.
    pub fn snapshot_at(&self, at: DateTime<Utc>) -> Result<ForecastSnapshot, MosmixError> {
        self.engine.snapshot(&self.station, at, &self.fields)
    }

    /// Refreshes if due, then assembles the snapshot for now plus the configured look-ahead.
    ///
    /// # Errors
    ///
    /// Any refresh error is returned as is; no snapshot is produced from an older
    /// table when the refresh fails.
    pub async fn query(&self) -> Result<ForecastSnapshot, MosmixError> {
        self.query_with_look_ahead(None).await
    }

    /// Like [`query`](Self::query); `Some(hours)` replaces the configured look-ahead for
    /// this call only.
    pub async fn query_with_look_ahead(
        &self,
        hours: Option<f64>,
    ) -> Result<ForecastSnapshot, MosmixError> {
        self.ensure_fresh().await?;
        let look_ahead = hours.map_or(self.look_ahead, hours_to_duration);
        self.snapshot_at(offset_from_now(look_ahead))
    }

    /// A stream of [`query`](Self::query) results, the first one immediately and then
    /// one per repeat period. Without a repeat period the stream ends after one result.
    pub fn watch(
        &self,
    ) -> impl Stream<Item = Result<ForecastSnapshot, MosmixError>> + '_ {
        let ticker = self.repeat.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        stream::unfold(
            (ticker, false),
            move |(mut ticker, done): (Option<Interval>, bool)| async move {
                if done {
                    return None;
                }
                if let Some(ticker) = ticker.as_mut() {
                    ticker.tick().await;
                }
                let result = self.query().await;
                let done = ticker.is_none();
                Some((result, (ticker, done)))
            },
        )
    }
}

/// `now + look_ahead`, clamped to the representable range. A far future instant then
/// reports [`MosmixError::NoFuturePredictions`]; a far past one clamps to the first step.
fn offset_from_now(look_ahead: Duration) -> DateTime<Utc> {
    Utc::now()
        .checked_add_signed(look_ahead)
        .unwrap_or(if look_ahead < Duration::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

impl Drop for StationQuery {
    fn drop(&mut self) {
        if self.coordinator.registry().release(&self.station) {
            debug!("Released station {}, forecast forgotten", self.station);
        }
    }
}
