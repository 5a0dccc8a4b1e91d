//! Station-keyed state shared by the refresh coordinator, the decoder and the query
//! engine: the current forecast table, the next-refresh deadline, the requested
//! element set and the number of callers subscribed to the station.

use crate::store::forecast_table::ForecastTable;
use crate::types::element::BASE_ELEMENTS;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Mutation interface the streaming decoder writes through.
///
/// Implementations must tolerate being called from a blocking worker thread.
pub trait ForecastSink: Send + Sync {
    /// Replaces the station's table with an empty one, discarding the previous cycle.
    fn reset(&self, station: &str);
    fn record_description(&self, station: &str, description: &str);
    /// Appends one forecast step to the station's time axis.
    fn record_timestamp(&self, station: &str, time: DateTime<Utc>);
    /// Stores the complete series for `element`, overwriting any earlier one in this cycle.
    fn record_series(&self, station: &str, element: &str, values: Vec<f64>);
    fn set_next_refresh(&self, station: &str, at: DateTime<Utc>);
}

#[derive(Debug, Default)]
struct StationEntry {
    /// Distinguishes this entry from earlier ones for the same station.
    generation: u64,
    table: Option<ForecastTable>,
    next_refresh: Option<DateTime<Utc>>,
    elements: BTreeSet<String>,
    subscribers: usize,
}

impl StationEntry {
    fn with_base_elements(generation: u64) -> Self {
        Self {
            generation,
            elements: BASE_ELEMENTS.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// In-memory registry of every station referenced by a caller.
///
/// Locks are held only for the duration of a single read or mutation, never across
/// an `.await`.
#[derive(Debug, Default)]
pub struct StationRegistry {
    stations: RwLock<HashMap<String, StationEntry>>,
    generations: AtomicU64,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StationEntry>> {
        self.stations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StationEntry>> {
        self.stations.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entry<R>(&self, station: &str, f: impl FnOnce(&mut StationEntry) -> R) -> R {
        let mut stations = self.write();
        let entry = stations.entry(station.to_string()).or_insert_with(|| {
            StationEntry::with_base_elements(self.generations.fetch_add(1, Ordering::Relaxed))
        });
        f(entry)
    }

    // Never creates an entry: writes for a forgotten or replaced station are dropped.
    fn with_generation(
        &self,
        station: &str,
        generation: u64,
        f: impl FnOnce(&mut StationEntry),
    ) {
        let mut stations = self.write();
        if let Some(entry) = stations.get_mut(station) {
            if entry.generation == generation {
                f(entry);
            }
        }
    }

    /// Registers a caller for `station` and adds its extra element codes to the
    /// station's requested set. The set only grows while callers remain subscribed.
    pub fn subscribe<'a>(
        &self,
        station: &str,
        extra_elements: impl IntoIterator<Item = &'a str>,
    ) {
        self.with_entry(station, |entry| {
            entry.subscribers += 1;
            entry
                .elements
                .extend(extra_elements.into_iter().map(str::to_string));
        });
    }

    /// Releases one caller of `station`. When the last caller leaves, the station's
    /// table, deadline and requested elements are forgotten. Returns `true` if so.
    pub fn release(&self, station: &str) -> bool {
        let mut stations = self.write();
        let Some(entry) = stations.get_mut(station) else {
            return false;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            stations.remove(station);
            true
        } else {
            false
        }
    }

    /// Drops everything known about `station`.
    pub fn forget(&self, station: &str) {
        self.write().remove(station);
    }

    pub fn subscribers(&self, station: &str) -> usize {
        self.read().get(station).map_or(0, |entry| entry.subscribers)
    }

    /// Element codes the decoder extracts for `station`; the base set for unknown stations.
    pub fn requested_elements(&self, station: &str) -> BTreeSet<String> {
        self.read().get(station).map_or_else(
            || BASE_ELEMENTS.iter().map(|e| e.to_string()).collect(),
            |entry| entry.elements.clone(),
        )
    }

    /// Generation of the station's current entry, `None` if the station is unknown.
    /// A station that is forgotten and registered again gets a new generation.
    pub fn generation(&self, station: &str) -> Option<u64> {
        self.read().get(station).map(|entry| entry.generation)
    }

    /// Sets the deadline for a refresh that is about to start, registering the station
    /// if needed, and returns the generation the refresh writes into.
    pub fn arm_refresh(&self, station: &str, deadline: DateTime<Utc>) -> u64 {
        self.with_entry(station, |entry| {
            entry.next_refresh = Some(deadline);
            entry.generation
        })
    }

    /// A [`ForecastSink`] bound to one generation of the station's entry. Its writes
    /// are discarded once that entry is forgotten, so a refresh finishing after the
    /// last caller left does not bring the station back.
    pub fn cycle(&self, generation: u64) -> RefreshCycle<'_> {
        RefreshCycle {
            registry: self,
            generation,
        }
    }

    pub fn next_refresh(&self, station: &str) -> Option<DateTime<Utc>> {
        self.read().get(station).and_then(|entry| entry.next_refresh)
    }

    /// Whether a fetch is due: the deadline is unset or already passed at `now`.
    pub fn is_due(&self, station: &str, now: DateTime<Utc>) -> bool {
        self.next_refresh(station).map_or(true, |deadline| now > deadline)
    }

    /// Runs `f` against the station's current table, if one was ever populated.
    pub fn with_table<R>(
        &self,
        station: &str,
        f: impl FnOnce(&ForecastTable) -> R,
    ) -> Option<R> {
        self.read()
            .get(station)
            .and_then(|entry| entry.table.as_ref())
            .map(f)
    }

    /// A copy of the station's current table.
    pub fn table(&self, station: &str) -> Option<ForecastTable> {
        self.with_table(station, ForecastTable::clone)
    }

    fn with_table_mut(&self, station: &str, f: impl FnOnce(&mut ForecastTable)) {
        self.with_entry(station, |entry| {
            let table = entry
                .table
                .get_or_insert_with(|| ForecastTable::new(station));
            f(table)
        });
    }
}

impl ForecastSink for StationRegistry {
    fn reset(&self, station: &str) {
        self.with_entry(station, |entry| {
            entry.table = Some(ForecastTable::new(station));
        });
    }

    fn record_description(&self, station: &str, description: &str) {
        self.with_table_mut(station, |table| {
            table.description = description.to_string();
        });
    }

    fn record_timestamp(&self, station: &str, time: DateTime<Utc>) {
        self.with_table_mut(station, |table| table.times.push(time));
    }

    fn record_series(&self, station: &str, element: &str, values: Vec<f64>) {
        self.with_table_mut(station, |table| {
            table.series.insert(element.to_string(), values);
        });
    }

    fn set_next_refresh(&self, station: &str, at: DateTime<Utc>) {
        self.with_entry(station, |entry| entry.next_refresh = Some(at));
    }
}

/// See [`StationRegistry::cycle`].
pub struct RefreshCycle<'a> {
    registry: &'a StationRegistry,
    generation: u64,
}

impl RefreshCycle<'_> {
    fn with_table_mut(&self, station: &str, f: impl FnOnce(&mut ForecastTable)) {
        self.registry
            .with_generation(station, self.generation, |entry| {
                f(entry
                    .table
                    .get_or_insert_with(|| ForecastTable::new(station)))
            });
    }
}

impl ForecastSink for RefreshCycle<'_> {
    fn reset(&self, station: &str) {
        self.registry
            .with_generation(station, self.generation, |entry| {
                entry.table = Some(ForecastTable::new(station));
            });
    }

    fn record_description(&self, station: &str, description: &str) {
        self.with_table_mut(station, |table| {
            table.description = description.to_string();
        });
    }

    fn record_timestamp(&self, station: &str, time: DateTime<Utc>) {
        self.with_table_mut(station, |table| table.times.push(time));
    }

    fn record_series(&self, station: &str, element: &str, values: Vec<f64>) {
        self.with_table_mut(station, |table| {
            table.series.insert(element.to_string(), values);
        });
    }

    fn set_next_refresh(&self, station: &str, at: DateTime<Utc>) {
        self.registry
            .with_generation(station, self.generation, |entry| {
                entry.next_refresh = Some(at);
            });
    }
}
