//! Canonical transit data model shared by every component.
//!
//! Adapters normalise source feeds into [`CanonicalObservation`]s; the
//! tracker reconciles those into persisted [`RealtimeJourney`] records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Journeys not refreshed within this window are considered inactive.
pub const ACTIVITY_CUTOFF_MINUTES: i64 = 10;

/// A WGS84 point, longitude first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
}

/// One timestamped arrival/position reading for a vehicle at or near a stop,
/// as produced by a source adapter. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalObservation {
    pub vehicle_ref: String,
    pub line_ref: String,
    pub direction_ref: String,
    pub destination_stop_ref: String,
    pub stop_ref: String,
    pub expected_time: DateTime<Utc>,
    pub mode_ref: String,

    /// Destination name as displayed by the source, when it provides one.
    pub destination_name: Option<String>,
    /// "Towards" hint from the source; may be a placeholder sentinel.
    pub towards: Option<String>,
}

impl CanonicalObservation {
    /// The journey key shared by every observation of one vehicle performing
    /// one journey. Doubles as the [`RealtimeJourney`] primary identifier.
    pub fn journey_identifier(&self) -> String {
        format!(
            "REALTIME:TFL:{}:{}:{}:{}:{}",
            self.mode_ref,
            self.line_ref,
            self.direction_ref,
            self.vehicle_ref,
            self.destination_stop_ref
        )
    }
}

/// All observations believed to belong to one vehicle's one journey instance
/// within a cycle. Source ordering is not meaningful; sort before use.
#[derive(Debug, Clone)]
pub struct ObservationGroup {
    pub journey_identifier: String,
    pub observations: Vec<CanonicalObservation>,
}

impl ObservationGroup {
    /// Observations ordered by expected time, ascending.
    pub fn sorted_observations(&self) -> Vec<&CanonicalObservation> {
        let mut sorted: Vec<&CanonicalObservation> = self.observations.iter().collect();
        sorted.sort_by_key(|o| o.expected_time);
        sorted
    }
}

/// The scheduled, directional stop sequence for one line pattern. A line may
/// have zero, one, or many of these (branching).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedLineRoute {
    pub name: String,
    pub stop_refs: Vec<String>,
}

/// Canonical stop record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub primary_identifier: String,
    pub primary_name: String,
    pub location: Option<Location>,
    /// Identifiers of stop groups this stop is associated with.
    pub associations: Vec<String>,
}

/// A grouping of stops sharing a physical site, addressable by
/// source-specific alternate identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopGroup {
    pub primary_identifier: String,
    pub other_identifiers: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub primary_identifier: String,
    pub service_name: String,
    pub operator_ref: String,
    pub transport_type: String,
}

/// Provenance for a record: which provider/dataset produced it and the
/// run identifier of the cycle that last touched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub original_format: String,
    pub provider: String,
    pub dataset: String,
    pub identifier: String,
}

/// Confidence tag describing how a journey's position was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reliability {
    ExternalProvided,
    LocationWithTrack,
    LocationWithoutTrack,
}

/// Whether a per-stop time record is a frozen past estimate or a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopTimeType {
    Historical,
    EstimatedFuture,
}

/// Arrival/departure estimate for one stop of a tracked journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyStopEstimate {
    pub stop_ref: String,
    pub arrival: DateTime<Utc>,
    pub departure: DateTime<Utc>,
    pub time_type: StopTimeType,
}

/// One leg of a journey's resolved path. Segment `i`'s destination equals
/// segment `i + 1`'s origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyPathItem {
    pub origin_stop_ref: String,
    pub origin_stop: Option<Stop>,
    pub destination_stop_ref: String,
    pub destination_stop: Option<Stop>,
    pub origin_arrival_time: Option<DateTime<Utc>>,
    pub origin_departure_time: Option<DateTime<Utc>>,
}

/// The durable, mutable record of a tracked journey. Created on first
/// observation of a new journey key and merged in place every cycle after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeJourney {
    pub primary_identifier: String,
    pub creation_time: DateTime<Utc>,
    pub modification_time: DateTime<Utc>,
    pub reliability: Reliability,
    pub data_source: DataSource,
    pub vehicle_ref: String,

    pub departed_stop_ref: Option<String>,
    pub departed_stop: Option<Stop>,
    pub next_stop_ref: Option<String>,
    pub next_stop: Option<Stop>,

    pub destination_display: String,
    pub path: Vec<JourneyPathItem>,
    /// Per-stop time records keyed by canonical stop identifier. Entries move
    /// from `EstimatedFuture` to `Historical` and never back.
    pub stops: HashMap<String, JourneyStopEstimate>,
}

impl RealtimeJourney {
    pub fn new(
        primary_identifier: String,
        vehicle_ref: String,
        data_source: DataSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            primary_identifier,
            creation_time: now,
            modification_time: now,
            reliability: Reliability::ExternalProvided,
            data_source,
            vehicle_ref,
            departed_stop_ref: None,
            departed_stop: None,
            next_stop_ref: None,
            next_stop: None,
            destination_display: String::new(),
            path: Vec::new(),
            stops: HashMap::new(),
        }
    }

    /// A journey is active while its last modification is within the fixed
    /// activity cutoff.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now - self.modification_time <= Duration::minutes(ACTIVITY_CUTOFF_MINUTES)
    }
}

/// A raw vehicle position ping published onto the message queue by feed
/// adapters, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleLocationEvent {
    pub local_id: String,
    pub identifying_information: HashMap<String, String>,
    pub source_type: String,
    pub location: Location,
    pub bearing: f64,
    pub vehicle_ref: String,
    /// Operating date of the journey, `YYYY-MM-DD`.
    pub timeframe: String,
    pub data_source: DataSource,
    pub recorded_at: DateTime<Utc>,
}
