//! End-to-end exercise of the tracking pipeline over the in-memory stack:
//! consecutive polling cycles reconciling into the store, run-based pruning,
//! and the queue-mediated identification mode.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use journey_tracker::config::TrackedLine;
use journey_tracker::identify::{Identifier, IdentifyError, VehicleMonitorEvent};
use journey_tracker::infra::MemoryDatastore;
use journey_tracker::model::{
    CanonicalObservation, OrderedLineRoute, Service, Stop, StopGroup, StopTimeType,
};
use journey_tracker::services::arrivals::ArrivalsApi;
use journey_tracker::services::store::Datastore;
use journey_tracker::services::topology::{Direction, TopologyApi};
use journey_tracker::tracker::{LineTracker, StopResolutionCache};

struct FakeTopology;

#[async_trait]
impl TopologyApi for FakeTopology {
    async fn route_sequences(
        &self,
        _line_id: &str,
        direction: Direction,
    ) -> Result<Vec<OrderedLineRoute>> {
        // One pattern per direction; the tests only observe the outbound one.
        let stops: Vec<&str> = match direction {
            Direction::Outbound => vec!["A", "B", "C", "D"],
            Direction::Inbound => vec!["D", "C", "B", "A"],
        };
        Ok(vec![OrderedLineRoute {
            name: format!("{} pattern", direction.as_str()),
            stop_refs: stops.iter().map(|s| s.to_string()).collect(),
        }])
    }
}

struct FakeArrivals {
    batch: Vec<CanonicalObservation>,
}

#[async_trait]
impl ArrivalsApi for FakeArrivals {
    async fn latest_arrivals(&self, _line_id: &str) -> Result<Vec<CanonicalObservation>> {
        Ok(self.batch.clone())
    }
}

async fn seeded_store() -> Arc<MemoryDatastore> {
    let store = MemoryDatastore::new();

    store
        .add_service(Service {
            primary_identifier: "GB:TFLSERVICE:victoria".to_string(),
            service_name: "Victoria".to_string(),
            operator_ref: "GB:NOC:TFLO".to_string(),
            transport_type: "tube".to_string(),
        })
        .await;

    for code in ["A", "B", "C", "D"] {
        store
            .add_stop_group(StopGroup {
                primary_identifier: format!("GRP:{code}"),
                other_identifiers: HashMap::from([("AtcoCode".to_string(), code.to_string())]),
            })
            .await;
        store
            .add_stop(Stop {
                primary_identifier: format!("STOP:{code}"),
                primary_name: format!("Stop {code}"),
                location: None,
                associations: vec![format!("GRP:{code}")],
            })
            .await;
    }

    Arc::new(store)
}

fn observations(vehicle: &str, stops: &[&str]) -> Vec<CanonicalObservation> {
    let base = Utc::now();
    stops
        .iter()
        .enumerate()
        .map(|(i, stop)| CanonicalObservation {
            vehicle_ref: vehicle.to_string(),
            line_ref: "victoria".to_string(),
            direction_ref: "outbound".to_string(),
            destination_stop_ref: String::new(),
            stop_ref: stop.to_string(),
            expected_time: base + ChronoDuration::minutes(i as i64),
            mode_ref: "tube".to_string(),
            destination_name: None,
            towards: None,
        })
        .collect()
}

async fn tracker(store: Arc<MemoryDatastore>) -> LineTracker {
    let line = TrackedLine {
        id: "victoria".to_string(),
        name: "Victoria".to_string(),
        mode: "tube".to_string(),
    };
    let stop_cache = Arc::new(StopResolutionCache::new(store.clone()));

    let mut tracker = LineTracker::new(
        line,
        Duration::from_secs(30),
        store,
        Arc::new(FakeTopology),
        Arc::new(FakeArrivals { batch: Vec::new() }),
        stop_cache,
    );
    tracker.initialise().await.expect("tracker initialises");
    tracker
}

const JOURNEY_203: &str = "REALTIME:TFL:tube:victoria:outbound:203:";

#[tokio::test]
async fn test_two_cycles_create_then_reclassify() {
    let store = seeded_store().await;
    let tracker = tracker(store.clone()).await;

    // Cycle 1: vehicle 203 has predictions for A, B, C.
    tracker
        .run_cycle(observations("203", &["A", "B", "C"]))
        .await
        .unwrap();

    let journey = store
        .find_journey(JOURNEY_203)
        .await
        .unwrap()
        .expect("journey created on first cycle");
    assert_eq!(journey.vehicle_ref, "203");
    assert!(
        journey
            .stops
            .values()
            .all(|estimate| estimate.time_type == StopTimeType::EstimatedFuture)
    );
    // Exactly one outbound pattern matches, so the path covers the full
    // scheduled sequence A→B→C→D.
    assert_eq!(journey.path.len(), 3);
    assert_eq!(journey.destination_display, "Victoria");

    // Cycle 2: A has dropped off the predictions — the vehicle passed it.
    tracker
        .run_cycle(observations("203", &["B", "C"]))
        .await
        .unwrap();

    let journey = store.find_journey(JOURNEY_203).await.unwrap().unwrap();
    assert_eq!(journey.stops["STOP:A"].time_type, StopTimeType::Historical);
    assert_eq!(journey.stops["STOP:B"].time_type, StopTimeType::EstimatedFuture);
    assert_eq!(journey.departed_stop_ref.as_deref(), Some("STOP:A"));
    assert_eq!(journey.next_stop_ref.as_deref(), Some("STOP:B"));
}

#[tokio::test]
async fn test_journeys_absent_from_a_run_are_pruned() {
    let store = seeded_store().await;
    let tracker = tracker(store.clone()).await;

    tracker
        .run_cycle(observations("203", &["A", "B"]))
        .await
        .unwrap();
    assert_eq!(store.journey_count().await, 1);

    // Next cycle only sees vehicle 204: 203's journey is finished and
    // must be deleted; 204's is created.
    tracker
        .run_cycle(observations("204", &["A", "B"]))
        .await
        .unwrap();

    assert_eq!(store.journey_count().await, 1);
    assert!(store.find_journey(JOURNEY_203).await.unwrap().is_none());
    assert!(
        store
            .find_journey("REALTIME:TFL:tube:victoria:outbound:204:")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_journey_retained_across_runs_keeps_creation_time() {
    let store = seeded_store().await;
    let tracker = tracker(store.clone()).await;

    tracker
        .run_cycle(observations("203", &["A", "B"]))
        .await
        .unwrap();
    let created = store
        .find_journey(JOURNEY_203)
        .await
        .unwrap()
        .unwrap()
        .creation_time;

    tracker
        .run_cycle(observations("203", &["A", "B"]))
        .await
        .unwrap();

    let journey = store.find_journey(JOURNEY_203).await.unwrap().unwrap();
    assert_eq!(journey.creation_time, created);
    assert!(journey.modification_time >= created);
}

#[tokio::test]
async fn test_identification_against_live_arrivals() {
    let arrivals = Arc::new(FakeArrivals {
        batch: observations("203", &["A", "B"]),
    });
    let identifier = Identifier::new(arrivals);

    let event = VehicleMonitorEvent {
        line: "victoria".to_string(),
        direction_ref: "2".to_string(),
        number_plate: "203".to_string(),
        origin_ref: "A".to_string(),
        destination_ref: "B".to_string(),
        origin_aimed_departure_time: String::new(),
    };

    let identification = identifier.identify(&event).await.unwrap();
    assert_eq!(identification.journey_identifier, JOURNEY_203);

    // A vehicle with no live arrivals is a typed failure, never a guess.
    let missing = VehicleMonitorEvent {
        number_plate: "999".to_string(),
        ..event
    };
    match identifier.identify(&missing).await.unwrap_err() {
        IdentifyError::Unresolvable { candidates } => assert_eq!(candidates, 0),
        other => panic!("unexpected error: {other}"),
    }
}
