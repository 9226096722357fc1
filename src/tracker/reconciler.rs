//! Merges a matched observation group into the persisted realtime-journey
//! record: stop-time classification, departed/next-stop computation, and
//! the resulting write operation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::model::{
    DataSource, JourneyStopEstimate, ObservationGroup, RealtimeJourney, StopTimeType,
};
use crate::services::store::JourneyWriteOp;
use crate::tracker::matcher::ResolvedPath;
use crate::tracker::stop_cache::StopResolutionCache;

/// Reconciles one cycle's matched group against the journey's prior
/// snapshot (if any), returning the merged journey and the upsert to
/// persist it.
pub async fn reconcile(
    existing: Option<RealtimeJourney>,
    group: &ObservationGroup,
    resolved: ResolvedPath,
    stops: &StopResolutionCache,
    data_source: &DataSource,
    now: DateTime<Utc>,
) -> Result<(RealtimeJourney, JourneyWriteOp)> {
    let Some(first_observation) = group.observations.first() else {
        anyhow::bail!("observation group {} is empty", group.journey_identifier);
    };

    let mut journey = match existing {
        Some(journey) => journey,
        None => RealtimeJourney::new(
            group.journey_identifier.clone(),
            first_observation.vehicle_ref.clone(),
            data_source.clone(),
            now,
        ),
    };

    journey.modification_time = now;
    journey.data_source = data_source.clone();

    // Upsert an estimate for every observed stop. A stop already frozen as
    // historical stays historical — reclassification is one-way.
    let mut updated_stops: HashSet<String> = HashSet::new();
    for observation in &group.observations {
        let Some(stop) = stops.resolve(&observation.stop_ref).await? else {
            continue;
        };
        let stop_ref = stop.primary_identifier.clone();
        updated_stops.insert(stop_ref.clone());

        let already_historical = journey
            .stops
            .get(&stop_ref)
            .is_some_and(|estimate| estimate.time_type == StopTimeType::Historical);
        if already_historical {
            continue;
        }

        journey.stops.insert(
            stop_ref.clone(),
            JourneyStopEstimate {
                stop_ref,
                arrival: observation.expected_time,
                departure: observation.expected_time,
                time_type: StopTimeType::EstimatedFuture,
            },
        );
    }

    // Any stop absent from this cycle's group has been passed: freeze it.
    for estimate in journey.stops.values_mut() {
        if !updated_stops.contains(&estimate.stop_ref) {
            estimate.time_type = StopTimeType::Historical;
        }
    }

    journey.destination_display = resolved.destination_display;
    journey.path = resolved.items;

    // Walk the path to find where the vehicle currently is: the first
    // segment whose origin still carries a future estimate marks the
    // boundary, and the segment before it gives the departed/next pair.
    // First hit wins within a cycle.
    journey.departed_stop_ref = None;
    journey.departed_stop = None;
    journey.next_stop_ref = None;
    journey.next_stop = None;

    for index in 0..journey.path.len() {
        let Some(estimate) = journey.stops.get(&journey.path[index].origin_stop_ref) else {
            continue;
        };
        let arrival = estimate.arrival;
        let departure = estimate.departure;
        let is_future = estimate.time_type == StopTimeType::EstimatedFuture;

        let item = &mut journey.path[index];
        item.origin_arrival_time = Some(arrival);
        item.origin_departure_time = Some(departure);

        if journey.departed_stop_ref.is_none() && is_future {
            let reference = &journey.path[index.saturating_sub(1)];
            journey.departed_stop_ref = Some(reference.origin_stop_ref.clone());
            journey.departed_stop = reference.origin_stop.clone();
            journey.next_stop_ref = Some(reference.destination_stop_ref.clone());
            journey.next_stop = reference.destination_stop.clone();
        }
    }

    let op = JourneyWriteOp {
        journey: journey.clone(),
        upsert: true,
    };

    Ok((journey, op))
}
