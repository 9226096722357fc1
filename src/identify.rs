//! Queue-mediated trip identification.
//!
//! A lighter-weight query over the same grouping/matching primitives the
//! line trackers use: given an ad-hoc vehicle position ping, work out which
//! journey the vehicle is currently performing. Read-only — no persisted
//! journey state is written — and safe to invoke from multiple queue
//! consumers concurrently.

use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::info;

use crate::model::{OrderedLineRoute, Service};
use crate::services::arrivals::ArrivalsApi;
use crate::services::queue::{Delivery, EventQueue};
use crate::services::topology::{Direction, TopologyApi};
use crate::tracker::grouper::group_observations;
use crate::tracker::matcher::JourneyMatcher;
use crate::tracker::stop_cache::StopResolutionCache;

/// A single vehicle position ping consumed off the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleMonitorEvent {
    pub line: String,
    pub direction_ref: String,
    pub number_plate: String,
    pub origin_ref: String,
    pub destination_ref: String,
    pub origin_aimed_departure_time: String,
}

#[derive(Debug, Error)]
pub enum IdentifyError {
    /// Zero or several candidate journeys matched the ping; the result is
    /// never guessed.
    #[error("journey could not be identified, candidate count: {candidates}")]
    Unresolvable { candidates: usize },
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct Identification {
    pub journey_identifier: String,
    pub destination_display: Option<String>,
}

/// Maps `DirectionRef` codes some sources use to the canonical direction
/// names carried by arrival observations.
pub fn normalise_direction(direction_ref: &str) -> Option<Direction> {
    match direction_ref.to_lowercase().as_str() {
        "1" | "inbound" => Some(Direction::Inbound),
        "2" | "outbound" => Some(Direction::Outbound),
        _ => None,
    }
}

pub struct Identifier {
    arrivals: Arc<dyn ArrivalsApi>,
    matching: Option<MatchingContext>,
}

/// Optional route-matching enrichment for identifications. Route patterns
/// are memoized per line; the map is shared safely across consumers.
struct MatchingContext {
    topology: Arc<dyn TopologyApi>,
    stop_cache: Arc<StopResolutionCache>,
    matcher: JourneyMatcher,
    routes_by_line: DashMap<String, Arc<Vec<OrderedLineRoute>>>,
}

impl Identifier {
    pub fn new(arrivals: Arc<dyn ArrivalsApi>) -> Self {
        Self {
            arrivals,
            matching: None,
        }
    }

    /// Enables path resolution on successful identifications.
    pub fn with_matching(
        mut self,
        topology: Arc<dyn TopologyApi>,
        stop_cache: Arc<StopResolutionCache>,
    ) -> Self {
        self.matching = Some(MatchingContext {
            topology,
            stop_cache,
            matcher: JourneyMatcher::new(),
            routes_by_line: DashMap::new(),
        });
        self
    }

    /// Identifies the journey a ping belongs to by grouping the line's
    /// current arrivals down to the event's vehicle. Exactly one candidate
    /// group is required; anything else is a typed failure.
    pub async fn identify(
        &self,
        event: &VehicleMonitorEvent,
    ) -> Result<Identification, IdentifyError> {
        let direction = normalise_direction(&event.direction_ref);

        let batch = self
            .arrivals
            .latest_arrivals(&event.line)
            .await
            .map_err(IdentifyError::Source)?;

        let vehicle_observations: Vec<_> = batch
            .into_iter()
            .filter(|observation| observation.vehicle_ref == event.number_plate)
            .filter(|observation| match direction {
                Some(direction) => observation.direction_ref == direction.as_str(),
                None => true,
            })
            .collect();

        let groups = group_observations(vehicle_observations);
        if groups.len() != 1 {
            return Err(IdentifyError::Unresolvable {
                candidates: groups.len(),
            });
        }

        let (journey_identifier, group) = groups
            .into_iter()
            .next()
            .expect("group count was checked above");

        let destination_display = match &self.matching {
            Some(context) => {
                let routes = context.load_routes(&event.line).await?;
                // The matcher only needs the service for its display
                // fallback; synthesize one named after the line.
                let service = Service {
                    primary_identifier: format!("SERVICE:{}", event.line),
                    service_name: event.line.clone(),
                    operator_ref: String::new(),
                    transport_type: String::new(),
                };
                let resolved = context
                    .matcher
                    .match_route(&group, &routes, &context.stop_cache, &service)
                    .await?;
                Some(resolved.destination_display)
            }
            None => None,
        };

        Ok(Identification {
            journey_identifier,
            destination_display,
        })
    }
}

impl MatchingContext {
    async fn load_routes(&self, line_id: &str) -> Result<Arc<Vec<OrderedLineRoute>>> {
        if let Some(hit) = self.routes_by_line.get(line_id) {
            return Ok(hit.clone());
        }

        let mut routes = Vec::new();
        for direction in Direction::BOTH {
            routes.extend(self.topology.route_sequences(line_id, direction).await?);
        }

        let routes = Arc::new(routes);
        self.routes_by_line
            .insert(line_id.to_string(), routes.clone());
        Ok(routes)
    }
}

/// Drains identification events off the queue in batches, tracking the
/// global success rate. Duplicate deliveries are tolerated: identification
/// is idempotent, so redelivery only touches the counters.
pub struct QueueConsumer {
    queue: Arc<dyn EventQueue>,
    identifier: Identifier,
    total_events: AtomicU64,
    successful_events: AtomicU64,
}

impl QueueConsumer {
    pub fn new(queue: Arc<dyn EventQueue>, identifier: Identifier) -> Self {
        Self {
            queue,
            identifier,
            total_events: AtomicU64::new(0),
            successful_events: AtomicU64::new(0),
        }
    }

    pub async fn run(&self, batch_size: usize) -> Result<()> {
        loop {
            let batch = self.queue.consume(batch_size).await?;
            if batch.is_empty() {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
            self.process_batch(batch).await?;
        }
    }

    pub async fn process_batch(&self, batch: Vec<Delivery>) -> Result<()> {
        let mut acked = Vec::with_capacity(batch.len());

        for delivery in &batch {
            acked.push(delivery.id);

            // A malformed payload is skipped; the rest of the batch proceeds.
            let Ok(event) = serde_json::from_slice::<VehicleMonitorEvent>(&delivery.payload)
            else {
                continue;
            };

            self.total_events.fetch_add(1, Ordering::Relaxed);

            match self.identifier.identify(&event).await {
                Ok(identification) => {
                    self.successful_events.fetch_add(1, Ordering::Relaxed);
                    info!(
                        journey = %identification.journey_identifier,
                        line = %event.line,
                        "identified"
                    );
                }
                Err(identify_error) => {
                    info!(line = %event.line, error = %identify_error, "failed to identify");
                }
            }
        }

        self.queue.ack(&acked).await?;

        let total = self.total_events.load(Ordering::Relaxed);
        let successful = self.successful_events.load(Ordering::Relaxed);
        let rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };
        info!(rate, total, successful, "identification rate");

        Ok(())
    }
}
