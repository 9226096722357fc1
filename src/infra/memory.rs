//! In-memory [`Datastore`] engine.
//!
//! Satisfies the store operation contract exactly — upsert-vs-update bulk
//! writes, run-identifier pruning, reference-data lookups — and is what the
//! tests and local runs wire in. A real database backend attaches behind the
//! same trait.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::model::{RealtimeJourney, Service, Stop, StopGroup};
use crate::services::store::{Datastore, JourneyWriteOp};

#[derive(Default)]
pub struct MemoryDatastore {
    journeys: Mutex<HashMap<String, RealtimeJourney>>,
    services: Mutex<Vec<Service>>,
    stops: Mutex<Vec<Stop>>,
    stop_groups: Mutex<Vec<StopGroup>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_service(&self, service: Service) {
        self.services.lock().await.push(service);
    }

    pub async fn add_stop(&self, stop: Stop) {
        self.stops.lock().await.push(stop);
    }

    pub async fn add_stop_group(&self, group: StopGroup) {
        self.stop_groups.lock().await.push(group);
    }

    pub async fn journey_count(&self) -> usize {
        self.journeys.lock().await.len()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn find_journey(&self, primary_identifier: &str) -> Result<Option<RealtimeJourney>> {
        Ok(self.journeys.lock().await.get(primary_identifier).cloned())
    }

    async fn bulk_write(&self, ops: Vec<JourneyWriteOp>) -> Result<()> {
        let mut journeys = self.journeys.lock().await;

        for op in ops {
            match journeys.get_mut(&op.journey.primary_identifier) {
                Some(stored) => {
                    // Field update: creation-time fields set on insert are
                    // preserved, everything else takes the new value.
                    let creation_time = stored.creation_time;
                    let reliability = stored.reliability;
                    *stored = op.journey;
                    stored.creation_time = creation_time;
                    stored.reliability = reliability;
                }
                None if op.upsert => {
                    journeys.insert(op.journey.primary_identifier.clone(), op.journey);
                }
                None => {}
            }
        }

        Ok(())
    }

    async fn delete_journeys_not_in_run(
        &self,
        provider: &str,
        dataset: &str,
        run_identifier: &str,
    ) -> Result<u64> {
        let mut journeys = self.journeys.lock().await;
        let before = journeys.len();

        journeys.retain(|_, journey| {
            let source = &journey.data_source;
            !(source.provider == provider
                && source.dataset == dataset
                && source.identifier != run_identifier)
        });

        Ok((before - journeys.len()) as u64)
    }

    async fn find_service(
        &self,
        operator_ref: &str,
        service_name: &str,
        transport_type: &str,
    ) -> Result<Option<Service>> {
        Ok(self
            .services
            .lock()
            .await
            .iter()
            .find(|service| {
                service.operator_ref == operator_ref
                    && service.service_name == service_name
                    && service.transport_type == transport_type
            })
            .cloned())
    }

    async fn find_stop_group_by_alternate(&self, code: &str) -> Result<Option<StopGroup>> {
        Ok(self
            .stop_groups
            .lock()
            .await
            .iter()
            .find(|group| group.other_identifiers.values().any(|value| value == code))
            .cloned())
    }

    async fn find_stop_by_association(
        &self,
        stop_group_identifier: &str,
    ) -> Result<Option<Stop>> {
        Ok(self
            .stops
            .lock()
            .await
            .iter()
            .find(|stop| {
                stop.associations
                    .iter()
                    .any(|association| association == stop_group_identifier)
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataSource;
    use chrono::Utc;

    fn journey(id: &str, run: &str) -> RealtimeJourney {
        RealtimeJourney::new(
            id.to_string(),
            "vehicle-1".to_string(),
            DataSource {
                original_format: "tfl-json".to_string(),
                provider: "GB-TfL".to_string(),
                dataset: "line/victoria/arrivals".to_string(),
                identifier: run.to_string(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_bulk_write_upserts_missing_journey() {
        let store = MemoryDatastore::new();

        store
            .bulk_write(vec![JourneyWriteOp {
                journey: journey("J1", "run-1"),
                upsert: true,
            }])
            .await
            .unwrap();

        assert!(store.find_journey("J1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bulk_write_updates_but_preserves_creation_time() {
        let store = MemoryDatastore::new();
        let original = journey("J1", "run-1");
        let created = original.creation_time;

        store
            .bulk_write(vec![JourneyWriteOp {
                journey: original,
                upsert: true,
            }])
            .await
            .unwrap();

        let mut updated = journey("J1", "run-2");
        updated.creation_time = created + chrono::Duration::hours(1);
        updated.destination_display = "Walthamstow Central".to_string();

        store
            .bulk_write(vec![JourneyWriteOp {
                journey: updated,
                upsert: true,
            }])
            .await
            .unwrap();

        let stored = store.find_journey("J1").await.unwrap().unwrap();
        assert_eq!(stored.creation_time, created);
        assert_eq!(stored.destination_display, "Walthamstow Central");
        assert_eq!(stored.data_source.identifier, "run-2");
    }

    #[tokio::test]
    async fn test_delete_journeys_not_in_run() {
        let store = MemoryDatastore::new();

        store
            .bulk_write(vec![
                JourneyWriteOp {
                    journey: journey("J1", "run-1"),
                    upsert: true,
                },
                JourneyWriteOp {
                    journey: journey("J2", "run-2"),
                    upsert: true,
                },
            ])
            .await
            .unwrap();

        let deleted = store
            .delete_journeys_not_in_run("GB-TfL", "line/victoria/arrivals", "run-2")
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store.find_journey("J1").await.unwrap().is_none());
        assert!(store.find_journey("J2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_ignores_other_datasets() {
        let store = MemoryDatastore::new();
        let mut other = journey("J1", "run-1");
        other.data_source.dataset = "line/northern/arrivals".to_string();

        store
            .bulk_write(vec![JourneyWriteOp {
                journey: other,
                upsert: true,
            }])
            .await
            .unwrap();

        let deleted = store
            .delete_journeys_not_in_run("GB-TfL", "line/victoria/arrivals", "run-2")
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert!(store.find_journey("J1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reference_data_lookups() {
        let store = MemoryDatastore::new();

        store
            .add_service(Service {
                primary_identifier: "GB:TFLSERVICE:victoria".to_string(),
                service_name: "Victoria".to_string(),
                operator_ref: "GB:NOC:TFLO".to_string(),
                transport_type: "tube".to_string(),
            })
            .await;
        store
            .add_stop_group(StopGroup {
                primary_identifier: "GB:STOPGRP:VIC".to_string(),
                other_identifiers: HashMap::from([(
                    "AtcoCode".to_string(),
                    "940GZZLUVIC".to_string(),
                )]),
            })
            .await;
        store
            .add_stop(Stop {
                primary_identifier: "GB:ATCO:490000248S".to_string(),
                primary_name: "Victoria".to_string(),
                location: None,
                associations: vec!["GB:STOPGRP:VIC".to_string()],
            })
            .await;

        let service = store
            .find_service("GB:NOC:TFLO", "Victoria", "tube")
            .await
            .unwrap();
        assert!(service.is_some());

        let group = store
            .find_stop_group_by_alternate("940GZZLUVIC")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(group.primary_identifier, "GB:STOPGRP:VIC");

        let stop = store
            .find_stop_by_association("GB:STOPGRP:VIC")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stop.primary_name, "Victoria");

        assert!(
            store
                .find_stop_group_by_alternate("missing")
                .await
                .unwrap()
                .is_none()
        );
    }
}
