use crate::model::{RealtimeJourney, Service, Stop, StopGroup};
use anyhow::Result;
use async_trait::async_trait;

/// One pending write against the realtime-journeys collection, keyed by the
/// journey's primary identifier.
#[derive(Debug, Clone)]
pub struct JourneyWriteOp {
    pub journey: RealtimeJourney,
    /// When set, a missing record is inserted; an existing record has its
    /// fields updated rather than being replaced wholesale.
    pub upsert: bool,
}

/// The persisted store, used as an opaque service. Backends implement the
/// operation contract; the core never sees storage details.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn find_journey(&self, primary_identifier: &str) -> Result<Option<RealtimeJourney>>;

    /// Applies a cycle's collected writes as one bulk operation.
    async fn bulk_write(&self, ops: Vec<JourneyWriteOp>) -> Result<()>;

    /// Deletes every journey belonging to `provider`/`dataset` whose data
    /// source run identifier differs from `run_identifier`. Returns the
    /// number of journeys removed.
    async fn delete_journeys_not_in_run(
        &self,
        provider: &str,
        dataset: &str,
        run_identifier: &str,
    ) -> Result<u64>;

    async fn find_service(
        &self,
        operator_ref: &str,
        service_name: &str,
        transport_type: &str,
    ) -> Result<Option<Service>>;

    /// Looks up a stop group by any of its alternate identifiers.
    async fn find_stop_group_by_alternate(&self, code: &str) -> Result<Option<StopGroup>>;

    /// Looks up the stop associated with the given stop group.
    async fn find_stop_by_association(&self, stop_group_identifier: &str)
    -> Result<Option<Stop>>;
}
