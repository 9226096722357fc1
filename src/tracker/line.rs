//! Per-line tracking loop: topology resolution at startup, then an
//! indefinite polling cycle of fetch → group → match → reconcile →
//! bulk write → prune.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{Instrument, error, info};

use crate::config::TrackedLine;
use crate::model::{CanonicalObservation, DataSource, ObservationGroup, OrderedLineRoute, Service};
use crate::services::arrivals::ArrivalsApi;
use crate::services::store::{Datastore, JourneyWriteOp};
use crate::services::topology::{Direction, TopologyApi};
use crate::tracker::grouper::group_observations;
use crate::tracker::matcher::JourneyMatcher;
use crate::tracker::reconciler::reconcile;
use crate::tracker::stop_cache::StopResolutionCache;

pub const TFL_OPERATOR_REF: &str = "GB:NOC:TFLO";
pub const TFL_PROVIDER: &str = "GB-TfL";

pub struct LineTracker {
    line: TrackedLine,
    refresh_interval: Duration,
    concurrency: usize,

    store: Arc<dyn Datastore>,
    topology: Arc<dyn TopologyApi>,
    arrivals: Arc<dyn ArrivalsApi>,
    stop_cache: Arc<StopResolutionCache>,
    matcher: Arc<JourneyMatcher>,

    service: Option<Arc<Service>>,
    routes: Arc<Vec<OrderedLineRoute>>,
}

impl LineTracker {
    pub fn new(
        line: TrackedLine,
        refresh_interval: Duration,
        store: Arc<dyn Datastore>,
        topology: Arc<dyn TopologyApi>,
        arrivals: Arc<dyn ArrivalsApi>,
        stop_cache: Arc<StopResolutionCache>,
    ) -> Self {
        let concurrency = std::thread::available_parallelism()
            .map(|cores| cores.get() * 2)
            .unwrap_or(8);

        Self {
            line,
            refresh_interval,
            concurrency,
            store,
            topology,
            arrivals,
            stop_cache,
            matcher: Arc::new(JourneyMatcher::new()),
            service: None,
            routes: Arc::new(Vec::new()),
        }
    }

    /// Resolves the line's service record and loads the ordered route
    /// patterns for both directions. Failure here is fatal to this line's
    /// tracker only; there is no in-band retry.
    pub async fn initialise(&mut self) -> Result<()> {
        let service = self
            .store
            .find_service(TFL_OPERATOR_REF, &self.line.name, &self.line.mode)
            .await?
            .with_context(|| format!("no service found for line {}", self.line.id))?;

        let mut routes = Vec::new();
        for direction in Direction::BOTH {
            routes.extend(
                self.topology
                    .route_sequences(&self.line.id, direction)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to load {} route sequences for line {}",
                            direction.as_str(),
                            self.line.id
                        )
                    })?,
            );
        }

        if routes.is_empty() {
            anyhow::bail!("no ordered line routes for line {}", self.line.id);
        }

        info!(
            line = %self.line.id,
            mode = %self.line.mode,
            service = %service.primary_identifier,
            routes = routes.len(),
            "registering line tracker"
        );

        self.service = Some(Arc::new(service));
        self.routes = Arc::new(routes);
        Ok(())
    }

    /// Runs the tracker until the process exits. Transient fetch or cycle
    /// failures abandon that cycle's update and rely on the fixed refresh
    /// interval as the retry cadence.
    pub async fn run(mut self) -> Result<()> {
        self.initialise().await?;

        loop {
            let cycle_start = Instant::now();

            match self.arrivals.latest_arrivals(&self.line.id).await {
                Ok(batch) => {
                    if let Err(cycle_error) = self.run_cycle(batch).await {
                        error!(line = %self.line.id, error = %cycle_error, "cycle failed");
                    }
                }
                Err(fetch_error) => {
                    error!(
                        line = %self.line.id,
                        error = %fetch_error,
                        "arrivals fetch failed, skipping cycle"
                    );
                }
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.refresh_interval {
                tokio::time::sleep(self.refresh_interval - elapsed).await;
            }
        }
    }

    /// One polling cycle over an already-fetched observation batch: group,
    /// fan out matching and reconciliation across a bounded pool, bulk-write
    /// the collected operations, then prune journeys this run didn't touch.
    pub async fn run_cycle(&self, observations: Vec<CanonicalObservation>) -> Result<()> {
        let service = self
            .service
            .clone()
            .context("tracker has not been initialised")?;
        let processing_start = Instant::now();

        let data_source = Arc::new(DataSource {
            original_format: "tfl-json".to_string(),
            provider: TFL_PROVIDER.to_string(),
            dataset: format!("line/{}/arrivals", self.line.id),
            identifier: Utc::now().timestamp_micros().to_string(),
        });

        let groups = group_observations(observations);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::new();

        for (journey_identifier, group) in groups {
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let stop_cache = self.stop_cache.clone();
            let matcher = self.matcher.clone();
            let routes = self.routes.clone();
            let service = service.clone();
            let data_source = data_source.clone();

            let group_span =
                tracing::info_span!("reconcile_group", journey = %journey_identifier);

            tasks.push(tokio::spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return None;
                    };

                    match process_group(
                        store,
                        stop_cache,
                        matcher,
                        routes,
                        service,
                        group,
                        data_source,
                    )
                    .await
                    {
                        Ok(op) => Some(op),
                        Err(group_error) => {
                            error!(error = %group_error, "failed to reconcile group");
                            None
                        }
                    }
                }
                .instrument(group_span),
            ));
        }

        // Barrier: every group finishes before the cycle's single bulk write.
        let mut write_ops = Vec::new();
        for task in tasks {
            if let Ok(Some(op)) = task.await {
                write_ops.push(op);
            }
        }

        let processing = processing_start.elapsed();
        let write_start = Instant::now();
        let op_count = write_ops.len();

        if !write_ops.is_empty() {
            self.store.bulk_write(write_ops).await?;
        }

        // Journeys that received no update this run have dropped off the
        // arrivals feed, most likely because they finished.
        let deleted = self
            .store
            .delete_journeys_not_in_run(
                &data_source.provider,
                &data_source.dataset,
                &data_source.identifier,
            )
            .await?;

        info!(
            line = %self.line.id,
            processing_ms = processing.as_millis() as u64,
            bulkwrite_ms = write_start.elapsed().as_millis() as u64,
            ops = op_count,
            "cycle complete"
        );
        if deleted > 0 {
            info!(line = %self.line.id, deleted, "pruned expired journeys");
        }

        Ok(())
    }
}

async fn process_group(
    store: Arc<dyn Datastore>,
    stop_cache: Arc<StopResolutionCache>,
    matcher: Arc<JourneyMatcher>,
    routes: Arc<Vec<OrderedLineRoute>>,
    service: Arc<Service>,
    group: ObservationGroup,
    data_source: Arc<DataSource>,
) -> Result<JourneyWriteOp> {
    let existing = store.find_journey(&group.journey_identifier).await?;

    let resolved = matcher
        .match_route(&group, &routes, &stop_cache, &service)
        .await?;

    let (_, op) = reconcile(
        existing,
        &group,
        resolved,
        &stop_cache,
        &data_source,
        Utc::now(),
    )
    .await?;

    Ok(op)
}
