use crate::model::CanonicalObservation;
use anyhow::Result;
use async_trait::async_trait;

/// Provider of live arrival/position observations for a line.
///
/// Implementations decode their source format and return canonical
/// observations; individually malformed records are skipped, not fatal.
#[async_trait]
pub trait ArrivalsApi: Send + Sync {
    async fn latest_arrivals(&self, line_id: &str) -> Result<Vec<CanonicalObservation>>;
}
