use crate::model::OrderedLineRoute;
use anyhow::Result;
use async_trait::async_trait;

/// Direction of travel along a line pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Inbound, Direction::Outbound];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Provider of scheduled route topology, keyed by line and direction.
#[async_trait]
pub trait TopologyApi: Send + Sync {
    /// Returns the ordered stop sequences for one direction of a line. A
    /// line may have several patterns (branching) or none.
    async fn route_sequences(
        &self,
        line_id: &str,
        direction: Direction,
    ) -> Result<Vec<OrderedLineRoute>>;
}
