//! The reconciliation core: grouping raw observations into per-vehicle
//! journeys, matching them to scheduled route patterns, and merging the
//! result into persisted realtime-journey state, driven by a per-line
//! polling cycle.

pub mod grouper;
pub mod line;
pub mod matcher;
pub mod reconciler;
pub mod stop_cache;

pub use grouper::group_observations;
pub use line::LineTracker;
pub use matcher::{JourneyMatcher, ResolvedPath};
pub use reconciler::reconcile;
pub use stop_cache::StopResolutionCache;
