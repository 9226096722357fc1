//! Contracts for the external collaborators the tracker core depends on.
//!
//! Each trait is an async seam implemented by something in `infra` (or by a
//! test double). Instances are constructed explicitly and injected as
//! `Arc<dyn …>` — no process-wide singletons.

pub mod arrivals;
pub mod queue;
pub mod store;
pub mod topology;

pub use arrivals::ArrivalsApi;
pub use queue::{Delivery, EventQueue};
pub use store::{Datastore, JourneyWriteOp};
pub use topology::{Direction, TopologyApi};
