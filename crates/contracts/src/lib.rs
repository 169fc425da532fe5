//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Identity Model
//! - A simulation is split into sequences; a sequence into steps (one per engine frame)
//! - Every unit of deferred work is named by a [`PendingId`]
//! - Finalized work leaves the scheduler as a [`CaptureRecord`] through a [`ConsumerEndpoint`]

mod blueprint;
mod definition;
mod endpoint;
mod error;
mod ids;
mod model;
mod pending_id;
mod record;
mod sink;

pub use blueprint::*;
pub use definition::*;
pub use endpoint::ConsumerEndpoint;
pub use error::*;
pub use ids::{AnnotationId, MetricId, SensorId};
pub use model::*;
pub use pending_id::{FutureKind, MetricTarget, PendingId};
pub use record::*;
pub use sink::*;
