//! Handles to work that resolves on a later frame

use std::fmt;
use std::marker::PhantomData;

use contracts::{DataModel, FutureKind, PendingId, SimulationId};

use crate::error::Result;
use crate::simulation::{ExecutionState, SimulationRef};

/// Result of a sensor, annotation or metric that will be reported later.
///
/// The future stays bound to the simulation that issued it. Reporting is
/// allowed while that simulation runs or drains after being superseded.
pub struct AsyncFuture<T: DataModel> {
    pending_id: PendingId,
    simulation: SimulationRef,
    _kind: PhantomData<fn(T)>,
}

impl<T: DataModel> Clone for AsyncFuture<T> {
    fn clone(&self) -> Self {
        Self {
            pending_id: self.pending_id.clone(),
            simulation: self.simulation.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: DataModel> fmt::Debug for AsyncFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFuture")
            .field("pending_id", &self.pending_id)
            .field("simulation", &self.simulation)
            .finish()
    }
}

impl<T: DataModel> AsyncFuture<T> {
    pub(crate) fn new(pending_id: PendingId, simulation: SimulationRef) -> Self {
        Self {
            pending_id,
            simulation,
            _kind: PhantomData,
        }
    }

    pub fn pending_id(&self) -> &PendingId {
        &self.pending_id
    }

    pub fn kind(&self) -> FutureKind {
        T::KIND
    }

    pub fn simulation_id(&self) -> Option<SimulationId> {
        self.simulation.read(|sim| sim.id())
    }

    /// Whether the issuing simulation is still running
    pub fn is_valid(&self) -> bool {
        self.simulation.read(|sim| sim.is_running()).unwrap_or(false)
    }

    /// Whether the work is still waiting for a result
    pub fn is_pending(&self) -> bool {
        self.simulation
            .read(|sim| {
                sim.execution_state() != ExecutionState::Complete
                    && sim.is_pending(&self.pending_id)
            })
            .unwrap_or(false)
    }

    /// Deliver the result.
    ///
    /// # Errors
    /// `InvalidOperation` if the simulation is gone or complete, or the work
    /// was already resolved or timed out.
    pub fn report(&self, value: T) -> Result<()> {
        self.simulation
            .update(|sim| sim.resolve_async(&self.pending_id, value.into_payload()))
    }
}
