//! # Capture Engine
//!
//! Frame-driven scheduler that decides when each registered sensor captures,
//! tracks results that resolve on later frames and forwards finalized records
//! to a consumer endpoint.
//!
//! ## Usage
//!
//! ```ignore
//! use capture_engine::{DatasetCapture, LogEndpoint};
//! use contracts::{Sensor, SensorDefinition};
//!
//! let mut capture = DatasetCapture::default();
//! capture.set_endpoint_type::<LogEndpoint>();
//!
//! let cam = capture.register_sensor(
//!     SensorDefinition::new("cam", "camera").with_capture_interval(2),
//! )?;
//!
//! loop {
//!     if cam.should_capture_this_frame() {
//!         let readback = cam.report_sensor_async()?;
//!         // resolve `readback` once the GPU copy lands
//!     }
//!     capture.update();
//! }
//! ```

mod capture;
mod endpoint;
mod error;
mod future;
pub mod global;
mod handle;
mod registry;
mod schedule;
mod simulation;

pub use capture::{DatasetCapture, ShutdownReport};
pub use endpoint::{LogEndpoint, MemoryEndpoint, NoOutputEndpoint};
pub use error::{CaptureError, Result};
pub use future::AsyncFuture;
pub use handle::{AnnotationHandle, SensorHandle};
pub use registry::{EndpointFactory, EndpointRegistry};
pub use simulation::{ExecutionState, SharedSimulation, SimulationState, SimulationStats};

// Re-export contracts types
pub use contracts::{
    Annotation, AnnotationDefinition, ConsumerEndpoint, Metric, MetricDefinition, PendingId,
    Sensor, SensorDefinition, SimulationConfig,
};
