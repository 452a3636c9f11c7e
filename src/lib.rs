//! Dispatch-and-lowering bridge between a tensor compiler and the STONNE
//! accelerator simulator.
pub mod config;
pub mod dispatch;
pub mod exec;
pub mod ffi;
pub mod lower;
pub mod metrics;
pub mod pipeline;
pub mod runtime;
pub mod shapes;
pub mod telemetry;
pub mod types;

pub use config::{AcceleratorConfig, ConfigError, Stationarity, TileConfig};
pub use dispatch::ExecutionPath;
pub use metrics::{MetricsReporter, ReportSummary, ReportingConfig, TuningContext};
pub use pipeline::{
    conv2d_forward, linear_forward, Conv2dRequest, ExecutionResult, ForwardError, LinearRequest,
};
pub use runtime::{ReferenceSimulator, Simulator, SimulatorError};
pub use shapes::{GemmShape, ShapeMismatch};
pub use types::{ConvShape, LinearShape, TensorView, TensorViewMut};
