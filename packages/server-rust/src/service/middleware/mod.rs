//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`metrics`]: dispatch timing and counting via `tracing` spans and `metrics`
//! - [`pipeline`]: composes the layers around the router

pub mod metrics;
pub mod pipeline;

pub use metrics::MetricsLayer;
pub use pipeline::{build_dispatch_pipeline, DispatchPipeline};
