pub mod pipeline;
pub mod ratelimit;
pub mod store;

pub use pipeline::{CycleReport, PipelineConfig, PipelineError, SignalPipeline};
pub use ratelimit::TokenBucket;
pub use store::{InterpretationStore, StoreError};
