//! Clip ingestion pipeline.
//!
//! Pollers discover clips per broadcaster and hand each one to a bounded
//! worker pool, where it is deduplicated, stored and announced.
//!
//! - `poller`: per-source polling state machine
//! - `worker`: bounded worker pool
//! - `task`: processing of a single clip
//! - `service`: start/stop orchestration
//! - `shutdown`: cancellation signal

mod poller;
mod service;
mod shutdown;
mod task;
mod types;
mod worker;

pub use poller::{
    CycleReport, PipelineDeps, PollerConfig, PollerState, SourcePoller, DEFAULT_BACKFILL,
};
pub use service::IngestionPipeline;
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use task::{ClipProcessor, IngestOutcome};
pub use types::{DiscoveredClip, MonitoredSource};
pub use worker::{
    FailureHandler, RejectReason, SubmitResult, Task, TaskError, WorkerPool, DEFAULT_QUEUE_FACTOR,
};
