//! Concurrent ingestion: dispatcher, worker pool, and completion tracking

pub mod coordinator;
pub mod dispatcher;
pub mod failure;
pub mod tracker;
pub mod worker;

pub use coordinator::{Pipeline, PipelineConfigBuilder};
pub use failure::{FailurePolicy, RowFailure};
