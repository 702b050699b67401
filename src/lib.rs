//! # dynflow
//!
//! In-memory workflow orchestration engine.
//!
//! Workflows own tasks; tasks carry dependency edges to other tasks in the
//! same workflow; ready tasks are dispatched through named FIFO queues.
//! All state lives in one explicitly constructed [`db::Database`] and is
//! guarded by a fixed read/write lock hierarchy, so any number of producer
//! and consumer threads can drive it concurrently.

pub mod db;
pub mod error;
pub mod event;
pub mod model;

pub use db::Database;
pub use error::{Error, Result};
pub use model::QueueTask;
