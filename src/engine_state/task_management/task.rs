//! # Task System Core Traits
//!
//! This module defines the fundamental building blocks of the task system,
//! which executes CPU-only work (chunk generation, layer meshing) off the
//! thread that owns the graphics device.
//!
//! ## Core Components
//! - `Task`: A unit of work that can be executed asynchronously
//! - `TaskResult`: The result of a completed task, applied on the main thread
//! - `TaskContext`: The main-thread state a result may touch
//!
//! ## Task Lifecycle
//! 1. A `Task` is created and scheduled via `TaskManager::publish_task()`
//! 2. The task's `process()` method is called on a worker thread
//! 3. The task returns a boxed `TaskResult`, or an error
//! 4. The result's `handle_result()` is called on the main thread
//! 5. The result can publish follow-up tasks
//!
//! ## Failures
//! A task that returns an error or panics is turned into a [`TaskFailure`]
//! result. Handling it yields the error, which the engine treats as fatal.
//! Tasks are never retried.

use std::any::Any;

use anyhow::{anyhow, Error, Result};

use crate::engine_state::{rendering::layer::LayerSet, voxels::world::World};

/// A trait representing a unit of work that can be executed asynchronously.
///
/// Tasks own everything they need (shared handles, immutable configuration
/// behind `Arc`) and never touch main-thread state directly.
pub trait Task: Send {
    /// Processes the task on a worker thread.
    ///
    /// # Returns
    /// A boxed `TaskResult` that will be processed on the main thread.
    fn process(&self) -> Result<Box<dyn TaskResult + Send>>;

    /// Short human-readable description used in logs and error context.
    fn describe(&self) -> String;
}

/// Main-thread state available to task results.
pub struct TaskContext<'a> {
    pub world: &'a mut World,
    pub layers: &'a mut LayerSet,
}

/// A trait representing the result of processing a `Task`.
///
/// Results are applied on the main thread, one at a time, in the order they
/// are received.
pub trait TaskResult: Send {
    /// Applies the result.
    ///
    /// # Returns
    /// Follow-up tasks to publish (usually none).
    fn handle_result(self: Box<Self>, context: &mut TaskContext<'_>) -> Result<Vec<Box<dyn Task + Send>>>;
}

/// The result of a task that failed on its worker.
pub struct TaskFailure {
    error: Error,
}

impl TaskFailure {
    pub fn new(error: Error) -> Self {
        TaskFailure { error }
    }

    /// Wraps a panic payload caught on a worker thread.
    pub fn from_panic(description: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        TaskFailure {
            error: anyhow!("{} panicked: {}", description, message),
        }
    }
}

impl TaskResult for TaskFailure {
    fn handle_result(self: Box<Self>, _context: &mut TaskContext<'_>) -> Result<Vec<Box<dyn Task + Send>>> {
        Err(self.error)
    }
}
