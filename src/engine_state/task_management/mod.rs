//! # Task Management System
//!
//! This module provides the worker pool that runs chunk generation and layer
//! meshing off the main thread.
//!
//! ## Architecture Overview
//!
//! The task management system consists of several key components:
//! - `TaskManager`: Central coordinator for task distribution and worker management
//! - `Task`: A unit of work that can be executed asynchronously
//! - `TaskResult`: The result of a completed task, applied on the main thread
//! - `TaskChannel`: Communication channel between the main thread and one worker
//!
//! ## Task Lifecycle
//! 1. Tasks are created and published via `TaskManager::publish_task()`
//! 2. The manager distributes tasks to available worker channels using round-robin
//! 3. Workers process tasks and send results back over their channel
//! 4. Results are polled, never awaited, on the main thread in `process_completed_tasks()`
//! 5. Results can spawn new tasks
//!
//! ## Inline Mode
//! A manager created with zero workers runs every task synchronously inside
//! `publish_task()` and queues its result. Results are still only applied by
//! `process_completed_tasks()`, so the ordering seen by the engine is the same
//! as with a real pool. Tests use this mode for deterministic frame stepping.
//!
//! ## Failures
//! Worker panics are caught and turned into failed results. A failed result
//! makes `process_completed_tasks()` return the error.

pub mod task;

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use log::{info, trace};
use task::{Task, TaskContext, TaskFailure, TaskResult};

/// A communication channel between the main thread and a worker thread.
///
/// # Fields
/// - `task_sender`: Sends tasks from main thread to worker
/// - `result_receiver`: Receives task results from worker
/// - `num_tasks_in_flight`: Tracks number of tasks currently being processed
/// - `_worker`: Handle to the worker thread (kept alive by this struct)
#[derive(Debug)]
pub struct TaskChannel {
    task_sender: Sender<Box<dyn Task + Send>>,
    result_receiver: Receiver<Box<dyn TaskResult + Send>>,
    num_tasks_in_flight: usize,
    _worker: JoinHandle<()>,
}

/// Manages a pool of worker threads and coordinates task execution.
///
/// The `TaskManager` is responsible for:
/// - Creating and managing worker threads
/// - Distributing tasks across available workers
/// - Collecting and applying task results
/// - Queuing tasks when all workers are busy
pub struct TaskManager {
    channels: Vec<TaskChannel>,
    queued_tasks: VecDeque<Box<dyn Task + Send>>,
    inline_results: VecDeque<Box<dyn TaskResult + Send>>,
    current_channel: usize,
}

/// Maximum number of tasks that can be in flight per worker channel.
///
/// Keeping this small keeps the queue on the main thread, where stale work
/// can still be observed before it is sent.
pub const MAX_TASKS_IN_FLIGHT: usize = 2;

/// Runs one task, turning errors and panics into a failed result.
fn run_task(task: &dyn Task) -> Box<dyn TaskResult + Send> {
    match catch_unwind(AssertUnwindSafe(|| task.process())) {
        Ok(Ok(result)) => result,
        Ok(Err(error)) => Box::new(TaskFailure::new(
            error.context(format!("{} failed", task.describe())),
        )),
        Err(payload) => Box::new(TaskFailure::from_panic(&task.describe(), payload)),
    }
}

impl TaskManager {
    /// Creates a new `TaskManager` with the specified number of worker threads.
    ///
    /// # Arguments
    /// * `num_workers` - Number of worker threads to create. Zero selects inline mode.
    ///
    /// # Errors
    /// Fails if a worker thread cannot be spawned.
    pub fn new(num_workers: usize) -> Result<Self> {
        let mut channels = Vec::with_capacity(num_workers);

        if num_workers > 0 {
            info!(
                "Starting {} task workers (available parallelism: {:?})",
                num_workers,
                thread::available_parallelism()
            );
        } else {
            info!("Running tasks inline on the main thread");
        }

        for index in 0..num_workers {
            let (task_tx, task_rx) = channel::<Box<dyn Task + Send>>();
            let (result_tx, result_rx) = channel::<Box<dyn TaskResult + Send>>();

            let task_closure = move || {
                while let Ok(task) = task_rx.recv() {
                    let result = run_task(task.as_ref());
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            };

            let worker = thread::Builder::new()
                .name(format!("terrain-worker-{index}"))
                .spawn(task_closure)
                .with_context(|| format!("failed to spawn task worker {index}"))?;

            channels.push(TaskChannel {
                task_sender: task_tx,
                result_receiver: result_rx,
                num_tasks_in_flight: 0,
                _worker: worker,
            });
        }

        Ok(TaskManager {
            channels,
            queued_tasks: VecDeque::new(),
            inline_results: VecDeque::new(),
            current_channel: 0,
        })
    }

    /// Number of worker threads. Zero means inline mode.
    pub fn worker_count(&self) -> usize {
        self.channels.len()
    }

    /// Tasks published but not yet completed, including queued ones.
    pub fn outstanding(&self) -> usize {
        self.channels
            .iter()
            .map(|channel| channel.num_tasks_in_flight)
            .sum::<usize>()
            + self.queued_tasks.len()
            + self.inline_results.len()
    }

    /// Attempts to send a task to a specific worker channel.
    ///
    /// # Returns
    /// - `Ok(())` if the task was successfully sent to the worker
    /// - `Err(task)` if the send failed (the worker is gone)
    fn try_send_task(
        &mut self,
        task: Box<dyn Task + Send>,
        channel_idx: usize,
    ) -> Result<(), Box<dyn Task + Send>> {
        match self.channels[channel_idx].task_sender.send(task) {
            Ok(_) => {
                self.channels[channel_idx].num_tasks_in_flight += 1;
                Ok(())
            }
            Err(task) => Err(task.0),
        }
    }

    /// Finds an available worker channel, round-robin from the last used one.
    ///
    /// # Returns
    /// - `Some(usize)` index of a channel below `MAX_TASKS_IN_FLIGHT`
    /// - `None` if all channels are busy or there are no channels
    fn find_available_channel(&self) -> Option<usize> {
        let count = self.channels.len();
        (0..count)
            .map(|offset| (self.current_channel + offset) % count)
            .find(|&index| self.channels[index].num_tasks_in_flight < MAX_TASKS_IN_FLIGHT)
    }

    /// Publishes a new task for execution.
    ///
    /// # Returns
    /// - `true` if the task was immediately scheduled (or, inline, executed)
    /// - `false` if the task was queued because all workers are busy
    pub fn publish_task(&mut self, task: Box<dyn Task + Send>) -> bool {
        if self.channels.is_empty() {
            trace!("Running {} inline", task.describe());
            self.inline_results.push_back(run_task(task.as_ref()));
            return true;
        }

        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(task, channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                    true
                }
                Err(task) => {
                    self.queued_tasks.push_back(task);
                    false
                }
            },
            None => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Sends queued tasks to workers that have room, oldest first.
    pub fn process_queued_tasks(&mut self) {
        while let Some(channel_idx) = self.find_available_channel() {
            let Some(task) = self.queued_tasks.pop_front() else {
                break;
            };
            match self.try_send_task(task, channel_idx) {
                Ok(_) => self.current_channel = (channel_idx + 1) % self.channels.len(),
                Err(task) => {
                    self.queued_tasks.push_front(task);
                    break;
                }
            }
        }
    }

    /// Applies every result that has completed so far, without blocking.
    ///
    /// # Returns
    /// The number of results applied.
    ///
    /// # Errors
    /// Returns the first failed result's error. Results received after it in
    /// the same poll are left unapplied.
    pub fn process_completed_tasks(&mut self, context: &mut TaskContext<'_>) -> Result<usize> {
        let mut completed: Vec<Box<dyn TaskResult + Send>> = self.inline_results.drain(..).collect();
        for channel in &mut self.channels {
            loop {
                match channel.result_receiver.try_recv() {
                    Ok(result) => {
                        channel.num_tasks_in_flight -= 1;
                        completed.push(result);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        anyhow::bail!("a task worker exited unexpectedly");
                    }
                }
            }
        }

        let applied = completed.len();
        let mut follow_ups = Vec::new();
        for result in completed {
            follow_ups.extend(result.handle_result(context)?);
        }
        for task in follow_ups {
            self.publish_task(task);
        }
        self.process_queued_tasks();

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use anyhow::bail;

    use super::*;
    use crate::engine_state::{
        rendering::layer::LayerSet,
        voxels::{block::BlockCatalog, world::World},
    };

    /// Values whose results have been applied, in order.
    type Handled = Arc<Mutex<Vec<u32>>>;

    struct Echo {
        value: u32,
        handled: Handled,
    }

    struct EchoResult {
        value: u32,
        handled: Handled,
    }

    fn echo(value: u32, handled: &Handled) -> Box<dyn Task + Send> {
        Box::new(Echo {
            value,
            handled: handled.clone(),
        })
    }

    impl Task for Echo {
        fn process(&self) -> Result<Box<dyn TaskResult + Send>> {
            match self.value {
                13 => bail!("unlucky"),
                99 => panic!("boom"),
                value => Ok(Box::new(EchoResult {
                    value,
                    handled: self.handled.clone(),
                })),
            }
        }

        fn describe(&self) -> String {
            format!("echo {}", self.value)
        }
    }

    impl TaskResult for EchoResult {
        fn handle_result(self: Box<Self>, _context: &mut TaskContext<'_>) -> Result<Vec<Box<dyn Task + Send>>> {
            self.handled.lock().unwrap().push(self.value);
            Ok(Vec::new())
        }
    }

    fn fixtures() -> (World, LayerSet) {
        (World::new(Arc::new(BlockCatalog::builtin().unwrap())), LayerSet::new(32))
    }

    fn drain(manager: &mut TaskManager, world: &mut World, layers: &mut LayerSet) -> Result<usize> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut total = 0;
        while manager.outstanding() > 0 && Instant::now() < deadline {
            let mut context = TaskContext {
                world: &mut *world,
                layers: &mut *layers,
            };
            total += manager.process_completed_tasks(&mut context)?;
            thread::sleep(Duration::from_millis(1));
        }
        Ok(total)
    }

    #[test]
    fn inline_mode_defers_results_until_polled() {
        let (mut world, mut layers) = fixtures();
        let handled = Handled::default();
        let mut manager = TaskManager::new(0).unwrap();
        assert!(manager.publish_task(echo(1, &handled)));
        assert!(manager.publish_task(echo(2, &handled)));
        assert!(handled.lock().unwrap().is_empty());
        assert_eq!(manager.outstanding(), 2);

        let mut context = TaskContext {
            world: &mut world,
            layers: &mut layers,
        };
        assert_eq!(manager.process_completed_tasks(&mut context).unwrap(), 2);
        assert_eq!(*handled.lock().unwrap(), vec![1, 2]);
        assert_eq!(manager.outstanding(), 0);
        assert_eq!(world.pending_count(), 0);
    }

    #[test]
    fn worker_pool_completes_every_task_exactly_once() {
        let (mut world, mut layers) = fixtures();
        let handled = Handled::default();
        let mut manager = TaskManager::new(3).unwrap();
        for value in 0..20 {
            manager.publish_task(echo(value, &handled));
        }
        assert_eq!(drain(&mut manager, &mut world, &mut layers).unwrap(), 20);

        let mut values = handled.lock().unwrap().clone();
        values.sort_unstable();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn failures_and_panics_surface_as_errors() {
        let (mut world, mut layers) = fixtures();
        let handled = Handled::default();
        let mut manager = TaskManager::new(0).unwrap();
        manager.publish_task(echo(13, &handled));
        let mut context = TaskContext {
            world: &mut world,
            layers: &mut layers,
        };
        let error = manager.process_completed_tasks(&mut context).unwrap_err();
        assert!(format!("{error:#}").contains("unlucky"));

        let mut manager = TaskManager::new(1).unwrap();
        manager.publish_task(echo(99, &handled));
        let error = drain(&mut manager, &mut world, &mut layers).unwrap_err();
        assert!(error.to_string().contains("boom"));
        assert!(handled.lock().unwrap().is_empty());
    }
}
