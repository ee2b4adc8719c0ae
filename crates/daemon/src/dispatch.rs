// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge from the scheduler's hand-off to pooled copy work

use pk_core::{Clock, CopyTask};
use pk_engine::{CopyEngine, PoolJob, TaskSink, WorkerPool};
use std::sync::Arc;

/// Turns a dispatched task into a pool job running the copy engine.
///
/// A full pool comes back as a typed rejection carrying the task, which the
/// scheduler reinserts at the head of the queue.
pub struct CopyDispatcher<C: Clock> {
    engine: Arc<CopyEngine<C>>,
    pool: Arc<WorkerPool<C>>,
}

impl<C: Clock> CopyDispatcher<C> {
    pub fn new(engine: Arc<CopyEngine<C>>, pool: Arc<WorkerPool<C>>) -> Self {
        Self { engine, pool }
    }
}

impl<C: Clock> TaskSink for CopyDispatcher<C> {
    fn try_execute(&self, task: CopyTask) -> Result<(), CopyTask> {
        let engine = self.engine.clone();
        let job_task = task.clone();
        let job = PoolJob::new(task.source.display().to_string(), async move {
            engine.copy_file(&job_task).await;
        });
        match self.pool.try_execute(job) {
            Ok(()) => Ok(()),
            Err(_rejected) => Err(task),
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
