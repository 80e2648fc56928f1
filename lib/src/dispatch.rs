//! Bounded worker pool that performs store writes off the parsing thread.
//!
//! Workers are scoped threads: a [`Dispatcher`] lives inside the
//! `std::thread::scope` of one ingest call, so no write can outlive it.
//! Finished write-sets travel to the workers through a bounded queue; when
//! every worker is busy and the queue is full, [`Dispatcher::submit`] blocks
//! the caller.

use crate::batcher::WriteSet;
use crate::errors::IngestError;
use crate::store::{DocumentStore, Transaction};
use anyhow::Context;
use log::{debug, warn};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{Scope, ScopedJoinHandle};

/// One unit of concurrent work: a write-set plus the graphs first seen in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub write_set: WriteSet,
    /// Graphs whose existence record must be guaranteed before the write.
    pub new_graphs: Vec<String>,
}

impl Task {
    pub fn new(write_set: WriteSet, new_graphs: Vec<String>) -> Self {
        Task {
            write_set,
            new_graphs,
        }
    }

    /// Registers the new graphs, at most `max_graphs_per_request` per call,
    /// then writes the write-set under `tx`.
    pub fn execute<S>(
        &self,
        store: &S,
        tx: &Transaction,
        max_graphs_per_request: usize,
    ) -> anyhow::Result<()>
    where
        S: DocumentStore + ?Sized,
    {
        for chunk in self.new_graphs.chunks(max_graphs_per_request.max(1)) {
            store
                .ensure_graphs_exist(chunk, tx)
                .with_context(|| format!("failed to register {} graph(s)", chunk.len()))?;
        }
        if !self.write_set.is_empty() {
            store
                .write(&self.write_set, tx)
                .with_context(|| format!("failed to write {} document(s)", self.write_set.len()))?;
        }
        Ok(())
    }
}

struct Job {
    id: usize,
    task: Task,
    done: Sender<anyhow::Result<()>>,
}

/// Tracks the outcome of a submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    id: usize,
    result: Receiver<anyhow::Result<()>>,
}

impl TaskHandle {
    /// Submission sequence number, starting at 0.
    pub fn id(&self) -> usize {
        self.id
    }
}

pub struct Dispatcher<'scope> {
    queue: Option<SyncSender<Job>>,
    workers: Vec<ScopedJoinHandle<'scope, ()>>,
    next_id: usize,
}

impl<'scope> Dispatcher<'scope> {
    /// Spawns `workers` writer threads inside `scope`. At most `queue_depth`
    /// submitted tasks wait for a free worker.
    pub fn start<'env, S>(
        scope: &'scope Scope<'scope, 'env>,
        store: &'env S,
        tx: &'env Transaction,
        workers: usize,
        queue_depth: usize,
        max_graphs_per_request: usize,
    ) -> Result<Self, IngestError>
    where
        S: DocumentStore + ?Sized,
    {
        let (queue, jobs) = mpsc::sync_channel::<Job>(queue_depth);
        let jobs = Arc::new(Mutex::new(jobs));
        let mut dispatcher = Dispatcher {
            queue: Some(queue),
            workers: Vec::with_capacity(workers),
            next_id: 0,
        };
        for n in 0..workers.max(1) {
            let jobs = Arc::clone(&jobs);
            let worker = std::thread::Builder::new()
                .name(format!("rdfdocs-writer-{}", n))
                .spawn_scoped(scope, move || {
                    worker_loop(&jobs, store, tx, max_graphs_per_request)
                })
                .map_err(|e| IngestError::Dispatch(format!("failed to spawn writer thread: {}", e)))?;
            dispatcher.workers.push(worker);
        }
        Ok(dispatcher)
    }

    /// Queues a task, blocking while the queue is full.
    pub fn submit(&mut self, task: Task) -> Result<TaskHandle, IngestError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| IngestError::Dispatch("dispatcher is shut down".to_string()))?;
        let id = self.next_id;
        self.next_id += 1;
        debug!(
            "Submitting task {} ({} documents, {} new graphs)",
            id,
            task.write_set.len(),
            task.new_graphs.len()
        );
        let (done, result) = mpsc::channel();
        queue
            .send(Job { id, task, done })
            .map_err(|_| IngestError::Dispatch("all writer threads have exited".to_string()))?;
        Ok(TaskHandle { id, result })
    }

    /// Waits for every handle and shuts the pool down. If any task failed,
    /// the failure of the earliest submitted one is returned.
    pub fn join_all(mut self, handles: Vec<TaskHandle>) -> Result<(), IngestError> {
        self.queue.take();
        let mut first_failure: Option<IngestError> = None;
        for handle in handles {
            let failure = match handle.result.recv() {
                Ok(Ok(())) => {
                    debug!("Task {} completed", handle.id);
                    continue;
                }
                Ok(Err(source)) => IngestError::Write {
                    task: handle.id,
                    source,
                },
                Err(_) => IngestError::Dispatch(format!(
                    "writer thread exited before finishing task {}",
                    handle.id
                )),
            };
            if first_failure.is_none() {
                first_failure = Some(failure);
            } else {
                warn!("Discarding later failure: {}", failure);
            }
        }
        let shutdown = self.shutdown();
        match first_failure {
            Some(failure) => Err(failure),
            None => shutdown,
        }
    }

    /// Lets already submitted tasks run to completion and discards their
    /// results.
    pub fn abandon(mut self, handles: Vec<TaskHandle>) {
        drop(handles);
        if let Err(e) = self.shutdown() {
            warn!("{}", e);
        }
    }

    fn shutdown(&mut self) -> Result<(), IngestError> {
        // closing the queue lets workers drain it and exit
        self.queue.take();
        let panicked = self
            .workers
            .drain(..)
            .map(|w| w.join())
            .filter(|r| r.is_err())
            .count();
        if panicked > 0 {
            return Err(IngestError::Dispatch(format!(
                "{} writer thread(s) panicked",
                panicked
            )));
        }
        Ok(())
    }
}

impl Drop for Dispatcher<'_> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn worker_loop<S>(jobs: &Mutex<Receiver<Job>>, store: &S, tx: &Transaction, max_graphs: usize)
where
    S: DocumentStore + ?Sized,
{
    loop {
        let job = {
            let receiver = match jobs.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            receiver.recv()
        };
        let Ok(job) = job else {
            break;
        };
        debug!(
            "Running task {} on {}",
            job.id,
            std::thread::current().name().unwrap_or("writer")
        );
        let result = job.task.execute(store, tx, max_graphs);
        // the handle may already be gone if the ingest call was abandoned
        let _ = job.done.send(result);
    }
}
