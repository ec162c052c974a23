//! Task scheduling on the head node.
//!
//! Every submitted task gets a slot in the [TaskTable] and a tokio task which sends it
//! to the next worker of the [WorkerPool] in round-robin order.
//! A worker that cannot be reached is removed from the pool and the task is retried on another worker.

use ::std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use ::orca_common::{
    serde_json,
    task::{
        ClusterInfo, FunctionName, TaskError, TaskId, TaskResult, TaskSpec, WorkerId, WorkerInfo,
    },
    tracing::{debug, info, warn},
};
use ::tokio::{
    sync::{watch, Notify},
    task::AbortHandle,
};

use crate::executor::{ExecuteError, Executor};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PoolEntry<E> {
    id: WorkerId,
    address: Option<SocketAddr>,
    executor: Arc<E>,
}

/// Workers that tasks can be scheduled on.
pub struct WorkerPool<E> {
    workers: Mutex<Vec<PoolEntry<E>>>,
    next_worker_id: AtomicU64,
    cursor: AtomicUsize,
    worker_added: Notify,
}

impl<E: Executor> WorkerPool<E> {
    fn new() -> Self {
        Self {
            workers: Mutex::new(vec![]),
            next_worker_id: AtomicU64::new(0),
            cursor: AtomicUsize::new(0),
            worker_added: Notify::new(),
        }
    }

    fn add(&self, executor: E) -> WorkerId {
        let id = WorkerId::new(self.next_worker_id.fetch_add(1, Ordering::Relaxed));
        let address = executor.address();
        lock(&self.workers).push(PoolEntry {
            id,
            address,
            executor: Arc::new(executor),
        });
        self.worker_added.notify_waiters();
        id
    }

    fn remove(&self, id: WorkerId) {
        lock(&self.workers).retain(|entry| entry.id != id);
    }

    fn try_next(&self) -> Option<(WorkerId, Arc<E>)> {
        let workers = lock(&self.workers);
        if workers.is_empty() {
            None
        } else {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % workers.len();
            let entry = &workers[index];
            Some((entry.id, entry.executor.clone()))
        }
    }

    /// Next worker in round-robin order. Waits until one is added if the pool is empty.
    async fn next(&self) -> (WorkerId, Arc<E>) {
        loop {
            // created before checking the pool so that a worker added in between is not missed
            let worker_added = self.worker_added.notified();
            if let Some(worker) = self.try_next() {
                return worker;
            }
            debug!("No worker available, waiting for one to register");
            worker_added.await;
        }
    }

    fn list(&self) -> Vec<WorkerInfo> {
        lock(&self.workers)
            .iter()
            .map(|entry| WorkerInfo {
                id: entry.id,
                address: entry.address,
            })
            .collect()
    }
}

/// Result of a task, `None` until the task finishes.
struct Slot {
    result: watch::Receiver<Option<TaskResult>>,
    /// Dispatch of the task, aborted when the slot is freed.
    dispatch: Option<AbortHandle>,
}

/// Results of submitted tasks.
struct TaskTable {
    slots: Mutex<HashMap<TaskId, Slot>>,
    submitted: AtomicU64,
    finished: AtomicU64,
    failed: AtomicU64,
}

impl TaskTable {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            submitted: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn insert(&self, id: TaskId) -> watch::Sender<Option<TaskResult>> {
        let (sender, result) = watch::channel(None);
        lock(&self.slots).insert(
            id,
            Slot {
                result,
                dispatch: None,
            },
        );
        self.submitted.fetch_add(1, Ordering::Relaxed);
        sender
    }

    fn set_dispatch(&self, id: &TaskId, dispatch: AbortHandle) {
        match lock(&self.slots).get_mut(id) {
            Some(slot) => slot.dispatch = Some(dispatch),
            // freed before the dispatch was recorded
            None => dispatch.abort(),
        }
    }

    fn receiver(&self, id: &TaskId) -> Option<watch::Receiver<Option<TaskResult>>> {
        lock(&self.slots).get(id).map(|slot| slot.result.clone())
    }

    /// Drop the slot. A task that has not finished yet is cancelled.
    fn remove(&self, id: &TaskId) {
        let slot = lock(&self.slots).remove(id);
        if let Some(dispatch) = slot.and_then(|slot| slot.dispatch) {
            dispatch.abort();
        }
    }

    fn record(&self, result: &TaskResult) {
        match result {
            Ok(_) => self.finished.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }
}

struct Inner<E> {
    pool: WorkerPool<E>,
    tasks: TaskTable,
    next_task_id: AtomicU64,
    max_task_retries: u32,
}

impl<E: Executor> Inner<E> {
    /// Run the task until it produces a result, moving to another worker each time one is lost.
    async fn run(&self, spec: TaskSpec) -> TaskResult {
        let mut retries = 0;
        loop {
            let (worker_id, worker) = self.pool.next().await;
            debug!("Run task {} ({}) on worker {}", spec.id, spec.function, worker_id);
            match worker.execute(spec.clone()).await {
                Ok(output) => return Ok(output),
                Err(ExecuteError::Task(e)) => {
                    warn!("Task {} failed on worker {}: {}", spec.id, worker_id, e);
                    return Err(e);
                }
                Err(ExecuteError::Lost(msg)) => {
                    warn!(
                        "Lost worker {} while running task {}: {}",
                        worker_id, spec.id, msg
                    );
                    self.pool.remove(worker_id);
                    if retries >= self.max_task_retries {
                        return Err(TaskError::WorkerLost(msg));
                    }
                    retries += 1;
                }
            }
        }
    }
}

/// Schedules tasks on a pool of executors. Cloning gives another handle to the same scheduler.
pub struct Scheduler<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Executor> Scheduler<E> {
    /// `max_task_retries` is how many times a task is resent after losing its worker.
    pub fn new(max_task_retries: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool: WorkerPool::new(),
                tasks: TaskTable::new(),
                next_task_id: AtomicU64::new(0),
                max_task_retries,
            }),
        }
    }

    pub fn add_worker(&self, executor: E) -> WorkerId {
        let address = executor.address();
        let id = self.inner.pool.add(executor);
        match address {
            Some(address) => info!("Worker {} at {} joined the cluster", id, address),
            None => info!("Local worker {} joined the cluster", id),
        }
        id
    }

    /// Submit a task and return its id immediately. The task runs in the background.
    pub fn submit(&self, function: FunctionName, args: serde_json::Value) -> TaskId {
        let id = TaskId::new(self.inner.next_task_id.fetch_add(1, Ordering::Relaxed));
        let sender = self.inner.tasks.insert(id);
        let spec = TaskSpec { id, function, args };
        let inner = self.inner.clone();
        let dispatch = tokio::spawn(async move {
            let result = inner.run(spec).await;
            inner.tasks.record(&result);
            sender.send_replace(Some(result));
        });
        self.inner.tasks.set_dispatch(&id, dispatch.abort_handle());
        id
    }

    /// Wait for the tasks to finish. The `i`-th result belongs to `ids[i]`.
    pub async fn get(&self, ids: Vec<TaskId>) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let result = match self.inner.tasks.receiver(&id) {
                None => Err(TaskError::NotFound(id)),
                Some(mut receiver) => {
                    let finished = receiver
                        .wait_for(Option::is_some)
                        .await
                        .map(|result| result.clone());
                    match finished {
                        Ok(Some(result)) => result,
                        Ok(None) => Err(TaskError::NotFound(id)),
                        Err(_) => Err(TaskError::WorkerLost(format!(
                            "task {} was dropped before finishing",
                            id
                        ))),
                    }
                }
            };
            results.push(result);
        }
        results
    }

    /// Forget the tasks, cancelling those still waiting for or running on a worker.
    pub fn free(&self, ids: &[TaskId]) {
        for id in ids {
            self.inner.tasks.remove(id);
        }
    }

    pub fn cluster_info(&self) -> ClusterInfo {
        let tasks = &self.inner.tasks;
        ClusterInfo {
            workers: self.inner.pool.list(),
            tasks_submitted: tasks.submitted.load(Ordering::Relaxed),
            tasks_finished: tasks.finished.load(Ordering::Relaxed),
            tasks_failed: tasks.failed.load(Ordering::Relaxed),
        }
    }
}
