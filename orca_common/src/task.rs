//! Tasks and their results as they travel between clients, the head and workers.

use ::core::fmt::Display;
use ::std::net::SocketAddr;

use ::serde::{Deserialize, Serialize};

/// Unique identifier of a task, assigned by the head node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a worker, assigned by the head node when the worker registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name under which a remote function is registered on the workers.
pub type FunctionName = String;

/// Output of a task. Typed on the client side, opaque everywhere else.
pub type TaskOutput = serde_json::Value;

/// The unit of work the head sends to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub function: FunctionName,
    pub args: serde_json::Value,
}

/// Why a task did not produce an output.
/// This is sent over the wire, so it only carries messages instead of the source errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskError {
    /// No worker knows a function with this name.
    FunctionNotFound(FunctionName),
    /// The arguments do not match the input type of the function.
    InvalidArgument(String),
    /// The output of the function cannot be serialized.
    InvalidOutput(String),
    /// The function panicked on the worker.
    Panicked(String),
    /// The worker did not answer within the task timeout.
    TimedOut(String),
    /// Every worker the task was sent to went away.
    WorkerLost(String),
    /// The head has no record of this task.
    NotFound(TaskId),
}

impl Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FunctionNotFound(name) => write!(f, "Function {} not found", name),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::InvalidOutput(msg) => write!(f, "Invalid output: {}", msg),
            Self::Panicked(msg) => write!(f, "Task panicked: {}", msg),
            Self::TimedOut(msg) => write!(f, "Task timed out: {}", msg),
            Self::WorkerLost(msg) => write!(f, "Worker lost: {}", msg),
            Self::NotFound(id) => write!(f, "Task {} not found", id),
        }
    }
}

impl std::error::Error for TaskError {}

/// Result of a task as stored on the head node.
pub type TaskResult = Result<TaskOutput, TaskError>;

/// A worker as seen by the head node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    /// `None` for workers running inside the head process.
    pub address: Option<SocketAddr>,
}

/// Snapshot of the cluster state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub workers: Vec<WorkerInfo>,
    pub tasks_submitted: u64,
    pub tasks_finished: u64,
    pub tasks_failed: u64,
}
