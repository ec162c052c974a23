//! Places where the head node can run a task: workers inside the head process
//! and workers reached through RPC.

use ::core::future::Future;
use ::std::{net::SocketAddr, sync::Arc, time::Duration};

use ::orca_common::{
    error::Result,
    function::FunctionRegistry,
    rpc::{connect_worker, context_with_timeout, WorkerServiceClient},
    tarpc::client::RpcError,
    task::{TaskError, TaskOutput, TaskSpec},
    tracing::info,
};

/// Why an executor did not return an output.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteError {
    /// The task ran and failed. Running it again elsewhere would fail in the same way.
    Task(TaskError),
    /// The executor cannot be reached anymore. The task may be retried on another one.
    Lost(String),
}

/// Something that can execute tasks for the scheduler.
pub trait Executor: Send + Sync + 'static {
    /// Address of the worker, `None` if it runs inside the head process.
    fn address(&self) -> Option<SocketAddr>;

    fn execute(
        &self,
        spec: TaskSpec,
    ) -> impl Future<Output = std::result::Result<TaskOutput, ExecuteError>> + Send;
}

/// Executes tasks on the blocking thread pool of the head process.
pub struct LocalWorker {
    registry: Arc<FunctionRegistry>,
}

impl LocalWorker {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }
}

impl Executor for LocalWorker {
    fn address(&self) -> Option<SocketAddr> {
        None
    }

    async fn execute(&self, spec: TaskSpec) -> std::result::Result<TaskOutput, ExecuteError> {
        let registry = self.registry.clone();
        // panics are caught by the registry, so a join error means the runtime is going away
        tokio::task::spawn_blocking(move || registry.invoke(&spec.function, spec.args))
            .await
            .map_err(|e| ExecuteError::Lost(e.to_string()))?
            .map_err(ExecuteError::Task)
    }
}

/// A worker process reached through [WorkerServiceClient].
pub struct RemoteWorker {
    address: SocketAddr,
    client: WorkerServiceClient,
    task_timeout: Duration,
}

impl RemoteWorker {
    /// Connect to the worker listening on `address` and check it answers.
    pub async fn connect(
        address: SocketAddr,
        connect_timeout: Duration,
        task_timeout: Duration,
    ) -> Result<Self> {
        let client = connect_worker(address, connect_timeout).await?;
        let functions = client
            .functions(context_with_timeout(connect_timeout))
            .await?;
        info!("Worker at {} provides functions {:?}", address, functions);
        Ok(Self {
            address,
            client,
            task_timeout,
        })
    }
}

impl Executor for RemoteWorker {
    fn address(&self) -> Option<SocketAddr> {
        Some(self.address)
    }

    async fn execute(&self, spec: TaskSpec) -> std::result::Result<TaskOutput, ExecuteError> {
        match self
            .client
            .execute(context_with_timeout(self.task_timeout), spec)
            .await
        {
            Ok(result) => result.map_err(ExecuteError::Task),
            Err(RpcError::DeadlineExceeded) => Err(ExecuteError::Task(TaskError::TimedOut(
                format!("no result from worker {} after {:?}", self.address, self.task_timeout),
            ))),
            Err(e) => Err(ExecuteError::Lost(e.to_string())),
        }
    }
}

/// Every kind of worker the head node schedules on.
pub enum Worker {
    Local(LocalWorker),
    Remote(RemoteWorker),
}

impl Executor for Worker {
    fn address(&self) -> Option<SocketAddr> {
        match self {
            Self::Local(worker) => worker.address(),
            Self::Remote(worker) => worker.address(),
        }
    }

    async fn execute(&self, spec: TaskSpec) -> std::result::Result<TaskOutput, ExecuteError> {
        match self {
            Self::Local(worker) => worker.execute(spec).await,
            Self::Remote(worker) => worker.execute(spec).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::orca_common::{
        function::builtin::builtin_registry,
        serde_json::{self, json},
        task::TaskId,
    };

    fn spec(function: &str, args: serde_json::Value) -> TaskSpec {
        TaskSpec {
            id: TaskId::new(0),
            function: function.to_owned(),
            args,
        }
    }

    #[tokio::test]
    async fn local_worker_executes_square() {
        let worker = LocalWorker::new(Arc::new(builtin_registry()));
        assert_eq!(worker.execute(spec("square", json!(12))).await, Ok(json!(144)));
        assert_eq!(worker.address(), None);
    }

    #[tokio::test]
    async fn local_worker_reports_task_error() {
        let worker = Worker::Local(LocalWorker::new(Arc::new(builtin_registry())));
        assert_eq!(
            worker.execute(spec("cube", json!(2))).await,
            Err(ExecuteError::Task(TaskError::FunctionNotFound(
                "cube".to_owned()
            )))
        );
    }
}
