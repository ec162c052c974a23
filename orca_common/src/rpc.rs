//! RPC between clients, the head node and workers.
//!
//! Both services run on tarpc with json frames over TCP.
//! - Clients and workers call the [HeadService] of the head node.
//! - The head node calls the [WorkerService] of every registered worker.

use ::core::future::Future;
use ::std::{
    io,
    net::SocketAddr,
    time::{Duration, SystemTime},
};

use ::anyhow::anyhow;
use ::tarpc::{
    client, context,
    serde_transport::tcp,
    tokio_serde::formats::Json,
};

use crate::{
    address::HeadAddress,
    error::{OrcaError, Result},
    task::{ClusterInfo, FunctionName, TaskId, TaskResult, TaskSpec, WorkerId},
};

#[tarpc::service]
pub trait HeadService {
    /// Submit a call of `function` on `args`. The task starts as soon as a worker is available.
    async fn submit(function: FunctionName, args: serde_json::Value) -> TaskId;

    /// Wait for all the tasks to finish. The results are in the same order as `ids`.
    async fn get(ids: Vec<TaskId>) -> Vec<TaskResult>;

    /// Forget the results of the tasks. Unknown ids are ignored.
    async fn free(ids: Vec<TaskId>);

    /// Called by a worker listening on `address` to join the cluster.
    async fn register_worker(address: SocketAddr) -> std::result::Result<WorkerId, String>;

    async fn cluster_info() -> ClusterInfo;
}

#[tarpc::service]
pub trait WorkerService {
    /// Run the task and return its result.
    async fn execute(spec: TaskSpec) -> TaskResult;

    /// Names of the functions this worker can execute.
    async fn functions() -> Vec<FunctionName>;
}

/// A [context::Context] whose deadline is `timeout` from now.
pub fn context_with_timeout(timeout: Duration) -> context::Context {
    let mut ctx = context::current();
    ctx.deadline = SystemTime::now() + timeout;
    ctx
}

/// Connect to the head node at `addr`, giving up after `timeout`.
pub async fn connect_head(addr: SocketAddr, timeout: Duration) -> Result<HeadServiceClient> {
    let mut connect = tcp::connect(addr, Json::default);
    connect.config_mut().max_frame_length(usize::MAX);
    let transport = with_connect_timeout(addr, timeout, connect).await?;
    Ok(HeadServiceClient::new(client::Config::default(), transport).spawn())
}

/// Resolve `address` and connect to the first head node that answers.
/// `timeout` applies to every candidate address.
pub async fn connect_head_address(
    address: &HeadAddress,
    timeout: Duration,
) -> Result<HeadServiceClient> {
    let mut last_error = None;
    for addr in address.to_socket_addrs().await? {
        match connect_head(addr, timeout).await {
            Ok(client) => return Ok(client),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        OrcaError::fail_to_connect(anyhow!("No address to connect to for {}.", address))
    }))
}

/// Connect to the worker at `addr`, giving up after `timeout`.
pub async fn connect_worker(addr: SocketAddr, timeout: Duration) -> Result<WorkerServiceClient> {
    let mut connect = tcp::connect(addr, Json::default);
    connect.config_mut().max_frame_length(usize::MAX);
    let transport = with_connect_timeout(addr, timeout, connect).await?;
    Ok(WorkerServiceClient::new(client::Config::default(), transport).spawn())
}

async fn with_connect_timeout<F, T>(addr: SocketAddr, timeout: Duration, connect: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(transport)) => Ok(transport),
        Ok(Err(e)) => Err(OrcaError::fail_to_connect(anyhow!(
            "Cannot connect to {}: {}",
            addr,
            e
        ))),
        Err(_) => Err(OrcaError::fail_to_connect(anyhow!(
            "Cannot connect to {} within {:?}.",
            addr,
            timeout
        ))),
    }
}

/// Spawn a future on the tokio runtime, used to run the requests of a tarpc channel.
pub async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}
