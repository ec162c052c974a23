//! Orca worker: serves [WorkerService] for the head node it registers with.

use ::std::{net::SocketAddr, num::NonZeroU64, pin::pin, sync::Arc, time::Duration};

use ::orca_common::{
    address::HeadAddress,
    anyhow::anyhow,
    error::{OrcaError, Result},
    function::FunctionRegistry,
    futures::{future, StreamExt},
    rpc::{connect_head_address, context_with_timeout, spawn, WorkerService},
    serde::Deserialize,
    tarpc::{
        context::Context,
        serde_transport::tcp,
        server::{BaseChannel, Channel},
        tokio_serde::formats::Json,
    },
    task::{FunctionName, TaskError, TaskResult, TaskSpec, WorkerId},
    tracing::{debug, info},
};
use ::tokio::task::{JoinHandle, JoinSet};

/// Configuration for an Orca worker
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(crate = "orca_common::serde")]
pub struct WorkerConfig {
    /// Head node to register with
    pub head_address: HeadAddress,
    /// Address the worker listens on for the head node
    pub rpc_address: SocketAddr,
    /// Address the head node should use to reach the worker.
    /// Required when `rpc_address` is unspecified (`0.0.0.0` or `::`).
    #[serde(default)]
    pub advertise_address: Option<SocketAddr>,
    #[serde(default = "default_connect_timeout_millis")]
    pub connect_timeout_millis: NonZeroU64,
}

fn default_connect_timeout_millis() -> NonZeroU64 {
    NonZeroU64::MIN.saturating_add(4999)
}

/// Executes tasks with the functions of its registry.
#[derive(Clone)]
pub struct WorkerServer {
    registry: Arc<FunctionRegistry>,
}

impl WorkerServer {
    pub fn new(registry: FunctionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}

impl WorkerService for WorkerServer {
    async fn execute(self, _: Context, spec: TaskSpec) -> TaskResult {
        debug!("Execute task {} ({})", spec.id, spec.function);
        let registry = self.registry;
        // functions may block, keep them away from the RPC threads
        tokio::task::spawn_blocking(move || registry.invoke(&spec.function, spec.args))
            .await
            .unwrap_or_else(|e| Err(TaskError::Panicked(e.to_string())))
    }

    async fn functions(self, _: Context) -> Vec<FunctionName> {
        self.registry.names()
    }
}

/// A running worker. Dropping it stops the worker.
pub struct WorkerHandle {
    id: WorkerId,
    rpc_address: SocketAddr,
    task: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Address the worker is bound to.
    pub fn rpc_address(&self) -> SocketAddr {
        self.rpc_address
    }

    /// Run until the RPC server stops.
    pub async fn wait(mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task.await.map_err(OrcaError::fail_to_start_server),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Start serving tasks and register with the head node.
pub async fn start_worker(config: WorkerConfig, registry: FunctionRegistry) -> Result<WorkerHandle> {
    let mut listener = tcp::listen(config.rpc_address, Json::default)
        .await
        .map_err(OrcaError::fail_to_start_server)?;
    listener.config_mut().max_frame_length(usize::MAX);
    let rpc_address = listener.local_addr();
    let advertise_address = advertise_address(config.advertise_address, rpc_address)?;
    info!("Orca worker is listening on {}", rpc_address);

    let server = WorkerServer::new(registry);
    let task = tokio::spawn(async move {
        let mut connections = JoinSet::new();
        let mut channels = pin!(listener
            .filter_map(|r| future::ready(r.ok()))
            .map(BaseChannel::with_defaults));
        while let Some(channel) = channels.next().await {
            while connections.try_join_next().is_some() {}
            connections.spawn(channel.execute(server.clone().serve()).for_each(spawn));
        }
    });
    // from here on, dropping the handle stops the server if the registration fails
    let mut handle = WorkerHandle {
        id: WorkerId::new(0),
        rpc_address,
        task: Some(task),
    };

    let timeout = Duration::from_millis(config.connect_timeout_millis.get());
    let head = connect_head_address(&config.head_address, timeout).await?;
    handle.id = head
        .register_worker(context_with_timeout(timeout * 2), advertise_address)
        .await?
        .map_err(|e| OrcaError::fail_to_register_worker(anyhow!(e)))?;
    info!(
        "Registered with head node {} as worker {}",
        config.head_address, handle.id
    );
    Ok(handle)
}

/// The head node cannot connect back to an unspecified address.
fn advertise_address(configured: Option<SocketAddr>, bound: SocketAddr) -> Result<SocketAddr> {
    match configured {
        Some(address) => Ok(address),
        None if bound.ip().is_unspecified() => Err(OrcaError::not_allowed(anyhow!(
            "advertise_address is required when listening on {}.",
            bound
        ))),
        None => Ok(bound),
    }
}
