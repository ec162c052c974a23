//! RPC server of the head node.

use ::std::{net::SocketAddr, pin::pin, time::Duration};

use ::orca_common::{
    error::{OrcaError, Result},
    futures::{future, StreamExt},
    rpc::{spawn, HeadService},
    serde_json,
    tarpc::{
        context::Context,
        serde_transport::tcp,
        server::{BaseChannel, Channel},
        tokio_serde::formats::Json,
    },
    task::{ClusterInfo, FunctionName, TaskId, TaskResult, WorkerId},
    tracing::{error, info},
};
use ::tokio::task::{JoinHandle, JoinSet};

use crate::{
    executor::{RemoteWorker, Worker},
    scheduler::Scheduler,
};

#[derive(Clone)]
pub(crate) struct HeadServer {
    scheduler: Scheduler<Worker>,
    worker_connect_timeout: Duration,
    task_timeout: Duration,
}

impl HeadServer {
    pub(crate) fn new(
        scheduler: Scheduler<Worker>,
        worker_connect_timeout: Duration,
        task_timeout: Duration,
    ) -> Self {
        Self {
            scheduler,
            worker_connect_timeout,
            task_timeout,
        }
    }
}

impl HeadService for HeadServer {
    async fn submit(
        self,
        _: Context,
        function: FunctionName,
        args: serde_json::Value,
    ) -> TaskId {
        self.scheduler.submit(function, args)
    }

    async fn get(self, _: Context, ids: Vec<TaskId>) -> Vec<TaskResult> {
        self.scheduler.get(ids).await
    }

    async fn free(self, _: Context, ids: Vec<TaskId>) {
        self.scheduler.free(&ids)
    }

    async fn register_worker(
        self,
        _: Context,
        address: SocketAddr,
    ) -> std::result::Result<WorkerId, String> {
        match RemoteWorker::connect(address, self.worker_connect_timeout, self.task_timeout).await
        {
            Ok(worker) => Ok(self.scheduler.add_worker(Worker::Remote(worker))),
            Err(e) => {
                error!("Failed to register worker at {}: {}", address, e);
                Err(e.to_string())
            }
        }
    }

    async fn cluster_info(self, _: Context) -> ClusterInfo {
        self.scheduler.cluster_info()
    }
}

/// Bind `address` and serve every incoming connection with `server`.
/// # Return
/// The bound address and the task serving connections. Aborting the task closes every connection.
pub(crate) async fn serve_rpc(
    address: SocketAddr,
    server: HeadServer,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let mut listener = tcp::listen(address, Json::default)
        .await
        .map_err(OrcaError::fail_to_start_server)?;
    listener.config_mut().max_frame_length(usize::MAX);
    let local_address = listener.local_addr();
    info!("Orca head is listening on {}", local_address);

    let handle = tokio::spawn(async move {
        // connections are owned by the set, so aborting this task closes them too
        let mut connections = JoinSet::new();
        let mut channels = pin!(listener
            .filter_map(|r| future::ready(r.ok()))
            .map(BaseChannel::with_defaults));
        while let Some(channel) = channels.next().await {
            while connections.try_join_next().is_some() {}
            connections.spawn(channel.execute(server.clone().serve()).for_each(spawn));
        }
    });
    Ok((local_address, handle))
}
