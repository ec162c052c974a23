use ::std::{net::SocketAddr, num::NonZeroU64, sync::Arc, time::Duration};

use ::orca_common::{
    address::HeadAddress,
    error::{OrcaError, Result},
    function::FunctionRegistry,
    serde::Deserialize,
    tracing::{error, info},
};
use ::tokio::{net::TcpListener, task::JoinHandle};

use executor::{LocalWorker, Worker};
use scheduler::Scheduler;
use server::{serve_rpc, HeadServer};

pub mod dashboard;
pub mod executor;
pub mod scheduler;
mod server;

/// Configuration for the Orca head node
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(crate = "orca_common::serde")]
pub struct HeadConfig {
    /// Address clients and workers connect to
    pub rpc_address: SocketAddr,
    /// Address of the HTTP dashboard, no dashboard if not set
    #[serde(default)]
    pub dashboard_address: Option<SocketAddr>,
    /// Number of workers running inside the head process
    #[serde(default)]
    pub local_workers: u16,
    /// How many times a task is resent after losing its worker
    #[serde(default = "default_max_task_retries")]
    pub max_task_retries: u32,
    /// Time to wait for a registering worker to answer
    #[serde(default = "default_worker_connect_timeout_millis")]
    pub worker_connect_timeout_millis: NonZeroU64,
    /// Time a task may run on a remote worker
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: NonZeroU64,
}

fn default_max_task_retries() -> u32 {
    3
}

fn default_worker_connect_timeout_millis() -> NonZeroU64 {
    NonZeroU64::MIN.saturating_add(4999)
}

fn default_task_timeout_secs() -> NonZeroU64 {
    NonZeroU64::MIN.saturating_add(599)
}

/// A running head node. Dropping it stops the node.
pub struct HeadHandle {
    rpc_address: SocketAddr,
    dashboard_address: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl HeadHandle {
    /// Address the RPC server is bound to.
    pub fn rpc_address(&self) -> SocketAddr {
        self.rpc_address
    }

    /// Address for clients to pass to `Client::init`.
    pub fn head_address(&self) -> HeadAddress {
        self.rpc_address.into()
    }

    pub fn dashboard_address(&self) -> Option<SocketAddr> {
        self.dashboard_address
    }

    /// Run until the RPC server or the dashboard stops.
    pub async fn wait(mut self) -> Result<()> {
        for task in std::mem::take(&mut self.tasks) {
            task.await.map_err(OrcaError::fail_to_start_server)?;
        }
        Ok(())
    }
}

impl Drop for HeadHandle {
    fn drop(&mut self) {
        self.tasks.iter().for_each(JoinHandle::abort);
    }
}

/// This is the only entry for users to get a head node.
/// Local workers run the functions in `registry`.
pub async fn start_head(config: HeadConfig, registry: FunctionRegistry) -> Result<HeadHandle> {
    let scheduler = Scheduler::new(config.max_task_retries);
    let registry = Arc::new(registry);
    for _ in 0..config.local_workers {
        scheduler.add_worker(Worker::Local(LocalWorker::new(registry.clone())));
    }

    let server = HeadServer::new(
        scheduler.clone(),
        Duration::from_millis(config.worker_connect_timeout_millis.get()),
        Duration::from_secs(config.task_timeout_secs.get()),
    );
    let (rpc_address, rpc_task) = serve_rpc(config.rpc_address, server).await?;
    let mut tasks = vec![rpc_task];

    let dashboard_address = match config.dashboard_address {
        None => None,
        Some(address) => {
            let listener = TcpListener::bind(address)
                .await
                .map_err(OrcaError::fail_to_start_server)?;
            let address = listener
                .local_addr()
                .map_err(OrcaError::fail_to_start_server)?;
            info!("Orca dashboard is listening on {}", address);
            let app = dashboard::get_dashboard(scheduler);
            tasks.push(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    error!("Dashboard stopped: {}", e);
                }
            }));
            Some(address)
        }
    };

    Ok(HeadHandle {
        rpc_address,
        dashboard_address,
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use ::orca_common::{
        anyhow::Result,
        serde_json::{from_value, json},
    };

    use super::*;

    #[test]
    fn missing_field_rpc_address() {
        let config = json!(
            {
                "local_workers": 2
            }
        );
        let result = from_value::<HeadConfig>(config);
        assert_eq!(
            result.unwrap_err().to_string(),
            "missing field `rpc_address`"
        );
    }

    #[test]
    fn deny_unknown_fields() {
        let config = json!(
            {
                "rpc_address": "0.0.0.0:10001",
                "unknown_field": "unknown"
            }
        );
        let result = from_value::<HeadConfig>(config);
        assert_eq!(
            result.unwrap_err().to_string(),
            "unknown field `unknown_field`, expected one of `rpc_address`, `dashboard_address`, `local_workers`, `max_task_retries`, `worker_connect_timeout_millis`, `task_timeout_secs`"
        );
    }

    #[test]
    fn deserialize_head_config_with_defaults() -> Result<()> {
        let config = json!(
            {
                "rpc_address": "0.0.0.0:10001"
            }
        );
        let result = from_value::<HeadConfig>(config)?;
        assert_eq!(
            result,
            HeadConfig {
                rpc_address: "0.0.0.0:10001".parse()?,
                dashboard_address: None,
                local_workers: 0,
                max_task_retries: 3,
                worker_connect_timeout_millis: NonZeroU64::new(5000).unwrap(),
                task_timeout_secs: NonZeroU64::new(600).unwrap(),
            }
        );
        Ok(())
    }

    #[test]
    fn deserialize_head_config() -> Result<()> {
        let config = json!(
            {
                "rpc_address": "127.0.0.1:10001",
                "dashboard_address": "127.0.0.1:8265",
                "local_workers": 4,
                "max_task_retries": 0,
                "worker_connect_timeout_millis": 1000,
                "task_timeout_secs": 30
            }
        );
        let result = from_value::<HeadConfig>(config)?;
        assert_eq!(
            result,
            HeadConfig {
                rpc_address: "127.0.0.1:10001".parse()?,
                dashboard_address: Some("127.0.0.1:8265".parse()?),
                local_workers: 4,
                max_task_retries: 0,
                worker_connect_timeout_millis: NonZeroU64::new(1000).unwrap(),
                task_timeout_secs: NonZeroU64::new(30).unwrap(),
            }
        );
        Ok(())
    }

    #[test]
    fn task_timeout_cannot_be_zero() {
        let config = json!(
            {
                "rpc_address": "127.0.0.1:10001",
                "task_timeout_secs": 0
            }
        );
        let result = from_value::<HeadConfig>(config);
        assert!(result.is_err());
    }
}
