use ::std::num::NonZeroU64;

use ::orca_common::{error::Result, function::FunctionRegistry};
use ::orca_head::{start_head, HeadConfig, HeadHandle};

/// Start a head node on a free local port with `local_workers` workers in it.
pub async fn start_test_head(local_workers: u16, registry: FunctionRegistry) -> Result<HeadHandle> {
    let config = HeadConfig {
        rpc_address: "127.0.0.1:0".parse().unwrap(),
        dashboard_address: None,
        local_workers,
        max_task_retries: 3,
        worker_connect_timeout_millis: NonZeroU64::new(2_000).unwrap(),
        task_timeout_secs: NonZeroU64::new(30).unwrap(),
    };
    start_head(config, registry).await
}
