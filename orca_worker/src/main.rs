use ::orca_common::{
    config::{load_config, Args},
    error::Result,
    function::builtin::builtin_registry,
    tracing::info,
    tracing_subscriber,
};
use ::orca_worker::{start_worker, WorkerConfig};

#[tokio::main]
/// Start Orca worker
async fn main() -> Result<()> {
    // setup tracing
    tracing_subscriber::fmt::init();

    let Args { config_path } = Args::parse_args();
    let config: WorkerConfig = load_config(&config_path)?;
    info!("Start Orca worker with config {:?}", config);

    let worker = start_worker(config, builtin_registry()).await?;
    worker.wait().await
}
