use ::orca_common::{
    config::{load_config, Args},
    error::Result,
    function::builtin::builtin_registry,
    tracing::info,
    tracing_subscriber,
};
use ::orca_head::{start_head, HeadConfig};

#[tokio::main]
/// Start Orca head node
async fn main() -> Result<()> {
    // setup tracing
    tracing_subscriber::fmt::init();

    let Args { config_path } = Args::parse_args();
    let config: HeadConfig = load_config(&config_path)?;
    info!("Start Orca head node with config {:?}", config);

    let head = start_head(config, builtin_registry()).await?;
    info!("Clients can connect to {}", head.head_address());
    head.wait().await
}
