use ::clap::Parser;
use ::orca_client::{smoke::square_numbers, Client, ClientConfig};
use ::orca_common::{error::Result, tracing_subscriber};

#[derive(Parser, Debug)]
#[command(version, about = "Check that an Orca cluster runs tasks", long_about = None)]
struct Args {
    /// Address of the head node
    #[arg(long, default_value = "orca://localhost:10001")]
    address: String,
    /// Time to wait for the head node to accept the connection
    #[arg(long, default_value_t = 5_000)]
    connect_timeout_millis: u64,
    /// Time to wait for the results
    #[arg(long, default_value_t = 60_000)]
    get_timeout_millis: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logs go to stderr, stdout only carries the results
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let Args {
        address,
        connect_timeout_millis,
        get_timeout_millis,
    } = Args::parse();
    let config = ClientConfig {
        connect_timeout_millis,
        get_timeout_millis,
    };
    let client = Client::init_with_config(&address, config).await?;
    let results = square_numbers(&client, 0..10).await?;
    println!("{:?}", results);
    Ok(())
}
