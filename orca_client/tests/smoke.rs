use ::std::{
    num::NonZeroU64,
    time::{Duration, Instant},
};

use ::orca_client::{smoke::square_numbers, Client, ClientConfig};
use ::orca_common::{
    error::{OrcaErrorType, Result},
    function::{
        builtin::{builtin_registry, Square},
        FunctionRegistry,
    },
    remote_function,
    rpc::{connect_head, context_with_timeout},
    task::{TaskError, TaskId},
};
use ::orca_worker::{start_worker, WorkerConfig};

mod common;
use common::start_test_head;

const SQUARES: [i64; 10] = [0, 1, 4, 9, 16, 25, 36, 49, 64, 81];

remote_function! {
    struct Divide("divide");
    fn(pair: (i64, i64)) -> i64 { pair.0 / pair.1 }
}

#[tokio::test]
async fn square_on_local_workers() -> Result<()> {
    let head = start_test_head(2, builtin_registry()).await?;
    let client = Client::init(&head.head_address().to_string()).await?;

    let results = square_numbers(&client, 0..10).await?;

    assert_eq!(results, SQUARES);
    Ok(())
}

#[tokio::test]
async fn rerun_gives_the_same_output() -> Result<()> {
    let head = start_test_head(3, builtin_registry()).await?;
    let address = head.head_address().to_string();

    let first = square_numbers(&Client::init(&address).await?, 0..10).await?;
    let second = square_numbers(&Client::init(&address).await?, 0..10).await?;

    assert_eq!(first, SQUARES);
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn square_on_remote_worker() -> Result<()> {
    let head = start_test_head(0, FunctionRegistry::new()).await?;
    let worker = start_worker(
        WorkerConfig {
            head_address: head.head_address(),
            rpc_address: "127.0.0.1:0".parse().unwrap(),
            advertise_address: None,
            connect_timeout_millis: NonZeroU64::new(2_000).unwrap(),
        },
        builtin_registry(),
    )
    .await?;
    let client = Client::init(&head.head_address().to_string()).await?;

    let results = square_numbers(&client, 0..10).await?;
    assert_eq!(results, SQUARES);

    let info = client.cluster_info().await?;
    assert_eq!(info.workers.len(), 1);
    assert_eq!(info.workers[0].id, worker.id());
    assert_eq!(info.workers[0].address, Some(worker.rpc_address()));
    assert_eq!(info.tasks_finished, 10);
    Ok(())
}

#[tokio::test]
async fn unreachable_endpoint_fails_fast() -> Result<()> {
    // bind then drop to get a port nobody listens on
    let address = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let config = ClientConfig {
        connect_timeout_millis: 2_000,
        get_timeout_millis: 2_000,
    };

    let start = Instant::now();
    let result = Client::init_with_config(&format!("orca://{}", address), config).await;

    assert!(result.is_err_and(|e| e.get_error_type() == OrcaErrorType::FailToConnect));
    assert!(start.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn get_does_not_hang_without_workers() -> Result<()> {
    let head = start_test_head(0, builtin_registry()).await?;
    let config = ClientConfig {
        connect_timeout_millis: 2_000,
        get_timeout_millis: 200,
    };
    let client = Client::init_with_config(&head.head_address().to_string(), config).await?;

    let object = client.remote::<Square>().remote(&3).await?;
    let result = client.get(&[object]).await;

    assert!(result.is_err_and(|e| e.get_error_type() == OrcaErrorType::Timeout));
    Ok(())
}

#[tokio::test]
async fn failed_task_surfaces_as_error() -> Result<()> {
    let registry = builtin_registry().register::<Divide>();
    let head = start_test_head(1, registry).await?;
    let client = Client::init(&head.head_address().to_string()).await?;
    let divide = client.remote::<Divide>();

    let ok = divide.remote(&(84, 2)).await?;
    let failed = divide.remote(&(1, 0)).await?;
    assert_eq!(client.get(&[ok]).await?, vec![42]);
    let result = client.get(&[ok, failed]).await;

    assert!(result.is_err_and(|e| e.get_error_type() == OrcaErrorType::TaskFailed
        && e.to_string().starts_with("Task failed: Task panicked:")));
    Ok(())
}

#[tokio::test]
async fn freed_results_are_gone() -> Result<()> {
    let head = start_test_head(1, builtin_registry()).await?;
    let client = Client::init(&head.head_address().to_string()).await?;
    let object = client.remote::<Square>().remote(&9).await?;
    assert_eq!(client.get(&[object]).await?, vec![81]);

    client.free(&[object]).await?;
    let result = client.get(&[object]).await;

    assert!(result.is_err_and(|e| e.get_error_type() == OrcaErrorType::NotFound));
    Ok(())
}

#[tokio::test]
async fn failed_run_frees_its_tasks() -> Result<()> {
    let head = start_test_head(0, FunctionRegistry::new()).await?;
    let config = ClientConfig {
        connect_timeout_millis: 2_000,
        get_timeout_millis: 200,
    };
    let client = Client::init_with_config(&head.head_address().to_string(), config).await?;

    let result = square_numbers(&client, 0..10).await;
    assert!(result.is_err_and(|e| e.get_error_type() == OrcaErrorType::Timeout));

    // the freed tasks must not run once a worker shows up
    let _worker = start_worker(
        WorkerConfig {
            head_address: head.head_address(),
            rpc_address: "127.0.0.1:0".parse().unwrap(),
            advertise_address: None,
            connect_timeout_millis: NonZeroU64::new(2_000).unwrap(),
        },
        builtin_registry(),
    )
    .await?;
    let timeout = Duration::from_secs(2);
    let head_client = connect_head(head.rpc_address(), timeout).await?;
    let ids = (0..10).map(TaskId::new).collect::<Vec<_>>();
    let results = head_client
        .get(context_with_timeout(timeout), ids.clone())
        .await?;

    assert_eq!(
        results,
        ids.into_iter()
            .map(|id| Err(TaskError::NotFound(id)))
            .collect::<Vec<_>>()
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    let info = client.cluster_info().await?;
    assert_eq!(info.tasks_submitted, 10);
    assert_eq!(info.tasks_finished, 0);
    Ok(())
}
