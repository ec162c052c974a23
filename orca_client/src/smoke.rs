//! Deployment smoke test: square a few integers on the cluster.

use ::std::ops::Range;

use ::orca_common::{error::Result, function::builtin::Square, tracing::info};

use crate::Client;

/// Square every number of `numbers` remotely, one task per number.
/// The output keeps the order of `numbers`.
/// The tasks are freed on the head node whether or not they succeeded.
pub async fn square_numbers(client: &Client, numbers: Range<i64>) -> Result<Vec<i64>> {
    let square = client.remote::<Square>();
    let mut refs = Vec::with_capacity(numbers.clone().count());
    for x in numbers {
        refs.push(square.remote(&x).await?);
    }
    info!("Submitted {} tasks to {}", refs.len(), client.address());
    let results = client.get(&refs).await;
    client.free(&refs).await?;
    results
}
