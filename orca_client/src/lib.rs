//! Client of an Orca cluster.
//!
//! ```no_run
//! use orca_client::Client;
//! use orca_common::function::builtin::Square;
//!
//! # async fn run() -> orca_common::error::Result<()> {
//! let client = Client::init("orca://localhost:10001").await?;
//! let square = client.remote::<Square>();
//! let mut refs = vec![];
//! for x in 0..10 {
//!     refs.push(square.remote(&x).await?);
//! }
//! let results = client.get(&refs).await?;
//! assert_eq!(results, vec![0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
//! # Ok(())
//! # }
//! ```

use ::std::{marker::PhantomData, time::Duration};

use ::orca_common::{
    address::HeadAddress,
    anyhow::anyhow,
    error::{OrcaError, Result},
    function::RemoteFunction,
    rpc::{connect_head_address, context_with_timeout, HeadServiceClient},
    serde::{de::DeserializeOwned, Deserialize},
    serde_json,
    task::{ClusterInfo, TaskId},
    tracing::debug,
};

pub mod smoke;

/// Timeouts of the client.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(crate = "orca_common::serde")]
pub struct ClientConfig {
    /// Time to wait for the head node to accept the connection
    #[serde(default = "default_connect_timeout_millis")]
    pub connect_timeout_millis: u64,
    /// Time to wait for the results in [Client::get]
    #[serde(default = "default_get_timeout_millis")]
    pub get_timeout_millis: u64,
}

fn default_connect_timeout_millis() -> u64 {
    5_000
}

fn default_get_timeout_millis() -> u64 {
    60_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_millis: default_connect_timeout_millis(),
            get_timeout_millis: default_get_timeout_millis(),
        }
    }
}

impl ClientConfig {
    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_millis)
    }

    fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_millis)
    }
}

/// Reference to the output of a submitted task. Pass it to [Client::get] to fetch the output.
#[derive(Debug)]
pub struct ObjectRef<T> {
    id: TaskId,
    output: PhantomData<fn() -> T>,
}

impl<T> ObjectRef<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ObjectRef<T> {}

/// Connection to an Orca head node.
#[derive(Clone)]
pub struct Client {
    address: HeadAddress,
    head: HeadServiceClient,
    config: ClientConfig,
}

impl Client {
    /// Connect to the head node at `address`, e.g. `orca://localhost:10001`, with the default timeouts.
    pub async fn init(address: &str) -> Result<Self> {
        Self::init_with_config(address, ClientConfig::default()).await
    }

    pub async fn init_with_config(address: &str, config: ClientConfig) -> Result<Self> {
        let address: HeadAddress = address.parse()?;
        let head = connect_head_address(&address, config.connect_timeout()).await?;
        debug!("Connected to Orca head node {}", address);
        Ok(Self {
            address,
            head,
            config,
        })
    }

    pub fn address(&self) -> &HeadAddress {
        &self.address
    }

    /// Get the handle to call `F` remotely.
    pub fn remote<F: RemoteFunction>(&self) -> RemoteHandle<'_, F> {
        RemoteHandle {
            client: self,
            function: PhantomData,
        }
    }

    /// Wait for the outputs of the tasks.
    /// The `i`-th output belongs to `refs[i]`. The first failed task fails the whole call.
    pub async fn get<T: DeserializeOwned>(&self, refs: &[ObjectRef<T>]) -> Result<Vec<T>> {
        let ids = refs.iter().map(ObjectRef::id).collect::<Vec<_>>();
        let timeout = self.config.get_timeout();
        let results = self.head.get(context_with_timeout(timeout), ids).await?;
        if results.len() != refs.len() {
            return Err(OrcaError::rpc_failed(anyhow!(
                "Asked for {} results but got {}.",
                refs.len(),
                results.len()
            )));
        }
        results
            .into_iter()
            .map(|result| -> Result<T> { Ok(serde_json::from_value(result?)?) })
            .collect()
    }

    /// Release the outputs of the tasks on the head node. They cannot be fetched afterwards.
    pub async fn free<T>(&self, refs: &[ObjectRef<T>]) -> Result<()> {
        let ids = refs.iter().map(ObjectRef::id).collect::<Vec<_>>();
        self.head
            .free(context_with_timeout(self.config.connect_timeout()), ids)
            .await?;
        Ok(())
    }

    pub async fn cluster_info(&self) -> Result<ClusterInfo> {
        Ok(self
            .head
            .cluster_info(context_with_timeout(self.config.connect_timeout()))
            .await?)
    }
}

/// Calls `F` on the cluster.
pub struct RemoteHandle<'a, F> {
    client: &'a Client,
    function: PhantomData<F>,
}

impl<F: RemoteFunction> RemoteHandle<'_, F> {
    /// Submit a call of `F` on `input`. Returns as soon as the head node accepted the task.
    pub async fn remote(&self, input: &F::Input) -> Result<ObjectRef<F::Output>> {
        let args = serde_json::to_value(input)?;
        let id = self
            .client
            .head
            .submit(
                context_with_timeout(self.client.config.connect_timeout()),
                F::NAME.to_owned(),
                args,
            )
            .await?;
        debug!("Submitted task {} ({})", id, F::NAME);
        Ok(ObjectRef {
            id,
            output: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::orca_common::serde_json::{from_value, json};

    #[test]
    fn default_client_config() -> orca_common::anyhow::Result<()> {
        let config = from_value::<ClientConfig>(json!({}))?;
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.get_timeout(), Duration::from_secs(60));
        Ok(())
    }

    #[test]
    fn deny_unknown_fields() {
        let result = from_value::<ClientConfig>(json!({"retries": 3}));
        assert_eq!(
            result.unwrap_err().to_string(),
            "unknown field `retries`, expected `connect_timeout_millis` or `get_timeout_millis`"
        );
    }

    #[tokio::test]
    async fn invalid_address() {
        let result = Client::init("http://localhost:10001").await;
        assert!(result.is_err_and(|e| e
            .to_string()
            .starts_with("Not allowed: Unsupported scheme \"http\"")));
    }
}
