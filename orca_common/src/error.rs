use ::core::fmt::Display;

use ::anyhow::anyhow;

use crate::task::TaskError;

pub type Result<T> = std::result::Result<T, OrcaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrcaErrorType {
    NotFound,
    NotAllowed,
    FailToLoadConfig,
    FailToStartServer,
    FailToConnect,
    FailToRegisterWorker,
    RpcFailed,
    TaskFailed,
    Timeout,
    SerializationFailed,
}

impl Display for OrcaErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            Self::NotFound => "Not found",
            Self::NotAllowed => "Not allowed",
            Self::FailToLoadConfig => "Fail to load config",
            Self::FailToStartServer => "Fail to start server",
            Self::FailToConnect => "Fail to connect",
            Self::FailToRegisterWorker => "Fail to register worker",
            Self::RpcFailed => "RPC failed",
            Self::TaskFailed => "Task failed",
            Self::Timeout => "Timeout",
            Self::SerializationFailed => "Serialization failed",
        };
        write!(f, "{}", description)
    }
}

/// Error of Orca.
/// It carries an [OrcaErrorType] for callers to match on
/// and the underlying cause for humans to read.
#[derive(Debug)]
pub struct OrcaError {
    error_type: OrcaErrorType,
    error: anyhow::Error,
}

macro_rules! define_constructor {
    ($name: ident, $error_type: expr) => {
        pub fn $name<E: Into<anyhow::Error>>(error: E) -> Self {
            Self {
                error_type: $error_type,
                error: error.into(),
            }
        }
    };
}

impl OrcaError {
    define_constructor!(not_found, OrcaErrorType::NotFound);
    define_constructor!(not_allowed, OrcaErrorType::NotAllowed);
    define_constructor!(fail_to_load_config, OrcaErrorType::FailToLoadConfig);
    define_constructor!(fail_to_start_server, OrcaErrorType::FailToStartServer);
    define_constructor!(fail_to_connect, OrcaErrorType::FailToConnect);
    define_constructor!(fail_to_register_worker, OrcaErrorType::FailToRegisterWorker);
    define_constructor!(rpc_failed, OrcaErrorType::RpcFailed);
    define_constructor!(task_failed, OrcaErrorType::TaskFailed);
    define_constructor!(timeout, OrcaErrorType::Timeout);
    define_constructor!(serialization_failed, OrcaErrorType::SerializationFailed);

    pub fn get_error_type(&self) -> OrcaErrorType {
        self.error_type
    }
}

impl Display for OrcaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_type, self.error)
    }
}

impl std::error::Error for OrcaError {}

/// A task that failed on the cluster is reported to the caller as a [OrcaErrorType::TaskFailed],
/// except for asking a task the head has never seen.
impl From<TaskError> for OrcaError {
    fn from(error: TaskError) -> Self {
        match error {
            TaskError::NotFound(_) => Self::not_found(anyhow!(error)),
            _ => Self::task_failed(anyhow!(error)),
        }
    }
}

impl From<tarpc::client::RpcError> for OrcaError {
    fn from(error: tarpc::client::RpcError) -> Self {
        match error {
            tarpc::client::RpcError::DeadlineExceeded => Self::timeout(anyhow!(error)),
            _ => Self::rpc_failed(error),
        }
    }
}

impl From<serde_json::Error> for OrcaError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization_failed(error)
    }
}
