//! Remote functions and the registry workers use to run them.
//!
//! A function is marked as remote by implementing [RemoteFunction], usually through
//! the [remote_function!](crate::remote_function) macro. Clients only need the type to submit it,
//! workers need it in their [FunctionRegistry] to execute it.

use ::std::{
    any::Any,
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
};

use ::serde::{de::DeserializeOwned, Serialize};

use crate::task::{FunctionName, TaskError, TaskResult};

/// A function that can be executed on an Orca worker.
pub trait RemoteFunction: 'static {
    /// Name the function is registered under. It must be unique in a cluster.
    const NAME: &'static str;
    type Input: Serialize + DeserializeOwned + Send + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    fn call(input: Self::Input) -> Self::Output;
}

/// Declare a unit struct implementing [RemoteFunction].
///
/// ```
/// orca_common::remote_function! {
///     /// Negate an integer.
///     pub struct Negate("negate");
///     fn(x: i64) -> i64 { -x }
/// }
/// ```
#[macro_export]
macro_rules! remote_function {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident($fn_name:literal);
        fn($arg:ident: $input:ty) -> $output:ty $body:block
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        impl $crate::function::RemoteFunction for $name {
            const NAME: &'static str = $fn_name;
            type Input = $input;
            type Output = $output;

            fn call($arg: Self::Input) -> Self::Output $body
        }
    };
}

type Invoker = fn(serde_json::Value) -> TaskResult;

/// Remote functions known by a worker, looked up by name.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<&'static str, Invoker>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `F`. A function registered twice under the same name is overwritten.
    pub fn register<F: RemoteFunction>(mut self) -> Self {
        self.functions.insert(F::NAME, invoke_typed::<F>);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Sorted names of all registered functions.
    pub fn names(&self) -> Vec<FunctionName> {
        let mut names = self
            .functions
            .keys()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Run the function `name` on `args` in the current thread.
    /// A panic in the function is caught and returned as [TaskError::Panicked].
    pub fn invoke(&self, name: &str, args: serde_json::Value) -> TaskResult {
        let invoker = self
            .functions
            .get(name)
            .ok_or_else(|| TaskError::FunctionNotFound(name.to_owned()))?;
        invoker(args)
    }
}

fn invoke_typed<F: RemoteFunction>(args: serde_json::Value) -> TaskResult {
    let input: F::Input =
        serde_json::from_value(args).map_err(|e| TaskError::InvalidArgument(e.to_string()))?;
    let output = panic::catch_unwind(AssertUnwindSafe(move || F::call(input)))
        .map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())))?;
    serde_json::to_value(output).map_err(|e| TaskError::InvalidOutput(e.to_string()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Functions every Orca worker ships with.
pub mod builtin {
    use super::FunctionRegistry;

    crate::remote_function! {
        /// Square of an integer. This is what the deployment smoke test runs.
        /// Fails the task if the square does not fit in an `i64`.
        pub struct Square("square");
        fn(x: i64) -> i64 {
            match x.checked_mul(x) {
                Some(square) => square,
                None => panic!("Square of {} overflows i64", x),
            }
        }
    }

    crate::remote_function! {
        /// Echo the input back, handy for checking a worker is alive.
        pub struct Echo("echo");
        fn(value: serde_json::Value) -> serde_json::Value { value }
    }

    pub fn builtin_registry() -> FunctionRegistry {
        FunctionRegistry::new().register::<Square>().register::<Echo>()
    }
}
