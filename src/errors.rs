// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for orchestration operations

use thiserror::Error;

use crate::api::ApiError;
use crate::compiler::CompileError;
use crate::domain::ConfigError;
use crate::infra::InfraError;
use crate::retry::RetryError;
use crate::state_machine::TransitionError;

/// Errors that can occur while launching or driving a topology
#[derive(Debug, Error)]
pub enum SprawlError {
    /// Topology failed to compile or recompile
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Config lookup or loading failed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Control-plane call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Infra generation or provisioning failed
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// Generator phase rejected the requested step
    #[error("generator phase: {0}")]
    Phase(#[from] TransitionError),

    /// Unrecoverable invariant violation observed at runtime
    #[error("fatal: {0}")]
    Fatal(String),

    /// Referenced cluster, node, or workload does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A bounded wait ran out of attempts
    #[error("{operation} did not succeed after {attempts} attempts: {last}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last: String,
    },

    /// Error annotated with the operation that produced it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<SprawlError>,
    },
}

/// Result type for orchestration operations
pub type SprawlResult<T> = Result<T, SprawlError>;

impl SprawlError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        SprawlError::Fatal(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        SprawlError::NotFound(what.into())
    }

    /// Innermost error of a context chain
    pub fn root(&self) -> &SprawlError {
        match self {
            SprawlError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

impl<E> From<RetryError<E>> for SprawlError
where
    E: Into<SprawlError>,
{
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Aborted(inner) => inner.into(),
            RetryError::Exhausted {
                operation,
                attempts,
                last,
            } => SprawlError::RetryExhausted {
                operation,
                attempts,
                last,
            },
        }
    }
}

/// Attach operation context to errors as they unwind
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> SprawlResult<T>;

    fn with_context<C, F>(self, f: F) -> SprawlResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<SprawlError>,
{
    fn context(self, context: impl Into<String>) -> SprawlResult<T> {
        self.map_err(|err| SprawlError::Context {
            context: context.into(),
            source: Box::new(err.into()),
        })
    }

    fn with_context<C, F>(self, f: F) -> SprawlResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|err| SprawlError::Context {
            context: f().into(),
            source: Box::new(err.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_message() {
        let res: SprawlResult<()> = Err(SprawlError::fatal("two gateways"));
        let err = res
            .context("waiting for mesh gateways")
            .context("cluster \"dc1\"")
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "cluster \"dc1\": waiting for mesh gateways: fatal: two gateways"
        );
        assert!(matches!(err.root(), SprawlError::Fatal(_)));
    }

    #[test]
    fn test_retry_exhausted_converts() {
        let err: SprawlError = RetryError::<SprawlError>::Exhausted {
            operation: "leader transfer".into(),
            attempts: 20,
            last: "leader unchanged".into(),
        }
        .into();
        assert!(matches!(err, SprawlError::RetryExhausted { attempts: 20, .. }));
    }
}
