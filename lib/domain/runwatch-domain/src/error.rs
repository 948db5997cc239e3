use thiserror::Error;

use crate::category::Category;
use crate::run::RunState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunwatchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid run transition from {from:?} to {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("watch session already started")]
    AlreadyStarted,

    #[error("timed out waiting for {category} watcher to stop")]
    StopTimeout { category: Category },

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),
}
