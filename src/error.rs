//! Usage errors raised by the sweeper API.
//!
//! These are programming errors of the embedding application. Problems found
//! inside an observed tree are never errors: they are recorded as
//! [`Issue`](crate::issues::Issue)s.

use thiserror::Error;

use crate::issues::IssueKind;

/// Errors that can occur when configuring a sweeper.
#[derive(Error, Debug)]
pub enum SweeperError {
    #[error("unknown issue kind: {0}")]
    UnknownIssueKind(String),

    #[error("{kind} is a {family} check and does not accept reactive = {reactive}")]
    IllegalOption {
        kind: IssueKind,
        family: &'static str,
        reactive: bool,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] config::ConfigError),
}

/// Result type for sweeper configuration operations
pub type SweeperResult<T> = Result<T, SweeperError>;
