// Error Types
// Configuration errors are fatal to instance setup; invalid calls are reported to the caller

use std::io;
use thiserror::Error;

/// Errors that reject a whole configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration")]
    Missing,

    #[error("No card or row or element defined")]
    NoSection,

    #[error("No card type defined")]
    NoCardType,

    #[error("No element type defined")]
    NoElementType,

    #[error("No entities defined")]
    NoEntities,

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Calls made out of order
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("dynamic variables cannot be built before static variables have settled")]
    StaticPending,
}
