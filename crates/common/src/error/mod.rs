pub mod diagnostics;

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Top-level error surfaced by the `fmc` binary.
#[derive(Debug)]
pub enum FmcError {
    Config(Box<dyn Error + Send + Sync>), // connections / job files
    Transfer(Box<dyn Error + Send + Sync>),
    SparkSql(Box<dyn Error + Send + Sync>),
}

impl Display for FmcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FmcError::Config(e)   => write!(f, "configuration failed: {e}"),
            FmcError::Transfer(e) => write!(f, "transfer failed: {e}"),
            FmcError::SparkSql(e) => write!(f, "spark sql failed: {e}"),
        }
    }
}

impl Error for FmcError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FmcError::Config(e)   => Some(&**e),
            FmcError::Transfer(e) => Some(&**e),
            FmcError::SparkSql(e) => Some(&**e),
        }
    }
}
