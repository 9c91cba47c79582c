use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] cta_events_kafka::Error),

    #[error(transparent)]
    Types(#[from] cta_types::TypesError),

    #[error("Changelog recovery for table '{table}' did not finish within {timeout:?}")]
    RecoveryTimeout { table: String, timeout: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
