//! Streaming-SQL table registration.
//!
//! The turnstile summary is computed by the streaming-SQL server, not by this
//! workspace. [`QueryRegistrar`] submits the program that defines it once,
//! skipping the submission when the summary table already exists.

pub mod error;
pub mod registrar;
pub mod statements;

pub use error::{QueryRegistrationError, Result};
pub use registrar::{KsqlArgs, QueryRegistrar, Registration, KSQL_CONTENT_TYPE};
pub use statements::{turnstile_summary, TURNSTILE_SUMMARY_TABLE, TURNSTILE_TABLE};
