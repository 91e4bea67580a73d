pub mod livy;
pub mod polling;

pub use livy::{LivyClient, LivyClientError};
pub use polling::{Backoff, PollingStrategy};
