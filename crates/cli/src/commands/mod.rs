pub mod sql;
pub mod transfer;

pub use sql::{handle_sql, SqlArgs};
pub use transfer::{handle_transfer, TransferArgs};
