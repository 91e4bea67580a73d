pub mod connections;
pub mod spark_sql;
pub mod transfer;

pub use connections::{ConnectionError, ConnectionFactory, ProfileConnections};
pub use spark_sql::{SparkSqlError, SparkSqlTask};
pub use transfer::coercion::CoercionTable;
pub use transfer::{BatchTableTransfer, TransferError, TransferReport, UnitReport};
