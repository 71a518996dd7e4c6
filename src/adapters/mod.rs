// Adapters layer: concrete implementations for external systems (query files, AMC, Snowflake).

pub mod amc;
pub mod snowflake;
pub mod storage;

pub use amc::{AmcAuthClient, AmcExtractor};
pub use snowflake::{SnowflakeConnector, SnowflakeSession};
pub use storage::LocalStorage;
