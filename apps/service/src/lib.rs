pub mod config;
pub mod database;
pub mod monitoring;
pub mod pool;
pub mod retention;
pub mod runtime;

pub use config::{Config, ConfigError};
pub use database::{LogStore, SqliteLogStore, StoreError};
pub use runtime::Monitoring;
