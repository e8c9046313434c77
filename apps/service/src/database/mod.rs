/// Database abstraction layer
///
/// The probe log lives in a local SQLite file driven through libsql. The
/// monitor loop writes to it and the HTTP API reads from it, both through
/// the `LogStore` trait.
pub mod error;
pub mod migrations;
pub mod repository;

pub use error::StoreError;
pub use repository::{LogStore, SqliteLogStore};

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<(), StoreError> {
    migrations::run_migrations(conn).await
}
