//! Database connection management

use schoolwatch_core::{ServiceError, ServiceResult};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;

pub type DbConnection = DatabaseConnection;

/// Establish the process-wide connection pool.
///
/// Called once at startup; the returned handle is shared by every request
/// for the life of the process. The `mne` schema and its stored procedure
/// are owned by the database server, so no migrations run here.
pub async fn establish_connection(database_url: &str) -> ServiceResult<Arc<DbConnection>> {
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(100).min_connections(5);

    let db = Database::connect(opt)
        .await
        .map_err(|e| ServiceError::Database(e.to_string()))?;

    Ok(Arc::new(db))
}
