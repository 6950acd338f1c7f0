use diesel::connection::SimpleConnection;
use diesel::prelude::*;

use parlor_shared::clients::db::{create_pool, ConnectionOptions, DbPool};

const SCHEMA: &str = include_str!("../migrations/2024-03-01-000000_create_messaging/up.sql");

/// Create every table and index that does not exist yet.
pub fn migrate(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(SCHEMA)
}

/// Open the pool and bring the schema up to date on one of its connections.
pub fn init_pool(database_url: &str, max_size: u32) -> anyhow::Result<DbPool> {
    let pool = create_pool(database_url, max_size)?;
    let mut conn = pool.get()?;
    migrate(&mut conn)?;
    tracing::info!(url = %database_url, "database schema ready");
    Ok(pool)
}

/// Fresh private database with the schema applied. Used by tests.
pub fn establish_memory() -> anyhow::Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(":memory:")?;
    ConnectionOptions::default().apply(&mut conn)?;
    migrate(&mut conn)?;
    Ok(conn)
}
