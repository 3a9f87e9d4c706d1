use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Database: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                user_id     INTEGER PRIMARY KEY AUTOINCREMENT,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE resources (
                resource_id     INTEGER PRIMARY KEY AUTOINCREMENT,
                type            TEXT NOT NULL,
                resource_path   TEXT NOT NULL UNIQUE,
                upload_date     TEXT NOT NULL,
                user_id         INTEGER NOT NULL REFERENCES users(user_id),
                public          INTEGER NOT NULL
            );

            CREATE TABLE access (
                access_id   INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(user_id),
                file_id     INTEGER NOT NULL REFERENCES resources(resource_id) ON DELETE CASCADE,
                UNIQUE(user_id, file_id)
            );

            CREATE INDEX idx_resources_owner ON resources(user_id);
            CREATE INDEX idx_access_user ON access(user_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
