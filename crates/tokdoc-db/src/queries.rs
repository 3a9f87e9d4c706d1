use crate::Database;
use crate::models::{NewResource, ResourceRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

const RESOURCE_COLUMNS: &str = "resource_id, type, resource_path, upload_date, user_id, public";

impl Database {
    // -- Users --

    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (email, password) VALUES (?1, ?2)",
                (email, password_hash),
            )?;
            query_user_by_email(conn, email)?
                .ok_or_else(|| anyhow::anyhow!("User vanished after insert: {}", email))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    // -- Resources --

    pub fn get_resource_by_path(&self, path: &str) -> Result<Option<ResourceRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE resource_path = ?1");
            let row = conn.query_row(&sql, [path], resource_from_row).optional()?;
            Ok(row)
        })
    }

    /// Resources visible to a user: public ones, their own, and ones shared
    /// with them. With no user, only public resources.
    pub fn get_accessible_resources(&self, user_id: Option<i64>) -> Result<Vec<ResourceRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RESOURCE_COLUMNS} FROM resources
                 WHERE public = 1
                    OR user_id = ?1
                    OR resource_id IN (SELECT file_id FROM access WHERE user_id = ?1)
                 ORDER BY resource_path"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], resource_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn has_access(&self, user_id: i64, resource_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT access_id FROM access WHERE user_id = ?1 AND file_id = ?2",
                    [user_id, resource_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Insert or replace a resource and its access grants in one transaction.
    ///
    /// Only the owner may replace an existing resource: when `resource_path`
    /// belongs to another user nothing changes and `None` is returned.
    /// Replacing keeps the row id; previous grants are dropped.
    pub fn save_resource(
        &self,
        resource: &NewResource,
        grants: &[i64],
    ) -> Result<Option<ResourceRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "INSERT INTO resources (type, resource_path, upload_date, user_id, public)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(resource_path) DO UPDATE SET
                    type = excluded.type,
                    upload_date = excluded.upload_date,
                    public = excluded.public
                 WHERE resources.user_id = excluded.user_id",
                params![
                    &resource.kind,
                    &resource.resource_path,
                    resource.upload_date.to_rfc3339(),
                    resource.user_id,
                    resource.public,
                ],
            )?;
            if changed == 0 {
                // Owned by someone else; dropping tx rolls back
                return Ok(None);
            }

            let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE resource_path = ?1");
            let row = tx.query_row(&sql, [&resource.resource_path], resource_from_row)?;

            tx.execute("DELETE FROM access WHERE file_id = ?1", [row.resource_id])?;
            for user_id in grants {
                tx.execute(
                    "INSERT OR IGNORE INTO access (user_id, file_id) VALUES (?1, ?2)",
                    [*user_id, row.resource_id],
                )?;
            }

            tx.commit()?;
            Ok(Some(row))
        })
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT user_id, email, password, created_at FROM users WHERE email = ?1")?;

    let row = stmt
        .query_row([email], |row| {
            Ok(UserRow {
                user_id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<ResourceRow> {
    Ok(ResourceRow {
        resource_id: row.get(0)?,
        kind: row.get(1)?,
        resource_path: row.get(2)?,
        upload_date: row.get(3)?,
        user_id: row.get(4)?,
        public: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
