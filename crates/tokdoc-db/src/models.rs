//! Database row types. These map directly to SQLite rows.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user_id: i64,
    pub email: String,
    /// Argon2 PHC string, never the plaintext.
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRow {
    pub resource_id: i64,
    /// File extension including the dot, or empty.
    pub kind: String,
    pub resource_path: String,
    pub upload_date: String,
    pub user_id: i64,
    pub public: bool,
}

/// A resource about to be written. Uploading over an existing path keeps the
/// original row id and owner.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub kind: String,
    pub resource_path: String,
    pub upload_date: DateTime<Utc>,
    pub user_id: i64,
    pub public: bool,
}
