use anyhow::Result;
use tokdoc_db::Database;

pub use tokdoc_db::models::{NewResource, ResourceRow, UserRow};

/// User, resource and access records as the handlers need them.
///
/// Implementations must be safe to share between sessions. Calls block, so
/// the engine runs them on the blocking pool. Each call is atomic;
/// `save_resource` checks ownership and commits the resource and its grants
/// together, returning `None` when the path belongs to another user.
pub trait RecordStore: Send + Sync {
    fn find_user(&self, email: &str) -> Result<Option<UserRow>>;

    fn create_user(&self, email: &str, password_hash: &str) -> Result<UserRow>;

    fn find_resource(&self, path: &str) -> Result<Option<ResourceRow>>;

    /// Public resources plus, for a known user, owned and granted ones.
    fn accessible_resources(&self, user_id: Option<i64>) -> Result<Vec<ResourceRow>>;

    fn has_access(&self, user_id: i64, resource_id: i64) -> Result<bool>;

    fn save_resource(
        &self,
        resource: &NewResource,
        grants: &[i64],
    ) -> Result<Option<ResourceRow>>;
}

impl RecordStore for Database {
    fn find_user(&self, email: &str) -> Result<Option<UserRow>> {
        self.get_user_by_email(email)
    }

    fn create_user(&self, email: &str, password_hash: &str) -> Result<UserRow> {
        Database::create_user(self, email, password_hash)
    }

    fn find_resource(&self, path: &str) -> Result<Option<ResourceRow>> {
        self.get_resource_by_path(path)
    }

    fn accessible_resources(&self, user_id: Option<i64>) -> Result<Vec<ResourceRow>> {
        self.get_accessible_resources(user_id)
    }

    fn has_access(&self, user_id: i64, resource_id: i64) -> Result<bool> {
        Database::has_access(self, user_id, resource_id)
    }

    fn save_resource(
        &self,
        resource: &NewResource,
        grants: &[i64],
    ) -> Result<Option<ResourceRow>> {
        Database::save_resource(self, resource, grants)
    }
}
