// Persistence abstraction for the Postgres and in-memory backends

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    ItemModel, LogEntry, Member, NewItem, NewLogEntry, NewMember, OrganizationModel, Role,
};

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Offset pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(skip: i64, limit: i64) -> Self {
        let limit = if limit <= 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            limit.min(MAX_PAGE_LIMIT)
        };
        Self {
            skip: skip.max(0),
            limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_LIMIT)
    }
}

/// Row filter for member listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberFilter {
    Id(Uuid),
    RoleIs(Role),
    RoleIsNot(Role),
}

impl MemberFilter {
    pub fn matches(&self, member: &Member) -> bool {
        match self {
            MemberFilter::Id(id) => member.id == *id,
            MemberFilter::RoleIs(role) => member.role == *role,
            MemberFilter::RoleIsNot(role) => member.role != *role,
        }
    }
}

/// Entry point of the persistence collaborator.
#[tonic::async_trait]
pub trait Store: Send + Sync {
    /// Starts a unit of work. Dropping the transaction without `commit` rolls it back.
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    /// Cheap reachability check for health reporting.
    async fn ping(&self) -> AppResult<()>;
}

/// One transaction over the four collections.
///
/// `lock_*` reads take a row lock in backends that support it, so a
/// read-check-mutate sequence cannot interleave with a concurrent one.
#[tonic::async_trait]
pub trait StoreTx: Send {
    async fn member_by_id(&mut self, id: Uuid) -> AppResult<Option<Member>>;
    async fn lock_member(&mut self, id: Uuid) -> AppResult<Option<Member>>;
    async fn member_by_email(&mut self, email: &str) -> AppResult<Option<Member>>;
    async fn member_by_role(&mut self, role: Role) -> AppResult<Option<Member>>;
    async fn list_members(&mut self, filter: MemberFilter, page: Page) -> AppResult<Vec<Member>>;
    async fn insert_member(&mut self, member: NewMember) -> AppResult<Member>;
    /// Writes every mutable column of `member`; `updated_at` is set by the store.
    async fn update_member(&mut self, member: &Member) -> AppResult<Member>;
    /// Removes the member together with its items and the log entries it authored.
    async fn delete_member(&mut self, id: Uuid) -> AppResult<bool>;

    async fn item_by_id(&mut self, id: Uuid, owner: Option<Uuid>) -> AppResult<Option<ItemModel>>;
    async fn lock_item(&mut self, id: Uuid, owner: Option<Uuid>) -> AppResult<Option<ItemModel>>;
    async fn list_items(&mut self, owner: Option<Uuid>, page: Page) -> AppResult<Vec<ItemModel>>;
    async fn insert_item(&mut self, item: NewItem) -> AppResult<ItemModel>;
    async fn update_item(&mut self, item: &ItemModel) -> AppResult<ItemModel>;
    async fn delete_item(&mut self, id: Uuid) -> AppResult<bool>;

    async fn insert_log(&mut self, entry: NewLogEntry) -> AppResult<LogEntry>;
    /// Insertion order.
    async fn list_logs(&mut self, page: Page) -> AppResult<Vec<LogEntry>>;

    async fn organization(&mut self) -> AppResult<Option<OrganizationModel>>;
    async fn lock_organization(&mut self) -> AppResult<Option<OrganizationModel>>;
    async fn insert_organization(&mut self, name: &str, is_active: bool)
        -> AppResult<OrganizationModel>;
    async fn update_organization(
        &mut self,
        organization: &OrganizationModel,
    ) -> AppResult<OrganizationModel>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamping() {
        assert_eq!(Page::new(0, 0), Page { skip: 0, limit: DEFAULT_PAGE_LIMIT });
        assert_eq!(Page::new(-3, -1), Page { skip: 0, limit: DEFAULT_PAGE_LIMIT });
        assert_eq!(Page::new(20, 5), Page { skip: 20, limit: 5 });
        assert_eq!(Page::new(0, 10_000), Page { skip: 0, limit: MAX_PAGE_LIMIT });
        assert_eq!(Page::default(), Page { skip: 0, limit: 10 });
    }
}
