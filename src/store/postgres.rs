use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{MemberFilter, Page, Store, StoreTx};
use crate::error::{AppError, AppResult};
use crate::models::{
    ItemModel, LogEntry, Member, MemberRow, NewItem, NewLogEntry, NewMember, OrganizationModel,
    Role,
};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
}

/// Applies `migrations/` to the connected database.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Migration error: {}", e)))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[tonic::async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

/// Maps unique violations (SQLSTATE 23505) onto the conflict they stand for.
fn map_write_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let message = match db_err.constraint() {
                Some("members_email_key") => "Email already registered",
                Some("members_single_superadmin") => {
                    "There can be at most one superadmin in the organization!"
                }
                Some(c) if c.starts_with("organizations") => "Organization already exists",
                _ => "Duplicate value",
            };
            return AppError::ValidationConflict(message.to_string());
        }
    }
    AppError::Database(err)
}

fn into_member(row: MemberRow) -> AppResult<Member> {
    Member::try_from(row).map_err(|e| AppError::Internal(e.to_string()))
}

fn into_member_opt(row: Option<MemberRow>) -> AppResult<Option<Member>> {
    row.map(into_member).transpose()
}

#[tonic::async_trait]
impl StoreTx for PgTx {
    async fn member_by_id(&mut self, id: Uuid) -> AppResult<Option<Member>> {
        let row: Option<MemberRow> = sqlx::query_as(
            "SELECT id, email, name, surname, role, password_hash, active, suspended_by, \
             last_updated_by, created_at, updated_at \
             FROM members WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        into_member_opt(row)
    }

    async fn lock_member(&mut self, id: Uuid) -> AppResult<Option<Member>> {
        let row: Option<MemberRow> = sqlx::query_as(
            "SELECT id, email, name, surname, role, password_hash, active, suspended_by, \
             last_updated_by, created_at, updated_at \
             FROM members WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        into_member_opt(row)
    }

    async fn member_by_email(&mut self, email: &str) -> AppResult<Option<Member>> {
        let row: Option<MemberRow> = sqlx::query_as(
            "SELECT id, email, name, surname, role, password_hash, active, suspended_by, \
             last_updated_by, created_at, updated_at \
             FROM members WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        into_member_opt(row)
    }

    async fn member_by_role(&mut self, role: Role) -> AppResult<Option<Member>> {
        let row: Option<MemberRow> = sqlx::query_as(
            "SELECT id, email, name, surname, role, password_hash, active, suspended_by, \
             last_updated_by, created_at, updated_at \
             FROM members WHERE role = $1 ORDER BY created_at LIMIT 1",
        )
        .bind(role.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        into_member_opt(row)
    }

    async fn list_members(&mut self, filter: MemberFilter, page: Page) -> AppResult<Vec<Member>> {
        const SELECT: &str = "SELECT id, email, name, surname, role, password_hash, active, \
             suspended_by, last_updated_by, created_at, updated_at FROM members";

        let rows: Vec<MemberRow> = match filter {
            MemberFilter::Id(id) => {
                sqlx::query_as(&format!(
                    "{SELECT} WHERE id = $1 ORDER BY created_at, id OFFSET $2 LIMIT $3"
                ))
                .bind(id)
                .bind(page.skip)
                .bind(page.limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            MemberFilter::RoleIs(role) => {
                sqlx::query_as(&format!(
                    "{SELECT} WHERE role = $1 ORDER BY created_at, id OFFSET $2 LIMIT $3"
                ))
                .bind(role.as_str())
                .bind(page.skip)
                .bind(page.limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            MemberFilter::RoleIsNot(role) => {
                sqlx::query_as(&format!(
                    "{SELECT} WHERE role <> $1 ORDER BY created_at, id OFFSET $2 LIMIT $3"
                ))
                .bind(role.as_str())
                .bind(page.skip)
                .bind(page.limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
        };

        rows.into_iter().map(into_member).collect()
    }

    async fn insert_member(&mut self, member: NewMember) -> AppResult<Member> {
        let row: MemberRow = sqlx::query_as(
            "INSERT INTO members (id, email, name, surname, role, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, email, name, surname, role, password_hash, active, suspended_by, \
             last_updated_by, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&member.email)
        .bind(&member.name)
        .bind(&member.surname)
        .bind(member.role.as_str())
        .bind(&member.password_hash)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        into_member(row)
    }

    async fn update_member(&mut self, member: &Member) -> AppResult<Member> {
        let row: MemberRow = sqlx::query_as(
            "UPDATE members SET email = $1, name = $2, surname = $3, password_hash = $4, \
             active = $5, suspended_by = $6, last_updated_by = $7, updated_at = NOW() \
             WHERE id = $8 \
             RETURNING id, email, name, surname, role, password_hash, active, suspended_by, \
             last_updated_by, created_at, updated_at",
        )
        .bind(&member.email)
        .bind(&member.name)
        .bind(&member.surname)
        .bind(&member.password_hash)
        .bind(member.active)
        .bind(member.suspended_by)
        .bind(member.last_updated_by)
        .bind(member.id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        into_member(row)
    }

    async fn delete_member(&mut self, id: Uuid) -> AppResult<bool> {
        // items and logs follow through ON DELETE CASCADE
        let rows_affected = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(rows_affected > 0)
    }

    async fn item_by_id(&mut self, id: Uuid, owner: Option<Uuid>) -> AppResult<Option<ItemModel>> {
        let item = sqlx::query_as(
            "SELECT id, name, description, price, owner_id, created_at, updated_at \
             FROM items WHERE id = $1 AND ($2::uuid IS NULL OR owner_id = $2)",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(item)
    }

    async fn lock_item(&mut self, id: Uuid, owner: Option<Uuid>) -> AppResult<Option<ItemModel>> {
        let item = sqlx::query_as(
            "SELECT id, name, description, price, owner_id, created_at, updated_at \
             FROM items WHERE id = $1 AND ($2::uuid IS NULL OR owner_id = $2) FOR UPDATE",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(item)
    }

    async fn list_items(&mut self, owner: Option<Uuid>, page: Page) -> AppResult<Vec<ItemModel>> {
        let items = sqlx::query_as(
            "SELECT id, name, description, price, owner_id, created_at, updated_at \
             FROM items WHERE ($1::uuid IS NULL OR owner_id = $1) \
             ORDER BY created_at, id OFFSET $2 LIMIT $3",
        )
        .bind(owner)
        .bind(page.skip)
        .bind(page.limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(items)
    }

    async fn insert_item(&mut self, item: NewItem) -> AppResult<ItemModel> {
        let model = sqlx::query_as(
            "INSERT INTO items (id, name, description, price, owner_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, name, description, price, owner_id, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price)
        .bind(item.owner_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(model)
    }

    async fn update_item(&mut self, item: &ItemModel) -> AppResult<ItemModel> {
        let model = sqlx::query_as(
            "UPDATE items SET name = $1, description = $2, price = $3, updated_at = NOW() \
             WHERE id = $4 \
             RETURNING id, name, description, price, owner_id, created_at, updated_at",
        )
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price)
        .bind(item.id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(model)
    }

    async fn delete_item(&mut self, id: Uuid) -> AppResult<bool> {
        let rows_affected = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(rows_affected > 0)
    }

    async fn insert_log(&mut self, entry: NewLogEntry) -> AppResult<LogEntry> {
        let log = sqlx::query_as(
            "INSERT INTO logs (id, subject_id, subject_email, object_id, action) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, subject_id, subject_email, object_id, action, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(entry.subject_id)
        .bind(&entry.subject_email)
        .bind(entry.object_id)
        .bind(&entry.action)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(log)
    }

    async fn list_logs(&mut self, page: Page) -> AppResult<Vec<LogEntry>> {
        let logs = sqlx::query_as(
            "SELECT id, subject_id, subject_email, object_id, action, created_at \
             FROM logs ORDER BY seq OFFSET $1 LIMIT $2",
        )
        .bind(page.skip)
        .bind(page.limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(logs)
    }

    async fn organization(&mut self) -> AppResult<Option<OrganizationModel>> {
        let org = sqlx::query_as("SELECT id, name, is_active FROM organizations")
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(org)
    }

    async fn lock_organization(&mut self) -> AppResult<Option<OrganizationModel>> {
        let org = sqlx::query_as("SELECT id, name, is_active FROM organizations FOR UPDATE")
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(org)
    }

    async fn insert_organization(
        &mut self,
        name: &str,
        is_active: bool,
    ) -> AppResult<OrganizationModel> {
        let org = sqlx::query_as(
            "INSERT INTO organizations (id, name, is_active) VALUES ($1, $2, $3) \
             RETURNING id, name, is_active",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(is_active)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(org)
    }

    async fn update_organization(
        &mut self,
        organization: &OrganizationModel,
    ) -> AppResult<OrganizationModel> {
        let org = sqlx::query_as(
            "UPDATE organizations SET name = $1, is_active = $2 WHERE id = $3 \
             RETURNING id, name, is_active",
        )
        .bind(&organization.name)
        .bind(organization.is_active)
        .bind(organization.id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(org)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
