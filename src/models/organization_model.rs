use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct OrganizationModel {
    pub id: uuid::Uuid,
    pub name: String,
    pub is_active: bool,
}
