use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleRow {
    pub id: u64,
    pub name: String,
    pub permissions: Json<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    #[schema(example = 2)]
    pub id: u64,
    #[schema(example = "manager")]
    pub name: String,
    #[schema(example = json!(["leave.view", "leave.approve"]))]
    pub permissions: Vec<String>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            permissions: row.permissions.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Profile {
    #[schema(example = 42)]
    pub id: u64,
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    #[schema(example = "jane@company.com")]
    pub email: String,
    pub department: Option<String>,
    pub role_id: Option<u64>,
    pub manager_id: Option<u64>,
}
