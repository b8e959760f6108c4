use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Lab {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact lab shape embedded in admission listings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct LabSummary {
    pub id: Uuid,
    pub name: String,
}
