#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User row with the denormalized subscription block. Billing webhooks write
/// the subscription columns elsewhere; this service only reads them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub subscription_plan: String,
    pub subscription_active: bool,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
