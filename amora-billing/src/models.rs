use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::transactions;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = transactions)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub plan_id: String,
    pub tier: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub gateway_status: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction {
    pub reference: String,
    pub user_id: Uuid,
    pub plan_id: String,
    pub tier: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}
