use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::emails;

/// Record of a message handed to the mail transport.
#[derive(
    Debug, Queryable, Selectable, Serialize, Deserialize, Clone, PartialEq, Eq,
)]
#[diesel(table_name = emails)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EmailRow {
    pub id: i64,
    pub message_id: String,
    pub recipients: String,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = emails)]
pub struct NewEmailRow {
    pub message_id: String,
    pub recipients: String,
    pub created_at: chrono::NaiveDateTime,
}
