use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::{
    campaign::{Campaign, CampaignOption},
    schema::votes_single,
};

/// One voter's choice in a single-choice campaign. A voter has at most one
/// of these per campaign.
#[derive(
    Debug, Queryable, Selectable, Identifiable, Associations, Serialize, Clone,
)]
#[diesel(table_name = votes_single)]
#[diesel(belongs_to(Campaign))]
#[diesel(belongs_to(CampaignOption, foreign_key = option_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Vote {
    pub id: i64,
    pub campaign_id: i64,
    pub option_id: i64,
    pub voter_id: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = votes_single)]
pub struct NewVote {
    pub campaign_id: i64,
    pub option_id: i64,
    pub voter_id: String,
    pub created_at: NaiveDateTime,
}
