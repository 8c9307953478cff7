use chrono::NaiveDateTime;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::schema::{self, campaign_options, campaigns};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Single,
    Preferential,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Single => "single",
            VoteType::Preferential => "preferential",
        }
    }

    pub fn parse(value: &str) -> Option<VoteType> {
        match value {
            "single" => Some(VoteType::Single),
            "preferential" => Some(VoteType::Preferential),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            VoteType::Single => "Single vote",
            VoteType::Preferential => "Preferential voting",
        }
    }
}

/// A poll. Options and votes refer to it by `id`; URLs use `public_id`.
#[derive(
    Debug, Queryable, Selectable, Identifiable, Serialize, Deserialize, Clone,
    PartialEq, Eq,
)]
#[diesel(table_name = campaigns)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Campaign {
    pub id: i64,
    pub public_id: String,
    pub title: String,
    pub description: Option<String>,
    pub club: Option<String>,
    pub code: String,
    pub vote_type: String,
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: Option<NaiveDateTime>,
    pub is_published: bool,
    pub host_id: String,
    pub created_at: NaiveDateTime,
}

impl Campaign {
    pub fn with_public_id(
        pid: &str,
    ) -> diesel::dsl::Eq<campaigns::public_id, &str> {
        campaigns::public_id.eq(pid)
    }

    pub fn vote_type(&self) -> VoteType {
        VoteType::parse(&self.vote_type).unwrap_or(VoteType::Single)
    }

    /// Access codes are compared after trimming surrounding whitespace.
    pub fn code_matches(&self, attempt: &str) -> bool {
        let attempt = attempt.trim();
        !attempt.is_empty() && attempt == self.code.trim()
    }
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = campaigns)]
pub struct NewCampaign {
    pub public_id: String,
    pub title: String,
    pub description: Option<String>,
    pub club: Option<String>,
    pub code: String,
    pub vote_type: String,
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: Option<NaiveDateTime>,
    pub is_published: bool,
    pub host_id: String,
    pub created_at: NaiveDateTime,
}

/// A candidate within exactly one campaign.
#[derive(
    Debug,
    Queryable,
    Selectable,
    Identifiable,
    Associations,
    Serialize,
    Deserialize,
    Clone,
    PartialEq,
    Eq,
)]
#[diesel(table_name = campaign_options)]
#[diesel(belongs_to(Campaign))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CampaignOption {
    pub id: i64,
    pub public_id: String,
    pub campaign_id: i64,
    pub label: String,
    pub description: Option<String>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = campaign_options)]
pub struct NewCampaignOption {
    pub public_id: String,
    pub campaign_id: i64,
    pub label: String,
    pub description: Option<String>,
}

/// Options of a campaign in display order (by label).
pub fn options_of_campaign(
    campaign_id: i64,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> QueryResult<Vec<CampaignOption>> {
    schema::campaign_options::table
        .filter(schema::campaign_options::campaign_id.eq(campaign_id))
        .order_by(schema::campaign_options::label.asc())
        .select(CampaignOption::as_select())
        .load(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(code: &str) -> Campaign {
        Campaign {
            id: 1,
            public_id: "c".to_string(),
            title: "President".to_string(),
            description: None,
            club: None,
            code: code.to_string(),
            vote_type: "single".to_string(),
            starts_at: None,
            ends_at: None,
            is_published: false,
            host_id: "h".to_string(),
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn code_comparison_ignores_surrounding_whitespace() {
        let c = campaign("ABC123");
        assert!(c.code_matches(" ABC123 "));
        assert!(!c.code_matches("abc123"));
        assert!(!c.code_matches("   "));
    }

    #[test]
    fn unknown_vote_types_read_as_single() {
        let mut c = campaign("x");
        c.vote_type = "ranked".to_string();
        assert_eq!(c.vote_type(), VoteType::Single);
        c.vote_type = "preferential".to_string();
        assert_eq!(c.vote_type(), VoteType::Preferential);
    }
}
