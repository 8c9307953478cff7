//! The per-vote dataset behind the summary page and its breakdowns.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDateTime;
use db::{
    campaign::CampaignOption,
    schema::{campaign_options, users, votes_single},
    vote::Vote,
};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Serialize;

use crate::tally::{rank, Ranked};

pub const NA: &str = "NA";

pub const DISCIPLINES: [(&str, &str); 10] = [
    ("1", "Arts, Design and Architecture"),
    ("2", "Arts"),
    ("3", "Business and Economics"),
    ("4", "Education"),
    ("5", "Engineering"),
    ("6", "Information Technology"),
    ("7", "Law"),
    ("8", "Medicine, Nursing and Health Sciences"),
    ("9", "Pharmacy and Pharmaceutical Sciences"),
    ("10", "Science"),
];

pub const LOCATIONS: [(&str, &str); 6] = [
    ("1", "Clayton"),
    ("2", "Caulfield"),
    ("3", "Peninsula"),
    ("4", "Parkville"),
    ("5", "Malaysia"),
    ("6", "Other"),
];

pub const CSV_HEADER: [&str; 8] = [
    "Voter ID",
    "Option ID",
    "Option Label",
    "Created At",
    "Discipline",
    "Gender",
    "Location",
    "UG/PG",
];

fn present_code(code: Option<&str>) -> Option<&str> {
    code.map(str::trim).filter(|c| !c.is_empty() && *c != NA)
}

pub fn discipline_name(code: Option<&str>) -> &'static str {
    present_code(code)
        .and_then(|c| DISCIPLINES.iter().find(|(k, _)| *k == c))
        .map(|(_, name)| *name)
        .unwrap_or(NA)
}

/// Unknown campus codes count as `Other`; only absent ones are `NA`.
pub fn location_name(code: Option<&str>) -> &'static str {
    match present_code(code) {
        None => NA,
        Some(c) => LOCATIONS
            .iter()
            .find(|(k, _)| *k == c)
            .map(|(_, name)| *name)
            .unwrap_or("Other"),
    }
}

pub fn gender_bucket(value: Option<&str>) -> &'static str {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("female") => "Female",
        Some("male") => "Male",
        Some("other") => "Other",
        _ => NA,
    }
}

pub fn ug_pg_bucket(value: Option<&str>) -> &'static str {
    match value.map(|v| v.trim().to_uppercase()).as_deref() {
        Some("UG" | "UNDERGRAD" | "UNDERGRADUATE") => "UG",
        Some("PG" | "POSTGRAD" | "POSTGRADUATE") => "PG",
        _ => NA,
    }
}

/// One vote joined with its option's label and the voter's demographics.
/// Anonymous voters have no demographics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRow {
    pub voter_id: String,
    pub option_id: i64,
    pub option_label: Option<String>,
    pub created_at: NaiveDateTime,
    pub discipline: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub ug_pg: Option<String>,
}

impl DatasetRow {
    /// The name the candidate filter knows this row's option by.
    pub fn candidate(&self) -> String {
        match &self.option_label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => self.option_id.to_string(),
        }
    }

    pub fn csv_fields(&self) -> [String; 8] {
        [
            self.voter_id.clone(),
            self.option_id.to_string(),
            self.option_label.clone().unwrap_or_default(),
            self.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.discipline.clone().unwrap_or_default(),
            self.gender.clone().unwrap_or_default(),
            self.location.clone().unwrap_or_default(),
            self.ug_pg.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct VoterDemographics {
    pub public_id: String,
    pub discipline: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub ug_pg: Option<String>,
}

pub fn join_dataset(
    votes: &[Vote],
    options: &[CampaignOption],
    voters: &[VoterDemographics],
) -> Vec<DatasetRow> {
    let labels: HashMap<i64, &str> =
        options.iter().map(|o| (o.id, o.label.as_str())).collect();
    let demographics: HashMap<&str, &VoterDemographics> =
        voters.iter().map(|v| (v.public_id.as_str(), v)).collect();

    votes
        .iter()
        .map(|vote| {
            let demo = demographics.get(vote.voter_id.as_str());
            DatasetRow {
                voter_id: vote.voter_id.clone(),
                option_id: vote.option_id,
                option_label: labels.get(&vote.option_id).map(|l| l.to_string()),
                created_at: vote.created_at,
                discipline: demo.and_then(|d| d.discipline.clone()),
                gender: demo.and_then(|d| d.gender.clone()),
                location: demo.and_then(|d| d.location.clone()),
                ug_pg: demo.and_then(|d| d.ug_pg.clone()),
            }
        })
        .collect()
}

/// Builds the dataset from three bulk reads: the campaign's votes, the
/// options they refer to and the voters' demographics.
#[tracing::instrument(skip(conn))]
pub fn load_dataset(
    campaign_id: i64,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> QueryResult<Vec<DatasetRow>> {
    let votes = votes_single::table
        .filter(votes_single::campaign_id.eq(campaign_id))
        .order_by(votes_single::id.asc())
        .select(Vote::as_select())
        .load(conn)?;
    if votes.is_empty() {
        return Ok(Vec::new());
    }

    let option_ids: HashSet<i64> = votes.iter().map(|v| v.option_id).collect();
    let options = campaign_options::table
        .filter(campaign_options::id.eq_any(option_ids))
        .select(CampaignOption::as_select())
        .load(conn)?;

    let voter_ids: HashSet<&str> =
        votes.iter().map(|v| v.voter_id.as_str()).collect();
    let voters = users::table
        .filter(users::public_id.eq_any(voter_ids))
        .select(VoterDemographics::as_select())
        .load(conn)?;

    Ok(join_dataset(&votes, &options, &voters))
}

/// Which candidates feed the demographic breakdowns. `None` selects all.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    selected: Option<BTreeSet<String>>,
}

impl CandidateFilter {
    pub fn all() -> Self {
        CandidateFilter { selected: None }
    }

    pub fn only(candidates: impl IntoIterator<Item = String>) -> Self {
        CandidateFilter {
            selected: Some(candidates.into_iter().collect()),
        }
    }

    pub fn includes(&self, candidate: &str) -> bool {
        match &self.selected {
            None => true,
            Some(set) => set.contains(candidate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakdown {
    pub entries: Vec<(&'static str, usize)>,
    pub total: usize,
}

impl Breakdown {
    fn of(entries: Vec<(&'static str, usize)>) -> Breakdown {
        let total = entries.iter().map(|(_, n)| n).sum();
        Breakdown { entries, total }
    }
}

/// Counts every bucket that occurs, in `order`, with anything not listed
/// (only ever `NA`) at the end.
fn ordered_counts<'a>(
    values: impl Iterator<Item = &'static str>,
    order: impl Iterator<Item = &'a str>,
) -> Vec<(&'static str, usize)> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut out = Vec::new();
    for name in order {
        if let Some((k, n)) = counts.remove_entry(name) {
            out.push((k, n));
        }
    }
    let mut rest: Vec<_> = counts.into_iter().collect();
    rest.sort();
    out.extend(rest);
    out
}

fn fixed_counts(
    values: impl Iterator<Item = &'static str>,
    buckets: &[&'static str],
) -> Vec<(&'static str, usize)> {
    let mut out: Vec<(&'static str, usize)> =
        buckets.iter().map(|b| (*b, 0)).collect();
    for v in values {
        if let Some(entry) = out.iter_mut().find(|(b, _)| *b == v) {
            entry.1 += 1;
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct Summary {
    /// Votes per option, most votes first. Unaffected by the filter.
    pub ranked: Vec<Ranked>,
    pub total_votes: usize,
    /// Every candidate that received a vote, alphabetically.
    pub candidates: Vec<String>,
    pub disciplines: Breakdown,
    pub locations: Breakdown,
    pub genders: Breakdown,
    pub ug_pg: Breakdown,
}

pub fn summarize(rows: &[DatasetRow], filter: &CandidateFilter) -> Summary {
    let labels: Vec<String> = rows.iter().map(DatasetRow::candidate).collect();
    let ranked = rank(labels.iter().map(String::as_str));
    let total_votes = ranked.iter().map(|r| r.count).sum();

    let candidates: Vec<String> = labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let filtered: Vec<&DatasetRow> = rows
        .iter()
        .zip(&labels)
        .filter(|(_, label)| filter.includes(label))
        .map(|(row, _)| row)
        .collect();

    Summary {
        ranked,
        total_votes,
        candidates,
        disciplines: Breakdown::of(ordered_counts(
            filtered.iter().map(|r| discipline_name(r.discipline.as_deref())),
            DISCIPLINES.iter().map(|(_, name)| *name),
        )),
        locations: Breakdown::of(ordered_counts(
            filtered.iter().map(|r| location_name(r.location.as_deref())),
            LOCATIONS.iter().map(|(_, name)| *name),
        )),
        genders: Breakdown::of(fixed_counts(
            filtered.iter().map(|r| gender_bucket(r.gender.as_deref())),
            &["Female", "Male", "Other", NA],
        )),
        ug_pg: Breakdown::of(fixed_counts(
            filtered.iter().map(|r| ug_pg_bucket(r.ug_pg.as_deref())),
            &["UG", "PG", NA],
        )),
    }
}
