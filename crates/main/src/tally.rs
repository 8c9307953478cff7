//! Counting votes.

use std::collections::HashMap;

use db::campaign::CampaignOption;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallyRow {
    pub option_id: i64,
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Tally {
    /// One row per option, in the order the options were given.
    pub rows: Vec<TallyRow>,
    /// Sum of the counts in `rows`.
    pub total: usize,
}

impl Tally {
    pub fn percentage_of(&self, row: &TallyRow) -> u32 {
        percentage(row.count, self.total)
    }
}

/// Counts `votes` (option ids) against `options`. Votes for ids that are not
/// among the options are ignored; options without votes count zero.
pub fn tally(
    options: &[CampaignOption],
    votes: impl IntoIterator<Item = i64>,
) -> Tally {
    let mut counts: HashMap<i64, usize> =
        options.iter().map(|opt| (opt.id, 0)).collect();
    for option_id in votes {
        if let Some(count) = counts.get_mut(&option_id) {
            *count += 1;
        }
    }

    let rows: Vec<TallyRow> = options
        .iter()
        .map(|opt| TallyRow {
            option_id: opt.id,
            label: opt.label.clone(),
            count: counts.get(&opt.id).copied().unwrap_or(0),
        })
        .collect();
    let total = rows.iter().map(|row| row.count).sum();

    Tally { rows, total }
}

/// `round(count / total * 100)` with `total` floored at one.
pub fn percentage(count: usize, total: usize) -> u32 {
    let total = total.max(1) as f64;
    ((count as f64 / total) * 100.0).round() as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked {
    pub label: String,
    pub count: usize,
}

/// Counts labels and orders them by descending count; equal counts keep the
/// order in which their label was first seen.
pub fn rank<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    for label in labels {
        match index.get(label) {
            Some(&i) => ranked[i].count += 1,
            None => {
                index.insert(label, ranked.len());
                ranked.push(Ranked {
                    label: label.to_string(),
                    count: 1,
                });
            }
        }
    }
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}

/// Every entry tied at the highest count. Expects the output of [`rank`].
pub fn winners(ranked: &[Ranked]) -> Vec<&Ranked> {
    match ranked.first() {
        Some(top) => ranked.iter().filter(|r| r.count == top.count).collect(),
        None => Vec::new(),
    }
}
