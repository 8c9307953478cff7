use db::{user::User, DbConn};
use itertools::Itertools;
use maud::Markup;
use rocket::{http::Header, State};
use ui::{page_of_body, page_title};

use crate::{
    cache::Caches,
    csv,
    demographics::{
        load_dataset, summarize, Breakdown, CandidateFilter, CSV_HEADER,
    },
    error::AppError,
    permissions::{require, Permission},
    polls::{admin_links, campaign_by_public_id},
    tally::{percentage, winners},
};

fn breakdown_table(title: &str, breakdown: &Breakdown) -> Markup {
    maud::html! {
        div class="col-md-6 mb-3" {
            h5 { (title) }
            table class="table table-sm" {
                tbody {
                    @for (name, count) in &breakdown.entries {
                        tr {
                            td { (name) }
                            td class="text-end" { (count) }
                            td class="text-end text-muted" { (percentage(*count, breakdown.total)) "%" }
                        }
                    }
                }
            }
        }
    }
}

/// `filtered` marks a submission of the candidate form, so that unticking
/// every box selects nothing rather than everything.
#[get("/poll/<pid>/summary?<candidate>&<filtered>")]
pub async fn summary_page(
    pid: &str,
    candidate: Vec<String>,
    filtered: Option<bool>,
    user: Option<User>,
    db: DbConn,
    caches: &State<Caches>,
) -> Result<Markup, AppError> {
    require(user.as_ref(), Permission::ViewResults)?;
    let campaign = campaign_by_public_id(&db, caches, pid).await?;
    let campaign_id = campaign.id;
    let rows = db.interact(move |conn| load_dataset(campaign_id, conn)).await?;

    let filter = if filtered.unwrap_or(false) {
        CandidateFilter::only(candidate)
    } else {
        CandidateFilter::all()
    };
    let summary = summarize(&rows, &filter);
    let top = winners(&summary.ranked);
    let pid = &campaign.public_id;

    let markup = maud::html! {
        (page_title(&format!("Summary: {}", campaign.title)))
        (admin_links(&campaign))
        div class="my-3" {
            @match top.first() {
                Some(winner) => {
                    h4 {
                        "Winner: " (winner.label) " with " (winner.count) " votes"
                    }
                    @if top.len() > 1 {
                        p class="text-muted" {
                            "Tied with "
                            (top[1..].iter().map(|r| &r.label).join(", "))
                        }
                    }
                }
                None => {
                    p class="text-muted" { "No votes yet." }
                }
            }
        }
        @for ranked in &summary.ranked {
            @let pct = percentage(ranked.count, summary.total_votes);
            div class="mb-2" {
                div class="d-flex justify-content-between" {
                    span { (ranked.label) }
                    span { (ranked.count) }
                }
                div class="progress" {
                    div class="progress-bar" style=(format!("width: {pct}%")) {}
                }
            }
        }
        a class="btn btn-outline-primary my-3" href=(format!("/poll/{pid}/summary/export.csv")) {
            "Download CSV"
        }
        @if !summary.candidates.is_empty() {
            form method="get" action=(format!("/poll/{pid}/summary")) class="mb-3" {
                input type="hidden" name="filtered" value="true";
                @for name in &summary.candidates {
                    div class="form-check form-check-inline" {
                        input class="form-check-input" type="checkbox" name="candidate"
                            value=(name) id=(format!("candidate-{name}"))
                            checked[filter.includes(name)];
                        label class="form-check-label" for=(format!("candidate-{name}")) { (name) }
                    }
                }
                button type="submit" class="btn btn-secondary btn-sm" { "Apply" }
            }
        }
        div class="row" {
            (breakdown_table("Discipline", &summary.disciplines))
            (breakdown_table("Location", &summary.locations))
            (breakdown_table("Gender", &summary.genders))
            (breakdown_table("UG/PG", &summary.ug_pg))
        }
    };

    Ok(page_of_body(markup, user))
}

#[derive(Responder)]
#[response(content_type = "text/csv; charset=utf-8")]
pub struct CsvDownload(String, Header<'static>);

impl CsvDownload {
    pub fn attachment(body: String, filename: &str) -> CsvDownload {
        CsvDownload(
            body,
            Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{filename}\""),
            ),
        )
    }
}

#[get("/poll/<pid>/summary/export.csv")]
pub async fn export_csv(
    pid: &str,
    user: Option<User>,
    db: DbConn,
    caches: &State<Caches>,
) -> Result<CsvDownload, AppError> {
    require(user.as_ref(), Permission::ViewResults)?;
    let campaign = campaign_by_public_id(&db, caches, pid).await?;
    let campaign_id = campaign.id;
    let rows = db.interact(move |conn| load_dataset(campaign_id, conn)).await?;

    tracing::info!(campaign_id, rows = rows.len(), "exporting dataset");
    let body = csv::write(&CSV_HEADER, rows.iter().map(|row| row.csv_fields()));
    Ok(CsvDownload::attachment(
        body,
        &format!("poll_{}_dataset.csv", campaign.public_id),
    ))
}
