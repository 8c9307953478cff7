use std::ops::ControlFlow;

use db::{
    campaign::options_of_campaign, schema::votes_single, user::User, DbConn,
};
use diesel::prelude::*;
use live::{BroadcastFeed, FeedFilter, LiveEvent, LiveStatus, TokioClock};
use maud::{Markup, PreEscaped};
use qrcode::{render::svg, EcLevel, QrCode};
use rocket::{
    response::stream::{Event, EventStream},
    tokio::{self, select, sync::mpsc},
    Shutdown, State,
};
use ui::{page_of_body, page_title};

use crate::{
    cache::Caches,
    config::AppConfig,
    error::AppError,
    permissions::{require, Permission},
    polls::{admin_links, campaign_by_public_id, vote::VOTES_TABLE},
    tally::{tally, Tally},
};

/// Counts the votes of a campaign from fresh reads (no cache).
pub async fn current_tally(
    db: &DbConn,
    campaign_id: i64,
) -> Result<Tally, AppError> {
    let (options, votes) = db
        .interact(move |conn| -> QueryResult<_> {
            let options = options_of_campaign(campaign_id, conn)?;
            let votes = votes_single::table
                .filter(votes_single::campaign_id.eq(campaign_id))
                .select(votes_single::option_id)
                .load::<i64>(conn)?;
            Ok((options, votes))
        })
        .await?;
    Ok(tally(&options, votes))
}

pub fn tally_fragment(tally: &Tally) -> Markup {
    maud::html! {
        @if tally.rows.is_empty() {
            p class="text-muted" { "This poll has no options yet." }
        }
        @for row in &tally.rows {
            @let pct = tally.percentage_of(row);
            div class="mb-2" {
                div class="d-flex justify-content-between" {
                    span { (row.label) }
                    span { (row.count) " (" (pct) "%)" }
                }
                div class="progress" role="progressbar"
                    aria-valuenow=(pct) aria-valuemin="0" aria-valuemax="100" {
                    div class="progress-bar" style=(format!("width: {pct}%")) {}
                }
            }
        }
        p class="small text-muted" { "Total votes: " (tally.total) }
    }
}

pub fn status_badge(status: LiveStatus) -> Markup {
    let class = match status {
        LiveStatus::Subscribed => "badge bg-success",
        LiveStatus::Polling => "badge bg-warning text-dark",
        LiveStatus::ChannelError | LiveStatus::TimedOut => "badge bg-danger",
        LiveStatus::Connecting | LiveStatus::Closed => "badge bg-secondary",
    };
    maud::html! {
        span class=(class) { (status.label()) }
    }
}

fn qr_code_of(url: &str) -> Option<Markup> {
    match QrCode::with_error_correction_level(url, EcLevel::L) {
        Ok(code) => {
            let image = code
                .render()
                .min_dimensions(200, 200)
                .dark_color(svg::Color("#000000"))
                .light_color(svg::Color("#ffffff"))
                .build();
            Some(PreEscaped(image))
        }
        Err(error) => {
            tracing::warn!(%error, url, "could not render QR code");
            None
        }
    }
}

#[get("/poll/<pid>/results")]
pub async fn results_page(
    pid: &str,
    user: Option<User>,
    db: DbConn,
    caches: &State<Caches>,
    config: &State<AppConfig>,
) -> Result<Markup, AppError> {
    require(user.as_ref(), Permission::ViewResults)?;
    let campaign = campaign_by_public_id(&db, caches, pid).await?;
    let current = current_tally(&db, campaign.id).await?;
    let pid = &campaign.public_id;
    let share_url =
        format!("{}/poll/{pid}", config.site_url.trim_end_matches('/'));

    let markup = maud::html! {
        (page_title(&format!("Results: {}", campaign.title)))
        (admin_links(&campaign))
        div class="row mt-3" hx-ext="sse" sse-connect=(format!("/poll/{pid}/results/live")) {
            div class="col-md-8" {
                div class="d-flex justify-content-between align-items-center mb-2" {
                    div sse-swap="status" { (status_badge(LiveStatus::Connecting)) }
                    button class="btn btn-outline-secondary btn-sm"
                        hx-get=(format!("/poll/{pid}/results/tally"))
                        hx-target="#tally" { "Refresh" }
                }
                div id="tally" sse-swap="tally" { (tally_fragment(&current)) }
            }
            div class="col-md-4" {
                @if let Some(qr) = qr_code_of(&share_url) {
                    (qr)
                }
                p class="small text-muted" { (share_url) }
            }
        }
    };

    Ok(page_of_body(markup, user))
}

#[get("/poll/<pid>/results/tally")]
pub async fn results_tally(
    pid: &str,
    user: Option<User>,
    db: DbConn,
    caches: &State<Caches>,
) -> Result<Markup, AppError> {
    require(user.as_ref(), Permission::ViewResults)?;
    let campaign = campaign_by_public_id(&db, caches, pid).await?;
    Ok(tally_fragment(&current_tally(&db, campaign.id).await?))
}

/// Server-sent events keeping an open results page fresh: `status` events
/// carry the connection badge, `tally` events the re-rendered counts.
#[get("/poll/<pid>/results/live")]
pub async fn results_live(
    pid: &str,
    user: Option<User>,
    db: DbConn,
    caches: &State<Caches>,
    feed: &State<BroadcastFeed>,
    config: &State<AppConfig>,
    mut shutdown: Shutdown,
) -> Result<EventStream![], AppError> {
    require(user.as_ref(), Permission::ViewResults)?;
    let campaign = campaign_by_public_id(&db, caches, pid).await?;
    let campaign_id = campaign.id;

    let (tx, mut rx) = mpsc::channel::<LiveEvent>(16);
    let feed = feed.inner().clone();
    let policy = config.retry_policy();
    let filter = FeedFilter::new(VOTES_TABLE, "campaign_id", campaign_id);
    tokio::spawn(async move {
        let watcher = tx.clone();
        let driver = live::run(&feed, &TokioClock, &filter, policy, move |event| {
            let tx = tx.clone();
            async move {
                match tx.send(event).await {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(_) => ControlFlow::Break(()),
                }
            }
        });
        select! {
            status = driver => tracing::debug!(%status, campaign_id, "live results stopped"),
            _ = watcher.closed() => tracing::debug!(campaign_id, "live results client went away"),
        }
    });

    Ok(EventStream! {
        loop {
            let event = select! {
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = &mut shutdown => break,
            };
            match event {
                LiveEvent::Status(status) => {
                    yield Event::data(status_badge(status).into_string()).event("status");
                }
                LiveEvent::Refresh => match current_tally(&db, campaign_id).await {
                    Ok(tally) => {
                        yield Event::data(tally_fragment(&tally).into_string()).event("tally");
                    }
                    Err(error) => tracing::warn!(%error, campaign_id, "could not refresh tally"),
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::TallyRow;

    #[test]
    fn bars_use_rounded_percentages() {
        let t = Tally {
            rows: vec![
                TallyRow { option_id: 1, label: "Alice".into(), count: 2 },
                TallyRow { option_id: 2, label: "Bob".into(), count: 1 },
            ],
            total: 3,
        };
        let html = tally_fragment(&t).into_string();
        assert!(html.contains("width: 67%"));
        assert!(html.contains("width: 33%"));
        assert!(html.contains("Total votes: 3"));
    }

    #[test]
    fn each_refresh_recomputes_the_bars() {
        let option = |id: i64, label: &str| db::campaign::CampaignOption {
            id,
            public_id: format!("o{id}"),
            campaign_id: 1,
            label: label.to_string(),
            description: None,
        };
        let options = vec![option(1, "A"), option(2, "B")];
        let mut votes = vec![1, 2, 2];

        for expected in [(2, 50), (3, 60), (4, 67)] {
            votes.push(1);
            let t = tally(&options, votes.iter().copied());
            assert_eq!(t.rows[0].count, expected.0);
            let html = tally_fragment(&t).into_string();
            assert!(html.contains(&format!("width: {}%", expected.1)));
        }
    }

    #[test]
    fn empty_tallies_render() {
        let html = tally_fragment(&Tally::default()).into_string();
        assert!(html.contains("no options yet"));
        assert!(html.contains("Total votes: 0"));
    }

    #[test]
    fn polling_has_its_own_badge() {
        let html = status_badge(LiveStatus::Polling).into_string();
        assert!(html.contains("Polling"));
        assert!(html.contains("bg-warning"));
    }
}
