use chrono::Utc;
use db::{
    campaign::{Campaign, CampaignOption},
    schema::{campaign_options, votes_single},
    user::User,
    vote::NewVote,
    DbConn,
};
use diesel::{
    connection::LoadConnection,
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
    sqlite::Sqlite,
};
use either::Either;
use live::{BroadcastFeed, ChangeEvent, ChangeKind};
use maud::Markup;
use rocket::{
    form::Form,
    http::CookieJar,
    request::FlashMessage,
    response::{Flash, Redirect},
    State,
};
use serde::Serialize;
use ui::{page_of_body_and_flash_msg, FlashKind};

use crate::{
    cache::Caches,
    error::AppError,
    identity::{resolve_voter, CookieVoterStore, VoterId},
    permissions::{has_permission, Permission},
    polls::{admin_links, cached_options, campaign_by_public_id, joined_campaigns},
    util::{flash_of, format_date_range},
};

pub const VOTES_TABLE: &str = "votes_single";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    /// A new vote row was written for this option.
    Recorded(i64),
    /// The voter already had a vote (for this option); nothing was written.
    AlreadyVoted(i64),
}

fn prior_vote(
    campaign_id: i64,
    voter_id: &str,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> QueryResult<Option<i64>> {
    votes_single::table
        .filter(votes_single::campaign_id.eq(campaign_id))
        .filter(votes_single::voter_id.eq(voter_id))
        .select(votes_single::option_id)
        .first(conn)
        .optional()
}

/// Records `voter`'s vote for the option with public id `option_pid`, unless
/// they have voted in this campaign before.
#[tracing::instrument(skip(conn))]
pub fn cast_vote(
    campaign_id: i64,
    option_pid: &str,
    voter: &VoterId,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> Result<CastOutcome, AppError> {
    conn.transaction(|conn| -> Result<CastOutcome, AppError> {
        if let Some(previous) = prior_vote(campaign_id, voter.as_str(), conn)? {
            return Ok(CastOutcome::AlreadyVoted(previous));
        }

        let option_id = campaign_options::table
            .filter(campaign_options::public_id.eq(option_pid))
            .filter(campaign_options::campaign_id.eq(campaign_id))
            .select(campaign_options::id)
            .first::<i64>(conn)
            .optional()?
            .ok_or_else(|| {
                AppError::Validation(
                    "That option is not part of this poll.".to_string(),
                )
            })?;

        let inserted = diesel::insert_into(votes_single::table)
            .values(NewVote {
                campaign_id,
                option_id,
                voter_id: voter.as_str().to_string(),
                created_at: Utc::now().naive_utc(),
            })
            .execute(conn);

        match inserted {
            Ok(_) => Ok(CastOutcome::Recorded(option_id)),
            Err(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                let previous = prior_vote(campaign_id, voter.as_str(), conn)?
                    .unwrap_or(option_id);
                Ok(CastOutcome::AlreadyVoted(previous))
            }
            Err(e) => Err(e.into()),
        }
    })
}

/// Students must have entered the access code before they can see a poll.
fn must_join_first(
    user: Option<&User>,
    jar: &CookieJar<'_>,
    campaign: &Campaign,
) -> Option<Flash<Redirect>> {
    if has_permission(user, &Permission::ViewResults)
        || joined_campaigns(jar).contains(&campaign.public_id)
    {
        None
    } else {
        Some(Flash::error(
            Redirect::to("/polls"),
            "Enter the access code to join this poll.",
        ))
    }
}

fn poll_page(
    campaign: &Campaign,
    options: &[CampaignOption],
    voted_for: Option<i64>,
    is_admin: bool,
) -> Markup {
    let pid = &campaign.public_id;
    maud::html! {
        @if let Some(club) = &campaign.club {
            h6 class="text-muted" { (club) }
        }
        h1 { (campaign.title) }
        @if let Some(description) = &campaign.description {
            p { (description) }
        }
        p class="small text-muted" {
            (format_date_range(campaign.starts_at.as_ref(), campaign.ends_at.as_ref()))
            " • " (campaign.vote_type().describe())
        }
        @if is_admin {
            div class="card mb-3" {
                div class="card-body" {
                    h5 class="card-title" { "Admin" }
                    (admin_links(campaign))
                }
            }
        }
        @if options.is_empty() {
            p class="text-muted" { "This poll has no options yet." }
        }
        div class="list-group" {
            @for option in options {
                @let mine = voted_for == Some(option.id);
                div class=(if mine { "list-group-item list-group-item-success" } else { "list-group-item" }) {
                    div class="d-flex justify-content-between align-items-center" {
                        div {
                            strong { (option.label) }
                            @if mine {
                                " " span class="badge bg-success" { "(your vote)" }
                            }
                            @if let Some(description) = &option.description {
                                br;
                                small class="text-muted" { (description) }
                            }
                        }
                        @if voted_for.is_none() && !is_admin {
                            form method="post" action=(format!("/poll/{pid}/vote")) {
                                input type="hidden" name="option_id" value=(option.public_id);
                                button type="submit" class="btn btn-primary btn-sm" { "Vote" }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[get("/poll/<pid>")]
pub async fn view_poll(
    pid: &str,
    user: Option<User>,
    flash: Option<FlashMessage<'_>>,
    jar: &CookieJar<'_>,
    db: DbConn,
    caches: &State<Caches>,
) -> Result<Either<Markup, Flash<Redirect>>, AppError> {
    let campaign = campaign_by_public_id(&db, caches, pid).await?;
    if let Some(redirect) = must_join_first(user.as_ref(), jar, &campaign) {
        return Ok(Either::Right(redirect));
    }

    let options = cached_options(&db, caches, campaign.id).await?;
    let voter = resolve_voter(user.as_ref(), &mut CookieVoterStore::new(jar));
    let campaign_id = campaign.id;
    let voted_for = db
        .interact(move |conn| prior_vote(campaign_id, voter.as_str(), conn))
        .await?;

    let is_admin = has_permission(user.as_ref(), &Permission::ViewResults);
    let markup = poll_page(&campaign, &options, voted_for, is_admin);
    Ok(Either::Left(page_of_body_and_flash_msg(
        markup,
        flash_of(flash),
        user,
    )))
}

#[derive(FromForm, Serialize, Debug)]
pub struct VoteForm {
    /// Public id of the chosen option.
    pub option_id: String,
}

#[post("/poll/<pid>/vote", data = "<form>")]
pub async fn do_vote(
    pid: &str,
    user: Option<User>,
    form: Form<VoteForm>,
    jar: &CookieJar<'_>,
    db: DbConn,
    caches: &State<Caches>,
    feed: &State<BroadcastFeed>,
) -> Result<Either<Markup, Flash<Redirect>>, AppError> {
    let campaign = campaign_by_public_id(&db, caches, pid).await?;
    if let Some(redirect) = must_join_first(user.as_ref(), jar, &campaign) {
        return Ok(Either::Right(redirect));
    }

    let voter = resolve_voter(user.as_ref(), &mut CookieVoterStore::new(jar));
    let campaign_id = campaign.id;
    let option_pid = form.into_inner().option_id;
    let outcome = {
        let voter = voter.clone();
        db.interact(move |conn| cast_vote(campaign_id, &option_pid, &voter, conn))
            .await?
    };

    let (voted_for, message) = match outcome {
        CastOutcome::Recorded(option_id) => {
            let receivers = feed.publish(
                ChangeEvent::new(VOTES_TABLE, ChangeKind::Insert)
                    .with("campaign_id", campaign_id)
                    .with("option_id", option_id)
                    .with("voter_id", voter.as_str()),
            );
            tracing::info!(campaign = campaign_id, option = option_id, receivers, "vote recorded");
            caches.invalidate_options(campaign_id);
            (option_id, (FlashKind::Success, "Vote submitted.".to_string()))
        }
        CastOutcome::AlreadyVoted(option_id) => (
            option_id,
            (
                FlashKind::Error,
                "You have already voted in this poll.".to_string(),
            ),
        ),
    };

    let options = cached_options(&db, caches, campaign_id).await?;
    let is_admin = has_permission(user.as_ref(), &Permission::ViewResults);
    let markup = poll_page(&campaign, &options, Some(voted_for), is_admin);
    Ok(Either::Left(page_of_body_and_flash_msg(
        markup,
        Some(message),
        user,
    )))
}
