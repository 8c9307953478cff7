use db::{campaign::Campaign, schema::campaigns, user::User, DbConn};
use diesel::prelude::*;
use maud::Markup;
use rocket::{
    form::Form,
    http::CookieJar,
    request::FlashMessage,
    response::{Flash, Redirect},
    State,
};
use serde::Serialize;
use ui::page_of_body_and_flash_msg;

use crate::{
    cache::Caches,
    error::AppError,
    permissions::{has_permission, Permission},
    polls::{admin_links, campaign_by_public_id, joined_campaigns, mark_joined},
    util::{flash_of, format_date_range},
};

#[get("/")]
pub fn index() -> Redirect {
    Redirect::to("/polls")
}

#[get("/polls")]
pub async fn polls_page(
    user: Option<User>,
    flash: Option<FlashMessage<'_>>,
    jar: &CookieJar<'_>,
    db: DbConn,
) -> Result<Markup, AppError> {
    let all = db
        .interact(|conn| {
            campaigns::table
                .order_by((campaigns::created_at.desc(), campaigns::id.desc()))
                .select(Campaign::as_select())
                .load(conn)
        })
        .await?;

    let joined = joined_campaigns(jar);
    let is_admin = has_permission(user.as_ref(), &Permission::CreateCampaign);

    let markup = maud::html! {
        div class="d-flex justify-content-between align-items-center" {
            h1 { "Ongoing polls" }
            @if is_admin {
                a class="btn btn-primary" href="/polls/new" { "Create poll" }
            }
        }
        @if all.is_empty() {
            p class="text-muted" { "There are no polls yet." }
        }
        div class="row row-cols-1 row-cols-md-2 g-3 mt-1" {
            @for campaign in &all {
                div class="col" {
                    div class="card h-100" {
                        div class="card-body" {
                            @if let Some(club) = &campaign.club {
                                h6 class="card-subtitle mb-2 text-muted" { (club) }
                            }
                            h5 class="card-title" { (campaign.title) }
                            @if let Some(description) = &campaign.description {
                                p class="card-text" { (description) }
                            }
                            p class="card-text small text-muted" {
                                (format_date_range(campaign.starts_at.as_ref(), campaign.ends_at.as_ref()))
                            }
                            @if is_admin {
                                a class="btn btn-primary btn-sm me-2" href=(format!("/poll/{}", campaign.public_id)) { "Open" }
                                (admin_links(campaign))
                            } @else if joined.contains(&campaign.public_id) {
                                a class="btn btn-primary btn-sm" href=(format!("/poll/{}", campaign.public_id)) { "Open" }
                            } @else {
                                form class="row g-2" method="post" action=(format!("/polls/{}/join", campaign.public_id)) {
                                    div class="col-auto" {
                                        input type="text" class="form-control form-control-sm"
                                            name="code" placeholder="Access code" aria-label="Access code";
                                    }
                                    div class="col-auto" {
                                        button type="submit" class="btn btn-outline-primary btn-sm" { "Join" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    };

    Ok(page_of_body_and_flash_msg(markup, flash_of(flash), user))
}

#[derive(FromForm, Serialize, Debug)]
pub struct JoinForm {
    pub code: String,
}

#[post("/polls/<pid>/join", data = "<form>")]
pub async fn join_poll(
    pid: &str,
    form: Form<JoinForm>,
    jar: &CookieJar<'_>,
    db: DbConn,
    caches: &State<Caches>,
) -> Result<Flash<Redirect>, AppError> {
    let campaign = campaign_by_public_id(&db, caches, pid).await?;

    if form.code.trim().is_empty() {
        return Ok(Flash::error(
            Redirect::to("/polls"),
            "Please enter the access code.",
        ));
    }
    if !campaign.code_matches(&form.code) {
        tracing::info!(campaign = campaign.id, "wrong access code");
        return Ok(Flash::error(
            Redirect::to("/polls"),
            format!("Incorrect access code for \"{}\".", campaign.title),
        ));
    }

    mark_joined(jar, &campaign.public_id);
    Ok(Flash::success(
        Redirect::to(format!("/poll/{}", campaign.public_id)),
        format!("You joined \"{}\".", campaign.title),
    ))
}
