//! Poll pages: the listing, creation and option management for admins, the
//! voting page, results and the demographic summary.

use std::collections::BTreeSet;

use db::{
    campaign::{options_of_campaign, Campaign, CampaignOption},
    schema::campaigns,
    DbConn,
};
use diesel::prelude::*;
use rocket::http::{Cookie, CookieJar};

use crate::{cache::Caches, error::AppError};

pub mod create;
pub mod listing;
pub mod options;
pub mod results;
pub mod summary;
pub mod vote;

pub const JOINED_COOKIE: &str = "joined_campaigns";

/// Loads a campaign through the campaign cache.
pub async fn campaign_by_public_id(
    db: &DbConn,
    caches: &Caches,
    public_id: &str,
) -> Result<Campaign, AppError> {
    let cached = caches.campaign(public_id);
    if let Some(campaign) = cached {
        return Ok(campaign);
    }

    let pid = public_id.to_string();
    let campaign = db
        .interact(move |conn| {
            campaigns::table
                .filter(Campaign::with_public_id(&pid))
                .select(Campaign::as_select())
                .first(conn)
                .optional()
        })
        .await?;

    match campaign {
        Some(campaign) => {
            caches.store_campaign(campaign.clone());
            Ok(campaign)
        }
        None => Err(AppError::NotFound("No such poll.".to_string())),
    }
}

/// Loads a campaign's options (ordered by label) through the options cache.
pub async fn cached_options(
    db: &DbConn,
    caches: &Caches,
    campaign_id: i64,
) -> Result<Vec<CampaignOption>, AppError> {
    let cached = caches.options(campaign_id);
    if let Some(options) = cached {
        return Ok(options);
    }

    let options = db
        .interact(move |conn| options_of_campaign(campaign_id, conn))
        .await?;
    caches.store_options(campaign_id, options.clone());
    Ok(options)
}

/// Public ids of the campaigns this browser has entered the code for.
pub fn joined_campaigns(jar: &CookieJar<'_>) -> BTreeSet<String> {
    jar.get_private(JOINED_COOKIE)
        .and_then(|cookie| serde_json::from_str(cookie.value()).ok())
        .unwrap_or_default()
}

pub fn mark_joined(jar: &CookieJar<'_>, public_id: &str) {
    let mut joined = joined_campaigns(jar);
    joined.insert(public_id.to_string());
    match serde_json::to_string(&joined) {
        Ok(value) => {
            let mut cookie = Cookie::new(JOINED_COOKIE, value);
            cookie.make_permanent();
            jar.add_private(cookie);
        }
        Err(error) => tracing::warn!(%error, "could not remember joined poll"),
    }
}

/// Links shown to admins next to a campaign.
pub fn admin_links(campaign: &Campaign) -> maud::Markup {
    let pid = &campaign.public_id;
    maud::html! {
        div class="btn-group" role="group" {
            a class="btn btn-outline-secondary btn-sm" href=(format!("/polls/{pid}/options")) { "Options" }
            a class="btn btn-outline-secondary btn-sm" href=(format!("/poll/{pid}/results")) { "Results" }
            a class="btn btn-outline-secondary btn-sm" href=(format!("/poll/{pid}/summary")) { "Summary" }
        }
    }
}
