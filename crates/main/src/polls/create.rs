use chrono::Utc;
use db::{
    campaign::{NewCampaign, VoteType},
    schema::campaigns,
    user::User,
    DbConn,
};
use diesel::prelude::*;
use either::Either;
use maud::Markup;
use rocket::{
    form::Form,
    response::{Flash, Redirect},
};
use serde::Serialize;
use ui::{page_of_body, page_title};

use crate::{
    error::AppError,
    permissions::{require, Permission},
    util::{non_empty, parse_datetime_local, public_id},
};

#[derive(FromForm, Serialize, Debug, Default, Clone)]
pub struct CreateCampaignForm {
    pub club: String,
    pub title: String,
    pub description: Option<String>,
    pub code: String,
    pub vote_type: String,
    pub starts_at: String,
    pub ends_at: String,
}

fn campaign_form(values: &CreateCampaignForm, error: Option<&str>) -> Markup {
    maud::html! {
        (page_title("Create a poll"))
        @if let Some(error) = error {
            div class="alert alert-danger" role="alert" { (error) }
        }
        form method="post" action="/polls/new" {
            div class="mb-3" {
                label for="club" class="form-label" { "Club" }
                input type="text" class="form-control" id="club" name="club" value=(values.club);
            }
            div class="mb-3" {
                label for="title" class="form-label" { "Title" }
                input type="text" class="form-control" id="title" name="title" value=(values.title);
            }
            div class="mb-3" {
                label for="description" class="form-label" { "Extra information" }
                textarea class="form-control" id="description" name="description" {
                    (values.description.as_deref().unwrap_or_default())
                }
            }
            div class="mb-3" {
                label for="code" class="form-label" { "Access code" }
                input type="text" class="form-control" id="code" name="code" value=(values.code);
            }
            div class="mb-3" {
                label for="vote_type" class="form-label" { "Voting type" }
                select class="form-select" id="vote_type" name="vote_type" {
                    @for vt in [VoteType::Single, VoteType::Preferential] {
                        option value=(vt.as_str()) selected[values.vote_type == vt.as_str()] { (vt.describe()) }
                    }
                }
            }
            div class="row mb-3" {
                div class="col" {
                    label for="starts_at" class="form-label" { "Starts at" }
                    input type="datetime-local" class="form-control" id="starts_at" name="starts_at" value=(values.starts_at);
                }
                div class="col" {
                    label for="ends_at" class="form-label" { "Ends at" }
                    input type="datetime-local" class="form-control" id="ends_at" name="ends_at" value=(values.ends_at);
                }
            }
            button type="submit" class="btn btn-primary" { "Create poll" }
        }
    }
}

#[get("/polls/new")]
pub async fn create_campaign_page(
    user: Option<User>,
) -> Result<Markup, AppError> {
    require(user.as_ref(), Permission::CreateCampaign)?;
    let values = CreateCampaignForm {
        vote_type: VoteType::Single.as_str().to_string(),
        ..Default::default()
    };
    Ok(page_of_body(campaign_form(&values, None), user))
}

/// Checks the form and builds the row to insert, or says what is wrong.
pub fn validate_campaign(
    form: &CreateCampaignForm,
    host_id: &str,
) -> Result<NewCampaign, &'static str> {
    let club = form.club.trim();
    let title = form.title.trim();
    if club.is_empty() || title.is_empty() {
        return Err("Please fill in the club and title.");
    }
    if form.starts_at.trim().is_empty() || form.ends_at.trim().is_empty() {
        return Err("Please choose when the poll starts and ends.");
    }
    let (Some(starts_at), Some(ends_at)) = (
        parse_datetime_local(&form.starts_at),
        parse_datetime_local(&form.ends_at),
    ) else {
        return Err("Please enter valid start and end times.");
    };
    if ends_at <= starts_at {
        return Err("The end time must be after the start time.");
    }
    let code = form.code.trim();
    if code.is_empty() {
        return Err("Please choose an access code.");
    }
    let Some(vote_type) = VoteType::parse(&form.vote_type) else {
        return Err("Please choose a voting type.");
    };

    Ok(NewCampaign {
        public_id: public_id(),
        title: title.to_string(),
        description: non_empty(form.description.clone()),
        club: Some(club.to_string()),
        code: code.to_string(),
        vote_type: vote_type.as_str().to_string(),
        starts_at: Some(starts_at),
        ends_at: Some(ends_at),
        is_published: false,
        host_id: host_id.to_string(),
        created_at: Utc::now().naive_utc(),
    })
}

#[post("/polls/new", data = "<form>")]
pub async fn do_create_campaign(
    user: Option<User>,
    form: Form<CreateCampaignForm>,
    db: DbConn,
) -> Result<Either<Markup, Flash<Redirect>>, AppError> {
    require(user.as_ref(), Permission::CreateCampaign)?;
    let Some(admin) = user else {
        return Err(AppError::Unauthorized("Please log in first.".to_string()));
    };

    let new_campaign = match validate_campaign(&form, &admin.public_id) {
        Ok(campaign) => campaign,
        Err(msg) => {
            return Ok(Either::Left(page_of_body(
                campaign_form(&form, Some(msg)),
                Some(admin),
            )))
        }
    };

    let pid = new_campaign.public_id.clone();
    db.interact(move |conn| {
        diesel::insert_into(campaigns::table)
            .values(&new_campaign)
            .execute(conn)
    })
    .await?;

    tracing::info!(campaign = %pid, host = %admin.public_id, "poll created");
    Ok(Either::Right(Flash::success(
        Redirect::to(format!("/polls/{pid}/options")),
        "Poll created. Now add some options.",
    )))
}
