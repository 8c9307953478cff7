use db::{
    campaign::{options_of_campaign, NewCampaignOption},
    schema::campaign_options,
    user::User,
    DbConn,
};
use diesel::prelude::*;
use maud::Markup;
use rocket::{
    form::Form,
    request::FlashMessage,
    response::{Flash, Redirect},
    State,
};
use serde::Serialize;
use ui::{page_of_body_and_flash_msg, page_title};

use crate::{
    cache::Caches,
    error::AppError,
    permissions::{require, Permission},
    polls::{admin_links, campaign_by_public_id},
    util::{flash_of, non_empty, public_id},
};

#[get("/polls/<pid>/options")]
pub async fn options_page(
    pid: &str,
    user: Option<User>,
    flash: Option<FlashMessage<'_>>,
    db: DbConn,
    caches: &State<Caches>,
) -> Result<Markup, AppError> {
    require(user.as_ref(), Permission::ManageOptions)?;
    let campaign = campaign_by_public_id(&db, caches, pid).await?;

    let campaign_id = campaign.id;
    let options = db
        .interact(move |conn| options_of_campaign(campaign_id, conn))
        .await?;

    let markup = maud::html! {
        (page_title(&format!("Options for {}", campaign.title)))
        (admin_links(&campaign))
        ul class="list-group my-3" {
            @for option in &options {
                li class="list-group-item" {
                    strong { (option.label) }
                    @if let Some(description) = &option.description {
                        br;
                        small class="text-muted" { (description) }
                    }
                }
            }
            @if options.is_empty() {
                li class="list-group-item text-muted" { "No options yet." }
            }
        }
        h3 { "Add an option" }
        form method="post" action=(format!("/polls/{}/options", campaign.public_id)) {
            div class="mb-3" {
                label for="label" class="form-label" { "Label" }
                input type="text" class="form-control" id="label" name="label";
            }
            div class="mb-3" {
                label for="description" class="form-label" { "Description (optional)" }
                textarea class="form-control" id="description" name="description" {}
            }
            button type="submit" class="btn btn-primary" { "Add option" }
        }
    };

    Ok(page_of_body_and_flash_msg(markup, flash_of(flash), user))
}

#[derive(FromForm, Serialize, Debug)]
pub struct OptionForm {
    pub label: String,
    pub description: Option<String>,
}

#[post("/polls/<pid>/options", data = "<form>")]
pub async fn add_option(
    pid: &str,
    user: Option<User>,
    form: Form<OptionForm>,
    db: DbConn,
    caches: &State<Caches>,
) -> Result<Flash<Redirect>, AppError> {
    require(user.as_ref(), Permission::ManageOptions)?;
    let campaign = campaign_by_public_id(&db, caches, pid).await?;
    let back = Redirect::to(format!("/polls/{}/options", campaign.public_id));

    let label = form.label.trim().to_string();
    if label.is_empty() {
        return Ok(Flash::error(back, "Please enter a label for the option."));
    }

    let option = NewCampaignOption {
        public_id: public_id(),
        campaign_id: campaign.id,
        label: label.clone(),
        description: non_empty(form.description.clone()),
    };
    db.interact(move |conn| {
        diesel::insert_into(campaign_options::table)
            .values(&option)
            .execute(conn)
    })
    .await?;
    caches.invalidate_options(campaign.id);

    Ok(Flash::success(back, format!("Added \"{label}\".")))
}
