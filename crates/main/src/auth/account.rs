use db::{schema::users, user::User, DbConn};
use diesel::prelude::*;
use either::Either;
use maud::Markup;
use rocket::{
    form::Form,
    request::FlashMessage,
    response::{Flash, Redirect},
};
use serde::Serialize;
use ui::page_of_body_and_flash_msg;

use crate::{
    demographics::{DISCIPLINES, LOCATIONS},
    error::AppError,
    util::{flash_of, non_empty},
};

/// Optional self-described fields used by the poll summary.
#[derive(Debug, Clone, Default)]
pub struct Demographics {
    pub discipline: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub ug_pg: Option<String>,
}

impl Demographics {
    fn of(user: &User) -> Demographics {
        Demographics {
            discipline: user.discipline.clone(),
            gender: user.gender.clone(),
            location: user.location.clone(),
            ug_pg: user.ug_pg.clone(),
        }
    }
}

fn select_field(
    name: &str,
    label: &str,
    choices: &[(&str, &str)],
    current: Option<&str>,
) -> Markup {
    maud::html! {
        div class="mb-3" {
            label for=(name) class="form-label" { (label) }
            select class="form-select" id=(name) name=(name) {
                option value="" selected[current.is_none()] { "Prefer not to say" }
                @for (value, text) in choices {
                    option value=(value) selected[current == Some(*value)] { (text) }
                }
            }
        }
    }
}

pub fn demographic_fields(current: &Demographics) -> Markup {
    maud::html! {
        (select_field("discipline", "Faculty", &DISCIPLINES, current.discipline.as_deref()))
        (select_field(
            "gender",
            "Gender",
            &[("female", "Female"), ("male", "Male"), ("other", "Other")],
            current.gender.as_deref(),
        ))
        (select_field("location", "Campus", &LOCATIONS, current.location.as_deref()))
        (select_field(
            "ug_pg",
            "Level of study",
            &[("UG", "Undergraduate"), ("PG", "Postgraduate")],
            current.ug_pg.as_deref(),
        ))
    }
}

fn login_first() -> Flash<Redirect> {
    Flash::error(Redirect::to("/login"), "Please log in first.")
}

#[get("/account")]
pub async fn account_page(
    user: Option<User>,
    flash: Option<FlashMessage<'_>>,
) -> Either<Markup, Flash<Redirect>> {
    let Some(user) = user else {
        return Either::Right(login_first());
    };

    let markup = maud::html! {
        h1 { "Your account" }
        dl class="row" {
            dt class="col-sm-3" { "Email" }
            dd class="col-sm-9" { (user.email) }
            dt class="col-sm-3" { "Student ID" }
            dd class="col-sm-9" { (user.student_id) }
            dt class="col-sm-3" { "Role" }
            dd class="col-sm-9" { (user.role()) }
        }
        form method="post" action="/account" {
            div class="mb-3" {
                label for="first_name" class="form-label" { "First name" }
                input type="text" class="form-control" id="first_name"
                    name="first_name" value=(user.first_name) required;
            }
            div class="mb-3" {
                label for="last_name" class="form-label" { "Last name" }
                input type="text" class="form-control" id="last_name"
                    name="last_name" value=(user.last_name) required;
            }
            (demographic_fields(&Demographics::of(&user)))
            button type="submit" class="btn btn-primary" { "Save" }
        }
    };

    Either::Left(page_of_body_and_flash_msg(markup, flash_of(flash), Some(user)))
}

#[derive(FromForm, Serialize, Debug)]
pub struct AccountForm {
    pub first_name: String,
    pub last_name: String,
    pub discipline: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub ug_pg: Option<String>,
}

#[post("/account", data = "<form>")]
pub async fn update_account(
    user: Option<User>,
    form: Form<AccountForm>,
    db: DbConn,
) -> Result<Flash<Redirect>, AppError> {
    let Some(user) = user else {
        return Ok(login_first());
    };

    let form = form.into_inner();
    let first_name = form.first_name.trim().to_string();
    let last_name = form.last_name.trim().to_string();
    if first_name.is_empty() || last_name.is_empty() {
        return Ok(Flash::error(
            Redirect::to("/account"),
            "Please enter your name.",
        ));
    }

    db.interact(move |conn| {
        diesel::update(users::table.filter(users::id.eq(user.id)))
            .set((
                users::first_name.eq(first_name),
                users::last_name.eq(last_name),
                users::discipline.eq(non_empty(form.discipline)),
                users::gender.eq(non_empty(form.gender)),
                users::location.eq(non_empty(form.location)),
                users::ug_pg.eq(non_empty(form.ug_pg)),
            ))
            .execute(conn)
    })
    .await?;

    Ok(Flash::success(Redirect::to("/account"), "Your details were saved."))
}
