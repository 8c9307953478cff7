use std::sync::Arc;

use db::{
    otp::OtpPurpose,
    schema::users,
    user::{set_login_cookie, User},
    DbConn,
};
use diesel::prelude::*;
use either::Either;
use maud::Markup;
use rocket::{
    form::Form,
    http::CookieJar,
    request::FlashMessage,
    response::{Flash, Redirect},
    State,
};
use serde::Serialize;
use ui::{page_of_body, page_of_body_and_flash_msg};

use crate::{
    auth::{code_form, hash_code, normalize_email, redeem_code, send_code, store_code},
    config::AppConfig,
    error::AppError,
    util::{flash_of, otp_code},
};

fn already_logged_in() -> Flash<Redirect> {
    Flash::error(Redirect::to("/polls"), "You are already logged in!")
}

fn login_form(error: Option<&str>) -> Markup {
    maud::html! {
        h1 { "Login" }
        @if let Some(error) = error {
            div class="alert alert-danger" role="alert" { (error) }
        }
        form method="post" action="/login" {
            div class="mb-3" {
                label for="email" class="form-label" { "Student email" }
                input type="email" class="form-control" id="email" name="email"
                    placeholder="you@university.edu" required;
            }
            button type="submit" class="btn btn-primary" { "Send code" }
        }
        p class="mt-3" {
            "No account yet? " a href="/signup" { "Sign up" } "."
        }
    }
}

#[get("/login")]
pub async fn login_page(
    user: Option<User>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Markup, Flash<Redirect>> {
    if user.is_some() {
        return Err(already_logged_in());
    }
    Ok(page_of_body_and_flash_msg(login_form(None), flash_of(flash), None))
}

#[derive(FromForm, Serialize, Debug)]
pub struct LoginForm {
    pub email: String,
}

#[post("/login", data = "<form>")]
pub async fn do_login(
    user: Option<User>,
    form: Form<LoginForm>,
    db: DbConn,
    config: &State<AppConfig>,
) -> Result<Either<Markup, Flash<Redirect>>, AppError> {
    if user.is_some() {
        return Ok(Either::Right(already_logged_in()));
    }

    let email = normalize_email(&form.email);
    if !User::validate_email(&email) {
        return Ok(Either::Left(page_of_body(
            login_form(Some("Please enter a valid email address.")),
            None,
        )));
    }

    let db = Arc::new(db);
    let code = otp_code();
    let code_hash = hash_code(&code)?;
    let ttl = config.otp_ttl();

    let lookup_email = email.clone();
    let known = db
        .interact(move |conn| {
            conn.transaction(|conn| -> Result<bool, diesel::result::Error> {
                let known = diesel::select(diesel::dsl::exists(
                    users::table.filter(User::with_email(&lookup_email)),
                ))
                .get_result::<bool>(conn)?;
                if known {
                    store_code(
                        &lookup_email,
                        OtpPurpose::Login,
                        code_hash,
                        ttl,
                        conn,
                    )?;
                }
                Ok(known)
            })
        })
        .await?;

    if !known {
        return Ok(Either::Right(Flash::error(
            Redirect::to("/signup"),
            "Please sign up first.",
        )));
    }

    send_code(&email, &code, OtpPurpose::Login, db).await?;

    Ok(Either::Left(page_of_body(
        code_form("/login/verify", &email, &[], None),
        None,
    )))
}

#[derive(FromForm, Serialize, Debug)]
pub struct LoginCodeForm {
    pub email: String,
    pub code: String,
}

#[post("/login/verify", data = "<form>")]
pub async fn verify_login(
    form: Form<LoginCodeForm>,
    db: DbConn,
    jar: &CookieJar<'_>,
) -> Result<Either<Markup, Redirect>, AppError> {
    let email = normalize_email(&form.email);
    let attempt = form.code.clone();

    let lookup_email = email.clone();
    let user = db
        .interact(move |conn| {
            conn.transaction(
                |conn| -> Result<Option<User>, diesel::result::Error> {
                    if !redeem_code(
                        &lookup_email,
                        OtpPurpose::Login,
                        &attempt,
                        conn,
                    )? {
                        return Ok(None);
                    }
                    users::table
                        .filter(User::with_email(&lookup_email))
                        .select(User::as_select())
                        .first(conn)
                        .optional()
                },
            )
        })
        .await?;

    match user {
        Some(user) => {
            tracing::info!(user = user.id, "logged in");
            set_login_cookie(user.id, jar);
            Ok(Either::Right(Redirect::to("/polls")))
        }
        None => Ok(Either::Left(page_of_body(
            code_form(
                "/login/verify",
                &email,
                &[],
                Some("Invalid or expired code."),
            ),
            None,
        ))),
    }
}
