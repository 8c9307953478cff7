use std::sync::Arc;

use chrono::Utc;
use db::{
    otp::OtpPurpose,
    schema::users,
    user::{set_login_cookie, NewUser, Role, User},
    DbConn,
};
use diesel::prelude::*;
use either::Either;
use maud::Markup;
use rocket::{
    form::Form,
    http::{Cookie, CookieJar},
    request::FlashMessage,
    response::{Flash, Redirect},
    State,
};
use serde::{Deserialize, Serialize};
use ui::{page_of_body, page_of_body_and_flash_msg};

use crate::{
    auth::{
        account::{demographic_fields, Demographics},
        code_form, hash_code, normalize_email, redeem_code, send_code,
        store_code,
    },
    config::AppConfig,
    error::AppError,
    util::{flash_of, non_empty, otp_code, public_id},
};

/// Holds the verified email and chosen role between code verification and
/// the details form.
pub const SIGNUP_COOKIE: &str = "pending_signup";

#[derive(Serialize, Deserialize, Debug)]
struct PendingSignup {
    email: String,
    role: Role,
}

const ACCOUNT_EXISTS: &str =
    "An account with this email already exists. Please login instead.";

fn signup_form(error: Option<&str>) -> Markup {
    maud::html! {
        h1 { "Sign up" }
        @if let Some(error) = error {
            div class="alert alert-danger" role="alert" { (error) }
        }
        form method="post" action="/signup" {
            div class="mb-3" {
                label for="email" class="form-label" { "Student email" }
                input type="email" class="form-control" id="email" name="email"
                    placeholder="you@university.edu" required;
            }
            div class="mb-3" {
                label for="role" class="form-label" { "Role" }
                select class="form-select" id="role" name="role" {
                    option value="student" selected { "Student" }
                    option value="admin" { "Admin" }
                }
            }
            button type="submit" class="btn btn-primary" { "Send code" }
        }
        p class="mt-3" {
            "Already registered? " a href="/login" { "Login" } "."
        }
    }
}

fn details_form(email: &str, error: Option<&str>) -> Markup {
    maud::html! {
        h1 { "Your details" }
        p { "Signing up as " strong { (email) } "." }
        @if let Some(error) = error {
            div class="alert alert-danger" role="alert" { (error) }
        }
        form method="post" action="/signup/details" {
            div class="mb-3" {
                label for="first_name" class="form-label" { "First name" }
                input type="text" class="form-control" id="first_name"
                    name="first_name" placeholder="e.g. Alex" required;
            }
            div class="mb-3" {
                label for="last_name" class="form-label" { "Last name" }
                input type="text" class="form-control" id="last_name"
                    name="last_name" placeholder="e.g. Tan" required;
            }
            div class="mb-3" {
                label for="student_id" class="form-label" { "Student ID" }
                input type="text" class="form-control" id="student_id"
                    name="student_id" placeholder="e.g. 12345678" required;
            }
            (demographic_fields(&Demographics::default()))
            button type="submit" class="btn btn-primary" { "Create account" }
        }
    }
}

#[get("/signup")]
pub async fn signup_page(
    user: Option<User>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Markup, Flash<Redirect>> {
    if user.is_some() {
        return Err(Flash::error(
            Redirect::to("/polls"),
            "You are already logged in!",
        ));
    }
    Ok(page_of_body_and_flash_msg(signup_form(None), flash_of(flash), None))
}

#[derive(FromForm, Serialize, Debug)]
pub struct SignupForm {
    pub email: String,
    pub role: String,
}

#[post("/signup", data = "<form>")]
pub async fn do_signup(
    form: Form<SignupForm>,
    db: DbConn,
    config: &State<AppConfig>,
) -> Result<Markup, AppError> {
    let email = normalize_email(&form.email);
    if !User::validate_email(&email) {
        return Ok(page_of_body(
            signup_form(Some("Please enter a valid email address.")),
            None,
        ));
    }
    let Some(role) = Role::parse(&form.role) else {
        return Ok(page_of_body(
            signup_form(Some("Please choose a role.")),
            None,
        ));
    };

    let db = Arc::new(db);
    let code = otp_code();
    let code_hash = hash_code(&code)?;
    let ttl = config.otp_ttl();

    let lookup_email = email.clone();
    let taken = db
        .interact(move |conn| {
            conn.transaction(|conn| -> Result<bool, diesel::result::Error> {
                let taken = diesel::select(diesel::dsl::exists(
                    users::table.filter(User::with_email(&lookup_email)),
                ))
                .get_result::<bool>(conn)?;
                if !taken {
                    store_code(
                        &lookup_email,
                        OtpPurpose::Signup,
                        code_hash,
                        ttl,
                        conn,
                    )?;
                }
                Ok(taken)
            })
        })
        .await?;

    if taken {
        return Ok(page_of_body(signup_form(Some(ACCOUNT_EXISTS)), None));
    }

    send_code(&email, &code, OtpPurpose::Signup, db).await?;

    Ok(page_of_body(
        code_form("/signup/verify", &email, &[("role", role.as_str())], None),
        None,
    ))
}

#[derive(FromForm, Serialize, Debug)]
pub struct SignupCodeForm {
    pub email: String,
    pub role: String,
    pub code: String,
}

#[post("/signup/verify", data = "<form>")]
pub async fn verify_signup(
    form: Form<SignupCodeForm>,
    db: DbConn,
    jar: &CookieJar<'_>,
) -> Result<Markup, AppError> {
    let email = normalize_email(&form.email);
    let role = Role::parse(&form.role).ok_or_else(|| {
        AppError::Validation("Please choose a role.".to_string())
    })?;
    let attempt = form.code.clone();

    let lookup_email = email.clone();
    let redeemed = db
        .interact(move |conn| {
            conn.transaction(|conn| {
                redeem_code(&lookup_email, OtpPurpose::Signup, &attempt, conn)
            })
        })
        .await?;

    if !redeemed {
        return Ok(page_of_body(
            code_form(
                "/signup/verify",
                &email,
                &[("role", role.as_str())],
                Some("Invalid or expired code."),
            ),
            None,
        ));
    }

    let pending = serde_json::to_string(&PendingSignup {
        email: email.clone(),
        role,
    })
    .map_err(|error| AppError::Remote(error.to_string()))?;
    let mut cookie = Cookie::new(SIGNUP_COOKIE, pending);
    cookie.set_max_age(rocket::time::Duration::minutes(30));
    jar.add_private(cookie);

    Ok(page_of_body(details_form(&email, None), None))
}

#[derive(FromForm, Serialize, Debug, Default)]
pub struct DetailsForm {
    pub first_name: String,
    pub last_name: String,
    pub student_id: String,
    pub discipline: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub ug_pg: Option<String>,
}

#[post("/signup/details", data = "<form>")]
pub async fn complete_signup(
    form: Form<DetailsForm>,
    db: DbConn,
    jar: &CookieJar<'_>,
) -> Result<Either<Markup, Flash<Redirect>>, AppError> {
    let pending: Option<PendingSignup> = jar
        .get_private(SIGNUP_COOKIE)
        .and_then(|cookie| serde_json::from_str(cookie.value()).ok());
    let Some(pending) = pending else {
        return Ok(Either::Right(Flash::error(
            Redirect::to("/signup"),
            "Your sign-up session has expired. Please start again.",
        )));
    };

    let form = form.into_inner();
    let first_name = form.first_name.trim().to_string();
    let last_name = form.last_name.trim().to_string();
    if first_name.is_empty() || last_name.is_empty() {
        return Ok(Either::Left(page_of_body(
            details_form(&pending.email, Some("Please enter your name.")),
            None,
        )));
    }
    if !User::validate_student_id(&form.student_id) {
        return Ok(Either::Left(page_of_body(
            details_form(
                &pending.email,
                Some("Please enter a valid student ID."),
            ),
            None,
        )));
    }

    let new_user = NewUser {
        public_id: public_id(),
        email: pending.email.clone(),
        student_id: form.student_id.trim().to_string(),
        first_name,
        last_name,
        role: pending.role.as_str().to_string(),
        discipline: non_empty(form.discipline),
        gender: non_empty(form.gender),
        location: non_empty(form.location),
        ug_pg: non_empty(form.ug_pg),
        created_at: Utc::now().naive_utc(),
    };

    let created = db
        .interact(move |conn| {
            conn.transaction(
                |conn| -> Result<Option<i64>, diesel::result::Error> {
                    let taken = diesel::select(diesel::dsl::exists(
                        users::table.filter(User::with_email(&new_user.email)),
                    ))
                    .get_result::<bool>(conn)?;
                    if taken {
                        return Ok(None);
                    }
                    diesel::insert_into(users::table)
                        .values(&new_user)
                        .returning(users::id)
                        .get_result::<i64>(conn)
                        .map(Some)
                },
            )
        })
        .await?;

    jar.remove_private(SIGNUP_COOKIE);
    let Some(id) = created else {
        return Err(AppError::Duplicate(ACCOUNT_EXISTS.to_string()));
    };

    tracing::info!(user = id, role = %pending.role, "account created");
    set_login_cookie(id, jar);
    Ok(Either::Right(Flash::success(
        Redirect::to("/polls"),
        "Welcome to Pollbooth!",
    )))
}
