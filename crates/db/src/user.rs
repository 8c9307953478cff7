use std::fmt;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::{
    http::{Cookie, CookieJar, Status},
    outcome::try_outcome,
    request::{self, FromRequest},
    Request,
};
use serde::{Deserialize, Serialize};

use crate::{schema, DbConn};

pub const LOGIN_COOKIE: &str = "pollbooth_session";

/// Whether an account may administer polls. Fixed when the account is
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "student" => Some(Role::Student),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i64,
    /// Subject identifier of the account. Doubles as the voter id for
    /// signed-in voters.
    pub public_id: String,
    pub email: String,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub discipline: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub ug_pg: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    pub public_id: String,
    pub email: String,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub discipline: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub ug_pg: Option<String>,
    pub created_at: NaiveDateTime,
}

type WithEmail<'a> = diesel::dsl::Eq<schema::users::email, &'a str>;

type WithPublicId<'a> = diesel::dsl::Eq<schema::users::public_id, &'a str>;

impl User {
    pub fn with_email(email: &str) -> WithEmail<'_> {
        schema::users::email.eq(email)
    }

    pub fn with_public_id(pid: &str) -> WithPublicId<'_> {
        schema::users::public_id.eq(pid)
    }

    /// Unrecognised role strings are treated as the least privileged role.
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::Student)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn validate_email(email: &str) -> bool {
        static RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(
                r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
            )
            .unwrap()
        });
        RE.is_match(email)
    }

    pub fn validate_student_id(student_id: &str) -> bool {
        let trimmed = student_id.trim();
        !trimmed.is_empty()
            && trimmed.len() <= 32
            && trimmed.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

#[derive(Debug)]
pub enum AuthError {
    CookieMissingOrMalformed,
    NoDatabase,
    Unauthorized,
}

#[derive(Serialize, Deserialize)]
pub struct LoginSession {
    id: i64,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = AuthError;

    async fn from_request(
        request: &'r Request<'_>,
    ) -> request::Outcome<Self, AuthError> {
        let db = try_outcome!(request
            .guard::<DbConn>()
            .await
            .map_error(|(t, _)| (t, AuthError::NoDatabase)));

        let login_cookie = match request.cookies().get_private(LOGIN_COOKIE) {
            Some(cookie) => cookie,
            None => {
                return request::Outcome::Error((
                    Status::Unauthorized,
                    AuthError::CookieMissingOrMalformed,
                ));
            }
        };

        let login: LoginSession =
            match serde_json::from_str(login_cookie.value()) {
                Ok(t) => t,
                Err(error) => {
                    tracing::warn!(%error, "discarding malformed login cookie");
                    // a malformed cookie would otherwise stick around and
                    // keep the user from logging in again
                    request.cookies().remove_private(LOGIN_COOKIE);
                    return request::Outcome::Error((
                        Status::BadRequest,
                        AuthError::CookieMissingOrMalformed,
                    ));
                }
            };

        let user = db
            .interact(move |conn| {
                schema::users::table
                    .filter(schema::users::id.eq(login.id))
                    .select(User::as_select())
                    .first(conn)
                    .optional()
            })
            .await;

        match user {
            Ok(Some(user)) => request::Outcome::Success(user),
            Ok(None) => {
                request.cookies().remove_private(LOGIN_COOKIE);
                request::Outcome::Error((
                    Status::Unauthorized,
                    AuthError::Unauthorized,
                ))
            }
            Err(error) => {
                tracing::error!(%error, "could not load session user");
                request::Outcome::Error((
                    Status::InternalServerError,
                    AuthError::NoDatabase,
                ))
            }
        }
    }
}

pub fn set_login_cookie(id: i64, jar: &CookieJar<'_>) {
    let session = serde_json::json!({ "id": id }).to_string();
    jar.add_private(Cookie::new(LOGIN_COOKIE, session));
}
