use chrono::{NaiveDateTime, Utc};
use diesel::{prelude::*, sql_types::Bool, sqlite::Sqlite};
use serde::Serialize;

use crate::schema::otp_codes;

/// Wrong guesses after which outstanding codes are retired.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// What a one-time code was issued for. A sign-in code cannot be used to
/// finish a sign-up and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Login,
    Signup,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Signup => "signup",
        }
    }
}

#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = otp_codes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OtpCode {
    pub id: i64,
    pub email: String,
    /// argon2 hash of the six digit code.
    pub code_hash: String,
    pub purpose: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub already_used: bool,
    /// Wrong guesses made while this code was outstanding.
    pub failed_attempts: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = otp_codes)]
pub struct NewOtpCode {
    pub email: String,
    pub code_hash: String,
    pub purpose: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub already_used: bool,
}

impl OtpCode {
    /// Unused, unexpired codes issued to `email` for `purpose`.
    pub fn outstanding_for<'a>(
        email: &'a str,
        purpose: OtpPurpose,
    ) -> Box<dyn BoxableExpression<otp_codes::table, Sqlite, SqlType = Bool> + 'a>
    {
        Box::new(
            otp_codes::email
                .eq(email)
                .and(otp_codes::purpose.eq(purpose.as_str()))
                .and(otp_codes::expires_at.gt(Utc::now().naive_utc()))
                .and(otp_codes::already_used.eq(false)),
        )
    }
}
