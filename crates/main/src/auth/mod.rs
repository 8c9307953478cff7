//! Email one-time-code authentication.
//!
//! Both sign-up and login send a six digit code to the email address. The
//! code is stored argon2-hashed and can be redeemed once before it expires.
//! After [`MAX_FAILED_ATTEMPTS`] wrong guesses every outstanding code for the
//! address is retired and a new one has to be requested.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::Utc;
use db::{
    otp::{NewOtpCode, OtpCode, OtpPurpose, MAX_FAILED_ATTEMPTS},
    schema::otp_codes,
    DbConn,
};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use email::{send_mail, Mail};
use maud::Markup;

use crate::error::AppError;

pub mod account;
pub mod login;
pub mod logout;
pub mod signup;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_code(code: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(code.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AppError::Remote(format!("could not hash code: {error}")))
}

/// Records a new code, retiring any earlier code for the same address and
/// purpose so that only the most recent email works.
pub fn store_code(
    email: &str,
    purpose: OtpPurpose,
    code_hash: String,
    ttl: chrono::Duration,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> QueryResult<()> {
    diesel::update(
        otp_codes::table
            .filter(otp_codes::email.eq(email))
            .filter(otp_codes::purpose.eq(purpose.as_str()))
            .filter(otp_codes::already_used.eq(false)),
    )
    .set(otp_codes::already_used.eq(true))
    .execute(conn)?;

    let now = Utc::now().naive_utc();
    let n = diesel::insert_into(otp_codes::table)
        .values(NewOtpCode {
            email: email.to_string(),
            code_hash,
            purpose: purpose.as_str().to_string(),
            created_at: now,
            expires_at: now + ttl,
            already_used: false,
        })
        .execute(conn)?;
    debug_assert_eq!(n, 1);
    Ok(())
}

/// Marks the matching outstanding code as used. Returns whether one matched.
#[tracing::instrument(skip(attempt, conn))]
pub fn redeem_code(
    email: &str,
    purpose: OtpPurpose,
    attempt: &str,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> QueryResult<bool> {
    let attempt = attempt.trim();
    if attempt.len() != 6 || !attempt.chars().all(|c| c.is_ascii_digit()) {
        record_miss(email, purpose, conn)?;
        return Ok(false);
    }

    let outstanding = otp_codes::table
        .filter(OtpCode::outstanding_for(email, purpose))
        .order_by(otp_codes::created_at.desc())
        .select(OtpCode::as_select())
        .load(conn)?;

    for code in outstanding {
        let matches = PasswordHash::new(&code.code_hash)
            .map(|hash| {
                Argon2::default()
                    .verify_password(attempt.as_bytes(), &hash)
                    .is_ok()
            })
            .unwrap_or_else(|error| {
                tracing::warn!(%error, id = code.id, "unreadable code hash");
                false
            });
        if matches {
            diesel::update(otp_codes::table.filter(otp_codes::id.eq(code.id)))
                .set(otp_codes::already_used.eq(true))
                .execute(conn)?;
            return Ok(true);
        }
    }

    tracing::info!("code rejected");
    record_miss(email, purpose, conn)?;
    Ok(false)
}

/// Counts a wrong guess against every outstanding code for `email`, retiring
/// the ones that have run out of attempts.
fn record_miss(
    email: &str,
    purpose: OtpPurpose,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> QueryResult<()> {
    diesel::update(otp_codes::table.filter(OtpCode::outstanding_for(email, purpose)))
        .set(otp_codes::failed_attempts.eq(otp_codes::failed_attempts + 1))
        .execute(conn)?;

    let retired = diesel::update(
        otp_codes::table
            .filter(otp_codes::email.eq(email))
            .filter(otp_codes::purpose.eq(purpose.as_str()))
            .filter(otp_codes::already_used.eq(false))
            .filter(otp_codes::failed_attempts.ge(MAX_FAILED_ATTEMPTS)),
    )
    .set(otp_codes::already_used.eq(true))
    .execute(conn)?;
    if retired > 0 {
        tracing::warn!(retired, "too many wrong codes, retiring");
    }
    Ok(())
}

pub async fn send_code(
    email: &str,
    code: &str,
    purpose: OtpPurpose,
    db: Arc<DbConn>,
) -> Result<(), AppError> {
    let (subject, action) = match purpose {
        OtpPurpose::Login => ("Your Pollbooth login code", "log in"),
        OtpPurpose::Signup => ("Your Pollbooth sign-up code", "finish signing up"),
    };
    let html = maud::html! {
        p { "Hello," }
        p { "Use this code to " (action) ":" }
        p { strong { (code) } }
        p { "It expires in a few minutes. If you did not ask for it you can ignore this email." }
    };
    let text = format!(
        "Hello,\n\nUse this code to {action}: {code}\n\nIt expires in a few minutes. If you did not ask for it you can ignore this email.\n"
    );

    send_mail(
        vec![("", email)],
        Mail {
            subject,
            html: &html.into_string(),
            text: &text,
        },
        db,
    )
    .await
    .map_err(|error| {
        tracing::error!(%error, "could not send code");
        AppError::Remote(format!("Failed to send code: {error}"))
    })
}

/// The "enter the code we emailed you" form. `hidden` fields are carried
/// through to the verification request.
pub fn code_form(
    action: &str,
    email: &str,
    hidden: &[(&str, &str)],
    error: Option<&str>,
) -> Markup {
    maud::html! {
        h1 { "Check your email" }
        p { "We sent a 6-digit code to " strong { (email) } "." }
        @if let Some(error) = error {
            div class="alert alert-danger" role="alert" { (error) }
        }
        form method="post" action=(action) {
            input type="hidden" name="email" value=(email);
            @for (name, value) in hidden {
                input type="hidden" name=(name) value=(value);
            }
            div class="mb-3" {
                label for="code" class="form-label" { "Code" }
                input type="text" inputmode="numeric" pattern="[0-9]*"
                    class="form-control" id="code" name="code"
                    placeholder="6-digit code" required;
            }
            button type="submit" class="btn btn-primary" { "Verify" }
        }
    }
}
