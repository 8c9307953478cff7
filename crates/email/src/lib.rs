//! Sends emails.
//!
//! Debug builds never talk to an SMTP server: the message is written to the
//! log instead, which is how one-time codes are read during development.
use std::sync::Arc;

use db::DbConn;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("missing mail setting `{0}`")]
    MissingSetting(&'static str),
    #[error("invalid address `{0}`")]
    Address(String),
    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("could not reach mail server: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Plain-text and html renderings of one message.
pub struct Mail<'a> {
    pub subject: &'a str,
    pub html: &'a str,
    pub text: &'a str,
}

#[cfg(debug_assertions)]
pub async fn send_mail(
    to: Vec<(&str, &str)>,
    mail: Mail<'_>,
    _db: Arc<DbConn>,
) -> Result<(), MailError> {
    let recipients = format_recipients(&to);
    tracing::info!(
        %recipients,
        subject = mail.subject,
        body = mail.text,
        "not sending mail in a debug build"
    );
    Ok(())
}

#[cfg(not(debug_assertions))]
pub async fn send_mail(
    to: Vec<(&str, &str)>,
    mail: Mail<'_>,
    db: Arc<DbConn>,
) -> Result<(), MailError> {
    send_mail_internal(to, mail, db)
}

fn format_recipients(to: &[(&str, &str)]) -> String {
    to.iter()
        .map(|(name, email)| format!("{name} <{email}>"))
        .collect::<Vec<_>>()
        .join(",")
}

fn setting(key: &'static str) -> Result<String, MailError> {
    std::env::var(key).map_err(|_| MailError::MissingSetting(key))
}

/// Builds the message and hands it to a background task. Delivery failures
/// after this point are logged, not returned.
#[allow(unused)]
fn send_mail_internal(
    to: Vec<(&str, &str)>,
    mail: Mail<'_>,
    db: Arc<DbConn>,
) -> Result<(), MailError> {
    use db::email::NewEmailRow;
    use db::schema::emails;
    use diesel::prelude::*;
    use lettre::{
        message::{header::ContentType, MultiPart, SinglePart},
        transport::smtp::authentication::Credentials,
        AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    };
    use uuid::Uuid;

    let mut msg = Message::builder()
        .from(
            setting("SMTP_FROM")?
                .parse()
                .map_err(|_| MailError::Address("SMTP_FROM".to_string()))?,
        )
        .subject(mail.subject);
    for (name, email) in &to {
        let mailbox = format!("{name} <{email}>");
        msg = msg.to(mailbox
            .parse()
            .map_err(|_| MailError::Address(mailbox.clone()))?)
    }

    let msg_id = format!("{}@{}", Uuid::now_v7(), setting("SMTP_DOMAIN")?);

    let msg = msg.message_id(Some(msg_id.clone())).multipart(
        MultiPart::alternative()
            .singlepart(
                SinglePart::builder()
                    .content_type(ContentType::TEXT_PLAIN)
                    .body(mail.text.to_string()),
            )
            .singlepart(
                SinglePart::builder()
                    .content_type(ContentType::TEXT_HTML)
                    .body(mail.html.to_string()),
            ),
    )?;

    let creds =
        Credentials::new(setting("SMTP_USERNAME")?, setting("SMTP_PASSWORD")?);
    let mailer: AsyncSmtpTransport<Tokio1Executor> =
        AsyncSmtpTransport::<Tokio1Executor>::relay(&setting("SMTP_HOST")?)?
            .credentials(creds)
            .build();

    let recipients = format_recipients(&to);

    rocket::tokio::spawn(async move {
        if let Err(error) = mailer.send(msg).await {
            tracing::error!(%error, %recipients, "mail delivery failed");
            return;
        }
        let logged = db
            .interact(move |conn| {
                diesel::insert_into(emails::table)
                    .values(NewEmailRow {
                        message_id: msg_id,
                        recipients,
                        created_at: chrono::Utc::now().naive_utc(),
                    })
                    .execute(conn)
            })
            .await;
        if let Err(error) = logged {
            tracing::warn!(%error, "could not record sent mail");
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_are_comma_separated_mailboxes() {
        assert_eq!(
            format_recipients(&[("Ada", "ada@example.edu"), ("", "b@x.io")]),
            "Ada <ada@example.edu>, <b@x.io>"
        );
    }
}
