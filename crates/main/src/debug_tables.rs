//! An admin-only browser over the raw tables: list rows, delete a row by
//! primary key, and bulk-insert rows from a CSV file.

use std::collections::BTreeMap;

use db::{
    campaign::{Campaign, CampaignOption},
    email::EmailRow,
    otp::OtpCode,
    schema::{campaign_options, campaigns, emails, otp_codes, users, votes_single},
    user::User,
    vote::Vote,
    DbConn,
};
use diesel::{
    connection::LoadConnection,
    prelude::*,
    sql_types::{Nullable, Text},
    sqlite::Sqlite,
};
use itertools::Itertools;
use live::{BroadcastFeed, ChangeEvent, ChangeKind};
use maud::Markup;
use rocket::{
    form::Form,
    fs::TempFile,
    request::FlashMessage,
    response::{Flash, Redirect},
    tokio::{self, io::AsyncReadExt},
    State,
};
use serde::Serialize;
use serde_json::{Map, Value};
use ui::page_of_body_and_flash_msg;

use crate::{
    cache::Caches,
    csv,
    error::AppError,
    permissions::{require, Permission},
    util::flash_of,
};

pub const MAX_TABLES: usize = 20;
pub const ROW_LIMIT: i64 = 100;
pub const UPLOAD_CHUNK: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugTable {
    Users,
    Campaigns,
    CampaignOptions,
    VotesSingle,
    OtpCodes,
    Emails,
}

impl DebugTable {
    pub const ALL: [DebugTable; 6] = [
        DebugTable::Users,
        DebugTable::Campaigns,
        DebugTable::CampaignOptions,
        DebugTable::VotesSingle,
        DebugTable::OtpCodes,
        DebugTable::Emails,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DebugTable::Users => "users",
            DebugTable::Campaigns => "campaigns",
            DebugTable::CampaignOptions => "campaign_options",
            DebugTable::VotesSingle => "votes_single",
            DebugTable::OtpCodes => "otp_codes",
            DebugTable::Emails => "emails",
        }
    }

    pub fn from_name(name: &str) -> Option<DebugTable> {
        DebugTable::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            DebugTable::Users => &[
                "id",
                "public_id",
                "email",
                "student_id",
                "first_name",
                "last_name",
                "role",
                "discipline",
                "gender",
                "location",
                "ug_pg",
                "created_at",
            ],
            DebugTable::Campaigns => &[
                "id",
                "public_id",
                "title",
                "description",
                "club",
                "code",
                "vote_type",
                "starts_at",
                "ends_at",
                "is_published",
                "host_id",
                "created_at",
            ],
            DebugTable::CampaignOptions => {
                &["id", "public_id", "campaign_id", "label", "description"]
            }
            DebugTable::VotesSingle => {
                &["id", "campaign_id", "option_id", "voter_id", "created_at"]
            }
            DebugTable::OtpCodes => &[
                "id",
                "email",
                "code_hash",
                "purpose",
                "created_at",
                "expires_at",
                "already_used",
                "failed_attempts",
            ],
            DebugTable::Emails => {
                &["id", "message_id", "recipients", "created_at"]
            }
        }
    }
}

/// The table names asked for in `?tables=a,b`, at most [`MAX_TABLES`] of
/// them. With nothing asked for, every table.
pub fn requested_tables(tables: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in tables.unwrap_or_default().split(',') {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    if out.is_empty() {
        out = DebugTable::ALL.iter().map(|t| t.name().to_string()).collect();
    }
    out.truncate(MAX_TABLES);
    out
}

type JsonRow = Map<String, Value>;

fn to_json_rows<T: Serialize>(rows: Vec<T>) -> Vec<JsonRow> {
    rows.into_iter()
        .filter_map(|row| match serde_json::to_value(row) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => None,
            Err(error) => {
                tracing::warn!(%error, "could not serialize row");
                None
            }
        })
        .collect()
}

/// The newest [`ROW_LIMIT`] rows of `table`.
pub fn load_rows(
    table: DebugTable,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> QueryResult<Vec<JsonRow>> {
    Ok(match table {
        DebugTable::Users => to_json_rows(
            users::table
                .order_by(users::id.desc())
                .limit(ROW_LIMIT)
                .select(User::as_select())
                .load(conn)?,
        ),
        DebugTable::Campaigns => to_json_rows(
            campaigns::table
                .order_by(campaigns::id.desc())
                .limit(ROW_LIMIT)
                .select(Campaign::as_select())
                .load(conn)?,
        ),
        DebugTable::CampaignOptions => to_json_rows(
            campaign_options::table
                .order_by(campaign_options::id.desc())
                .limit(ROW_LIMIT)
                .select(CampaignOption::as_select())
                .load(conn)?,
        ),
        DebugTable::VotesSingle => to_json_rows(
            votes_single::table
                .order_by(votes_single::id.desc())
                .limit(ROW_LIMIT)
                .select(Vote::as_select())
                .load(conn)?,
        ),
        DebugTable::OtpCodes => to_json_rows(
            otp_codes::table
                .order_by(otp_codes::id.desc())
                .limit(ROW_LIMIT)
                .select(OtpCode::as_select())
                .load(conn)?,
        ),
        DebugTable::Emails => to_json_rows(
            emails::table
                .order_by(emails::id.desc())
                .limit(ROW_LIMIT)
                .select(EmailRow::as_select())
                .load(conn)?,
        ),
    })
}

/// What a deletion removed. Deleting a vote reports its campaign so that
/// live views can be told.
#[derive(Debug, PartialEq, Eq)]
pub enum Deleted {
    Nothing,
    Row,
    Vote { campaign_id: i64 },
}

pub fn delete_row(
    table: DebugTable,
    id: i64,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> QueryResult<Deleted> {
    let n = match table {
        DebugTable::VotesSingle => {
            return Ok(diesel::delete(
                votes_single::table.filter(votes_single::id.eq(id)),
            )
            .returning(votes_single::campaign_id)
            .get_result::<i64>(conn)
            .optional()?
            .map_or(Deleted::Nothing, |campaign_id| Deleted::Vote {
                campaign_id,
            }))
        }
        DebugTable::Users => {
            diesel::delete(users::table.filter(users::id.eq(id))).execute(conn)?
        }
        DebugTable::Campaigns => diesel::delete(
            campaigns::table.filter(campaigns::id.eq(id)),
        )
        .execute(conn)?,
        DebugTable::CampaignOptions => diesel::delete(
            campaign_options::table.filter(campaign_options::id.eq(id)),
        )
        .execute(conn)?,
        DebugTable::OtpCodes => diesel::delete(
            otp_codes::table.filter(otp_codes::id.eq(id)),
        )
        .execute(conn)?,
        DebugTable::Emails => {
            diesel::delete(emails::table.filter(emails::id.eq(id)))
                .execute(conn)?
        }
    };
    Ok(if n == 0 { Deleted::Nothing } else { Deleted::Row })
}

pub type CsvRecord = BTreeMap<String, Option<String>>;

/// Inserts the rows of a CSV file (first line naming the columns) into
/// `table`, [`UPLOAD_CHUNK`] rows per statement, all in one transaction.
/// Returns the inserted records.
pub fn insert_csv(
    table: DebugTable,
    text: &str,
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
) -> Result<Vec<CsvRecord>, AppError> {
    let (header, records) = csv::parse_with_headers(text);
    if records.is_empty() {
        return Ok(records);
    }
    if let Some(unknown) =
        header.iter().find(|h| !table.columns().contains(&h.as_str()))
    {
        return Err(AppError::Validation(format!(
            "Unknown column \"{unknown}\" for table \"{}\".",
            table.name()
        )));
    }

    let column_list = header.iter().map(|h| format!("\"{h}\"")).join(", ");
    let placeholders =
        format!("({})", vec!["?"; header.len()].join(", "));

    conn.transaction(|conn| -> Result<(), AppError> {
        for chunk in records.chunks(UPLOAD_CHUNK) {
            let sql = format!(
                "INSERT INTO \"{}\" ({column_list}) VALUES {}",
                table.name(),
                vec![placeholders.as_str(); chunk.len()].join(", ")
            );
            let mut query = diesel::sql_query(sql).into_boxed::<Sqlite>();
            for record in chunk {
                for column in &header {
                    let value = record.get(column).cloned().flatten();
                    query = query.bind::<Nullable<Text>, _>(value);
                }
            }
            query.execute(conn)?;
        }
        Ok(())
    })?;

    Ok(records)
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn table_card(table: DebugTable, rows: &[JsonRow]) -> Markup {
    let name = table.name();
    maud::html! {
        div class="card mb-4" {
            div class="card-header d-flex justify-content-between" {
                strong { (name) }
                span class="text-muted" { (rows.len()) " rows" }
            }
            div class="card-body" {
                form class="row g-2 mb-3" method="post" enctype="multipart/form-data"
                    action=(format!("/debug/db/{name}/upload")) {
                    div class="col-auto" {
                        input class="form-control form-control-sm" type="file" name="file" accept=".csv,text/csv";
                    }
                    div class="col-auto" {
                        button type="submit" class="btn btn-outline-primary btn-sm" { "Upload CSV" }
                    }
                }
                div class="table-responsive" {
                    table class="table table-sm table-striped" {
                        thead {
                            tr {
                                @for column in table.columns() {
                                    th { (column) }
                                }
                                th {}
                            }
                        }
                        tbody {
                            @for row in rows {
                                tr {
                                    @for column in table.columns() {
                                        td { (row.get(*column).map(cell).unwrap_or_default()) }
                                    }
                                    td {
                                        @if let Some(id) = row.get("id").and_then(Value::as_i64) {
                                            form method="post" action=(format!("/debug/db/{name}/{id}/delete")) {
                                                button type="submit" class="btn btn-danger btn-sm" { "Delete" }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[get("/debug/db?<tables>")]
pub async fn tables_page(
    tables: Option<String>,
    user: Option<User>,
    flash: Option<FlashMessage<'_>>,
    db: DbConn,
) -> Result<Markup, AppError> {
    require(user.as_ref(), Permission::BrowseTables)?;
    let names = requested_tables(tables.as_deref());

    let loaded = db
        .interact(move |conn| -> QueryResult<Vec<(String, Option<(DebugTable, Vec<JsonRow>)>)>> {
            names
                .into_iter()
                .map(|name| match DebugTable::from_name(&name) {
                    Some(table) => {
                        load_rows(table, conn).map(|rows| (name, Some((table, rows))))
                    }
                    None => Ok((name, None)),
                })
                .collect()
        })
        .await?;

    let markup = maud::html! {
        h1 { "Tables" }
        form class="row g-2 mb-3" method="get" action="/debug/db" {
            div class="col" {
                input class="form-control" type="text" name="tables"
                    placeholder=(DebugTable::ALL.iter().map(DebugTable::name).join(","));
            }
            div class="col-auto" {
                button type="submit" class="btn btn-secondary" { "Show" }
            }
        }
        @for (name, table) in &loaded {
            @match table {
                Some((table, rows)) => {
                    (table_card(*table, rows))
                }
                None => {
                    div class="alert alert-danger" { "Unknown table \"" (name) "\"." }
                }
            }
        }
    };

    Ok(page_of_body_and_flash_msg(markup, flash_of(flash), user))
}

fn back_to(table: DebugTable) -> Redirect {
    Redirect::to(format!("/debug/db?tables={}", table.name()))
}

fn known_table(name: &str) -> Result<DebugTable, AppError> {
    DebugTable::from_name(name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown table \"{name}\".")))
}

#[post("/debug/db/<table>/<id>/delete")]
pub async fn delete_table_row(
    table: &str,
    id: i64,
    user: Option<User>,
    db: DbConn,
    feed: &State<BroadcastFeed>,
    caches: &State<Caches>,
) -> Result<Flash<Redirect>, AppError> {
    require(user.as_ref(), Permission::BrowseTables)?;
    let table = known_table(table)?;

    let deleted = db.interact(move |conn| delete_row(table, id, conn)).await?;
    tracing::info!(table = table.name(), id, ?deleted, "row deleted from table browser");

    match deleted {
        Deleted::Nothing => Ok(Flash::error(
            back_to(table),
            format!("No row with id {id}."),
        )),
        Deleted::Row => {
            if matches!(table, DebugTable::Campaigns | DebugTable::CampaignOptions) {
                caches.clear();
            }
            Ok(Flash::success(back_to(table), format!("Deleted row {id}.")))
        }
        Deleted::Vote { campaign_id } => {
            feed.publish(
                ChangeEvent::new(table.name(), ChangeKind::Delete)
                    .with("id", id)
                    .with("campaign_id", campaign_id),
            );
            Ok(Flash::success(back_to(table), format!("Deleted row {id}.")))
        }
    }
}

#[derive(FromForm)]
pub struct UploadForm<'r> {
    pub file: TempFile<'r>,
}

#[post("/debug/db/<table>/upload", data = "<form>")]
pub async fn upload_csv(
    table: &str,
    user: Option<User>,
    form: Form<UploadForm<'_>>,
    db: DbConn,
    feed: &State<BroadcastFeed>,
    caches: &State<Caches>,
) -> Result<Flash<Redirect>, AppError> {
    require(user.as_ref(), Permission::BrowseTables)?;
    let table = known_table(table)?;

    let unreadable =
        |e: std::io::Error| AppError::Validation(format!("Could not read upload: {e}"));
    let reader = form.file.open().await.map_err(unreadable)?;
    tokio::pin!(reader);
    let mut text = String::new();
    reader.read_to_string(&mut text).await.map_err(unreadable)?;

    let inserted = match db.interact(move |conn| insert_csv(table, &text, conn)).await {
        Ok(inserted) => inserted,
        Err(error) => return Ok(Flash::error(back_to(table), error.to_string())),
    };
    if inserted.is_empty() {
        return Ok(Flash::error(back_to(table), "No rows found in CSV."));
    }

    tracing::info!(table = table.name(), rows = inserted.len(), "rows uploaded");
    match table {
        DebugTable::VotesSingle => {
            for record in &inserted {
                let mut event = ChangeEvent::new(table.name(), ChangeKind::Insert);
                for (column, value) in record {
                    if let Some(value) = value {
                        event = event.with(column, value);
                    }
                }
                feed.publish(event);
            }
        }
        DebugTable::Campaigns | DebugTable::CampaignOptions => caches.clear(),
        _ => {}
    }

    Ok(Flash::success(
        back_to(table),
        format!("Uploaded {} rows.", inserted.len()),
    ))
}
