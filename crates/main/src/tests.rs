//! End-to-end flows through the HTTP interface, each against its own
//! throw-away database.

use chrono::{Duration, NaiveDateTime, Utc};
use db::{
    campaign::{Campaign, CampaignOption, NewCampaign, NewCampaignOption},
    otp::{OtpPurpose, MAX_FAILED_ATTEMPTS},
    schema::{campaign_options, campaigns, users, votes_single},
    user::{NewUser, User},
    vote::{NewVote, Vote},
};
use diesel::prelude::*;
use diesel::SqliteConnection;
use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use tempfile::TempDir;
use trace_request::{tag_scope, RequestId};

use crate::{
    auth::{
        hash_code,
        login::{LoginCodeForm, LoginForm},
        signup::{DetailsForm, SignupCodeForm, SignupForm},
        store_code,
    },
    csv::BOM,
    debug_tables::{insert_csv, DebugTable},
    identity::VOTER_COOKIE,
    make_rocket,
    polls::{
        create::CreateCampaignForm, listing::JoinForm, options::OptionForm,
        vote::VoteForm,
    },
    util::public_id,
};

const CODE: &str = "123456";

/// The directory has to outlive the client, so it is handed back too.
fn get_test_rocket_instance() -> (Client, SqliteConnection, TempDir) {
    let dir = tempfile::tempdir().expect("could not create temp dir");
    let db_path = dir.path().join("pollbooth.db");
    let db_path = db_path.to_string_lossy().to_string();

    let client = Client::tracked(make_rocket(&db_path)).unwrap();

    let mut conn = SqliteConnection::establish(&db_path)
        .expect("Database connection failed");
    diesel::sql_query("PRAGMA foreign_keys=ON")
        .execute(&mut conn)
        .expect("Failed to enable foreign keys");
    diesel::sql_query("PRAGMA busy_timeout=5000")
        .execute(&mut conn)
        .expect("Failed to set busy timeout");

    (client, conn, dir)
}

fn form_body<T: serde::Serialize>(form: &T) -> String {
    serde_urlencoded::to_string(form).unwrap()
}

fn insert_user(conn: &mut SqliteConnection, email: &str, role: &str) -> User {
    diesel::insert_into(users::table)
        .values(NewUser {
            public_id: public_id(),
            email: email.to_string(),
            student_id: "12345678".to_string(),
            first_name: "Test".to_string(),
            last_name: role.to_string(),
            role: role.to_string(),
            discipline: Some("6".to_string()),
            gender: Some("female".to_string()),
            location: Some("1".to_string()),
            ug_pg: Some("UG".to_string()),
            created_at: Utc::now().naive_utc(),
        })
        .execute(conn)
        .unwrap();
    users::table
        .filter(User::with_email(email))
        .select(User::as_select())
        .first(conn)
        .unwrap()
}

/// Requests a login code, replaces it with a known one and redeems it.
fn log_in(client: &Client, conn: &mut SqliteConnection, email: &str) {
    let res = client
        .post("/login")
        .header(ContentType::Form)
        .body(form_body(&LoginForm {
            email: email.to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    store_code(
        email,
        OtpPurpose::Login,
        hash_code(CODE).unwrap(),
        Duration::minutes(10),
        conn,
    )
    .unwrap();

    let res = client
        .post("/login/verify")
        .header(ContentType::Form)
        .body(form_body(&LoginCodeForm {
            email: email.to_string(),
            code: CODE.to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);
    assert_eq!(res.headers().get_one("Location"), Some("/polls"));
}

fn make_campaign(
    conn: &mut SqliteConnection,
    host: &User,
    labels: &[&str],
) -> (Campaign, Vec<CampaignOption>) {
    let pid = public_id();
    diesel::insert_into(campaigns::table)
        .values(NewCampaign {
            public_id: pid.clone(),
            title: "President".to_string(),
            description: None,
            club: Some("Debating Society".to_string()),
            code: "ABC123".to_string(),
            vote_type: "single".to_string(),
            starts_at: None,
            ends_at: None,
            is_published: true,
            host_id: host.public_id.clone(),
            created_at: Utc::now().naive_utc(),
        })
        .execute(conn)
        .unwrap();
    let campaign = campaigns::table
        .filter(Campaign::with_public_id(&pid))
        .select(Campaign::as_select())
        .first(conn)
        .unwrap();

    for label in labels {
        diesel::insert_into(campaign_options::table)
            .values(NewCampaignOption {
                public_id: public_id(),
                campaign_id: campaign.id,
                label: label.to_string(),
                description: None,
            })
            .execute(conn)
            .unwrap();
    }
    let options = campaign_options::table
        .filter(campaign_options::campaign_id.eq(campaign.id))
        .order_by(campaign_options::label.asc())
        .select(CampaignOption::as_select())
        .load(conn)
        .unwrap();

    (campaign, options)
}

fn votes_of(conn: &mut SqliteConnection, campaign_id: i64) -> Vec<Vote> {
    votes_single::table
        .filter(votes_single::campaign_id.eq(campaign_id))
        .select(Vote::as_select())
        .load(conn)
        .unwrap()
}

#[test]
fn signup_sequence() {
    let (client, mut conn, _dir) = get_test_rocket_instance();
    let email = "new.student@example.edu";

    let res = client
        .post("/signup")
        .header(ContentType::Form)
        .body(form_body(&SignupForm {
            email: email.to_string(),
            role: "student".to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    store_code(
        email,
        OtpPurpose::Signup,
        hash_code(CODE).unwrap(),
        Duration::minutes(10),
        &mut conn,
    )
    .unwrap();

    // a wrong code keeps the visitor on the code form
    let res = client
        .post("/signup/verify")
        .header(ContentType::Form)
        .body(form_body(&SignupCodeForm {
            email: email.to_string(),
            role: "student".to_string(),
            code: "000000".to_string(),
        }))
        .dispatch();
    assert!(res
        .into_string()
        .unwrap()
        .contains("Invalid or expired code."));

    let res = client
        .post("/signup/verify")
        .header(ContentType::Form)
        .body(form_body(&SignupCodeForm {
            email: email.to_string(),
            role: "student".to_string(),
            code: CODE.to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .post("/signup/details")
        .header(ContentType::Form)
        .body(form_body(&DetailsForm {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            student_id: "31415926".to_string(),
            discipline: Some("5".to_string()),
            ..Default::default()
        }))
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);
    assert_eq!(res.headers().get_one("Location"), Some("/polls"));

    let user = users::table
        .filter(User::with_email(email))
        .select(User::as_select())
        .first(&mut conn)
        .unwrap();
    assert_eq!(user.role, "student");
    assert_eq!(user.discipline.as_deref(), Some("5"));
    assert_eq!(user.gender, None);

    // signing up again with the same address is refused
    let res = client
        .post("/signup")
        .header(ContentType::Form)
        .body(form_body(&SignupForm {
            email: email.to_string(),
            role: "student".to_string(),
        }))
        .dispatch();
    assert!(res
        .into_string()
        .unwrap()
        .contains("An account with this email already exists."));
}

#[test]
fn unknown_emails_are_sent_to_signup() {
    let (client, _conn, _dir) = get_test_rocket_instance();

    let res = client
        .post("/login")
        .header(ContentType::Form)
        .body(form_body(&LoginForm {
            email: "nobody@example.edu".to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);
    assert_eq!(res.headers().get_one("Location"), Some("/signup"));
}

fn submit_login_code(client: &Client, email: &str, code: &str) -> Status {
    client
        .post("/login/verify")
        .header(ContentType::Form)
        .body(form_body(&LoginCodeForm {
            email: email.to_string(),
            code: code.to_string(),
        }))
        .dispatch()
        .status()
}

#[test]
fn wrong_codes_retire_the_login_code() {
    let (client, mut conn, _dir) = get_test_rocket_instance();
    insert_user(&mut conn, "student@example.edu", "student");

    let issue_code = |conn: &mut SqliteConnection| {
        store_code(
            "student@example.edu",
            OtpPurpose::Login,
            hash_code(CODE).unwrap(),
            Duration::minutes(10),
            conn,
        )
        .unwrap();
    };

    // a few typos still leave the code usable
    issue_code(&mut conn);
    for _ in 1..MAX_FAILED_ATTEMPTS {
        let res = client
            .post("/login/verify")
            .header(ContentType::Form)
            .body(form_body(&LoginCodeForm {
                email: "student@example.edu".to_string(),
                code: "000000".to_string(),
            }))
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
        assert!(res.into_string().unwrap().contains("Invalid or expired code."));
    }
    assert_eq!(
        submit_login_code(&client, "student@example.edu", CODE),
        Status::SeeOther
    );
    client.get("/logout").dispatch();

    // guessing through the code space does not work
    issue_code(&mut conn);
    for guess in 0..MAX_FAILED_ATTEMPTS * 8 {
        let guess = format!("{:06}", 900000 + guess);
        assert_eq!(
            submit_login_code(&client, "student@example.edu", &guess),
            Status::Ok
        );
    }
    assert_eq!(
        submit_login_code(&client, "student@example.edu", CODE),
        Status::Ok
    );
    let res = client.get("/account").dispatch();
    assert_eq!(res.status(), Status::SeeOther);
    assert_eq!(res.headers().get_one("Location"), Some("/login"));

    // a freshly requested code works again
    log_in(&client, &mut conn, "student@example.edu");
}

#[test]
fn anonymous_voters_are_remembered_by_cookie() {
    let (client, mut conn, _dir) = get_test_rocket_instance();
    let host = insert_user(&mut conn, "admin@example.edu", "admin");
    let (campaign, options) = make_campaign(&mut conn, &host, &["Alice", "Bob"]);
    let pid = campaign.public_id.clone();

    let res = client
        .post(format!("/polls/{pid}/join"))
        .header(ContentType::Form)
        .body(form_body(&JoinForm {
            code: "ABC123".to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);

    let res = client.get(format!("/poll/{pid}")).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .post(format!("/poll/{pid}/vote"))
        .header(ContentType::Form)
        .body(form_body(&VoteForm {
            option_id: options[1].public_id.clone(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    assert!(res.into_string().unwrap().contains("Vote submitted."));

    let res = client
        .post(format!("/poll/{pid}/vote"))
        .header(ContentType::Form)
        .body(form_body(&VoteForm {
            option_id: options[0].public_id.clone(),
        }))
        .dispatch();
    assert!(res
        .into_string()
        .unwrap()
        .contains("You have already voted in this poll."));

    let votes = votes_of(&mut conn, campaign.id);
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].option_id, options[1].id);

    let cookie = client
        .cookies()
        .get_private(VOTER_COOKIE)
        .expect("voter cookie was not set");
    assert_eq!(cookie.value(), votes[0].voter_id);
    assert_ne!(votes[0].voter_id, host.public_id);
    assert!(uuid::Uuid::parse_str(&votes[0].voter_id).is_ok());
}

#[test]
fn poll_lifecycle() {
    let (client, mut conn, _dir) = get_test_rocket_instance();
    insert_user(&mut conn, "admin@example.edu", "admin");
    let student = insert_user(&mut conn, "student@example.edu", "student");

    // (1) admin creates a poll and two options
    log_in(&client, &mut conn, "admin@example.edu");

    let res = client
        .post("/polls/new")
        .header(ContentType::Form)
        .body(form_body(&CreateCampaignForm {
            club: "Debating Society".to_string(),
            title: "President".to_string(),
            description: Some("Annual election".to_string()),
            code: " ABC123 ".to_string(),
            vote_type: "single".to_string(),
            starts_at: "2025-03-01T09:00".to_string(),
            ends_at: "2025-03-02T09:00".to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);

    let campaign = campaigns::table
        .order_by(campaigns::id.desc())
        .select(Campaign::as_select())
        .first(&mut conn)
        .unwrap();
    assert_eq!(campaign.code, "ABC123");
    assert!(!campaign.is_published);
    let pid = campaign.public_id.clone();

    for label in ["Bob", "Alice", "   "] {
        client
            .post(format!("/polls/{pid}/options"))
            .header(ContentType::Form)
            .body(form_body(&OptionForm {
                label: label.to_string(),
                description: None,
            }))
            .dispatch();
    }
    let options = campaign_options::table
        .filter(campaign_options::campaign_id.eq(campaign.id))
        .order_by(campaign_options::label.asc())
        .select(CampaignOption::as_select())
        .load(&mut conn)
        .unwrap();
    assert_eq!(
        options.iter().map(|o| o.label.as_str()).collect::<Vec<_>>(),
        vec!["Alice", "Bob"]
    );

    // an end time before the start time is rejected
    let res = client
        .post("/polls/new")
        .header(ContentType::Form)
        .body(form_body(&CreateCampaignForm {
            club: "Chess Club".to_string(),
            title: "Treasurer".to_string(),
            description: None,
            code: "X".to_string(),
            vote_type: "single".to_string(),
            starts_at: "2025-03-02T09:00".to_string(),
            ends_at: "2025-03-01T09:00".to_string(),
        }))
        .dispatch();
    assert!(res
        .into_string()
        .unwrap()
        .contains("The end time must be after the start time."));

    client.get("/logout").dispatch();

    // (2) the student joins with the access code
    log_in(&client, &mut conn, "student@example.edu");

    let res = client.get(format!("/poll/{pid}")).dispatch();
    assert_eq!(res.status(), Status::SeeOther);

    let res = client
        .post(format!("/polls/{pid}/join"))
        .header(ContentType::Form)
        .body(form_body(&JoinForm {
            code: "abc123".to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);
    assert_eq!(res.headers().get_one("Location"), Some("/polls"));
    let res = client.get("/polls").dispatch();
    assert!(res
        .into_string()
        .unwrap()
        .contains("Incorrect access code for &quot;President&quot;."));

    let res = client
        .post(format!("/polls/{pid}/join"))
        .header(ContentType::Form)
        .body(form_body(&JoinForm {
            code: "  ".to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);
    let res = client.get("/polls").dispatch();
    assert!(res
        .into_string()
        .unwrap()
        .contains("Please enter the access code."));

    let res = client
        .post(format!("/polls/{pid}/join"))
        .header(ContentType::Form)
        .body(form_body(&JoinForm {
            code: " ABC123".to_string(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);
    let location = format!("/poll/{pid}");
    assert_eq!(res.headers().get_one("Location"), Some(location.as_str()));

    let res = client.get(format!("/poll/{pid}")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body = res.into_string().unwrap();
    assert!(body.contains("Alice"));
    assert!(body.contains("Starts: 01/03/2025 9:00 AM"));

    // (3) one vote, then a refused second one
    let res = client
        .post(format!("/poll/{pid}/vote"))
        .header(ContentType::Form)
        .body(form_body(&VoteForm {
            option_id: options[0].public_id.clone(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body = res.into_string().unwrap();
    assert!(body.contains("Vote submitted."));
    assert!(body.contains("(your vote)"));

    let res = client
        .post(format!("/poll/{pid}/vote"))
        .header(ContentType::Form)
        .body(form_body(&VoteForm {
            option_id: options[1].public_id.clone(),
        }))
        .dispatch();
    assert!(res
        .into_string()
        .unwrap()
        .contains("You have already voted in this poll."));

    let votes = votes_of(&mut conn, campaign.id);
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].option_id, options[0].id);
    assert_eq!(votes[0].voter_id, student.public_id);

    // the page remembers the vote on later visits
    let body = client
        .get(format!("/poll/{pid}"))
        .dispatch()
        .into_string()
        .unwrap();
    assert!(body.contains("(your vote)"));

    // (4) students cannot see results
    let res = client.get(format!("/poll/{pid}/results")).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
    let res = client.get(format!("/poll/{pid}/summary/export.csv")).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn options_of_other_polls_are_rejected() {
    let (client, mut conn, _dir) = get_test_rocket_instance();
    let admin = insert_user(&mut conn, "admin@example.edu", "admin");
    let (first, _) = make_campaign(&mut conn, &admin, &["Alice"]);
    let (_, others) = make_campaign(&mut conn, &admin, &["Mallory"]);

    log_in(&client, &mut conn, "admin@example.edu");
    let res = client
        .post(format!("/poll/{}/vote", first.public_id))
        .header(ContentType::Form)
        .body(form_body(&VoteForm {
            option_id: others[0].public_id.clone(),
        }))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
    assert!(votes_of(&mut conn, first.id).is_empty());
}

#[test]
fn results_summary_and_export() {
    let (client, mut conn, _dir) = get_test_rocket_instance();
    let admin = insert_user(&mut conn, "admin@example.edu", "admin");
    let (campaign, options) =
        make_campaign(&mut conn, &admin, &["Alice", "Bob", "Carol"]);
    let pid = campaign.public_id.clone();

    let at = NaiveDateTime::parse_from_str("2025-03-01 10:00:00", "%Y-%m-%d %H:%M:%S")
        .unwrap();
    for (voter, option) in [
        (admin.public_id.clone(), &options[0]),
        ("anon-1".to_string(), &options[0]),
        ("anon-2".to_string(), &options[1]),
    ] {
        diesel::insert_into(votes_single::table)
            .values(NewVote {
                campaign_id: campaign.id,
                option_id: option.id,
                voter_id: voter,
                created_at: at,
            })
            .execute(&mut conn)
            .unwrap();
    }

    log_in(&client, &mut conn, "admin@example.edu");

    let res = client.get(format!("/poll/{pid}/results")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body = res.into_string().unwrap();
    assert!(body.contains("sse-connect"));
    assert!(body.contains("<svg"));

    let body = client
        .get(format!("/poll/{pid}/results/tally"))
        .dispatch()
        .into_string()
        .unwrap();
    assert!(body.contains("Total votes: 3"));
    assert!(body.contains("width: 67%"));
    assert!(body.contains("width: 0%"));

    let body = client
        .get(format!("/poll/{pid}/summary"))
        .dispatch()
        .into_string()
        .unwrap();
    assert!(body.contains("Winner: Alice with 2 votes"));
    assert!(body.contains("Information Technology"));

    let res = client
        .get(format!("/poll/{pid}/summary?filtered=true&candidate=Bob"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/poll/{pid}/summary/export.csv")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let disposition = res
        .headers()
        .get_one("Content-Disposition")
        .unwrap()
        .to_string();
    assert_eq!(
        disposition,
        format!("attachment; filename=\"poll_{pid}_dataset.csv\"")
    );
    let body = res.into_string().unwrap();
    assert!(body.starts_with(BOM));
    let lines: Vec<&str> = body.trim_start_matches(BOM).split('\n').collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "\"Voter ID\",\"Option ID\",\"Option Label\",\"Created At\",\"Discipline\",\"Gender\",\"Location\",\"UG/PG\""
    );
    assert!(lines[1].contains("\"Alice\",\"2025-03-01 10:00:00\",\"6\",\"female\",\"1\",\"UG\""));
    assert!(lines[3].ends_with("\"\",\"\",\"\",\"\""));
}

#[test]
fn table_browser() {
    let (client, mut conn, _dir) = get_test_rocket_instance();
    let admin = insert_user(&mut conn, "admin@example.edu", "admin");
    insert_user(&mut conn, "student@example.edu", "student");
    let (campaign, options) = make_campaign(&mut conn, &admin, &["Alice"]);

    // students are turned away
    log_in(&client, &mut conn, "student@example.edu");
    let res = client.get("/debug/db").dispatch();
    assert_eq!(res.status(), Status::Forbidden);
    client.get("/logout").dispatch();

    log_in(&client, &mut conn, "admin@example.edu");
    let body = client
        .get("/debug/db?tables=users,no_such_table")
        .dispatch()
        .into_string()
        .unwrap();
    assert!(body.contains("student@example.edu"));
    assert!(body.contains("Unknown table &quot;no_such_table&quot;."));

    // upload two votes through a multipart form
    let csv = format!(
        "campaign_id,option_id,voter_id,created_at\r\n\
         {id},{opt},\"anon, 1\",2025-03-01 10:00:00\r\n\
         {id},{opt},anon-2,2025-03-01 10:05:00\r\n",
        id = campaign.id,
        opt = options[0].id
    );
    let boundary = "pollbooth-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"votes.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {csv}\r\n\
         --{boundary}--\r\n"
    );
    let res = client
        .post("/debug/db/votes_single/upload")
        .header(
            ContentType::new("multipart", "form-data")
                .with_params(("boundary", boundary)),
        )
        .body(body)
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);
    let votes = votes_of(&mut conn, campaign.id);
    assert_eq!(votes.len(), 2);
    assert!(votes.iter().any(|v| v.voter_id == "anon, 1"));

    // and delete one of them again
    let res = client
        .post(format!("/debug/db/votes_single/{}/delete", votes[0].id))
        .dispatch();
    assert_eq!(res.status(), Status::SeeOther);
    assert_eq!(votes_of(&mut conn, campaign.id).len(), 1);

    let res = client.post("/debug/db/sqlite_master/1/delete").dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn csv_uploads_check_their_columns() {
    let (_client, mut conn, _dir) = get_test_rocket_instance();
    let admin = insert_user(&mut conn, "admin@example.edu", "admin");
    let (campaign, _) = make_campaign(&mut conn, &admin, &[]);

    let err = insert_csv(
        DebugTable::CampaignOptions,
        "label,colour\nAlice,red\n",
        &mut conn,
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unknown column \"colour\" for table \"campaign_options\"."
    );

    assert!(insert_csv(DebugTable::CampaignOptions, "label\n\n", &mut conn)
        .unwrap()
        .is_empty());

    let rows: String = (0..1200)
        .map(|i| format!("p{i},{},Option {i}\n", campaign.id))
        .collect();
    let text = format!("public_id,campaign_id,label\n{rows}");
    let inserted =
        insert_csv(DebugTable::CampaignOptions, &text, &mut conn).unwrap();
    assert_eq!(inserted.len(), 1200);

    let count: i64 = campaign_options::table
        .filter(campaign_options::campaign_id.eq(campaign.id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(count, 1200);
}

#[test]
fn request_ids_reach_error_reports() {
    let request_id = RequestId("req-42".to_string());
    let events = sentry::test::with_captured_events(|| {
        tag_scope(&request_id);
        sentry::capture_message("could not record vote", sentry::Level::Error);
    });

    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].tags.get("request_id").map(String::as_str),
        Some("req-42")
    );
}
