use auth::{
    account::{account_page, update_account},
    login::{do_login, login_page, verify_login},
    logout::logout,
    signup::{complete_signup, do_signup, signup_page, verify_signup},
};
use cache::Caches;
use config::AppConfig;
use db::DbConn;
use debug_tables::{delete_table_row, tables_page, upload_csv};
use diesel_migrations::{
    embed_migrations, EmbeddedMigrations, MigrationHarness,
};
use live::BroadcastFeed;
use polls::{
    create::{create_campaign_page, do_create_campaign},
    listing::{index, join_poll, polls_page},
    options::{add_option, options_page},
    results::{results_live, results_page, results_tally},
    summary::{export_csv, summary_page},
    vote::{do_vote, view_poll},
};
use rocket::{
    fairing::AdHoc,
    figment::{
        util::map,
        value::{Map, Value},
    },
    Build, Rocket,
};
use trace_request::RequestIdFairing;

pub mod auth;
pub mod cache;
pub mod config;
pub mod csv;
pub mod debug_tables;
pub mod demographics;
pub mod error;
pub mod identity;
pub mod permissions;
pub mod polls;
pub mod tally;
#[cfg(test)]
mod tests;
pub mod util;

#[macro_use]
extern crate rocket;

pub const MIGRATIONS: EmbeddedMigrations =
    embed_migrations!("../../migrations");

pub fn make_rocket(default_db: &str) -> Rocket<Build> {
    let db: Map<_, Value> = map![
        "url" => std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| default_db.to_string())
            .into(),
        "pool_size" => 10.into(),
        "timeout" => 5.into(),
    ];

    let figment =
        rocket::Config::figment().merge(("databases", map!["database" => db]));

    rocket::custom(figment)
        .attach(DbConn::fairing())
        .attach(AdHoc::try_on_ignite("migrations", |rocket| async move {
            let Some(db_conn) = DbConn::get_one(&rocket).await else {
                tracing::error!("no database connection for migrations");
                return Err(rocket);
            };

            let ret: Result<(), Box<dyn std::error::Error + Send + Sync>> =
                db_conn
                    .interact(move |conn| {
                        conn.run_pending_migrations(MIGRATIONS)?;
                        Ok(())
                    })
                    .await;

            match ret {
                Ok(_) => Ok(rocket),
                Err(error) => {
                    tracing::error!(%error, "could not run migrations");
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::config::<AppConfig>())
        .attach(AdHoc::on_ignite("caches", |rocket| async move {
            let caches = match rocket.state::<AppConfig>() {
                Some(config) => Caches::new(config),
                None => Caches::new(&AppConfig::default()),
            };
            rocket.manage(caches)
        }))
        .manage(BroadcastFeed::default())
        .mount(
            "/",
            routes![
                index,
                login_page,
                do_login,
                verify_login,
                signup_page,
                do_signup,
                verify_signup,
                complete_signup,
                logout,
                account_page,
                update_account,
                polls_page,
                join_poll,
                create_campaign_page,
                do_create_campaign,
                options_page,
                add_option,
                view_poll,
                do_vote,
                results_page,
                results_tally,
                results_live,
                summary_page,
                export_csv,
                tables_page,
                delete_table_row,
                upload_csv,
            ],
        )
        .attach(RequestIdFairing)
}
