use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // the guard has to live as long as the process
    let sentry_guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: 0.1,
                ..Default::default()
            },
        ))
    });

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    if sentry_guard.is_some() {
        registry.with(sentry_tracing::layer()).init();
    } else {
        registry.init();
    }
    std::mem::forget(sentry_guard);

    pollbooth::make_rocket("pollbooth.db")
}
