use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Task {
    Scrape,
    Extract,
}

#[derive(Debug, Parser)]
#[command(name = "brvm_worker")]
struct Args {
    /// Run a single cycle of the given task and exit instead of scheduling.
    #[arg(long, value_enum)]
    task: Option<Task>,

    /// Bulletin report date (YYYY-MM-DD). Defaults to the publication rules
    /// (17:30 cutoff, weekend rollback). Only meaningful with --task extract.
    #[arg(long)]
    report_date: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = brvm_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let report_date = args
        .report_date
        .as_deref()
        .map(parse_report_date)
        .transpose()?;

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    brvm_core::storage::migrate(&pool).await?;

    let services = scheduler::Services::from_settings(&settings, pool)?;

    match args.task {
        Some(Task::Scrape) => scheduler::run_scrape_cycle(&services).await,
        Some(Task::Extract) => scheduler::run_extract_cycle(&services, report_date).await,
        None => scheduler::run(services, &settings).await?,
    }

    Ok(())
}

fn parse_report_date(s: &str) -> anyhow::Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").context("report date must be YYYY-MM-DD")
}

fn init_sentry(settings: &brvm_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
