use chrono::{Duration, Utc};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use incident_tracker::store;

#[derive(Parser, Debug)]
#[command(
    name = "archive_sweep",
    about = "Flag notifications older than a cutoff as archived"
)]
struct Args {
    /// Archive notifications received more than this many days ago.
    #[arg(long, default_value_t = 180)]
    days: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    let cutoff = Utc::now() - Duration::days(args.days);
    let archived = store::archive_older_than(&pool, cutoff).await?;

    println!("archived {} notifications older than {} days", archived, args.days);
    Ok(())
}
