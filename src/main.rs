use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod artifacts;
mod cluster;
mod config;
mod db;
mod error;
mod features;
mod ingest;
mod models;
mod pipeline;
mod recommend;
mod report;

#[cfg(test)]
mod test_support;

use config::PipelineConfig;
use models::ActivityEvent;

#[derive(Parser)]
#[command(name = "team-tool-recommender")]
#[command(about = "Recommends tools to teams based on what their behavioral peers use", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import activity events from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Run the full pipeline and write artifacts
    Run {
        #[command(flatten)]
        args: RunArgs,
        /// Overwrite the recommendation table in Postgres
        #[arg(long)]
        publish: bool,
    },
    /// Print recommendations without writing artifacts
    Recommend {
        #[command(flatten)]
        args: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Local activity CSV; events come from Postgres when omitted
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    cluster_count: usize,
    #[arg(long, default_value_t = 5)]
    recommendation_count: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 16)]
    batch_size: usize,
    /// Days of history to use; CSV input is unfiltered unless this is set
    #[arg(long)]
    window_days: Option<i64>,
    #[arg(long, default_value = "artifacts")]
    model_dir: PathBuf,
}

impl RunArgs {
    fn config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            feature_window_days: self.window_days.unwrap_or(defaults.feature_window_days),
            cluster_count: self.cluster_count,
            recommendation_count: self.recommendation_count,
            seed: self.seed,
            batch_size: self.batch_size,
            model_dir: self.model_dir.clone(),
            ..defaults
        }
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Loads the activity window from the CSV file when given, otherwise from
/// Postgres. An empty table is seeded from the whole CSV first when both are
/// present; the run itself still only sees the window.
async fn open_source(args: &RunArgs, publish: bool) -> anyhow::Result<Option<PgPool>> {
    let database_configured = std::env::var("DATABASE_URL").is_ok();
    if ingest::reads_database(args.csv.is_some(), publish, database_configured) {
        Ok(Some(connect().await?))
    } else {
        Ok(None)
    }
}

async fn load_events(
    args: &RunArgs,
    config: &PipelineConfig,
    pool: Option<&PgPool>,
) -> anyhow::Result<Vec<ActivityEvent>> {
    let since = ingest::cutoff(config.feature_window_days);

    match (pool, &args.csv) {
        (Some(pool), csv) => {
            if let Some(path) = csv {
                if db::count_events(pool).await? == 0 {
                    info!(path = %path.display(), "activity table is empty; seeding from sample data");
                    let events = ingest::load_events_csv(path)?;
                    db::insert_events(pool, &events).await?;
                    return Ok(ingest::within_window(events, since));
                }
            }
            db::fetch_events(pool, since).await
        }
        (None, Some(path)) => {
            let events = ingest::load_events_csv(path)?;
            Ok(match args.window_days {
                Some(_) => ingest::within_window(events, since),
                None => events,
            })
        }
        (None, None) => anyhow::bail!("no activity source: pass --csv or set DATABASE_URL"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let events = ingest::load_events_csv(&csv)?;
            let inserted = db::insert_events(&pool, &events).await?;
            println!("Inserted {inserted} events from {}.", csv.display());
        }
        Commands::Run { args, publish } => {
            let config = args.config();
            config.validate()?;

            let pool = open_source(&args, publish).await?;

            let events = load_events(&args, &config, pool.as_ref()).await?;
            let run = pipeline::run(&config, &events)?;
            let paths = artifacts::write_artifacts(&config.model_dir, &run)?;

            if let (true, Some(pool)) = (publish, pool.as_ref()) {
                db::publish_recommendations(pool, &run).await?;
            }

            println!(
                "Wrote {} recommendations to {}.",
                run.recommendations.len(),
                paths.recommendations.display()
            );
        }
        Commands::Recommend { args } => {
            let config = args.config();
            config.validate()?;

            let pool = open_source(&args, false).await?;
            let events = load_events(&args, &config, pool.as_ref()).await?;
            let run = pipeline::run(&config, &events)?;

            if run.recommendations.is_empty() {
                println!("No recommendations for this window.");
                return Ok(());
            }

            println!("Recommended tools by team:");
            for row in &run.recommendations.rows {
                println!(
                    "- {} (cluster {}): {} confidence {:.2}",
                    row.team_id, row.cluster_id, row.tool_name, row.confidence
                );
            }
        }
    }

    Ok(())
}
