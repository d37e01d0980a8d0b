use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wof_core::{BooleanMode, SearchParams};

#[derive(Debug, Parser)]
#[command(name = "wof-cli")]
#[command(about = "Walloon Offers Finder command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve,
    /// Resolve and print the location hierarchy.
    Locations {
        /// Bypass cached snapshots and refetch.
        #[arg(long)]
        refresh: bool,
    },
    /// Run an aggregated search from the terminal.
    Search {
        keywords: Vec<String>,
        /// Location names, matched against the hierarchy by substring.
        #[arg(long)]
        location: Vec<String>,
        /// Keyword combination mode: AND or OR.
        #[arg(long, default_value = "OR")]
        mode: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => wof_web::serve_from_env().await?,
        Commands::Locations { refresh } => {
            let state = wof_web::AppState::from_env()?;
            let snapshot = if refresh {
                state.locations.refresh().await
            } else {
                state.locations.hierarchy().await
            };
            println!(
                "{} entries from {}",
                snapshot.entries.len(),
                snapshot.source.as_str()
            );
            for entry in &snapshot.entries {
                let kind = entry.kind.map(|k| k.label()).unwrap_or("?");
                println!("{kind:>16}  {}", entry.name);
            }
        }
        Commands::Search {
            keywords,
            location,
            mode,
            limit,
        } => {
            let state = wof_web::AppState::from_env()?;
            let snapshot = state.locations.hierarchy().await;
            let locations = location
                .iter()
                .filter_map(|wanted| {
                    let needle = wanted.to_lowercase();
                    snapshot
                        .entries
                        .iter()
                        .find(|entry| entry.name.to_lowercase().contains(&needle))
                        .cloned()
                })
                .collect();

            let params = SearchParams {
                keywords,
                locations,
                boolean_mode: if mode.eq_ignore_ascii_case("and") {
                    BooleanMode::And
                } else {
                    BooleanMode::Or
                },
                limit: Some(limit),
                offset: None,
            };

            let result = state.aggregator.search_jobs(&params).await;
            for job in &result.jobs {
                println!(
                    "{} | {} | {} | {}",
                    job.publication_date,
                    job.source.as_str(),
                    job.title,
                    job.location
                );
            }
            println!("total: {}", result.total);
        }
    }

    Ok(())
}
