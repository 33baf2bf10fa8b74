mod api;
mod config;
mod db;
mod dimension;
mod error;
mod extract;
mod feeds;
mod fetcher;
mod llm;
mod model;
mod pipeline;
mod report;
mod reviews;
mod scoring;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use config::Settings;
use dimension::Dimension;
use fetcher::Fetcher;
use llm::HttpGenerator;
use report::Reporter;
use scoring::Scorer;

#[derive(Parser)]
#[command(
    name = "competitor_intel",
    about = "Competitor content scoring across strategic dimensions"
)]
struct Cli {
    /// Config file (default: ./intel.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tables and seed the source queue from config
    Init,
    /// Fetch unvisited sources
    Fetch {
        /// Max sources to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Only this company (slug or name)
        #[arg(long)]
        company: Option<String>,
    },
    /// Score fetched documents into items
    Process {
        /// Max documents to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch + process in one pipeline
    Run {
        /// Max sources to fetch+process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Score a piece of text against one dimension
    Score {
        #[arg(short, long)]
        dimension: String,
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Generate and store competitive reports
    Report {
        /// Only this company (default: all configured)
        #[arg(long)]
        company: Option<String>,
    },
    /// Mean relevance per company and dimension
    Overview {
        #[arg(long)]
        company: Option<String>,
        #[arg(short, long)]
        dimension: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show pipeline statistics
    Stats,
    /// Mark sources unvisited so the next fetch retrieves them again
    Rescrape {
        #[arg(long)]
        company: Option<String>,
    },
    /// Serve the JSON API
    Serve {
        /// Address to bind (default from config)
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Init => {
            let conn = open_db(&settings)?;
            let inserted = db::insert_sources(&conn, &settings.companies)?;
            let total: usize = settings.companies.iter().map(|c| c.sources.len()).sum();
            println!(
                "Inserted {} new sources ({} configured across {} companies)",
                inserted,
                total,
                settings.companies.len()
            );
            Ok(())
        }
        Commands::Fetch { limit, company } => {
            let conn = open_db(&settings)?;
            let slug = company_slug(&settings, company.as_deref())?;
            let sources = db::fetch_unvisited(&conn, slug.as_deref(), limit)?;
            if sources.is_empty() {
                println!("No unvisited sources. Run 'init' first or use 'rescrape'.");
                return Ok(());
            }
            println!("Fetching {} sources (streaming to DB)...", sources.len());
            let fetcher = Arc::new(Fetcher::new(&settings.fetch)?);
            let stats = fetcher::fetch_sources_streaming(
                &conn,
                fetcher,
                settings.fetch.concurrency,
                sources,
            )
            .await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = open_db(&settings)?;
            let docs = db::fetch_unprocessed(&conn, limit)?;
            if docs.is_empty() {
                println!("No unprocessed documents. Run 'fetch' first.");
                return Ok(());
            }
            println!("Processing {} documents...", docs.len());
            let scorer = Scorer::new(settings.keyword_sets());
            let counts = pipeline::process_documents(&conn, &scorer, &settings.scoring, &docs)?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = open_db(&settings)?;
            let sources = db::fetch_unvisited(&conn, None, limit)?;
            if sources.is_empty() {
                println!("No unvisited sources. Run 'init' first.");
                return Ok(());
            }

            // Phase 1: Fetch (streaming to DB)
            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} sources (streaming to DB)...", sources.len());
            let fetcher = Arc::new(Fetcher::new(&settings.fetch)?);
            let stats = fetcher::fetch_sources_streaming(
                &conn,
                fetcher,
                settings.fetch.concurrency,
                sources,
            )
            .await?;
            println!(
                "Fetched {} sources ({} ok, {} errors) in {:.1}s",
                stats.total,
                stats.ok,
                stats.errors,
                t_fetch.elapsed().as_secs_f64()
            );

            // Phase 2: Process
            let t_process = Instant::now();
            let docs = db::fetch_unprocessed(&conn, None)?;
            if docs.is_empty() {
                println!("Nothing to process (all fetches had errors).");
                return Ok(());
            }
            println!("Processing {} documents...", docs.len());
            let scorer = Scorer::new(settings.keyword_sets());
            let counts = pipeline::process_documents(&conn, &scorer, &settings.scoring, &docs)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Score {
            dimension,
            text,
            file,
        } => {
            let text = match (text, file) {
                (Some(t), _) => t,
                (None, Some(f)) => std::fs::read_to_string(&f)
                    .with_context(|| format!("Failed to read {:?}", f))?,
                (None, None) => bail!("Pass --text or --file"),
            };
            let scorer = Scorer::new(settings.keyword_sets());
            if Dimension::parse(&dimension).is_none() {
                println!("Unknown dimension '{}'; scoring as zero.", dimension);
            }
            let s = scorer.score_relevance(&text, &dimension);
            println!("Dimension:  {}", dimension);
            println!("Relevance:  {:.1}%", s.relevance_pct());
            println!("Confidence: {:.3}", s.confidence);
            println!("Matches:    {}/{}", s.keyword_matches, s.total_keywords);
            println!("Sentiment:  {}", scoring::extract_sentiment(&text));
            if let Some(r) = scoring::extract_rating(&text) {
                println!("Rating:     {}", r);
            }
            Ok(())
        }
        Commands::Report { company } => {
            let conn = open_db(&settings)?;
            let companies = match company.as_deref() {
                Some(key) => match settings.company(key) {
                    Some(c) => vec![c.clone()],
                    None => bail!("Unknown company '{}'", key),
                },
                None => settings.companies.clone(),
            };
            let generator = Arc::new(HttpGenerator::new(&settings.llm)?);
            let reporter = Reporter::new(generator, &settings.llm, &settings.report);

            for c in &companies {
                let payload = report::build_payload(&conn, c, settings.report.top_sources)?;
                let generated = reporter.generate(&payload).await;
                let (id, path) = reporter.save(&conn, &generated)?;
                println!(
                    "{:<16} report #{} ({}, {} items){}",
                    truncate(&c.name, 16),
                    id,
                    generated.origin.as_str(),
                    payload.total_items,
                    path.map(|p| format!(" -> {}", p.display()))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
        Commands::Overview {
            company,
            dimension,
            limit,
        } => {
            let conn = open_db(&settings)?;
            let slug = company_slug(&settings, company.as_deref())?;
            let dimension = match dimension.as_deref() {
                Some(d) => match Dimension::parse(d) {
                    Some(d) => Some(d),
                    None => bail!("Unknown dimension '{}'", d),
                },
                None => None,
            };
            let rows = db::fetch_overview(&conn, slug.as_deref(), dimension, limit)?;
            if rows.is_empty() {
                println!("No scored items found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<16} | {:<24} | {:>9} | {:>8} | {:>5}",
                "#", "Company", "Dimension", "Mean rel.", "Max rel.", "Items"
            );
            println!("{}", "-".repeat(80));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<16} | {:<24} | {:>8.1}% | {:>7.1}% | {:>5}",
                    i + 1,
                    truncate(&r.company, 16),
                    truncate(&r.dimension, 24),
                    r.mean_relevance * 100.0,
                    r.max_relevance * 100.0,
                    r.item_count
                );
            }
            println!("\n{} rows", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Sources:   {}", s.sources);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Fetched:   {}", s.fetched);
            println!("Errors:    {}", s.errors);
            println!("Processed: {}", s.processed);
            println!("Items:     {}", s.items);
            println!("Reports:   {}", s.reports);
            Ok(())
        }
        Commands::Rescrape { company } => {
            let conn = open_db(&settings)?;
            let slug = company_slug(&settings, company.as_deref())?;
            let n = db::reset_visited(&conn, slug.as_deref())?;
            println!("Marked {} sources unvisited.", n);
            Ok(())
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            let generator = Arc::new(HttpGenerator::new(&settings.llm)?);
            let reporter = Reporter::new(generator, &settings.llm, &settings.report);
            let state = api::handlers::AppState::new(settings, reporter);
            api::serve(state, &bind).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(settings: &Settings) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(&settings.database.path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// Resolve a `--company` argument to its stored slug.
fn company_slug(settings: &Settings, key: Option<&str>) -> anyhow::Result<Option<String>> {
    match key {
        Some(k) => match settings.company(k) {
            Some(c) => Ok(Some(c.slug.clone())),
            None => bail!("Unknown company '{}'", k),
        },
        None => Ok(None),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(truncate("Airtable", 16), "Airtable");
        assert_eq!(truncate("api_first_architecture", 8), "api_firs...");
    }

    #[test]
    fn durations_are_human() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "competitor_intel",
            "score",
            "--dimension",
            "api_first_architecture",
            "--text",
            "REST API",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Score { .. }));

        let cli = Cli::try_parse_from(["competitor_intel", "fetch", "-n", "5", "--company", "notion"])
            .unwrap();
        match cli.command {
            Commands::Fetch { limit, company } => {
                assert_eq!(limit, Some(5));
                assert_eq!(company.as_deref(), Some("notion"));
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn unknown_company_is_rejected() {
        let settings = Settings::default();
        assert_eq!(
            company_slug(&settings, Some("Notion")).unwrap().as_deref(),
            Some("notion")
        );
        assert!(company_slug(&settings, Some("lotus")).is_err());
        assert_eq!(company_slug(&settings, None).unwrap(), None);
    }
}
