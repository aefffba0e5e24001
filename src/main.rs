use anyhow::{bail, Context};
use chrono::NaiveDate;

use apod_cache::{server, App, Config};

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (info by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config = Config::load().context("failed to load configuration")?;
    config.log_summary();

    let app = App::new(&config).await?;

    // Check for --fill flag (headless range fill)
    if args.len() >= 2 && args[1] == "--fill" {
        if args.len() < 4 {
            bail!("usage: {} --fill START END", args[0]);
        }
        let start = parse_date(&args[2])?;
        let end = parse_date(&args[3])?;
        let added = app.service.fill_range(start, end).await?;
        println!("Added {} pictures between {} and {}", added, start, end);
        return Ok(());
    }

    // Check for --maintenance flag (single maintenance pass)
    if args.len() >= 2 && args[1] == "--maintenance" {
        let report = app.service.run_daily_maintenance().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let jobs = app.spawn_background_jobs();
    let result = server::serve(app.state(), &config.bind_addr).await;

    for job in jobs {
        job.abort();
    }
    result?;

    Ok(())
}
