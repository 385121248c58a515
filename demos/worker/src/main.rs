use std::{error::Error, path::PathBuf, time::Duration};

use async_trait::async_trait;
use cadence::{logger::ExportFormat, prelude::*};
use chrono::{TimeDelta, Utc};
use clap::Parser;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadence-worker")]
#[command(about = "Runs the content schedulers against in-memory sources")]
struct Cli {
    /// TOML file with `[scheduler]` and `[blog]` sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Items to seed per content kind
    #[arg(short, long, default_value = "5")]
    items: usize,

    /// Chance that a publish attempt fails, between 0 and 1
    #[arg(long, default_value = "0.3")]
    failure_rate: f64,

    /// How long to let the timer run before stopping
    #[arg(long, default_value = "10")]
    run_secs: u64,

    /// Write the scheduler log to this file as JSON on exit
    #[arg(long)]
    export_logs: Option<PathBuf>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct WorkerConfig {
    scheduler: SchedulerConfig,
    blog: BlogSchedulerConfig,
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cadence=debug")),
        )
        .init();
    let cli = Cli::parse();

    let config: WorkerConfig = match &cli.config {
        Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
        None => WorkerConfig::default(),
    };

    let social = InMemorySource::new();
    let newsletter = InMemorySource::new();
    let blog = InMemorySource::new();
    for i in 0..cli.items {
        let scheduled_at = Utc::now() - TimeDelta::minutes(i as i64);
        social.insert(ScheduledContent::new(
            format!("social-{i}"),
            scheduled_at,
            json!({ "text": format!("Post number {i}") }),
        ))?;
        newsletter.insert(ScheduledContent::new(
            format!("newsletter-{i}"),
            scheduled_at,
            json!({ "subject": format!("Issue {i}") }),
        ))?;
        blog.insert_draft(ScheduledContent::new(
            format!("blog-{i}"),
            scheduled_at,
            json!({ "title": format!("Article {i}") }),
        ))?;
    }

    let blog_scheduler = BlogPostScheduler::new(
        config.blog,
        blog.clone(),
        FlakyPublisher::new("blog", cli.failure_rate),
    )
    .with_automation(AnnounceAutomation);
    for i in 0..cli.items {
        let due = Utc::now() + TimeDelta::seconds(i as i64);
        let post = ScheduledContent::new(format!("blog-{i}"), due, json!({ "title": format!("Article {i}") }));
        blog_scheduler.schedule_blog_post(post).await?;
    }

    let scheduler = ContentScheduler::builder(config.scheduler)
        .with_channel(
            ContentKind::Social,
            social,
            FlakyPublisher::new("social", cli.failure_rate),
        )
        .with_channel(
            ContentKind::Newsletter,
            newsletter,
            FlakyPublisher::new("newsletter", cli.failure_rate),
        )
        .with_blog_scheduler(blog_scheduler)
        .build()?
        .set_global()?;

    scheduler.start();
    tokio::time::sleep(Duration::from_secs(cli.run_secs)).await;

    let forced = scheduler.force_process().await;
    tracing::info!(delta = ?forced.delta, "Final forced pass complete");
    let stopped = scheduler.stop().await;
    tracing::info!(forced = stopped.forced, active_jobs = stopped.active_jobs, "Worker stopped");

    let health = scheduler.health_check().await;
    println!("{}", serde_json::to_string_pretty(&health)?);

    if let Some(path) = cli.export_logs {
        let written = scheduler.logger().export(ExportFormat::Json, &path)?;
        println!("Wrote {written} log entries to {}", path.display());
    }
    Ok(())
}

/// Prints what it publishes and fails a configurable share of attempts.
struct FlakyPublisher {
    name: &'static str,
    failure_rate: f64,
}

impl FlakyPublisher {
    fn new(name: &'static str, failure_rate: f64) -> Self {
        Self {
            name,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl Publisher for FlakyPublisher {
    async fn publish(&self, item: &QueueItem) -> PublishOutcome {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if rand::thread_rng().gen_bool(self.failure_rate) {
            return PublishOutcome::failed(format!("{} API rejected the request", self.name));
        }
        println!("[{}] published {}: {}", self.name, item.id, item.data);
        PublishOutcome::Published
    }
}

struct AnnounceAutomation;

#[async_trait]
impl AutomationTrigger for AnnounceAutomation {
    async fn on_published(&self, item: &QueueItem) -> Result<(), cadence::source::SourceError> {
        println!("[automation] announcing {}", item.id);
        Ok(())
    }
}
