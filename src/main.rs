use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use roxie_scraper::app::export_use_case::write_import_csv;
use roxie_scraper::app::extract_use_case::ExtractUseCase;
use roxie_scraper::app::identify_use_case::IdentifyUseCase;
use roxie_scraper::app::lookup::LookupClient;
use roxie_scraper::app::ports::PacingPort;
use roxie_scraper::app::scrape_use_case::ScrapeUseCase;
use roxie_scraper::calendar::CalendarSnapshot;
use roxie_scraper::common::constants::{
    EXPORT_SUFFIX, LLM_SUFFIX, OPENAI_API_KEY_ENV, OUTPUT_DIR, TMDB_SUFFIX, TMDB_TOKEN_ENV,
};
use roxie_scraper::config::{require_env, Config};
use roxie_scraper::infra::clock::{RandomPacing, TokioSleep};
use roxie_scraper::infra::http_client::ReqwestHttp;
use roxie_scraper::infra::snapshot_store::{
    derived_path, load_prior, read_snapshot, timestamped_output, write_snapshot,
};
use roxie_scraper::observability::init_logging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

#[derive(Parser)]
#[command(name = "roxie_scraper")]
#[command(about = "Roxie Theater showtime scraper and Letterboxd import builder")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit console logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the calendar and detail pages, merging with a prior run
    Scrape {
        /// Output path (default output/data.<unix_ts>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Previous output to reuse enrichment from
        #[arg(short, long)]
        prior: Option<PathBuf>,
        /// Metadata to include in all logs, as a JSON object
        #[arg(short = 'l', long)]
        log_context: Option<String>,
    },
    /// Extract the movies shown in each listing with the language model
    Extract {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 'l', long)]
        log_context: Option<String>,
    },
    /// Find TMDB ids for extracted movies
    Identify {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 'l', long)]
        log_context: Option<String>,
    },
    /// Write the Letterboxd import CSV for movies still showing
    Export {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 'l', long)]
        log_context: Option<String>,
    },
    /// Scrape, extract and identify in one pass
    Run {
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        prior: Option<PathBuf>,
        /// Also write the import CSV to this path
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(short = 'l', long)]
        log_context: Option<String>,
    },
}

impl Commands {
    fn script(&self) -> &'static str {
        match self {
            Commands::Scrape { .. } => "scrape",
            Commands::Extract { .. } => "extract",
            Commands::Identify { .. } => "identify",
            Commands::Export { .. } => "export",
            Commands::Run { .. } => "run",
        }
    }

    fn log_context(&self) -> Option<&str> {
        match self {
            Commands::Scrape { log_context, .. }
            | Commands::Extract { log_context, .. }
            | Commands::Identify { log_context, .. }
            | Commands::Export { log_context, .. }
            | Commands::Run { log_context, .. } => log_context.as_deref(),
        }
    }
}

/// Shared adapters wired from config
struct Services {
    config: Config,
    lookup: Arc<LookupClient>,
    pacing: Arc<dyn PacingPort>,
}

impl Services {
    fn new(config: Config) -> anyhow::Result<Self> {
        let http = ReqwestHttp::new(config.request_timeout()).context("Failed to build HTTP client")?;
        let lookup = LookupClient::new(Arc::new(http), Arc::new(TokioSleep), config.retry_policy());
        Ok(Self {
            config,
            lookup: Arc::new(lookup),
            pacing: Arc::new(RandomPacing),
        })
    }

    fn scrape(&self) -> anyhow::Result<ScrapeUseCase> {
        Ok(ScrapeUseCase::new(
            self.lookup.clone(),
            self.pacing.clone(),
            &self.config.scrape.calendar_url,
            self.config.timezone()?,
            self.config.scrape.detail_jitter_ms,
        )?)
    }

    fn extract(&self, api_key: String) -> ExtractUseCase {
        ExtractUseCase::new(
            self.lookup.clone(),
            self.pacing.clone(),
            self.config.chat_completions_url(),
            self.config.llm.model.clone(),
            api_key,
            self.config.llm.jitter_ms,
        )
    }

    fn identify(&self, token: String) -> IdentifyUseCase {
        IdentifyUseCase::new(
            self.lookup.clone(),
            self.pacing.clone(),
            self.config.tmdb_search_url(),
            token,
            self.config.tmdb.jitter_ms,
        )
    }
}

/// Parse `--log-context`; anything but a JSON object is rejected
fn parse_log_context(raw: Option<&str>) -> anyhow::Result<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::Value::Object(Default::default()));
    };
    let value: serde_json::Value = serde_json::from_str(raw).context("Invalid JSON for --log-context")?;
    if !value.is_object() {
        bail!("Invalid JSON for --log-context: expected an object");
    }
    Ok(value)
}

fn load_prior_snapshot(prior: Option<&Path>) -> anyhow::Result<Option<CalendarSnapshot>> {
    match prior {
        Some(path) => {
            let prior = load_prior(path).with_context(|| format!("Failed to load prior output {}", path.display()))?;
            Ok(Some(prior.snapshot))
        }
        None => Ok(None),
    }
}

fn default_output() -> PathBuf {
    timestamped_output(Path::new(OUTPUT_DIR), Utc::now().timestamp())
}

fn write_output(path: &Path, snapshot: &CalendarSnapshot, start: Instant) -> anyhow::Result<()> {
    write_snapshot(path, snapshot).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        output_file = %path.display(),
        listing_count = snapshot.len(),
        duration_secs = start.elapsed().as_secs_f64(),
        "Wrote output file"
    );
    Ok(())
}

async fn execute(command: Commands, services: Services) -> anyhow::Result<()> {
    let start = Instant::now();

    match command {
        Commands::Scrape { output, prior, .. } => {
            let prior = load_prior_snapshot(prior.as_deref())?;
            let (snapshot, _) = services.scrape()?.run(prior).await?;
            write_output(&output.unwrap_or_else(default_output), &snapshot, start)?;
        }
        Commands::Extract { file, output, .. } => {
            let api_key = require_env(OPENAI_API_KEY_ENV)?;
            info!(file = %file.display(), "Parsing file");
            let mut snapshot = read_snapshot(&file)?;
            services.extract(api_key).run(&mut snapshot).await;
            let output = output.unwrap_or_else(|| derived_path(&file, LLM_SUFFIX));
            write_output(&output, &snapshot, start)?;
        }
        Commands::Identify { file, output, .. } => {
            let token = require_env(TMDB_TOKEN_ENV)?;
            info!(file = %file.display(), "Parsing file");
            let mut snapshot = read_snapshot(&file)?;
            services.identify(token).run(&mut snapshot).await;
            let output = output.unwrap_or_else(|| derived_path(&file, TMDB_SUFFIX));
            write_output(&output, &snapshot, start)?;
        }
        Commands::Export { file, output, .. } => {
            info!(file = %file.display(), "Parsing file");
            let snapshot = read_snapshot(&file)?;
            let output = output.unwrap_or_else(|| derived_path(&file, EXPORT_SUFFIX));
            write_import_csv(&output, &snapshot, Utc::now(), services.config.timezone()?)?;
            info!(duration_secs = start.elapsed().as_secs_f64(), "Finished export");
        }
        Commands::Run { output, prior, csv, .. } => {
            // Fail on missing credentials before any network traffic
            let api_key = require_env(OPENAI_API_KEY_ENV)?;
            let token = require_env(TMDB_TOKEN_ENV)?;
            let prior = load_prior_snapshot(prior.as_deref())?;

            let (mut snapshot, _) = services.scrape()?.run(prior).await?;
            services.extract(api_key).run(&mut snapshot).await;
            services.identify(token).run(&mut snapshot).await;

            write_output(&output.unwrap_or_else(default_output), &snapshot, start)?;
            if let Some(csv) = csv {
                write_import_csv(&csv, &snapshot, Utc::now(), services.config.timezone()?)?;
            }
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let _guard = init_logging(Path::new("logs"), cli.json_logs);

    let context = parse_log_context(cli.command.log_context())?;
    let config = Config::load(cli.config.as_deref())?;
    let services = Services::new(config)?;

    let span = info_span!("roxie_scraper", script = cli.command.script(), context = %context);
    execute(cli.command, services).instrument(span).await
}
