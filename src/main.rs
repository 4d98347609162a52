use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use market_pulse::agents::{AdvisorAgent, AnalystAgent};
use market_pulse::api::{run_server, AppState};
use market_pulse::config::AppConfig;
use market_pulse::constants::crawler::ROBOTS_AGENT_TOKEN;
use market_pulse::crawler::{
    CandidateScorer, CrawlerAgent, FetchRetrier, HttpFetch, HttpSearchClient, ReqwestFetcher,
    RobotsCache, SourceResolver,
};
use market_pulse::llm::{LLMClient, LLMQueue};
use market_pulse::pipeline::{CancelToken, PipelineCoordinator, RunState};
use market_pulse::services::reporting::{default_report_path, save_report, summarize, RunReporter};
use market_pulse::{AnalysisRequest, EventBus};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const REPORTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "market-pulse", version, about = "Life-sciences opportunity analysis pipeline")]
struct Cli {
    /// YAML config file (defaults to $MARKET_PULSE_CONFIG, then config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one company name or press-release URL and save the report
    Analyze {
        input: String,

        /// Report path (defaults to a timestamped file under reporting.report_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve the HTTP job API
    Serve {
        /// Overrides server.bind_addr
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()?;

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    info!("Starting MarketPulse...");
    info!(
        "Search endpoint: {} | LLM model: {} | threshold: {}",
        config.search.endpoint, config.llm.model, config.crawler.acceptance_threshold
    );

    let bus = EventBus::new(config.server.event_capacity);
    let reporter = RunReporter::new(PathBuf::from(&config.reporting.progress_log));
    let _reporter_task = reporter.start(&bus);

    let coordinator = Arc::new(build_coordinator(&config, bus)?);

    match cli.command {
        Command::Analyze { input, output } => {
            analyze(&config, coordinator, &reporter, &input, output).await
        }
        Command::Serve { bind } => {
            let bind_addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
            let state = Arc::new(AppState::new(coordinator).with_retention(
                config.server.finished_run_ttl(),
                config.server.max_finished_runs,
            ));
            run_server(state, &bind_addr).await?;
            Ok(())
        }
    }
}

/// Wire the production crawler, LLM queue and agents into a coordinator.
fn build_coordinator(config: &AppConfig, bus: EventBus) -> Result<PipelineCoordinator, BoxError> {
    let http: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(&config.crawler.user_agent)?);
    let search = Arc::new(HttpSearchClient::new(
        config.search.endpoint.clone(),
        &config.crawler.user_agent,
    )?);

    let mut retrier = FetchRetrier::new(http.clone(), &config.crawler);
    if config.crawler.respect_robots {
        retrier = retrier.with_robots(Arc::new(RobotsCache::new(ROBOTS_AGENT_TOKEN)));
    }
    let resolver = SourceResolver::new(
        search,
        http,
        config.search.clone(),
        &config.crawler,
        &config.scoring,
    );
    let scorer = Arc::new(CandidateScorer::for_today(&config.scoring));
    let crawler = CrawlerAgent::new(resolver, retrier, scorer, &config.crawler);

    if config.llm.api_key.is_none() {
        warn!("⚠️ No LLM API key configured (set OPENAI_API_KEY or llm.api_key)");
    }
    info!(
        "📬 Initializing LLM Queue (max concurrent: {}, size: {})...",
        config.llm.max_concurrent, config.llm.queue_size
    );
    let llm = Arc::new(LLMQueue::new(
        Arc::new(LLMClient::from_config(&config.llm)),
        config.llm.max_concurrent,
        config.llm.queue_size,
    ));

    Ok(PipelineCoordinator::new(
        Arc::new(crawler),
        Arc::new(AnalystAgent::new(llm.clone(), &config.llm)),
        Arc::new(AdvisorAgent::new(llm, &config.llm)),
        bus,
    ))
}

async fn analyze(
    config: &AppConfig,
    coordinator: Arc<PipelineCoordinator>,
    reporter: &RunReporter,
    input: &str,
    output: Option<PathBuf>,
) -> Result<(), BoxError> {
    let request = AnalysisRequest::parse(input)?;

    let cancel = CancelToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run...");
            ctrl_c.cancel();
        }
    });

    let run = coordinator.run(request, cancel).await;
    if !reporter.wait_flushed(1, REPORTER_DRAIN_TIMEOUT).await {
        warn!("Progress log may be incomplete, reporter did not catch up");
    }

    let path = output
        .unwrap_or_else(|| default_report_path(std::path::Path::new(&config.reporting.report_dir), &run));
    save_report(&run, &path)?;

    match run.state {
        RunState::Succeeded => {
            if let Some(summary) = summarize(&run) {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            println!("Report saved to {}", path.display());
            Ok(())
        }
        _ => {
            let reason = run
                .error
                .as_ref()
                .map(|e| format!("{} stage: {}", e.stage, e.message))
                .unwrap_or_else(|| "unknown error".to_string());
            Err(format!("run {:?}: {} (report saved to {})", run.state, reason, path.display()).into())
        }
    }
}
