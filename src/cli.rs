//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier::CompanyCategorizer;
use crate::client::{AiClient, DisabledAiClient, GeminiClient};
use crate::config::{AiConfig, Config};
use crate::error::{OutreachError, Result};
use crate::fetcher::{validate_speakers, HtmlSpeakerSource, SpeakerSource};
use crate::generator::EmailGenerator;
use crate::models::ClassificationResult;
use crate::output::write_csv;
use crate::pipeline::{Orchestrator, ProgressCallback, RunOutcome};
use crate::rate_limiter::CallRateLimiter;
use crate::retry::RetryPolicy;

#[derive(Parser, Debug)]
#[command(name = "speaker-outreach")]
#[command(version = "0.1.0")]
#[command(about = "Classify conference speakers and draft booth invitation emails", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch speakers, classify them and write the email list
    Run {
        /// CSV output path (overrides output.csv_path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read speakers from this HTML file instead of the live page
        #[arg(long)]
        input_html: Option<PathBuf>,

        /// Speaker page URL (overrides source.url)
        #[arg(long)]
        url: Option<String>,

        /// Only process the first N valid speakers
        #[arg(long)]
        limit: Option<usize>,

        /// Skip the AI provider; use keyword classification and template emails
        #[arg(long)]
        no_ai: bool,

        /// Process everything but don't write the CSV
        #[arg(long)]
        dry_run: bool,

        /// Write a Markdown run report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Cancel the run after this many seconds, keeping finished rows
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Classify a single company and print the result
    Classify {
        /// Company name
        #[arg(long)]
        company: String,

        /// Job title of the speaker
        #[arg(long, default_value = "")]
        title: String,

        /// Skip the AI provider
        #[arg(long)]
        no_ai: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Options for one `run` invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub output: Option<PathBuf>,
    pub input_html: Option<PathBuf>,
    pub url: Option<String>,
    pub limit: Option<usize>,
    pub no_ai: bool,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Result of `run_pipeline`
#[derive(Debug)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Where the CSV went, `None` on a dry run
    pub csv_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub ai_enabled: bool,
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the log writer so log lines print above the bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the AI client for this run. The flag is true when a real provider
/// is behind the client.
///
/// Falls back to [`DisabledAiClient`] when AI is switched off or the API key
/// is missing, so the run still completes on keywords and templates.
pub fn build_ai_client(config: &AiConfig, no_ai: bool) -> (Arc<dyn AiClient>, bool) {
    if no_ai || !config.enabled {
        info!("AI disabled; using keyword classification and template emails");
        return (Arc::new(DisabledAiClient), false);
    }

    match GeminiClient::from_config(config) {
        Ok(client) => {
            info!("Using {} for classification and email generation", config.model);
            (Arc::new(client), true)
        }
        Err(e) => {
            warn!("{}. Continuing without AI", e);
            (Arc::new(DisabledAiClient), false)
        }
    }
}

/// Wire the categorizer, generator and limiter from config
pub fn build_orchestrator(config: &Config, client: Arc<dyn AiClient>) -> Orchestrator {
    let retry = RetryPolicy::from_config(&config.retry);
    let categorizer = CompanyCategorizer::new(
        Arc::new(config.classification.clone()),
        Arc::clone(&client),
        retry.clone(),
    );
    let generator = EmailGenerator::new(
        client,
        retry,
        config.campaign.clone(),
        config.email.clone(),
    );
    Orchestrator::new(
        categorizer,
        generator,
        CallRateLimiter::from_config(&config.rate_limit),
    )
}

/// Cancel `token` on Ctrl-C and, when given, after `timeout_secs`
fn spawn_cancel_triggers(token: &CancellationToken, timeout_secs: Option<u64>) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c_token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("Interrupt received, stopping after finished rows");
                    ctrl_c_token.cancel();
                }
            }
        }
    });

    if let Some(secs) = timeout_secs {
        let deadline_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = deadline_token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    warn!("Run deadline of {}s reached, cancelling", secs);
                    deadline_token.cancel();
                }
            }
        });
    }
}

/// Main orchestration function for the `run` command
///
/// 1. Load configuration
/// 2. Fetch and validate speakers
/// 3. Categorize, filter and generate emails
/// 4. Write the CSV (unless dry run) and the optional report
pub async fn run_pipeline(
    config_path: &Path,
    options: &RunOptions,
    multi: MultiProgress,
) -> Result<RunSummary> {
    let reporter = ProgressReporter::with_multi_progress(multi);

    // Step 1: Load configuration
    let config_spinner = reporter.add_spinner("Loading configuration...");
    let mut config = Config::load(config_path).await?;
    if let Some(url) = &options.url {
        config.source.url = url.clone();
    }
    reporter.finish_spinner(&config_spinner, &format!("Configuration loaded from {:?}", config_path));

    // Step 2: Fetch speakers
    let fetch_spinner = reporter.add_spinner("Fetching speakers...");
    let source = match &options.input_html {
        Some(path) => HtmlSpeakerSource::new(
            None,
            Some(path.clone()),
            Duration::from_secs(config.source.timeout_secs),
        )?,
        None => HtmlSpeakerSource::from_config(&config.source)?,
    };
    let raw = source.fetch().await?;
    let raw_count = raw.len();
    let mut records = validate_speakers(raw, &config.validation);
    if let Some(limit) = options.limit {
        records.truncate(limit);
    }
    if records.is_empty() {
        fetch_spinner.finish_and_clear();
        return Err(OutreachError::FetchError(
            "No valid speakers to process".to_string(),
        ));
    }
    reporter.finish_spinner(
        &fetch_spinner,
        &format!("{} valid speakers ({} scraped)", records.len(), raw_count),
    );

    // Step 3: Process
    let (client, ai_enabled) = build_ai_client(&config.ai, options.no_ai);

    let bar = reporter.add_progress_bar(records.len() as u64, "Processing speakers...");
    let bar_handle = bar.clone();
    let progress: ProgressCallback = Arc::new(move || bar_handle.inc(1));
    let orchestrator = build_orchestrator(&config, client).with_progress(progress);

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, options.timeout_secs);

    let outcome = orchestrator.run(&records, &cancel).await;
    // Stop the trigger tasks
    cancel.cancel();

    if outcome.cancelled {
        bar.abandon_with_message(format!("Cancelled, {} rows kept", outcome.rows.len()));
    } else {
        bar.finish_with_message(format!("{} emails generated", outcome.rows.len()));
    }

    // Step 4: Write outputs
    let csv_path = if options.dry_run {
        info!("[DRY RUN] Skipping CSV output ({} rows)", outcome.rows.len());
        None
    } else {
        let path = options
            .output
            .clone()
            .unwrap_or_else(|| config.output.csv_path.clone());
        write_csv(&path, &outcome.rows)?;
        Some(path)
    };

    if let Some(report_path) = &options.report {
        outcome.stats.save(report_path).await?;
        info!("Report saved to {:?}", report_path);
    }

    Ok(RunSummary {
        outcome,
        csv_path,
        report_path: options.report.clone(),
        ai_enabled,
    })
}

/// Classify a single company with the configured chain
pub async fn classify_company(
    config_path: &Path,
    company: &str,
    title: &str,
    no_ai: bool,
) -> Result<ClassificationResult> {
    let config = Config::load(config_path).await?;
    let (client, _) = build_ai_client(&config.ai, no_ai);
    let categorizer = CompanyCategorizer::new(
        Arc::new(config.classification.clone()),
        client,
        RetryPolicy::from_config(&config.retry),
    );

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, None);
    let result = categorizer.categorize(company, title, &cancel).await;
    cancel.cancel();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationSource, CompanyCategory};

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::parse_from([
            "speaker-outreach",
            "--verbose",
            "run",
            "--input-html",
            "in/speakers.html",
            "--limit",
            "5",
            "--no-ai",
            "--dry-run",
            "--timeout-secs",
            "30",
        ]);

        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        match cli.command {
            Commands::Run {
                input_html,
                limit,
                no_ai,
                dry_run,
                timeout_secs,
                output,
                ..
            } => {
                assert_eq!(input_html, Some(PathBuf::from("in/speakers.html")));
                assert_eq!(limit, Some(5));
                assert!(no_ai);
                assert!(dry_run);
                assert_eq!(timeout_secs, Some(30));
                assert_eq!(output, None);
            }
            other => panic!("expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_classify() {
        let cli = Cli::parse_from([
            "speaker-outreach",
            "classify",
            "--company",
            "Riverside Builders",
        ]);

        match cli.command {
            Commands::Classify { company, title, no_ai } => {
                assert_eq!(company, "Riverside Builders");
                assert_eq!(title, "");
                assert!(!no_ai);
            }
            other => panic!("expected Classify, got {:?}", other),
        }
    }

    #[test]
    fn test_build_ai_client_disabled_by_flag() {
        let (client, enabled) = build_ai_client(&AiConfig::default(), true);
        assert!(!enabled);
        let result = tokio_test::block_on(client.classify("prompt"));
        assert!(matches!(result, Err(OutreachError::AiDisabled)));
    }

    #[test]
    fn test_build_ai_client_missing_key_disables() {
        let config = AiConfig {
            api_key_env: "SPEAKER_OUTREACH_CLI_TEST_NO_KEY".to_string(),
            ..AiConfig::default()
        };
        let (client, enabled) = build_ai_client(&config, false);
        assert!(!enabled);
        let result = tokio_test::block_on(client.generate("prompt"));
        assert!(matches!(result, Err(OutreachError::AiDisabled)));
    }

    #[tokio::test]
    async fn test_classify_company_without_ai() {
        let path = Path::new("/tmp/nonexistent-speaker-outreach-cli-test.toml");
        let result = classify_company(path, "Riverside Builders", "Site Superintendent", true)
            .await
            .unwrap();

        assert_eq!(result.category, CompanyCategory::Builder);
        assert_eq!(result.source, ClassificationSource::Keyword);
    }

    #[tokio::test]
    async fn test_run_pipeline_from_html_file() {
        let dir = tempfile::tempdir().unwrap();
        let html_path = dir.path().join("speakers.html");
        let csv_path = dir.path().join("out").join("email_list.csv");
        let report_path = dir.path().join("report.md");
        tokio::fs::write(
            &html_path,
            r#"<div class="speaker"><h3>Jane Doe</h3><p class="title">Site Superintendent</p><p class="company">Riverside Builders</p></div>
               <div class="speaker"><h3>Ravi Patel</h3><p class="title">Product Lead</p><p class="company">DJI Enterprise</p></div>"#,
        )
        .await
        .unwrap();

        let config_path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.rate_limit.api_delay_ms = 0;
        config.save(&config_path).await.unwrap();

        let options = RunOptions {
            output: Some(csv_path.clone()),
            input_html: Some(html_path),
            no_ai: true,
            report: Some(report_path.clone()),
            ..RunOptions::default()
        };

        let summary = run_pipeline(&config_path, &options, MultiProgress::new())
            .await
            .unwrap();

        assert!(!summary.outcome.cancelled);
        assert!(!summary.ai_enabled);
        assert_eq!(summary.outcome.rows.len(), 1);
        assert_eq!(summary.outcome.stats.excluded_count, 1);
        assert_eq!(summary.csv_path, Some(csv_path.clone()));
        assert!(csv_path.exists());
        assert!(report_path.exists());
    }
}
