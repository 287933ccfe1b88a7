use anyhow::Result;
use clap::Parser;
use indicatif::MultiProgress;
use speaker_outreach::cli::{self, Cli, Commands, RunOptions};
use speaker_outreach::config::Config;
use speaker_outreach::error::OutreachError;
use speaker_outreach::models::CompanyCategory;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log buffer poisoned"))?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            // Remove trailing newline for cleaner output
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        if let Some(hint) = e.downcast_ref::<OutreachError>().and_then(error_hint) {
            eprintln!("Hint: {}", hint);
        }
        eprintln!("\nFor help, run: speaker-outreach --help");
        process::exit(1);
    }
}

fn error_hint(error: &OutreachError) -> Option<&'static str> {
    match error {
        OutreachError::FetchError(_) => {
            Some("check the speaker URL or pass --input-html with a saved copy of the page")
        }
        OutreachError::ConfigError(_) => {
            Some("run `speaker-outreach init-config` to generate a valid configuration file")
        }
        OutreachError::CsvError(_) | OutreachError::IoError(_) => {
            Some("check that the output directory is writable")
        }
        _ => None,
    }
}

fn init_tracing(cli: &Cli, multi: &Arc<MultiProgress>) {
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("speaker_outreach=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("speaker_outreach=info,warn"))
    };

    let make_writer = MultiProgressMakeWriter {
        multi: Arc::clone(multi),
    };

    // Logs print above the progress bars
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(make_writer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(make_writer)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Shared MultiProgress for coordinated progress bar + logging
    let multi_progress = Arc::new(MultiProgress::new());
    init_tracing(&cli, &multi_progress);

    tracing::info!("Speaker outreach starting...");

    match cli.command {
        Commands::Run {
            ref output,
            ref input_html,
            ref url,
            limit,
            no_ai,
            dry_run,
            ref report,
            timeout_secs,
        } => {
            if dry_run {
                println!("Running in DRY RUN mode - no CSV will be written");
            }
            if no_ai {
                println!("Running with AI DISABLED - keyword classification and template emails");
            }

            let options = RunOptions {
                output: output.clone(),
                input_html: input_html.clone(),
                url: url.clone(),
                limit,
                no_ai,
                dry_run,
                report: report.clone(),
                timeout_secs,
            };

            let summary =
                cli::run_pipeline(&cli.config, &options, (*multi_progress).clone()).await?;
            let stats = &summary.outcome.stats;

            println!("\n========================================");
            if summary.outcome.cancelled {
                println!("Run Summary (CANCELLED - partial results)");
            } else {
                println!("Run Summary");
            }
            println!("========================================");
            println!("Run ID: {}", stats.run_id);
            println!("Duration: {} seconds", stats.duration_seconds());
            println!("AI: {}", if summary.ai_enabled { "enabled" } else { "disabled" });
            println!(
                "Speakers processed: {} of {}",
                stats.processed, stats.total_records
            );
            for category in CompanyCategory::ALL {
                println!("  {:<11} {}", format!("{}:", category), stats.category_count(category));
            }
            println!("Target speakers: {}", stats.target_count);
            println!("Excluded speakers: {}", stats.excluded_count);
            println!(
                "Emails generated: {} ({} AI, {} fallback)",
                stats.emails_generated, stats.ai_emails, stats.fallback_emails
            );
            println!("Throughput: {:.1} emails/minute", stats.emails_per_minute());
            match &summary.csv_path {
                Some(path) => println!("CSV written to: {:?}", path),
                None => println!("CSV not written (dry run)"),
            }
            if let Some(path) = &summary.report_path {
                println!("Report saved to: {:?}", path);
            }
            println!("========================================");

            Ok(())
        }

        Commands::Classify {
            ref company,
            ref title,
            no_ai,
        } => {
            let result = cli::classify_company(&cli.config, company, title, no_ai).await?;
            println!("Company: {}", company);
            println!("Category: {}", result.category);
            println!("Source: {:?}", result.source);
            if let Some(reason) = result.fallback {
                println!("AI fallback reason: {:?}", reason);
            }
            println!(
                "Target: {}",
                if result.category.is_target() { "yes" } else { "no" }
            );
            Ok(())
        }

        Commands::InitConfig { ref output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(OutreachError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;
            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - classification.competitors / partners: Companies excluded up front");
            println!("  - campaign.product / booth / incentive: What the emails invite people to");
            println!("  - rate_limit.max_concurrent: Parallel speakers (1 for the free API tier)");
            println!("  - ai.api_key_env: Environment variable holding the Gemini API key");
            Ok(())
        }
    }
}
