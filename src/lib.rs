//! Speaker Outreach
//!
//! Turns a conference speaker list into a filtered, personalized outbound
//! email dataset.
//!
//! # Overview
//!
//! - **Fetching**: Live speaker page with a local HTML fallback
//! - **Classification**: Manual lists, then AI, then keyword heuristics
//! - **Generation**: AI-written invitation emails with template fallbacks
//! - **Resilience**: Exponential backoff on quota errors, cancellable waits
//! - **Output**: One CSV row per Builder/Owner speaker, plus an optional report
//!
//! # Example Usage
//!
//! ```no_run
//! use speaker_outreach::cli::{build_ai_client, build_orchestrator};
//! use speaker_outreach::config::Config;
//! use speaker_outreach::fetcher::{validate_speakers, HtmlSpeakerSource, SpeakerSource};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let raw = HtmlSpeakerSource::from_config(&config.source)?.fetch().await?;
//!     let records = validate_speakers(raw, &config.validation);
//!
//!     let (client, _) = build_ai_client(&config.ai, false);
//!     let outcome = build_orchestrator(&config, client)
//!         .run(&records, &CancellationToken::new())
//!         .await;
//!
//!     println!("{} emails", outcome.rows.len());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`classifier`] - Strategy chain deciding a company's category
//! - [`cli`] - Command-line interface and run wiring
//! - [`client`] - AI provider trait and the Gemini client
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`fetcher`] - Speaker page scraping and validation
//! - [`generator`] - Email generation with template fallbacks
//! - [`models`] - Core data structures
//! - [`output`] - CSV writer
//! - [`pipeline`] - Per-record orchestration and run statistics
//! - [`rate_limiter`] - Concurrency ceiling and call pacing
//! - [`retry`] - Backoff policy for AI calls

pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod generator;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod rate_limiter;
pub mod retry;

// Re-export commonly used types for convenience
pub use error::{OutreachError, Result};

// Core data models
pub use models::{
    ClassificationResult, ClassificationSource, CompanyCategory, EmailContent, EmailSource,
    FallbackReason, OutputRow, SpeakerRecord,
};

// Pipeline stages
pub use classifier::{ClassificationStrategy, CompanyCategorizer};
pub use generator::EmailGenerator;
pub use pipeline::{Orchestrator, RunOutcome, RunStats};
pub use rate_limiter::CallRateLimiter;
pub use retry::RetryPolicy;

// Config types
pub use config::{ClassificationConfig, Config};

// Boundaries
pub use client::{AiClient, DisabledAiClient, GeminiClient};
pub use fetcher::{HtmlSpeakerSource, RawSpeaker, SpeakerSource};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
