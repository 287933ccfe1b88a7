//! Company categorization via an ordered strategy chain
//!
//! Stages run in order and the first one that produces a category wins:
//! manual competitor/partner lists, then the AI classifier (behind the retry
//! policy), then keyword heuristics over title and company. An empty company
//! short-circuits to `Other` without touching any stage.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::AiClient;
use crate::config::ClassificationConfig;
use crate::error::{OutreachError, Result};
use crate::models::{ClassificationResult, ClassificationSource, CompanyCategory, FallbackReason};
use crate::retry::RetryPolicy;

/// What a strategy sees for one speaker
#[derive(Debug, Clone, Copy)]
pub struct CompanyInput<'a> {
    pub company: &'a str,
    pub title: &'a str,
}

/// One stage of the classification chain.
///
/// `Ok(None)` means "no opinion, ask the next stage". `Err` means the stage
/// failed; the chain records why and moves on.
#[async_trait]
pub trait ClassificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn source(&self) -> ClassificationSource;

    async fn classify(
        &self,
        input: CompanyInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<CompanyCategory>>;
}

/// Authoritative competitor/partner lists, matched as case-insensitive
/// substrings of the company name. Competitors are checked first.
pub struct ManualListStrategy {
    competitors: Vec<String>,
    partners: Vec<String>,
}

impl ManualListStrategy {
    pub fn new(config: &ClassificationConfig) -> Self {
        Self {
            competitors: lowercase_all(&config.competitors),
            partners: lowercase_all(&config.partners),
        }
    }

    fn lookup(&self, company: &str) -> Option<CompanyCategory> {
        let company = company.to_lowercase();
        if self.competitors.iter().any(|c| company.contains(c.as_str())) {
            return Some(CompanyCategory::Competitor);
        }
        if self.partners.iter().any(|p| company.contains(p.as_str())) {
            return Some(CompanyCategory::Partner);
        }
        None
    }
}

#[async_trait]
impl ClassificationStrategy for ManualListStrategy {
    fn name(&self) -> &'static str {
        "manual_list"
    }

    fn source(&self) -> ClassificationSource {
        ClassificationSource::ManualList
    }

    async fn classify(
        &self,
        input: CompanyInput<'_>,
        _cancel: &CancellationToken,
    ) -> Result<Option<CompanyCategory>> {
        Ok(self.lookup(input.company))
    }
}

/// Asks the AI provider for a label, through the retry policy
pub struct AiStrategy {
    client: Arc<dyn AiClient>,
    retry: RetryPolicy,
}

impl AiStrategy {
    pub fn new(client: Arc<dyn AiClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl ClassificationStrategy for AiStrategy {
    fn name(&self) -> &'static str {
        "ai"
    }

    fn source(&self) -> ClassificationSource {
        ClassificationSource::AiModel
    }

    async fn classify(
        &self,
        input: CompanyInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<CompanyCategory>> {
        let prompt = build_classification_prompt(input.company, input.title);
        let reply = self
            .retry
            .call("classify_company", cancel, || self.client.classify(&prompt))
            .await?;

        parse_category_reply(&reply).map(Some)
    }
}

/// Lowercase substring search of the title, then the company, for builder
/// keywords and then owner keywords. Always produces a category.
pub struct KeywordStrategy {
    builder_keywords: Vec<String>,
    owner_keywords: Vec<String>,
}

impl KeywordStrategy {
    pub fn new(config: &ClassificationConfig) -> Self {
        Self {
            builder_keywords: lowercase_all(&config.builder_keywords),
            owner_keywords: lowercase_all(&config.owner_keywords),
        }
    }

    fn match_text(&self, text: &str) -> Option<CompanyCategory> {
        let text = text.to_lowercase();
        if self.builder_keywords.iter().any(|k| text.contains(k.as_str())) {
            return Some(CompanyCategory::Builder);
        }
        if self.owner_keywords.iter().any(|k| text.contains(k.as_str())) {
            return Some(CompanyCategory::Owner);
        }
        None
    }

    pub fn categorize(&self, company: &str, title: &str) -> CompanyCategory {
        self.match_text(title)
            .or_else(|| self.match_text(company))
            .unwrap_or(CompanyCategory::Other)
    }
}

#[async_trait]
impl ClassificationStrategy for KeywordStrategy {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn source(&self) -> ClassificationSource {
        ClassificationSource::Keyword
    }

    async fn classify(
        &self,
        input: CompanyInput<'_>,
        _cancel: &CancellationToken,
    ) -> Result<Option<CompanyCategory>> {
        Ok(Some(self.categorize(input.company, input.title)))
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Prompt sent to the AI classifier
pub fn build_classification_prompt(company: &str, title: &str) -> String {
    format!(
        "You are a construction industry expert. Classify this company and person into one of these categories:\n\
         \n\
         - Builder: Companies that build things (contractors, engineering firms, construction companies, architects, etc.)\n\
         - Owner: Companies that own/commission construction projects (real estate developers, property owners, facility managers, etc.)\n\
         - Other: Any other type of company not clearly in the above categories\n\
         \n\
         Company: {}\n\
         Person's Title: {}\n\
         \n\
         Respond with ONLY one word: Builder, Owner, or Other\n",
        company, title
    )
}

/// Parse the AI reply into a category.
///
/// Surrounding whitespace, quotes, asterisks, backticks and trailing
/// punctuation are ignored. Anything else is an invalid response.
pub fn parse_category_reply(reply: &str) -> Result<CompanyCategory> {
    let cleaned = reply.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '"' | '\'' | '*' | '`' | '.' | '!' | ',' | ':' | ';')
    });

    if cleaned.is_empty() {
        return Err(OutreachError::InvalidResponse(
            "empty classification reply".to_string(),
        ));
    }

    cleaned.parse::<CompanyCategory>()
}

/// Runs the strategy chain for one company
pub struct CompanyCategorizer {
    strategies: Vec<Box<dyn ClassificationStrategy>>,
}

impl CompanyCategorizer {
    /// Build the standard chain: manual lists, AI, keywords.
    ///
    /// Pass a [`crate::client::DisabledAiClient`] to run without AI; the
    /// keyword stage then records [`FallbackReason::AiDisabled`].
    pub fn new(
        config: Arc<ClassificationConfig>,
        client: Arc<dyn AiClient>,
        retry: RetryPolicy,
    ) -> Self {
        Self::with_strategies(vec![
            Box::new(ManualListStrategy::new(&config)),
            Box::new(AiStrategy::new(client, retry)),
            Box::new(KeywordStrategy::new(&config)),
        ])
    }

    /// Build a categorizer from an explicit stage list
    pub fn with_strategies(strategies: Vec<Box<dyn ClassificationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Categorize a company. Never fails: AI errors fall through to the next
    /// stage and a chain with no verdict yields `Other`.
    pub async fn categorize(
        &self,
        company: &str,
        title: &str,
        cancel: &CancellationToken,
    ) -> ClassificationResult {
        if company.trim().is_empty() {
            debug!("Empty company name, defaulting to Other");
            return ClassificationResult::new(CompanyCategory::Other, ClassificationSource::Default);
        }

        let input = CompanyInput { company, title };
        let mut fallback: Option<FallbackReason> = None;

        for strategy in &self.strategies {
            match strategy.classify(input, cancel).await {
                Ok(Some(category)) => {
                    info!(
                        "Classified {} as {} ({})",
                        company,
                        category,
                        strategy.name()
                    );
                    return ClassificationResult {
                        category,
                        source: strategy.source(),
                        fallback,
                    };
                }
                Ok(None) => {
                    debug!("Stage {} had no match for {}", strategy.name(), company);
                }
                Err(e) => {
                    let reason = FallbackReason::from_error(&e);
                    match reason {
                        FallbackReason::AiDisabled | FallbackReason::Cancelled => {
                            debug!("Stage {} skipped for {}: {}", strategy.name(), company, e)
                        }
                        _ => warn!(
                            "Stage {} failed for {}: {}. Falling back",
                            strategy.name(),
                            company,
                            e
                        ),
                    }
                    fallback = Some(reason);
                }
            }
        }

        ClassificationResult {
            category: CompanyCategory::Other,
            source: ClassificationSource::Default,
            fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DisabledAiClient;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Replies with a fixed result and counts calls
    struct FixedClient {
        reply: fn() -> Result<String>,
        calls: AtomicU32,
    }

    impl FixedClient {
        fn new(reply: fn() -> Result<String>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiClient for FixedClient {
        async fn classify(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.reply)()
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.reply)()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, 2.0, 60.0, Duration::from_millis(1))
    }

    fn categorizer(client: Arc<dyn AiClient>) -> CompanyCategorizer {
        CompanyCategorizer::new(
            Arc::new(ClassificationConfig::default()),
            client,
            fast_retry(),
        )
    }

    #[test]
    fn test_parse_category_reply() {
        assert_eq!(parse_category_reply("Builder").unwrap(), CompanyCategory::Builder);
        assert_eq!(parse_category_reply("  owner\n").unwrap(), CompanyCategory::Owner);
        assert_eq!(parse_category_reply("**Other**").unwrap(), CompanyCategory::Other);
        assert_eq!(parse_category_reply("\"Builder.\"").unwrap(), CompanyCategory::Builder);
        assert_eq!(parse_category_reply("Partner").unwrap(), CompanyCategory::Partner);

        assert!(matches!(
            parse_category_reply("Unknown"),
            Err(OutreachError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_category_reply(" ** "),
            Err(OutreachError::InvalidResponse(_))
        ));
        assert!(parse_category_reply("Builder or Owner").is_err());
    }

    #[test]
    fn test_prompt_contains_inputs() {
        let prompt = build_classification_prompt("Riverside Builders", "Site Superintendent");
        assert!(prompt.contains("Company: Riverside Builders"));
        assert!(prompt.contains("Person's Title: Site Superintendent"));
        assert!(prompt.contains("Builder, Owner, or Other"));
    }

    #[test]
    fn test_manual_list_competitor_wins_over_partner() {
        let strategy = ManualListStrategy::new(&ClassificationConfig::default());

        // Trimble is on both lists
        assert_eq!(strategy.lookup("Trimble Inc"), Some(CompanyCategory::Competitor));
        assert_eq!(strategy.lookup("procore technologies"), Some(CompanyCategory::Partner));
        assert_eq!(strategy.lookup("Riverside Builders"), None);
    }

    #[test]
    fn test_keyword_strategy_title_before_company() {
        let strategy = KeywordStrategy::new(&ClassificationConfig::default());

        assert_eq!(
            strategy.categorize("Riverside Holdings", "Site Superintendent"),
            CompanyCategory::Builder
        );
        assert_eq!(
            strategy.categorize("Acme Real Estate", "Chief Executive"),
            CompanyCategory::Owner
        );
        // "developer" is on both tables; builder keywords are checked first
        assert_eq!(
            strategy.categorize("Acme", "Senior Developer"),
            CompanyCategory::Builder
        );
        assert_eq!(
            strategy.categorize("Acme Corp", "Chief Executive"),
            CompanyCategory::Other
        );
    }

    #[tokio::test]
    async fn test_empty_company_defaults_without_calls() {
        let client = FixedClient::new(|| Ok("Builder".to_string()));
        let categorizer = categorizer(client.clone());
        let cancel = CancellationToken::new();

        let result = categorizer.categorize("   ", "Project Manager", &cancel).await;

        assert_eq!(result.category, CompanyCategory::Other);
        assert_eq!(result.source, ClassificationSource::Default);
        assert_eq!(result.fallback, None);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_manual_list_skips_ai() {
        let client = FixedClient::new(|| Err(OutreachError::QuotaExceeded("quota".to_string())));
        let categorizer = categorizer(client.clone());
        let cancel = CancellationToken::new();

        let result = categorizer.categorize("DJI Enterprise", "Sales Lead", &cancel).await;

        assert_eq!(result.category, CompanyCategory::Competitor);
        assert_eq!(result.source, ClassificationSource::ManualList);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_ai_result_used() {
        let client = FixedClient::new(|| Ok("Owner\n".to_string()));
        let categorizer = categorizer(client.clone());
        let cancel = CancellationToken::new();

        let result = categorizer
            .categorize("Harbor Point Group", "Director", &cancel)
            .await;

        assert_eq!(result.category, CompanyCategory::Owner);
        assert_eq!(result.source, ClassificationSource::AiModel);
        assert_eq!(result.fallback, None);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_reply_falls_back_to_keywords() {
        let client = FixedClient::new(|| Ok("Unknown".to_string()));
        let categorizer = categorizer(client.clone());
        let cancel = CancellationToken::new();

        let result = categorizer
            .categorize("Riverside Builders", "Site Superintendent", &cancel)
            .await;

        assert_eq!(result.category, CompanyCategory::Builder);
        assert_eq!(result.source, ClassificationSource::Keyword);
        assert_eq!(result.fallback, Some(FallbackReason::InvalidResponse));
        // Invalid replies are not retried
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_quota_errors_exhaust_then_keywords() {
        let client = FixedClient::new(|| Err(OutreachError::QuotaExceeded("429".to_string())));
        let categorizer = categorizer(client.clone());
        let cancel = CancellationToken::new();

        let result = categorizer
            .categorize("Harbor Point Group", "Asset Manager", &cancel)
            .await;

        assert_eq!(result.category, CompanyCategory::Owner);
        assert_eq!(result.source, ClassificationSource::Keyword);
        assert_eq!(result.fallback, Some(FallbackReason::RetriesExhausted));
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_disabled_ai_records_reason() {
        let categorizer = categorizer(Arc::new(DisabledAiClient));
        let cancel = CancellationToken::new();

        let result = categorizer
            .categorize("Riverside Builders", "Site Superintendent", &cancel)
            .await;

        assert_eq!(result.category, CompanyCategory::Builder);
        assert_eq!(result.source, ClassificationSource::Keyword);
        assert_eq!(result.fallback, Some(FallbackReason::AiDisabled));
    }

    #[tokio::test]
    async fn test_chain_without_verdict_defaults_to_other() {
        let categorizer = CompanyCategorizer::with_strategies(vec![Box::new(
            ManualListStrategy::new(&ClassificationConfig::default()),
        )]);
        let cancel = CancellationToken::new();

        let result = categorizer.categorize("Nobody Ltd", "Analyst", &cancel).await;

        assert_eq!(result.category, CompanyCategory::Other);
        assert_eq!(result.source, ClassificationSource::Default);
    }
}
