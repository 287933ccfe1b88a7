//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use speaker_outreach::client::AiClient;
use speaker_outreach::config::{Config, ValidationConfig};
use speaker_outreach::error::{OutreachError, Result};
use speaker_outreach::models::SpeakerRecord;
use speaker_outreach::retry::RetryPolicy;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Create a validated speaker with default limits
pub fn create_speaker(name: &str, title: &str, company: &str) -> SpeakerRecord {
    SpeakerRecord::new(name, title, company, &ValidationConfig::default())
        .expect("fixture speaker should be valid")
}

/// Default config with millisecond backoff and no pacing delay
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.unit_ms = 1;
    config.rate_limit.api_delay_ms = 0;
    config
}

/// Three attempts with millisecond backoff
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, 2.0, 60.0, Duration::from_millis(1))
}

pub fn quota_error() -> OutreachError {
    OutreachError::QuotaExceeded("429 You exceeded your current quota".to_string())
}

pub fn server_error() -> OutreachError {
    OutreachError::ApiError {
        status: 500,
        message: "Internal Server Error".to_string(),
    }
}

/// Well-formed email reply
pub fn email_reply(subject: &str, body: &str) -> String {
    format!("SUBJECT: {}\nBODY: {}", subject, body)
}

/// AI fake that replays queued results in call order and counts calls.
/// An empty queue answers with `InvalidResponse`.
#[derive(Default)]
pub struct ScriptedAiClient {
    classify_script: Mutex<VecDeque<Result<String>>>,
    generate_script: Mutex<VecDeque<Result<String>>>,
    classify_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classify(self, replies: Vec<Result<String>>) -> Self {
        if let Ok(mut script) = self.classify_script.lock() {
            script.extend(replies);
        }
        self
    }

    pub fn with_generate(self, replies: Vec<Result<String>>) -> Self {
        if let Ok(mut script) = self.generate_script.lock() {
            script.extend(replies);
        }
        self
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next(&self, script: &Mutex<VecDeque<Result<String>>>, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| Err(OutreachError::InvalidResponse("script exhausted".to_string())))
    }
}

#[async_trait]
impl AiClient for ScriptedAiClient {
    async fn classify(&self, prompt: &str) -> Result<String> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        self.next(&self.classify_script, prompt)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.next(&self.generate_script, prompt)
    }
}

// Mock implementation of AiClient for testing
mock! {
    pub Ai {}

    #[async_trait::async_trait]
    impl AiClient for Ai {
        async fn classify(&self, prompt: &str) -> Result<String>;
        async fn generate(&self, prompt: &str) -> Result<String>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_speaker() {
        let speaker = create_speaker("Jane  Doe", "Site Superintendent", "Riverside Builders");
        assert_eq!(speaker.name(), "Jane Doe");
        assert_eq!(speaker.company(), "Riverside Builders");
    }

    #[tokio::test]
    async fn test_scripted_client_replays_in_order() {
        let client = ScriptedAiClient::new()
            .with_classify(vec![Err(quota_error()), Ok("Builder".to_string())]);

        assert!(client.classify("first").await.is_err());
        assert_eq!(client.classify("second").await.unwrap(), "Builder");
        assert!(matches!(
            client.classify("third").await,
            Err(OutreachError::InvalidResponse(_))
        ));
        assert_eq!(client.classify_calls(), 3);
        assert_eq!(client.generate_calls(), 0);
        assert_eq!(client.prompts(), vec!["first", "second", "third"]);
    }
}
