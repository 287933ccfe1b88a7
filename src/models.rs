use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ValidationConfig;
use crate::error::{OutreachError, Result};

/// A validated conference speaker.
///
/// Only constructible through [`SpeakerRecord::new`], so every record that
/// reaches the categorizer has already passed length validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeakerRecord {
    name: String,
    title: String,
    company: String,
}

impl SpeakerRecord {
    /// Normalize whitespace and enforce the configured field lengths
    pub fn new(name: &str, title: &str, company: &str, limits: &ValidationConfig) -> Result<Self> {
        let name = normalize_field("name", name, limits.min_name_length, limits.max_name_length)?;
        let title = normalize_field(
            "title",
            title,
            limits.min_title_length,
            limits.max_title_length,
        )?;
        let company = normalize_field(
            "company",
            company,
            limits.min_company_length,
            limits.max_company_length,
        )?;

        Ok(Self {
            name,
            title,
            company,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn company(&self) -> &str {
        &self.company
    }
}

/// Collapse runs of whitespace into single spaces
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_field(field: &str, value: &str, min: usize, max: usize) -> Result<String> {
    let normalized = collapse_whitespace(value);
    let len = normalized.chars().count();

    if len == 0 {
        return Err(OutreachError::ValidationError(format!(
            "{} cannot be empty",
            field
        )));
    }
    if len < min {
        return Err(OutreachError::ValidationError(format!(
            "{} '{}' is shorter than {} characters",
            field, normalized, min
        )));
    }
    if len > max {
        return Err(OutreachError::ValidationError(format!(
            "{} is longer than {} characters",
            field, max
        )));
    }

    Ok(normalized)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompanyCategory {
    Builder,
    Owner,
    Competitor,
    Partner,
    Other,
}

impl CompanyCategory {
    pub const ALL: [CompanyCategory; 5] = [
        CompanyCategory::Builder,
        CompanyCategory::Owner,
        CompanyCategory::Competitor,
        CompanyCategory::Partner,
        CompanyCategory::Other,
    ];

    /// Builder and Owner get an email; everything else is excluded
    pub fn is_target(&self) -> bool {
        matches!(self, CompanyCategory::Builder | CompanyCategory::Owner)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyCategory::Builder => "Builder",
            CompanyCategory::Owner => "Owner",
            CompanyCategory::Competitor => "Competitor",
            CompanyCategory::Partner => "Partner",
            CompanyCategory::Other => "Other",
        }
    }
}

impl fmt::Display for CompanyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompanyCategory {
    type Err = OutreachError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        CompanyCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                OutreachError::InvalidResponse(format!("'{}' is not a company category", trimmed))
            })
    }
}

/// Which classification stage resolved a company
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassificationSource {
    ManualList,
    Keyword,
    AiModel,
    Default,
}

/// Why an AI stage was bypassed in favour of a fallback
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FallbackReason {
    AiDisabled,
    RetriesExhausted,
    NonRetryable,
    InvalidResponse,
    Cancelled,
}

impl FallbackReason {
    pub fn from_error(error: &OutreachError) -> Self {
        match error {
            OutreachError::AiDisabled => FallbackReason::AiDisabled,
            OutreachError::RetriesExhausted { .. } => FallbackReason::RetriesExhausted,
            OutreachError::InvalidResponse(_) => FallbackReason::InvalidResponse,
            OutreachError::Cancelled => FallbackReason::Cancelled,
            _ => FallbackReason::NonRetryable,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationResult {
    pub category: CompanyCategory,
    pub source: ClassificationSource,
    /// Set when the keyword stage ran because the AI stage failed
    pub fallback: Option<FallbackReason>,
}

impl ClassificationResult {
    pub fn new(category: CompanyCategory, source: ClassificationSource) -> Self {
        Self {
            category,
            source,
            fallback: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EmailSource {
    AiModel,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
    pub source: EmailSource,
    pub fallback: Option<FallbackReason>,
}

/// One CSV row per retained speaker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputRow {
    #[serde(rename = "Speaker Name")]
    pub speaker_name: String,
    #[serde(rename = "Speaker Title")]
    pub speaker_title: String,
    #[serde(rename = "Speaker Company")]
    pub speaker_company: String,
    #[serde(rename = "Company Category")]
    pub company_category: CompanyCategory,
    #[serde(rename = "Email Subject")]
    pub email_subject: String,
    #[serde(rename = "Email Body")]
    pub email_body: String,
}

impl OutputRow {
    pub fn new(speaker: &SpeakerRecord, category: CompanyCategory, email: EmailContent) -> Self {
        Self {
            speaker_name: speaker.name().to_string(),
            speaker_title: speaker.title().to_string(),
            speaker_company: speaker.company().to_string(),
            company_category: category,
            email_subject: email.subject,
            email_body: email.body,
        }
    }
}
