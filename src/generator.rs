//! Personalized email generation
//!
//! The AI provider writes the email; when it fails for any reason a
//! deterministic per-category template is used instead, so the generator
//! never returns an empty subject or body.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::AiClient;
use crate::config::{CampaignConfig, EmailConfig};
use crate::error::{OutreachError, Result};
use crate::models::{CompanyCategory, EmailContent, EmailSource, FallbackReason, SpeakerRecord};
use crate::retry::RetryPolicy;

/// `SUBJECT:` / `BODY:` markers, tolerating markdown bold, headings and list bullets
static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s#>*_\-]*(subject|body)[\s*_]*:[\s*_]*(.*)$").unwrap()
});

/// Per-category prompt context
struct CategoryPitch {
    role_context: &'static str,
    value_props: &'static str,
}

fn pitch_for(category: CompanyCategory) -> CategoryPitch {
    match category {
        CompanyCategory::Builder => CategoryPitch {
            role_context: "construction professionals who build and manage projects",
            value_props: "aerial intelligence for construction progress tracking, site management, and project oversight",
        },
        CompanyCategory::Owner => CategoryPitch {
            role_context: "property owners and developers who commission construction projects",
            value_props: "aerial intelligence for project monitoring, progress verification, and asset management",
        },
        _ => CategoryPitch {
            role_context: "construction industry professionals",
            value_props: "aerial intelligence for construction and site management",
        },
    }
}

pub struct EmailGenerator {
    client: Arc<dyn AiClient>,
    retry: RetryPolicy,
    campaign: CampaignConfig,
    limits: EmailConfig,
}

impl EmailGenerator {
    pub fn new(
        client: Arc<dyn AiClient>,
        retry: RetryPolicy,
        campaign: CampaignConfig,
        limits: EmailConfig,
    ) -> Self {
        Self {
            client,
            retry,
            campaign,
            limits,
        }
    }

    /// Generate the email for one speaker. Infallible.
    pub async fn generate(
        &self,
        speaker: &SpeakerRecord,
        category: CompanyCategory,
        cancel: &CancellationToken,
    ) -> EmailContent {
        match self.generate_with_ai(speaker, category, cancel).await {
            Ok((subject, body)) => EmailContent {
                subject,
                body,
                source: EmailSource::AiModel,
                fallback: None,
            },
            Err(e) => {
                let reason = FallbackReason::from_error(&e);
                if matches!(reason, FallbackReason::AiDisabled | FallbackReason::Cancelled) {
                    debug!("Using fallback email for {}: {}", speaker.name(), e);
                } else {
                    warn!("Email generation failed for {}: {}", speaker.name(), e);
                }
                let mut email = self.fallback_email(speaker, category);
                email.fallback = Some(reason);
                email
            }
        }
    }

    async fn generate_with_ai(
        &self,
        speaker: &SpeakerRecord,
        category: CompanyCategory,
        cancel: &CancellationToken,
    ) -> Result<(String, String)> {
        let prompt = self.build_prompt(speaker, category);
        let reply = self
            .retry
            .call("generate_email", cancel, || self.client.generate(&prompt))
            .await?;

        let (subject, body) = parse_email_reply(&reply)?;
        self.check_limits(&subject, &body)?;
        Ok((subject, body))
    }

    fn check_limits(&self, subject: &str, body: &str) -> Result<()> {
        let subject_len = subject.chars().count();
        if subject_len > self.limits.subject_max_length {
            return Err(OutreachError::InvalidResponse(format!(
                "subject is {} characters, limit is {}",
                subject_len, self.limits.subject_max_length
            )));
        }
        let body_len = body.chars().count();
        if body_len > self.limits.body_max_length {
            return Err(OutreachError::InvalidResponse(format!(
                "body is {} characters, limit is {}",
                body_len, self.limits.body_max_length
            )));
        }
        Ok(())
    }

    /// Prompt sent to the AI generator
    pub fn build_prompt(&self, speaker: &SpeakerRecord, category: CompanyCategory) -> String {
        let pitch = pitch_for(category);
        let CampaignConfig {
            product,
            booth,
            incentive,
        } = &self.campaign;

        format!(
            "You are writing a personalized email to invite a construction conference speaker to visit {product}'s booth {booth}.\n\
             \n\
             Speaker Details:\n\
             - Name: {name}\n\
             - Title: {title}\n\
             - Company: {company}\n\
             - Category: {category} ({role_context})\n\
             \n\
             Requirements:\n\
             1. Subject line: Create an interesting hook that would appeal to their specific role and industry (max {subject_max} characters)\n\
             2. Email body: 2-3 sentences that:\n\
             \x20  - Mention why {product} is relevant to their business/role\n\
             \x20  - Invite them to booth {booth} for a demo\n\
             \x20  - Mention they'll receive {incentive}\n\
             \x20  - Keep it professional but engaging\n\
             \n\
             {product} Value Props to Consider:\n\
             - {value_props}\n\
             - Drone-based aerial mapping and surveying\n\
             - Construction progress tracking and documentation\n\
             - Site safety and compliance monitoring\n\
             - Integration with construction management software\n\
             \n\
             Format your response as:\n\
             SUBJECT: [subject line here]\n\
             BODY: [email body here]\n",
            product = product,
            booth = booth,
            incentive = incentive,
            name = speaker.name(),
            title = speaker.title(),
            company = speaker.company(),
            category = category,
            role_context = pitch.role_context,
            value_props = pitch.value_props,
            subject_max = self.limits.subject_max_length,
        )
    }

    /// Deterministic template for when the AI path fails
    pub fn fallback_email(&self, speaker: &SpeakerRecord, category: CompanyCategory) -> EmailContent {
        let name = speaker.name();
        let title = speaker.title();
        let company = speaker.company();
        let CampaignConfig {
            product,
            booth,
            incentive,
        } = &self.campaign;

        let (subject, body) = match category {
            CompanyCategory::Builder => (
                format!("See how {} can streamline construction with aerial intelligence", company),
                format!(
                    "Hi {}, as a {} at {}, you know how important it is to track construction progress efficiently. \
                     {}'s aerial intelligence platform helps construction teams like yours monitor projects, \
                     ensure safety compliance, and deliver on time. Stop by our booth {} for a personalized demo \
                     and receive {}!",
                    name, title, company, product, booth, incentive
                ),
            ),
            CompanyCategory::Owner => (
                format!("Monitor your {} construction investments with aerial intelligence", company),
                format!(
                    "Hi {}, as a {} at {}, you understand the value of transparent project oversight. \
                     {} provides property owners and developers with real-time aerial insights to verify \
                     progress, ensure quality, and protect your investments. Visit booth {} for a demo \
                     and {}!",
                    name, title, company, product, booth, incentive
                ),
            ),
            _ => (
                format!("Discover how {} can benefit from construction aerial intelligence", company),
                format!(
                    "Hi {}, {}'s aerial intelligence platform is transforming how construction professionals \
                     manage projects and sites. As a {} at {}, you'll see immediate value in our progress \
                     tracking and site management capabilities. Stop by booth {} for a demo and {}!",
                    name, product, title, company, booth, incentive
                ),
            ),
        };

        EmailContent {
            subject,
            body,
            source: EmailSource::Fallback,
            fallback: None,
        }
    }
}

/// Extract subject and body from a `SUBJECT: ... BODY: ...` reply.
///
/// Non-empty lines after `BODY:` are joined onto the body with single spaces.
pub fn parse_email_reply(reply: &str) -> Result<(String, String)> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Subject,
        Body,
    }

    let mut subject = String::new();
    let mut body_parts: Vec<String> = Vec::new();
    let mut section = Section::None;

    for raw_line in reply.lines() {
        let line = raw_line.trim();

        if let Some(caps) = MARKER.captures(line) {
            let marker = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            let rest = caps.get(2).map(|m| clean_line(m.as_str())).unwrap_or_default();
            if marker == "subject" {
                subject = rest;
                section = Section::Subject;
            } else {
                body_parts.clear();
                if !rest.is_empty() {
                    body_parts.push(rest);
                }
                section = Section::Body;
            }
            continue;
        }

        if section == Section::Body && !line.is_empty() {
            body_parts.push(clean_line(line));
        }
    }

    let body = body_parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if subject.is_empty() {
        return Err(OutreachError::InvalidResponse(
            "reply has no SUBJECT line".to_string(),
        ));
    }
    if body.is_empty() {
        return Err(OutreachError::InvalidResponse(
            "reply has no BODY text".to_string(),
        ));
    }

    Ok((subject, body))
}

/// Strip leftover markdown emphasis around a line
fn clean_line(line: &str) -> String {
    line.trim()
        .trim_matches(|c: char| c == '*' || c == '_')
        .trim()
        .to_string()
}
