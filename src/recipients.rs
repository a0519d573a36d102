use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::FormsConfig;
use crate::constants::HTTP_TIMEOUT_SECS;
use crate::error::AppError;
use crate::traits::RecipientSource;

/// Someone who receives the prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recipient {
    Email {
        address: String,
        display_name: Option<String>,
    },
    /// A carrier's email-to-SMS alias, e.g. `5551234567@vtext.com`.
    SmsGateway { address: String },
}

impl Recipient {
    pub(crate) fn address(&self) -> &str {
        match self {
            Recipient::Email { address, .. } | Recipient::SmsGateway { address } => address,
        }
    }

    pub(crate) fn display_name(&self) -> Option<&str> {
        match self {
            Recipient::Email { display_name, .. } => display_name.as_deref(),
            Recipient::SmsGateway { .. } => None,
        }
    }

    /// Whether the transport behind this address truncates long messages.
    pub(crate) fn is_length_limited(&self) -> bool {
        matches!(self, Recipient::SmsGateway { .. })
    }
}

/// Drop repeated addresses (case-insensitive), keeping the first occurrence.
pub(crate) fn dedupe(recipients: Vec<Recipient>) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter(|r| seen.insert(r.address().to_ascii_lowercase()))
        .collect()
}

/// Parse one `name,email` or `number,domain` line.
///
/// A first field made only of digits (and phone punctuation) is a phone number and the
/// pair becomes an SMS gateway address; otherwise the line is a named email recipient.
pub(crate) fn parse_recipient_line(line: &str) -> Option<Recipient> {
    let (first, second) = line.split_once(',')?;
    let (first, second) = (first.trim(), second.trim());
    if first.is_empty() || second.is_empty() || second.contains(',') {
        return None;
    }
    if first.chars().chain(second.chars()).any(char::is_control) {
        return None;
    }

    let digits: String = first.chars().filter(|c| c.is_ascii_digit()).collect();
    let is_phone = !digits.is_empty()
        && first
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '(' | ')' | ' ' | '+' | '.'));

    if is_phone {
        let domain = second.trim_start_matches('@');
        if !is_plain_address(domain) || domain.contains('@') {
            return None;
        }
        return Some(Recipient::SmsGateway {
            address: format!("{digits}@{domain}"),
        });
    }

    if !second.contains('@') || !is_plain_address(second) {
        return None;
    }
    Some(Recipient::Email {
        address: second.to_string(),
        display_name: Some(first.to_string()),
    })
}

/// An address must be one token with no control characters.
fn is_plain_address(address: &str) -> bool {
    !address.is_empty() && !address.chars().any(|c| c.is_control() || c.is_whitespace())
}

/// Form answers are free text; drop control characters so a name stays one line.
fn clean_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

pub(crate) fn parse_recipient_file(content: &str) -> Vec<Recipient> {
    let mut recipients = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_recipient_line(line) {
            Some(r) => recipients.push(r),
            None => warn!(line = n + 1, "Skipping malformed recipient line"),
        }
    }
    recipients
}

/// Flat-file recipient list.
pub(crate) struct FileRecipients {
    path: PathBuf,
}

impl FileRecipients {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RecipientSource for FileRecipients {
    async fn fetch_recipients(&self) -> Result<Vec<Recipient>, AppError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AppError::Recipients(format!("{}: {e}", self.path.display())))?;
        let recipients = parse_recipient_file(&content);
        info!(path = %self.path.display(), count = recipients.len(), "Loaded recipients from file");
        Ok(recipients)
    }
}

/// Recipients listed directly in the config file.
pub(crate) struct InlineRecipients {
    recipients: Vec<Recipient>,
}

impl InlineRecipients {
    pub(crate) fn new(recipients: Vec<Recipient>) -> Self {
        Self { recipients }
    }
}

#[async_trait]
impl RecipientSource for InlineRecipients {
    async fn fetch_recipients(&self) -> Result<Vec<Recipient>, AppError> {
        Ok(self.recipients.clone())
    }
}

/// Sign-ups collected through a forms provider's responses endpoint.
pub(crate) struct FormsRecipients {
    http: Client,
    config: FormsConfig,
    token: String,
}

impl FormsRecipients {
    pub(crate) fn new(config: FormsConfig, token: String) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Recipients(e.to_string()))?;
        Ok(Self { http, config, token })
    }

    fn parse_responses(&self, body: &Value) -> Vec<Recipient> {
        let Some(responses) = body["responses"].as_array() else {
            return Vec::new();
        };

        let name_key = &self.config.name_question_id;
        responses
            .iter()
            .filter_map(|resp| {
                let email = resp["respondentEmail"].as_str()?.trim();
                let name = clean_name(
                    resp["answers"][name_key.as_str()]["textAnswers"]["answers"][0]["value"].as_str()?,
                );
                if !is_plain_address(email) || name.is_empty() {
                    debug!("Skipping incomplete form response");
                    return None;
                }
                Some(Recipient::Email {
                    address: email.to_string(),
                    display_name: Some(name),
                })
            })
            .collect()
    }
}

#[async_trait]
impl RecipientSource for FormsRecipients {
    async fn fetch_recipients(&self) -> Result<Vec<Recipient>, AppError> {
        let url = format!(
            "{}/forms/{}/responses",
            self.config.base_url.trim_end_matches('/'),
            self.config.form_id
        );
        info!("Fetching sign-up responses");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AppError::Recipients(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::Recipients(format!("forms API returned {status}: {text}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Recipients(format!("malformed forms response: {e}")))?;
        Ok(self.parse_responses(&body))
    }
}
