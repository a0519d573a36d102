//! Process-wide settings, loaded once from YAML at startup and read-only afterwards.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::AppError;
use crate::recipients::Recipient;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) testing_mode: bool,
    pub(crate) school: SchoolConfig,
    pub(crate) zip_code: String,
    /// Text file describing what closes the school. Sent to the model verbatim.
    #[serde(default)]
    pub(crate) policy_path: Option<PathBuf>,
    #[serde(default = "default_history_path")]
    pub(crate) history_path: PathBuf,
    #[serde(default)]
    pub(crate) weather: WeatherConfig,
    #[serde(default)]
    pub(crate) llm: LlmConfig,
    pub(crate) smtp: SmtpConfig,
    #[serde(default)]
    pub(crate) delivery: DeliveryConfig,
    #[serde(default)]
    pub(crate) recipients: RecipientsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SchoolConfig {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) colors: Option<String>,
    #[serde(default)]
    pub(crate) mascot: Option<String>,
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) county: Option<String>,
    #[serde(default)]
    pub(crate) town: Option<String>,
    #[serde(default)]
    pub(crate) start_time: Option<String>,
    #[serde(default = "default_timezone")]
    pub(crate) timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WeatherConfig {
    #[serde(default = "default_weather_base")]
    pub(crate) base_url: String,
    #[serde(default = "default_forecast_days")]
    pub(crate) days: u8,
    #[serde(default = "default_true")]
    pub(crate) include_alerts: bool,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base(),
            days: default_forecast_days(),
            include_alerts: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LlmMode {
    /// One chat-completion request.
    #[default]
    Chat,
    /// Thread/run protocol against a named assistant, polled until complete.
    Assistant,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LlmConfig {
    #[serde(default)]
    pub(crate) mode: LlmMode,
    #[serde(default = "default_llm_base")]
    pub(crate) base_url: String,
    #[serde(default = "default_model")]
    pub(crate) model: String,
    /// Percent chance a prediction must reach before recipients are notified.
    #[serde(default = "default_threshold")]
    pub(crate) threshold: u8,
    /// Personas the model answers as, e.g. "A weather man".
    #[serde(default = "default_themes")]
    pub(crate) themes: Vec<String>,
    #[serde(default = "default_assistant_name")]
    pub(crate) assistant_name: String,
    #[serde(default)]
    pub(crate) assistant_id: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub(crate) poll_interval_secs: u64,
    #[serde(default = "default_max_polls")]
    pub(crate) max_polls: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: LlmMode::default(),
            base_url: default_llm_base(),
            model: default_model(),
            threshold: default_threshold(),
            themes: default_themes(),
            assistant_name: default_assistant_name(),
            assistant_id: None,
            poll_interval_secs: default_poll_interval(),
            max_polls: default_max_polls(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS.
    #[default]
    Starttls,
    /// TLS from the first byte (port 465).
    Tls,
    /// No encryption. Only for local relays and tests.
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SmtpConfig {
    pub(crate) host: String,
    #[serde(default = "default_smtp_port")]
    pub(crate) port: u16,
    #[serde(default)]
    pub(crate) security: SmtpSecurity,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DeliveryConfig {
    #[serde(default = "default_max_retries")]
    pub(crate) max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub(crate) retry_delay_ms: u64,
    #[serde(default = "default_inter_message_delay")]
    pub(crate) inter_message_delay_ms: u64,
    #[serde(default = "default_inter_recipient_delay")]
    pub(crate) inter_recipient_delay_ms: u64,
    #[serde(default = "default_sms_chunk_len")]
    pub(crate) sms_chunk_len: usize,
    /// Appended to email bodies.
    #[serde(default = "default_signoff")]
    pub(crate) signoff: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            inter_message_delay_ms: default_inter_message_delay(),
            inter_recipient_delay_ms: default_inter_recipient_delay(),
            sms_chunk_len: default_sms_chunk_len(),
            signoff: default_signoff(),
        }
    }
}

impl DeliveryConfig {
    pub(crate) fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub(crate) fn inter_message_delay(&self) -> Duration {
        Duration::from_millis(self.inter_message_delay_ms)
    }

    pub(crate) fn inter_recipient_delay(&self) -> Duration {
        Duration::from_millis(self.inter_recipient_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RecipientSourceKind {
    /// Sign-up form responses.
    Forms,
    /// `name,email` / `number,domain` lines.
    File,
    /// The `list` entries in this file.
    #[default]
    Inline,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FormsConfig {
    #[serde(default = "default_forms_base")]
    pub(crate) base_url: String,
    pub(crate) form_id: String,
    /// Question id whose text answer holds the respondent's name.
    pub(crate) name_question_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RecipientsConfig {
    #[serde(default)]
    pub(crate) source: RecipientSourceKind,
    #[serde(default)]
    pub(crate) forms: Option<FormsConfig>,
    #[serde(default)]
    pub(crate) file: Option<PathBuf>,
    #[serde(default)]
    pub(crate) list: Vec<RecipientEntry>,
    /// Who gets the prediction while in testing mode.
    #[serde(default)]
    pub(crate) testing: Vec<RecipientEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RecipientKind {
    #[default]
    Email,
    Sms,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RecipientEntry {
    pub(crate) address: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) kind: RecipientKind,
}

impl From<&RecipientEntry> for Recipient {
    fn from(entry: &RecipientEntry) -> Self {
        match entry.kind {
            RecipientKind::Email => Recipient::Email {
                address: entry.address.trim().to_string(),
                display_name: entry.name.clone(),
            },
            RecipientKind::Sms => Recipient::SmsGateway {
                address: entry.address.trim().to_string(),
            },
        }
    }
}

fn default_history_path() -> PathBuf {
    PathBuf::from("latest_prediction.txt")
}
fn default_timezone() -> String {
    "America/New_York".to_string()
}
fn default_weather_base() -> String {
    DEFAULT_WEATHER_API_BASE.to_string()
}
fn default_forecast_days() -> u8 {
    DEFAULT_FORECAST_DAYS
}
fn default_true() -> bool {
    true
}
fn default_llm_base() -> String {
    DEFAULT_LLM_API_BASE.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}
fn default_themes() -> Vec<String> {
    vec!["A weather man".to_string()]
}
fn default_assistant_name() -> String {
    "Blizzard".to_string()
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_max_polls() -> u32 {
    DEFAULT_MAX_POLLS
}
fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}
fn default_inter_message_delay() -> u64 {
    DEFAULT_INTER_MESSAGE_DELAY_MS
}
fn default_inter_recipient_delay() -> u64 {
    DEFAULT_INTER_RECIPIENT_DELAY_MS
}
fn default_sms_chunk_len() -> usize {
    DEFAULT_SMS_CHUNK_LEN
}
fn default_signoff() -> String {
    "Stay cool,\nBlizzard".to_string()
}
fn default_forms_base() -> String {
    DEFAULT_FORMS_API_BASE.to_string()
}

impl Config {
    pub(crate) fn load(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }

    pub(crate) fn from_yaml(content: &str) -> Result<Self, AppError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.zip_code.trim().is_empty() {
            return Err(AppError::Config("zip_code must not be empty".into()));
        }
        if self.delivery.max_retries == 0 {
            return Err(AppError::Config("delivery.max_retries must be at least 1".into()));
        }
        if self.delivery.sms_chunk_len == 0 {
            return Err(AppError::Config("delivery.sms_chunk_len must be at least 1".into()));
        }
        if !(1..=100).contains(&self.llm.threshold) {
            return Err(AppError::Config("llm.threshold must be between 1 and 100".into()));
        }
        if self.llm.max_polls == 0 {
            return Err(AppError::Config("llm.max_polls must be at least 1".into()));
        }
        if self.school.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(AppError::Config(format!(
                "unknown timezone {:?}",
                self.school.timezone
            )));
        }
        match self.recipients.source {
            RecipientSourceKind::Forms if self.recipients.forms.is_none() => Err(AppError::Config(
                "recipients.source is forms but recipients.forms is missing".into(),
            )),
            RecipientSourceKind::File if self.recipients.file.is_none() => Err(AppError::Config(
                "recipients.source is file but recipients.file is missing".into(),
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn testing_recipients(&self) -> Vec<Recipient> {
        self.recipients.testing.iter().map(Recipient::from).collect()
    }
}
