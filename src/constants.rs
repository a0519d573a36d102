/// Maximum characters of prediction text per SMS part, before the page suffix.
pub(crate) const DEFAULT_SMS_CHUNK_LEN: usize = 130;

/// Default number of delivery attempts per message unit.
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause between delivery attempts in milliseconds.
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 2000;

/// Default pause after every delivered unit in milliseconds.
pub(crate) const DEFAULT_INTER_MESSAGE_DELAY_MS: u64 = 1000;

/// Default pause between recipients in milliseconds.
pub(crate) const DEFAULT_INTER_RECIPIENT_DELAY_MS: u64 = 3000;

/// SMTP reply code that confirms the connection is healthy.
pub(crate) const SMTP_OK: u16 = 250;

/// Default SMTP submission port (STARTTLS).
pub(crate) const DEFAULT_SMTP_PORT: u16 = 587;

/// Timeout for forecast, LLM and forms HTTP requests.
pub(crate) const HTTP_TIMEOUT_SECS: u64 = 30;

/// Timeout for establishing the SMTP connection.
pub(crate) const SMTP_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default forecast provider base URL.
pub(crate) const DEFAULT_WEATHER_API_BASE: &str = "https://api.weatherapi.com/v1";

/// Days of forecast requested (today and tomorrow).
pub(crate) const DEFAULT_FORECAST_DAYS: u8 = 2;

/// Default OpenAI-compatible API base URL.
pub(crate) const DEFAULT_LLM_API_BASE: &str = "https://api.openai.com/v1";

/// Default chat model.
pub(crate) const DEFAULT_MODEL: &str = "gpt-4";

/// Default percentage a prediction must reach before anyone is notified.
pub(crate) const DEFAULT_THRESHOLD: u8 = 50;

/// Seconds between assistant run status checks.
pub(crate) const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Maximum assistant run status checks before giving up.
pub(crate) const DEFAULT_MAX_POLLS: u32 = 30;

/// Default forms API base URL.
pub(crate) const DEFAULT_FORMS_API_BASE: &str = "https://forms.googleapis.com/v1";

/// Placeholder substituted for any weather field the provider omitted.
pub(crate) const NO_DATA: &str = "No data";

/// Evening hours (inclusive start, exclusive end) read from today's forecast.
pub(crate) const EVENING_HOURS: (u32, u32) = (19, 24);

/// Morning hours (inclusive start, exclusive end) read from tomorrow's forecast.
pub(crate) const MORNING_HOURS: (u32, u32) = (0, 8);
