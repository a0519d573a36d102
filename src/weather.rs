use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{EVENING_HOURS, HTTP_TIMEOUT_SECS, MORNING_HOURS, NO_DATA};
use crate::error::AppError;
use crate::traits::WeatherApi;

/// Daily summary fields: (output suffix, path under `forecastday[n].day`).
const DAILY_FIELDS: &[(&str, &str)] = &[
    ("mintemp_f", "/mintemp_f"),
    ("maxtemp_f", "/maxtemp_f"),
    ("maxwind_mph", "/maxwind_mph"),
    ("totalprecip_in", "/totalprecip_in"),
    ("daily_chance_of_snow", "/daily_chance_of_snow"),
    ("daily_chance_of_rain", "/daily_chance_of_rain"),
    ("daily_avghumidity", "/avghumidity"),
    ("conditions", "/condition/text"),
];

/// Hourly fields: (output suffix, path under `forecastday[n].hour[i]`).
const HOURLY_FIELDS: &[(&str, &str)] = &[
    ("condition", "/condition/text"),
    ("temp_f", "/temp_f"),
    ("chance_of_snow", "/chance_of_snow"),
    ("chance_of_rain", "/chance_of_rain"),
    ("wind_mph", "/wind_mph"),
    ("visibility_miles", "/vis_miles"),
    ("snow_cm", "/snow_cm"),
    ("humidity", "/humidity"),
    ("cloud", "/cloud"),
    ("pressure_in", "/pressure_in"),
    ("feelslike_f", "/feelslike_f"),
    ("windchill_f", "/windchill_f"),
    ("dewpoint_f", "/dewpoint_f"),
    ("gust_mph", "/gust_mph"),
    ("uv", "/uv"),
];

const ALERT_FIELDS: &[&str] = &["event", "severity", "certainty", "urgency", "desc"];

/// Flat key/scalar view of the forecast, plus the keys the provider left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct WeatherFields {
    values: BTreeMap<String, Value>,
    pub(crate) missing: Vec<String>,
}

impl WeatherFields {
    #[cfg(test)]
    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The value as prompt text, or `No data` when absent.
    pub(crate) fn display(&self, key: &str) -> String {
        match self.values.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => NO_DATA.to_string(),
            Some(other) => other.to_string(),
        }
    }

    pub(crate) fn has_alert(&self) -> bool {
        self.values.contains_key("weather_alert_event")
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    fn insert_from(&mut self, key: String, source: Option<&Value>) {
        match source {
            Some(v) if !v.is_null() => {
                self.values.insert(key, v.clone());
            }
            _ => self.missing.push(key),
        }
    }
}

/// Pull the evening-to-morning picture out of a forecast response.
///
/// Absent keys are never an error; they are listed in `missing` and render as `No data`.
pub(crate) fn extract_relevant_fields(forecast: &Value) -> WeatherFields {
    let mut fields = WeatherFields::default();

    for (prefix, day) in [("current_day", 0), ("next_day", 1)] {
        let summary = forecast.pointer(&format!("/forecast/forecastday/{day}/day"));
        for (suffix, path) in DAILY_FIELDS {
            fields.insert_from(
                format!("{prefix}_{suffix}"),
                summary.and_then(|d| d.pointer(path)),
            );
        }
    }

    extract_hours(forecast, 0, EVENING_HOURS, &mut fields);
    extract_hours(forecast, 1, MORNING_HOURS, &mut fields);

    if let Some(alert) = forecast.pointer("/alerts/alert/0") {
        for name in ALERT_FIELDS {
            fields.insert_from(format!("weather_alert_{name}"), alert.get(*name));
        }
    }

    if !fields.missing.is_empty() {
        warn!(
            missing = fields.missing.len(),
            "Forecast is missing some fields: {}",
            fields.missing.join(", ")
        );
    }
    fields
}

fn extract_hours(forecast: &Value, day: usize, (from, to): (u32, u32), fields: &mut WeatherFields) {
    let Some(hours) = forecast
        .pointer(&format!("/forecast/forecastday/{day}/hour"))
        .and_then(Value::as_array)
    else {
        fields.missing.push(format!("forecastday_{day}_hour"));
        return;
    };

    for hour in hours {
        let Some(h) = hour["time"].as_str().and_then(hour_of_day) else {
            debug!("Skipping hourly entry without a readable time");
            continue;
        };
        if !(from..to).contains(&h) {
            continue;
        }
        for (suffix, path) in HOURLY_FIELDS {
            fields.insert_from(format!("hour_{h}_{suffix}"), hour.pointer(path));
        }
    }
}

/// Hour from a provider timestamp like `2026-01-15 19:00`.
fn hour_of_day(time: &str) -> Option<u32> {
    let (_, clock) = time.split_once(' ')?;
    let (hour, _) = clock.split_once(':')?;
    hour.trim().parse().ok()
}

/// weatherapi.com-compatible forecast client.
pub(crate) struct WeatherApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl WeatherApiClient {
    pub(crate) fn new(base_url: &str, api_key: String) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Fetch(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl WeatherApi for WeatherApiClient {
    async fn fetch_forecast(&self, zip: &str, days: u8, include_alerts: bool) -> Result<Value, AppError> {
        info!(zip = %zip, days, "Fetching forecast");
        let url = format!("{}/forecast.json", self.base_url);
        let days = days.to_string();
        let alerts = if include_alerts { "yes" } else { "no" };

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", zip),
                ("days", days.as_str()),
                ("aqi", "no"),
                ("alerts", alerts),
            ])
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("forecast request failed: {}", e.without_url())))?;

        if !resp.status().is_success() {
            return Err(AppError::Fetch(format!("forecast provider returned {}", resp.status())));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| AppError::Fetch(format!("malformed forecast: {}", e.without_url())))
    }
}
