//! Prompt text sent to the language model.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

use crate::config::SchoolConfig;
use crate::constants::{EVENING_HOURS, MORNING_HOURS};
use crate::error::AppError;
use crate::weather::WeatherFields;

pub(crate) fn local_now(timezone: &str) -> Result<DateTime<Tz>, AppError> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| AppError::Config(format!("unknown timezone {timezone:?}")))?;
    Ok(Utc::now().with_timezone(&tz))
}

/// Rotate through the configured personas, one per day.
pub(crate) fn pick_theme<'a>(themes: &'a [String], now: &DateTime<Tz>) -> Option<&'a str> {
    if themes.is_empty() {
        return None;
    }
    let idx = now.ordinal0() as usize % themes.len();
    Some(themes[idx].as_str())
}

pub(crate) fn build_prediction_prompt(
    fields: &WeatherFields,
    policy: &str,
    school: &SchoolConfig,
    zip_code: &str,
    now: &DateTime<Tz>,
    theme: Option<&str>,
) -> String {
    let unknown = "unknown";
    let mut lines = vec![
        "Respond with a percentage chance that a snow day will occur tomorrow, followed by a one to \
         three sentence explanation of how you came to that conclusion. If tomorrow is Saturday or \
         Sunday, the chance is 0%."
            .to_string(),
    ];
    if let Some(theme) = theme {
        lines.push(format!("Write your answer in the voice of: {theme}."));
    }

    lines.push(String::new());
    lines.push("School information:".to_string());
    lines.push(format!("- Current date and time: {}", now.format("%A, %B %-d %Y %-I:%M %p %Z")));
    lines.push(format!("- School name: {}", school.name));
    lines.push(format!("- State: {}", school.state));
    lines.push(format!("- Town or city: {}", school.town.as_deref().unwrap_or(unknown)));
    lines.push(format!("- County: {}", school.county.as_deref().unwrap_or(unknown)));
    lines.push(format!("- Zip code: {zip_code}"));
    lines.push(format!("- Current month: {} (of 12)", now.month()));
    if let Some(start) = &school.start_time {
        lines.push(format!("- School starts at {start} tomorrow"));
    }
    if let (Some(mascot), Some(colors)) = (&school.mascot, &school.colors) {
        lines.push(format!("- Mascot: the {mascot}, school colors {colors}"));
    }

    for (label, prefix) in [("Today", "current_day"), ("Tomorrow", "next_day")] {
        let f = |suffix: &str| fields.display(&format!("{prefix}_{suffix}"));
        lines.push(String::new());
        lines.push(format!(
            "{label}: low {}°F, high {}°F, max wind {} MPH, total precipitation {} in, \
             {}% chance of snow, {}% chance of rain, average humidity {}%, conditions: {}.",
            f("mintemp_f"),
            f("maxtemp_f"),
            f("maxwind_mph"),
            f("totalprecip_in"),
            f("daily_chance_of_snow"),
            f("daily_chance_of_rain"),
            f("daily_avghumidity"),
            f("conditions"),
        ));
    }

    lines.push(String::new());
    lines.push("Hourly conditions from 7 PM to 8 AM (24-hour clock):".to_string());
    for h in (EVENING_HOURS.0..EVENING_HOURS.1).chain(MORNING_HOURS.0..MORNING_HOURS.1) {
        let f = |suffix: &str| fields.display(&format!("hour_{h}_{suffix}"));
        lines.push(format!(
            "Hour {h}: {}, temp {}°F, feels like {}°F, wind chill {}°F, snow {}%, rain {}%, \
             wind {} MPH, gusts {} MPH, visibility {} miles, snowfall {} cm, humidity {}%, \
             cloud cover {}%, pressure {} in, UV {}",
            f("condition"),
            f("temp_f"),
            f("feelslike_f"),
            f("windchill_f"),
            f("chance_of_snow"),
            f("chance_of_rain"),
            f("wind_mph"),
            f("gust_mph"),
            f("visibility_miles"),
            f("snow_cm"),
            f("humidity"),
            f("cloud"),
            f("pressure_in"),
            f("uv"),
        ));
    }

    if fields.has_alert() {
        lines.push(String::new());
        lines.push(format!(
            "Active weather alert (only relevant if it covers {} county):",
            school.county.as_deref().unwrap_or(unknown)
        ));
        for name in ["event", "description", "severity", "certainty", "urgency"] {
            let key = if name == "description" { "desc" } else { name };
            lines.push(format!("- {name}: {}", fields.display(&format!("weather_alert_{key}"))));
        }
    }

    if !policy.trim().is_empty() {
        lines.push(String::new());
        lines.push(format!("The school's snow day policy:\n{}", policy.trim()));
    }

    lines.push(String::new());
    lines.join("\n")
}

pub(crate) fn build_classification_prompt(prediction: &str, threshold: u8) -> String {
    format!(
        "Analyze the following message and respond with ONLY the word \"True\" or \"False\". \
         Answer True if it gives a greater than or equal to {threshold}% chance of a snow day. \
         Here is the message:\n{prediction}"
    )
}
