//! Noon forecast from Open-Meteo, shown in the menu header.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, warn};

use crate::{calendar::DateOffset, sources::HttpFetcher};

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Short display string such as `⛅ 14 °C`, or `None` when unavailable.
    async fn forecast(&self, offset: DateOffset) -> Option<String>;
}

#[derive(Debug, Default, Deserialize)]
pub struct Forecast {
    #[serde(default)]
    pub hourly: Option<Hourly>,
    #[serde(default)]
    pub hourly_units: Option<HourlyUnits>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Hourly {
    #[serde(default)]
    pub weather_code: Vec<Option<i64>>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HourlyUnits {
    #[serde(default)]
    pub temperature_2m: Option<String>,
}

/// Hourly arrays start at local midnight of today; pick 12:00 of the target day.
pub fn format_forecast(forecast: &Forecast, offset: DateOffset) -> Option<String> {
    let hourly = forecast.hourly.as_ref()?;
    let idx = 12 + 24 * offset.days() as usize;

    let emoji = hourly
        .weather_code
        .get(idx)
        .copied()
        .flatten()
        .and_then(weather_code_to_emoji);
    let temp = hourly.temperature_2m.get(idx).copied().flatten();

    let mut parts: Vec<String> = Vec::new();
    if let Some(e) = emoji {
        parts.push(e.to_string());
    }
    if let Some(t) = temp {
        parts.push(format!("{}", t.round() as i64));
        if let Some(unit) = forecast
            .hourly_units
            .as_ref()
            .and_then(|u| u.temperature_2m.as_deref())
            .filter(|u| !u.is_empty())
        {
            parts.push(unit.to_string());
        }
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// WMO weather interpretation code to emoji.
pub fn weather_code_to_emoji(code: i64) -> Option<&'static str> {
    let emoji = match code {
        0 => "🌞",
        1 => "🌤️",
        2 => "⛅",
        3 | 51 => "☁️",
        45 | 48 => "🌫️",
        80 => "🌦️",
        53 | 55 | 56 | 57 | 61 | 66 => "🌧️",
        71 | 73 | 77 | 85 | 86 => "🌨️",
        75 => "❄️",
        63 | 65 | 67 | 81 => "☔",
        82 | 95 | 96 | 99 => "🌩️",
        other => {
            warn!("Unrecognized weather code {other}");
            return None;
        }
    };
    Some(emoji)
}

pub struct OpenMeteoClient {
    http: Arc<HttpFetcher>,
    url: String,
}

impl OpenMeteoClient {
    /// `url` is the full forecast URL from settings (coordinates, hourly
    /// `weather_code,temperature_2m`, timezone).
    pub fn new(http: Arc<HttpFetcher>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    async fn forecast(&self, offset: DateOffset) -> Option<String> {
        match self.http.get_json::<Forecast>(&self.url, &[]).await {
            Ok(f) => format_forecast(&f, offset),
            Err(e) => {
                error!("Weather fetch failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Forecast {
        let mut codes = vec![Some(0); 48];
        let mut temps = vec![Some(0.0); 48];
        codes[12] = Some(2);
        temps[12] = Some(13.6);
        codes[36] = Some(63);
        temps[36] = Some(-2.4);
        serde_json::from_value(serde_json::json!({
            "hourly": {"weather_code": codes, "temperature_2m": temps},
            "hourly_units": {"temperature_2m": "°C"}
        }))
        .unwrap()
    }

    #[test]
    fn picks_noon_of_the_target_day() {
        assert_eq!(
            format_forecast(&sample(), DateOffset::Today).as_deref(),
            Some("⛅ 14 °C")
        );
        assert_eq!(
            format_forecast(&sample(), DateOffset::Tomorrow).as_deref(),
            Some("☔ -2 °C")
        );
    }

    #[test]
    fn short_or_empty_payload_gives_nothing() {
        assert_eq!(format_forecast(&Forecast::default(), DateOffset::Today), None);
        let short: Forecast =
            serde_json::from_value(serde_json::json!({"hourly": {"weather_code": [0]}})).unwrap();
        assert_eq!(format_forecast(&short, DateOffset::Today), None);
    }

    #[test]
    fn unknown_code_has_no_emoji() {
        assert_eq!(weather_code_to_emoji(42), None);
        assert_eq!(weather_code_to_emoji(75), Some("❄️"));
    }
}
