use std::ops::RangeInclusive;

use axum::response::Json;
use chrono::{Days, Local, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::middleware::DiagnosticContext;

pub const FORECAST_DAYS: u64 = 5;
pub const TEMPERATURE_RANGE_C: RangeInclusive<i32> = -20..=54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Summary {
    Freezing,
    Bracing,
    Chilly,
    Cool,
    Mild,
    Warm,
    Balmy,
    Hot,
    Sweltering,
    Scorching,
}

impl Summary {
    pub const ALL: [Summary; 10] = [
        Summary::Freezing,
        Summary::Bracing,
        Summary::Chilly,
        Summary::Cool,
        Summary::Mild,
        Summary::Warm,
        Summary::Balmy,
        Summary::Hot,
        Summary::Sweltering,
        Summary::Scorching,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub date: NaiveDate,
    pub temperature_c: i32,
    pub summary: Summary,
}

/// One forecast per day from `today + 1` through `today + FORECAST_DAYS`.
pub fn generate_forecasts<R: Rng>(today: NaiveDate, rng: &mut R) -> Vec<WeatherForecast> {
    (1..=FORECAST_DAYS)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .map(|date| WeatherForecast {
            date,
            temperature_c: rng.gen_range(TEMPERATURE_RANGE_C),
            summary: Summary::ALL[rng.gen_range(0..Summary::ALL.len())],
        })
        .collect()
}

/// Generates the forecasts, tags the request's diagnostic context and logs
/// the payload once.
pub fn forecast_response<R: Rng>(
    today: NaiveDate,
    rng: &mut R,
    diagnostics: &DiagnosticContext,
) -> Vec<WeatherForecast> {
    let forecasts = generate_forecasts(today, rng);

    if let Some(max) = forecasts.iter().map(|forecast| forecast.temperature_c).max() {
        diagnostics.set("ForecastMaxTemperatureC", max);
    }

    let payload = serde_json::to_value(&forecasts).unwrap_or_default();
    info!(WeatherForecast = %payload, "Got weather forecast data: {}", payload);

    forecasts
}

/// Five days of generated weather forecasts
#[utoipa::path(
    get,
    path = "/weatherforecast",
    tag = "weather",
    responses(
        (status = 200, description = "Forecasts for the next five days", body = [WeatherForecast])
    )
)]
pub async fn weather_forecast(diagnostics: DiagnosticContext) -> Json<Vec<WeatherForecast>> {
    let today = Local::now().date_naive();
    Json(forecast_response(today, &mut rand::thread_rng(), &diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{test_support::CapturedLogs, Enrichers};
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::Value;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_always_five_bounded_forecasts() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let forecasts = generate_forecasts(date(2026, 10, 18), &mut rng);
            assert_eq!(forecasts.len(), 5);
            for forecast in &forecasts {
                assert!(TEMPERATURE_RANGE_C.contains(&forecast.temperature_c));
                assert!(Summary::ALL.contains(&forecast.summary));
            }
        }
    }

    #[test]
    fn test_dates_are_consecutive_from_tomorrow() {
        let mut rng = StdRng::seed_from_u64(1);
        let forecasts = generate_forecasts(date(2026, 12, 29), &mut rng);

        let dates: Vec<NaiveDate> = forecasts.iter().map(|f| f.date).collect();
        assert_eq!(
            dates,
            vec![
                date(2026, 12, 30),
                date(2026, 12, 31),
                date(2027, 1, 1),
                date(2027, 1, 2),
                date(2027, 1, 3),
            ]
        );
    }

    #[test]
    fn test_sampling_reaches_range_edges() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen_min = false;
        let mut seen_max = false;
        let mut summaries = std::collections::HashSet::new();

        for _ in 0..2_000 {
            for forecast in generate_forecasts(date(2026, 1, 1), &mut rng) {
                seen_min |= forecast.temperature_c == -20;
                seen_max |= forecast.temperature_c == 54;
                summaries.insert(forecast.summary);
            }
        }

        assert!(seen_min && seen_max);
        assert_eq!(summaries.len(), Summary::ALL.len());
    }

    #[test]
    fn test_serialized_shape() {
        let forecast = WeatherForecast {
            date: date(2026, 10, 19),
            temperature_c: -3,
            summary: Summary::Bracing,
        };

        assert_eq!(
            serde_json::to_value(&forecast).unwrap(),
            serde_json::json!({ "date": "2026-10-19", "temperatureC": -3, "summary": "Bracing" })
        );
    }

    #[test]
    fn test_response_logs_payload_once_and_tags_context() {
        let logs = CapturedLogs::default();
        let diagnostics = DiagnosticContext::default();
        let today = date(2026, 10, 18);

        let forecasts = tracing::subscriber::with_default(logs.subscriber(Enrichers::new()), || {
            forecast_response(today, &mut StdRng::seed_from_u64(3), &diagnostics)
        });

        let expected_dates: Vec<NaiveDate> = (1..=5).map(|d| today + Days::new(d)).collect();
        assert_eq!(forecasts.iter().map(|f| f.date).collect::<Vec<_>>(), expected_dates);

        let lines = logs.lines();
        let entries: Vec<&String> = lines
            .iter()
            .filter(|line| line.contains("Got weather forecast data: "))
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("[INF]"));

        let start = entries[0].find("Properties: ").unwrap() + "Properties: ".len();
        let properties: Value = serde_json::Deserializer::from_str(&entries[0][start..])
            .into_iter::<Value>()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(properties["WeatherForecast"], serde_json::to_value(&forecasts).unwrap());

        let max = forecasts.iter().map(|f| f.temperature_c).max().unwrap();
        assert_eq!(diagnostics.snapshot()["ForecastMaxTemperatureC"], max);
    }
}
