use axum::response::Json;
use utoipa::OpenApi;

use crate::routes::{health, weather};

#[derive(OpenApi)]
#[openapi(
    paths(
        weather::weather_forecast,
        health::health,
    ),
    components(
        schemas(
            weather::WeatherForecast,
            weather::Summary,
            health::HealthResponse,
        )
    ),
    tags(
        (name = "weather", description = "Generated weather forecasts"),
        (name = "health", description = "Health check endpoints"),
    ),
    info(
        title = "Weather API",
        description = "Weather forecast demo with structured request and application logging",
        contact(
            name = "BlackVault Enterprises",
            email = "blackvaultenterprises@gmail.com",
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT",
        ),
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development server"),
    ),
)]
pub struct ApiDoc;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(get_openapi_spec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_documents_forecast_endpoint() {
        let document = serde_json::to_value(get_openapi_spec()).unwrap();

        assert!(document["paths"]["/weatherforecast"]["get"].is_object());
        assert!(document["paths"]["/health"]["get"].is_object());
        assert!(document["components"]["schemas"]["WeatherForecast"].is_object());
    }
}
