///! Air365 remote fetcher
///!
///! One POST per call, no retries. Retry policy lives with the scheduler.

use std::time::Duration;

use air365_common::StationQuery;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;

use super::parser::parse_station_xml;
use super::types::Readings;
use crate::error::FetchError;

const USER_AGENT: &str = "Mozilla/5.0 air365-backend/0.1";

/// Source of readings for one station
#[async_trait]
pub trait StationFetcher: Send + Sync {
    async fn fetch(&self, station: &StationQuery) -> Result<Readings, FetchError>;
}

/// Fetches station data from the KWeather IoT data API over HTTP
pub struct HttpFetcher {
    client: Client,
    api_url: String,
}

impl HttpFetcher {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build reqwest client")?;

        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl StationFetcher for HttpFetcher {
    async fn fetch(&self, station: &StationQuery) -> Result<Readings, FetchError> {
        let station_no = station.station_no();
        tracing::debug!("Fetching Air365 data for station {} from {}", station_no, self.api_url);

        let transport = |e: reqwest::Error| FetchError::Transport {
            station_no: station_no.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .post(&self.api_url)
            .form(&[("station_no", station_no)])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus {
                station_no: station_no.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        let readings = parse_station_xml(station_no, &body, Local::now())?;

        tracing::debug!("Station {}: parsed {} readings", station_no, readings.len());
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::air365::LAST_UPDATE_TIME_FIELD;
    use axum::{Form, Router, http::StatusCode, routing::post};
    use std::collections::HashMap;

    async fn iot_data(Form(params): Form<HashMap<String, String>>) -> (StatusCode, String) {
        match params.get("station_no").map(String::as_str) {
            Some("OT2CL1900053") => (
                StatusCode::OK,
                "<data><pm25>12</pm25><temp>21.5</temp><extra>x</extra></data>".to_string(),
            ),
            Some("BROKEN") => (StatusCode::OK, "<html><body>oops".to_string()),
            _ => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
        }
    }

    async fn spawn_upstream() -> String {
        let app = Router::new().route("/api/app/iotData", post(iot_data));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/app/iotData", addr)
    }

    fn station(no: &str) -> StationQuery {
        StationQuery::new(no).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_posts_station_no() {
        let url = spawn_upstream().await;
        let fetcher = HttpFetcher::new(url, Duration::from_secs(5)).unwrap();

        let readings = fetcher.fetch(&station("OT2CL1900053")).await.unwrap();
        assert_eq!(readings.len(), 4);
        assert_eq!(readings["pm25"], "12");
        assert_eq!(readings["temp"], "21.5");
        assert_eq!(readings["extra"], "x");
        assert!(readings.contains_key(LAST_UPDATE_TIME_FIELD));
    }

    #[tokio::test]
    async fn test_fetch_reports_each_failure_kind() {
        let url = spawn_upstream().await;
        let fetcher = HttpFetcher::new(url, Duration::from_secs(5)).unwrap();

        let err = fetcher.fetch(&station("UNKNOWN")).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::UpstreamStatus {
                station_no: "UNKNOWN".to_string(),
                status: 503
            }
        );

        let err = fetcher.fetch(&station("BROKEN")).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }), "{:?}", err);

        // Nothing listens on the port once the listener is dropped
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let closed = HttpFetcher::new(format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
        let err = closed.fetch(&station("OT2CL1900053")).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{:?}", err);
        assert_eq!(err.station_no(), "OT2CL1900053");
    }
}
