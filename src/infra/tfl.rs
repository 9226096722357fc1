//! HTTP client for the TfL unified API: route topology and live arrivals.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::model::{CanonicalObservation, OrderedLineRoute};
use crate::services::arrivals::ArrivalsApi;
use crate::services::topology::{Direction, TopologyApi};

#[derive(Deserialize)]
struct RouteSequenceResponse {
    #[serde(rename = "orderedLineRoutes", default)]
    ordered_line_routes: Vec<OrderedLineRouteResponse>,
}

#[derive(Deserialize)]
struct OrderedLineRouteResponse {
    #[serde(default)]
    name: String,
    #[serde(rename = "naptanIds", default)]
    naptan_ids: Vec<String>,
}

pub struct TflClient {
    base_url: String,
    app_key: String,
    client: reqwest::Client,
}

impl TflClient {
    pub fn new(app_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            // The API is fronted by Cloudflare, which rejects requests
            // without a user agent.
            .user_agent("curl/7.54.1")
            .build()?;

        Ok(Self {
            base_url: "https://api.tfl.gov.uk".to_string(),
            app_key,
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("API returned status {}: {}", status, body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TopologyApi for TflClient {
    async fn route_sequences(
        &self,
        line_id: &str,
        direction: Direction,
    ) -> Result<Vec<OrderedLineRoute>> {
        let url = format!(
            "{}/line/{}/route/sequence/{}/?app_key={}",
            self.base_url,
            line_id,
            direction.as_str(),
            self.app_key
        );

        let response: RouteSequenceResponse = self.get_json(&url).await?;

        Ok(response
            .ordered_line_routes
            .into_iter()
            .map(|route| OrderedLineRoute {
                name: route.name,
                stop_refs: route.naptan_ids,
            })
            .collect())
    }
}

#[async_trait]
impl ArrivalsApi for TflClient {
    async fn latest_arrivals(&self, line_id: &str) -> Result<Vec<CanonicalObservation>> {
        let url = format!(
            "{}/line/{}/arrivals?app_key={}",
            self.base_url, line_id, self.app_key
        );

        // Parse as generic JSON and extract leniently: a single malformed
        // prediction is skipped rather than failing the whole batch.
        let predictions: Vec<serde_json::Value> = self.get_json(&url).await?;

        let observations = predictions
            .into_iter()
            .filter_map(|item| {
                let expected = item["expectedArrival"].as_str()?;
                let expected_time: DateTime<Utc> =
                    DateTime::parse_from_rfc3339(expected).ok()?.to_utc();

                Some(CanonicalObservation {
                    vehicle_ref: item["vehicleId"].as_str()?.to_string(),
                    line_ref: item["lineId"].as_str()?.to_string(),
                    direction_ref: item["direction"].as_str().unwrap_or("").to_string(),
                    destination_stop_ref: item["destinationNaptanId"]
                        .as_str()
                        .unwrap_or("")
                        .to_string(),
                    stop_ref: item["naptanId"].as_str()?.to_string(),
                    expected_time,
                    mode_ref: item["modeName"].as_str().unwrap_or("").to_string(),
                    destination_name: item["destinationName"].as_str().map(|s| s.to_string()),
                    towards: item["towards"].as_str().map(|s| s.to_string()),
                })
            })
            .collect();

        Ok(observations)
    }
}
