//! HTTP adapter for the hosted route backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::error::StoreError;
use crate::traits::{RouteStore, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpStoreConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Sent as a bearer token when set.
    pub api_token: Option<String>,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 10,
            api_token: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRouteStore {
    config: HttpStoreConfig,
    base: reqwest::Url,
    client: reqwest::Client,
}

impl HttpRouteStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        let base = reqwest::Url::parse(&config.base_url)
            .map_err(|err| StoreError::InvalidUrl(format!("{}: {}", config.base_url, err)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(config.base_url));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, base, client })
    }

    /// `{base}/sessions/{id}/{resource}`, with the id percent-encoded as a
    /// single path segment.
    fn session_url(&self, session_id: &SessionId, resource: &str) -> reqwest::Url {
        let mut url = self.base.clone();
        // Only fails for cannot-be-a-base URLs, which `new` rejects.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["sessions", session_id.0.as_str(), resource]);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[derive(Debug, Serialize)]
struct AppendPointsBody<'a> {
    points: &'a [Coordinate],
}

#[derive(Debug, Serialize)]
struct AggregateBody {
    last: Coordinate,
    total_distance_m: f64,
}

#[async_trait]
impl RouteStore for HttpRouteStore {
    async fn append_points(
        &self,
        session_id: &SessionId,
        points: &[Coordinate],
    ) -> Result<(), StoreError> {
        let url = self.session_url(session_id, "points");
        self.authorize(self.client.post(url))
            .json(&AppendPointsBody { points })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn update_session_aggregate(
        &self,
        session_id: &SessionId,
        last_coordinate: Coordinate,
        total_distance_m: f64,
    ) -> Result<(), StoreError> {
        let url = self.session_url(session_id, "aggregate");
        self.authorize(self.client.put(url))
            .json(&AggregateBody {
                last: last_coordinate,
                total_distance_m,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
