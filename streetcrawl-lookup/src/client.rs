use crate::error::{LookupError, Result};
use crate::lookup::PanoramaLookup;
use crate::record::{PanoramaRecord, RawPanorama};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("streetcrawl/", env!("CARGO_PKG_VERSION"));

/// HTTP client for a JSON panorama metadata service.
///
/// Endpoints, relative to the base URL:
/// - `GET panoramas/nearest?lat=..&lon=..&radius=..`
/// - `GET panoramas/{id}`
///
/// A 404 means "no such panorama" and maps to `Ok(None)`.
pub struct PanoramaClient {
    client: Client,
    base_url: Url,
}

impl PanoramaClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, 10)
    }

    pub fn with_timeout(base_url: &str, timeout_secs: u64) -> Result<Self> {
        Self::build(base_url, timeout_secs, DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(base_url: &str, timeout_secs: u64, user_agent: &str) -> Result<Self> {
        Self::build(base_url, timeout_secs, user_agent)
    }

    fn build(base_url: &str, timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| LookupError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(LookupError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                base_url
            )));
        }
        // Url::join drops the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| LookupError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))
    }

    async fn get_record(&self, url: Url) -> Result<Option<PanoramaRecord>> {
        debug!("Fetching {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("No panorama at {}", url);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LookupError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        let raw: RawPanorama = serde_json::from_str(&body)
            .map_err(|e| LookupError::MalformedRecord(format!("{}: {}", url, e)))?;
        raw.validate().map(Some)
    }
}

impl PanoramaLookup for PanoramaClient {
    async fn nearest(&self, lat: f64, lon: f64, radius: u32) -> Result<Option<PanoramaRecord>> {
        let mut url = self.endpoint("panoramas/nearest")?;
        url.query_pairs_mut()
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &lon.to_string())
            .append_pair("radius", &radius.to_string());
        self.get_record(url).await
    }

    async fn fetch(&self, id: &str) -> Result<Option<PanoramaRecord>> {
        let mut url = self.endpoint("panoramas/")?;
        url.path_segments_mut()
            .map_err(|_| LookupError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(id);
        self.get_record(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    const P0: &str = r#"{
        "id": "P0", "lat": 43.6532, "lon": -79.3832,
        "neighbors": [{"id": "N1", "lat": 43.6533, "lon": -79.3833}],
        "links": [{"id": "L1", "lat": 43.6531, "lon": -79.3831, "direction": 180.0}]
    }"#;

    async fn mount_json(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(body),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_by_id() {
        let server = MockServer::start().await;
        mount_json(&server, "/panoramas/P0", P0).await;

        let client = PanoramaClient::new(&server.uri()).unwrap();
        let record = client.fetch("P0").await.unwrap().unwrap();

        assert_eq!(record.id, "P0");
        assert_eq!(record.neighbors[0].id, "N1");
        assert_eq!(record.links[0].direction, Some(180.0));
    }

    #[tokio::test]
    async fn test_fetch_escapes_id() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/panoramas/a%2Fb",
            r#"{"id":"a/b","lat":1.0,"lon":1.0}"#,
        )
        .await;

        let client = PanoramaClient::new(&server.uri()).unwrap();
        let record = client.fetch("a/b").await.unwrap().unwrap();
        assert_eq!(record.id, "a/b");
    }

    #[tokio::test]
    async fn test_nearest_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/panoramas/nearest"))
            .and(query_param("radius", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_string(P0))
            .mount(&server)
            .await;

        // Base URL without a trailing slash still keeps its path
        let client = PanoramaClient::new(&format!("{}/api", server.uri())).unwrap();
        let record = client.nearest(43.65, -79.38, 50).await.unwrap();
        assert_eq!(record.map(|r| r.id), Some("P0".to_string()));
    }

    #[tokio::test]
    async fn test_custom_user_agent_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/panoramas/P0"))
            .and(header("user-agent", "survey-bot/2.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(P0))
            .expect(1)
            .mount(&server)
            .await;

        let client = PanoramaClient::with_user_agent(&server.uri(), 5, "survey-bot/2.0").unwrap();
        assert!(client.fetch("P0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = PanoramaClient::new(&server.uri()).unwrap();
        assert!(client.fetch("missing").await.unwrap().is_none());
        assert!(client.nearest(0.0, 0.0, 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = PanoramaClient::new(&server.uri()).unwrap();
        let err = client.fetch("P0").await.unwrap_err();
        assert!(matches!(err, LookupError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let server = MockServer::start().await;
        mount_json(&server, "/panoramas/P0", "not json").await;
        mount_json(&server, "/panoramas/P1", r#"{"id":"P1"}"#).await;

        let client = PanoramaClient::new(&server.uri()).unwrap();
        assert!(matches!(
            client.fetch("P0").await,
            Err(LookupError::MalformedRecord(_))
        ));
        assert!(matches!(
            client.fetch("P1").await,
            Err(LookupError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            PanoramaClient::new("not a url"),
            Err(LookupError::InvalidUrl(_))
        ));
        assert!(PanoramaClient::new("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = PanoramaClient::new("http://localhost:8080/v1").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8080/v1/");
    }
}
